//! Carbon intensity series and time keys
//!
//! A CI series is an ordered mapping from a composite `MM/DD-HH:MM` time key
//! to a carbon intensity value in gCO2e/kWh. Insertion order is
//! chronological for the bounded historical windows these files cover, and
//! the shift explorer needs O(1) key-to-position lookup, so the series keeps
//! parallel key/value vectors plus a position index rather than a plain map.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::warn;

use crate::error::{IchnosError, Result};

/// Format a millisecond epoch timestamp as a zero-padded `MM/DD-HH:MM`
/// time key in UTC. Lexical order matches chronological order within a
/// bounded window, which is what the series files rely on.
pub fn ci_key(ms: i64) -> Result<String> {
    let ts: DateTime<Utc> = DateTime::from_timestamp_millis(ms)
        .ok_or(IchnosError::TimestampOutOfRange { ms })?;
    Ok(format!(
        "{:02}/{:02}-{:02}:{:02}",
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute()
    ))
}

/// Ordered carbon intensity series keyed by `MM/DD-HH:MM`.
#[derive(Debug, Clone, Default)]
pub struct CiSeries {
    keys: Vec<String>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl CiSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut series = Self::new();
        for (key, value) in pairs {
            series.insert(key.into(), value);
        }
        series
    }

    /// Insert a value; a repeated key overwrites in place, keeping the
    /// original position.
    pub fn insert(&mut self, key: String, value: f64) {
        match self.index.get(&key) {
            Some(&pos) => self.values[pos] = value,
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.values.push(value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&pos| self.values[pos])
    }

    /// Position of a key within the chronological ordering.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn key_at(&self, pos: usize) -> &str {
        &self.keys[pos]
    }

    pub fn value_at(&self, pos: usize) -> f64 {
        self.values[pos]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Carbon intensity input: either a single constant value or a time-keyed
/// series covering the workflow window.
#[derive(Debug, Clone)]
pub enum CiSource {
    Constant(f64),
    Series(CiSeries),
}

impl CiSource {
    /// Resolve the CI value for a bucket starting at `bucket_ms`.
    ///
    /// A missing key is fatal: it means the series does not cover the
    /// workflow's time window, and an emissions value computed against a
    /// defaulted CI would be silently wrong.
    pub fn resolve(&self, bucket_ms: i64) -> Result<f64> {
        match self {
            CiSource::Constant(value) => Ok(*value),
            CiSource::Series(series) => {
                let key = ci_key(bucket_ms)?;
                series
                    .get(&key)
                    .ok_or(IchnosError::MissingCarbonIntensity { key })
            }
        }
    }
}

/// Parse a CI intervals file.
///
/// Expected columns (located by header name): `date` (`YYYY-MM-DD`),
/// `start` (`HH:MM`) and `actual` (gCO2e/kWh). Rows with an unparseable
/// value are logged and skipped rather than aborting the whole series.
pub fn parse_ci_file<P: AsRef<Path>>(path: P, delimiter: char) -> Result<CiSeries> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let file = path.display().to_string();

    let mut lines = contents.lines();
    let header = lines.next().ok_or_else(|| IchnosError::Malformed {
        file: file.clone(),
        reason: "empty carbon intensity file".to_string(),
    })?;
    let fields: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    let col = |name: &str| {
        fields
            .iter()
            .position(|f| *f == name)
            .ok_or_else(|| IchnosError::Malformed {
                file: file.clone(),
                reason: format!("missing required column '{name}'"),
            })
    };
    let date_i = col("date")?;
    let start_i = col("start")?;
    let value_i = col("actual")?;

    let mut series = CiSeries::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        let (Some(date), Some(start), Some(raw_value)) = (
            parts.get(date_i),
            parts.get(start_i),
            parts.get(value_i),
        ) else {
            warn!(file = %file, row = line, "skipping short carbon intensity row");
            continue;
        };

        // Key is the zero-padded month/day of the date plus the start time.
        let month_day: Vec<String> = date
            .split('-')
            .skip(1)
            .map(|part| format!("{part:0>2}"))
            .collect();
        let key = format!("{}-{}", month_day.join("/"), start);

        match raw_value.parse::<f64>() {
            Ok(value) => series.insert(key, value),
            Err(_) => {
                warn!(file = %file, value = raw_value, "skipping invalid carbon intensity value");
            }
        }
    }

    Ok(series)
}
