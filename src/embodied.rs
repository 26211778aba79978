//! Embodied carbon estimation
//!
//! Embodied emissions amortize hardware manufacture over the fraction of
//! the device's expected lifetime the workload consumes; they depend on
//! usage duration, not on when electricity was greener. Impact values come
//! from the Boavizta API, behind a trait so analyses can run offline with
//! a fixed impact figure.

use serde_json::Value;
use tracing::debug;

use crate::error::{IchnosError, Result};
use crate::record::TaskRecord;

/// Five years, in hours.
pub const DEFAULT_CPU_LIFETIME_HOURS: f64 = 5.0 * 365.25 * 24.0;

const BOAVIZTA_BASE_URL: &str = "https://api.boavizta.org";

/// Source of per-CPU embodied impact figures (kgCO2e over the device's
/// whole lifetime).
pub trait EmbodiedCarbonSource {
    fn cpu_embodied_kg(&self, cpu_model: &str) -> Result<f64>;
}

/// Boavizta API client.
pub struct BoaviztaClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BoaviztaClient {
    pub fn new() -> Self {
        Self::with_base_url(BOAVIZTA_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for BoaviztaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbodiedCarbonSource for BoaviztaClient {
    fn cpu_embodied_kg(&self, cpu_model: &str) -> Result<f64> {
        let url = format!("{}/v1/component/cpu?verbose=false", self.base_url);
        let lookup_err = |reason: String| IchnosError::EmbodiedLookup {
            cpu_model: cpu_model.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": cpu_model }))
            .send()
            .map_err(|e| lookup_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(lookup_err(format!("status {}", response.status())));
        }

        let body: Value = response
            .json()
            .map_err(|e| lookup_err(format!("invalid response body: {e}")))?;
        let impact = body
            .pointer("/impacts/gwp/embedded/value")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                lookup_err("response has no impacts.gwp.embedded.value".to_string())
            })?;

        debug!(cpu_model, impact_kg = impact, "resolved embodied impact");
        Ok(impact)
    }
}

/// Fixed lifetime impact, for offline runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedImpact(pub f64);

impl EmbodiedCarbonSource for FixedImpact {
    fn cpu_embodied_kg(&self, _cpu_model: &str) -> Result<f64> {
        Ok(self.0)
    }
}

/// Embodied carbon in grams for using `cpu_model` for `duration_h` hours
/// out of a `lifetime_h` lifetime (default five years). Assumes full
/// utilisation of the device for the duration.
pub fn cpu_embodied_carbon(
    source: &dyn EmbodiedCarbonSource,
    cpu_model: &str,
    duration_h: f64,
    lifetime_h: Option<f64>,
) -> Result<f64> {
    let lifetime = lifetime_h.unwrap_or(DEFAULT_CPU_LIFETIME_HOURS);
    if lifetime <= 0.0 {
        return Err(IchnosError::Configuration(format!(
            "cpu lifetime must be positive, got {lifetime}h"
        )));
    }
    let impact_kg = source.cpu_embodied_kg(cpu_model)?;
    Ok(impact_kg * (duration_h / lifetime) * 1000.0)
}

/// Total embodied carbon in grams across a trace, one share per task's
/// realtime. Tasks without a CPU model use `fallback_model`.
pub fn embodied_for_tasks(
    source: &dyn EmbodiedCarbonSource,
    tasks: &[TaskRecord],
    fallback_model: &str,
    lifetime_h: Option<f64>,
) -> Result<f64> {
    let mut total = 0.0;
    for task in tasks {
        let model = task.cpu_model.as_deref().unwrap_or(fallback_model);
        let duration_h = task.realtime as f64 / 3_600_000.0;
        total += cpu_embodied_carbon(source, model, duration_h, lifetime_h)?;
    }
    Ok(total)
}

/// The CPU model shared by every task in the trace, or the fallback when
/// none declares one. Mixed models are a configuration error: embodied
/// comparisons across shift windows assume one device.
pub fn uniform_cpu_model(tasks: &[TaskRecord], fallback: Option<&str>) -> Result<String> {
    let mut found: Option<&str> = None;
    for task in tasks {
        if let Some(model) = task.cpu_model.as_deref() {
            match found {
                None => found = Some(model),
                Some(existing) if existing != model => {
                    return Err(IchnosError::Configuration(format!(
                        "trace mixes cpu models '{existing}' and '{model}'"
                    )))
                }
                Some(_) => {}
            }
        }
    }
    found
        .or(fallback)
        .map(str::to_string)
        .ok_or_else(|| {
            IchnosError::Configuration(
                "no cpu model in trace and no fallback configured".to_string(),
            )
        })
}
