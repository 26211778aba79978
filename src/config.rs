//! Run configuration
//!
//! Defaults shared across the tool, plus an optional TOML configuration
//! file. CLI flags always override file values; the file only fills in
//! what the command line leaves unset.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Disregarded when 1.0.
pub const DEFAULT_PUE: f64 = 1.0;
/// W/GB, Cloud Carbon Footprint methodology.
pub const DEFAULT_MEMORY_POWER_DRAW: f64 = 0.392;
pub const DEFAULT_INTERVAL_MINUTES: i64 = 60;
/// Flexibility windows explored by the shift analysis, in interval slots
/// (hours at the default 60-minute interval).
pub const DEFAULT_SHIFT_WINDOWS: [usize; 5] = [6, 12, 24, 48, 96];
pub const DEFAULT_TRACE_DELIMITER: char = ',';
pub const DEFAULT_OUT_FOLDER: &str = "output";

/// Optional TOML run-configuration file. Every field is optional; the
/// binary merges these under the CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub workflow_name: Option<String>,
    pub trace_file: Option<PathBuf>,
    pub trace_delimiter: Option<char>,
    /// Constant carbon intensity in gCO2e/kWh.
    pub ci: Option<f64>,
    pub ci_file: Option<PathBuf>,
    pub ci_delimiter: Option<char>,
    pub node_config: Option<PathBuf>,
    pub model_name: Option<String>,
    pub interval: Option<i64>,
    pub pue: Option<f64>,
    pub memory_coefficient: Option<f64>,
    pub reserved_memory_gb: Option<f64>,
    pub num_nodes: Option<u32>,
    pub system_cores: Option<u32>,
    pub shift_windows: Option<Vec<usize>>,
    pub shift_direction: Option<String>,
    pub out_folder: Option<PathBuf>,
    pub out_prefix: Option<String>,
    /// Fixed embodied impact in kgCO2e, bypassing the Boavizta lookup.
    pub cpu_impact_kg: Option<f64>,
    pub lifetime_hours: Option<f64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}
