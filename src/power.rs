//! Power models and node profile configuration
//!
//! Node power characteristics live in a JSON profile file keyed by node id
//! and CPU governor. A model name of the form `node_governor_kind` selects
//! one profile and one model family, resolved once at startup into a tagged
//! [`PowerModel`] that is passed explicitly into the estimator. An
//! unrecognized model kind fails closed rather than guessing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_MEMORY_POWER_DRAW;
use crate::error::{IchnosError, Result};

/// CPU power draw as a function of usage fraction in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub enum PowerModel {
    /// Fitted linear model: `coefficient * x + intercept` watts.
    Linear { coefficient: f64, intercept: f64 },
    /// Polynomial fit, coefficients highest power first.
    Polynomial { coefficients: Vec<f64> },
    /// Scales between an idle and a full-load measurement.
    MinMaxLinear { min_watts: f64, max_watts: f64 },
    /// Flat TDP-proportional per-core baseline. The only family whose
    /// output is per-core draw; the estimator rescales it by core count.
    Baseline { tdp_per_core: f64 },
}

impl PowerModel {
    /// Power draw in watts at the given usage fraction.
    pub fn watts(&self, fraction: f64) -> f64 {
        match self {
            PowerModel::Linear {
                coefficient,
                intercept,
            } => coefficient * fraction + intercept,
            PowerModel::Polynomial { coefficients } => coefficients
                .iter()
                .fold(0.0, |acc, c| acc * fraction + c),
            PowerModel::MinMaxLinear {
                min_watts,
                max_watts,
            } => min_watts + (max_watts - min_watts) * fraction,
            PowerModel::Baseline { tdp_per_core } => tdp_per_core * fraction,
        }
    }

    /// Whether the model's output is per-core draw that must be rescaled
    /// by the task's core count. The other families already represent
    /// aggregate draw and must not be rescaled.
    pub fn scales_per_core(&self) -> bool {
        matches!(self, PowerModel::Baseline { .. })
    }
}

/// How reported CPU usage is normalized to a `[0, 1]` fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageNormalization {
    /// `cpu_usage / (100 * core_count)`: usage-percent-per-allocated-core.
    PerCore,
    /// `cpu_usage / (100 * system_cores)`: usage relative to a fixed
    /// system-wide core count.
    SystemWide(u32),
}

impl UsageNormalization {
    pub fn fraction(&self, cpu_usage: f64, core_count: u32) -> f64 {
        let divisor = match self {
            UsageNormalization::PerCore => core_count.max(1) as f64,
            UsageNormalization::SystemWide(cores) => (*cores).max(1) as f64,
        };
        cpu_usage / (100.0 * divisor)
    }
}

/// Raw per-governor profile entry as stored in the nodes JSON file.
#[derive(Debug, Clone, Deserialize)]
struct RawProfile {
    min_watts: Option<f64>,
    max_watts: Option<f64>,
    tdp_per_core: Option<f64>,
    /// `[coefficient, intercept]` of a fitted linear model.
    linear: Option<[f64; 2]>,
    polynomial: Option<Vec<f64>>,
    cpu_model: Option<String>,
    mem_draw: Option<f64>,
    system_cores: Option<u32>,
}

/// A node's resolved power characteristics.
#[derive(Debug, Clone)]
pub struct NodeProfile {
    pub power_model: PowerModel,
    pub cpu_model: Option<String>,
    /// W/GB; falls back to the global default when the profile has no
    /// node-specific value (documented fallback, logged at debug).
    pub memory_draw: f64,
    pub system_cores: Option<u32>,
}

/// Load a node profile file and resolve `model_name` against it.
///
/// `model_name` has the form `node_governor_kind` where `kind` is one of
/// `linear`, `polynomial`, `minmax` or `baseline`.
pub fn load_node_profile<P: AsRef<Path>>(path: P, model_name: &str) -> Result<NodeProfile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let profiles: HashMap<String, HashMap<String, RawProfile>> = serde_json::from_str(&contents)
        .map_err(|e| {
            IchnosError::Configuration(format!(
                "invalid node profile file {}: {e}",
                path.display()
            ))
        })?;
    resolve_profile(&profiles, model_name)
}

fn resolve_profile(
    profiles: &HashMap<String, HashMap<String, RawProfile>>,
    model_name: &str,
) -> Result<NodeProfile> {
    let parts: Vec<&str> = model_name.split('_').collect();
    let (node, governor, kind) = match parts.as_slice() {
        [node, governor, kind] => (*node, *governor, *kind),
        _ => {
            return Err(IchnosError::Configuration(format!(
                "model name '{model_name}' must have the form node_governor_kind"
            )))
        }
    };

    let raw = profiles
        .get(node)
        .and_then(|governors| governors.get(governor))
        .ok_or_else(|| {
            IchnosError::Configuration(format!(
                "no profile for node '{node}' with governor '{governor}'"
            ))
        })?;

    let missing = |field: &str| {
        IchnosError::Configuration(format!(
            "profile {node}/{governor} has no '{field}' entry required by the '{kind}' model"
        ))
    };

    let power_model = match kind {
        "linear" => {
            let [coefficient, intercept] = raw.linear.ok_or_else(|| missing("linear"))?;
            PowerModel::Linear {
                coefficient,
                intercept,
            }
        }
        "polynomial" => PowerModel::Polynomial {
            coefficients: raw
                .polynomial
                .clone()
                .ok_or_else(|| missing("polynomial"))?,
        },
        "minmax" => PowerModel::MinMaxLinear {
            min_watts: raw.min_watts.ok_or_else(|| missing("min_watts"))?,
            max_watts: raw.max_watts.ok_or_else(|| missing("max_watts"))?,
        },
        "baseline" => PowerModel::Baseline {
            tdp_per_core: raw.tdp_per_core.ok_or_else(|| missing("tdp_per_core"))?,
        },
        other => {
            return Err(IchnosError::Configuration(format!(
                "unrecognized power model kind '{other}' \
                 (expected linear, polynomial, minmax or baseline)"
            )))
        }
    };

    let memory_draw = match raw.mem_draw {
        Some(draw) => draw,
        None => {
            debug!(
                node,
                governor,
                default = DEFAULT_MEMORY_POWER_DRAW,
                "profile has no mem_draw, using global default"
            );
            DEFAULT_MEMORY_POWER_DRAW
        }
    };

    Ok(NodeProfile {
        power_model,
        cpu_model: raw.cpu_model.clone(),
        memory_draw,
        system_cores: raw.system_cores,
    })
}
