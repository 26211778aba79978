//! Energy and operational emissions estimation
//!
//! Implements the Cloud Carbon Footprint methodology: per-slice CPU energy
//! from a power model over normalized usage, memory energy from a flat
//! W/GB coefficient, PUE applied multiplicatively, emissions from the
//! interval's carbon intensity.

use tracing::debug;

use crate::error::Result;
use crate::intensity::CiSource;
use crate::interval::IntervalPartition;
use crate::power::{PowerModel, UsageNormalization};
use crate::record::TaskRecord;

/// Parameters the estimator needs beyond the task itself.
#[derive(Debug, Clone)]
pub struct EstimatorSettings {
    pub power_model: PowerModel,
    pub normalization: UsageNormalization,
    /// Power usage effectiveness, >= 1.0; 1.0 disables the adjustment.
    pub pue: f64,
    /// Memory power draw in W/GB.
    pub memory_coefficient: f64,
}

/// Core and memory energy for one task slice, in kWh, before PUE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBreakdown {
    pub core_kwh: f64,
    pub memory_kwh: f64,
}

/// Reserved-memory accounting inputs (optional extension).
#[derive(Debug, Clone, Copy)]
pub struct ReservedMemory {
    pub reserved_gb: f64,
    pub num_nodes: u32,
}

/// Aggregate result of a footprint calculation.
///
/// Energy totals are kWh, emissions gCO2e. `node_memory_spans` holds one
/// `(bucket wall-clock span in hours, ci value)` pair per occupied bucket
/// when reserved-memory tracking is on, consumed later by
/// [`reserved_memory_usage`].
#[derive(Debug, Clone, Default)]
pub struct OperationalFootprint {
    pub cpu_energy: f64,
    pub cpu_energy_pue: f64,
    pub memory_energy: f64,
    pub memory_energy_pue: f64,
    pub carbon_emissions: f64,
    pub node_memory_spans: Vec<(f64, f64)>,
}

/// Estimate one slice's energy consumption.
///
/// `realtime_ms` is the slice duration, not necessarily the whole task's.
/// Only a baseline (per-core) model is rescaled by core count; the other
/// families already represent aggregate draw.
pub fn estimate_energy(
    task: &TaskRecord,
    realtime_ms: i64,
    settings: &EstimatorSettings,
) -> EnergyBreakdown {
    let time_h = realtime_ms as f64 / 3_600_000.0;
    let fraction = settings
        .normalization
        .fraction(task.cpu_usage, task.core_count);

    let mut core_kwh = time_h * settings.power_model.watts(fraction) * 0.001;
    if settings.power_model.scales_per_core() {
        core_kwh *= task.core_count as f64;
    }

    let memory_gb = task.memory.unwrap_or(0.0) / 1_073_741_824.0;
    let memory_kwh = memory_gb * settings.memory_coefficient * time_h * 0.001;

    EnergyBreakdown {
        core_kwh,
        memory_kwh,
    }
}

/// Calculate the operational carbon footprint of a partitioned workflow.
///
/// Walks every occupied bucket, resolves its carbon intensity (failing
/// loudly when a series lacks the bucket's time key), and annotates each
/// slice in place with its PUE-adjusted energy, emissions and the CI value
/// applied. Setting fields rather than accumulating keeps re-runs
/// idempotent: estimating the same partition twice yields identical
/// totals and identical slice annotations.
pub fn calculate_footprint(
    tasks: &[TaskRecord],
    partition: &mut IntervalPartition,
    ci: &CiSource,
    settings: &EstimatorSettings,
    reserved: Option<ReservedMemory>,
) -> Result<OperationalFootprint> {
    let mut totals = OperationalFootprint::default();

    for (&bucket_ms, slices) in partition.buckets.iter_mut() {
        if slices.is_empty() {
            continue;
        }
        let ci_val = ci.resolve(bucket_ms)?;

        if reserved.is_some() {
            // Node-level wall-clock span of this bucket's activity.
            let earliest = slices.iter().map(|s| s.start).min().unwrap_or(bucket_ms);
            let latest = slices.iter().map(|s| s.end).max().unwrap_or(bucket_ms);
            let span_h = (latest - earliest) as f64 / 3_600_000.0;
            totals.node_memory_spans.push((span_h, ci_val));
        }

        for slice in slices.iter_mut() {
            let energy = estimate_energy(&tasks[slice.task], slice.realtime(), settings);
            let core_pue = energy.core_kwh * settings.pue;
            let memory_pue = energy.memory_kwh * settings.pue;
            let footprint = (core_pue + memory_pue) * ci_val;

            slice.energy = core_pue;
            slice.co2e = footprint;
            slice.avg_ci = Some(ci_val);

            totals.cpu_energy += energy.core_kwh;
            totals.cpu_energy_pue += core_pue;
            totals.memory_energy += energy.memory_kwh;
            totals.memory_energy_pue += memory_pue;
            totals.carbon_emissions += footprint;
        }
    }

    debug!(
        emissions_g = totals.carbon_emissions,
        cpu_kwh = totals.cpu_energy,
        "footprint calculated"
    );
    Ok(totals)
}

/// Total reserved-memory energy (kWh) and emissions (gCO2e) from the
/// per-bucket spans recorded by [`calculate_footprint`].
pub fn reserved_memory_usage(
    spans: &[(f64, f64)],
    reserved: ReservedMemory,
    memory_coefficient: f64,
) -> (f64, f64) {
    let mut energy_kwh = 0.0;
    let mut emissions = 0.0;
    for &(span_h, ci_val) in spans {
        let kwh =
            reserved.reserved_gb * memory_coefficient * span_h * 0.001 * reserved.num_nodes as f64;
        energy_kwh += kwh;
        emissions += kwh * ci_val;
    }
    (energy_kwh, emissions)
}
