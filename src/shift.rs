//! Temporal shift exploration
//!
//! What-if analysis: how much lower would a workflow's emissions have been
//! if its execution had been delayed (or advanced) within a flexibility
//! window to occupy lower-carbon interval slots? The candidate slots with
//! the lowest carbon intensity are selected, then re-sorted into their
//! chronological positions before being mapped back onto the workflow's
//! occupied buckets: picking by value alone could hand a later slot to an
//! earlier task, which is not an executable schedule.
//!
//! A shifted schedule that is not contiguous pauses the workflow at each
//! gap, incurring the interruption overhead the partitioner recorded for
//! the bucket before the gap. Embodied carbon is recomputed from the
//! overhead-extended makespan: manufacturing emissions scale with time on
//! hardware, not with grid conditions.

use clap::ValueEnum;
use tracing::warn;

use crate::embodied::{cpu_embodied_carbon, EmbodiedCarbonSource};
use crate::energy::{calculate_footprint, EstimatorSettings};
use crate::error::{IchnosError, Result};
use crate::intensity::{ci_key, CiSeries, CiSource};
use crate::interval::IntervalPartition;
use crate::record::TaskRecord;

/// Which way the flexibility window extends around the workflow's actual
/// execution span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShiftDirection {
    /// Candidate slots from the workflow's start up to `window` slots
    /// after its end.
    Forward,
    /// Candidate slots from `window` slots before the start to `window`
    /// slots after the end.
    Bidirectional,
}

#[derive(Debug, Clone)]
pub struct ShiftOptions {
    /// Window sizes in interval slots (hours at a 60-minute interval).
    pub windows: Vec<usize>,
    pub direction: ShiftDirection,
    pub lifetime_hours: Option<f64>,
}

impl Default for ShiftOptions {
    fn default() -> Self {
        Self {
            windows: crate::config::DEFAULT_SHIFT_WINDOWS.to_vec(),
            direction: ShiftDirection::Forward,
            lifetime_hours: None,
        }
    }
}

/// Outcome of one flexibility window.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftOutcome {
    pub window: usize,
    pub saving_pct: f64,
    /// gCO2e under the shifted CI assignment.
    pub emissions: f64,
    pub overhead_s: f64,
    /// Overhead as a percentage of the baseline makespan.
    pub overhead_pct: f64,
}

/// Full shift exploration report for one workflow.
#[derive(Debug, Clone)]
pub struct ShiftReport {
    pub workflow: String,
    pub baseline_emissions: f64,
    pub baseline_embodied: f64,
    pub makespan_s: f64,
    pub operational: Vec<ShiftOutcome>,
    pub embodied: Vec<ShiftOutcome>,
    /// Windows skipped for insufficient CI coverage, with the reason.
    pub skipped: Vec<(usize, String)>,
}

/// Explore temporal shifting for one workflow.
///
/// `ci` must cover the workflow's occupied buckets (that is the baseline)
/// plus whatever margin the requested windows need; a window the series
/// cannot cover is skipped and reported, not silently clamped.
pub fn explore(
    workflow: &str,
    tasks: &[TaskRecord],
    partition: &mut IntervalPartition,
    ci: &CiSeries,
    settings: &EstimatorSettings,
    embodied_source: &dyn EmbodiedCarbonSource,
    cpu_model: &str,
    options: &ShiftOptions,
) -> Result<ShiftReport> {
    // Occupied buckets in chronological order, as CI keys, with the
    // overhead charged if the schedule is interrupted after each.
    let mut occupied_keys: Vec<String> = Vec::new();
    let mut occupied_overheads: Vec<i64> = Vec::new();
    for (ts, overhead) in partition.occupied_overheads() {
        occupied_keys.push(ci_key(ts)?);
        occupied_overheads.push(overhead);
    }

    let baseline = calculate_footprint(
        tasks,
        partition,
        &CiSource::Series(ci.clone()),
        settings,
        None,
    )?;
    let makespan_s = partition.makespan_s();
    let makespan_h = makespan_s / 3600.0;
    let baseline_embodied =
        cpu_embodied_carbon(embodied_source, cpu_model, makespan_h, options.lifetime_hours)?;

    let first_key = occupied_keys.first().ok_or_else(|| {
        IchnosError::Configuration("workflow occupies no intervals".to_string())
    })?;
    let last_key = &occupied_keys[occupied_keys.len() - 1];
    let start_pos = position_of(ci, first_key)?;
    let end_pos = position_of(ci, last_key)?;

    let mut report = ShiftReport {
        workflow: workflow.to_string(),
        baseline_emissions: baseline.carbon_emissions,
        baseline_embodied,
        makespan_s,
        operational: Vec::new(),
        embodied: Vec::new(),
        skipped: Vec::new(),
    };

    for &window in &options.windows {
        match explore_window(
            tasks,
            partition,
            ci,
            settings,
            &occupied_keys,
            &occupied_overheads,
            start_pos,
            end_pos,
            window,
            options.direction,
        ) {
            Ok((emissions, overhead_s)) => {
                let saving_pct =
                    (baseline.carbon_emissions - emissions) / baseline.carbon_emissions * 100.0;
                let overhead_pct = overhead_s / makespan_s * 100.0;
                report.operational.push(ShiftOutcome {
                    window,
                    saving_pct,
                    emissions,
                    overhead_s,
                    overhead_pct,
                });

                let shifted_embodied = cpu_embodied_carbon(
                    embodied_source,
                    cpu_model,
                    (makespan_s + overhead_s) / 3600.0,
                    options.lifetime_hours,
                )?;
                let embodied_saving =
                    (baseline_embodied - shifted_embodied) / baseline_embodied * 100.0;
                report.embodied.push(ShiftOutcome {
                    window,
                    saving_pct: embodied_saving,
                    emissions: shifted_embodied,
                    overhead_s,
                    overhead_pct,
                });
            }
            Err(e @ IchnosError::InsufficientShiftCoverage { .. }) => {
                warn!(workflow, window, error = %e, "skipping shift window");
                report.skipped.push((window, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Evaluate one window: returns `(shifted emissions, overhead seconds)`.
#[allow(clippy::too_many_arguments)]
fn explore_window(
    tasks: &[TaskRecord],
    partition: &mut IntervalPartition,
    ci: &CiSeries,
    settings: &EstimatorSettings,
    occupied_keys: &[String],
    occupied_overheads: &[i64],
    start_pos: usize,
    end_pos: usize,
    window: usize,
    direction: ShiftDirection,
) -> Result<(f64, f64)> {
    let slots = occupied_keys.len();

    let lo = match direction {
        ShiftDirection::Forward => start_pos as i64,
        ShiftDirection::Bidirectional => start_pos as i64 - window as i64,
    };
    let hi = end_pos as i64 + window as i64;
    if lo < 0 || hi >= ci.len() as i64 {
        return Err(IchnosError::InsufficientShiftCoverage {
            window,
            lo,
            hi,
            len: ci.len(),
        });
    }

    let candidates: Vec<f64> = (lo..=hi).map(|pos| ci.value_at(pos as usize)).collect();
    let chosen = lowest_in_order(&candidates, slots);

    // Reassign the selected slots' CI values onto the workflow's occupied
    // buckets, positionally and in chronological order.
    let mut reassigned = CiSeries::new();
    for (key, &pick) in occupied_keys.iter().zip(chosen.iter()) {
        reassigned.insert(key.clone(), candidates[pick]);
    }

    let shifted = calculate_footprint(
        tasks,
        partition,
        &CiSource::Series(reassigned),
        settings,
        None,
    )?;

    // Each gap in the chosen positions interrupts the schedule after the
    // corresponding occupied bucket; charge that bucket's recorded
    // tail-spill overhead.
    let mut overhead_ms: i64 = 0;
    for (slot, pair) in chosen.windows(2).enumerate() {
        if pair[0] + 1 != pair[1] {
            overhead_ms += occupied_overheads[slot];
        }
    }

    Ok((shifted.carbon_emissions, overhead_ms as f64 / 1000.0))
}

/// Indices of the `n` smallest values, restored to ascending (original,
/// chronological) position order. Selection is partial: only the `n`
/// smallest need identifying, not a full sort of the candidates.
fn lowest_in_order(values: &[f64], n: usize) -> Vec<usize> {
    let n = n.min(values.len());
    if n == 0 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..values.len()).collect();
    if n < values.len() {
        indices.select_nth_unstable_by(n - 1, |&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(n);
    }
    indices.sort_unstable();
    indices
}

fn position_of(ci: &CiSeries, key: &str) -> Result<usize> {
    ci.position(key)
        .ok_or_else(|| IchnosError::MissingCarbonIntensity {
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embodied::FixedImpact;
    use crate::interval::partition;
    use crate::power::{PowerModel, UsageNormalization};
    use crate::record::test_task;

    const HOUR: i64 = 3_600_000;

    fn settings() -> EstimatorSettings {
        EstimatorSettings {
            power_model: PowerModel::Linear {
                coefficient: 100.0,
                intercept: 100.0,
            },
            normalization: UsageNormalization::PerCore,
            pue: 1.0,
            memory_coefficient: 0.392,
        }
    }

    /// Hourly CI series starting at epoch, long enough for the windows
    /// under test.
    fn hourly_series(values: &[f64]) -> CiSeries {
        CiSeries::from_pairs(
            values
                .iter()
                .enumerate()
                .map(|(h, &v)| (ci_key(h as i64 * HOUR).unwrap(), v)),
        )
    }

    #[test]
    fn test_lowest_in_order_restores_chronology() {
        // Smallest three are at positions 5, 1, 3 by value; the result
        // must come back in position order.
        let values = [9.0, 2.0, 8.0, 3.0, 7.0, 1.0];
        assert_eq!(lowest_in_order(&values, 3), vec![1, 3, 5]);
    }

    #[test]
    fn test_lowest_in_order_full_selection() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(lowest_in_order(&values, 3), vec![0, 1, 2]);
        assert_eq!(lowest_in_order(&values, 5), vec![0, 1, 2]);
    }

    #[test]
    fn test_forward_window_prefers_late_low_ci_slots() {
        // Workflow occupies hours 0 and 1; candidates decrease strictly,
        // so the two cheapest chronologically-ordered slots are the last
        // two of the window, not the first two encountered.
        let tasks = vec![test_task("a", 0, 2 * HOUR)];
        let mut p = partition(&tasks, 60).unwrap();
        let ci = hourly_series(&[800.0, 700.0, 600.0, 500.0, 400.0, 300.0, 200.0, 100.0]);

        let options = ShiftOptions {
            windows: vec![6],
            direction: ShiftDirection::Forward,
            lifetime_hours: Some(1000.0),
        };
        let report = explore(
            "wf",
            &tasks,
            &mut p,
            &ci,
            &settings(),
            &FixedImpact(10.0),
            "AMD EPYC 7551",
            &options,
        )
        .unwrap();

        assert!(report.skipped.is_empty());
        let outcome = &report.operational[0];
        // Baseline: 1 kWh/h at usage 100% -> P(1.0) = 200 W... cpu_usage
        // is 100 with 1 core -> fraction 1.0, 0.2 kWh per hour slice.
        // Baseline emissions: 0.2*800 + 0.2*700 = 300 g.
        assert!((report.baseline_emissions - 300.0).abs() < 1e-9);
        // Shifted onto the two cheapest slots (200, 100): 0.2*300 = 60 g.
        assert!((outcome.emissions - 60.0).abs() < 1e-9);
        assert!((outcome.saving_pct - 80.0).abs() < 1e-9);
        // The chosen slots are adjacent: no interruption overhead.
        assert_eq!(outcome.overhead_s, 0.0);
    }

    #[test]
    fn test_discontinuous_selection_charges_overhead() {
        // Workflow occupies hours 0 and 1 with a 30-minute tail into
        // hour 1 (overhead 1_800_000 ms at the first occupied bucket).
        let tasks = vec![test_task("a", 0, HOUR + HOUR / 2)];
        let mut p = partition(&tasks, 60).unwrap();
        // Cheap slots at positions 0 and 2 of the candidate range force a
        // gap in the chosen schedule.
        let ci = hourly_series(&[100.0, 900.0, 100.0, 900.0, 900.0, 900.0, 900.0, 900.0]);

        let options = ShiftOptions {
            windows: vec![6],
            direction: ShiftDirection::Forward,
            lifetime_hours: Some(1000.0),
        };
        let report = explore(
            "wf",
            &tasks,
            &mut p,
            &ci,
            &settings(),
            &FixedImpact(10.0),
            "AMD EPYC 7551",
            &options,
        )
        .unwrap();

        let outcome = &report.operational[0];
        // Interrupted after the first occupied bucket: its tail spills
        // 30 minutes.
        assert!((outcome.overhead_s - 1800.0).abs() < 1e-9);
        assert!((outcome.overhead_pct - 1800.0 / report.makespan_s * 100.0).abs() < 1e-9);

        // Embodied grows with the overhead-extended makespan, so the
        // "saving" is negative.
        let embodied = &report.embodied[0];
        assert!(embodied.saving_pct < 0.0);
        assert!(embodied.emissions > report.baseline_embodied);
    }

    #[test]
    fn test_window_exceeding_series_is_skipped_and_reported() {
        let tasks = vec![test_task("a", 0, 2 * HOUR)];
        let mut p = partition(&tasks, 60).unwrap();
        let ci = hourly_series(&[500.0, 400.0, 300.0, 200.0]);

        let options = ShiftOptions {
            windows: vec![6, 2],
            direction: ShiftDirection::Forward,
            lifetime_hours: Some(1000.0),
        };
        let report = explore(
            "wf",
            &tasks,
            &mut p,
            &ci,
            &settings(),
            &FixedImpact(10.0),
            "AMD EPYC 7551",
            &options,
        )
        .unwrap();

        // Window 6 needs slots past the series end; window 2 fits.
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 6);
        assert_eq!(report.operational.len(), 1);
        assert_eq!(report.operational[0].window, 2);
    }

    #[test]
    fn test_bidirectional_window_can_reach_earlier_slots() {
        // Workflow at hours 2..=3; the cheapest slots are before it.
        let tasks = vec![test_task("a", 2 * HOUR, 4 * HOUR)];
        let mut p = partition(&tasks, 60).unwrap();
        let ci = hourly_series(&[50.0, 60.0, 900.0, 900.0, 800.0, 700.0]);

        let options = ShiftOptions {
            windows: vec![2],
            direction: ShiftDirection::Bidirectional,
            lifetime_hours: Some(1000.0),
        };
        let report = explore(
            "wf",
            &tasks,
            &mut p,
            &ci,
            &settings(),
            &FixedImpact(10.0),
            "AMD EPYC 7551",
            &options,
        )
        .unwrap();

        let outcome = &report.operational[0];
        // Chosen slots: hours 0 and 1 (50 and 60): 0.2*(50+60) = 22 g.
        assert!((outcome.emissions - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_bidirectional_underflow_is_coverage_error() {
        let tasks = vec![test_task("a", 0, HOUR)];
        let mut p = partition(&tasks, 60).unwrap();
        let ci = hourly_series(&[500.0, 400.0, 300.0, 200.0, 100.0]);

        let options = ShiftOptions {
            windows: vec![2],
            direction: ShiftDirection::Bidirectional,
            lifetime_hours: Some(1000.0),
        };
        let report = explore(
            "wf",
            &tasks,
            &mut p,
            &ci,
            &settings(),
            &FixedImpact(10.0),
            "AMD EPYC 7551",
            &options,
        )
        .unwrap();
        // start_pos - 2 underflows: skipped, never clamped.
        assert_eq!(report.skipped.len(), 1);
        assert!(report.operational.is_empty());
    }
}
