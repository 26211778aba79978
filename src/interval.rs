//! Interval partitioning with interruption-overhead tracking
//!
//! Splits tasks with arbitrary start/end timestamps into fixed-width time
//! buckets. A task straddling a bucket boundary is represented by partial
//! slices, one per overlapped bucket, referencing the canonical task table
//! by index. The union of a task's slices reconstructs its `[start,
//! complete)` span exactly: contiguous, no gaps, no double counting.
//!
//! Each bucket also records an interruption overhead: the longest
//! boundary-unaligned tail of any task that starts inside the bucket but
//! completes in a later one. That tail is the wall-clock cost of pausing
//! the workflow at the bucket boundary, because a task in progress cannot
//! be split losslessly there.

use std::collections::BTreeMap;

use crate::error::{IchnosError, Result};
use crate::record::{TaskRecord, TaskSlice};

/// Tasks bucketed by fixed-width interval, with per-bucket overheads.
///
/// `buckets` covers every interval from one step before the floored
/// earliest start to one step after the floored latest completion, empty
/// buckets included; `overheads` is parallel to the buckets in ascending
/// key order.
#[derive(Debug, Clone)]
pub struct IntervalPartition {
    pub buckets: BTreeMap<i64, Vec<TaskSlice>>,
    pub overheads: Vec<i64>,
    pub workflow_start: i64,
    pub workflow_end: i64,
    pub step_ms: i64,
}

impl IntervalPartition {
    /// Buckets that contain at least one slice, in chronological order.
    pub fn occupied(&self) -> impl Iterator<Item = (i64, &Vec<TaskSlice>)> {
        self.buckets
            .iter()
            .filter(|(_, slices)| !slices.is_empty())
            .map(|(&ts, slices)| (ts, slices))
    }

    /// `(bucket timestamp, overhead ms)` for each occupied bucket, in
    /// chronological order. This is the sequence the shift explorer
    /// charges at schedule discontinuities.
    pub fn occupied_overheads(&self) -> Vec<(i64, i64)> {
        self.buckets
            .iter()
            .zip(self.overheads.iter())
            .filter(|((_, slices), _)| !slices.is_empty())
            .map(|((&ts, _), &overhead)| (ts, overhead))
            .collect()
    }

    /// Workflow makespan in seconds.
    pub fn makespan_s(&self) -> f64 {
        (self.workflow_end - self.workflow_start) as f64 / 1000.0
    }
}

/// Floor a millisecond timestamp to interval-minute granularity.
pub fn floor_to_interval(ms: i64, interval_minutes: i64) -> i64 {
    let step = interval_minutes * 60_000;
    ms - ms.rem_euclid(step)
}

/// Partition tasks into `interval_minutes`-wide buckets.
///
/// Iteration extends one interval-width before and after the floored task
/// span. Omitting that margin would silently drop or truncate tasks
/// straddling the outermost boundaries.
///
/// Each task is classified against each bucket `[i, i + step)` by four
/// mutually exclusive cases:
/// 1. entirely contained: slice `[start, complete)`;
/// 2. started earlier, ends inside: slice `[i, complete)`;
/// 3. starts inside, ends later: slice `[start, i + step)` and an
///    overhead candidate for this bucket;
/// 4. spans the whole bucket: slice `[i, i + step)`.
///
/// A task touching neither side of the bucket is excluded from it. The
/// case-3 overhead candidate is the task's completion tail beyond its last
/// crossed boundary (`complete - floor(complete)`); a task completing
/// exactly on a boundary leaves no tail and no overhead.
pub fn partition(tasks: &[TaskRecord], interval_minutes: i64) -> Result<IntervalPartition> {
    if tasks.is_empty() {
        return Err(IchnosError::Configuration(
            "cannot partition an empty task list".to_string(),
        ));
    }
    if interval_minutes <= 0 {
        return Err(IchnosError::Configuration(format!(
            "interval must be positive, got {interval_minutes} minutes"
        )));
    }

    let step = interval_minutes * 60_000;
    // Non-empty input, so the min/max always exist.
    let earliest = tasks.iter().map(|t| t.start).min().unwrap_or(0);
    let latest = tasks.iter().map(|t| t.complete).max().unwrap_or(0);

    let first = floor_to_interval(earliest, interval_minutes) - step;
    let last = floor_to_interval(latest, interval_minutes) + step;

    let mut buckets = BTreeMap::new();
    let mut overheads = Vec::new();

    let mut i = first;
    while i <= last {
        let bucket_end = i + step;
        let mut slices = Vec::new();
        let mut spill: i64 = 0;

        for (index, task) in tasks.iter().enumerate() {
            let (start, complete) = (task.start, task.complete);
            if start >= i && complete <= bucket_end {
                slices.push(TaskSlice::new(index, start, complete));
            } else if start < i && complete > i && complete <= bucket_end {
                slices.push(TaskSlice::new(index, i, complete));
            } else if start >= i && start < bucket_end && complete > bucket_end {
                slices.push(TaskSlice::new(index, start, bucket_end));
                let tail = complete - floor_to_interval(complete, interval_minutes);
                if tail > spill {
                    spill = tail;
                }
            } else if start < i && complete > bucket_end {
                slices.push(TaskSlice::new(index, i, bucket_end));
            }
        }

        buckets.insert(i, slices);
        overheads.push(spill);
        i += step;
    }

    Ok(IntervalPartition {
        buckets,
        overheads,
        workflow_start: earliest,
        workflow_end: latest,
        step_ms: step,
    })
}
