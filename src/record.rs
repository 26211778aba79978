//! Task records, interval slices and merge-by-id aggregation
//!
//! `TaskRecord` is the canonical, immutable view of one task from the trace.
//! The partitioner never copies or mutates it; per-bucket views are
//! `TaskSlice` values referencing the canonical table by index, so the
//! "original list is never mutated" invariant holds structurally.

use std::collections::HashMap;

use serde::Serialize;

/// One computational task's resource usage over its lifetime.
///
/// Timestamps are milliseconds since epoch with `start <= complete`
/// (enforced at ingestion). `cpu_usage` follows the system-wide reporting
/// convention and may exceed 100 when a task uses multiple cores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub start: i64,
    pub complete: i64,
    /// Reported duration in ms; normally `complete - start`.
    pub realtime: i64,
    pub core_count: u32,
    pub cpu_usage: f64,
    pub cpu_model: Option<String>,
    /// Bytes of memory used; resolved from rss at parse time when absent.
    pub memory: Option<f64>,
}

impl TaskRecord {
    /// Wall-clock span of the task in ms.
    pub fn span_ms(&self) -> i64 {
        self.complete - self.start
    }
}

/// A sub-interval view of a task produced by the partitioner.
///
/// `task` indexes the canonical task table; `[start, end)` is the slice of
/// the task's span falling inside one bucket. The estimator populates
/// `energy` (kWh, PUE-adjusted), `co2e` (g) and `avg_ci` in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSlice {
    pub task: usize,
    pub start: i64,
    pub end: i64,
    pub energy: f64,
    pub co2e: f64,
    pub avg_ci: Option<f64>,
}

impl TaskSlice {
    pub fn new(task: usize, start: i64, end: i64) -> Self {
        Self {
            task,
            start,
            end,
            energy: 0.0,
            co2e: 0.0,
            avg_ci: None,
        }
    }

    /// Duration of this slice in ms.
    pub fn realtime(&self) -> i64 {
        self.end - self.start
    }
}

/// Post-aggregation view of one logical task, merged across all of its
/// slices. Numeric fields are summed; the CI values applied to each slice
/// are pipe-joined in chronological order.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub id: String,
    pub name: String,
    pub realtime: i64,
    pub energy: f64,
    pub co2e: f64,
    pub avg_ci: String,
    pub cpu_model: Option<String>,
    pub core_count: u32,
    pub cpu_usage: f64,
    pub memory: Option<f64>,
}

/// CSV header matching [`MergedRecord::to_csv_row`].
pub const MERGED_RECORD_HEADERS: &str =
    "name,id,co2e,energy,avg_ci,realtime,cpu_model,core_count,cpu_usage,memory";

impl MergedRecord {
    pub fn to_csv_row(&self) -> String {
        let memory = self
            .memory
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.name,
            self.id,
            self.co2e,
            self.energy,
            self.avg_ci,
            self.realtime,
            self.cpu_model.as_deref().unwrap_or("-"),
            self.core_count,
            self.cpu_usage,
            memory,
        )
    }
}

/// Merge estimator-annotated slices into one record per task id.
///
/// Applied exactly once, after all bucket-level slices are finalized.
/// Reducers are associative: sum for `energy`/`co2e`/`realtime`, pipe-join
/// for `avg_ci`. Slices must be supplied in chronological order so the
/// joined CI list reads in time order. Output preserves first-seen order.
pub fn merge_by_id<'a, I>(tasks: &[TaskRecord], slices: I) -> Vec<MergedRecord>
where
    I: IntoIterator<Item = &'a TaskSlice>,
{
    let mut merged: Vec<MergedRecord> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for slice in slices {
        let task = &tasks[slice.task];
        let ci_repr = slice
            .avg_ci
            .map(|ci| ci.to_string())
            .unwrap_or_else(|| "-".to_string());

        match by_id.get(&task.id) {
            Some(&pos) => {
                let entry = &mut merged[pos];
                entry.realtime += slice.realtime();
                entry.energy += slice.energy;
                entry.co2e += slice.co2e;
                entry.avg_ci.push('|');
                entry.avg_ci.push_str(&ci_repr);
            }
            None => {
                by_id.insert(task.id.clone(), merged.len());
                merged.push(MergedRecord {
                    id: task.id.clone(),
                    name: task.name.clone(),
                    realtime: slice.realtime(),
                    energy: slice.energy,
                    co2e: slice.co2e,
                    avg_ci: ci_repr,
                    cpu_model: task.cpu_model.clone(),
                    core_count: task.core_count,
                    cpu_usage: task.cpu_usage,
                    memory: task.memory,
                });
            }
        }
    }

    merged
}

#[cfg(test)]
pub(crate) fn test_task(id: &str, start: i64, complete: i64) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        name: format!("task_{id}"),
        start,
        complete,
        realtime: complete - start,
        core_count: 1,
        cpu_usage: 100.0,
        cpu_model: None,
        memory: None,
    }
}
