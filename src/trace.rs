//! Trace file parsing
//!
//! Reads nextflow-style delimited trace files into [`TaskRecord`]s. Parsing
//! is header-driven: columns are located by name, so field order does not
//! matter. Absent values are written as `-` in these traces; `memory` falls
//! back to `rss` and `cpus` defaults to 1. Tasks with `start > complete`
//! are rejected here so the partitioner can assume validated input.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{IchnosError, Result};
use crate::record::TaskRecord;

/// Column indexes resolved from a trace header row.
struct TraceColumns {
    task_id: usize,
    name: usize,
    start: usize,
    complete: usize,
    realtime: Option<usize>,
    cpus: Option<usize>,
    cpu_usage: usize,
    cpu_model: Option<usize>,
    memory: Option<usize>,
    rss: Option<usize>,
}

impl TraceColumns {
    fn resolve(header: &str, delimiter: char, file: &str) -> Result<Self> {
        let fields: Vec<&str> = header.split(delimiter).map(str::trim).collect();
        let find = |name: &str| fields.iter().position(|f| *f == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| IchnosError::Malformed {
                file: file.to_string(),
                reason: format!("missing required column '{name}'"),
            })
        };

        Ok(Self {
            task_id: require("task_id")?,
            name: require("name")?,
            start: require("start")?,
            complete: require("complete")?,
            realtime: find("realtime"),
            cpus: find("cpus"),
            cpu_usage: require("%cpu")?,
            cpu_model: find("cpu_model"),
            memory: find("memory"),
            rss: find("rss"),
        })
    }
}

/// Parse a trace file into task records.
pub fn parse_trace_file<P: AsRef<Path>>(path: P, delimiter: char) -> Result<Vec<TaskRecord>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let file = path.display().to_string();

    let mut lines = contents.lines();
    let header = lines.next().ok_or_else(|| IchnosError::Malformed {
        file: file.clone(),
        reason: "empty trace file".to_string(),
    })?;
    let columns = TraceColumns::resolve(header, delimiter, &file)?;

    let mut records = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_row(line, delimiter, &columns).map_err(|e| match e {
            IchnosError::InvalidTaskSpan { .. } => e,
            other => IchnosError::Malformed {
                file: file.clone(),
                reason: format!("row {}: {other}", line_no + 2),
            },
        })?;
        records.push(record);
    }

    debug!(file = %file, tasks = records.len(), "parsed trace file");
    Ok(records)
}

fn parse_row(line: &str, delimiter: char, columns: &TraceColumns) -> Result<TaskRecord> {
    let parts: Vec<&str> = line.split(delimiter).map(str::trim).collect();
    let field = |i: usize| -> Result<&str> {
        parts.get(i).copied().ok_or_else(|| IchnosError::Malformed {
            file: String::new(),
            reason: format!("too few columns ({} present)", parts.len()),
        })
    };

    let id = field(columns.task_id)?.to_string();
    let name = field(columns.name)?.to_string();
    let start = parse_ms(field(columns.start)?, "start")?;
    let complete = parse_ms(field(columns.complete)?, "complete")?;
    if start > complete {
        return Err(IchnosError::InvalidTaskSpan {
            id,
            start,
            complete,
        });
    }

    let realtime = match columns.realtime {
        Some(i) => parse_ms(field(i)?, "realtime")?,
        None => complete - start,
    };

    let core_count = match columns.cpus {
        Some(i) => {
            let raw = field(i)?;
            if raw == "-" {
                1
            } else {
                raw.parse::<u32>().map_err(|_| malformed("cpus", raw))?
            }
        }
        None => 1,
    };

    // %cpu is reported as "x.y%"; an empty value means an unmeasured task.
    let raw_usage = field(columns.cpu_usage)?;
    let trimmed = raw_usage.strip_suffix('%').unwrap_or(raw_usage);
    let cpu_usage = if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse::<f64>().map_err(|_| malformed("%cpu", raw_usage))?
    };

    let cpu_model = match columns.cpu_model {
        Some(i) => {
            let raw = field(i)?;
            if raw == "-" || raw.is_empty() {
                None
            } else {
                Some(raw.to_string())
            }
        }
        None => None,
    };

    let memory = parse_optional_bytes(columns.memory, &parts, "memory")?;
    let rss = parse_optional_bytes(columns.rss, &parts, "rss")?;

    Ok(TaskRecord {
        id,
        name,
        start,
        complete,
        realtime,
        core_count,
        cpu_usage,
        cpu_model,
        memory: memory.or(rss),
    })
}

fn parse_optional_bytes(
    column: Option<usize>,
    parts: &[&str],
    what: &str,
) -> Result<Option<f64>> {
    let Some(i) = column else { return Ok(None) };
    let Some(raw) = parts.get(i).copied() else {
        return Ok(None);
    };
    if raw == "-" || raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| malformed(what, raw))
}

fn parse_ms(raw: &str, what: &str) -> Result<i64> {
    // Some trace writers emit durations as floats.
    raw.parse::<i64>()
        .or_else(|_| raw.parse::<f64>().map(|v| v as i64))
        .map_err(|_| malformed(what, raw))
}

fn malformed(what: &str, raw: &str) -> IchnosError {
    IchnosError::Malformed {
        file: String::new(),
        reason: format!("unparseable {what} value '{raw}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_trace(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const HEADER: &str = "task_id,name,start,complete,realtime,cpus,%cpu,cpu_model,memory,rss";

    #[test]
    fn test_parses_basic_row() {
        let f = write_trace(&format!(
            "{HEADER}\n1,align,0,3600000,3600000,4,250.5%,AMD EPYC 7551,2147483648,1073741824\n"
        ));
        let records = parse_trace_file(f.path(), ',').unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "1");
        assert_eq!(r.name, "align");
        assert_eq!(r.start, 0);
        assert_eq!(r.complete, 3_600_000);
        assert_eq!(r.core_count, 4);
        assert!((r.cpu_usage - 250.5).abs() < 1e-9);
        assert_eq!(r.cpu_model.as_deref(), Some("AMD EPYC 7551"));
        assert_eq!(r.memory, Some(2_147_483_648.0));
    }

    #[test]
    fn test_memory_falls_back_to_rss() {
        let f = write_trace(&format!(
            "{HEADER}\n1,align,0,1000,1000,1,50%,-,-,1073741824\n"
        ));
        let records = parse_trace_file(f.path(), ',').unwrap();
        assert_eq!(records[0].memory, Some(1_073_741_824.0));
        assert_eq!(records[0].cpu_model, None);
    }

    #[test]
    fn test_dash_cpus_defaults_to_one() {
        let f = write_trace(&format!("{HEADER}\n1,align,0,1000,1000,-,50%,-,-,-\n"));
        let records = parse_trace_file(f.path(), ',').unwrap();
        assert_eq!(records[0].core_count, 1);
        assert_eq!(records[0].memory, None);
    }

    #[test]
    fn test_empty_cpu_usage_is_zero() {
        let f = write_trace(&format!("{HEADER}\n1,align,0,1000,1000,1,%,-,-,-\n"));
        let records = parse_trace_file(f.path(), ',').unwrap();
        assert_eq!(records[0].cpu_usage, 0.0);
    }

    #[test]
    fn test_inverted_span_is_rejected() {
        let f = write_trace(&format!("{HEADER}\n1,align,2000,1000,1000,1,50%,-,-,-\n"));
        let err = parse_trace_file(f.path(), ',').unwrap_err();
        assert!(matches!(err, IchnosError::InvalidTaskSpan { .. }));
    }

    #[test]
    fn test_missing_column_is_reported() {
        let f = write_trace("task_id,name,start\n1,align,0\n");
        let err = parse_trace_file(f.path(), ',').unwrap_err();
        assert!(err.to_string().contains("complete"));
    }

    #[test]
    fn test_header_order_does_not_matter() {
        let f = write_trace("name,%cpu,complete,start,task_id\nalign,80%,1000,0,7\n");
        let records = parse_trace_file(f.path(), ',').unwrap();
        assert_eq!(records[0].id, "7");
        assert_eq!(records[0].realtime, 1_000);
    }
}
