//! Report rendering and file writers
//!
//! Renders the footprint summary text, the per-task trace CSV, the ranked
//! task report and the temporal shift CSV pair. Rendering is separated from
//! writing so tests can assert on strings without touching the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use crate::energy::OperationalFootprint;
use crate::error::Result;
use crate::record::{MergedRecord, MERGED_RECORD_HEADERS};
use crate::shift::{ShiftOutcome, ShiftReport};

/// Inputs echoed at the top of the summary so a report is self-describing.
#[derive(Debug, Clone)]
pub struct SummaryContext {
    pub ci_label: String,
    pub pue: f64,
    pub model_name: String,
    pub memory_coefficient: f64,
}

/// Render the footprint summary text block.
pub fn render_summary(
    ctx: &SummaryContext,
    footprint: &OperationalFootprint,
    embodied_emissions: f64,
    reserved: Option<(f64, f64)>,
) -> String {
    let total = footprint.carbon_emissions + embodied_emissions;

    let mut out = String::new();
    out.push_str("Carbon Footprint Trace:\n");
    out.push_str(&format!("- carbon-intensity: {}\n", ctx.ci_label));
    out.push_str(&format!("- power-usage-effectiveness: {}\n", ctx.pue));
    out.push_str(&format!("- power model selected: {}\n", ctx.model_name));
    out.push_str(&format!(
        "- memory-power-draw: {}\n\n",
        ctx.memory_coefficient
    ));

    out.push_str("Cloud Carbon Footprint Method:\n");
    out.push_str(&format!(
        "- Energy Consumption (exc. PUE): {}kWh\n",
        footprint.cpu_energy
    ));
    out.push_str(&format!(
        "- Energy Consumption (inc. PUE): {}kWh\n",
        footprint.cpu_energy_pue
    ));
    out.push_str(&format!(
        "- Memory Energy Consumption (exc. PUE): {}kWh\n",
        footprint.memory_energy
    ));
    out.push_str(&format!(
        "- Memory Energy Consumption (inc. PUE): {}kWh\n",
        footprint.memory_energy_pue
    ));
    out.push_str(&format!(
        "- Operational Carbon Emissions: {}gCO2e\n",
        footprint.carbon_emissions
    ));
    out.push_str(&format!(
        "- Embodied Carbon Emissions: {}gCO2e\n",
        embodied_emissions
    ));
    out.push_str(&format!("- Total Carbon Emissions: {}gCO2e\n\n", total));

    if let Some((reserved_kwh, reserved_g)) = reserved {
        let total_energy = reserved_kwh + footprint.cpu_energy + footprint.memory_energy;
        out.push_str(&format!(
            "Reserved Memory Energy Consumption: {reserved_kwh}kWh\n"
        ));
        out.push_str(&format!(
            "Reserved Memory Carbon Emissions: {reserved_g}gCO2e\n"
        ));
        out.push_str(&format!(
            "% CPU [{:.2}%] | % Memory [{:.2}%]\n",
            footprint.cpu_energy / total_energy * 100.0,
            (reserved_kwh + footprint.memory_energy) / total_energy * 100.0,
        ));
    }

    out
}

/// Render merged task records as a trace CSV.
pub fn render_trace_csv(records: &[MergedRecord]) -> String {
    let mut out = String::new();
    out.push_str(MERGED_RECORD_HEADERS);
    out.push('\n');
    for record in records {
        out.push_str(&record.to_csv_row());
        out.push('\n');
    }
    out
}

/// Render the ranked task report: the top tasks by footprint and by energy,
/// and whether the two rankings agree.
pub fn render_rank_report(workflow: &str, records: &[MergedRecord], top_n: usize) -> String {
    let mut by_footprint: Vec<&MergedRecord> = records.iter().collect();
    by_footprint.sort_by(|a, b| {
        (b.co2e, b.energy, b.realtime)
            .partial_cmp(&(a.co2e, a.energy, a.realtime))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut by_energy: Vec<&MergedRecord> = records.iter().collect();
    by_energy.sort_by(|a, b| {
        (b.energy, b.realtime)
            .partial_cmp(&(a.energy, a.realtime))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top_footprint = &by_footprint[..top_n.min(by_footprint.len())];
    let top_energy = &by_energy[..top_n.min(by_energy.len())];

    let mut out = String::new();
    out.push_str(&format!("Detailed Report for {workflow}\n"));

    out.push_str(&format!(
        "\nTop {top_n} Tasks - ranked by footprint, energy and realtime:\n"
    ));
    out.push_str(&format!("\n{MERGED_RECORD_HEADERS}\n"));
    for record in top_footprint {
        out.push_str(&record.to_csv_row());
        out.push('\n');
    }

    out.push_str(&format!(
        "\nTop {top_n} Tasks - ranked by energy and realtime:\n"
    ));
    out.push_str(&format!("\n{MERGED_RECORD_HEADERS}\n"));
    for record in top_energy {
        out.push_str(&record.to_csv_row());
        out.push('\n');
    }

    let energy_ids: Vec<&str> = top_energy.iter().map(|r| r.id.as_str()).collect();
    let only_footprint: Vec<String> = top_footprint
        .iter()
        .filter(|r| !energy_ids.contains(&r.id.as_str()))
        .map(|r| format!("{}:{}", r.name, r.id))
        .collect();
    if only_footprint.is_empty() {
        out.push_str(
            "\nThe top tasks with the largest energy and realtime have the largest footprint.\n",
        );
    } else {
        out.push_str(
            "\nThe following tasks have one of the largest footprints, but not the highest energy or realtime:\n",
        );
        out.push_str(&only_footprint.join(", "));
        out.push('\n');
    }

    out
}

fn shift_cell(outcome: &ShiftOutcome) -> String {
    format!(
        "{:.1}%:{}:{}|{:.1}%",
        outcome.saving_pct, outcome.emissions, outcome.overhead_s, outcome.overhead_pct
    )
}

fn shift_row(
    workflow: &str,
    baseline: f64,
    makespan_s: f64,
    windows: &[usize],
    outcomes: &[ShiftOutcome],
) -> String {
    let mut cells = vec![workflow.to_string(), baseline.to_string(), makespan_s.to_string()];
    for &window in windows {
        match outcomes.iter().find(|o| o.window == window) {
            Some(outcome) => cells.push(shift_cell(outcome)),
            // Skipped window: the CI series did not cover it.
            None => cells.push("-".to_string()),
        }
    }
    cells.join(",")
}

fn shift_header(label: &str, windows: &[usize]) -> String {
    let mut headers = vec!["workflow".to_string(), label.to_string(), "makespan".to_string()];
    for &window in windows {
        headers.push(format!("flexible-{window}h"));
    }
    headers.join(",")
}

/// Render the operational and embodied shift CSVs for a set of workflow
/// reports sharing one window list.
pub fn render_shift_csvs(reports: &[ShiftReport], windows: &[usize]) -> (String, String) {
    let mut op = shift_header("footprint", windows);
    op.push('\n');
    let mut emb = shift_header("embodied-carbon", windows);
    emb.push('\n');

    for report in reports {
        op.push_str(&shift_row(
            &report.workflow,
            report.baseline_emissions,
            report.makespan_s,
            windows,
            &report.operational,
        ));
        op.push('\n');
        emb.push_str(&shift_row(
            &report.workflow,
            report.baseline_embodied,
            report.makespan_s,
            windows,
            &report.embodied,
        ));
        emb.push('\n');
    }

    (op, emb)
}

/// Write a report file under `folder`, creating the folder if needed.
pub fn write_report<P: AsRef<Path>>(folder: P, file_name: &str, content: &str) -> Result<PathBuf> {
    let folder = folder.as_ref();
    fs::create_dir_all(folder)?;
    let path = folder.join(file_name);
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(id: &str, co2e: f64, energy: f64, realtime: i64) -> MergedRecord {
        MergedRecord {
            id: id.to_string(),
            name: format!("task_{id}"),
            realtime,
            energy,
            co2e,
            avg_ci: "400".to_string(),
            cpu_model: None,
            core_count: 1,
            cpu_usage: 100.0,
            memory: None,
        }
    }

    fn footprint() -> OperationalFootprint {
        OperationalFootprint {
            cpu_energy: 1.0,
            cpu_energy_pue: 1.5,
            memory_energy: 0.5,
            memory_energy_pue: 0.75,
            carbon_emissions: 500.0,
            node_memory_spans: Vec::new(),
        }
    }

    #[test]
    fn test_summary_lists_energy_and_emissions() {
        let ctx = SummaryContext {
            ci_label: "ci-uk-2024".to_string(),
            pue: 1.2,
            model_name: "local_ondemand_linear".to_string(),
            memory_coefficient: 0.392,
        };
        let summary = render_summary(&ctx, &footprint(), 100.0, None);
        assert!(summary.starts_with("Carbon Footprint Trace:\n"));
        assert!(summary.contains("- Energy Consumption (inc. PUE): 1.5kWh"));
        assert!(summary.contains("- Operational Carbon Emissions: 500gCO2e"));
        assert!(summary.contains("- Embodied Carbon Emissions: 100gCO2e"));
        assert!(summary.contains("- Total Carbon Emissions: 600gCO2e"));
        assert!(!summary.contains("Reserved Memory"));
    }

    #[test]
    fn test_summary_reserved_memory_split() {
        let ctx = SummaryContext {
            ci_label: "400".to_string(),
            pue: 1.0,
            model_name: "local_ondemand_linear".to_string(),
            memory_coefficient: 0.392,
        };
        // cpu 1.0 + mem 0.5 + reserved 0.5 = 2.0 total: 50% cpu, 50% memory.
        let summary = render_summary(&ctx, &footprint(), 0.0, Some((0.5, 200.0)));
        assert!(summary.contains("Reserved Memory Energy Consumption: 0.5kWh"));
        assert!(summary.contains("Reserved Memory Carbon Emissions: 200gCO2e"));
        assert!(summary.contains("% CPU [50.00%] | % Memory [50.00%]"));
    }

    #[test]
    fn test_trace_csv_header_and_rows() {
        let csv = render_trace_csv(&[merged("a", 10.0, 0.1, 1000)]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(MERGED_RECORD_HEADERS));
        assert_eq!(
            lines.next(),
            Some("task_a,a,10,0.1,400,1000,-,1,100,-")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_rank_report_orders_by_footprint_then_energy() {
        // "b" has the biggest footprint, "a" the biggest energy.
        let records = vec![
            merged("a", 5.0, 0.9, 100),
            merged("b", 9.0, 0.1, 100),
            merged("c", 1.0, 0.2, 100),
        ];
        let report = render_rank_report("wf", &records, 2);
        let footprint_section = report
            .split("ranked by energy and realtime")
            .next()
            .unwrap();
        assert!(footprint_section.contains("task_b"));
        assert!(footprint_section.contains("task_a"));
        assert!(!footprint_section.contains("task_c"));
        // "b" is top-2 by footprint but not top-2 by energy... a and c lead
        // on energy, so the divergence note names b.
        assert!(report.contains("not the highest energy or realtime"));
        assert!(report.contains("task_b:b"));
    }

    #[test]
    fn test_rank_report_agreeing_rankings() {
        let records = vec![merged("a", 9.0, 0.9, 100), merged("b", 1.0, 0.1, 100)];
        let report = render_rank_report("wf", &records, 2);
        assert!(report.contains("have the largest footprint."));
    }

    #[test]
    fn test_shift_csv_layout() {
        let report = ShiftReport {
            workflow: "wf".to_string(),
            baseline_emissions: 300.0,
            baseline_embodied: 12.0,
            makespan_s: 7200.0,
            operational: vec![ShiftOutcome {
                window: 6,
                saving_pct: 80.0,
                emissions: 60.0,
                overhead_s: 0.0,
                overhead_pct: 0.0,
            }],
            embodied: vec![ShiftOutcome {
                window: 6,
                saving_pct: 0.0,
                emissions: 12.0,
                overhead_s: 0.0,
                overhead_pct: 0.0,
            }],
            skipped: vec![(12, "insufficient coverage".to_string())],
        };
        let (op, emb) = render_shift_csvs(&[report], &[6, 12]);

        let mut op_lines = op.lines();
        assert_eq!(
            op_lines.next(),
            Some("workflow,footprint,makespan,flexible-6h,flexible-12h")
        );
        assert_eq!(op_lines.next(), Some("wf,300,7200,80.0%:60:0|0.0%,-"));

        let mut emb_lines = emb.lines();
        assert_eq!(
            emb_lines.next(),
            Some("workflow,embodied-carbon,makespan,flexible-6h,flexible-12h")
        );
        assert_eq!(emb_lines.next(), Some("wf,12,7200,0.0%:12:0|0.0%,-"));
    }

    #[test]
    fn test_write_report_creates_folder() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out");
        let path = write_report(&nested, "wf-summary.txt", "hello").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }
}
