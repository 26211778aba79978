//! End-to-end CLI tests against real trace, profile and CI files.
#![allow(deprecated)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const NODES_JSON: &str = r#"{
    "gpg13": {
        "performance": {
            "min_watts": 65.0,
            "max_watts": 220.0,
            "linear": [155.0, 65.0],
            "cpu_model": "AMD EPYC 7551",
            "mem_draw": 0.392
        }
    }
}"#;

// One task running flat-out for the first hour of 1970.
const TRACE_CSV: &str = "task_id,name,start,complete,realtime,cpus,%cpu,cpu_model,memory\n\
                         1,align,0,3600000,3600000,1,100%,AMD EPYC 7551,-\n";

fn write_fixtures(dir: &Path) {
    fs::write(dir.join("nodes.json"), NODES_JSON).unwrap();
    fs::write(dir.join("workflow.csv"), TRACE_CSV).unwrap();
}

fn ichnos() -> Command {
    Command::cargo_bin("ichnos").unwrap()
}

#[test]
fn test_cli_help() {
    ichnos()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_footprint_requires_trace() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    ichnos()
        .arg("footprint")
        .arg("--ci")
        .arg("400")
        .arg("--node-config")
        .arg(dir.path().join("nodes.json"))
        .arg("--model-name")
        .arg("gpg13_performance_linear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no trace file"));
}

#[test]
fn test_footprint_rejects_ci_and_ci_file_together() {
    ichnos()
        .arg("footprint")
        .arg("--ci")
        .arg("400")
        .arg("--ci-file")
        .arg("ci.csv")
        .assert()
        .failure();
}

#[test]
fn test_footprint_writes_summary_and_trace_reports() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let out = dir.path().join("out");

    ichnos()
        .arg("footprint")
        .arg("--trace")
        .arg(dir.path().join("workflow.csv"))
        .arg("--ci")
        .arg("400")
        .arg("--node-config")
        .arg(dir.path().join("nodes.json"))
        .arg("--model-name")
        .arg("gpg13_performance_linear")
        .arg("--cpu-impact-kg")
        .arg("10")
        .arg("--out-folder")
        .arg(&out)
        .assert()
        .success()
        // 1 h at 100% on the linear model: 220 W -> 0.22 kWh at CI 400.
        .stdout(predicate::str::contains("Operational Carbon Emissions: 88gCO2e"))
        .stdout(predicate::str::contains("Total Carbon Emissions"));

    let prefix = "workflow-gpg13_performance_linear";
    let summary = fs::read_to_string(out.join(format!("{prefix}-summary.txt"))).unwrap();
    assert!(summary.starts_with("Carbon Footprint Trace:"));
    assert!(summary.contains("- power model selected: gpg13_performance_linear"));

    let trace = fs::read_to_string(out.join(format!("{prefix}-trace.csv"))).unwrap();
    assert!(trace.starts_with("name,id,"));
    assert!(trace.contains("align,1,"));

    let detailed =
        fs::read_to_string(out.join(format!("{prefix}-detailed-summary.txt"))).unwrap();
    assert!(detailed.contains("Top 10 Tasks"));
}

#[test]
fn test_footprint_reads_settings_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let out = dir.path().join("out");

    let config = format!(
        "trace_file = \"{}\"\n\
         node_config = \"{}\"\n\
         model_name = \"gpg13_performance_linear\"\n\
         ci = 400.0\n\
         cpu_impact_kg = 10.0\n\
         out_folder = \"{}\"\n\
         workflow_name = \"configured\"\n",
        dir.path().join("workflow.csv").display(),
        dir.path().join("nodes.json").display(),
        out.display(),
    );
    let config_path = dir.path().join("run.toml");
    fs::write(&config_path, config).unwrap();

    ichnos()
        .arg("--config")
        .arg(&config_path)
        .arg("footprint")
        .assert()
        .success()
        .stdout(predicate::str::contains("Operational Carbon Emissions: 88gCO2e"));

    assert!(out
        .join("configured-gpg13_performance_linear-summary.txt")
        .exists());
}

#[test]
fn test_shift_reports_windows_and_writes_csv_pair() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let out = dir.path().join("out");

    // Hourly CI for the first day of 1970, falling through the morning:
    // any forward shift finds a cheaper slot.
    let mut ci = String::from("date,start,actual\n");
    for hour in 0..10 {
        ci.push_str(&format!("1970-1-1,{hour:02}:00,{}\n", 500 - hour * 50));
    }
    fs::write(dir.path().join("ci.csv"), ci).unwrap();

    ichnos()
        .arg("shift")
        .arg("--trace")
        .arg(dir.path().join("workflow.csv"))
        .arg("--ci-file")
        .arg(dir.path().join("ci.csv"))
        .arg("--node-config")
        .arg(dir.path().join("nodes.json"))
        .arg("--model-name")
        .arg("gpg13_performance_linear")
        .arg("--cpu-impact-kg")
        .arg("10")
        .arg("--windows")
        .arg("6")
        .arg("--out-folder")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("flexible-6h"));

    let prefix = "workflow-gpg13_performance_linear";
    let op = fs::read_to_string(out.join(format!("{prefix}-ts.csv"))).unwrap();
    assert!(op.starts_with("workflow,footprint,makespan,flexible-6h"));
    assert!(op.contains("workflow,")); // one data row for the workflow

    let emb = fs::read_to_string(out.join(format!("{prefix}-ts-emb.csv"))).unwrap();
    assert!(emb.starts_with("workflow,embodied-carbon,makespan,flexible-6h"));
}

#[test]
fn test_shift_requires_a_ci_series() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    ichnos()
        .arg("shift")
        .arg("--trace")
        .arg(dir.path().join("workflow.csv"))
        .arg("--ci")
        .arg("400")
        .arg("--node-config")
        .arg(dir.path().join("nodes.json"))
        .arg("--model-name")
        .arg("gpg13_performance_linear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("carbon intensity series"));
}

#[test]
fn test_embodied_with_fixed_impact() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    ichnos()
        .arg("embodied")
        .arg("--trace")
        .arg(dir.path().join("workflow.csv"))
        .arg("--cpu-impact-kg")
        .arg("10")
        .assert()
        .success()
        .stdout(predicate::str::contains("Embodied Carbon for workflow:"));
}
