//! CLI argument parsing for Ichnos

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::shift::ShiftDirection;

#[derive(Parser, Debug)]
#[command(name = "ichnos")]
#[command(version)]
#[command(about = "Workflow carbon footprint estimator with temporal shift analysis", long_about = None)]
pub struct Cli {
    /// Enable debug logging to stderr
    #[arg(short, long)]
    pub debug: bool,

    /// TOML settings file; command-line options override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate a workflow's operational and embodied carbon footprint
    Footprint(FootprintArgs),
    /// Explore emissions savings from shifting a workflow in time
    Shift(ShiftArgs),
    /// Report embodied carbon for the CPUs a trace ran on
    Embodied(EmbodiedArgs),
}

/// Options shared by every subcommand that reads a workflow trace.
#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Workflow trace file (delimited, with a header row)
    #[arg(short, long, value_name = "FILE")]
    pub trace: Option<PathBuf>,

    /// Field delimiter of the trace file
    #[arg(long, value_name = "CHAR")]
    pub trace_delimiter: Option<char>,

    /// Workflow name used in reports; defaults to the trace file stem
    #[arg(short, long, value_name = "NAME")]
    pub workflow: Option<String>,
}

/// Options shared by the footprint and shift estimators.
#[derive(Args, Debug, Clone)]
pub struct EstimatorArgs {
    /// Constant carbon intensity in gCO2e/kWh (mutually exclusive with --ci-file)
    #[arg(long, value_name = "GCO2E_KWH", conflicts_with = "ci_file")]
    pub ci: Option<f64>,

    /// Carbon intensity intervals file with date,start,actual columns
    #[arg(long, value_name = "FILE")]
    pub ci_file: Option<PathBuf>,

    /// Field delimiter of the carbon intensity file
    #[arg(long, value_name = "CHAR")]
    pub ci_delimiter: Option<char>,

    /// Node power profile file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub node_config: Option<PathBuf>,

    /// Power model to resolve from the node profile, as node_governor_kind
    #[arg(short, long, value_name = "NAME")]
    pub model_name: Option<String>,

    /// Interval length in minutes for bucketing tasks against CI windows
    #[arg(short, long, value_name = "MINUTES")]
    pub interval: Option<i64>,

    /// Power usage effectiveness of the data centre
    #[arg(long, value_name = "FACTOR")]
    pub pue: Option<f64>,

    /// Memory power draw in W/GB
    #[arg(long, value_name = "W_PER_GB")]
    pub memory_coefficient: Option<f64>,

    /// Treat cpu_usage as a share of this many system cores instead of
    /// the task's own core count
    #[arg(long, value_name = "CORES")]
    pub system_cores: Option<u32>,

    /// Fixed CPU embodied impact in kg CO2e, bypassing the Boavizta lookup
    #[arg(long, value_name = "KG")]
    pub cpu_impact_kg: Option<f64>,

    /// CPU lifetime in hours for amortizing embodied carbon
    #[arg(long, value_name = "HOURS")]
    pub lifetime_hours: Option<f64>,

    /// Output folder for reports
    #[arg(short, long, value_name = "DIR")]
    pub out_folder: Option<PathBuf>,

    /// File name prefix for reports; defaults to workflow-model
    #[arg(long, value_name = "PREFIX")]
    pub out_prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct FootprintArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Reserved memory per node in GB, charged for the full workflow span
    #[arg(long, value_name = "GB")]
    pub reserved_memory_gb: Option<f64>,

    /// Number of nodes the reserved memory applies to
    #[arg(long, value_name = "N")]
    pub num_nodes: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ShiftArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,

    /// Flexibility windows in interval slots, comma-separated
    #[arg(long, value_name = "SLOTS", value_delimiter = ',')]
    pub windows: Vec<usize>,

    /// Direction the flexibility window extends in
    #[arg(long, value_enum)]
    pub direction: Option<ShiftDirection>,
}

#[derive(Args, Debug)]
pub struct EmbodiedArgs {
    #[command(flatten)]
    pub trace: TraceArgs,

    /// CPU model to assume for tasks that do not report one
    #[arg(long, value_name = "MODEL")]
    pub cpu_model: Option<String>,

    /// Fixed CPU embodied impact in kg CO2e, bypassing the Boavizta lookup
    #[arg(long, value_name = "KG")]
    pub cpu_impact_kg: Option<f64>,

    /// CPU lifetime in hours for amortizing embodied carbon
    #[arg(long, value_name = "HOURS")]
    pub lifetime_hours: Option<f64>,

    /// Base URL of the Boavizta API
    #[arg(long, value_name = "URL")]
    pub boavizta_url: Option<String>,
}
