use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ichnos::cli::{Cli, Command, EmbodiedArgs, EstimatorArgs, FootprintArgs, ShiftArgs, TraceArgs};
use ichnos::config::{
    FileConfig, DEFAULT_INTERVAL_MINUTES, DEFAULT_OUT_FOLDER, DEFAULT_PUE, DEFAULT_SHIFT_WINDOWS,
    DEFAULT_TRACE_DELIMITER,
};
use ichnos::embodied::{
    embodied_for_tasks, uniform_cpu_model, BoaviztaClient, EmbodiedCarbonSource, FixedImpact,
};
use ichnos::energy::{
    calculate_footprint, reserved_memory_usage, EstimatorSettings, ReservedMemory,
};
use ichnos::intensity::{parse_ci_file, CiSeries, CiSource};
use ichnos::interval::partition;
use ichnos::power::{load_node_profile, NodeProfile, UsageNormalization};
use ichnos::record::{merge_by_id, TaskRecord, TaskSlice};
use ichnos::report::{
    render_rank_report, render_shift_csvs, render_summary, render_trace_csv, write_report,
    SummaryContext,
};
use ichnos::shift::{explore, ShiftDirection, ShiftOptions};
use ichnos::trace::parse_trace_file;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Command::Footprint(args) => run_footprint(args, &file),
        Command::Shift(args) => run_shift(args, &file),
        Command::Embodied(args) => run_embodied(args, &file),
    }
}

/// Workflow name and parsed task records for a trace file.
fn resolve_trace(args: &TraceArgs, file: &FileConfig) -> Result<(String, Vec<TaskRecord>)> {
    let path = args
        .trace
        .clone()
        .or_else(|| file.trace_file.clone())
        .context("no trace file given; pass --trace or set trace_file in the config")?;
    let delimiter = args
        .trace_delimiter
        .or(file.trace_delimiter)
        .unwrap_or(DEFAULT_TRACE_DELIMITER);
    let tasks = parse_trace_file(&path, delimiter)
        .with_context(|| format!("failed to parse trace file {}", path.display()))?;

    let workflow = args
        .workflow
        .clone()
        .or_else(|| file.workflow_name.clone())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "workflow".to_string());
    Ok((workflow, tasks))
}

/// Estimator parameters resolved from CLI options, config file and node
/// profile, in that precedence order.
struct Resolved {
    model_name: String,
    profile: NodeProfile,
    settings: EstimatorSettings,
    ci: CiSource,
    ci_label: String,
    interval: i64,
    lifetime_hours: Option<f64>,
    out_folder: PathBuf,
    out_prefix: Option<String>,
    cpu_impact_kg: Option<f64>,
}

fn resolve_estimator(args: &EstimatorArgs, file: &FileConfig) -> Result<Resolved> {
    let model_name = args
        .model_name
        .clone()
        .or_else(|| file.model_name.clone())
        .context("no power model given; pass --model-name or set model_name in the config")?;
    let node_config = args
        .node_config
        .clone()
        .or_else(|| file.node_config.clone())
        .context("no node profile given; pass --node-config or set node_config in the config")?;
    let profile = load_node_profile(&node_config, &model_name)?;

    let normalization = match args.system_cores.or(file.system_cores).or(profile.system_cores) {
        Some(cores) => UsageNormalization::SystemWide(cores),
        None => UsageNormalization::PerCore,
    };
    let memory_coefficient = args
        .memory_coefficient
        .or(file.memory_coefficient)
        .unwrap_or(profile.memory_draw);
    let settings = EstimatorSettings {
        power_model: profile.power_model.clone(),
        normalization,
        pue: args.pue.or(file.pue).unwrap_or(DEFAULT_PUE),
        memory_coefficient,
    };

    let (ci, ci_label) = match (
        args.ci.or(file.ci),
        args.ci_file.clone().or_else(|| file.ci_file.clone()),
    ) {
        (None, Some(path)) => {
            let delimiter = args.ci_delimiter.or(file.ci_delimiter).unwrap_or(',');
            let series = parse_ci_file(&path, delimiter)
                .with_context(|| format!("failed to parse ci file {}", path.display()))?;
            (CiSource::Series(series), path.display().to_string())
        }
        (Some(value), _) => (CiSource::Constant(value), value.to_string()),
        (None, None) => bail!("no carbon intensity given; pass --ci or --ci-file"),
    };

    Ok(Resolved {
        model_name,
        profile,
        settings,
        ci,
        ci_label,
        interval: args
            .interval
            .or(file.interval)
            .unwrap_or(DEFAULT_INTERVAL_MINUTES),
        lifetime_hours: args.lifetime_hours.or(file.lifetime_hours),
        out_folder: args
            .out_folder
            .clone()
            .or_else(|| file.out_folder.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_FOLDER)),
        out_prefix: args.out_prefix.clone().or_else(|| file.out_prefix.clone()),
        cpu_impact_kg: args.cpu_impact_kg.or(file.cpu_impact_kg),
    })
}

fn embodied_source(cpu_impact_kg: Option<f64>, base_url: Option<&str>) -> Box<dyn EmbodiedCarbonSource> {
    match (cpu_impact_kg, base_url) {
        (Some(kg), _) => Box::new(FixedImpact(kg)),
        (None, Some(url)) => Box::new(BoaviztaClient::with_base_url(url)),
        (None, None) => Box::new(BoaviztaClient::new()),
    }
}

fn run_footprint(args: FootprintArgs, file: &FileConfig) -> Result<()> {
    let (workflow, tasks) = resolve_trace(&args.trace, file)?;
    let resolved = resolve_estimator(&args.estimator, file)?;

    let reserved_gb = args.reserved_memory_gb.or(file.reserved_memory_gb);
    let reserved = reserved_gb.map(|gb| ReservedMemory {
        reserved_gb: gb,
        num_nodes: args.num_nodes.or(file.num_nodes).unwrap_or(1),
    });

    let mut buckets = partition(&tasks, resolved.interval)?;
    let footprint = calculate_footprint(
        &tasks,
        &mut buckets,
        &resolved.ci,
        &resolved.settings,
        reserved,
    )?;

    let source = embodied_source(resolved.cpu_impact_kg, None);
    let fallback_model = resolved.profile.cpu_model.clone().unwrap_or_default();
    let embodied = embodied_for_tasks(
        source.as_ref(),
        &tasks,
        &fallback_model,
        resolved.lifetime_hours,
    )?;

    let reserved_totals = reserved.map(|r| {
        reserved_memory_usage(
            &footprint.node_memory_spans,
            r,
            resolved.settings.memory_coefficient,
        )
    });

    let ctx = SummaryContext {
        ci_label: resolved.ci_label.clone(),
        pue: resolved.settings.pue,
        model_name: resolved.model_name.clone(),
        memory_coefficient: resolved.settings.memory_coefficient,
    };
    let summary = render_summary(&ctx, &footprint, embodied, reserved_totals);
    print!("{summary}");

    let slices: Vec<&TaskSlice> = buckets.buckets.values().flatten().collect();
    let merged = merge_by_id(&tasks, slices);

    let prefix = resolved
        .out_prefix
        .clone()
        .unwrap_or_else(|| format!("{workflow}-{}", resolved.model_name));
    write_report(&resolved.out_folder, &format!("{prefix}-summary.txt"), &summary)?;
    write_report(
        &resolved.out_folder,
        &format!("{prefix}-trace.csv"),
        &render_trace_csv(&merged),
    )?;
    write_report(
        &resolved.out_folder,
        &format!("{prefix}-detailed-summary.txt"),
        &render_rank_report(&workflow, &merged, 10),
    )?;

    Ok(())
}

fn run_shift(args: ShiftArgs, file: &FileConfig) -> Result<()> {
    let (workflow, tasks) = resolve_trace(&args.trace, file)?;
    let resolved = resolve_estimator(&args.estimator, file)?;

    let series: CiSeries = match resolved.ci {
        CiSource::Series(ref series) => series.clone(),
        CiSource::Constant(_) => {
            bail!("temporal shifting needs a carbon intensity series; pass --ci-file")
        }
    };

    let windows = if !args.windows.is_empty() {
        args.windows.clone()
    } else {
        file.shift_windows
            .clone()
            .unwrap_or_else(|| DEFAULT_SHIFT_WINDOWS.to_vec())
    };
    let direction = match args.direction {
        Some(direction) => direction,
        None => match file.shift_direction.as_deref() {
            Some("bidirectional") => ShiftDirection::Bidirectional,
            Some("forward") | None => ShiftDirection::Forward,
            Some(other) => bail!("unknown shift_direction '{other}' in config"),
        },
    };
    let options = ShiftOptions {
        windows: windows.clone(),
        direction,
        lifetime_hours: resolved.lifetime_hours,
    };

    let cpu_model = uniform_cpu_model(&tasks, resolved.profile.cpu_model.as_deref())?;
    let source = embodied_source(resolved.cpu_impact_kg, None);

    let mut buckets = partition(&tasks, resolved.interval)?;
    let report = explore(
        &workflow,
        &tasks,
        &mut buckets,
        &series,
        &resolved.settings,
        source.as_ref(),
        &cpu_model,
        &options,
    )?;

    println!("Original Carbon Emissions: {}gCO2e", report.baseline_emissions);
    println!("Original Embodied Carbon: {}gCO2e", report.baseline_embodied);
    for outcome in &report.operational {
        println!(
            "flexible-{}h: {:.1}% saving, {}gCO2e, overhead {}s ({:.1}%)",
            outcome.window,
            outcome.saving_pct,
            outcome.emissions,
            outcome.overhead_s,
            outcome.overhead_pct
        );
    }
    for (window, reason) in &report.skipped {
        println!("flexible-{window}h: skipped ({reason})");
    }

    let (op_csv, emb_csv) = render_shift_csvs(std::slice::from_ref(&report), &windows);
    let prefix = resolved
        .out_prefix
        .clone()
        .unwrap_or_else(|| format!("{workflow}-{}", resolved.model_name));
    write_report(&resolved.out_folder, &format!("{prefix}-ts.csv"), &op_csv)?;
    write_report(&resolved.out_folder, &format!("{prefix}-ts-emb.csv"), &emb_csv)?;

    Ok(())
}

fn run_embodied(args: EmbodiedArgs, file: &FileConfig) -> Result<()> {
    let (workflow, tasks) = resolve_trace(&args.trace, file)?;

    let cpu_impact_kg = args.cpu_impact_kg.or(file.cpu_impact_kg);
    let source = embodied_source(cpu_impact_kg, args.boavizta_url.as_deref());
    let lifetime_hours = args.lifetime_hours.or(file.lifetime_hours);

    let fallback = uniform_cpu_model(&tasks, args.cpu_model.as_deref())?;
    let total = embodied_for_tasks(source.as_ref(), &tasks, &fallback, lifetime_hours)?;

    println!("Embodied Carbon for {workflow}: {total}gCO2e");
    Ok(())
}
