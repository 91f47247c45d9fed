use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use fiber_route::{
    parse_routes, report_for_cut, select_route, CutPosition, ReportParams, Route, RouteCache,
    RouteError, RouteReport, RouteSpec, SegmentState,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("FIBER_ROUTE_GIT_HASH"),
    ")"
);

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Fiber route distance and cut localization CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a reported cut on one route and emit the JSON report
    Report(ReportArgs),
    /// Summarize waypoint distances for one or more route files
    Summary(SummaryArgs),
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Route file (JSON catalog, CSV waypoint table or GPX)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Route name inside the file (defaults to the first route)
    #[arg(short, long)]
    route: Option<String>,

    /// Reported cut distance along the route in meters (omit for no cut)
    #[arg(long)]
    cut: Option<f64>,

    /// Clamp the cut distance into the route length instead of failing
    #[arg(long, action = ArgAction::SetTrue)]
    clamp: bool,

    /// Output JSON path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Pretty-print the JSON report
    #[arg(long, action = ArgAction::SetTrue)]
    pretty: bool,

    /// Optional CSV of waypoints with cumulative distances
    #[arg(long, value_hint = ValueHint::FilePath)]
    waypoints_csv: Option<PathBuf>,

    /// Optional CSV of intact/affected segments
    #[arg(long, value_hint = ValueHint::FilePath)]
    segments_csv: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// Route files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "route_summary.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Report(args) => args.verbose,
        Command::Summary(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Report(args) => handle_report(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_report(args: ReportArgs) -> Result<()> {
    let t_parse = Instant::now();
    let specs = load_route_specs(&args.input)?;
    if args.route.is_none() && specs.len() > 1 {
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        info!(
            "{} routes in {}; using the first (available: {})",
            specs.len(),
            args.input.display(),
            names.join(", ")
        );
    }
    let spec = select_route(&specs, args.route.as_deref())
        .with_context(|| format!("no matching route in {}", args.input.display()))?;
    let route = spec
        .build()
        .with_context(|| format!("invalid route '{}'", spec.name))?;
    if args.profile || args.verbose {
        info!(
            "Parse stage: {:.1} ms",
            t_parse.elapsed().as_secs_f64() * 1000.0
        );
    }
    info!(
        "Route {}: total link length {:.1} m over {} waypoints",
        route.name(),
        route.total_length(),
        route.len()
    );

    let params = ReportParams {
        cut_distance: args.cut,
        clamp_cut: args.clamp,
    };
    let effective = resolve_cut_arg(&params, &route)?;

    let t_compute = Instant::now();
    let mut report = report_for_cut(&route, effective);
    report.generated_at = Some(Utc::now());
    if args.profile || args.verbose {
        info!(
            "Compute stage: {:.3} ms ({} segments)",
            t_compute.elapsed().as_secs_f64() * 1000.0,
            report.segments.len()
        );
    }
    log_cut_summary(&report);

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write_report_json(&report, &mut handle, args.pretty)?;
    } else {
        let mut file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        write_report_json(&report, &mut file, args.pretty)?;
        info!("Wrote route report: {}", args.output.display());
    }

    if let Some(path) = args.waypoints_csv.as_ref() {
        write_waypoints_csv(&report, path)?;
        info!("Wrote waypoint table: {}", path.display());
    }
    if let Some(path) = args.segments_csv.as_ref() {
        write_segments_csv(&report, path)?;
        info!("Wrote segment table: {}", path.display());
    }

    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<()> {
    let t_parse = Instant::now();
    let parsed: Vec<(PathBuf, Vec<RouteSpec>)> = args
        .inputs
        .par_iter()
        .map(|path| -> Result<(PathBuf, Vec<RouteSpec>)> {
            let specs = load_route_specs(path)?;
            Ok((path.clone(), specs))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "Parsed {} files in {:.1} ms",
        parsed.len(),
        t_parse.elapsed().as_secs_f64() * 1000.0
    );

    let mut cache = RouteCache::new();
    let mut report = String::new();
    for (path, specs) in &parsed {
        report.push_str(&format!("FILE: {}\n", path.display()));
        if specs.is_empty() {
            warn!("{} contains no routes", path.display());
            report.push_str("  (no routes)\n\n");
            continue;
        }
        for spec in specs {
            match cache.get_or_build(spec) {
                Ok(route) => report.push_str(&summarize_route(&route)),
                Err(err) => {
                    warn!("Skipping route '{}' in {}: {}", spec.name, path.display(), err);
                    report.push_str(&format!("  ROUTE: {}\n    error: {}\n", spec.name, err));
                }
            }
        }
        report.push('\n');
    }
    if cache.hits() > 0 {
        info!(
            "{} duplicate routes reused from {} distinct",
            cache.hits(),
            cache.len()
        );
    }

    if args.output.as_os_str() == "-" {
        io::stdout()
            .lock()
            .write_all(report.as_bytes())
            .context("failed to write summary to stdout")?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Route summary written: {}", args.output.display());
    }
    Ok(())
}

fn resolve_cut_arg(params: &ReportParams, route: &Route) -> Result<Option<f64>> {
    let effective = match params.effective_cut(route) {
        Ok(cut) => cut,
        Err(RouteError::CutOutOfRange {
            distance,
            total_length,
        }) => {
            let hint = if params.clamp_cut {
                ""
            } else {
                " (pass --clamp to clamp it)"
            };
            return Err(anyhow!(
                "--cut {} m is outside the route length [0, {:.1}] m{}",
                distance,
                total_length,
                hint
            ));
        }
        Err(err) => return Err(err.into()),
    };
    if let (Some(requested), Some(used)) = (params.cut_distance, effective) {
        if requested != used {
            warn!("Cut distance {} m clamped to {:.1} m", requested, used);
        }
    }
    Ok(effective)
}

fn load_route_specs(path: &Path) -> Result<Vec<RouteSpec>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json");
    let default_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("route");
    let specs = parse_routes(&data, hint, default_name)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!("{}: {} routes", path.display(), specs.len());
    Ok(specs)
}

fn log_cut_summary(report: &RouteReport) {
    let Some(cut) = report.cut.as_ref() else {
        info!("No cut reported; link intact");
        return;
    };
    match cut.position {
        CutPosition::WithinSegment { .. } => info!(
            "Cut detected at GPS position ({:.6}, {:.6}): {:.1} m, {:.1} m past {} toward {}",
            cut.lat, cut.lon, cut.distance, cut.offset_from_previous, cut.from_label, cut.to_label
        ),
        CutPosition::AtWaypoint { .. } => info!(
            "Cut located at {} ({:.6}, {:.6}), {:.1} m from origin",
            cut.from_label, cut.lat, cut.lon, cut.distance
        ),
    }
    info!(
        "Affected: {:.1} m of {:.1} m ({} of {} segments)",
        report.affected_length,
        report.total_length,
        report
            .segments
            .iter()
            .filter(|s| s.state == SegmentState::Affected)
            .count(),
        report.segments.len()
    );
}

fn write_report_json<W: Write>(report: &RouteReport, writer: &mut W, pretty: bool) -> Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, report)?;
    } else {
        serde_json::to_writer(&mut *writer, report)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn write_waypoints_csv(report: &RouteReport, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["label", "lat", "lon", "cumulative_distance_m"])?;
    for wp in &report.waypoints {
        writer.write_record([
            wp.label.clone(),
            format!("{:.6}", wp.lat),
            format!("{:.6}", wp.lon),
            format!("{:.1}", wp.cumulative_distance),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_segments_csv(report: &RouteReport, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["leg", "state", "from_lat", "from_lon", "to_lat", "to_lon"])?;
    for segment in &report.segments {
        writer.write_record([
            segment.leg.to_string(),
            segment.state.as_str().to_string(),
            format!("{:.6}", segment.from.lat),
            format!("{:.6}", segment.from.lon),
            format!("{:.6}", segment.to.lat),
            format!("{:.6}", segment.to.lon),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn summarize_route(route: &Route) -> String {
    let mut out = String::new();
    out.push_str(&format!("  ROUTE: {}\n", route.name()));
    out.push_str(&format!("    waypoints: {}\n", route.len()));
    out.push_str(&format!("    total_length_m: {:.1}\n", route.total_length()));
    if let Some([r, g, b]) = route.color() {
        out.push_str(&format!("    color: #{:02x}{:02x}{:02x}\n", r, g, b));
    }

    let longest = route
        .legs()
        .map(|(a, b)| {
            (
                b.cumulative_distance() - a.cumulative_distance(),
                a.label(),
                b.label(),
            )
        })
        .fold(None, |best: Option<(f64, &str, &str)>, leg| match best {
            Some(b) if b.0 >= leg.0 => Some(b),
            _ => Some(leg),
        });
    if let Some((length, from, to)) = longest {
        out.push_str(&format!(
            "    longest_leg: {} -> {} ({:.1} m)\n",
            from, to, length
        ));
    }

    let coincident: Vec<String> = route
        .legs()
        .filter(|(a, b)| b.cumulative_distance() == a.cumulative_distance())
        .map(|(a, b)| format!("{} = {}", a.label(), b.label()))
        .collect();
    if !coincident.is_empty() {
        out.push_str(&format!(
            "    coincident_waypoints: {}\n",
            coincident.join(", ")
        ));
    }

    out.push_str("    distances:\n");
    for wp in route.waypoints() {
        out.push_str(&format!(
            "      - {}: {:.1} m\n",
            wp.label(),
            wp.cumulative_distance()
        ));
    }
    out
}
