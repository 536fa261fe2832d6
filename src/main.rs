use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use roadtrace::debug::DebugVisualizer;
use roadtrace::geohash::DEFAULT_PRECISION;
use roadtrace::io;
use roadtrace::mapper::DEFAULT_MAX_DISTANCE;
use roadtrace::{MatcherConfig, RoadGraph, TraceMatcher};

/// Match a GPS trace onto a road network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON FeatureCollection of road LineStrings
    #[arg(short, long)]
    roads: PathBuf,

    /// GeoJSON FeatureCollection with the GPS points
    #[arg(short, long)]
    gps: PathBuf,

    /// Read the GPS input as LineStrings instead of Points
    #[arg(long)]
    trace: bool,

    /// Maximum distance between a GPS point and its road, in coordinate units
    #[arg(long, default_value_t = DEFAULT_MAX_DISTANCE)]
    max_distance: f64,

    /// Geohash precision used for node identity
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: usize,

    /// Only require the ends of each contiguous run instead of every GPS point
    #[arg(long)]
    simplified: bool,

    /// Override the walk step cap
    #[arg(long)]
    max_walk_steps: Option<usize>,

    /// Write the matched geometry as GeoJSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the mapped GPS points as JSON
    #[arg(long)]
    mapped_output: Option<PathBuf>,

    /// Write roads, mapped points and the matched route as one GeoJSON
    #[arg(long)]
    debug_geojson: Option<PathBuf>,

    /// Write an SVG diagram of roads, nodes and the matched route
    #[arg(long)]
    debug_svg: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();
    info!("Starting roadtrace");

    let config = MatcherConfig {
        max_distance: args.max_distance,
        hash_precision: args.precision,
        include_all_gps_points: !args.simplified,
        max_walk_steps: args.max_walk_steps,
    };
    let matcher = TraceMatcher::new(config).context("Invalid matcher configuration")?;

    let roads = io::read_roads(&args.roads, args.precision)?;
    info!("Loaded {} roads from {}", roads.len(), args.roads.display());

    let (result, input_len) = if args.trace {
        let trace = io::read_gps_trace(&args.gps)?;
        let input_len: usize = trace.iter().map(|l| l.0.len()).sum();
        (matcher.match_trace(&roads, &trace)?, input_len)
    } else {
        let points = io::read_gps_points(&args.gps)?;
        let input_len = points.len();
        (matcher.match_points(&roads, &points)?, input_len)
    };

    let unmatched = result.unmatched_count(input_len);
    if unmatched > 0 {
        warn!("{} of {} GPS points had no road in range", unmatched, input_len);
    }
    for issue in &result.issues {
        warn!("{}", issue);
    }

    println!("{}", result.path_string());

    if let Some(path) = &args.output {
        io::write_json(path, &io::line_strings_to_geojson(&result.line_strings))?;
        info!("Matched geometry written to {}", path.display());
    }

    if let Some(path) = &args.mapped_output {
        io::write_json(path, &io::mapped_points_to_json(&result.mapped_points)?)?;
        info!("Mapped points written to {}", path.display());
    }

    if let Some(path) = &args.debug_geojson {
        io::write_json(path, &DebugVisualizer::generate_match_geojson(&roads, &result))?;
        info!("Debug GeoJSON written to {}", path.display());
    }

    if let Some(path) = &args.debug_svg {
        let graph = RoadGraph::build(&roads, &result.mapped_points);
        let svg = DebugVisualizer::generate_svg(&roads, Some(&graph), &result.line_strings);
        fs::write(path, svg).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Debug SVG written to {}", path.display());
    }

    Ok(())
}
