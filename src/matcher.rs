use geo::{Coord, LineString};
use log::{debug, info, warn};

use crate::error::{MatchError, Result};
use crate::geohash::DEFAULT_PRECISION;
use crate::graph_builder::{BuildOptions, GraphBuild, PathStep, build_graph};
use crate::mapper::{
    DEFAULT_MAX_DISTANCE, MapOptions, MappedGpsPoint, map_gps_line_string_to_road,
    map_gps_to_road,
};
use crate::reconstruct::reconstruct;
use crate::road::Road;

/// Configuration for the trace matcher
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum distance between a GPS point and its road (coordinate units)
    pub max_distance: f64,
    /// Geohash length for node identity; must match the roads' hash precision
    pub hash_precision: usize,
    /// Visit every mapped point instead of only the ends of each contiguous run
    pub include_all_gps_points: bool,
    /// Override for the walk step cap
    pub max_walk_steps: Option<usize>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            hash_precision: DEFAULT_PRECISION,
            include_all_gps_points: true,
            max_walk_steps: None,
        }
    }
}

impl MatcherConfig {
    fn map_options(&self) -> MapOptions {
        MapOptions {
            max_distance: self.max_distance,
            hash_precision: self.hash_precision,
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            include_all_gps_points: self.include_all_gps_points,
            max_walk_steps: self.max_walk_steps,
        }
    }
}

/// Everything produced by one match
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub mapped_points: Vec<MappedGpsPoint>,
    /// Healed node path, runs separated by breaks
    pub path: Vec<PathStep>,
    /// Geometry of each run
    pub line_strings: Vec<LineString<f64>>,
    /// Recoverable problems hit while walking or rebuilding
    pub issues: Vec<MatchError>,
}

impl MatchResult {
    /// Path rendered as space separated hashes with `-` for breaks
    pub fn path_string(&self) -> String {
        render_path(&self.path)
    }

    /// Number of points dropped for lying too far from every road
    pub fn unmatched_count(&self, input_len: usize) -> usize {
        input_len.saturating_sub(self.mapped_points.len())
    }
}

/// Runs mapping, graph walk, healing and reconstruction over one trace
pub struct TraceMatcher {
    config: MatcherConfig,
}

impl TraceMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.map_options().validate()?;
        if config.max_walk_steps == Some(0) {
            return Err(MatchError::InvalidConfig(
                "max_walk_steps must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match an ordered list of GPS points.
    pub fn match_points(&self, roads: &[Road], points: &[Coord<f64>]) -> Result<MatchResult> {
        self.check_road_precision(roads);
        let mapped = map_gps_to_road(roads, points, &self.config.map_options())?;
        Ok(self.run(roads, mapped))
    }

    /// Match a trace given as line strings, flattened in order.
    pub fn match_trace(&self, roads: &[Road], trace: &[LineString<f64>]) -> Result<MatchResult> {
        self.check_road_precision(roads);
        let mapped = map_gps_line_string_to_road(roads, trace, &self.config.map_options())?;
        Ok(self.run(roads, mapped))
    }

    /// Walk and heal without rebuilding geometry; handy for inspecting the node graph.
    pub fn build(&self, roads: &[Road], points: &[Coord<f64>]) -> Result<GraphBuild> {
        let mapped = map_gps_to_road(roads, points, &self.config.map_options())?;
        Ok(build_graph(roads, &mapped, &self.config.build_options()))
    }

    fn run(&self, roads: &[Road], mapped_points: Vec<MappedGpsPoint>) -> MatchResult {
        if mapped_points.is_empty() {
            info!("No GPS point is within {} of a road", self.config.max_distance);
            return MatchResult::default();
        }

        let build = build_graph(roads, &mapped_points, &self.config.build_options());
        let rebuilt = reconstruct(&build.graph, &build.path);

        let mut issues = build.issues;
        issues.extend(rebuilt.issues);
        if !issues.is_empty() {
            warn!("Match finished with {} issue(s)", issues.len());
        }

        debug!("Path: {}", render_path(&build.path));
        info!(
            "Matched {} points into {} line strings",
            mapped_points.len(),
            rebuilt.line_strings.len()
        );

        MatchResult {
            mapped_points,
            path: build.path,
            line_strings: rebuilt.line_strings,
            issues,
        }
    }

    fn check_road_precision(&self, roads: &[Road]) {
        let mismatched = roads
            .iter()
            .filter(|road| road.start_hash().len() != self.config.hash_precision)
            .count();
        if mismatched > 0 {
            warn!(
                "{} roads are hashed at a different precision than {}; junctions may not line up",
                mismatched, self.config.hash_precision
            );
        }
    }
}

fn render_path(path: &[PathStep]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
