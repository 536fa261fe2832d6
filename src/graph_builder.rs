use geo::Coord;
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::fmt;

use crate::error::MatchError;
use crate::geohash::GeoHash;
use crate::mapper::MappedGpsPoint;
use crate::projection::planar_distance;
use crate::road::{Road, RoadHash, distinct_road_indices, shared_endpoints};

/// One entry of a walked path
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathStep {
    Node(GeoHash),
    /// The walk could not continue and restarted at the next target
    Break,
}

impl PathStep {
    pub fn hash(&self) -> Option<&str> {
        match self {
            PathStep::Node(hash) => Some(hash.as_str()),
            PathStep::Break => None,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, PathStep::Break)
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Node(hash) => f.write_str(hash),
            PathStep::Break => f.write_str("-"),
        }
    }
}

/// A road touching an endpoint node
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointRef {
    pub road_hash: RoadHash,
    /// Hash of the road's other end
    pub opposite: GeoHash,
    /// Whether the node is the road's first coordinate
    pub is_start: bool,
}

/// Node seeded from road endpoints, possibly also hit by a GPS point
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointNode {
    pub hash: GeoHash,
    pub coordinate: Coord<f64>,
    pub roads: Vec<EndpointRef>,
    /// GPS point that landed on this junction, first one wins
    pub gps: Option<MappedGpsPoint>,
}

/// Node created from a GPS point projected inside a road
#[derive(Clone, Debug, PartialEq)]
pub struct GpsNode {
    pub point: MappedGpsPoint,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    RoadEndpoint(EndpointNode),
    Gps(GpsNode),
}

impl Node {
    pub fn hash(&self) -> &str {
        match self {
            Node::RoadEndpoint(node) => &node.hash,
            Node::Gps(node) => &node.point.hash,
        }
    }

    pub fn coordinate(&self) -> Coord<f64> {
        match self {
            Node::RoadEndpoint(node) => node.coordinate,
            Node::Gps(node) => node.point.coordinate,
        }
    }

    pub fn is_gps(&self) -> bool {
        match self {
            Node::RoadEndpoint(node) => node.gps.is_some(),
            Node::Gps(_) => true,
        }
    }

    pub fn is_road_endpoint(&self) -> bool {
        matches!(self, Node::RoadEndpoint(_))
    }

    pub fn gps_point(&self) -> Option<&MappedGpsPoint> {
        match self {
            Node::RoadEndpoint(node) => node.gps.as_ref(),
            Node::Gps(node) => Some(&node.point),
        }
    }

    /// Every road this node lies on: endpoint roads first, then the GPS point's road
    pub fn road_hashes(&self) -> Vec<&str> {
        let mut hashes: Vec<&str> = Vec::new();
        if let Node::RoadEndpoint(node) = self {
            for road in &node.roads {
                if !hashes.contains(&road.road_hash.as_str()) {
                    hashes.push(&road.road_hash);
                }
            }
        }
        if let Some(point) = self.gps_point() {
            if !hashes.contains(&point.road_hash.as_str()) {
                hashes.push(&point.road_hash);
            }
        }
        hashes
    }
}

/// Nodes keyed by geohash; nodes sharing a hash are the same node
pub type NodeMap = HashMap<GeoHash, Node>;

/// Options for the trace walk
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Visit every mapped point; when false only the ends of each contiguous run are
    /// required, so the walk takes the most direct road path between them
    pub include_all_gps_points: bool,
    /// Upper bound on walk iterations; derived from the target count when unset
    pub max_walk_steps: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_all_gps_points: true,
            max_walk_steps: None,
        }
    }
}

/// Outcome of walking the targets
#[derive(Debug, Clone, Default)]
pub struct Walk {
    pub path: Vec<PathStep>,
    pub steps: usize,
    /// Set when the walk stopped early on inconsistent data
    pub issue: Option<MatchError>,
}

/// Result of the full build: graph, raw walk and healed path
#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: RoadGraph,
    pub targets: Vec<MappedGpsPoint>,
    pub raw_path: Vec<PathStep>,
    pub path: Vec<PathStep>,
    pub issues: Vec<MatchError>,
}

// How the walk gets from the current node to the next target
enum Hop {
    Stay,
    Direct,
    SameRoad,
    Join(GeoHash),
    Disconnected,
}

/// Node graph over road endpoints and mapped GPS points
#[derive(Debug, Clone)]
pub struct RoadGraph {
    roads: Vec<Road>,
    road_lookup: HashMap<RoadHash, usize>,
    nodes: NodeMap,
}

impl RoadGraph {
    /// Seed the node map with every road's endpoints, then every mapped point,
    /// merging nodes that share a geohash.
    pub fn build(roads: &[Road], mapped_points: &[MappedGpsPoint]) -> Self {
        let mut road_lookup = HashMap::with_capacity(roads.len());
        let mut nodes = NodeMap::with_capacity(roads.len() * 2 + mapped_points.len());

        let distinct = distinct_road_indices(roads);
        if distinct.len() < roads.len() {
            warn!(
                "{} roads repeat the endpoints of an earlier road, keeping the first of each",
                roads.len() - distinct.len()
            );
        }

        for idx in distinct {
            let road = &roads[idx];
            road_lookup.insert(road.hash().to_string(), idx);

            insert_endpoint(
                &mut nodes,
                road.start_hash(),
                road.start(),
                EndpointRef {
                    road_hash: road.hash().to_string(),
                    opposite: road.end_hash().to_string(),
                    is_start: true,
                },
            );
            insert_endpoint(
                &mut nodes,
                road.end_hash(),
                road.end(),
                EndpointRef {
                    road_hash: road.hash().to_string(),
                    opposite: road.start_hash().to_string(),
                    is_start: false,
                },
            );
        }

        for point in mapped_points {
            insert_gps(&mut nodes, point);
        }

        debug!(
            "Road graph built with {} roads and {} nodes",
            road_lookup.len(),
            nodes.len()
        );

        Self {
            roads: roads.to_vec(),
            road_lookup,
            nodes,
        }
    }

    pub fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub fn node(&self, hash: &str) -> Option<&Node> {
        self.nodes.get(hash)
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn road(&self, hash: &str) -> Option<&Road> {
        self.road_lookup.get(hash).map(|&idx| &self.roads[idx])
    }

    /// The road whose two endpoints are exactly `a` and `b`, in either order
    pub fn road_between(&self, a: &str, b: &str) -> Option<&Road> {
        self.road(&format!("{}.{}", a, b))
            .or_else(|| self.road(&format!("{}.{}", b, a)))
    }

    /// Walk the ordered targets into a path of node hashes and break markers.
    pub fn walk(&self, targets: &[MappedGpsPoint], options: &BuildOptions) -> Walk {
        let mut walk = Walk::default();
        let Some(first) = targets.first() else {
            return walk;
        };

        // The first target seeds the path; it must already be a node
        if !self.nodes.contains_key(&first.hash) {
            error!("Walk start {} is not in the node map", first.hash);
            walk.issue = Some(MatchError::MissingNode(first.hash.clone()));
            return walk;
        }

        let max_steps = options
            .max_walk_steps
            .unwrap_or(targets.len() * 4 + 16);

        let mut current_hash = first.hash.clone();
        let mut current_road = first.road_hash.clone();
        let mut cursor = 1;
        walk.path.push(PathStep::Node(current_hash.clone()));

        while cursor < targets.len() {
            // Bounded loop: joins do not advance the cursor
            if walk.steps >= max_steps {
                warn!(
                    "Walk stopped after {} steps with {} targets left",
                    walk.steps,
                    targets.len() - cursor
                );
                walk.issue = Some(MatchError::WalkLimitExceeded { steps: walk.steps });
                break;
            }
            walk.steps += 1;

            let next = &targets[cursor];
            let hop = match self.next_hop(&current_hash, &current_road, next) {
                Ok(hop) => hop,
                Err(e) => {
                    error!("Walk stopped at target {}: {}", cursor, e);
                    walk.issue = Some(e);
                    break;
                }
            };

            match hop {
                Hop::Stay => {
                    trace!("Target {} coincides with {}", cursor, current_hash);
                    current_road = next.road_hash.clone();
                    cursor += 1;
                }
                Hop::Direct | Hop::SameRoad => {
                    walk.path.push(PathStep::Node(next.hash.clone()));
                    current_hash = next.hash.clone();
                    current_road = next.road_hash.clone();
                    cursor += 1;
                }
                Hop::Join(join) => {
                    // Step onto the junction; the target itself is reached next round
                    trace!("Threading through junction {} towards {}", join, next.hash);
                    walk.path.push(PathStep::Node(join.clone()));
                    if join == next.hash {
                        current_road = next.road_hash.clone();
                        cursor += 1;
                    }
                    current_hash = join;
                }
                Hop::Disconnected => {
                    // Nothing links the two roads, so close this run and restart
                    debug!(
                        "No junction between {} and {}, starting a new run",
                        current_road, next.road_hash
                    );
                    walk.path.push(PathStep::Break);
                    walk.path.push(PathStep::Node(next.hash.clone()));
                    current_hash = next.hash.clone();
                    current_road = next.road_hash.clone();
                    cursor += 1;
                }
            }
        }

        walk
    }

    fn next_hop(
        &self,
        current_hash: &str,
        current_road: &str,
        next: &MappedGpsPoint,
    ) -> Result<Hop, MatchError> {
        if next.hash == current_hash {
            return Ok(Hop::Stay);
        }

        let current_node = self
            .node(current_hash)
            .ok_or_else(|| MatchError::MissingNode(current_hash.to_string()))?;
        let next_node = self
            .node(&next.hash)
            .ok_or_else(|| MatchError::MissingNode(next.hash.clone()))?;
        let mut road = self
            .road(current_road)
            .ok_or_else(|| MatchError::MissingRoad(current_road.to_string()))?;
        let next_road = self
            .road(&next.road_hash)
            .ok_or_else(|| MatchError::MissingRoad(next.road_hash.clone()))?;

        // Standing on the junction of both roads means we already are on the next road
        if road.has_endpoint(current_hash) && next_road.has_endpoint(current_hash) {
            road = next_road;
        }

        if self.road_between(current_hash, &next.hash).is_some() {
            return Ok(Hop::Direct);
        }

        if road.hash() == next_road.hash() {
            return Ok(Hop::SameRoad);
        }

        Ok(
            match self.join_node(
                road,
                next_road,
                current_node.coordinate(),
                next_node.coordinate(),
            ) {
                Some(join) => Hop::Join(join),
                None => Hop::Disconnected,
            },
        )
    }

    /// The endpoint shared by two roads. When they share both ends the one giving the
    /// shorter planar detour from `from` to `to` wins, the first road's start on ties.
    fn join_node(
        &self,
        road: &Road,
        next_road: &Road,
        from: Coord<f64>,
        to: Coord<f64>,
    ) -> Option<GeoHash> {
        let shared = shared_endpoints(road, next_road);
        match shared.as_slice() {
            [] => None,
            [join] => Some(join.to_string()),
            candidates => {
                let mut best: Option<(&str, f64)> = None;
                for &hash in candidates {
                    let Some(node) = self.node(hash) else {
                        continue;
                    };
                    let detour = planar_distance(from, node.coordinate())
                        + planar_distance(node.coordinate(), to);
                    match best {
                        Some((_, best_detour)) if detour >= best_detour => {}
                        _ => best = Some((hash, detour)),
                    }
                }
                best.map(|(hash, _)| hash.to_string())
            }
        }
    }

    /// Whether the walk can get from `anchor` to `point` in a single hop
    fn reachable(&self, anchor: &MappedGpsPoint, point: &MappedGpsPoint) -> bool {
        if anchor.hash == point.hash || anchor.road_hash == point.road_hash {
            return true;
        }
        if self.road_between(&anchor.hash, &point.hash).is_some() {
            return true;
        }
        match (self.road(&anchor.road_hash), self.road(&point.road_hash)) {
            (Some(a), Some(b)) => !shared_endpoints(a, b).is_empty(),
            _ => false,
        }
    }

    /// Reduce the mapped points to the ends of each contiguous run.
    ///
    /// A run grows from its anchor over every following point reachable in one hop; the
    /// last reachable point closes the run and anchors the next one.
    pub fn select_targets(&self, mapped: &[MappedGpsPoint]) -> Vec<MappedGpsPoint> {
        if mapped.len() <= 2 {
            return mapped.to_vec();
        }

        let mut selected = vec![0];
        let mut anchor = 0;
        let mut last = 0;

        for i in 1..mapped.len() {
            if self.reachable(&mapped[anchor], &mapped[i]) {
                last = i;
                continue;
            }
            if last != anchor {
                selected.push(last);
                anchor = last;
                if self.reachable(&mapped[anchor], &mapped[i]) {
                    last = i;
                    continue;
                }
            }
            // Not reachable from the run's end either, so it opens a new run
            selected.push(i);
            anchor = i;
            last = i;
        }
        if last != anchor {
            selected.push(last);
        }

        debug!(
            "Simplified {} mapped points to {} targets",
            mapped.len(),
            selected.len()
        );
        selected.into_iter().map(|i| mapped[i].clone()).collect()
    }
}

fn insert_endpoint(nodes: &mut NodeMap, hash: &str, coordinate: Coord<f64>, road: EndpointRef) {
    match nodes.get_mut(hash) {
        Some(Node::RoadEndpoint(node)) => node.roads.push(road),
        Some(Node::Gps(gps)) => {
            let point = gps.point.clone();
            nodes.insert(
                hash.to_string(),
                Node::RoadEndpoint(EndpointNode {
                    hash: hash.to_string(),
                    coordinate,
                    roads: vec![road],
                    gps: Some(point),
                }),
            );
        }
        None => {
            nodes.insert(
                hash.to_string(),
                Node::RoadEndpoint(EndpointNode {
                    hash: hash.to_string(),
                    coordinate,
                    roads: vec![road],
                    gps: None,
                }),
            );
        }
    }
}

fn insert_gps(nodes: &mut NodeMap, point: &MappedGpsPoint) {
    match nodes.get_mut(&point.hash) {
        Some(Node::RoadEndpoint(node)) => {
            if node.gps.is_none() {
                node.gps = Some(point.clone());
            }
        }
        Some(Node::Gps(_)) => {
            trace!("GPS point {} shares node {}", point.source_index, point.hash);
        }
        None => {
            nodes.insert(
                point.hash.clone(),
                Node::Gps(GpsNode {
                    point: point.clone(),
                }),
            );
        }
    }
}

/// Remove immediate back-tracking until none is left.
///
/// Any `A, B, A` collapses to `A`, repeated nodes collapse to one, and runs shorter than
/// two nodes are trimmed together with stray breaks. Never makes the path longer.
pub fn heal_path(path: Vec<PathStep>) -> Vec<PathStep> {
    let mut path = path;

    loop {
        let before = path.len();
        path.dedup();

        let mut i = 1;
        while i + 1 < path.len() {
            let backtrack = matches!(
                (&path[i - 1], &path[i], &path[i + 1]),
                (PathStep::Node(a), PathStep::Node(_), PathStep::Node(c)) if a == c
            );
            if backtrack {
                trace!("Healing back-track through {}", path[i]);
                path.drain(i..=i + 1);
                i = i.saturating_sub(1).max(1);
            } else {
                i += 1;
            }
        }

        if path.len() == before {
            break;
        }
    }

    trim_runs(path)
}

/// Drop runs shorter than two nodes, along with leading, trailing and doubled breaks.
pub fn trim_runs(path: Vec<PathStep>) -> Vec<PathStep> {
    let mut trimmed = Vec::with_capacity(path.len());
    for run in split_runs(&path) {
        if run.len() < 2 {
            trace!("Trimming stray run of {} node(s)", run.len());
            continue;
        }
        if !trimmed.is_empty() {
            trimmed.push(PathStep::Break);
        }
        trimmed.extend(run.iter().map(|hash| PathStep::Node(hash.to_string())));
    }
    trimmed
}

/// Split a path on its breaks into runs of node hashes.
pub fn split_runs(path: &[PathStep]) -> Vec<Vec<&str>> {
    let mut runs = vec![Vec::new()];
    for step in path {
        match step {
            PathStep::Node(hash) => {
                if let Some(run) = runs.last_mut() {
                    run.push(hash.as_str());
                }
            }
            PathStep::Break => runs.push(Vec::new()),
        }
    }
    runs.retain(|run| !run.is_empty());
    runs
}

/// Build the node graph, walk the mapped points and heal the result.
///
/// Pure in its inputs: the same roads, points and options always give the same path.
pub fn build_graph(
    roads: &[Road],
    mapped_points: &[MappedGpsPoint],
    options: &BuildOptions,
) -> GraphBuild {
    let graph = RoadGraph::build(roads, mapped_points);

    let targets = if options.include_all_gps_points {
        mapped_points.to_vec()
    } else {
        graph.select_targets(mapped_points)
    };

    let walk = graph.walk(&targets, options);
    let path = heal_path(walk.path.clone());

    info!(
        "Walked {} targets in {} steps: {} path entries, {} after healing",
        targets.len(),
        walk.steps,
        walk.path.len(),
        path.len()
    );

    GraphBuild {
        graph,
        targets,
        raw_path: walk.path,
        path,
        issues: walk.issue.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geohash::{encode, hash_suffix};
    use crate::mapper::{MapOptions, map_gps_to_road};
    use geo::coord;

    fn road(points: &[(f64, f64)]) -> Road {
        Road::new(
            points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect(),
            9,
        )
        .unwrap()
    }

    fn map(roads: &[Road], points: &[(f64, f64)]) -> Vec<MappedGpsPoint> {
        let gps: Vec<Coord<f64>> = points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect();
        map_gps_to_road(roads, &gps, &MapOptions::default()).unwrap()
    }

    fn hash(x: f64, y: f64) -> String {
        encode(coord! { x: x, y: y }, 9).unwrap()
    }

    fn node(x: f64, y: f64) -> PathStep {
        PathStep::Node(hash(x, y))
    }

    fn steps(names: &[&str]) -> Vec<PathStep> {
        names
            .iter()
            .map(|&n| {
                if n == "-" {
                    PathStep::Break
                } else {
                    PathStep::Node(n.to_string())
                }
            })
            .collect()
    }

    fn triangle() -> Vec<Road> {
        vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(10.0, 0.0), (5.0, 5.0)]),
            road(&[(5.0, 5.0), (0.0, 0.0)]),
        ]
    }

    fn simplified() -> BuildOptions {
        BuildOptions {
            include_all_gps_points: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_nodes_merge_on_shared_hash() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (5.0, 5.0)]);
        let graph = RoadGraph::build(&roads, &mapped);

        // Three junctions plus one GPS point inside a road
        assert_eq!(graph.nodes().len(), 4);

        let junction = graph.node(&hash(5.0, 5.0)).unwrap();
        assert!(junction.is_road_endpoint());
        assert!(junction.is_gps());
        assert_eq!(
            junction.road_hashes(),
            vec![roads[1].hash(), roads[2].hash()]
        );

        let inner = graph.node(&hash(7.0, 0.0)).unwrap();
        assert!(!inner.is_road_endpoint());
        assert!(inner.is_gps());
        assert_eq!(inner.road_hashes(), vec![roads[0].hash()]);

        let plain = graph.node(&hash(10.0, 0.0)).unwrap();
        assert!(!plain.is_gps());
        assert_eq!(
            graph.road_between(&hash(0.0, 0.0), &hash(10.0, 0.0)).map(Road::hash),
            Some(roads[0].hash())
        );
        assert_eq!(
            graph.road_between(&hash(10.0, 0.0), &hash(0.0, 0.0)).map(Road::hash),
            Some(roads[0].hash())
        );
    }

    #[test]
    fn test_gps_node_upgraded_by_endpoint() {
        let roads = triangle();
        let mapped = map(&roads, &[(5.0, 5.0)]);
        let mut nodes = NodeMap::new();
        insert_gps(&mut nodes, &mapped[0]);
        insert_endpoint(
            &mut nodes,
            roads[2].start_hash(),
            roads[2].start(),
            EndpointRef {
                road_hash: roads[2].hash().to_string(),
                opposite: roads[2].end_hash().to_string(),
                is_start: true,
            },
        );
        let merged = nodes.get(roads[2].start_hash()).unwrap();
        assert!(merged.is_road_endpoint());
        assert_eq!(merged.gps_point(), Some(&mapped[0]));
    }

    #[test]
    fn test_triangle_full_path() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (7.5, 2.5), (5.0, 5.0)]);
        let build = build_graph(&roads, &mapped, &BuildOptions::default());

        assert_eq!(
            build.path,
            vec![node(7.0, 0.0), node(10.0, 0.0), node(7.5, 2.5), node(5.0, 5.0)]
        );
        let suffixes: Vec<&str> = build
            .path
            .iter()
            .filter_map(PathStep::hash)
            .map(|h| hash_suffix(h, 4))
            .collect();
        assert_eq!(suffixes[0], "rcpz");
        assert_eq!(suffixes[1], "xczb");
        assert_eq!(suffixes[3], "y0zh");
        assert!(build.issues.is_empty());
    }

    #[test]
    fn test_triangle_simplified_path() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (7.5, 2.5), (5.0, 5.0)]);
        let build = build_graph(&roads, &mapped, &simplified());

        assert_eq!(build.targets.len(), 2);
        let suffixes: Vec<&str> = build
            .path
            .iter()
            .filter_map(PathStep::hash)
            .map(|h| hash_suffix(h, 4))
            .collect();
        assert_eq!(suffixes, vec!["rcpz", "xczb", "y0zh"]);
    }

    #[test]
    fn test_disconnected_roads_break_the_path() {
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(10.0, 20.0), (20.0, 20.0)]),
        ];
        let mapped = map(
            &roads,
            &[(2.0, 0.0), (8.0, 0.0), (10.0, 10.0), (12.0, 20.0), (18.0, 20.0)],
        );
        let build = build_graph(&roads, &mapped, &simplified());

        assert_eq!(
            build.path,
            vec![
                node(2.0, 0.0),
                node(8.0, 0.0),
                PathStep::Break,
                node(12.0, 20.0),
                node(18.0, 20.0)
            ]
        );
    }

    #[test]
    fn test_single_node_run_is_trimmed() {
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(10.0, 20.0), (20.0, 20.0)]),
        ];
        let mapped = map(&roads, &[(2.0, 0.0), (12.0, 20.0), (18.0, 20.0)]);
        let build = build_graph(&roads, &mapped, &BuildOptions::default());

        assert_eq!(
            build.raw_path,
            vec![
                node(2.0, 0.0),
                PathStep::Break,
                node(12.0, 20.0),
                node(18.0, 20.0)
            ]
        );
        assert_eq!(build.path, vec![node(12.0, 20.0), node(18.0, 20.0)]);
    }

    #[test]
    fn test_walk_crosses_several_junctions() {
        // A chain of four roads; simplified mode must not break it
        let roads = vec![
            road(&[(0.0, 0.0), (1.0, 0.0)]),
            road(&[(1.0, 0.0), (2.0, 0.0)]),
            road(&[(2.0, 0.0), (3.0, 0.0)]),
            road(&[(3.0, 0.0), (4.0, 0.0)]),
        ];
        let mapped = map(&roads, &[(0.5, 0.0), (1.5, 0.0), (2.5, 0.0), (3.5, 0.0)]);

        let full = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(
            full.path,
            vec![
                node(0.5, 0.0),
                node(1.0, 0.0),
                node(1.5, 0.0),
                node(2.0, 0.0),
                node(2.5, 0.0),
                node(3.0, 0.0),
                node(3.5, 0.0)
            ]
        );

        let simple = build_graph(&roads, &mapped, &simplified());
        assert!(!simple.path.iter().any(PathStep::is_break));
        assert_eq!(simple.path.first(), Some(&node(0.5, 0.0)));
        assert_eq!(simple.path.last(), Some(&node(3.5, 0.0)));
    }

    #[test]
    fn test_gps_excursion_is_healed() {
        let roads = triangle();
        // Noise point on the second road between two points on the first
        let mapped = map(&roads, &[(7.0, 0.0), (9.0, 1.0), (8.0, 0.0)]);
        let build = build_graph(&roads, &mapped, &BuildOptions::default());

        assert_eq!(
            build.raw_path,
            vec![
                node(7.0, 0.0),
                node(10.0, 0.0),
                node(9.0, 1.0),
                node(10.0, 0.0),
                node(8.0, 0.0)
            ]
        );
        assert_eq!(
            build.path,
            vec![node(7.0, 0.0), node(10.0, 0.0), node(8.0, 0.0)]
        );
    }

    #[test]
    fn test_direct_road_between_endpoints() {
        let roads = triangle();
        let mapped = map(&roads, &[(0.0, 0.0), (10.0, 0.0), (5.0, 5.0)]);
        let build = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(
            build.path,
            vec![node(0.0, 0.0), node(10.0, 0.0), node(5.0, 5.0)]
        );
    }

    #[test]
    fn test_repeated_points_collapse() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (7.0, 0.0), (8.0, 0.0)]);
        let build = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(build.path, vec![node(7.0, 0.0), node(8.0, 0.0)]);
    }

    #[test]
    fn test_roads_sharing_both_endpoints() {
        // Two roads joining the same junctions; the shorter detour through a junction wins
        let roads = vec![
            road(&[(0.0, 0.0), (5.0, 1.0), (10.0, 0.0)]),
            road(&[(10.0, 0.0), (5.0, -1.0), (0.0, 0.0)]),
        ];
        let mapped = map(&roads, &[(8.0, 0.4), (7.5, -0.5)]);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[1].road_hash, roads[1].hash());

        let build = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(build.path.len(), 3);
        assert_eq!(build.path[1], node(10.0, 0.0));
    }

    #[test]
    fn test_same_direction_roads_keep_the_first() {
        // Same ordered endpoints, so the detour carries the straight road's hash
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(0.0, 0.0), (5.0, 5.0), (6.0, 5.0), (7.0, 5.0), (10.0, 0.0)]),
            road(&[(10.0, 0.0), (10.0, 10.0)]),
        ];
        assert_eq!(roads[0].hash(), roads[1].hash());

        let mapped = map(&roads, &[(2.0, 0.0), (5.5, 5.0), (8.0, 0.0), (10.0, 4.0)]);
        let sources: Vec<usize> = mapped.iter().map(|m| m.source_index).collect();
        assert_eq!(sources, vec![0, 2, 3]);

        let build = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(build.graph.road(roads[0].hash()), Some(&roads[0]));
        assert!(build.issues.is_empty());
        assert_eq!(
            build.path,
            vec![node(2.0, 0.0), node(8.0, 0.0), node(10.0, 0.0), node(10.0, 4.0)]
        );

        let result = crate::reconstruct::reconstruct(&build.graph, &build.path);
        assert!(result.issues.is_empty());
        assert_eq!(
            result.line_strings,
            vec![geo::LineString::from(vec![
                (2.0, 0.0),
                (8.0, 0.0),
                (10.0, 0.0),
                (10.0, 4.0)
            ])]
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (7.5, 2.5), (2.0, 2.0), (1.0, 0.0)]);
        let first = build_graph(&roads, &mapped, &BuildOptions::default());
        for _ in 0..5 {
            let again = build_graph(&roads, &mapped, &BuildOptions::default());
            assert_eq!(again.path, first.path);
            assert_eq!(again.raw_path, first.raw_path);
        }
    }

    #[test]
    fn test_missing_road_stops_walk() {
        let roads = triangle();
        let mut mapped = map(&roads, &[(7.0, 0.0), (8.0, 0.0), (9.0, 0.0)]);
        mapped[2].road_hash = "s0.s1".to_string();

        let build = build_graph(&roads, &mapped, &BuildOptions::default());
        assert_eq!(build.raw_path, vec![node(7.0, 0.0), node(8.0, 0.0)]);
        assert_eq!(
            build.issues,
            vec![MatchError::MissingRoad("s0.s1".to_string())]
        );
    }

    #[test]
    fn test_missing_node_stops_walk() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (8.0, 0.0)]);
        let graph = RoadGraph::build(&roads, &mapped[..1]);
        let walk = graph.walk(&mapped, &BuildOptions::default());
        assert_eq!(walk.path, vec![node(7.0, 0.0)]);
        assert_eq!(walk.issue, Some(MatchError::MissingNode(hash(8.0, 0.0))));
    }

    #[test]
    fn test_walk_step_cap() {
        let roads = triangle();
        let mapped = map(&roads, &[(7.0, 0.0), (7.5, 2.5), (5.0, 5.0)]);
        let graph = RoadGraph::build(&roads, &mapped);
        let options = BuildOptions {
            max_walk_steps: Some(1),
            ..Default::default()
        };
        let walk = graph.walk(&mapped, &options);
        assert_eq!(walk.steps, 1);
        assert_eq!(walk.path, vec![node(7.0, 0.0), node(10.0, 0.0)]);
        assert_eq!(walk.issue, Some(MatchError::WalkLimitExceeded { steps: 1 }));
    }

    #[test]
    fn test_heal_removes_all_backtracks() {
        let healed = heal_path(steps(&["a", "b", "c", "b", "a", "d"]));
        assert_eq!(healed, steps(&["a", "d"]));

        let healed = heal_path(steps(&["a", "b", "a", "b", "c"]));
        assert_eq!(healed, steps(&["a", "b", "c"]));

        // Back-tracks never span a break
        let healed = heal_path(steps(&["a", "b", "-", "b", "a"]));
        assert_eq!(healed, steps(&["a", "b", "-", "b", "a"]));
    }

    #[test]
    fn test_heal_never_grows_and_leaves_no_triples() {
        let inputs = [
            steps(&["a", "b", "a"]),
            steps(&["x", "-", "a", "b", "c", "d", "c", "b", "e"]),
            steps(&["a", "a", "b", "c", "c", "b", "-", "-", "q"]),
            steps(&["-", "a", "b", "-"]),
        ];
        for input in inputs {
            let len = input.len();
            let healed = heal_path(input);
            assert!(healed.len() <= len);
            for w in healed.windows(3) {
                if let (PathStep::Node(a), PathStep::Node(_), PathStep::Node(c)) =
                    (&w[0], &w[1], &w[2])
                {
                    assert_ne!(a, c);
                }
            }
            assert!(!healed.first().is_some_and(PathStep::is_break));
            assert!(!healed.last().is_some_and(PathStep::is_break));
            for run in split_runs(&healed) {
                assert!(run.len() >= 2);
            }
        }
    }

    #[test]
    fn test_path_step_display() {
        let rendered: Vec<String> = steps(&["ab", "-", "cd"])
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, vec!["ab", "-", "cd"]);
    }
}
