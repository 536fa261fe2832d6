use geo::{Coord, LineString};
use log::{debug, trace, warn};
use ordered_float::OrderedFloat;
use petgraph::graphmap::UnGraphMap;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::Result;
use crate::geohash::{self, GeoHash};
use crate::projection::planar_distance;

pub type NodeIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphNode {
    pub point: Coord<f64>,
    pub is_gps: bool,
}

/// Undirected graph weighted by planar edge length
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: UnGraphMap<NodeIndex, f64>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from points and index pairs; invalid pairs are skipped.
    pub fn from_parts(points: &[(Coord<f64>, bool)], edges: &[(NodeIndex, NodeIndex)]) -> Self {
        let mut graph = Self::new();
        for &(point, is_gps) in points {
            graph.add_node(point, is_gps);
        }
        for &(a, b) in edges {
            graph.add_edge(a, b);
        }
        graph
    }

    /// Build a graph from polylines: vertices sharing a geohash become one node and
    /// consecutive vertices are connected.
    pub fn from_line_strings(lines: &[LineString<f64>], precision: usize) -> Result<Self> {
        let mut graph = Self::new();
        let mut lookup: HashMap<GeoHash, NodeIndex> = HashMap::new();

        for line in lines {
            let mut previous: Option<NodeIndex> = None;
            for &coord in line.coords() {
                let hash = geohash::encode(coord, precision)?;
                let idx = match lookup.get(&hash) {
                    Some(&idx) => idx,
                    None => {
                        let idx = graph.add_node(coord, false);
                        lookup.insert(hash, idx);
                        idx
                    }
                };
                if let Some(prev) = previous {
                    if prev != idx {
                        graph.add_edge(prev, idx);
                    }
                }
                previous = Some(idx);
            }
        }

        debug!(
            "Built search graph with {} nodes and {} edges from {} lines",
            graph.node_count(),
            graph.edge_count(),
            lines.len()
        );
        Ok(graph)
    }

    pub fn add_node(&mut self, point: Coord<f64>, is_gps: bool) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(GraphNode { point, is_gps });
        self.edges.add_node(idx);
        idx
    }

    /// Connect two nodes, weighted by their planar distance. Self-loops and unknown
    /// nodes are rejected.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        if a == b {
            trace!("Rejecting self-loop on node {}", a);
            return false;
        }
        let (Some(from), Some(to)) = (self.nodes.get(a), self.nodes.get(b)) else {
            warn!("Edge {} - {} references an unknown node", a, b);
            return false;
        };
        let weight = planar_distance(from.point, to.point);
        self.edges.add_edge(a, b, weight);
        true
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&GraphNode> {
        self.nodes.get(idx)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.edge_count()
    }

    pub fn edge_weight(&self, a: NodeIndex, b: NodeIndex) -> Option<f64> {
        self.edges.edge_weight(a, b).copied()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.edges.edges(idx).map(|(_, to, &weight)| (to, weight))
    }
}

// Open set entry for A* search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenEntry {
    node: NodeIndex,
    f_score: OrderedFloat<f64>,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap, lower node index first on ties
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cheapest path from `start` to `goal`, both included.
///
/// Returns an empty path when the goal is unreachable or either node is unknown.
pub fn a_star(graph: &Graph, start: NodeIndex, goal: NodeIndex) -> Vec<NodeIndex> {
    let (Some(_), Some(goal_node)) = (graph.node(start), graph.node(goal)) else {
        debug!("A* endpoints {} -> {} are not in the graph", start, goal);
        return Vec::new();
    };
    let goal_point = goal_node.point;
    let heuristic = |idx: NodeIndex| {
        graph
            .node(idx)
            .map(|n| planar_distance(n.point, goal_point))
            .unwrap_or(0.0)
    };

    let mut open_set = BinaryHeap::new();
    let mut closed_set = HashSet::new();
    let mut g_scores: HashMap<NodeIndex, f64> = HashMap::new();
    let mut came_from: HashMap<NodeIndex, NodeIndex> = HashMap::new();

    g_scores.insert(start, 0.0);
    open_set.push(OpenEntry {
        node: start,
        f_score: OrderedFloat(heuristic(start)),
    });

    while let Some(OpenEntry { node: current, .. }) = open_set.pop() {
        if current == goal {
            return rebuild_path(&came_from, start, goal);
        }
        if !closed_set.insert(current) {
            continue;
        }

        let current_g = g_scores.get(&current).copied().unwrap_or(f64::INFINITY);
        for (neighbor, weight) in graph.neighbors(current) {
            if closed_set.contains(&neighbor) {
                continue;
            }
            let tentative = current_g + weight;
            let known = g_scores.get(&neighbor).copied().unwrap_or(f64::INFINITY);
            if tentative < known {
                came_from.insert(neighbor, current);
                g_scores.insert(neighbor, tentative);
                open_set.push(OpenEntry {
                    node: neighbor,
                    f_score: OrderedFloat(tentative + heuristic(neighbor)),
                });
            }
        }
    }

    debug!(
        "No path between {} and {} after closing {} nodes",
        start,
        goal,
        closed_set.len()
    );
    Vec::new()
}

fn rebuild_path(
    came_from: &HashMap<NodeIndex, NodeIndex>,
    start: NodeIndex,
    goal: NodeIndex,
) -> Vec<NodeIndex> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                path.push(prev);
                current = prev;
            }
            None => {
                warn!("Broken predecessor chain at node {}", current);
                return Vec::new();
            }
        }
    }
    path.reverse();
    path
}

/// Total edge weight along a path, `None` if two consecutive nodes are not connected.
pub fn path_cost(graph: &Graph, path: &[NodeIndex]) -> Option<f64> {
    path.windows(2)
        .map(|pair| graph.edge_weight(pair[0], pair[1]))
        .sum()
}
