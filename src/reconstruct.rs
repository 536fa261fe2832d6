use geo::{Coord, LineString};
use log::{debug, error, trace};
use std::cmp::Ordering;

use crate::error::MatchError;
use crate::graph_builder::{Node, PathStep, RoadGraph, split_runs};
use crate::road::Road;

/// Geometry rebuilt from a walked path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    /// One line per run of the path
    pub line_strings: Vec<LineString<f64>>,
    /// Runs that could not be rebuilt, in path order
    pub issues: Vec<MatchError>,
}

// Where a node sits along a road, normalized so vertex k is (k, 0.0)
#[derive(Debug, Clone, Copy)]
struct RoadPosition {
    index: usize,
    fraction: f64,
    coordinate: Coord<f64>,
}

impl RoadPosition {
    fn vertex(index: usize, coordinate: Coord<f64>) -> Self {
        Self {
            index,
            fraction: 0.0,
            coordinate,
        }
    }

    fn on_segment(segment_index: usize, fraction: f64, coordinate: Coord<f64>) -> Self {
        if fraction >= 1.0 {
            Self::vertex(segment_index + 1, coordinate)
        } else {
            Self {
                index: segment_index,
                fraction,
                coordinate,
            }
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then(self.fraction.total_cmp(&other.fraction))
    }
}

/// Rebuild the geometry of a path, one line string per run.
///
/// Consecutive nodes joined by a road are stitched with that road's full coordinates;
/// nodes that merely share a road get the road's vertices strictly between them. A run
/// with an unknown node or a pair sharing no road is dropped and reported in `issues`.
pub fn reconstruct(graph: &RoadGraph, path: &[PathStep]) -> Reconstruction {
    let mut result = Reconstruction::default();

    for (run_idx, run) in split_runs(path).into_iter().enumerate() {
        if run.len() < 2 {
            trace!("Run {} has a single node, no geometry", run_idx);
            continue;
        }

        match reconstruct_run(graph, &run) {
            Ok(coords) if coords.len() >= 2 => {
                result.line_strings.push(LineString::from(coords));
            }
            Ok(_) => {
                debug!("Run {} collapsed to a single coordinate", run_idx);
            }
            Err(e) => {
                error!("Failed to rebuild run {}: {}", run_idx, e);
                result.issues.push(e);
            }
        }
    }

    debug!(
        "Rebuilt {} line strings with {} issues",
        result.line_strings.len(),
        result.issues.len()
    );
    result
}

fn reconstruct_run(graph: &RoadGraph, run: &[&str]) -> Result<Vec<Coord<f64>>, MatchError> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(run.len() * 2);

    for (pair_idx, pair) in run.windows(2).enumerate() {
        let (head_hash, tail_hash) = (pair[0], pair[1]);
        let head = graph
            .node(head_hash)
            .ok_or_else(|| MatchError::MissingNode(head_hash.to_string()))?;
        let tail = graph
            .node(tail_hash)
            .ok_or_else(|| MatchError::MissingNode(tail_hash.to_string()))?;

        if let Some(road) = graph.road_between(head_hash, tail_hash) {
            trace!("{} -> {} follows road {}", head_hash, tail_hash, road.hash());
            if road.start_hash() == head_hash {
                for &c in road.coordinates() {
                    push_coord(&mut coords, c);
                }
            } else {
                for &c in road.coordinates().iter().rev() {
                    push_coord(&mut coords, c);
                }
            }
            continue;
        }

        let (road, from, to) = shared_road(graph, head, tail).ok_or_else(|| {
            MatchError::NoSharedRoad {
                head: head_hash.to_string(),
                tail: tail_hash.to_string(),
            }
        })?;

        // Positions that do not fit the road's vertices mean the point was mapped elsewhere
        let between = vertices_between(road, &from, &to).ok_or_else(|| {
            error!(
                "Positions of {} and {} fall outside road {}",
                head_hash,
                tail_hash,
                road.hash()
            );
            MatchError::NoSharedRoad {
                head: head_hash.to_string(),
                tail: tail_hash.to_string(),
            }
        })?;

        if pair_idx == 0 {
            push_coord(&mut coords, from.coordinate);
        }
        for c in between {
            push_coord(&mut coords, c);
        }
        push_coord(&mut coords, to.coordinate);
    }

    Ok(coords)
}

// First road carrying both nodes, in the head's road order, with both positions on it
fn shared_road<'a>(
    graph: &'a RoadGraph,
    head: &Node,
    tail: &Node,
) -> Option<(&'a Road, RoadPosition, RoadPosition)> {
    let tail_roads = tail.road_hashes();
    head.road_hashes()
        .into_iter()
        .filter(|hash| tail_roads.contains(hash))
        .filter_map(|hash| graph.road(hash))
        .find_map(|road| {
            let from = position_on(head, road, false)?;
            let to = position_on(tail, road, true)?;
            Some((road, from, to))
        })
}

fn position_on(node: &Node, road: &Road, as_tail: bool) -> Option<RoadPosition> {
    if let Some(point) = node.gps_point() {
        if point.road_hash == road.hash() {
            return Some(RoadPosition::on_segment(
                point.segment_index,
                point.fraction,
                point.coordinate,
            ));
        }
    }

    let last = road.coordinates().len() - 1;
    let start = RoadPosition::vertex(0, road.start());
    let end = RoadPosition::vertex(last, road.end());
    match (road.start_hash() == node.hash(), road.end_hash() == node.hash()) {
        // Loops: leave from the start, arrive at the end
        (true, true) => Some(if as_tail { end } else { start }),
        (true, false) => Some(start),
        (false, true) => Some(end),
        (false, false) => None,
    }
}

// Road vertices strictly between two positions, in travel order. None when either
// position lies past the road's last vertex.
fn vertices_between(
    road: &Road,
    from: &RoadPosition,
    to: &RoadPosition,
) -> Option<Vec<Coord<f64>>> {
    let coords = road.coordinates();
    if from.index >= coords.len() || to.index >= coords.len() {
        return None;
    }

    match from.compare(to) {
        Ordering::Less => {
            // Skip the vertex we leave from, keep the one we arrive past
            let first = from.index + 1;
            let last = if to.fraction > 0.0 {
                to.index
            } else {
                to.index.saturating_sub(1)
            };
            if first > last {
                return Some(Vec::new());
            }
            coords.get(first..=last).map(<[Coord<f64>]>::to_vec)
        }
        Ordering::Greater => {
            // Travelling backwards: same slice, walked in reverse
            let first = if from.fraction > 0.0 {
                from.index
            } else {
                from.index.saturating_sub(1)
            };
            let last = to.index + 1;
            if last > first {
                return Some(Vec::new());
            }
            coords
                .get(last..=first)
                .map(|slice| slice.iter().rev().copied().collect())
        }
        Ordering::Equal => Some(Vec::new()),
    }
}

fn push_coord(coords: &mut Vec<Coord<f64>>, c: Coord<f64>) {
    if coords.last() != Some(&c) {
        coords.push(c);
    }
}
