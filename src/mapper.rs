use geo::{Coord, LineString};
use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::geohash::{self, DEFAULT_PRECISION, GeoHash};
use crate::projection::{Projection, project};
use crate::road::{Road, RoadHash, RoadIndex};

/// Default snapping threshold, in coordinate units
pub const DEFAULT_MAX_DISTANCE: f64 = 0.005;

/// Options for snapping GPS points onto roads
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// Points farther than this from every road are dropped (same units as coordinates)
    pub max_distance: f64,
    /// Geohash length used for node identity
    pub hash_precision: usize,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            hash_precision: DEFAULT_PRECISION,
        }
    }
}

impl MapOptions {
    pub fn validate(&self) -> Result<()> {
        geohash::validate_precision(self.hash_precision)?;
        if !self.max_distance.is_finite() || self.max_distance < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "max_distance must be a finite non-negative number, got {}",
                self.max_distance
            )));
        }
        Ok(())
    }
}

/// A GPS point snapped onto its nearest road
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappedGpsPoint {
    /// Projected coordinate on the road
    pub coordinate: Coord<f64>,
    /// Geohash of the projected coordinate
    pub hash: GeoHash,
    /// Planar distance between the raw point and the road
    pub distance: f64,
    /// Index of the road vertex preceding the projection
    pub segment_index: usize,
    /// Position on the matched segment, 0 at its start and 1 at its end
    pub fraction: f64,
    /// Road the point was matched to
    pub road_hash: RoadHash,
    /// Geohash of the raw, unprojected point
    pub src_hash: GeoHash,
    /// Raw GPS coordinate
    pub source: Coord<f64>,
    /// Position of the raw point in the caller's input
    pub source_index: usize,
}

/// Snap each GPS point onto the nearest road within `options.max_distance`.
///
/// Points without a road in range are silently dropped, so the output can be shorter
/// than the input. Between equidistant roads the first one in `roads` wins.
pub fn map_gps_to_road(
    roads: &[Road],
    gps_points: &[Coord<f64>],
    options: &MapOptions,
) -> Result<Vec<MappedGpsPoint>> {
    options.validate()?;

    let index = RoadIndex::new(roads);
    let mapped: Vec<Option<MappedGpsPoint>> = gps_points
        .par_iter()
        .enumerate()
        .map(|(i, point)| map_point(roads, &index, *point, i, options))
        .collect::<Result<_>>()?;

    let mapped: Vec<MappedGpsPoint> = mapped.into_iter().flatten().collect();

    info!(
        "Mapped {} of {} GPS points onto {} roads",
        mapped.len(),
        gps_points.len(),
        roads.len()
    );

    Ok(mapped)
}

/// Snap every coordinate of a continuous trace, all lines flattened in order.
pub fn map_gps_line_string_to_road(
    roads: &[Road],
    trace: &[LineString<f64>],
    options: &MapOptions,
) -> Result<Vec<MappedGpsPoint>> {
    let points: Vec<Coord<f64>> = trace.iter().flat_map(|line| line.0.iter().copied()).collect();
    debug!(
        "Flattened trace of {} lines into {} points",
        trace.len(),
        points.len()
    );
    map_gps_to_road(roads, &points, options)
}

fn map_point(
    roads: &[Road],
    index: &RoadIndex,
    point: Coord<f64>,
    source_index: usize,
    options: &MapOptions,
) -> Result<Option<MappedGpsPoint>> {
    let src_hash = geohash::encode(point, options.hash_precision)?;

    // Candidates come back in input order, so a strict comparison keeps the first road on ties
    let mut best: Option<(usize, Projection)> = None;
    for road_idx in index.candidates(point, options.max_distance) {
        let Some(projection) = project(point, roads[road_idx].coordinates()) else {
            continue;
        };
        match &best {
            Some((_, current)) if projection.distance >= current.distance => {}
            _ => best = Some((road_idx, projection)),
        }
    }

    let Some((road_idx, projection)) = best else {
        trace!("GPS point {} at {:?} has no road candidates", source_index, point);
        return Ok(None);
    };

    if projection.distance > options.max_distance {
        trace!(
            "GPS point {} dropped: nearest road is {:.6} away (max {})",
            source_index, projection.distance, options.max_distance
        );
        return Ok(None);
    }

    let road = &roads[road_idx];
    Ok(Some(MappedGpsPoint {
        coordinate: projection.coordinate,
        hash: geohash::encode(projection.coordinate, options.hash_precision)?,
        distance: projection.distance,
        segment_index: projection.segment_index,
        fraction: projection.fraction,
        road_hash: road.hash().to_string(),
        src_hash,
        source: point,
        source_index,
    }))
}
