use anyhow::{Context, Result, anyhow, bail};
use geo::{Coord, LineString};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeometryValue};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::mapper::MappedGpsPoint;
use crate::road::Road;

/// Property carrying a pre-computed road hash on road features
pub const ROAD_HASH_PROPERTY: &str = "roadHash";

// Positions may carry an altitude; only x and y are kept
fn to_coord(position: &[f64]) -> Result<Coord<f64>> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        other => bail!("Position needs at least two values, got {:?}", other),
    }
}

fn to_coords(positions: &[Vec<f64>]) -> Result<Vec<Coord<f64>>> {
    positions.iter().map(|p| to_coord(p)).collect()
}

fn geometry_points(geometry: &Geometry) -> Result<Vec<Coord<f64>>> {
    match &geometry.value {
        GeometryValue::Point(position) => Ok(vec![to_coord(position)?]),
        GeometryValue::MultiPoint(positions) => to_coords(positions),
        _ => Ok(Vec::new()),
    }
}

fn geometry_lines(geometry: &Geometry) -> Result<Vec<Vec<Coord<f64>>>> {
    match &geometry.value {
        GeometryValue::LineString(positions) => Ok(vec![to_coords(positions)?]),
        GeometryValue::MultiLineString(parts) => parts.iter().map(|p| to_coords(p)).collect(),
        _ => Ok(Vec::new()),
    }
}

fn road_hash_property(feature: &Feature) -> Option<&str> {
    feature.property(ROAD_HASH_PROPERTY).and_then(Value::as_str)
}

/// Parse a GeoJSON FeatureCollection.
pub fn parse_feature_collection(json: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = json.parse().context("Failed to parse GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        GeoJson::Feature(_) => bail!("Expected a FeatureCollection, got a Feature"),
        GeoJson::Geometry(_) => bail!("Expected a FeatureCollection, got a bare Geometry"),
    }
}

/// Every LineString, and each part of a MultiLineString, becomes a road.
///
/// A `roadHash` property is kept as the road's identity; other roads are hashed from
/// their endpoints at `precision`.
pub fn roads_from_geojson(json: &str, precision: usize) -> Result<Vec<Road>> {
    let collection = parse_feature_collection(json)?;
    let mut roads = Vec::new();

    for (idx, feature) in collection.features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let lines = geometry_lines(geometry)
            .with_context(|| format!("Invalid geometry in road feature {}", idx))?;
        let single = matches!(geometry.value, GeometryValue::LineString(_));
        let tagged = road_hash_property(feature);
        if tagged.is_some() && !single {
            warn!(
                "Road feature {} has {} parts but one roadHash, hashing parts from their endpoints",
                idx,
                lines.len()
            );
        }

        for line in lines {
            let road = match tagged {
                Some(hash) if single => Road::with_hash(hash, line),
                _ => Road::new(line, precision),
            }
            .with_context(|| format!("Invalid road in feature {}", idx))?;
            roads.push(road);
        }
    }

    debug!("Loaded {} roads from {} features", roads.len(), collection.features.len());
    Ok(roads)
}

/// All Point and MultiPoint coordinates, in document order.
pub fn gps_points_from_geojson(json: &str) -> Result<Vec<Coord<f64>>> {
    let collection = parse_feature_collection(json)?;
    let mut points = Vec::new();
    for (idx, feature) in collection.features.iter().enumerate() {
        if let Some(geometry) = &feature.geometry {
            points.extend(
                geometry_points(geometry)
                    .with_context(|| format!("Invalid geometry in GPS feature {}", idx))?,
            );
        }
    }
    if points.is_empty() {
        return Err(anyhow!("No GPS points found"));
    }
    Ok(points)
}

/// All LineString coordinates, one line per part, in document order.
pub fn gps_trace_from_geojson(json: &str) -> Result<Vec<LineString<f64>>> {
    let collection = parse_feature_collection(json)?;
    let mut trace = Vec::new();
    for (idx, feature) in collection.features.iter().enumerate() {
        if let Some(geometry) = &feature.geometry {
            let lines = geometry_lines(geometry)
                .with_context(|| format!("Invalid trace geometry in feature {}", idx))?;
            trace.extend(lines.into_iter().map(LineString::from));
        }
    }
    if trace.is_empty() {
        return Err(anyhow!("No GPS trace lines found"));
    }
    Ok(trace)
}

/// Matched geometry as a FeatureCollection with one LineString per run
pub fn line_strings_to_geojson(lines: &[LineString<f64>]) -> FeatureCollection {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let mut f = Feature::from(Geometry::from(line));
            f.set_property("run", i);
            f.set_property("points", line.0.len());
            f
        })
        .collect()
}

/// Mapped points as a plain JSON array, one object per point
pub fn mapped_points_to_json(mapped: &[MappedGpsPoint]) -> Result<Value> {
    serde_json::to_value(mapped).context("Failed to serialize mapped points")
}

pub fn read_roads(path: &Path, precision: usize) -> Result<Vec<Road>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read roads from {}", path.display()))?;
    roads_from_geojson(&json, precision)
}

pub fn read_gps_points(path: &Path) -> Result<Vec<Coord<f64>>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read GPS points from {}", path.display()))?;
    gps_points_from_geojson(&json)
}

pub fn read_gps_trace(path: &Path) -> Result<Vec<LineString<f64>>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read GPS trace from {}", path.display()))?;
    gps_trace_from_geojson(&json)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
