use geo::{Coord, LineString};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::graph_builder::{Node, RoadGraph};
use crate::mapper::MappedGpsPoint;
use crate::matcher::MatchResult;
use crate::road::Road;

const ROAD_COLOR: &str = "#3388ff";
const GPS_COLOR: &str = "#ff8800";
const MATCH_COLOR: &str = "#ff0000";
const JUNCTION_COLOR: &str = "#333333";

/// Unified debug visualization utilities
pub struct DebugVisualizer;

impl DebugVisualizer {
    /// Generate debugging GeoJSON for roads
    pub fn generate_roads_geojson(
        roads: &[Road],
        properties: Option<HashMap<&str, Value>>,
    ) -> Value {
        let default_props = properties.unwrap_or_else(|| {
            let mut props = HashMap::new();
            props.insert("color", json!(ROAD_COLOR));
            props.insert("weight", json!(4));
            props.insert("opacity", json!(0.8));
            props
        });

        let features: Vec<Value> = roads
            .iter()
            .map(|road| {
                let mut road_props = serde_json::Map::new();
                road_props.insert("type".to_string(), json!("road"));
                road_props.insert("roadHash".to_string(), json!(road.hash()));
                road_props.insert("vertices".to_string(), json!(road.coordinates().len()));
                for (key, value) in &default_props {
                    road_props.insert(key.to_string(), value.clone());
                }

                json!({
                    "type": "Feature",
                    "properties": road_props,
                    "geometry": {
                        "type": "LineString",
                        "coordinates": line_coordinates(&road.line_string())
                    }
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features
        })
    }

    /// Generate GeoJSON for raw GPS points, their projections and the links between them
    pub fn generate_mapped_points_geojson(mapped: &[MappedGpsPoint]) -> Value {
        let mut features = Vec::new();

        for point in mapped {
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "type": "gps_point",
                    "index": point.source_index,
                    "hash": point.src_hash,
                    "color": GPS_COLOR,
                    "description": format!("GPS Point #{}", point.source_index)
                },
                "geometry": {
                    "type": "Point",
                    "coordinates": [point.source.x, point.source.y]
                }
            }));

            features.push(json!({
                "type": "Feature",
                "properties": {
                    "type": "projection",
                    "index": point.source_index,
                    "hash": point.hash,
                    "roadHash": point.road_hash,
                    "segment": point.segment_index,
                    "fraction": point.fraction,
                    "color": MATCH_COLOR,
                    "radius": 5
                },
                "geometry": {
                    "type": "Point",
                    "coordinates": [point.coordinate.x, point.coordinate.y]
                }
            }));

            features.push(json!({
                "type": "Feature",
                "properties": {
                    "type": "projection_line",
                    "distance": point.distance,
                    "color": GPS_COLOR,
                    "opacity": 0.5,
                    "weight": 2,
                    "dashArray": "5,5"
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [
                        [point.source.x, point.source.y],
                        [point.coordinate.x, point.coordinate.y]
                    ]
                }
            }));
        }

        json!({
            "type": "FeatureCollection",
            "features": features
        })
    }

    /// Generate GeoJSON for every node of the road graph, sorted by hash
    pub fn generate_nodes_geojson(graph: &RoadGraph) -> Value {
        let mut nodes: Vec<&Node> = graph.nodes().values().collect();
        nodes.sort_by(|a, b| a.hash().cmp(b.hash()));

        let features: Vec<Value> = nodes
            .into_iter()
            .map(|node| {
                let c = node.coordinate();
                let kind = if node.is_road_endpoint() { "junction" } else { "gps_node" };
                json!({
                    "type": "Feature",
                    "properties": {
                        "type": kind,
                        "hash": node.hash(),
                        "gps": node.is_gps(),
                        "roads": node.road_hashes(),
                        "color": if node.is_road_endpoint() { JUNCTION_COLOR } else { GPS_COLOR }
                    },
                    "geometry": {
                        "type": "Point",
                        "coordinates": [c.x, c.y]
                    }
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features
        })
    }

    /// Generate one GeoJSON with roads, mapped points and the matched route
    pub fn generate_match_geojson(roads: &[Road], result: &MatchResult) -> Value {
        let mut features = Vec::new();

        for layer in [
            Self::generate_roads_geojson(roads, None),
            Self::generate_mapped_points_geojson(&result.mapped_points),
        ] {
            if let Some(layer_features) = layer["features"].as_array() {
                features.extend(layer_features.iter().cloned());
            }
        }

        for (i, line) in result.line_strings.iter().enumerate() {
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "type": "matched_route",
                    "run": i,
                    "path": result.path_string(),
                    "color": MATCH_COLOR,
                    "weight": 6,
                    "opacity": 0.9
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": line_coordinates(line)
                }
            }));
        }

        json!({
            "type": "FeatureCollection",
            "features": features
        })
    }

    /// Render roads, graph nodes and the matched route as a standalone SVG diagram
    pub fn generate_svg(roads: &[Road], graph: Option<&RoadGraph>, matched: &[LineString<f64>]) -> String {
        let all_coords: Vec<Coord<f64>> = roads
            .iter()
            .flat_map(|r| r.coordinates().iter().copied())
            .chain(matched.iter().flat_map(|l| l.coords().copied()))
            .collect();
        let frame = Frame::fit(&all_coords, 800.0);

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}">"#,
            frame.width, frame.height, frame.width, frame.height
        ));
        lines.push(r#"<rect width="100%" height="100%" fill="white"/>"#.to_string());

        for road in roads {
            lines.push(format!(
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="3" opacity="0.8"><title>{}</title></polyline>"#,
                frame.points(road.coordinates()),
                ROAD_COLOR,
                road.hash()
            ));
        }

        for line in matched {
            lines.push(format!(
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="5" opacity="0.7"/>"#,
                frame.points(&line.0),
                MATCH_COLOR
            ));
        }

        if let Some(graph) = graph {
            let mut nodes: Vec<&Node> = graph.nodes().values().collect();
            nodes.sort_by(|a, b| a.hash().cmp(b.hash()));
            for node in nodes {
                let (x, y) = frame.project(node.coordinate());
                let (fill, radius) = if node.is_road_endpoint() {
                    (JUNCTION_COLOR, 4)
                } else {
                    (GPS_COLOR, 3)
                };
                lines.push(format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{}" fill="{}"><title>{}</title></circle>"#,
                    x,
                    y,
                    radius,
                    fill,
                    node.hash()
                ));
            }
        }

        lines.push("</svg>\n".to_string());
        lines.join("\n")
    }
}

fn line_coordinates(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

// Maps coordinates into SVG pixels, y pointing down
struct Frame {
    min: Coord<f64>,
    scale: f64,
    margin: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn fit(coords: &[Coord<f64>], size: f64) -> Self {
        let margin = 20.0;
        let mut min = Coord { x: f64::INFINITY, y: f64::INFINITY };
        let mut max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };
        for c in coords {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        if coords.is_empty() {
            min = Coord { x: 0.0, y: 0.0 };
            max = Coord { x: 1.0, y: 1.0 };
        }

        let span = (max.x - min.x).max(max.y - min.y).max(f64::EPSILON);
        let scale = (size - 2.0 * margin) / span;
        Self {
            min,
            scale,
            margin,
            width: (max.x - min.x) * scale + 2.0 * margin,
            height: (max.y - min.y) * scale + 2.0 * margin,
        }
    }

    fn project(&self, c: Coord<f64>) -> (f64, f64) {
        (
            self.margin + (c.x - self.min.x) * self.scale,
            self.height - self.margin - (c.y - self.min.y) * self.scale,
        )
    }

    fn points(&self, coords: &[Coord<f64>]) -> String {
        coords
            .iter()
            .map(|&c| {
                let (x, y) = self.project(c);
                format!("{:.2},{:.2}", x, y)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatcherConfig, TraceMatcher};
    use geo::coord;

    fn triangle() -> Vec<Road> {
        [
            [(0.0, 0.0), (10.0, 0.0)],
            [(10.0, 0.0), (5.0, 5.0)],
            [(5.0, 5.0), (0.0, 0.0)],
        ]
        .iter()
        .map(|pts| Road::new(pts.iter().map(|&(x, y)| coord! { x: x, y: y }).collect(), 9).unwrap())
        .collect()
    }

    #[test]
    fn test_match_geojson_layers() {
        let roads = triangle();
        let matcher = TraceMatcher::new(MatcherConfig::default()).unwrap();
        let result = matcher
            .match_points(&roads, &[coord! { x: 7.0, y: 0.0 }, coord! { x: 7.5, y: 2.5 }])
            .unwrap();

        let value = DebugVisualizer::generate_match_geojson(&roads, &result);
        let features = value["features"].as_array().unwrap();
        // 3 roads, 3 features per mapped point, 1 matched route
        assert_eq!(features.len(), 3 + 2 * 3 + 1);
        assert_eq!(features[0]["properties"]["roadHash"], roads[0].hash());
        assert_eq!(features.last().unwrap()["properties"]["type"], "matched_route");
    }

    #[test]
    fn test_nodes_geojson_sorted() {
        let roads = triangle();
        let graph = RoadGraph::build(&roads, &[]);
        let value = DebugVisualizer::generate_nodes_geojson(&graph);
        let hashes: Vec<&str> = value["features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f["properties"]["hash"].as_str())
            .collect();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes, sorted);
    }

    #[test]
    fn test_svg_diagram() {
        let roads = triangle();
        let graph = RoadGraph::build(&roads, &[]);
        let svg = DebugVisualizer::generate_svg(
            &roads,
            Some(&graph),
            &[LineString::from(vec![(0.0, 0.0), (10.0, 0.0)])],
        );
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 4);
        assert_eq!(svg.matches("<circle").count(), 3);

        let empty = DebugVisualizer::generate_svg(&[], None, &[]);
        assert!(empty.contains("</svg>"));
    }
}
