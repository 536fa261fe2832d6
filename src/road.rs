use geo::{BoundingRect, Coord, LineString, Rect};
use rstar::{AABB, RTree, RTreeObject};
use std::collections::HashSet;

use crate::error::{MatchError, Result};
use crate::geohash::{self, GeoHash};

/// Road identity: `"{startGeoHash}.{endGeoHash}"`
pub type RoadHash = String;

/// A road polyline with its endpoint-derived identity
#[derive(Clone, Debug, PartialEq)]
pub struct Road {
    hash: RoadHash,
    start_hash: GeoHash,
    end_hash: GeoHash,
    coordinates: Vec<Coord<f64>>,
}

impl Road {
    /// Create a road, hashing its endpoints at `precision`.
    pub fn new(coordinates: Vec<Coord<f64>>, precision: usize) -> Result<Self> {
        validate_coordinates(&coordinates)?;
        let start_hash = geohash::encode(coordinates[0], precision)?;
        let end_hash = geohash::encode(coordinates[coordinates.len() - 1], precision)?;

        Ok(Self {
            hash: format!("{}.{}", start_hash, end_hash),
            start_hash,
            end_hash,
            coordinates,
        })
    }

    /// Create a road that was tagged with a road hash upstream.
    pub fn with_hash(hash: impl Into<RoadHash>, coordinates: Vec<Coord<f64>>) -> Result<Self> {
        let hash = hash.into();
        validate_coordinates(&coordinates)?;
        let (start_hash, end_hash) = split_road_hash(&hash)?;

        Ok(Self {
            start_hash: start_hash.to_string(),
            end_hash: end_hash.to_string(),
            hash,
            coordinates,
        })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn start_hash(&self) -> &str {
        &self.start_hash
    }

    pub fn end_hash(&self) -> &str {
        &self.end_hash
    }

    pub fn coordinates(&self) -> &[Coord<f64>] {
        &self.coordinates
    }

    pub fn start(&self) -> Coord<f64> {
        self.coordinates[0]
    }

    pub fn end(&self) -> Coord<f64> {
        self.coordinates[self.coordinates.len() - 1]
    }

    /// Start and end geohash, in that order
    pub fn endpoints(&self) -> [&str; 2] {
        [self.start_hash.as_str(), self.end_hash.as_str()]
    }

    pub fn has_endpoint(&self, hash: &str) -> bool {
        self.start_hash == hash || self.end_hash == hash
    }

    /// The endpoint on the other side of `hash`, if `hash` is one of ours
    pub fn opposite_end(&self, hash: &str) -> Option<&str> {
        if self.start_hash == hash {
            Some(&self.end_hash)
        } else if self.end_hash == hash {
            Some(&self.start_hash)
        } else {
            None
        }
    }

    /// Whether the road's two endpoints are exactly `a` and `b`, in either order
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.start_hash == a && self.end_hash == b) || (self.start_hash == b && self.end_hash == a)
    }

    /// Loops start and end in the same cell
    pub fn is_closed(&self) -> bool {
        self.start_hash == self.end_hash
    }

    pub fn line_string(&self) -> LineString<f64> {
        LineString::from(self.coordinates.clone())
    }

    pub fn bounding_box(&self) -> Rect<f64> {
        // Construction guarantees at least two coordinates
        self.line_string()
            .bounding_rect()
            .unwrap_or_else(|| Rect::new(self.start(), self.end()))
    }
}

/// Endpoint hashes shared by two roads, in `a`'s start/end order and without repeats.
pub fn shared_endpoints<'a>(a: &'a Road, b: &Road) -> Vec<&'a str> {
    let mut shared: Vec<&str> = Vec::with_capacity(2);
    for hash in a.endpoints() {
        if b.has_endpoint(hash) && !shared.contains(&hash) {
            shared.push(hash);
        }
    }
    shared
}

/// Build the road hash for a pair of endpoints.
pub fn road_hash(start: Coord<f64>, end: Coord<f64>, precision: usize) -> Result<RoadHash> {
    Ok(format!(
        "{}.{}",
        geohash::encode(start, precision)?,
        geohash::encode(end, precision)?
    ))
}

/// Split a road hash into its start and end geohash.
pub fn split_road_hash(hash: &str) -> Result<(&str, &str)> {
    match hash.split_once('.') {
        Some((start, end)) if geohash::is_valid(start) && geohash::is_valid(end) => {
            Ok((start, end))
        }
        _ => Err(MatchError::InvalidRoadHash(hash.to_string())),
    }
}

/// Indices of the first road carrying each road hash, in input order.
///
/// Roads with the same ordered endpoints share one identity; later ones are skipped by
/// both the mapper and the graph so a mapped point always refers to the road the graph
/// holds under its hash.
pub fn distinct_road_indices(roads: &[Road]) -> Vec<usize> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(roads.len());
    roads
        .iter()
        .enumerate()
        .filter(|(_, road)| seen.insert(road.hash()))
        .map(|(idx, _)| idx)
        .collect()
}

fn validate_coordinates(coordinates: &[Coord<f64>]) -> Result<()> {
    if coordinates.len() < 2 {
        return Err(MatchError::InvalidGeometry(format!(
            "road needs at least two coordinates, got {}",
            coordinates.len()
        )));
    }
    for coord in coordinates {
        geohash::validate_position(*coord)?;
    }
    Ok(())
}

// Road bounding box entry for the R-tree
struct IndexedRoad {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRoad {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over road bounding boxes
pub struct RoadIndex {
    tree: RTree<IndexedRoad>,
}

impl RoadIndex {
    /// Index the first road of each road hash; duplicates are never candidates.
    pub fn new(roads: &[Road]) -> Self {
        let entries = distinct_road_indices(roads)
            .into_iter()
            .map(|index| {
                let bbox = roads[index].bounding_box();
                IndexedRoad {
                    index,
                    envelope: AABB::from_corners(
                        [bbox.min().x, bbox.min().y],
                        [bbox.max().x, bbox.max().y],
                    ),
                }
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices of roads whose bounding box lies within `max_distance` of `point`,
    /// sorted in input order.
    pub fn candidates(&self, point: Coord<f64>, max_distance: f64) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [point.x - max_distance, point.y - max_distance],
            [point.x + max_distance, point.y + max_distance],
        );

        let mut indices: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.index)
            .collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn road(points: &[(f64, f64)]) -> Road {
        Road::new(
            points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect(),
            9,
        )
        .unwrap()
    }

    #[test]
    fn test_road_hash_from_endpoints() {
        let r = road(&[(0.0, 0.0), (5.0, 1.0), (10.0, 0.0)]);
        assert_eq!(r.hash(), "7zzzzzzzz.kpzpgxczb");
        assert_eq!(r.start_hash(), "7zzzzzzzz");
        assert_eq!(r.end_hash(), "kpzpgxczb");
        assert_eq!(split_road_hash(r.hash()).unwrap(), (r.start_hash(), r.end_hash()));
        assert_eq!(
            road_hash(r.start(), r.end(), 9).unwrap(),
            r.hash().to_string()
        );
    }

    #[test]
    fn test_invalid_roads_rejected() {
        assert!(matches!(
            Road::new(vec![coord! { x: 0.0, y: 0.0 }], 9),
            Err(MatchError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Road::new(vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 0.0, y: 95.0 }], 9),
            Err(MatchError::CoordinateOutOfRange { .. })
        ));
        let coords = vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 0.0 }];
        assert!(matches!(
            Road::with_hash("nodot", coords.clone()),
            Err(MatchError::InvalidRoadHash(_))
        ));
        assert!(Road::with_hash("abc.s0", coords.clone()).is_err());
        let tagged = Road::with_hash("s0.s1", coords).unwrap();
        assert_eq!(tagged.endpoints(), ["s0", "s1"]);
    }

    #[test]
    fn test_endpoint_queries() {
        let a = road(&[(0.0, 0.0), (10.0, 0.0)]);
        let b = road(&[(10.0, 0.0), (5.0, 5.0)]);
        let c = road(&[(10.0, 20.0), (20.0, 20.0)]);

        assert!(a.connects(b.start_hash(), a.start_hash()));
        assert_eq!(a.opposite_end(a.end_hash()), Some(a.start_hash()));
        assert_eq!(a.opposite_end(c.start_hash()), None);
        assert_eq!(shared_endpoints(&a, &b), vec![a.end_hash()]);
        assert!(shared_endpoints(&a, &c).is_empty());

        // Two roads joining the same pair of junctions
        let d = road(&[(0.0, 0.0), (5.0, -3.0), (10.0, 0.0)]);
        assert_eq!(shared_endpoints(&a, &d).len(), 2);
        assert!(!a.is_closed());
        assert!(road(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_closed());
    }

    #[test]
    fn test_index_candidates() {
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(10.0, 20.0), (20.0, 20.0)]),
            road(&[(0.0, 0.0), (0.0, 10.0)]),
        ];
        let index = RoadIndex::new(&roads);
        assert_eq!(index.len(), 3);
        assert_eq!(index.candidates(coord! { x: 0.0, y: 0.001 }, 0.005), vec![0, 2]);
        assert_eq!(index.candidates(coord! { x: 15.0, y: 20.0 }, 0.005), vec![1]);
        assert!(index.candidates(coord! { x: 10.0, y: 10.0 }, 0.005).is_empty());
    }

    #[test]
    fn test_duplicate_hashes_indexed_once() {
        let roads = vec![
            road(&[(0.0, 0.0), (10.0, 0.0)]),
            road(&[(0.0, 0.0), (5.0, 5.0), (6.0, 5.0), (7.0, 5.0), (10.0, 0.0)]),
            road(&[(10.0, 0.0), (0.0, 0.0)]),
        ];
        assert_eq!(roads[0].hash(), roads[1].hash());
        assert_eq!(distinct_road_indices(&roads), vec![0, 2]);

        let index = RoadIndex::new(&roads);
        assert_eq!(index.len(), 2);
        // On the detour only, which shares the first road's hash
        assert!(index.candidates(coord! { x: 5.5, y: 5.0 }, 0.005).is_empty());
    }
}
