use geo::{Coord, Distance, Euclidean, Point};

/// Closest location on a polyline to a given point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Projected coordinate on the polyline
    pub coordinate: Coord<f64>,
    /// Planar distance from the input point to `coordinate`
    pub distance: f64,
    /// Index of the polyline vertex starting the matched segment
    pub segment_index: usize,
    /// Position along the matched segment, 0 at its start and 1 at its end
    pub fraction: f64,
}

/// Project `point` onto the nearest location of `polyline`.
///
/// Every segment is evaluated; the perpendicular foot is clamped to the segment and the
/// globally closest candidate wins, the lowest segment index on ties. Distances are planar
/// on raw coordinate values. Returns `None` when the polyline has fewer than two vertices.
pub fn project(point: Coord<f64>, polyline: &[Coord<f64>]) -> Option<Projection> {
    if polyline.len() < 2 {
        return None;
    }

    let mut best: Option<Projection> = None;

    for (i, pair) in polyline.windows(2).enumerate() {
        let candidate = project_on_segment(point, pair[0], pair[1], i);
        match &best {
            Some(current) if candidate.distance >= current.distance => {}
            _ => best = Some(candidate),
        }
    }

    best
}

fn project_on_segment(
    point: Coord<f64>,
    start: Coord<f64>,
    end: Coord<f64>,
    segment_index: usize,
) -> Projection {
    let delta = end - start;
    let length_squared = delta.x * delta.x + delta.y * delta.y;

    // Zero-length segments project onto their start
    let fraction = if length_squared == 0.0 {
        0.0
    } else {
        let offset = point - start;
        ((offset.x * delta.x + offset.y * delta.y) / length_squared).clamp(0.0, 1.0)
    };

    let coordinate = if fraction == 0.0 {
        start
    } else if fraction == 1.0 {
        end
    } else {
        start + delta * fraction
    };

    Projection {
        coordinate,
        distance: planar_distance(point, coordinate),
        segment_index,
        fraction,
    }
}

/// Planar Euclidean distance between two coordinates
pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean.distance(Point::from(a), Point::from(b))
}
