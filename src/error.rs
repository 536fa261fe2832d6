/// Errors raised by the matching pipeline.
///
/// Input errors are returned as `Err` at the entry point. Inconsistencies are
/// collected per run in the `issues` of a build or reconstruction and never abort
/// the whole pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid geohash precision {0} (expected 1..={max})", max = crate::geohash::MAX_PRECISION)]
    InvalidPrecision(usize),

    #[error("Coordinate out of range: lon {lon}, lat {lat}")]
    CoordinateOutOfRange { lon: f64, lat: f64 },

    #[error("Invalid geohash {0:?}")]
    InvalidGeoHash(String),

    #[error("Invalid road hash {0:?}")]
    InvalidRoadHash(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node {0} is not in the node map")]
    MissingNode(String),

    #[error("Road {0} is not in the road graph")]
    MissingRoad(String),

    #[error("Nodes {head} and {tail} share no road")]
    NoSharedRoad { head: String, tail: String },

    #[error("Walk stopped after {steps} steps")]
    WalkLimitExceeded { steps: usize },
}

impl MatchError {
    /// True for caller-side input problems, false for internal inconsistencies.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MatchError::InvalidGeometry(_)
                | MatchError::InvalidPrecision(_)
                | MatchError::CoordinateOutOfRange { .. }
                | MatchError::InvalidGeoHash(_)
                | MatchError::InvalidRoadHash(_)
                | MatchError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MatchError::InvalidPrecision(0).is_input_error());
        assert!(MatchError::InvalidGeometry("road".into()).is_input_error());
        assert!(!MatchError::MissingNode("s0".into()).is_input_error());
        assert!(!MatchError::WalkLimitExceeded { steps: 3 }.is_input_error());
    }

    #[test]
    fn test_error_messages() {
        let err = MatchError::InvalidPrecision(0);
        assert_eq!(
            err.to_string(),
            "Invalid geohash precision 0 (expected 1..=12)"
        );
        let err = MatchError::NoSharedRoad {
            head: "a".into(),
            tail: "b".into(),
        };
        assert_eq!(err.to_string(), "Nodes a and b share no road");
    }
}
