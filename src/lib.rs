//! Roadtrace - GPS trace to road network matching
//!
//! Snaps an ordered GPS trace onto a set of road polylines and rebuilds the route it
//! followed. Nodes are identified by geohash, so independently computed coordinates
//! that fall in the same cell are the same junction.
//!
//! # Pipeline
//!
//! - **[`mapper`]**: project each GPS point onto its nearest road within a threshold
//! - **[`graph_builder`]**: build the node graph, walk the points through shared junctions
//!   and heal back-tracking
//! - **[`reconstruct`]**: stitch road coordinates into one line string per run
//! - **[`TraceMatcher`]**: runs the three steps above
//!
//! [`astar`] is a standalone shortest-path search over a weighted node/edge graph.

pub mod astar;
pub mod debug;
pub mod error;
pub mod geohash;
pub mod graph_builder;
pub mod io;
pub mod mapper;
pub mod matcher;
pub mod projection;
pub mod reconstruct;
pub mod road;

// Public API exports
pub use astar::{Graph, a_star};
pub use error::{MatchError, Result};
pub use graph_builder::{BuildOptions, GraphBuild, Node, PathStep, RoadGraph, build_graph, heal_path};
pub use mapper::{MapOptions, MappedGpsPoint, map_gps_line_string_to_road, map_gps_to_road};
pub use matcher::{MatchResult, MatcherConfig, TraceMatcher};
pub use reconstruct::{Reconstruction, reconstruct};
pub use road::{Road, RoadHash};
