#![forbid(unsafe_code)]

//! Headless graph layout, edge routing and overlap removal.
//!
//! - [`layout`]: force-directed vertex placement (Fruchterman-Reingold, Kamada-Kawai, ISOM and
//!   a Barnes-Hut accelerated LinLog).
//! - [`routing`]: polyline routes for the edges of a laid-out graph (corner hopping, A* grid
//!   search and force-directed bundling).
//! - [`overlap`]: moves rectangles apart without resizing them.
//!
//! Every algorithm works over any [`GraphView`], is synchronous, deterministic for a given seed
//! and polls a [`CancelToken`] so a caller on another thread can stop it.

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod layout;
pub mod overlap;
pub mod rng;
pub mod routing;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use geometry::{Point, Rect, Size, Vector};
pub use graph::{EdgeId, Graph, GraphView};
pub use layout::{Algorithm, InitialLayout, LayoutAlgorithm, VertexPositions, layout};
pub use overlap::{OverlapRemoval, Way};
pub use routing::{EdgeRouter, EdgeRoutes, RoutingInput, VertexSizes};
