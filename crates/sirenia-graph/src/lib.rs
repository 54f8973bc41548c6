//! Graph view APIs used by `sirenia`.
//!
//! Layout and routing algorithms never depend on a concrete graph representation: they consume
//! any type implementing [`GraphView`]. [`Graph`] is the index-backed directed multigraph shipped
//! for callers that do not bring their own.

mod graph;
mod view;

pub use graph::{EdgeId, Graph};
pub use view::GraphView;
