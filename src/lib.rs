//! Dynamic approximate neighbourhood function engine over online-mutated
//! directed graphs.
//!
//! The pieces compose the same way `webgraph-algo` composes its analyses
//! around a `RandomAccessGraph`: [`graph::MutableGraph`] is the storage,
//! [`counters::PackedCounterArray`] is the probabilistic counting
//! primitive, [`vertex_cover::VertexCover`] and [`msbfs`] are the
//! maintenance machinery, and [`engine::NeighbourhoodEngine`] is the
//! orchestrator a caller actually talks to.

pub mod counters;
pub mod engine;
pub mod error;
pub mod graph;
pub mod msbfs;
pub mod vertex_cover;
pub mod watcher;

/// Re-exports the types most callers need in scope.
pub mod prelude {
    pub use crate::engine::{NeighbourhoodEngine, NeighbourhoodEngineBuilder};
    pub use crate::error::{EngineError, Result};
    pub use crate::graph::{GraphProvider, MutableGraph};
    pub use crate::vertex_cover::VertexCover;
    pub use crate::watcher::{TopNodeWatcher, TopNodeWatcherBuilder};
}
