//! Storage module - property-graph persistence
//!
//! A fixed-schema property graph (memories, entities, tags, typed edges)
//! over SQLite with FTS5 fulltext indexes. [`GraphStore`] is the only
//! surface the rest of the engine talks to.

mod graph;
pub mod migrations;

pub use graph::{GraphStore, Result, StoreError};
