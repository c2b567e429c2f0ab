//! Search module - multi-signal hybrid retrieval
//!
//! Three independent signals (vector, BM25 keyword, graph traversal) run
//! concurrently per query, each normalizing its own scores to 0-1, and are
//! fused by weighted sum. The weights adapt to the query's shape.

mod classify;
mod hybrid;
mod keyword;
mod vector;

pub use classify::{adaptive_weights, classify_query, QueryClass, SignalWeights};
pub use hybrid::SearchEngine;
pub use keyword::sanitize_fts5_query;
pub use vector::{cosine_similarity, embedding_from_bytes, embedding_to_bytes};
