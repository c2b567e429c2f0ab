//! Memory module - Core types and data structures
//!
//! Implements the property-graph memory model:
//! - Memories: free-text nodes with embeddings and importance
//! - Entities and tags: structured nodes extracted from memories
//! - Typed edges: MENTIONS, TAGGED, and allowlisted entity relationships

mod record;

pub use record::{
    canonicalize_name, is_allowed_relationship, EntityEdge, EntityInput, EntityRecord, EntityType,
    ExtractionStatus, MemoryCategory, MemoryInput, MemoryRecord, MemorySource, RELATIONSHIP_TYPES,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// SEARCH RESULTS
// ============================================================================

/// Which retrieval signals contributed to a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalContributions {
    pub vector: bool,
    pub bm25: bool,
    pub graph: bool,
}

/// A memory returned by hybrid search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMemory {
    /// The memory record
    pub memory: MemoryRecord,
    /// Fused score, re-normalized so the top result is 1.0
    pub score: f64,
    /// Signals that returned this memory
    pub signals: SignalContributions,
}

/// A raw (id, normalized score) hit from a single retrieval signal
pub type SignalHit = (String, f64);

// ============================================================================
// STATS
// ============================================================================

/// Aggregate store statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_memories: i64,
    pub core_memories: i64,
    pub pending_extraction: i64,
    pub total_entities: i64,
    pub total_tags: i64,
}
