//! # Engram Core
//!
//! Long-term memory engine for conversational AI agents. Memories live in
//! a property graph (memories, entities, tags, typed edges) and come back
//! through multi-signal retrieval:
//!
//! - **Hybrid Search**: vector, BM25 keyword, and graph-traversal signals
//!   run concurrently and fuse by weighted sum, with weights adapted to the
//!   query's shape
//! - **Attention Gate**: real-time heuristic admission filter on the
//!   capture path - no model call, no I/O
//! - **Extraction Pipeline**: LLM-backed conversion of free text into
//!   entities, allowlisted relationships, and tags, detached from the
//!   caller
//! - **Entity Deduplication**: substring-related same-type entities merge
//!   into their canonical form
//! - **Sleep Cycle**: seven-phase offline consolidation - dedup, Pareto
//!   scoring, core promotion/demotion, deferred extraction, decay pruning,
//!   orphan cleanup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::prelude::*;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let store = Arc::new(GraphStore::open(&config.store_path)?);
//!
//! // Capture a memory if it clears the gate
//! let text = "I prefer using TypeScript over JavaScript for all new projects";
//! if passes_attention_gate(text) {
//!     store.store_memory(MemoryInput { text: text.into(), ..Default::default() })?;
//! }
//!
//! // Retrieve
//! let engine = SearchEngine::new(store.clone(), embeddings.clone(), config.clone());
//! let results = engine.search("typescript preference", 5).await;
//!
//! // Consolidate offline
//! let report = run_sleep_cycle(&store, &embeddings, &llm, &config).await;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod consolidation;
pub mod dedup;
pub mod extraction;
pub mod gate;
pub mod memory;
pub mod providers;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration
pub use config::EngineConfig;

// Memory types
pub use memory::{
    canonicalize_name, is_allowed_relationship, EntityInput, EntityRecord, EntityType,
    ExtractionStatus, MemoryCategory, MemoryInput, MemoryRecord, MemorySource, MemoryStats,
    ScoredMemory, SignalContributions, RELATIONSHIP_TYPES,
};

// Storage layer
pub use storage::{GraphStore, Result, StoreError};

// Provider contracts
pub use providers::{EmbeddingProvider, LlmProvider, ProviderError};

// Search
pub use search::{
    adaptive_weights, classify_query, cosine_similarity, QueryClass, SearchEngine, SignalWeights,
};

// Attention gate
pub use gate::{passes_attention_gate, passes_attention_gate_assistant};

// Extraction pipeline
pub use extraction::{
    extract_entities, parse_extraction, run_background_extraction, spawn_background_extraction,
    ExtractionOutcome, ExtractionResult,
};

// Entity deduplication
pub use dedup::{
    find_duplicate_entity_pairs, merge_entity_pair, reconcile_entity_mention_counts, DuplicatePair,
};

// Sleep cycle
pub use consolidation::{
    effective_score, run_sleep_cycle, PhaseReport, SleepCycleResult,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        passes_attention_gate, passes_attention_gate_assistant, run_sleep_cycle,
        spawn_background_extraction, EmbeddingProvider, EngineConfig, EntityInput, EntityRecord,
        GraphStore, LlmProvider, MemoryCategory, MemoryInput, MemoryRecord, Result, ScoredMemory,
        SearchEngine, SleepCycleResult, StoreError,
    };
}
