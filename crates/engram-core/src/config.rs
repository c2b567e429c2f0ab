//! Engine configuration
//!
//! One flat struct of knobs with sensible defaults. Hosts parse their
//! own config files; the engine takes the resolved values and fails fast in
//! [`EngineConfig::validate`] on anything that would only surface later as
//! a confusing runtime error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the memory engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Path of the SQLite store
    pub store_path: PathBuf,
    /// Default agent scope for operations that don't name one
    pub agent_id: String,
    /// Embedding dimension; must match the provider's declared dimension
    pub embedding_dimensions: usize,

    // ========== Retrieval ==========
    /// Whether the graph signal participates in hybrid search
    pub graph_enabled: bool,
    /// Candidate pool per signal = limit * this multiplier
    pub candidate_multiplier: usize,
    /// Minimum cosine score for the vector signal
    pub min_vector_score: f64,
    /// Minimum edge confidence for second-hop graph traversal
    pub firing_threshold: f64,

    // ========== Extraction ==========
    /// Whether LLM extraction runs at all
    pub extraction_enabled: bool,

    // ========== Sleep cycle ==========
    /// Cosine similarity at or above which memories are duplicates
    pub dedup_similarity_threshold: f64,
    /// Fraction of memories treated as the Pareto head (core candidates)
    pub pareto_fraction: f64,
    /// Minimum age before a memory can be promoted to core
    pub min_promotion_age_days: i64,
    /// Half-life for the Pareto age-decay term
    pub scoring_half_life_days: f64,
    /// Weight of the retrieval-frequency term in effective scoring
    pub frequency_weight: f64,
    /// Batch size for sleep-cycle extraction
    pub extraction_batch_size: usize,
    /// Delay between extraction batches (rate-limit relief)
    pub inter_batch_delay_ms: u64,
    /// Half-life for decay pruning
    pub decay_half_life_days: f64,
    /// Memories decaying below this are pruned
    pub retention_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("engram.db"),
            agent_id: "default".to_string(),
            embedding_dimensions: 768,
            graph_enabled: true,
            candidate_multiplier: 6,
            min_vector_score: 0.1,
            firing_threshold: 0.3,
            extraction_enabled: true,
            dedup_similarity_threshold: 0.95,
            pareto_fraction: 0.2,
            min_promotion_age_days: 7,
            scoring_half_life_days: 30.0,
            frequency_weight: 0.3,
            extraction_batch_size: 50,
            inter_batch_delay_ms: 1000,
            decay_half_life_days: 30.0,
            retention_threshold: 0.1,
        }
    }
}

impl EngineConfig {
    /// Fail fast on configuration that cannot work
    pub fn validate(&self) -> Result<(), String> {
        if self.store_path.as_os_str().is_empty() {
            return Err("store_path must not be empty".to_string());
        }
        if self.agent_id.trim().is_empty() {
            return Err("agent_id must not be empty".to_string());
        }
        if self.embedding_dimensions == 0 {
            return Err("embedding_dimensions must be non-zero".to_string());
        }
        if self.candidate_multiplier == 0 {
            return Err("candidate_multiplier must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.pareto_fraction) {
            return Err("pareto_fraction must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.dedup_similarity_threshold) {
            return Err("dedup_similarity_threshold must be within [0, 1]".to_string());
        }
        if self.decay_half_life_days <= 0.0 || self.scoring_half_life_days <= 0.0 {
            return Err("half-life values must be positive".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.agent_id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.embedding_dimensions = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.pareto_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
