//! Hybrid search engine
//!
//! Fusion rules:
//! - every signal normalizes its own raw scores to 0-1 before fusion
//! - a memory returned by several signals is boosted, never duplicated:
//!   fused score is the sum of `weight x signal score` per id
//! - final scores are re-normalized so the best result is exactly 1.0
//! - no candidates is an empty result, not an error
//!
//! Retrieval telemetry is fire-and-forget: the counter bump runs on a
//! detached task and its failure never reaches the caller.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use super::{adaptive_weights, classify_query};
use crate::config::EngineConfig;
use crate::memory::{ScoredMemory, SignalContributions, SignalHit};
use crate::providers::EmbeddingProvider;
use crate::storage::GraphStore;

/// Query embeddings cached per engine; repeated queries skip the provider
const QUERY_CACHE_SIZE: usize = 256;

// ============================================================================
// SEARCH ENGINE
// ============================================================================

/// Multi-signal retrieval over a [`GraphStore`]
pub struct SearchEngine {
    store: Arc<GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl SearchEngine {
    pub fn new(
        store: Arc<GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero");
        Self {
            store,
            embeddings,
            config,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Embed a query, serving repeats from the LRU cache.
    ///
    /// Embedding failure degrades to `None` - the query still runs on the
    /// keyword and graph signals.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(embedding) = cache.get(query) {
                return Some(embedding.clone());
            }
        }

        match self.embeddings.embed(query).await {
            Ok(embedding) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(query.to_string(), embedding.clone());
                }
                Some(embedding)
            }
            Err(e) => {
                tracing::warn!("Query embedding failed, vector signal disabled: {}", e);
                None
            }
        }
    }

    /// Run a hybrid search, returning at most `limit` scored memories.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ScoredMemory> {
        if limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let weights = adaptive_weights(classify_query(query), self.config.graph_enabled);
        let candidate_limit = limit.saturating_mul(self.config.candidate_multiplier.max(1));
        let query_embedding = self.embed_query(query).await;

        // The three signals are read-only against the store; run them
        // concurrently and block on the slowest
        let vector_task = {
            let store = self.store.clone();
            let agent = self.config.agent_id.clone();
            let min_score = self.config.min_vector_score;
            tokio::task::spawn_blocking(move || match query_embedding {
                Some(embedding) => store.vector_search(&embedding, &agent, candidate_limit, min_score),
                None => Vec::new(),
            })
        };
        let bm25_task = {
            let store = self.store.clone();
            let agent = self.config.agent_id.clone();
            let q = query.to_string();
            tokio::task::spawn_blocking(move || store.bm25_search(&q, &agent, candidate_limit))
        };
        let graph_task = {
            let store = self.store.clone();
            let agent = self.config.agent_id.clone();
            let q = query.to_string();
            let firing_threshold = self.config.firing_threshold;
            let enabled = weights.graph > 0.0;
            tokio::task::spawn_blocking(move || {
                if enabled {
                    store.graph_search(&q, &agent, candidate_limit, firing_threshold)
                } else {
                    Vec::new()
                }
            })
        };

        let (vector_hits, bm25_hits, graph_hits) =
            tokio::join!(vector_task, bm25_task, graph_task);
        let vector_hits = vector_hits.unwrap_or_default();
        let bm25_hits = bm25_hits.unwrap_or_default();
        let graph_hits = graph_hits.unwrap_or_default();

        // Weighted-sum fusion, deduplicated by memory id
        let mut fused: HashMap<String, (f64, SignalContributions)> = HashMap::new();
        let mut add_signal = |hits: Vec<SignalHit>, weight: f64, mark: fn(&mut SignalContributions)| {
            for (id, score) in hits {
                let entry = fused.entry(id).or_insert((
                    0.0,
                    SignalContributions {
                        vector: false,
                        bm25: false,
                        graph: false,
                    },
                ));
                entry.0 += score * weight;
                mark(&mut entry.1);
            }
        };
        add_signal(vector_hits, weights.vector, |s| s.vector = true);
        add_signal(bm25_hits, weights.bm25, |s| s.bm25 = true);
        add_signal(graph_hits, weights.graph, |s| s.graph = true);

        if fused.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(String, f64, SignalContributions)> = fused
            .into_iter()
            .map(|(id, (score, signals))| (id, score, signals))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);

        let top_score = ranked[0].1;
        let mut results = Vec::with_capacity(ranked.len());
        for (id, score, signals) in ranked {
            match self.store.get_memory(&id) {
                Ok(Some(memory)) => results.push(ScoredMemory {
                    memory,
                    score: if top_score > 0.0 { score / top_score } else { score },
                    signals,
                }),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to load search hit {}: {}", id, e),
            }
        }

        // Fire-and-forget telemetry; never blocks or fails the search
        let ids: Vec<String> = results.iter().map(|r| r.memory.id.clone()).collect();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.record_retrieval(&ids) {
                tracing::warn!("Retrieval telemetry failed: {}", e);
            }
        });

        results
    }
}

// ============================================================================
// TESTS
// ============================================================================
