//! Sleep cycle orchestrator
//!
//! Seven strictly sequential phases; each phase's output is an input
//! invariant for the next. A phase failure halts the pipeline but the
//! result still carries every phase that ran - partial completion is a
//! success outcome. On an already-consolidated store the whole cycle is a
//! fixed point: every counter comes back zero.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

use super::{effective_score, pareto_threshold, PhaseReport, SleepCycleResult};
use crate::config::EngineConfig;
use crate::dedup::{find_duplicate_entity_pairs, merge_entity_pair};
use crate::extraction::run_background_extraction;
use crate::memory::{MemoryCategory, MemoryRecord};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::storage::{GraphStore, Result as StoreResult};

// ============================================================================
// ADVISORY LOCK
// ============================================================================

/// Agents with a cycle currently in flight.
///
/// Two concurrent cycles for one agent would corrupt the Pareto threshold:
/// phase 2 reads a snapshot that phases 3-4 then mutate. In-process
/// advisory locking is sufficient because the store is single-process.
static ACTIVE_CYCLES: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

struct CycleGuard {
    agent_id: String,
}

impl CycleGuard {
    fn acquire(agent_id: &str) -> Option<Self> {
        let mut active = match ACTIVE_CYCLES.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.insert(agent_id.to_string()).then(|| Self {
            agent_id: agent_id.to_string(),
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut active = match ACTIVE_CYCLES.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.agent_id);
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

fn phase_ok(name: &str, items: usize, start: Instant) -> PhaseReport {
    PhaseReport {
        name: name.to_string(),
        items_processed: items,
        duration_ms: start.elapsed().as_millis() as u64,
        error: None,
    }
}

fn phase_failed(name: &str, start: Instant, error: &crate::storage::StoreError) -> PhaseReport {
    PhaseReport {
        name: name.to_string(),
        items_processed: 0,
        duration_ms: start.elapsed().as_millis() as u64,
        error: Some(error.to_string()),
    }
}

/// Run one full sleep cycle for the configured agent.
///
/// Returns immediately with `aborted=true` and no phases if another cycle
/// for the same agent is already running.
pub async fn run_sleep_cycle(
    store: &Arc<GraphStore>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    llm: &Arc<dyn LlmProvider>,
    config: &EngineConfig,
) -> SleepCycleResult {
    let agent_id = config.agent_id.as_str();
    let mut result = SleepCycleResult::default();

    let Some(_guard) = CycleGuard::acquire(agent_id) else {
        tracing::warn!("Sleep cycle already running for agent {}, skipping", agent_id);
        result.aborted = true;
        return result;
    };

    tracing::info!("Sleep cycle starting for agent {}", agent_id);
    let cycle_start = Instant::now();

    macro_rules! abort_on {
        ($name:expr, $start:expr, $err:expr) => {{
            tracing::error!("Sleep cycle aborted in {}: {}", $name, $err);
            result.phases.push(phase_failed($name, $start, &$err));
            result.aborted = true;
            result.total_duration_ms = cycle_start.elapsed().as_millis() as u64;
            return result;
        }};
    }

    // Phase 1: Deduplication
    let start = Instant::now();
    match phase_dedup(store, config) {
        Ok((memories_merged, entities_merged)) => {
            result.merged = memories_merged;
            result.entities_merged = entities_merged;
            result.phases.push(phase_ok(
                "deduplication",
                memories_merged + entities_merged,
                start,
            ));
        }
        Err(e) => abort_on!("deduplication", start, e),
    }

    // Phase 2: Pareto scoring
    let start = Instant::now();
    let (scored, threshold) = match phase_score(store, config) {
        Ok(outcome) => {
            result.phases.push(phase_ok("pareto-scoring", outcome.0.len(), start));
            outcome
        }
        Err(e) => abort_on!("pareto-scoring", start, e),
    };

    // Phase 3: Core promotion
    let start = Instant::now();
    match phase_promote(store, config, &scored, threshold) {
        Ok(promoted) => {
            result.promoted = promoted;
            result.phases.push(phase_ok("core-promotion", promoted, start));
        }
        Err(e) => abort_on!("core-promotion", start, e),
    }

    // Phase 4: Core demotion
    let start = Instant::now();
    match phase_demote(store, &scored, threshold) {
        Ok(demoted) => {
            result.demoted = demoted;
            result.phases.push(phase_ok("core-demotion", demoted, start));
        }
        Err(e) => abort_on!("core-demotion", start, e),
    }

    // Phase 5: Batched extraction
    let start = Instant::now();
    match phase_extract(store, embeddings, llm, config).await {
        Ok(extracted) => {
            result.extracted = extracted;
            result.phases.push(phase_ok("extraction", extracted, start));
        }
        Err(e) => abort_on!("extraction", start, e),
    }

    // Phase 6: Decay and pruning
    let start = Instant::now();
    match phase_prune(store, config) {
        Ok(pruned) => {
            result.pruned = pruned;
            result.phases.push(phase_ok("decay-pruning", pruned, start));
        }
        Err(e) => abort_on!("decay-pruning", start, e),
    }

    // Phase 7: Orphan cleanup
    let start = Instant::now();
    match phase_orphans(store) {
        Ok(removed) => {
            result.orphans_removed = removed;
            result.phases.push(phase_ok("orphan-cleanup", removed, start));
        }
        Err(e) => abort_on!("orphan-cleanup", start, e),
    }

    result.total_duration_ms = cycle_start.elapsed().as_millis() as u64;
    tracing::info!(
        "Sleep cycle complete for agent {}: merged={} promoted={} demoted={} extracted={} pruned={} orphans={} ({}ms)",
        agent_id,
        result.merged + result.entities_merged,
        result.promoted,
        result.demoted,
        result.extracted,
        result.pruned,
        result.orphans_removed,
        result.total_duration_ms
    );
    result
}

// ============================================================================
// PHASES
// ============================================================================

/// Phase 1: merge near-identical memories, then duplicate entities.
///
/// Memories are walked oldest first; each unmerged memory absorbs every
/// later memory whose embedding similarity clears the threshold, so a
/// cluster collapses into its oldest member.
fn phase_dedup(store: &Arc<GraphStore>, config: &EngineConfig) -> StoreResult<(usize, usize)> {
    let memories = store.memories_for_agent(&config.agent_id)?;
    let mut merged_away: HashSet<String> = HashSet::new();
    let mut canonical: HashSet<String> = HashSet::new();
    let mut memories_merged = 0usize;

    for memory in &memories {
        if merged_away.contains(&memory.id) {
            continue;
        }
        let Some(embedding) = &memory.embedding else {
            continue;
        };
        canonical.insert(memory.id.clone());

        let hits = store.find_similar(
            embedding,
            &config.agent_id,
            config.dedup_similarity_threshold,
            50,
            Some(&memory.id),
        );
        for (hit_id, _) in hits {
            if merged_away.contains(&hit_id) || canonical.contains(&hit_id) {
                continue;
            }
            store.merge_duplicate_memory(&memory.id, &hit_id)?;
            merged_away.insert(hit_id);
            memories_merged += 1;
        }
    }

    let mut removed: HashSet<String> = HashSet::new();
    let mut entities_merged = 0usize;
    for pair in find_duplicate_entity_pairs(store)? {
        if removed.contains(&pair.keep_id) || removed.contains(&pair.remove_id) {
            continue;
        }
        if merge_entity_pair(store, &pair.keep_id, &pair.remove_id) {
            removed.insert(pair.remove_id);
            entities_merged += 1;
        }
    }

    Ok((memories_merged, entities_merged))
}

type ScoredMemories = Vec<(MemoryRecord, f64)>;

/// Phase 2: effective score per memory and the top-fraction threshold
fn phase_score(
    store: &Arc<GraphStore>,
    config: &EngineConfig,
) -> StoreResult<(ScoredMemories, Option<f64>)> {
    let now = Utc::now();
    let scored: ScoredMemories = store
        .memories_for_agent(&config.agent_id)?
        .into_iter()
        .map(|memory| {
            let score = effective_score(
                &memory,
                now,
                config.scoring_half_life_days,
                config.frequency_weight,
            );
            (memory, score)
        })
        .collect();

    let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
    let threshold = pareto_threshold(&scores, config.pareto_fraction);
    Ok((scored, threshold))
}

/// Phase 3: promote regular memories at or above the threshold.
///
/// The age floor keeps a transient retrieval spike on a fresh memory from
/// promoting it.
fn phase_promote(
    store: &Arc<GraphStore>,
    config: &EngineConfig,
    scored: &ScoredMemories,
    threshold: Option<f64>,
) -> StoreResult<usize> {
    let Some(threshold) = threshold else {
        return Ok(0);
    };

    let now = Utc::now();
    let min_age = chrono::Duration::days(config.min_promotion_age_days);
    let mut promoted = 0usize;

    for (memory, score) in scored {
        if memory.category == MemoryCategory::Core {
            continue;
        }
        if *score >= threshold && now - memory.created_at >= min_age {
            store.promote_memory(&memory.id)?;
            promoted += 1;
        }
    }
    Ok(promoted)
}

/// Phase 4: demote core memories that fell below the threshold
fn phase_demote(
    store: &Arc<GraphStore>,
    scored: &ScoredMemories,
    threshold: Option<f64>,
) -> StoreResult<usize> {
    let Some(threshold) = threshold else {
        return Ok(0);
    };

    let mut demoted = 0usize;
    for (memory, score) in scored {
        if memory.category == MemoryCategory::Core && *score < threshold {
            store.demote_memory(&memory.id)?;
            demoted += 1;
        }
    }
    Ok(demoted)
}

/// Phase 5: run deferred extraction in throttled batches
async fn phase_extract(
    store: &Arc<GraphStore>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    llm: &Arc<dyn LlmProvider>,
    config: &EngineConfig,
) -> StoreResult<usize> {
    let batch_size = config.extraction_batch_size.max(1);
    let mut processed = 0usize;

    loop {
        let batch = store.pending_extraction(&config.agent_id, batch_size)?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len();

        for memory in batch {
            run_background_extraction(store, embeddings, llm, &memory.id, &memory.text, config)
                .await?;
            processed += 1;
        }

        if batch_len < batch_size {
            break;
        }
        // Throttle between batches to respect provider rate limits
        tokio::time::sleep(Duration::from_millis(config.inter_batch_delay_ms)).await;
    }

    Ok(processed)
}

/// Phase 6: delete memories whose effective score fell below retention.
///
/// The frequency term stays in the score, so a memory retrieved often
/// enough holds a floor that age cannot erode. Core memories are exempt -
/// demotion (phase 4) is the only way out of the core tier.
fn phase_prune(store: &Arc<GraphStore>, config: &EngineConfig) -> StoreResult<usize> {
    let now = Utc::now();
    let mut pruned = 0usize;

    for memory in store.memories_for_agent(&config.agent_id)? {
        if memory.category == MemoryCategory::Core {
            continue;
        }
        let score = effective_score(
            &memory,
            now,
            config.decay_half_life_days,
            config.frequency_weight,
        );
        if score < config.retention_threshold {
            store.delete_memory(&memory.id)?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// Phase 7: drop entities and tags with no remaining edges
fn phase_orphans(store: &Arc<GraphStore>) -> StoreResult<usize> {
    let entities = store.delete_orphan_entities()?;
    let tags = store.delete_orphan_tags()?;
    Ok(entities + tags)
}

// ============================================================================
// TESTS
// ============================================================================
