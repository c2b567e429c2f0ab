//! Consolidation module - the sleep cycle
//!
//! Periodic batch maintenance of the memory graph: dedup, Pareto scoring,
//! core promotion/demotion, deferred extraction, decay pruning, and orphan
//! cleanup. Runs offline so the capture and retrieval paths stay cheap.

mod sleep;

pub use sleep::run_sleep_cycle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryRecord;

// ============================================================================
// EFFECTIVE SCORE
// ============================================================================

/// Age-decayed importance plus a capped retrieval-frequency term.
///
/// Importance halves every `half_life_days`; retrievals beyond ten add
/// nothing, so a burst of lookups cannot dominate intrinsic importance.
pub fn effective_score(
    memory: &MemoryRecord,
    now: DateTime<Utc>,
    half_life_days: f64,
    frequency_weight: f64,
) -> f64 {
    let age_days = (now - memory.created_at).num_seconds().max(0) as f64 / 86_400.0;
    let decayed = memory.importance * 0.5_f64.powf(age_days / half_life_days);
    let frequency = memory.retrieval_count.clamp(0, 10) as f64 / 10.0 * frequency_weight;
    decayed + frequency
}

/// The effective score separating the top `fraction` of `scores`.
///
/// `scores` need not be sorted. Returns `None` for an empty slice.
pub fn pareto_threshold(scores: &[f64], fraction: f64) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let cutoff = ((sorted.len() as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;
    let cutoff = cutoff.clamp(1, sorted.len());
    Some(sorted[cutoff - 1])
}

// ============================================================================
// CYCLE RESULT
// ============================================================================

/// Progress report for one sleep-cycle phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    /// Phase name
    pub name: String,
    /// Items the phase acted on
    pub items_processed: usize,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Error that aborted the cycle at this phase, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of one sleep cycle.
///
/// Partial completion is a success outcome: an aborted cycle still
/// reports every phase that ran before the failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepCycleResult {
    /// Per-phase reports in execution order
    pub phases: Vec<PhaseReport>,
    /// Duplicate memories merged away
    pub merged: usize,
    /// Duplicate entities merged away
    pub entities_merged: usize,
    /// Memories promoted to core
    pub promoted: usize,
    /// Core memories demoted back to their prior category
    pub demoted: usize,
    /// Memories run through extraction
    pub extracted: usize,
    /// Memories pruned by decay
    pub pruned: usize,
    /// Orphaned entities and tags removed
    pub orphans_removed: usize,
    /// Whether a phase failure halted the pipeline early
    pub aborted: bool,
    /// Total wall-clock duration
    pub total_duration_ms: u64,
}

// ============================================================================
// TESTS
// ============================================================================
