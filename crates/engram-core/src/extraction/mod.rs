//! Extraction Pipeline
//!
//! Turns free-text memories into graph structure: entities, typed
//! relationships, tags, and an optional whole-memory category. The model
//! call itself never loop-retries; a failed extraction is recorded on the
//! memory's `extraction_status` and picked up for inspection later.
//!
//! Validation is deliberately lenient per item and strict per field:
//! a malformed entity is dropped without taking the rest of the batch
//! with it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::memory::{
    canonicalize_name, is_allowed_relationship, EntityInput, EntityType, ExtractionStatus,
    MemoryCategory,
};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::storage::GraphStore;

// ============================================================================
// PROMPT
// ============================================================================

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured knowledge from a single memory text.

Respond with ONLY a JSON object, no prose:
{
  "category": "preference" | "fact" | "decision" | "entity" | "other",
  "entities": [{"name": "...", "type": "person|organization|location|event|concept", "aliases": ["..."], "description": "..."}],
  "relationships": [{"source": "...", "target": "...", "type": "WORKS_AT|LIVES_AT|KNOWS|MARRIED_TO|PREFERS|DECIDED|RELATED_TO", "confidence": 0.0-1.0}],
  "tags": [{"name": "...", "category": "topic|domain|activity"}]
}

Rules:
- Extract only what the text states; never infer beyond it.
- Entity names must be the shortest natural form ("tarun", not "tarun who I met").
- Relationship source/target must be entity names from the same response.
- Empty arrays are valid when the text contains no structure."#;

// ============================================================================
// EXTRACTION RESULT
// ============================================================================

/// A validated entity-to-entity relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub edge_type: String,
    pub confidence: f64,
}

/// A validated tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTag {
    pub name: String,
    pub category: String,
}

/// Validated output of one extraction call
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    /// Whole-memory classification, if the model returned a known one
    pub category: Option<MemoryCategory>,
    pub entities: Vec<EntityInput>,
    pub relationships: Vec<ExtractedRelationship>,
    pub tags: Vec<ExtractedTag>,
}

impl ExtractionResult {
    /// All arrays empty - a valid "nothing to extract" outcome
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty() && self.tags.is_empty()
    }
}

/// Outcome of one extraction attempt.
///
/// `result` is `None` for malformed model output (non-transient, never
/// retried inline). `transient_failure` marks network/timeout/5xx
/// conditions for the caller's bookkeeping only.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub result: Option<ExtractionResult>,
    pub transient_failure: bool,
}

// ============================================================================
// PARSING AND VALIDATION
// ============================================================================

/// Strip optional markdown code fences around a JSON body
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Tolerate a language tag on the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate raw model output.
///
/// Returns `None` only for malformed JSON or a non-object body; individual
/// bad items inside the arrays are dropped, not fatal.
pub fn parse_extraction(raw: &str) -> Option<ExtractionResult> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    let category = object
        .get("category")
        .and_then(|v| v.as_str())
        .and_then(MemoryCategory::parse_extracted);

    let entities = object
        .get("entities")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(validate_entity).collect())
        .unwrap_or_default();

    let relationships = object
        .get("relationships")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(validate_relationship).collect())
        .unwrap_or_default();

    let tags = object
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(validate_tag).collect())
        .unwrap_or_default();

    Some(ExtractionResult {
        category,
        entities,
        relationships,
        tags,
    })
}

/// Entity: string name + type required; unknown type coerces to concept;
/// empty name drops the entity
fn validate_entity(value: &serde_json::Value) -> Option<EntityInput> {
    let object = value.as_object()?;
    let name = canonicalize_name(object.get("name")?.as_str()?);
    if name.is_empty() {
        return None;
    }

    let entity_type = EntityType::parse_name(object.get("type")?.as_str()?);

    let aliases = object
        .get("aliases")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|a| a.as_str())
                .map(canonicalize_name)
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let description = object
        .get("description")
        .and_then(|v| v.as_str())
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Some(EntityInput {
        name,
        entity_type,
        aliases,
        description,
        embedding: None,
    })
}

/// Relationship: source, target, and an allowlisted type required; a type
/// outside the allowlist drops the whole relationship, never coerces
fn validate_relationship(value: &serde_json::Value) -> Option<ExtractedRelationship> {
    let object = value.as_object()?;
    let source = canonicalize_name(object.get("source")?.as_str()?);
    let target = canonicalize_name(object.get("target")?.as_str()?);
    let edge_type = object.get("type")?.as_str()?.to_string();

    if source.is_empty() || target.is_empty() || !is_allowed_relationship(&edge_type) {
        return None;
    }

    let confidence = object
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.7)
        .clamp(0.0, 1.0);

    Some(ExtractedRelationship {
        source,
        target,
        edge_type,
        confidence,
    })
}

/// Tag: string name required; category defaults to "topic"
fn validate_tag(value: &serde_json::Value) -> Option<ExtractedTag> {
    let object = value.as_object()?;
    let name = canonicalize_name(object.get("name")?.as_str()?);
    if name.is_empty() {
        return None;
    }

    let category = object
        .get("category")
        .and_then(|v| v.as_str())
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "topic".to_string());

    Some(ExtractedTag { name, category })
}

// ============================================================================
// EXTRACTION CALL
// ============================================================================

/// One extraction attempt against the model. Never loop-retries.
pub async fn extract_entities(llm: &dyn LlmProvider, text: &str) -> ExtractionOutcome {
    match llm.complete(EXTRACTION_SYSTEM_PROMPT, text).await {
        Ok(raw) => ExtractionOutcome {
            result: parse_extraction(&raw),
            transient_failure: false,
        },
        Err(e) => {
            tracing::warn!("Extraction call failed: {}", e);
            ExtractionOutcome {
                result: None,
                transient_failure: e.is_transient(),
            }
        }
    }
}

// ============================================================================
// BACKGROUND PIPELINE
// ============================================================================

/// Run extraction for one memory and write the structure into the graph.
///
/// Lifecycle: disabled config marks `skipped`; malformed output marks
/// `failed`; an empty-but-valid result marks `complete`. Per-item write
/// failures are logged and skipped - one bad entity never aborts the rest.
pub async fn run_background_extraction(
    store: &Arc<GraphStore>,
    embeddings: &Arc<dyn EmbeddingProvider>,
    llm: &Arc<dyn LlmProvider>,
    memory_id: &str,
    text: &str,
    config: &EngineConfig,
) -> crate::storage::Result<()> {
    if !config.extraction_enabled {
        store.update_extraction_status(memory_id, ExtractionStatus::Skipped)?;
        return Ok(());
    }

    let outcome = extract_entities(llm.as_ref(), text).await;
    let Some(result) = outcome.result else {
        tracing::warn!(
            "Extraction failed for memory {} (transient: {})",
            memory_id,
            outcome.transient_failure
        );
        store.update_extraction_status(memory_id, ExtractionStatus::Failed)?;
        return Ok(());
    };

    if result.is_empty() {
        if let Some(category) = result.category {
            store.update_memory_category(memory_id, category)?;
        }
        store.update_extraction_status(memory_id, ExtractionStatus::Complete)?;
        return Ok(());
    }

    // Best-effort entity name embeddings; extraction continues without
    // them on failure
    let names: Vec<String> = result.entities.iter().map(|e| e.name.clone()).collect();
    let name_embeddings = match embeddings.embed_batch(&names).await {
        Ok(vectors) => Some(vectors),
        Err(e) => {
            tracing::warn!("Entity embedding failed, continuing without: {}", e);
            None
        }
    };

    let mut entities_linked = 0usize;
    for (index, mut entity) in result.entities.into_iter().enumerate() {
        entity.embedding = name_embeddings
            .as_ref()
            .and_then(|vectors| vectors.get(index).cloned());

        match store.merge_entity(&entity).await {
            Ok(entity_id) => {
                if let Err(e) = store.create_mentions(memory_id, &entity_id, "context", 1.0) {
                    tracing::warn!("Failed to link entity {}: {}", entity.name, e);
                } else {
                    entities_linked += 1;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to merge entity {}: {}", entity.name, e);
            }
        }
    }

    let mut relationships_created = 0usize;
    for relationship in &result.relationships {
        match store
            .create_entity_relationship(
                &relationship.source,
                &relationship.target,
                &relationship.edge_type,
                relationship.confidence,
            )
            .await
        {
            Ok(()) => relationships_created += 1,
            Err(e) => {
                tracing::warn!(
                    "Failed to create {} edge ({} -> {}): {}",
                    relationship.edge_type,
                    relationship.source,
                    relationship.target,
                    e
                );
            }
        }
    }

    let mut tags_applied = 0usize;
    for tag in &result.tags {
        match store.tag_memory(memory_id, &tag.name, &tag.category, 1.0) {
            Ok(()) => tags_applied += 1,
            Err(e) => {
                tracing::warn!("Failed to tag memory with {}: {}", tag.name, e);
            }
        }
    }

    if let Some(category) = result.category {
        store.update_memory_category(memory_id, category)?;
    }
    store.update_extraction_status(memory_id, ExtractionStatus::Complete)?;

    tracing::info!(
        "Extraction complete for memory {}: {} entities, {} relationships, {} tags",
        memory_id,
        entities_linked,
        relationships_created,
        tags_applied
    );
    Ok(())
}

/// Detach extraction from the capture path.
///
/// The caller returns immediately; failures inside the task are logged,
/// never propagated.
pub fn spawn_background_extraction(
    store: Arc<GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    memory_id: String,
    text: String,
    config: EngineConfig,
) {
    tokio::spawn(async move {
        if let Err(e) =
            run_background_extraction(&store, &embeddings, &llm, &memory_id, &text, &config).await
        {
            tracing::error!("Background extraction for memory {} failed: {}", memory_id, e);
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================
