//! Memory records - the nodes of the memory graph
//!
//! Three node kinds live in the store: free-text memories
//! ([`MemoryRecord`]), canonicalized entities ([`EntityRecord`]), and
//! lightweight topic tags, connected by MENTIONS/TAGGED edges and typed
//! entity-to-entity edges ([`EntityEdge`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORIES / SOURCES / STATUS
// ============================================================================

/// Category assigned to a memory
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// A user preference ("prefers dark roast")
    Preference,
    /// A discrete fact
    #[default]
    Fact,
    /// A decision that was made
    Decision,
    /// A memory that is primarily about an entity
    Entity,
    /// Anything else
    Other,
    /// Consolidated long-term memory (promoted by the sleep cycle)
    Core,
}

impl MemoryCategory {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Decision => "decision",
            MemoryCategory::Entity => "entity",
            MemoryCategory::Other => "other",
            MemoryCategory::Core => "core",
        }
    }

    /// Parse from string name, falling back to `Other`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "preference" => MemoryCategory::Preference,
            "fact" => MemoryCategory::Fact,
            "decision" => MemoryCategory::Decision,
            "entity" => MemoryCategory::Entity,
            "core" => MemoryCategory::Core,
            _ => MemoryCategory::Other,
        }
    }

    /// Strict parse: only the five classifier-assignable values.
    ///
    /// `core` is excluded - extraction must never classify a memory
    /// straight into the consolidated tier.
    pub fn parse_extracted(s: &str) -> Option<Self> {
        match s {
            "preference" => Some(MemoryCategory::Preference),
            "fact" => Some(MemoryCategory::Fact),
            "decision" => Some(MemoryCategory::Decision),
            "entity" => Some(MemoryCategory::Entity),
            "other" => Some(MemoryCategory::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a memory came from
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MemorySource {
    /// Explicit user tool call
    #[default]
    User,
    /// Attention-gated capture of a user message
    AutoCapture,
    /// Attention-gated capture of an assistant message
    AutoCaptureAssistant,
    /// Background watcher process
    MemoryWatcher,
    /// Bulk import
    Import,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::User => "user",
            MemorySource::AutoCapture => "auto-capture",
            MemorySource::AutoCaptureAssistant => "auto-capture-assistant",
            MemorySource::MemoryWatcher => "memory-watcher",
            MemorySource::Import => "import",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "auto-capture" => MemorySource::AutoCapture,
            "auto-capture-assistant" => MemorySource::AutoCaptureAssistant,
            "memory-watcher" => MemorySource::MemoryWatcher,
            "import" => MemorySource::Import,
            _ => MemorySource::User,
        }
    }
}

/// Lifecycle of the LLM extraction pass over a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    /// Not yet processed
    #[default]
    Pending,
    /// Extraction finished (possibly with zero entities - that is valid)
    Complete,
    /// Extraction failed permanently (malformed output, non-transient error)
    Failed,
    /// Extraction disabled by configuration
    Skipped,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::Complete => "complete",
            ExtractionStatus::Failed => "failed",
            ExtractionStatus::Skipped => "skipped",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "complete" => ExtractionStatus::Complete,
            "failed" => ExtractionStatus::Failed,
            "skipped" => ExtractionStatus::Skipped,
            _ => ExtractionStatus::Pending,
        }
    }
}

// ============================================================================
// ENTITY TYPES AND RELATIONSHIP ALLOWLIST
// ============================================================================

/// Type of an extracted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    /// Fallback for anything the extractor cannot place
    #[default]
    Concept,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Event => "event",
            EntityType::Concept => "concept",
        }
    }

    /// Parse from string; anything outside the allowlist coerces to `Concept`
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "location" => EntityType::Location,
            "event" => EntityType::Event,
            _ => EntityType::Concept,
        }
    }
}

/// Allowed entity-to-entity relationship types.
///
/// Relationship type names end up interpolated into query text (edge type
/// names cannot be bound as parameters), so any value outside this table is
/// an injection vector and must be rejected before a statement is built.
pub const RELATIONSHIP_TYPES: [&str; 7] = [
    "WORKS_AT",
    "LIVES_AT",
    "KNOWS",
    "MARRIED_TO",
    "PREFERS",
    "DECIDED",
    "RELATED_TO",
];

/// Check a relationship type against the allowlist (case-sensitive)
pub fn is_allowed_relationship(rel_type: &str) -> bool {
    RELATIONSHIP_TYPES.contains(&rel_type)
}

/// Canonicalize an entity or tag name: trimmed and lowercased.
///
/// The canonical name is the natural key for MERGE-by-name upserts.
pub fn canonicalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// RECORDS
// ============================================================================

/// A stored memory
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// The memory text
    pub text: String,
    /// Embedding vector (fixed dimension, absent until embedded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Assigned category
    pub category: MemoryCategory,
    /// Capture source
    pub source: MemorySource,
    /// Extraction lifecycle state
    pub extraction_status: ExtractionStatus,
    /// Owning agent
    pub agent_id: String,
    /// Conversation session the memory was captured in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Category held before core promotion (restored on demotion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_category: Option<MemoryCategory>,
    /// Times this memory was returned by retrieval
    pub retrieval_count: i64,
    /// Last time retrieval returned this memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retrieved: Option<DateTime<Utc>>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last modified
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a fresh, not-yet-extracted record from capture input
    pub fn from_input(input: MemoryInput, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: input.text,
            embedding: input.embedding,
            importance: input.importance.clamp(0.0, 1.0),
            category: input.category,
            source: input.source,
            extraction_status: ExtractionStatus::Pending,
            agent_id: input.agent_id,
            session_key: input.session_key,
            prior_category: None,
            retrieval_count: 0,
            last_retrieved: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for storing a new memory
///
/// Uses `deny_unknown_fields` to prevent field injection from tool callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryInput {
    /// The memory text
    pub text: String,
    /// Importance in [0, 1]
    #[serde(default = "default_importance")]
    pub importance: f64,
    /// Category (defaults to `fact`)
    #[serde(default)]
    pub category: MemoryCategory,
    /// Capture source
    #[serde(default)]
    pub source: MemorySource,
    /// Owning agent
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    /// Conversation session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Precomputed embedding, if the caller already has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_importance() -> f64 {
    0.5
}

fn default_agent_id() -> String {
    "default".to_string()
}

impl Default for MemoryInput {
    fn default() -> Self {
        Self {
            text: String::new(),
            importance: 0.5,
            category: MemoryCategory::Fact,
            source: MemorySource::User,
            agent_id: "default".to_string(),
            session_key: None,
            embedding: None,
        }
    }
}

/// A stored entity
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Canonical name (trimmed, lowercased) - the natural key
    pub name: String,
    /// Entity type
    pub entity_type: EntityType,
    /// Alternate names, canonicalized
    pub aliases: Vec<String>,
    /// Optional free-text description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional embedding of the entity name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// First observation time
    pub first_seen: DateTime<Utc>,
    /// Most recent observation time
    pub last_seen: DateTime<Utc>,
    /// Number of MENTIONS edges pointing at this entity.
    /// NULL in rows written before the counter existed; read as 0.
    pub mention_count: Option<i64>,
}

/// Input for the idempotent entity upsert (MERGE-by-name)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInput {
    /// Name as extracted (canonicalized before storage)
    pub name: String,
    /// Entity type
    pub entity_type: EntityType,
    /// Alternate names
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional name embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

// ============================================================================
// EDGES
// ============================================================================

/// A typed entity-to-entity edge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityEdge {
    pub source_id: String,
    pub target_id: String,
    /// One of [`RELATIONSHIP_TYPES`]
    pub edge_type: String,
    /// Confidence in [0, 1], monotonically raised on re-observation
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
