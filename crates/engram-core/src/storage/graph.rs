//! Graph Store Client
//!
//! Typed CRUD plus the three retrieval primitives over the fixed-schema
//! property graph. Policy lives here:
//!
//! - **Retry**: contention-prone writes (entity merge, entity edges) loop
//!   up to 3 attempts with exponential backoff from 500ms, only for
//!   busy/locked transient errors. Everything else propagates immediately.
//! - **Degrade to empty**: the read-side search primitives never throw; a
//!   missing or unready index yields an empty signal, not a failed query.
//! - **Reject unsafe input**: memory deletion requires a strict UUID;
//!   relationship types are allowlist-checked before any statement is
//!   built.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::memory::{
    canonicalize_name, is_allowed_relationship, EntityEdge, EntityInput, EntityRecord, EntityType,
    ExtractionStatus, MemoryCategory, MemoryInput, MemoryRecord, MemorySource, MemoryStats,
    SignalHit, RELATIONSHIP_TYPES,
};
use crate::search::{cosine_similarity, embedding_from_bytes, embedding_to_bytes,
    sanitize_fts5_query};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Rejected id (must be a strict UUID)
    #[error("Invalid memory id: {0}")]
    InvalidId(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Maximum attempts for contention-prone writes
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Initial backoff, doubled each attempt
const INITIAL_BACKOFF_MS: u64 = 500;

/// Whether a store error is expected to succeed on plain retry
fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// Property-graph store over SQLite.
///
/// Separate reader/writer connections behind mutexes so all methods take
/// `&self` and the store is `Send + Sync`; async layers hold it in an
/// `Arc<GraphStore>`.
pub struct GraphStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl GraphStore {
    /// Apply performance PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store at the given path and apply migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(path)?;
        Self::configure_connection(&writer_conn)?;

        // Migrations run on the writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    /// Run a closure against the reader connection
    pub(crate) fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;
        Ok(f(&reader)?)
    }

    /// Run a closure against the writer connection
    pub(crate) fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
        Ok(f(&mut writer)?)
    }

    /// Run a write with the transient-error retry policy.
    ///
    /// Retries only busy/locked signatures; any other error propagates on
    /// the first attempt.
    pub(crate) async fn with_write_retry<T>(
        &self,
        op: &str,
        f: impl Fn(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let result = {
                let mut writer = self
                    .writer
                    .lock()
                    .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
                f(&mut writer)
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::warn!(
                        "Transient error in {} (attempt {}/{}), retrying in {}ms: {}",
                        op,
                        attempt,
                        MAX_WRITE_ATTEMPTS,
                        backoff_ms,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(e) => return Err(e.into()),
            }
        }

        unreachable!("retry loop returns on final attempt")
    }

    // ========================================================================
    // MEMORY CRUD
    // ========================================================================

    /// Store a new memory, returning the created record
    pub fn store_memory(&self, input: MemoryInput) -> Result<MemoryRecord> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let embedding_blob = input.embedding.as_deref().map(embedding_to_bytes);

        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO memories (
                    id, text, embedding, importance, category, source,
                    extraction_status, agent_id, session_key, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    input.text,
                    embedding_blob,
                    input.importance.clamp(0.0, 1.0),
                    input.category.as_str(),
                    input.source.as_str(),
                    ExtractionStatus::Pending.as_str(),
                    input.agent_id,
                    input.session_key,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
        })?;

        self.get_memory(&id)?
            .ok_or_else(|| StoreError::NotFound(id))
    }

    /// Delete a memory by id.
    ///
    /// The id must parse as a strict UUID - anything else is rejected
    /// before touching the database.
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        if Uuid::parse_str(id).is_err() {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        let rows = self.with_writer(|conn| {
            conn.execute("DELETE FROM memories WHERE id = ?1", params![id])
        })?;
        Ok(rows > 0)
    }

    /// Count memories for an agent
    pub fn count_memories(&self, agent_id: &str) -> Result<i64> {
        self.with_reader(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
        })
    }

    /// Fetch a single memory by id
    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                params![id],
                row_to_memory,
            )
            .optional()
        })
    }

    /// All memories for an agent, oldest first (sleep-cycle input)
    pub fn memories_for_agent(&self, agent_id: &str) -> Result<Vec<MemoryRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE agent_id = ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![agent_id], row_to_memory)?;
            rows.collect()
        })
    }

    /// Memories awaiting extraction, oldest first
    pub fn pending_extraction(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE agent_id = ?1 AND extraction_status = 'pending'
                 ORDER BY created_at ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![agent_id, limit as i64], row_to_memory)?;
            rows.collect()
        })
    }

    /// Update the extraction lifecycle state of a memory
    pub fn update_extraction_status(&self, id: &str, status: ExtractionStatus) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE memories SET extraction_status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    /// Set the category assigned by extraction.
    ///
    /// Never reclassifies a consolidated (`core`) memory.
    pub fn update_memory_category(&self, id: &str, category: MemoryCategory) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE memories SET category = ?2, updated_at = ?3
                 WHERE id = ?1 AND category != 'core'",
                params![id, category.as_str(), Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    /// Set a memory's importance (clamped to [0, 1])
    pub fn update_importance(&self, id: &str, importance: f64) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE memories SET importance = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, importance.clamp(0.0, 1.0), Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    /// Promote a memory to the core tier, recording its prior category
    pub fn promote_memory(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE memories
                 SET prior_category = category, category = 'core', updated_at = ?2
                 WHERE id = ?1 AND category != 'core'",
                params![id, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    /// Demote a core memory back to its recorded prior category
    pub fn demote_memory(&self, id: &str) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "UPDATE memories
                 SET category = COALESCE(prior_category, 'other'),
                     prior_category = NULL,
                     updated_at = ?2
                 WHERE id = ?1 AND category = 'core'",
                params![id, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    /// Retrieval telemetry: bump retrieval counters for the returned ids
    pub fn record_retrieval(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        self.with_writer(|conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!(
                "UPDATE memories
                 SET retrieval_count = retrieval_count + 1, last_retrieved = ?1
                 WHERE id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&now];
            for id in ids {
                bindings.push(id);
            }
            stmt.execute(bindings.as_slice())
        })?;
        Ok(())
    }

    /// Merge a duplicate memory into a canonical one.
    ///
    /// One transaction: dependents (mentions, tags) are re-pointed
    /// idempotently, then the duplicate row is deleted.
    pub fn merge_duplicate_memory(&self, canonical_id: &str, duplicate_id: &str) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO mentions (memory_id, entity_id, role, confidence)
                 SELECT ?1, entity_id, role, confidence FROM mentions WHERE memory_id = ?2",
                params![canonical_id, duplicate_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO tagged (memory_id, tag_name, confidence)
                 SELECT ?1, tag_name, confidence FROM tagged WHERE memory_id = ?2",
                params![canonical_id, duplicate_id],
            )?;
            // Dangling edges on the duplicate go with the row (cascade)
            tx.execute("DELETE FROM memories WHERE id = ?1", params![duplicate_id])?;

            tx.commit()
        })?;
        Ok(())
    }

    // ========================================================================
    // ENTITY / TAG MUTATION
    // ========================================================================

    /// Idempotent MERGE-by-name entity upsert.
    ///
    /// Create on first sight; otherwise bump `mention_count` and
    /// `last_seen`, union aliases, and refresh description/embedding only
    /// when newly provided. Retried under the transient-error policy.
    /// Returns the entity id.
    pub async fn merge_entity(&self, input: &EntityInput) -> Result<String> {
        let name = canonicalize_name(&input.name);
        if name.is_empty() {
            return Err(StoreError::Init("entity name must not be empty".into()));
        }

        let aliases: Vec<String> = input.aliases.iter().map(|a| canonicalize_name(a)).collect();
        let embedding_blob = input.embedding.as_deref().map(embedding_to_bytes);

        self.with_write_retry("merge_entity", move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;

            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, aliases FROM entities WHERE name = ?1",
                    params![name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let id = match existing {
                Some((id, aliases_json)) => {
                    // Match branch: union aliases, bump counters
                    let mut merged: Vec<String> =
                        serde_json::from_str(&aliases_json).unwrap_or_default();
                    for alias in &aliases {
                        if !merged.contains(alias) {
                            merged.push(alias.clone());
                        }
                    }
                    let merged_json =
                        serde_json::to_string(&merged).unwrap_or_else(|_| "[]".to_string());

                    tx.execute(
                        "UPDATE entities
                         SET mention_count = COALESCE(mention_count, 0) + 1,
                             last_seen = ?2,
                             aliases = ?3,
                             description = COALESCE(?4, description),
                             embedding = COALESCE(?5, embedding)
                         WHERE id = ?1",
                        params![id, now, merged_json, input.description, embedding_blob],
                    )?;
                    id
                }
                None => {
                    // Create branch
                    let id = Uuid::new_v4().to_string();
                    let aliases_json =
                        serde_json::to_string(&aliases).unwrap_or_else(|_| "[]".to_string());
                    tx.execute(
                        "INSERT INTO entities (
                            id, name, entity_type, aliases, description, embedding,
                            first_seen, last_seen, mention_count
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)",
                        params![
                            id,
                            name,
                            input.entity_type.as_str(),
                            aliases_json,
                            input.description,
                            embedding_blob,
                            now,
                        ],
                    )?;
                    id
                }
            };

            tx.commit()?;
            Ok(id)
        })
        .await
    }

    /// Link a memory to an entity with a MENTIONS edge.
    ///
    /// Idempotent: re-linking keeps the higher confidence.
    pub fn create_mentions(
        &self,
        memory_id: &str,
        entity_id: &str,
        role: &str,
        confidence: f64,
    ) -> Result<()> {
        self.with_writer(|conn| {
            conn.execute(
                "INSERT INTO mentions (memory_id, entity_id, role, confidence)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(memory_id, entity_id) DO UPDATE SET
                    confidence = MAX(confidence, excluded.confidence)",
                params![memory_id, entity_id, role, confidence.clamp(0.0, 1.0)],
            )
        })?;
        Ok(())
    }

    /// Create a typed entity-to-entity edge between two canonical names.
    ///
    /// A type outside [`RELATIONSHIP_TYPES`] is dropped and logged, never
    /// executed - edge type names reach query text, so this check happens
    /// before any statement is built. Confidence is monotonic: a
    /// re-observation only ever raises it.
    pub async fn create_entity_relationship(
        &self,
        source_name: &str,
        target_name: &str,
        edge_type: &str,
        confidence: f64,
    ) -> Result<()> {
        if !is_allowed_relationship(edge_type) {
            tracing::warn!(
                "Dropping relationship with disallowed type {:?} ({} -> {})",
                edge_type,
                source_name,
                target_name
            );
            return Ok(());
        }

        let source = self.get_entity_by_name(source_name)?;
        let target = self.get_entity_by_name(target_name)?;
        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                tracing::debug!(
                    "Skipping {} edge: unknown entity ({} -> {})",
                    edge_type,
                    source_name,
                    target_name
                );
                return Ok(());
            }
        };

        let edge_type = edge_type.to_string();
        let confidence = confidence.clamp(0.0, 1.0);

        self.with_write_retry("create_entity_relationship", move |conn| {
            conn.execute(
                "INSERT INTO entity_edges (source_id, target_id, edge_type, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                    confidence = MAX(confidence, excluded.confidence)",
                params![
                    source.id,
                    target.id,
                    edge_type,
                    confidence,
                    Utc::now().to_rfc3339()
                ],
            )
        })
        .await?;
        Ok(())
    }

    /// Attach a tag to a memory, upserting the tag node first
    pub fn tag_memory(
        &self,
        memory_id: &str,
        tag_name: &str,
        category: &str,
        confidence: f64,
    ) -> Result<()> {
        let name = canonicalize_name(tag_name);
        if name.is_empty() {
            return Ok(());
        }

        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO tags (name, category) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET category = excluded.category",
                params![name, category],
            )?;
            tx.execute(
                "INSERT INTO tagged (memory_id, tag_name, confidence)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(memory_id, tag_name) DO UPDATE SET
                    confidence = MAX(confidence, excluded.confidence)",
                params![memory_id, name, confidence.clamp(0.0, 1.0)],
            )?;
            tx.commit()
        })?;
        Ok(())
    }

    /// Fetch an entity by canonical name
    pub fn get_entity_by_name(&self, name: &str) -> Result<Option<EntityRecord>> {
        let canonical = canonicalize_name(name);
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE name = ?1"),
                params![canonical],
                row_to_entity,
            )
            .optional()
        })
    }

    /// Fetch an entity by id
    pub fn get_entity(&self, id: &str) -> Result<Option<EntityRecord>> {
        self.with_reader(|conn| {
            conn.query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
                params![id],
                row_to_entity,
            )
            .optional()
        })
    }

    /// Typed edges touching an entity, in either direction
    pub fn entity_relationships(&self, entity_id: &str) -> Result<Vec<EntityEdge>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, edge_type, confidence, created_at
                 FROM entity_edges
                 WHERE source_id = ?1 OR target_id = ?1
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![entity_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(EntityEdge {
                    source_id: row.get(0)?,
                    target_id: row.get(1)?,
                    edge_type: row.get(2)?,
                    confidence: row.get(3)?,
                    created_at: parse_timestamp(4, created_at)?,
                })
            })?;
            rows.collect()
        })
    }

    // ========================================================================
    // SEARCH PRIMITIVES (degrade to empty)
    // ========================================================================

    /// Vector signal: brute-force cosine over stored embeddings.
    ///
    /// Never throws; storage errors degrade to an empty signal.
    pub fn vector_search(
        &self,
        query_embedding: &[f32],
        agent_id: &str,
        limit: usize,
        min_score: f64,
    ) -> Vec<SignalHit> {
        match self.scan_similar(query_embedding, agent_id, min_score, limit, None) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("vector_search degraded to empty: {}", e);
                Vec::new()
            }
        }
    }

    /// BM25 keyword signal over the memory fulltext index.
    ///
    /// Raw FTS5 ranks are negated and normalized by the batch maximum so
    /// scores land in 0-1. Never throws.
    pub fn bm25_search(&self, query: &str, agent_id: &str, limit: usize) -> Vec<SignalHit> {
        match self.bm25_search_impl(query, agent_id, limit) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("bm25_search degraded to empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Graph signal: memories reachable from fulltext-matched entities.
    ///
    /// Direct mentions score by mention confidence; second-hop memories
    /// (via allowlisted edges at or above `firing_threshold`) score by
    /// `hop confidence x mention confidence`. Deduplicated by memory id
    /// keeping the maximum. Never throws.
    pub fn graph_search(
        &self,
        query: &str,
        agent_id: &str,
        limit: usize,
        firing_threshold: f64,
    ) -> Vec<SignalHit> {
        match self.graph_search_impl(query, agent_id, limit, firing_threshold) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("graph_search degraded to empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Find memories similar to an embedding (dedup and capture-time
    /// duplicate checks). Never throws.
    pub fn find_similar(
        &self,
        embedding: &[f32],
        agent_id: &str,
        min_similarity: f64,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Vec<SignalHit> {
        match self.scan_similar(embedding, agent_id, min_similarity, limit, exclude_id) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("find_similar degraded to empty: {}", e);
                Vec::new()
            }
        }
    }

    fn scan_similar(
        &self,
        query_embedding: &[f32],
        agent_id: &str,
        min_score: f64,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<SignalHit>> {
        let rows: Vec<(String, Vec<u8>)> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, embedding FROM memories
                 WHERE agent_id = ?1 AND embedding IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![agent_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect()
        })?;

        let mut hits: Vec<SignalHit> = rows
            .into_iter()
            .filter(|(id, _)| exclude_id != Some(id.as_str()))
            .filter_map(|(id, blob)| {
                let vector = embedding_from_bytes(&blob)?;
                let score = cosine_similarity(query_embedding, &vector) as f64;
                (score >= min_score).then_some((id, score))
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    fn bm25_search_impl(&self, query: &str, agent_id: &str, limit: usize) -> Result<Vec<SignalHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<(String, f64)> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, rank FROM memories m
                 JOIN memory_fts fts ON m.id = fts.id
                 WHERE memory_fts MATCH ?1 AND m.agent_id = ?2
                 ORDER BY rank
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![sanitized, agent_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            rows.collect()
        })?;

        // FTS5 rank is negative-better; flip and normalize by the batch max
        let scored: Vec<SignalHit> = results
            .into_iter()
            .map(|(id, rank)| (id, (-rank).max(0.0)))
            .collect();

        let max_score = scored.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if max_score <= 0.0 {
            return Ok(scored);
        }

        Ok(scored
            .into_iter()
            .map(|(id, s)| (id, s / max_score))
            .collect())
    }

    fn graph_search_impl(
        &self,
        query: &str,
        agent_id: &str,
        limit: usize,
        firing_threshold: f64,
    ) -> Result<Vec<SignalHit>> {
        let entity_ids = self.match_entities(query)?;
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; entity_ids.len()].join(",");
        let mut scores: HashMap<String, f64> = HashMap::new();

        self.with_reader(|conn| {
            // Direct mentions of a matched entity
            let sql = format!(
                "SELECT mn.memory_id, mn.confidence FROM mentions mn
                 JOIN memories m ON m.id = mn.memory_id
                 WHERE m.agent_id = ? AND mn.entity_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&agent_id];
            for id in &entity_ids {
                bindings.push(id);
            }
            let rows = stmt.query_map(bindings.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            for row in rows {
                let (memory_id, confidence) = row?;
                let entry = scores.entry(memory_id).or_insert(0.0);
                *entry = entry.max(confidence);
            }

            // Second hop: memories mentioning an entity reachable over an
            // allowlisted edge firing at or above the threshold. Edge types
            // in the table were allowlist-validated at write time; the
            // interpolated list below is the compile-time constant, never
            // caller input.
            let allowed_types = RELATIONSHIP_TYPES
                .iter()
                .map(|t| format!("'{t}'"))
                .collect::<Vec<_>>()
                .join(",");

            for (from_col, to_col) in [("source_id", "target_id"), ("target_id", "source_id")] {
                let sql = format!(
                    "SELECT mn.memory_id, ee.confidence * mn.confidence
                     FROM entity_edges ee
                     JOIN mentions mn ON mn.entity_id = ee.{to_col}
                     JOIN memories m ON m.id = mn.memory_id
                     WHERE m.agent_id = ?
                       AND ee.confidence >= ?
                       AND ee.edge_type IN ({allowed_types})
                       AND ee.{from_col} IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&agent_id, &firing_threshold];
                for id in &entity_ids {
                    bindings.push(id);
                }
                let rows = stmt.query_map(bindings.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?;
                for row in rows {
                    let (memory_id, score) = row?;
                    let entry = scores.entry(memory_id).or_insert(0.0);
                    *entry = entry.max(score);
                }
            }

            Ok(())
        })?;

        let mut hits: Vec<SignalHit> = scores.into_iter().collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Fulltext-match entities against the query: normalized score >= 0.5,
    /// top 5.
    fn match_entities(&self, query: &str) -> Result<Vec<String>> {
        const ENTITY_MATCH_MIN_SCORE: f64 = 0.5;
        const ENTITY_MATCH_LIMIT: usize = 5;

        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<(String, f64)> = self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, rank FROM entities e
                 JOIN entity_fts fts ON e.id = fts.id
                 WHERE entity_fts MATCH ?1
                 ORDER BY rank
                 LIMIT 20",
            )?;
            let rows = stmt.query_map(params![sanitized], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            rows.collect()
        })?;

        let scored: Vec<(String, f64)> = results
            .into_iter()
            .map(|(id, rank)| (id, (-rank).max(0.0)))
            .collect();
        let max_score = scored.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if max_score <= 0.0 {
            return Ok(Vec::new());
        }

        Ok(scored
            .into_iter()
            .map(|(id, s)| (id, s / max_score))
            .filter(|(_, s)| *s >= ENTITY_MATCH_MIN_SCORE)
            .take(ENTITY_MATCH_LIMIT)
            .map(|(id, _)| id)
            .collect())
    }

    // ========================================================================
    // ORPHAN CLEANUP
    // ========================================================================

    /// Delete entities with zero incoming MENTIONS edges
    pub fn delete_orphan_entities(&self) -> Result<usize> {
        self.with_writer(|conn| {
            conn.execute(
                "DELETE FROM entities
                 WHERE id NOT IN (SELECT DISTINCT entity_id FROM mentions)",
                [],
            )
        })
    }

    /// Delete tags with zero incoming TAGGED edges
    pub fn delete_orphan_tags(&self) -> Result<usize> {
        self.with_writer(|conn| {
            conn.execute(
                "DELETE FROM tags
                 WHERE name NOT IN (SELECT DISTINCT tag_name FROM tagged)",
                [],
            )
        })
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Aggregate store statistics for an agent
    pub fn stats(&self, agent_id: &str) -> Result<MemoryStats> {
        self.with_reader(|conn| {
            let total_memories: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )?;
            let core_memories: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE agent_id = ?1 AND category = 'core'",
                params![agent_id],
                |row| row.get(0),
            )?;
            let pending_extraction: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories
                 WHERE agent_id = ?1 AND extraction_status = 'pending'",
                params![agent_id],
                |row| row.get(0),
            )?;
            let total_entities: i64 =
                conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
            let total_tags: i64 =
                conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;

            Ok(MemoryStats {
                total_memories,
                core_memories,
                pending_extraction,
                total_entities,
                total_tags,
            })
        })
    }
}

// ============================================================================
// ROW MAPPERS
// ============================================================================

const MEMORY_COLUMNS: &str = "id, text, embedding, importance, category, source, \
     extraction_status, agent_id, session_key, created_at, updated_at, \
     retrieval_count, last_retrieved, prior_category";

const ENTITY_COLUMNS: &str = "id, name, entity_type, aliases, description, embedding, \
     first_seen, last_seen, mention_count";

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let embedding_blob: Option<Vec<u8>> = row.get(2)?;
    let category: String = row.get(4)?;
    let source: String = row.get(5)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    let last_retrieved: Option<String> = row.get(12)?;
    let prior_category: Option<String> = row.get(13)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        embedding: embedding_blob.as_deref().and_then(embedding_from_bytes),
        importance: row.get(3)?,
        category: MemoryCategory::parse_name(&category),
        source: MemorySource::parse_name(&source),
        extraction_status: ExtractionStatus::parse_name(&status),
        agent_id: row.get(7)?,
        session_key: row.get(8)?,
        prior_category: prior_category.as_deref().map(MemoryCategory::parse_name),
        retrieval_count: row.get(11)?,
        last_retrieved: last_retrieved
            .map(|s| parse_timestamp(12, s))
            .transpose()?,
        created_at: parse_timestamp(9, created_at)?,
        updated_at: parse_timestamp(10, updated_at)?,
    })
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRecord> {
    let entity_type: String = row.get(2)?;
    let aliases_json: String = row.get(3)?;
    let embedding_blob: Option<Vec<u8>> = row.get(5)?;
    let first_seen: String = row.get(6)?;
    let last_seen: String = row.get(7)?;

    Ok(EntityRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: EntityType::parse_name(&entity_type),
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        description: row.get(4)?,
        embedding: embedding_blob.as_deref().and_then(embedding_from_bytes),
        first_seen: parse_timestamp(6, first_seen)?,
        last_seen: parse_timestamp(7, last_seen)?,
        mention_count: row.get(8)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
