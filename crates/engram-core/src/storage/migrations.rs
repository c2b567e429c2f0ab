//! Database Migrations
//!
//! Schema migration definitions for the graph store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial property-graph schema: memories, entities, tags, typed edges",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Retrieval telemetry and promotion provenance",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- ============================================================================
-- MEMORY NODES
-- ============================================================================

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    embedding BLOB,
    importance REAL NOT NULL DEFAULT 0.5,
    category TEXT NOT NULL DEFAULT 'fact',
    source TEXT NOT NULL DEFAULT 'user',
    extraction_status TEXT NOT NULL DEFAULT 'pending',
    agent_id TEXT NOT NULL DEFAULT 'default',
    session_key TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_extraction ON memories(extraction_status);

-- FTS5 virtual table for BM25 keyword search over memory text
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    id,
    text,
    content='memories',
    content_rowid='rowid'
);

-- Triggers to keep FTS in sync
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memory_fts(rowid, id, text)
    VALUES (NEW.rowid, NEW.id, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
    INSERT INTO memory_fts(rowid, id, text)
    VALUES (NEW.rowid, NEW.id, NEW.text);
END;

-- ============================================================================
-- ENTITY NODES
-- ============================================================================

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    -- canonical (trimmed, lowercased) name; the natural key
    name TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL DEFAULT 'concept',
    aliases TEXT NOT NULL DEFAULT '[]',
    description TEXT,
    embedding BLOB,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    -- nullable: rows predating the counter read as 0
    mention_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

-- Fulltext over entity names and aliases for the graph signal
CREATE VIRTUAL TABLE IF NOT EXISTS entity_fts USING fts5(
    id,
    name,
    aliases,
    content='entities',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS entities_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entity_fts(rowid, id, name, aliases)
    VALUES (NEW.rowid, NEW.id, NEW.name, NEW.aliases);
END;

CREATE TRIGGER IF NOT EXISTS entities_ad AFTER DELETE ON entities BEGIN
    INSERT INTO entity_fts(entity_fts, rowid, id, name, aliases)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.name, OLD.aliases);
END;

CREATE TRIGGER IF NOT EXISTS entities_au AFTER UPDATE ON entities BEGIN
    INSERT INTO entity_fts(entity_fts, rowid, id, name, aliases)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.name, OLD.aliases);
    INSERT INTO entity_fts(rowid, id, name, aliases)
    VALUES (NEW.rowid, NEW.id, NEW.name, NEW.aliases);
END;

-- ============================================================================
-- TAG NODES
-- ============================================================================

CREATE TABLE IF NOT EXISTS tags (
    name TEXT PRIMARY KEY,
    category TEXT NOT NULL DEFAULT 'topic'
);

-- ============================================================================
-- EDGES
-- ============================================================================

-- MENTIONS: Memory -> Entity
CREATE TABLE IF NOT EXISTS mentions (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    role TEXT NOT NULL DEFAULT 'context',
    confidence REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (memory_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id);

-- TAGGED: Memory -> Tag
CREATE TABLE IF NOT EXISTS tagged (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    tag_name TEXT NOT NULL REFERENCES tags(name) ON DELETE CASCADE,
    confidence REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (memory_id, tag_name)
);

CREATE INDEX IF NOT EXISTS idx_tagged_tag ON tagged(tag_name);

-- Typed Entity -> Entity edges; edge_type is allowlist-validated in Rust
-- before any statement referencing it is built
CREATE TABLE IF NOT EXISTS entity_edges (
    source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    edge_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.7,
    created_at TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_entity_edges_target ON entity_edges(target_id);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Retrieval telemetry (Pareto frequency term) and promotion provenance
const MIGRATION_V2_UP: &str = r#"
-- How often retrieval returned each memory; feeds the sleep cycle's
-- effective-score frequency term
ALTER TABLE memories ADD COLUMN retrieval_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE memories ADD COLUMN last_retrieved TEXT;

-- Category held before core promotion, restored on demotion
ALTER TABLE memories ADD COLUMN prior_category TEXT;

INSERT INTO schema_version (version, applied_at) VALUES (2, datetime('now'));
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles multi-statement SQL including triggers
            conn.execute_batch(migration.up)?;

            applied += 1;
        }
    }

    Ok(applied)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_migrations_apply_cleanly() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let applied = apply_migrations(&conn).expect("apply migrations");
        assert_eq!(applied as usize, MIGRATIONS.len());
        assert_eq!(
            get_current_version(&conn).expect("read version"),
            MIGRATIONS.last().expect("non-empty").version
        );
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_migrations(&conn).expect("first apply");
        let applied = apply_migrations(&conn).expect("second apply");
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
