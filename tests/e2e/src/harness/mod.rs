//! Test Store Harness
//!
//! Isolated store instances for end-to-end tests: each harness owns a
//! temporary directory holding its database, deleted on drop, so tests
//! never interfere with each other.

use engram_core::{EngineConfig, GraphStore, MemoryInput, MemoryRecord};
use std::sync::Arc;
use tempfile::TempDir;

/// An isolated store on a temporary database
///
/// # Example
///
/// ```rust,ignore
/// let harness = TestStore::new("my-agent");
/// harness.add_memory("prefers dark roast coffee", 0.7, Some(vec![1.0, 0.0]));
/// // Database is deleted when `harness` goes out of scope
/// ```
pub struct TestStore {
    /// The store under test
    pub store: Arc<GraphStore>,
    /// Config pointing at the temporary database
    pub config: EngineConfig,
    /// Kept alive to prevent premature deletion
    _temp_dir: TempDir,
}

impl TestStore {
    /// Create an isolated store for the given agent
    pub fn new(agent_id: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("engram_test.db");

        let store = Arc::new(GraphStore::open(&db_path).expect("Failed to open test store"));
        let config = EngineConfig {
            store_path: db_path,
            agent_id: agent_id.to_string(),
            // No throttling between extraction batches in tests
            inter_batch_delay_ms: 0,
            ..EngineConfig::default()
        };

        Self {
            store,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Store a memory for the harness agent
    pub fn add_memory(
        &self,
        text: &str,
        importance: f64,
        embedding: Option<Vec<f32>>,
    ) -> MemoryRecord {
        self.store
            .store_memory(MemoryInput {
                text: text.to_string(),
                importance,
                agent_id: self.config.agent_id.clone(),
                embedding,
                ..Default::default()
            })
            .expect("Failed to store test memory")
    }

    /// Side connection to the same database for fixture surgery
    fn raw_connection(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(&self.config.store_path)
            .expect("Failed to open side connection")
    }

    /// Backdate a memory's creation time by whole days
    pub fn backdate(&self, memory_id: &str, days: i64) {
        let then = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let rows = self
            .raw_connection()
            .execute(
                "UPDATE memories SET created_at = ?2 WHERE id = ?1",
                rusqlite::params![memory_id, then],
            )
            .expect("Failed to backdate memory");
        assert_eq!(rows, 1, "backdate should touch exactly one row");
    }

    /// Set a memory's retrieval counter directly
    pub fn set_retrievals(&self, memory_id: &str, count: i64) {
        self.raw_connection()
            .execute(
                "UPDATE memories SET retrieval_count = ?2 WHERE id = ?1",
                rusqlite::params![memory_id, count],
            )
            .expect("Failed to set retrieval count");
    }

    /// Count rows in a table on the side connection
    pub fn count_rows(&self, table: &str) -> i64 {
        assert!(table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        self.raw_connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("Failed to count rows")
    }
}
