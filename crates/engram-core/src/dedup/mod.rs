//! Entity Deduplication
//!
//! Extraction occasionally stores the same real-world entity under two
//! names ("tarun" and "tarun sukhani"). Candidate pairs are same-type
//! entities whose names are substrings of each other; the canonical side
//! keeps the higher mention count, with the shorter name winning ties.

use crate::storage::{GraphStore, Result};

// ============================================================================
// CANDIDATE PAIRS
// ============================================================================

/// A duplicate-entity pair with the merge direction already decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    pub keep_id: String,
    pub keep_name: String,
    pub remove_id: String,
    pub remove_name: String,
}

/// Find same-type entity pairs where one name contains the other.
///
/// Names of length 2 or less are excluded - they substring-match far too
/// much. NULL mention counts compare as 0.
pub fn find_duplicate_entity_pairs(store: &GraphStore) -> Result<Vec<DuplicatePair>> {
    let rows: Vec<(String, String, i64, String, String, i64)> = store.with_reader(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, COALESCE(a.mention_count, 0),
                    b.id, b.name, COALESCE(b.mention_count, 0)
             FROM entities a
             JOIN entities b ON a.entity_type = b.entity_type AND a.id < b.id
             WHERE length(a.name) > 2 AND length(b.name) > 2
               AND (instr(a.name, b.name) > 0 OR instr(b.name, a.name) > 0)",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        rows.collect()
    })?;

    let pairs = rows
        .into_iter()
        .map(|(a_id, a_name, a_mentions, b_id, b_name, b_mentions)| {
            // Higher mention count wins; on a tie the shorter name is
            // the canonical form
            let a_wins = match a_mentions.cmp(&b_mentions) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => a_name.len() <= b_name.len(),
            };

            if a_wins {
                DuplicatePair {
                    keep_id: a_id,
                    keep_name: a_name,
                    remove_id: b_id,
                    remove_name: b_name,
                }
            } else {
                DuplicatePair {
                    keep_id: b_id,
                    keep_name: b_name,
                    remove_id: a_id,
                    remove_name: a_name,
                }
            }
        })
        .collect();

    Ok(pairs)
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge a duplicate entity into its canonical counterpart.
///
/// One transaction: MENTIONS edges are re-pointed idempotently (a memory
/// already linked to the keeper just drops its duplicate edge, not
/// double-counted), the keeper's mention count grows by the number of
/// edges actually transferred, and the duplicate node is detach-deleted.
///
/// Returns `false` on any transaction error rather than propagating - a
/// failed merge leaves both entities intact for the next cycle.
pub fn merge_entity_pair(store: &GraphStore, keep_id: &str, remove_id: &str) -> bool {
    let merged = store.with_writer(|conn| {
        let tx = conn.transaction()?;

        let transferred = tx.execute(
            "INSERT OR IGNORE INTO mentions (memory_id, entity_id, role, confidence)
             SELECT memory_id, ?1, role, confidence FROM mentions WHERE entity_id = ?2",
            rusqlite::params![keep_id, remove_id],
        )?;
        tx.execute(
            "DELETE FROM mentions WHERE entity_id = ?1",
            rusqlite::params![remove_id],
        )?;

        if transferred > 0 {
            tx.execute(
                "UPDATE entities
                 SET mention_count = COALESCE(mention_count, 0) + ?2
                 WHERE id = ?1",
                rusqlite::params![keep_id, transferred as i64],
            )?;
        }

        tx.execute(
            "DELETE FROM entities WHERE id = ?1",
            rusqlite::params![remove_id],
        )?;

        tx.commit()
    });

    match merged {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Entity merge {} <- {} failed: {}", keep_id, remove_id, e);
            false
        }
    }
}

// ============================================================================
// REPAIR
// ============================================================================

/// Recompute NULL mention counts from actual edge counts.
///
/// Repair utility for rows written before the counter existed or drifted
/// by interrupted merges. Returns the number of entities repaired.
pub fn reconcile_entity_mention_counts(store: &GraphStore) -> Result<usize> {
    store.with_writer(|conn| {
        conn.execute(
            "UPDATE entities
             SET mention_count = (
                 SELECT COUNT(*) FROM mentions WHERE mentions.entity_id = entities.id
             )
             WHERE mention_count IS NULL",
            [],
        )
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{EntityInput, EntityType, MemoryInput};
    use tempfile::TempDir;

    fn open_store() -> (TempDir, GraphStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = GraphStore::open(&dir.path().join("test.db")).expect("open store");
        (dir, store)
    }

    async fn add_entity(store: &GraphStore, name: &str, mentions: i64) -> String {
        let id = store
            .merge_entity(&EntityInput {
                name: name.to_string(),
                entity_type: EntityType::Person,
                aliases: vec![],
                description: None,
                embedding: None,
            })
            .await
            .expect("merge entity");
        store
            .with_writer(|conn| {
                conn.execute(
                    "UPDATE entities SET mention_count = ?2 WHERE id = ?1",
                    rusqlite::params![id, mentions],
                )
            })
            .expect("set mention count");
        id
    }

    #[tokio::test]
    async fn test_higher_mention_count_wins() {
        let (_dir, store) = open_store();
        add_entity(&store, "tarun", 5).await;
        add_entity(&store, "tarun sukhani", 3).await;

        let pairs = find_duplicate_entity_pairs(&store).expect("pairs");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].keep_name, "tarun");
        assert_eq!(pairs[0].remove_name, "tarun sukhani");
    }

    #[tokio::test]
    async fn test_tie_breaks_to_shorter_name() {
        let (_dir, store) = open_store();
        add_entity(&store, "tarun sukhani", 2).await;
        add_entity(&store, "tarun", 2).await;

        let pairs = find_duplicate_entity_pairs(&store).expect("pairs");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].keep_name, "tarun");
    }

    #[tokio::test]
    async fn test_short_names_and_unrelated_excluded() {
        let (_dir, store) = open_store();
        add_entity(&store, "al", 5).await;
        add_entity(&store, "alice", 3).await;
        add_entity(&store, "bob", 1).await;

        assert!(find_duplicate_entity_pairs(&store).expect("pairs").is_empty());
    }

    #[tokio::test]
    async fn test_different_types_not_paired() {
        let (_dir, store) = open_store();
        add_entity(&store, "mercury", 3).await;
        store
            .merge_entity(&EntityInput {
                name: "mercury records".to_string(),
                entity_type: EntityType::Organization,
                aliases: vec![],
                description: None,
                embedding: None,
            })
            .await
            .expect("org");

        assert!(find_duplicate_entity_pairs(&store).expect("pairs").is_empty());
    }

    #[tokio::test]
    async fn test_merge_transfers_without_double_counting() {
        let (_dir, store) = open_store();
        let keep = add_entity(&store, "tarun", 5).await;
        let remove = add_entity(&store, "tarun sukhani", 3).await;

        let m1 = store
            .store_memory(MemoryInput {
                text: "met tarun at the rust meetup yesterday".into(),
                ..Default::default()
            })
            .expect("m1");
        let m2 = store
            .store_memory(MemoryInput {
                text: "tarun sukhani recommended the espresso place".into(),
                ..Default::default()
            })
            .expect("m2");

        // m1 mentions both spellings; m2 only the long one
        store.create_mentions(&m1.id, &keep, "context", 1.0).expect("link");
        store.create_mentions(&m1.id, &remove, "context", 1.0).expect("link");
        store.create_mentions(&m2.id, &remove, "context", 1.0).expect("link");

        assert!(merge_entity_pair(&store, &keep, &remove));

        // Only m2's edge was genuinely transferred
        let entity = store.get_entity(&keep).expect("get").expect("exists");
        assert_eq!(entity.mention_count, Some(6));
        assert!(store.get_entity(&remove).expect("get").is_none());

        let edges: i64 = store
            .with_reader(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM mentions WHERE entity_id = ?1",
                    rusqlite::params![keep],
                    |row| row.get(0),
                )
            })
            .expect("count");
        assert_eq!(edges, 2);
    }

    #[tokio::test]
    async fn test_reconcile_fills_null_counts_only() {
        let (_dir, store) = open_store();
        let a = add_entity(&store, "alpha project", 9).await;
        let b = add_entity(&store, "beta project", 0).await;
        store
            .with_writer(|conn| {
                conn.execute(
                    "UPDATE entities SET mention_count = NULL WHERE id = ?1",
                    rusqlite::params![b],
                )
            })
            .expect("null out");

        let m = store
            .store_memory(MemoryInput {
                text: "the beta project shipped its first release".into(),
                ..Default::default()
            })
            .expect("memory");
        store.create_mentions(&m.id, &b, "context", 1.0).expect("link");

        assert_eq!(reconcile_entity_mention_counts(&store).expect("repair"), 1);
        assert_eq!(
            store.get_entity(&b).expect("get").expect("exists").mention_count,
            Some(1)
        );
        // The explicit count is untouched even though it disagrees with
        // the edge count
        assert_eq!(
            store.get_entity(&a).expect("get").expect("exists").mention_count,
            Some(9)
        );
    }
}
