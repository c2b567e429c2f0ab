//! Sleep cycle consolidation journey
//!
//! Runs the full seven-phase cycle against seeded stores: duplicate
//! collapse, promotion and demotion around the Pareto threshold, deferred
//! extraction, decay pruning, orphan cleanup, and the fixed-point property
//! on a second run.

use engram_core::{
    find_duplicate_entity_pairs, run_sleep_cycle, EmbeddingProvider, EntityInput, EntityType,
    LlmProvider, MemoryCategory,
};
use engram_e2e_tests::{MockEmbeddings, MockLlm, TestStore};
use std::sync::Arc;

fn mock_providers() -> (Arc<dyn EmbeddingProvider>, Arc<dyn LlmProvider>) {
    (Arc::new(MockEmbeddings), Arc::new(MockLlm::empty()))
}

async fn seed_entity(harness: &TestStore, name: &str, times: usize) {
    for _ in 0..times {
        harness
            .store
            .merge_entity(&EntityInput {
                name: name.to_string(),
                entity_type: EntityType::Person,
                aliases: vec![],
                description: None,
                embedding: None,
            })
            .await
            .expect("merge entity");
    }
}

#[tokio::test]
async fn test_full_cycle_reaches_fixed_point() {
    let harness = TestStore::new("cycle-agent");
    let (embeddings, llm) = mock_providers();
    let embedder = MockEmbeddings;

    for text in [
        "prefers dark roast coffee in the morning",
        "works remotely from lisbon most of the year",
        "decided to standardize on postgresql for new services",
    ] {
        let embedding = embedder.embed(text).await.expect("embed");
        harness.add_memory(text, 0.7, Some(embedding));
    }

    let first = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert!(!first.aborted);
    assert_eq!(first.phases.len(), 7);
    assert_eq!(first.extracted, 3);

    let second = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert!(!second.aborted);
    assert_eq!(second.merged, 0);
    assert_eq!(second.entities_merged, 0);
    assert_eq!(second.promoted, 0);
    assert_eq!(second.demoted, 0);
    assert_eq!(second.pruned, 0);
    assert_eq!(second.extracted, 0);
}

#[tokio::test]
async fn test_near_duplicate_memories_collapse() {
    let harness = TestStore::new("dedup-cycle-agent");
    let (embeddings, llm) = mock_providers();
    let embedder = MockEmbeddings;

    // Same wording twice: identical mock embeddings, similarity 1.0
    let text = "the user prefers dark roast coffee";
    let original = harness.add_memory(text, 0.7, Some(embedder.embed(text).await.expect("embed")));
    harness.backdate(&original.id, 3);
    let duplicate = harness.add_memory(text, 0.7, Some(embedder.embed(text).await.expect("embed")));

    let other = "completely unrelated sailing trip plans";
    harness.add_memory(other, 0.7, Some(embedder.embed(other).await.expect("embed")));

    let result = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert_eq!(result.merged, 1);
    assert!(harness.store.get_memory(&original.id).expect("get").is_some());
    assert!(harness.store.get_memory(&duplicate.id).expect("get").is_none());
}

#[tokio::test]
async fn test_duplicate_entities_keep_canonical_short_name() {
    let harness = TestStore::new("entity-dedup-agent");
    let (embeddings, llm) = mock_providers();

    seed_entity(&harness, "tarun", 5).await;
    seed_entity(&harness, "tarun sukhani", 3).await;

    // Anchor the canonical entity with a mention so orphan cleanup
    // (phase 7) leaves it in place after the merge
    let memory = harness.add_memory("met tarun at the meetup", 0.6, None);
    let tarun = harness
        .store
        .get_entity_by_name("tarun")
        .expect("get")
        .expect("exists");
    harness
        .store
        .create_mentions(&memory.id, &tarun.id, "context", 1.0)
        .expect("link");

    let pairs = find_duplicate_entity_pairs(&harness.store).expect("pairs");
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].keep_name, "tarun");

    // The cycle merges the pair; the long form is gone afterwards
    let result = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert_eq!(result.entities_merged, 1);
    assert!(harness.store.get_entity_by_name("tarun").expect("get").is_some());
    assert!(harness
        .store
        .get_entity_by_name("tarun sukhani")
        .expect("get")
        .is_none());
}

#[tokio::test]
async fn test_promotion_demotion_and_pruning() {
    let harness = TestStore::new("lifecycle-agent");
    let (embeddings, llm) = mock_providers();
    let embedder = MockEmbeddings;

    // Old, important, frequently retrieved: promotable
    let valuable = harness.add_memory(
        "owns the billing service and its oncall rotation",
        0.9,
        Some(embedder.embed("billing service oncall").await.expect("embed")),
    );
    harness.backdate(&valuable.id, 30);
    harness.set_retrievals(&valuable.id, 8);

    // Long-forgotten filler: decays below retention
    let stale = harness.add_memory(
        "mentioned the weather in passing once",
        0.2,
        Some(embedder.embed("weather in passing").await.expect("embed")),
    );
    harness.backdate(&stale.id, 400);

    let result = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert_eq!(result.promoted, 1);
    assert_eq!(result.pruned, 1);

    let promoted = harness
        .store
        .get_memory(&valuable.id)
        .expect("get")
        .expect("exists");
    assert_eq!(promoted.category, MemoryCategory::Core);
    assert!(harness.store.get_memory(&stale.id).expect("get").is_none());

    // Aged far past its half-life the core memory falls under the
    // threshold set by a fresh competitor; its remaining retrieval
    // frequency keeps it above the pruning floor
    harness.set_retrievals(&valuable.id, 5);
    harness.backdate(&valuable.id, 300);
    let fresh = harness.add_memory(
        "current focus is the payments migration",
        0.9,
        Some(embedder.embed("payments migration focus").await.expect("embed")),
    );
    harness.set_retrievals(&fresh.id, 10);

    let result = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert_eq!(result.demoted, 1);
    let demoted = harness
        .store
        .get_memory(&valuable.id)
        .expect("get")
        .expect("exists");
    assert_ne!(demoted.category, MemoryCategory::Core);
}

#[tokio::test]
async fn test_orphan_cleanup_after_memory_deletion() {
    let harness = TestStore::new("orphan-agent");
    let (embeddings, llm) = mock_providers();

    let memory = harness.add_memory("a memory mentioning someone specific", 0.7, None);
    seed_entity(&harness, "someone specific", 1).await;
    let entity = harness
        .store
        .get_entity_by_name("someone specific")
        .expect("get")
        .expect("exists");
    harness
        .store
        .create_mentions(&memory.id, &entity.id, "context", 1.0)
        .expect("link");
    harness
        .store
        .tag_memory(&memory.id, "people", "topic", 1.0)
        .expect("tag");

    harness.store.delete_memory(&memory.id).expect("delete");

    let result = run_sleep_cycle(&harness.store, &embeddings, &llm, &harness.config).await;
    assert_eq!(result.orphans_removed, 2);
    assert!(harness
        .store
        .get_entity_by_name("someone specific")
        .expect("get")
        .is_none());
    assert_eq!(harness.count_rows("tags"), 0);
}
