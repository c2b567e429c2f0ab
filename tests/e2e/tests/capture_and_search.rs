//! Capture and retrieval journey
//!
//! Exercises the real-time path end to end: the attention gate on the way
//! in, extraction building graph structure, and hybrid search fusing the
//! three signals on the way out.

use engram_core::{
    passes_attention_gate, run_background_extraction, EmbeddingProvider, LlmProvider, SearchEngine,
    StoreError,
};
use engram_e2e_tests::{MockEmbeddings, MockLlm, TestStore};
use std::sync::Arc;

#[tokio::test]
async fn test_gate_filters_noise_before_capture() {
    let harness = TestStore::new("gate-journey");

    let candidates = [
        "ok",
        "sounds good",
        "I prefer using TypeScript over JavaScript for all new projects",
        "ok let me test it out",
    ];
    for text in candidates {
        if passes_attention_gate(text) {
            harness.add_memory(text, 0.5, None);
        }
    }

    let stored = harness
        .store
        .count_memories(&harness.config.agent_id)
        .expect("count");
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_extraction_builds_graph_and_graph_signal() {
    let harness = TestStore::new("extract-journey");
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddings);
    let llm: Arc<dyn LlmProvider> = Arc::new(MockLlm::person_at_org("tarun", "acme"));

    let about_person = harness.add_memory("met tarun at the conference", 0.7, None);
    run_background_extraction(
        &harness.store,
        &embeddings,
        &llm,
        &about_person.id,
        &about_person.text,
        &harness.config,
    )
    .await
    .expect("extraction");

    // Both entities landed, linked by an allowlisted edge
    let tarun = harness
        .store
        .get_entity_by_name("tarun")
        .expect("get")
        .expect("tarun exists");
    assert!(harness.store.get_entity_by_name("acme").expect("get").is_some());
    assert_eq!(tarun.mention_count, Some(1));

    let edges = harness.store.entity_relationships(&tarun.id).expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].edge_type, "WORKS_AT");
    assert!((edges[0].confidence - 0.9).abs() < 1e-9);

    let stats = harness.store.stats(&harness.config.agent_id).expect("stats");
    assert_eq!(stats.total_entities, 2);
    assert_eq!(stats.pending_extraction, 0);

    // A second memory mentioning only the organization
    let about_org = harness.add_memory("acme is hiring three engineers", 0.6, None);
    let acme = harness
        .store
        .get_entity_by_name("acme")
        .expect("get")
        .expect("acme exists");
    harness
        .store
        .create_mentions(&about_org.id, &acme.id, "context", 0.8)
        .expect("link");

    // An entity-shaped query reaches the org memory through the WORKS_AT hop
    let engine = SearchEngine::new(
        harness.store.clone(),
        Arc::new(MockEmbeddings),
        harness.config.clone(),
    );
    let results = engine.search("tell me about Tarun", 5).await;

    let direct = results
        .iter()
        .find(|r| r.memory.id == about_person.id)
        .expect("direct mention returned");
    assert!(direct.signals.graph);

    let via_hop = results
        .iter()
        .find(|r| r.memory.id == about_org.id)
        .expect("second-hop memory returned");
    assert!(via_hop.signals.graph);
    assert!(via_hop.score <= direct.score);
}

#[tokio::test]
async fn test_disallowed_relationship_type_never_executes() {
    let harness = TestStore::new("allowlist-journey");
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddings);
    let llm: Arc<dyn LlmProvider> = Arc::new(MockLlm::person_at_org("tarun", "acme"));

    let memory = harness.add_memory("tarun joined acme last spring", 0.7, None);
    run_background_extraction(
        &harness.store,
        &embeddings,
        &llm,
        &memory.id,
        &memory.text,
        &harness.config,
    )
    .await
    .expect("extraction");

    // Arbitrary type strings are dropped, not errors - and never written
    harness
        .store
        .create_entity_relationship("tarun", "acme", "SABOTAGES", 0.9)
        .await
        .expect("no-op");
    harness
        .store
        .create_entity_relationship("tarun", "acme", "works_at", 0.9)
        .await
        .expect("case-sensitive no-op");

    assert_eq!(harness.count_rows("entity_edges"), 1);
}

#[tokio::test]
async fn test_memory_in_multiple_signals_returned_once() {
    let harness = TestStore::new("fusion-journey");
    let embeddings = MockEmbeddings;
    let both = harness.add_memory(
        "prefers dark roast coffee in the morning",
        0.7,
        Some(embeddings.embed("prefers dark roast coffee in the morning").await.expect("embed")),
    );
    harness.add_memory(
        "enjoys hiking on weekends",
        0.7,
        Some(embeddings.embed("enjoys hiking on weekends").await.expect("embed")),
    );

    let engine = SearchEngine::new(
        harness.store.clone(),
        Arc::new(MockEmbeddings),
        harness.config.clone(),
    );
    let results = engine.search("dark roast coffee", 5).await;

    let appearances = results.iter().filter(|r| r.memory.id == both.id).count();
    assert_eq!(appearances, 1);

    let hit = results.iter().find(|r| r.memory.id == both.id).expect("hit");
    assert!(hit.signals.vector && hit.signals.bm25);
    assert_eq!(results[0].memory.id, both.id);
    assert!((results[0].score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_delete_requires_strict_uuid() {
    let harness = TestStore::new("delete-journey");
    let memory = harness.add_memory("a memory to be forgotten entirely", 0.5, None);

    let err = harness
        .store
        .delete_memory("not-a-uuid' OR '1'='1")
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidId(_)));

    assert!(harness.store.delete_memory(&memory.id).expect("delete"));
    assert!(harness.store.get_memory(&memory.id).expect("get").is_none());
}
