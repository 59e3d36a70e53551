//! Discovery pipeline end to end over in-memory graph and vector doubles.

use std::sync::Arc;

use rapport_common::{ConfidenceTier, Contact, ReviewStatus, SimilarityMethod};
use rapport_discovery::testing::{MockVectorIndex, RecordingProgress};
use rapport_discovery::{DiscoveryConfig, DiscoveryError, NoopProgress, RelationshipDiscoveryEngine};
use rapport_graph::testing::MemoryContactGraph;

const TENANT: &str = "tenant-a";

fn contact(id: &str) -> Contact {
    Contact::new(id, id.to_uppercase())
}

fn tagged(id: &str, tags: &[&str]) -> Contact {
    Contact {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..contact(id)
    }
}

fn engine(graph: &Arc<MemoryContactGraph>, vectors: MockVectorIndex) -> RelationshipDiscoveryEngine {
    RelationshipDiscoveryEngine::new(graph.clone(), Arc::new(vectors), DiscoveryConfig::default())
}

#[tokio::test]
async fn vector_scores_are_tiered_and_only_high_is_persisted() {
    let graph = Arc::new(MemoryContactGraph::new());
    let vectors = MockVectorIndex::new().with_neighbors("a", &[("b", 0.72), ("c", 0.40), ("d", 0.05)]);
    let contacts = vec![contact("a"), contact("b"), contact("c"), contact("d")];

    let result = engine(&graph, vectors)
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    let high = &result.relationships.high;
    assert_eq!(high.len(), 1);
    assert!(high[0].connects("a", "b"));
    assert_eq!(high[0].review_status, ReviewStatus::AutoApproved);
    assert_eq!(high[0].method, SimilarityMethod::Vector);

    let medium = &result.relationships.medium;
    assert_eq!(medium.len(), 1);
    assert!(medium[0].connects("a", "c"));
    assert_eq!(medium[0].review_status, ReviewStatus::Pending);

    assert!(result.relationships.low.is_empty());
    assert!(result.relationships.find("a", "d").is_none());

    let edges = graph.edges(TENANT);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].review_status, ReviewStatus::AutoApproved);
    assert_eq!(edges[0].tier, ConfidenceTier::High);

    assert_eq!(result.counts.total, 2);
    assert_eq!(result.stats.edges_written, 1);
}

#[tokio::test]
async fn shared_tags_create_high_edge_with_provenance() {
    let graph = Arc::new(MemoryContactGraph::new());
    let shared = ["climbing", "rust", "jazz", "coffee"];
    let contacts = vec![
        tagged("x", &[&shared[..], &["chess"]].concat()),
        tagged("y", &shared),
        tagged("z", &["rust", "jazz"]),
    ];

    let result = engine(&graph, MockVectorIndex::new())
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    let edge = graph.edge(TENANT, "x", "y").expect("auto-created edge");
    assert_eq!(edge.tier, ConfidenceTier::High);
    assert_eq!(edge.method, SimilarityMethod::Tags);
    assert_eq!(edge.review_status, ReviewStatus::AutoApproved);
    let mut tags = edge.shared_tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["climbing", "coffee", "jazz", "rust"]);
    // 4 shared over a union of 5.
    assert!((edge.score - 0.8).abs() < 1e-9);

    // z shares two tags with both x and y: LOW, pending, not written.
    assert_eq!(result.relationships.low.len(), 2);
    assert!(graph.edge(TENANT, "x", "z").is_none());
    assert_eq!(result.counts.total, 3);
}

#[tokio::test]
async fn each_unordered_pair_is_reported_once() {
    let graph = Arc::new(MemoryContactGraph::new());
    let vectors = MockVectorIndex::new().with_pair("a", "b", 0.45);
    // Also share two tags, so the tag phase sees the same pair.
    let contacts = vec![tagged("a", &["go", "k8s"]), tagged("b", &["go", "k8s"])];

    let result = engine(&graph, vectors)
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    assert_eq!(result.counts.total, 1);
    assert_eq!(result.relationships.medium.len(), 1);
    assert_eq!(result.relationships.medium[0].method, SimilarityMethod::Vector);
}

#[tokio::test]
async fn rerunning_discovery_never_duplicates_edges() {
    let graph = Arc::new(MemoryContactGraph::new());
    let contacts = vec![contact("a"), contact("b"), contact("c")];
    let vectors = || {
        MockVectorIndex::new()
            .with_pair("a", "b", 0.9)
            .with_pair("b", "c", 0.65)
    };

    let first = engine(&graph, vectors()).discover_all(TENANT, &contacts, &NoopProgress).await.unwrap();
    let second = engine(&graph, vectors()).discover_all(TENANT, &contacts, &NoopProgress).await.unwrap();

    assert_eq!(first.counts, second.counts);
    assert_eq!(graph.edges(TENANT).len(), 2);
    assert_eq!(graph.contact_count(TENANT), 3);
}

#[tokio::test]
async fn missing_embeddings_and_vector_errors_skip_the_contact() {
    let graph = Arc::new(MemoryContactGraph::new());
    let vectors = MockVectorIndex::new()
        .with_neighbors("a", &[("b", 0.5)])
        .fail_for("c");
    let contacts = vec![contact("a"), contact("b"), contact("c"), contact("d")];

    let result = engine(&graph, vectors)
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    // b has no embedding, d has none either, c errors.
    assert_eq!(result.stats.vector_processed, 1);
    assert_eq!(result.stats.vector_skipped, 3);
    assert_eq!(result.relationships.medium.len(), 1);
}

#[tokio::test]
async fn high_edge_write_failure_leaves_relationship_pending() {
    let graph = Arc::new(MemoryContactGraph::new().fail_edge("a", "b"));
    let vectors = MockVectorIndex::new().with_neighbors("a", &[("b", 0.95), ("c", 0.61)]);
    let contacts = vec![contact("a"), contact("b"), contact("c")];

    let result = engine(&graph, vectors)
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    let ab = result.relationships.find("a", "b").unwrap();
    assert_eq!(ab.tier, ConfidenceTier::High);
    assert_eq!(ab.review_status, ReviewStatus::Pending);
    assert_eq!(result.relationships.find("a", "c").unwrap().review_status, ReviewStatus::AutoApproved);
    assert_eq!(result.stats.edges_written, 1);
}

#[tokio::test]
async fn high_edge_to_an_unsynced_contact_is_not_counted_as_written() {
    let graph = Arc::new(MemoryContactGraph::new().fail_contact("b"));
    let vectors = MockVectorIndex::new().with_pair("a", "b", 0.72);
    let contacts = vec![contact("a"), contact("b")];

    let result = engine(&graph, vectors)
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    let ab = result.relationships.find("a", "b").unwrap();
    assert_eq!(ab.tier, ConfidenceTier::High);
    assert_eq!(ab.review_status, ReviewStatus::Pending);
    assert_eq!(result.stats.edges_written, 0);
    assert!(graph.edges(TENANT).is_empty());
}

#[tokio::test]
async fn individual_sync_failures_are_tolerated() {
    let graph = Arc::new(MemoryContactGraph::new().fail_contact("b"));
    let contacts = vec![contact("a"), contact("b"), contact("c")];

    let result = engine(&graph, MockVectorIndex::new())
        .discover_all(TENANT, &contacts, &NoopProgress)
        .await
        .unwrap();

    assert_eq!(result.stats.contacts_synced, 2);
    assert_eq!(result.stats.contacts_failed, 1);
}

#[tokio::test]
async fn unreachable_graph_is_fatal() {
    let graph = Arc::new(MemoryContactGraph::new().unavailable());
    let vectors = MockVectorIndex::new().with_neighbors("a", &[("b", 0.9)]);

    let err = engine(&graph, vectors)
        .discover_all(TENANT, &[contact("a"), contact("b")], &NoopProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Fatal(_)));
}

#[tokio::test]
async fn every_contact_failing_is_fatal() {
    let graph = Arc::new(MemoryContactGraph::new().fail_contact("a").fail_contact("b"));

    let err = engine(&graph, MockVectorIndex::new())
        .discover_all(TENANT, &[contact("a"), contact("b")], &NoopProgress)
        .await
        .unwrap_err();

    let DiscoveryError::Fatal(message) = err;
    assert!(message.contains("all 2 contacts failed"));
}

#[tokio::test]
async fn progress_walks_the_phase_bands_in_order() {
    let graph = Arc::new(MemoryContactGraph::new());
    let vectors = MockVectorIndex::new().with_pair("a", "b", 0.3);
    let contacts: Vec<Contact> = ["a", "b", "c", "d"].iter().map(|id| contact(id)).collect();
    let progress = RecordingProgress::new();

    RelationshipDiscoveryEngine::new(
        graph.clone(),
        Arc::new(vectors),
        DiscoveryConfig {
            top_k: 5,
            sync_batch_size: 2,
        },
    )
    .discover_all(TENANT, &contacts, &progress)
    .await
    .unwrap();

    let percents = progress.percents();
    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {percents:?}");
    for mark in [15, 30, 40, 90] {
        assert!(percents.contains(&mark), "missing {mark}% in {percents:?}");
    }
    assert!(progress.reports().iter().any(|(_, step)| step == "Analyzed 4/4 contacts"));
}

#[tokio::test]
async fn company_groups_are_reported_as_stats() {
    let graph = Arc::new(MemoryContactGraph::new());
    let mut a = contact("a");
    a.company = Some("Initech LLC".into());
    let mut b = contact("b");
    b.email = Some("bob@initech.com".into());
    let mut c = contact("c");
    c.email = Some("carol@gmail.com".into());

    let result = engine(&graph, MockVectorIndex::new())
        .discover_all(TENANT, &[a, b, c], &NoopProgress)
        .await
        .unwrap();

    assert_eq!(result.stats.company_groups.len(), 1);
    assert_eq!(result.stats.company_groups[0].company, "initech");
    // Grouping alone never creates edges.
    assert!(graph.edges(TENANT).is_empty());
}
