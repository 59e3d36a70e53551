//! ContactGraphSync behavior against a recording GraphStore: which statements
//! are issued, with which parameters, and how failures surface.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use rapport_common::{ConfidenceTier, Contact, ReviewStatus, SimilarityEdge, SimilarityMethod};
use rapport_graph::testing::{AccessMode, RecordingGraphStore};
use rapport_graph::{
    BatchProgress, ContactGraph, ContactGraphSync, GraphError, NoProgress, Row, WriteSummary,
};

fn contact(id: &str, email: Option<&str>, company: Option<&str>, tags: &[&str]) -> Contact {
    Contact {
        email: email.map(String::from),
        company: company.map(String::from),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Contact::new(id, format!("Contact {id}"))
    }
}

fn sync_over(store: RecordingGraphStore) -> (Arc<RecordingGraphStore>, ContactGraphSync) {
    let store = Arc::new(store);
    let sync = ContactGraphSync::new(store.clone());
    (store, sync)
}

fn row(value: serde_json::Value) -> Row {
    serde_json::from_value(value).unwrap()
}

#[derive(Default)]
struct RecordingProgress {
    calls: Mutex<Vec<(usize, usize)>>,
}

#[async_trait]
impl BatchProgress for RecordingProgress {
    async fn batch_done(&self, processed: usize, total: usize) {
        self.calls.lock().unwrap().push((processed, total));
    }
}

#[tokio::test]
async fn upsert_merges_contact_then_links_explicit_company_and_tags() {
    let (store, sync) = sync_over(RecordingGraphStore::new());
    let c = contact("c-1", Some("ada@gmail.com"), Some("Analytical Engines Ltd"), &["Math", "math", "AI"]);

    let outcome = sync.upsert_contact("tenant-a", &c).await;
    assert!(outcome.success);
    assert!(outcome.error.is_none());

    let writes = store.writes();
    assert!(writes[0].cypher.contains("MERGE (c:Contact {tenant_id: $tenant, id: $id})"));
    assert_eq!(writes[0].str_param("tenant"), Some("tenant-a"));
    assert_eq!(writes[0].params["tags"], json!(["math", "ai"]));

    let link = writes
        .iter()
        .find(|s| s.cypher.contains("MERGE (c)-[w:WORKS_AT]->(co)"))
        .expect("company link statement");
    assert_eq!(link.str_param("company_key"), Some("analytical engines"));
    assert_eq!(link.params["confidence"], json!(1.0));
    assert_eq!(link.str_param("source"), Some("explicit"));

    assert!(writes.iter().any(|s| s.cypher.contains("MERGE (c)-[:HAS_TAG]->(t)")));
}

#[tokio::test]
async fn upsert_with_free_mail_and_no_company_only_clears_company_edge() {
    let (store, sync) = sync_over(RecordingGraphStore::new());
    let c = contact("c-2", Some("bob@gmail.com"), None, &[]);

    assert!(sync.upsert_contact("t", &c).await.success);

    let writes = store.writes();
    assert!(!writes.iter().any(|s| s.cypher.contains("MERGE (c)-[w:WORKS_AT]->(co)")));
    let clear = writes
        .iter()
        .find(|s| s.cypher.contains("DELETE old") && s.cypher.contains("WORKS_AT"))
        .expect("clear statement");
    assert_eq!(clear.params["company_key"], json!(null));
    // No tags: stale HAS_TAG edges are removed, nothing is merged.
    assert!(!writes.iter().any(|s| s.cypher.contains("UNWIND $tags")));
}

#[tokio::test]
async fn upsert_derives_company_from_corporate_domain() {
    let (store, sync) = sync_over(RecordingGraphStore::new());
    let c = contact("c-3", Some("carol@eng.globex.com"), None, &[]);

    assert!(sync.upsert_contact("t", &c).await.success);

    let link = store
        .writes()
        .into_iter()
        .find(|s| s.cypher.contains("MERGE (c)-[w:WORKS_AT]->(co)"))
        .expect("company link statement");
    assert_eq!(link.str_param("company_key"), Some("globex"));
    assert_eq!(link.str_param("source"), Some("email_domain"));
    assert_eq!(link.params["confidence"], json!(0.7));
}

#[tokio::test]
async fn upsert_failure_is_reported_not_raised() {
    let (_store, sync) = sync_over(RecordingGraphStore::new().fail_when(|s| s.cypher.contains("HAS_TAG")));
    let outcome = sync.upsert_contact("t", &contact("c-1", None, None, &["x"])).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("injected failure"));
}

#[tokio::test]
async fn bulk_sync_batches_collects_failures_and_reports_progress() {
    let (_store, sync) =
        sync_over(RecordingGraphStore::new().fail_when(|s| s.str_param("id") == Some("c-3")));
    let contacts: Vec<Contact> = (1..=5)
        .map(|i| contact(&format!("c-{i}"), None, None, &[]))
        .collect();
    let progress = RecordingProgress::default();

    let report = sync.bulk_sync("t", &contacts, 2, &progress).await.unwrap();

    assert_eq!(report.synced, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].contact_id, "c-3");
    assert_eq!(*progress.calls.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
}

#[tokio::test]
async fn bulk_sync_against_unreachable_store_is_systemic_failure() {
    let (store, sync) = sync_over(RecordingGraphStore::new().unavailable());
    let contacts = vec![contact("c-1", None, None, &[])];

    let result = sync.bulk_sync("t", &contacts, 10, &NoProgress).await;

    assert!(result.is_err());
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn delete_detaches_contact_then_sweeps_orphans() {
    let (store, sync) = sync_over(RecordingGraphStore::new().with_write_summary(WriteSummary {
        rows: 1,
        nodes_deleted: 1,
        ..Default::default()
    }));

    let outcome = sync.delete_contact("t", "c-1").await.unwrap();

    assert!(outcome.deleted);
    assert_eq!(outcome.orphans_reclaimed, 1);
    let writes = store.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[0].cypher.contains("DETACH DELETE c"));
    assert!(writes[1].cypher.contains("n:Company AND NOT"));
    assert!(writes[1].cypher.contains("n:Tag AND NOT"));
}

#[tokio::test]
async fn similarity_edge_is_merged_with_sorted_endpoints() {
    let (store, sync) = sync_over(RecordingGraphStore::new());
    let edge = SimilarityEdge {
        source_id: "z".into(),
        target_id: "a".into(),
        score: 0.8,
        method: SimilarityMethod::Tags,
        tier: ConfidenceTier::High,
        shared_tags: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        review_status: ReviewStatus::AutoApproved,
    };

    sync.write_similarity_edge("t", &edge).await.unwrap();

    let writes = store.writes();
    let stmt = &writes[0];
    assert!(stmt.cypher.contains("MERGE (a)-[r:SIMILARITY]-(b)"));
    assert_eq!(stmt.str_param("a"), Some("a"));
    assert_eq!(stmt.str_param("b"), Some("z"));
    assert_eq!(stmt.str_param("method"), Some("tags"));
    assert_eq!(stmt.str_param("confidence"), Some("high"));
    assert_eq!(stmt.str_param("review_status"), Some("auto_approved"));
    assert_eq!(stmt.params["shared_tags"], json!(["a", "b", "c", "d"]));
}

#[tokio::test]
async fn similarity_edge_without_matching_contacts_is_an_error() {
    let (store, sync) = sync_over(RecordingGraphStore::new().with_write_summary(WriteSummary::default()));
    let edge = SimilarityEdge {
        source_id: "b".into(),
        target_id: "a".into(),
        score: 0.72,
        method: SimilarityMethod::Vector,
        tier: ConfidenceTier::High,
        shared_tags: vec![],
        review_status: ReviewStatus::AutoApproved,
    };

    let err = sync.write_similarity_edge("t", &edge).await.unwrap_err();

    assert!(matches!(
        err,
        GraphError::MissingEndpoint { ref source_id, ref target_id } if source_id == "a" && target_id == "b"
    ));
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn tag_overlaps_are_read_in_one_aggregate_query() {
    let store = RecordingGraphStore::new().on_read(
        "collect(DISTINCT t.name) AS shared_tags",
        vec![row(json!({
            "source_id": "x",
            "target_id": "y",
            "shared_tags": ["go", "rust", "sql", "wasm"],
            "source_tag_count": 5,
            "target_tag_count": 4
        }))],
    );
    let (store, sync) = sync_over(store);

    let overlaps = sync.find_tag_overlaps("t", 2).await.unwrap();

    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].shared_count(), 4);
    let reads: Vec<_> = store
        .statements()
        .into_iter()
        .filter(|(mode, _)| *mode == AccessMode::Read)
        .collect();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].1.params["min_shared"], json!(2));
}

#[tokio::test]
async fn get_contact_decodes_row_or_returns_none() {
    let store = RecordingGraphStore::new().on_read(
        "RETURN c.id AS id",
        vec![row(json!({
            "id": "c-1",
            "name": "Ada",
            "email": null,
            "company": "Analytical Engines",
            "job_title": "Programmer",
            "tags": ["math"],
            "notes": null
        }))],
    );
    let (_store, sync) = sync_over(store);

    let found = sync.get_contact("t", "c-1").await.unwrap().unwrap();
    assert_eq!(found.name, "Ada");
    assert_eq!(found.company.as_deref(), Some("Analytical Engines"));
    assert!(found.email.is_none());

    let (_store, empty) = sync_over(RecordingGraphStore::new());
    assert!(empty.get_contact("t", "missing").await.unwrap().is_none());
}
