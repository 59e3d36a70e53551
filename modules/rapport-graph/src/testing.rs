//! Test doubles for the graph boundary.
//!
//! - RecordingGraphStore (GraphStore): records every statement, serves canned
//!   read rows and fails statements matching a predicate.
//! - MemoryContactGraph (ContactGraph): stateful in-memory contact graph with
//!   merge semantics, derived companies/tags and injectable failures.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use rapport_common::{pair_key, Contact, PairKey, SimilarityEdge};

use crate::company::derive_company;
use crate::store::{GraphError, GraphStore, Row, Statement, WriteSummary};
use crate::traits::{ContactGraph, DeleteOutcome, SyncOutcome, TagOverlap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

type StatementPredicate = Box<dyn Fn(&Statement) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// RecordingGraphStore
// ---------------------------------------------------------------------------

pub struct RecordingGraphStore {
    log: Mutex<Vec<(AccessMode, Statement)>>,
    reads: Mutex<Vec<(String, Vec<Row>)>>,
    failing: Vec<StatementPredicate>,
    write_summary: WriteSummary,
    unavailable: bool,
}

impl Default for RecordingGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGraphStore {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            failing: Vec::new(),
            write_summary: WriteSummary {
                rows: 1,
                ..Default::default()
            },
            unavailable: false,
        }
    }

    /// Serve `rows` for reads whose Cypher contains `needle`.
    pub fn on_read(self, needle: &str, rows: Vec<Row>) -> Self {
        self.reads.lock().unwrap().push((needle.to_string(), rows));
        self
    }

    /// Fail any statement for which `predicate` returns true.
    pub fn fail_when(mut self, predicate: impl Fn(&Statement) -> bool + Send + Sync + 'static) -> Self {
        self.failing.push(Box::new(predicate));
        self
    }

    /// Summary returned by every successful write. Defaults to one matched row.
    pub fn with_write_summary(mut self, summary: WriteSummary) -> Self {
        self.write_summary = summary;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn statements(&self) -> Vec<(AccessMode, Statement)> {
        self.log.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Statement> {
        self.statements()
            .into_iter()
            .filter(|(mode, _)| *mode == AccessMode::Write)
            .map(|(_, s)| s)
            .collect()
    }

    fn check(&self, mode: AccessMode, statement: &Statement) -> Result<(), GraphError> {
        self.log.lock().unwrap().push((mode, statement.clone()));
        if self.unavailable {
            return Err(GraphError::Unavailable("connection refused".into()));
        }
        if self.failing.iter().any(|p| p(statement)) {
            return Err(GraphError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for RecordingGraphStore {
    async fn read(&self, statement: Statement) -> Result<Vec<Row>, GraphError> {
        self.check(AccessMode::Read, &statement)?;
        let reads = self.reads.lock().unwrap();
        Ok(reads
            .iter()
            .find(|(needle, _)| statement.cypher.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn write(&self, statement: Statement) -> Result<WriteSummary, GraphError> {
        self.check(AccessMode::Write, &statement)?;
        Ok(self.write_summary)
    }

    async fn ping(&self) -> Result<(), GraphError> {
        if self.unavailable {
            return Err(GraphError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryContactGraph
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TenantGraph {
    contacts: BTreeMap<String, Contact>,
    companies: BTreeSet<String>,
    tags: BTreeSet<String>,
    edges: HashMap<PairKey, SimilarityEdge>,
}

#[derive(Default)]
pub struct MemoryContactGraph {
    tenants: Mutex<HashMap<String, TenantGraph>>,
    failing_contacts: HashSet<String>,
    failing_pairs: HashSet<PairKey>,
    unavailable: bool,
    edge_writes: Mutex<usize>,
    edge_write_delay: Option<Duration>,
}

impl MemoryContactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts of this contact id report failure.
    pub fn fail_contact(mut self, contact_id: &str) -> Self {
        self.failing_contacts.insert(contact_id.to_string());
        self
    }

    /// SIMILARITY writes for this unordered pair fail.
    pub fn fail_edge(mut self, a: &str, b: &str) -> Self {
        self.failing_pairs.insert(pair_key(a, b));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Hold every SIMILARITY write for `delay` before applying it.
    pub fn with_edge_write_delay(mut self, delay: Duration) -> Self {
        self.edge_write_delay = Some(delay);
        self
    }

    /// Seed contacts directly, bypassing sync.
    pub fn with_contacts(self, tenant: &str, contacts: &[Contact]) -> Self {
        {
            let mut tenants = self.tenants.lock().unwrap();
            let graph = tenants.entry(tenant.to_string()).or_default();
            for c in contacts {
                merge_contact(graph, c);
            }
        }
        self
    }

    pub fn edges(&self, tenant: &str) -> Vec<SimilarityEdge> {
        let tenants = self.tenants.lock().unwrap();
        let mut edges: Vec<SimilarityEdge> = tenants
            .get(tenant)
            .map(|g| g.edges.values().cloned().collect())
            .unwrap_or_default();
        edges.sort_by_key(|e| e.pair_key());
        edges
    }

    pub fn edge(&self, tenant: &str, a: &str, b: &str) -> Option<SimilarityEdge> {
        let tenants = self.tenants.lock().unwrap();
        tenants.get(tenant)?.edges.get(&pair_key(a, b)).cloned()
    }

    pub fn contact_count(&self, tenant: &str) -> usize {
        let tenants = self.tenants.lock().unwrap();
        tenants.get(tenant).map(|g| g.contacts.len()).unwrap_or(0)
    }

    pub fn companies(&self, tenant: &str) -> Vec<String> {
        let tenants = self.tenants.lock().unwrap();
        tenants
            .get(tenant)
            .map(|g| g.companies.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tags(&self, tenant: &str) -> Vec<String> {
        let tenants = self.tenants.lock().unwrap();
        tenants
            .get(tenant)
            .map(|g| g.tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of SIMILARITY write calls, successful or not.
    pub fn edge_write_count(&self) -> usize {
        *self.edge_writes.lock().unwrap()
    }
}

fn merge_contact(graph: &mut TenantGraph, contact: &Contact) {
    if let Some(company) = derive_company(contact) {
        graph.companies.insert(company.key);
    }
    for tag in contact.normalized_tags() {
        graph.tags.insert(tag);
    }
    graph.contacts.insert(contact.id.clone(), contact.clone());
}

fn reclaim(graph: &mut TenantGraph) -> u64 {
    let live_companies: BTreeSet<String> = graph
        .contacts
        .values()
        .filter_map(|c| derive_company(c).map(|d| d.key))
        .collect();
    let live_tags: BTreeSet<String> = graph
        .contacts
        .values()
        .flat_map(|c| c.normalized_tags())
        .collect();
    let before = graph.companies.len() + graph.tags.len();
    graph.companies.retain(|c| live_companies.contains(c));
    graph.tags.retain(|t| live_tags.contains(t));
    (before - graph.companies.len() - graph.tags.len()) as u64
}

#[async_trait]
impl ContactGraph for MemoryContactGraph {
    async fn ping(&self) -> Result<(), GraphError> {
        if self.unavailable {
            return Err(GraphError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn upsert_contact(&self, tenant: &str, contact: &Contact) -> SyncOutcome {
        if self.unavailable {
            return SyncOutcome::failed("connection refused");
        }
        if self.failing_contacts.contains(&contact.id) {
            return SyncOutcome::failed(format!("write rejected for {}", contact.id));
        }
        let mut tenants = self.tenants.lock().unwrap();
        merge_contact(tenants.entry(tenant.to_string()).or_default(), contact);
        SyncOutcome::ok()
    }

    async fn delete_contact(&self, tenant: &str, contact_id: &str) -> Result<DeleteOutcome, GraphError> {
        self.ping().await?;
        let mut tenants = self.tenants.lock().unwrap();
        let Some(graph) = tenants.get_mut(tenant) else {
            return Ok(DeleteOutcome::default());
        };
        let deleted = graph.contacts.remove(contact_id).is_some();
        graph
            .edges
            .retain(|_, e| e.source_id != contact_id && e.target_id != contact_id);
        let orphans_reclaimed = reclaim(graph);
        Ok(DeleteOutcome {
            deleted,
            orphans_reclaimed,
        })
    }

    async fn reclaim_orphans(&self, tenant: &str) -> Result<u64, GraphError> {
        self.ping().await?;
        let mut tenants = self.tenants.lock().unwrap();
        Ok(tenants.get_mut(tenant).map(reclaim).unwrap_or(0))
    }

    async fn get_contact(&self, tenant: &str, contact_id: &str) -> Result<Option<Contact>, GraphError> {
        self.ping().await?;
        let tenants = self.tenants.lock().unwrap();
        Ok(tenants.get(tenant).and_then(|g| g.contacts.get(contact_id).cloned()))
    }

    async fn write_similarity_edge(&self, tenant: &str, edge: &SimilarityEdge) -> Result<WriteSummary, GraphError> {
        *self.edge_writes.lock().unwrap() += 1;
        self.ping().await?;
        if let Some(delay) = self.edge_write_delay {
            tokio::time::sleep(delay).await;
        }
        let key = edge.pair_key();
        if self.failing_pairs.contains(&key) {
            return Err(GraphError::Unavailable(format!("injected failure for {} <-> {}", key.0, key.1)));
        }

        let mut tenants = self.tenants.lock().unwrap();
        let graph = tenants.entry(tenant.to_string()).or_default();
        if !graph.contacts.contains_key(&edge.source_id) || !graph.contacts.contains_key(&edge.target_id) {
            return Err(GraphError::MissingEndpoint {
                source_id: key.0,
                target_id: key.1,
            });
        }
        let created = graph.edges.insert(key, edge.clone()).is_none();
        Ok(WriteSummary {
            rows: 1,
            relationships_created: u64::from(created),
            ..Default::default()
        })
    }

    async fn find_tag_overlaps(&self, tenant: &str, min_shared: usize) -> Result<Vec<TagOverlap>, GraphError> {
        self.ping().await?;
        let tenants = self.tenants.lock().unwrap();
        let Some(graph) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };

        let tagged: Vec<(&String, Vec<String>)> = graph
            .contacts
            .iter()
            .map(|(id, c)| (id, c.normalized_tags()))
            .collect();

        let mut overlaps = Vec::new();
        for (i, (a_id, a_tags)) in tagged.iter().enumerate() {
            for (b_id, b_tags) in tagged.iter().skip(i + 1) {
                let mut shared: Vec<String> = a_tags.iter().filter(|t| b_tags.contains(t)).cloned().collect();
                if shared.len() >= min_shared.max(1) {
                    shared.sort();
                    overlaps.push(TagOverlap {
                        source_id: (*a_id).clone(),
                        target_id: (*b_id).clone(),
                        shared_tags: shared,
                        source_tag_count: a_tags.len(),
                        target_tag_count: b_tags.len(),
                    });
                }
            }
        }
        overlaps.sort_by(|x, y| {
            y.shared_count()
                .cmp(&x.shared_count())
                .then_with(|| x.source_id.cmp(&y.source_id))
                .then_with(|| x.target_id.cmp(&y.target_id))
        });
        Ok(overlaps)
    }

    async fn similar_contacts(&self, tenant: &str, contact_id: &str) -> Result<Vec<SimilarityEdge>, GraphError> {
        self.ping().await?;
        let tenants = self.tenants.lock().unwrap();
        let Some(graph) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        let mut edges: Vec<SimilarityEdge> = graph
            .edges
            .values()
            .filter(|e| e.source_id == contact_id || e.target_id == contact_id)
            .map(|e| {
                let mut e = e.clone();
                if e.target_id == contact_id {
                    std::mem::swap(&mut e.source_id, &mut e.target_id);
                }
                e
            })
            .collect();
        edges.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(edges)
    }
}
