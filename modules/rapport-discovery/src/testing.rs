//! Test doubles for the discovery engine and review workflow.
//!
//! MockVectorIndex serves canned neighbor lists per contact, MockAssessor
//! returns a fixed assessment, and RecordingProgress captures progress reports.
//! Pair them with rapport_graph::testing::MemoryContactGraph for end-to-end
//! pipeline tests without Neo4j or Pinecone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use rapport_common::{ConnectionType, LlmAssessment, SuggestedAction};

use crate::assess::{AssessmentRequest, RelationshipAssessor};
use crate::engine::ProgressSink;
use crate::error::AssessmentError;
use crate::vector::{VectorIndex, VectorMatch};

// ---------------------------------------------------------------------------
// MockVectorIndex
// ---------------------------------------------------------------------------

/// Each registered contact gets a unique one-element embedding; querying with
/// it returns that contact's canned neighbors. Tenants share one index.
#[derive(Default)]
pub struct MockVectorIndex {
    embeddings: HashMap<String, Vec<f32>>,
    neighbors: HashMap<String, Vec<VectorMatch>>,
    failing: HashSet<String>,
    fetches: AtomicUsize,
    queries: AtomicUsize,
}

impl MockVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `id` an embedding whose nearest neighbors are `neighbors`. The
    /// contact itself is returned first with score 1.0, as a real index does.
    pub fn with_neighbors(mut self, id: &str, neighbors: &[(&str, f64)]) -> Self {
        self.register(id);
        let mut matches = vec![VectorMatch {
            id: id.to_string(),
            score: 1.0,
            metadata: None,
        }];
        matches.extend(neighbors.iter().map(|(other, score)| VectorMatch {
            id: other.to_string(),
            score: *score,
            metadata: None,
        }));
        self.neighbors.insert(id.to_string(), matches);
        self
    }

    /// Symmetric similarity: registers `a -> b` and `b -> a`.
    pub fn with_pair(self, a: &str, b: &str, score: f64) -> Self {
        let with_a = self.add_neighbor(a, b, score);
        with_a.add_neighbor(b, a, score)
    }

    /// Fetches for `id` fail.
    pub fn fail_for(mut self, id: &str) -> Self {
        self.register(id);
        self.failing.insert(id.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn add_neighbor(mut self, id: &str, other: &str, score: f64) -> Self {
        if !self.neighbors.contains_key(id) {
            self = self.with_neighbors(id, &[]);
        }
        if let Some(list) = self.neighbors.get_mut(id) {
            list.push(VectorMatch {
                id: other.to_string(),
                score,
                metadata: None,
            });
        }
        self
    }

    fn register(&mut self, id: &str) {
        let next = self.embeddings.len() as f32 + 1.0;
        self.embeddings.entry(id.to_string()).or_insert_with(|| vec![next]);
    }

    fn owner_of(&self, vector: &[f32]) -> Option<&str> {
        self.embeddings
            .iter()
            .find(|(_, v)| v.as_slice() == vector)
            .map(|(id, _)| id.as_str())
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn fetch(&self, _tenant: &str, ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = ids.iter().find(|id| self.failing.contains(*id)) {
            return Err(anyhow!("vector fetch failed for {id}"));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.embeddings.get(id).map(|v| (id.clone(), v.clone())))
            .collect())
    }

    async fn query(&self, _tenant: &str, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let Some(owner) = self.owner_of(vector) else {
            return Ok(Vec::new());
        };
        let mut matches = self.neighbors.get(owner).cloned().unwrap_or_default();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

// ---------------------------------------------------------------------------
// MockAssessor
// ---------------------------------------------------------------------------

pub struct MockAssessor {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockAssessor {
    /// Always answers `approve` with confidence 7.
    pub fn approving() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails as if the model returned garbage.
    pub fn malformed(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationshipAssessor for MockAssessor {
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmAssessment, AssessmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(AssessmentError::MalformedResponse(message.clone()));
        }
        Ok(LlmAssessment {
            explanation: format!("{} and {} look related", request.source.name, request.target.name),
            connection_type: ConnectionType::ProfessionalNetwork,
            confidence: 7,
            suggested_action: SuggestedAction::Approve,
            assessed_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingProgress
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingProgress {
    reports: Mutex<Vec<(u8, String)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(u8, String)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.reports().into_iter().map(|(p, _)| p).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, percent: u8, step: &str) {
        self.reports.lock().unwrap().push((percent, step.to_string()));
    }
}
