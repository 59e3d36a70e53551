use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use pinecone_client::{PineconeClient, QueryRequest};
use serde_json::{Map, Value};

/// A neighbor returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Option<Map<String, Value>>,
}

/// Contact embeddings, namespaced per tenant. Embeddings are produced
/// elsewhere; discovery only reads them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stored embeddings for `ids`. Ids without an embedding are absent.
    async fn fetch(&self, tenant: &str, ids: &[String]) -> Result<HashMap<String, Vec<f32>>>;

    /// Nearest neighbors of `vector`, best first. May include the queried
    /// contact itself.
    async fn query(&self, tenant: &str, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;
}

/// `VectorIndex` over a Pinecone index, one namespace per tenant.
pub struct PineconeIndex {
    client: PineconeClient,
}

impl PineconeIndex {
    pub fn new(client: PineconeClient) -> Self {
        Self { client }
    }

    fn namespace(tenant: &str) -> &str {
        tenant
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn fetch(&self, tenant: &str, ids: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let response = self.client.fetch(Self::namespace(tenant), ids).await?;
        Ok(response
            .vectors
            .into_iter()
            .filter(|(_, record)| !record.values.is_empty())
            .map(|(id, record)| (id, record.values))
            .collect())
    }

    async fn query(&self, tenant: &str, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            namespace: Self::namespace(tenant).to_string(),
            vector: vector.to_vec(),
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let response = self.client.query(&request).await?;
        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }
}
