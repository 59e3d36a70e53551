pub mod error;
pub mod types;

pub use error::{PineconeError, Result};
pub use types::{FetchResponse, QueryRequest, QueryResponse, ScoredVector, VectorRecord};

use serde::de::DeserializeOwned;

const API_VERSION: &str = "2024-07";

/// Pinecone allows at most this many ids per fetch call.
const MAX_FETCH_IDS: usize = 1000;

/// Data-plane client for a single Pinecone index.
#[derive(Clone)]
pub struct PineconeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PineconeClient {
    /// `index_host` is the index's data-plane host, with or without scheme.
    pub fn new(api_key: String, index_host: &str) -> Self {
        let host = index_host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch vectors by id from a namespace. Missing ids are simply absent
    /// from the response.
    pub async fn fetch(&self, namespace: &str, ids: &[String]) -> Result<FetchResponse> {
        let mut merged = FetchResponse {
            namespace: namespace.to_string(),
            ..Default::default()
        };

        for chunk in ids.chunks(MAX_FETCH_IDS) {
            let mut params: Vec<(&str, &str)> = chunk.iter().map(|id| ("ids", id.as_str())).collect();
            params.push(("namespace", namespace));

            let url = format!("{}/vectors/fetch", self.base_url);
            let resp = self
                .client
                .get(&url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .query(&params)
                .send()
                .await?;

            let page: FetchResponse = Self::parse(resp).await?;
            merged.vectors.extend(page.vectors);
        }

        tracing::debug!(namespace, requested = ids.len(), found = merged.vectors.len(), "Pinecone fetch");
        Ok(merged)
    }

    /// Nearest-neighbor query within a namespace.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let url = format!("{}/query", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let result: QueryResponse = Self::parse(resp).await?;
        tracing::debug!(
            namespace = %request.namespace,
            top_k = request.top_k,
            matches = result.matches.len(),
            "Pinecone query"
        );
        Ok(result)
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PineconeError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
