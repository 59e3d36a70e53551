use std::env;
use std::str::FromStr;

use tracing::info;

use crate::RapportError;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Neo4j
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    // Vector index
    pub pinecone_api_key: String,
    pub pinecone_index_host: String,

    // LLM assessment
    pub anthropic_api_key: String,
    pub anthropic_model: String,

    // Job store. In-memory when unset.
    pub database_url: Option<String>,

    // Discovery tuning
    pub discovery_top_k: usize,
    pub discovery_sync_batch_size: usize,
    pub discovery_job_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, RapportError> {
        Ok(Self {
            neo4j_uri: required_env("NEO4J_URI")?,
            neo4j_user: required_env("NEO4J_USER")?,
            neo4j_password: required_env("NEO4J_PASSWORD")?,
            pinecone_api_key: required_env("PINECONE_API_KEY")?,
            pinecone_index_host: required_env("PINECONE_INDEX_HOST")?,
            anthropic_api_key: required_env("ANTHROPIC_API_KEY")?,
            anthropic_model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_MODEL.to_string()),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            discovery_top_k: parsed_env("DISCOVERY_TOP_K", 10)?,
            discovery_sync_batch_size: parsed_env("DISCOVERY_SYNC_BATCH_SIZE", 50)?,
            discovery_job_ttl_secs: parsed_env("DISCOVERY_JOB_TTL_SECS", 3600)?,
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            neo4j_uri = self.neo4j_uri.as_str(),
            neo4j_user = self.neo4j_user.as_str(),
            neo4j_password = redact(&self.neo4j_password),
            pinecone_index_host = self.pinecone_index_host.as_str(),
            pinecone_api_key = redact(&self.pinecone_api_key),
            anthropic_api_key = redact(&self.anthropic_api_key),
            anthropic_model = self.anthropic_model.as_str(),
            job_store = if self.database_url.is_some() { "postgres" } else { "memory" },
            top_k = self.discovery_top_k,
            sync_batch_size = self.discovery_sync_batch_size,
            job_ttl_secs = self.discovery_job_ttl_secs,
            "Loaded configuration"
        );
    }
}

fn required_env(key: &str) -> Result<String, RapportError> {
    env::var(key).map_err(|_| RapportError::Config(format!("{key} environment variable is required")))
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, RapportError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RapportError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}
