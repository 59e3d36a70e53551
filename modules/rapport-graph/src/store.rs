use std::ops::AddAssign;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A result row normalized to column name -> JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Failed to decode graph row: {0}")]
    Decode(String),

    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("No SIMILARITY edge written: contact {source_id} or {target_id} is not in the graph")]
    MissingEndpoint { source_id: String, target_id: String },
}

/// A parametrized Cypher statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Map<String, Value>,
}

impl Statement {
    pub fn new(cypher: impl Into<String>) -> Self {
        Self {
            cypher: cypher.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// String parameter lookup, mostly for assertions on recorded statements.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Write counters. Write statements report them by returning columns with
/// these names; absent columns count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Rows the statement returned. Zero means its MATCH found nothing.
    pub rows: u64,
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
}

impl WriteSummary {
    pub fn from_row(row: &Row) -> Self {
        let counter = |key: &str| row.get(key).and_then(Value::as_u64).unwrap_or(0);
        Self {
            rows: 1,
            nodes_created: counter("nodes_created"),
            nodes_deleted: counter("nodes_deleted"),
            relationships_created: counter("relationships_created"),
            relationships_deleted: counter("relationships_deleted"),
        }
    }
}

impl AddAssign for WriteSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.rows += rhs.rows;
        self.nodes_created += rhs.nodes_created;
        self.nodes_deleted += rhs.nodes_deleted;
        self.relationships_created += rhs.relationships_created;
        self.relationships_deleted += rhs.relationships_deleted;
    }
}

/// Parametrized read/write execution against the graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn read(&self, statement: Statement) -> Result<Vec<Row>, GraphError>;

    async fn write(&self, statement: Statement) -> Result<WriteSummary, GraphError>;

    /// Cheap round trip used to tell a systemic outage from per-record failures.
    async fn ping(&self) -> Result<(), GraphError>;
}

/// Decode normalized rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, GraphError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row)).map_err(|e| GraphError::Decode(e.to_string()))
        })
        .collect()
}
