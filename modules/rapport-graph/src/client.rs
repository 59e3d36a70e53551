use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, Query,
};
use serde_json::Value;
use tracing::debug;

use crate::store::{GraphError, GraphStore, Row, Statement, WriteSummary};

/// Thin wrapper around neo4rs::Graph providing connection setup.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(10)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn read(&self, statement: Statement) -> Result<Vec<Row>, GraphError> {
        debug!(cypher = %first_line(&statement.cypher), "graph read");
        let mut stream = self.graph.execute(to_query(&statement)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(normalize_row(&row)?);
        }
        Ok(rows)
    }

    /// Each write runs in its own transaction.
    async fn write(&self, statement: Statement) -> Result<WriteSummary, GraphError> {
        debug!(cypher = %first_line(&statement.cypher), "graph write");
        let mut txn = self.graph.start_txn().await?;
        let mut stream = txn.execute(to_query(&statement)).await?;
        let mut summary = WriteSummary::default();
        while let Some(row) = stream.next(txn.handle()).await? {
            summary += WriteSummary::from_row(&normalize_row(&row)?);
        }
        txn.commit().await?;
        Ok(summary)
    }

    async fn ping(&self) -> Result<(), GraphError> {
        self.graph
            .run(query("RETURN 1 AS ping"))
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))
    }
}

fn to_query(statement: &Statement) -> Query {
    statement
        .params
        .iter()
        .fold(query(&statement.cypher), |q, (key, value)| {
            q.param(key, to_bolt(value))
        })
}

fn normalize_row(row: &neo4rs::Row) -> Result<Row, GraphError> {
    row.to::<Row>().map_err(|e| GraphError::Decode(e.to_string()))
}

fn first_line(cypher: &str) -> &str {
    cypher.trim().lines().next().unwrap_or_default()
}

/// Convert a JSON parameter into a Bolt value.
pub(crate) fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => items.iter().map(to_bolt).collect::<Vec<BoltType>>().into(),
        Value::Object(map) => BoltType::Map(BoltMap::from_iter(
            map.iter()
                .map(|(k, v)| (BoltString::from(k.as_str()), to_bolt(v))),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_params_map_to_bolt_types() {
        assert!(matches!(to_bolt(&json!(null)), BoltType::Null(_)));
        assert!(matches!(to_bolt(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&json!(0.72)), BoltType::Float(_)));
        assert!(matches!(to_bolt(&json!("acme")), BoltType::String(_)));
        assert!(matches!(to_bolt(&json!(["a", "b"])), BoltType::List(_)));
        assert!(matches!(to_bolt(&json!({"k": true})), BoltType::Map(_)));
    }

    #[test]
    fn first_line_trims_multiline_cypher() {
        assert_eq!(first_line("\n  MATCH (n)\n RETURN n"), "MATCH (n)");
    }
}
