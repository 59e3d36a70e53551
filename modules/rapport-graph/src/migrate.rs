use tracing::{info, warn};

use crate::store::{GraphError, GraphStore, Statement};

/// Run idempotent schema migrations: tenant-scoped uniqueness constraints and
/// lookup indexes for the contact graph.
pub async fn migrate(store: &dyn GraphStore) -> Result<(), GraphError> {
    info!("Running schema migrations...");

    let constraints = [
        "CREATE CONSTRAINT contact_tenant_id IF NOT EXISTS FOR (n:Contact) REQUIRE (n.tenant_id, n.id) IS UNIQUE",
        "CREATE CONSTRAINT company_tenant_key IF NOT EXISTS FOR (n:Company) REQUIRE (n.tenant_id, n.key) IS UNIQUE",
        "CREATE CONSTRAINT tag_tenant_name IF NOT EXISTS FOR (n:Tag) REQUIRE (n.tenant_id, n.name) IS UNIQUE",
    ];

    for c in &constraints {
        run_ignoring_exists(store, c).await?;
    }
    info!("Uniqueness constraints created");

    let indexes = [
        "CREATE INDEX contact_tenant IF NOT EXISTS FOR (n:Contact) ON (n.tenant_id)",
        "CREATE INDEX similarity_review_status IF NOT EXISTS FOR ()-[r:SIMILARITY]-() ON (r.review_status)",
    ];

    for idx in &indexes {
        run_ignoring_exists(store, idx).await?;
    }
    info!("Indexes created");

    Ok(())
}

/// Older servers reject `IF NOT EXISTS`; an "already exists" error is success.
async fn run_ignoring_exists(store: &dyn GraphStore, cypher: &str) -> Result<(), GraphError> {
    match store.write(Statement::new(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("already exists") || msg.contains("EquivalentSchemaRule") {
                Ok(())
            } else {
                warn!("Migration statement failed: {msg}");
                Err(e)
            }
        }
    }
}
