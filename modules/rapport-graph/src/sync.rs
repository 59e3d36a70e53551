use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use rapport_common::{Contact, SimilarityEdge};

use crate::company::derive_company;
use crate::store::{decode_rows, GraphError, GraphStore, Statement, WriteSummary};
use crate::traits::{ContactGraph, DeleteOutcome, SyncOutcome, TagOverlap};

/// Keeps Contact nodes and their derived Company/Tag structure in step with
/// the contact source of truth.
pub struct ContactGraphSync {
    store: Arc<dyn GraphStore>,
}

impl ContactGraphSync {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    async fn try_upsert(&self, tenant: &str, contact: &Contact) -> Result<WriteSummary, GraphError> {
        let tags = contact.normalized_tags();

        let mut summary = self
            .store
            .write(
                Statement::new(
                    "OPTIONAL MATCH (existing:Contact {tenant_id: $tenant, id: $id})
                     WITH existing IS NULL AS is_new
                     MERGE (c:Contact {tenant_id: $tenant, id: $id})
                     ON CREATE SET c.created_at = datetime()
                     SET c.name = $name,
                         c.email = $email,
                         c.company = $company,
                         c.job_title = $job_title,
                         c.tags = $tags,
                         c.notes = $notes,
                         c.updated_at = datetime()
                     RETURN CASE WHEN is_new THEN 1 ELSE 0 END AS nodes_created",
                )
                .param("tenant", tenant)
                .param("id", contact.id.as_str())
                .param("name", contact.name.as_str())
                .param("email", contact.email.clone())
                .param("company", contact.company.clone())
                .param("job_title", contact.job_title.clone())
                .param("tags", tags.clone())
                .param("notes", contact.notes.clone()),
            )
            .await?;

        summary += self.sync_company(tenant, contact).await?;
        summary += self.sync_tags(tenant, &contact.id, &tags).await?;
        Ok(summary)
    }

    /// Replace the contact's WORKS_AT edge with the currently derived company.
    async fn sync_company(&self, tenant: &str, contact: &Contact) -> Result<WriteSummary, GraphError> {
        let clear = Statement::new(
            "MATCH (c:Contact {tenant_id: $tenant, id: $id})-[old:WORKS_AT]->(co:Company)
             WHERE $company_key IS NULL OR co.key <> $company_key
             DELETE old
             RETURN count(*) AS relationships_deleted",
        )
        .param("tenant", tenant)
        .param("id", contact.id.as_str());

        let Some(company) = derive_company(contact) else {
            return self.store.write(clear.param("company_key", serde_json::Value::Null)).await;
        };

        let mut summary = self
            .store
            .write(clear.param("company_key", company.key.as_str()))
            .await?;

        summary += self
            .store
            .write(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})
                     OPTIONAL MATCH (c)-[existing:WORKS_AT]->(:Company {tenant_id: $tenant, key: $company_key})
                     WITH c, count(existing) = 0 AS is_new
                     MERGE (co:Company {tenant_id: $tenant, key: $company_key})
                     ON CREATE SET co.name = $company_name
                     MERGE (c)-[w:WORKS_AT]->(co)
                     SET w.confidence = $confidence, w.source = $source
                     RETURN CASE WHEN is_new THEN 1 ELSE 0 END AS relationships_created",
                )
                .param("tenant", tenant)
                .param("id", contact.id.as_str())
                .param("company_key", company.key.as_str())
                .param("company_name", company.name.as_str())
                .param("confidence", company.confidence)
                .param("source", company.source.as_str()),
            )
            .await?;

        debug!(tenant, contact_id = contact.id.as_str(), company = company.key.as_str(), "Linked company");
        Ok(summary)
    }

    /// Make the contact's HAS_TAG edges match `tags` exactly.
    async fn sync_tags(&self, tenant: &str, contact_id: &str, tags: &[String]) -> Result<WriteSummary, GraphError> {
        let mut summary = self
            .store
            .write(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})-[old:HAS_TAG]->(t:Tag)
                     WHERE NOT t.name IN $tags
                     DELETE old
                     RETURN count(*) AS relationships_deleted",
                )
                .param("tenant", tenant)
                .param("id", contact_id)
                .param("tags", tags.to_vec()),
            )
            .await?;

        if tags.is_empty() {
            return Ok(summary);
        }

        summary += self
            .store
            .write(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})
                     UNWIND $tags AS tag_name
                     MERGE (t:Tag {tenant_id: $tenant, name: tag_name})
                     MERGE (c)-[:HAS_TAG]->(t)
                     RETURN count(t) AS relationships_created",
                )
                .param("tenant", tenant)
                .param("id", contact_id)
                .param("tags", tags.to_vec()),
            )
            .await?;

        Ok(summary)
    }
}

#[async_trait]
impl ContactGraph for ContactGraphSync {
    async fn ping(&self) -> Result<(), GraphError> {
        self.store.ping().await
    }

    async fn upsert_contact(&self, tenant: &str, contact: &Contact) -> SyncOutcome {
        match self.try_upsert(tenant, contact).await {
            Ok(summary) => {
                debug!(
                    tenant,
                    contact_id = contact.id.as_str(),
                    nodes_created = summary.nodes_created,
                    "Upserted contact"
                );
                SyncOutcome::ok()
            }
            Err(e) => {
                warn!(tenant, contact_id = contact.id.as_str(), error = %e, "Contact upsert failed");
                SyncOutcome::failed(e)
            }
        }
    }

    async fn delete_contact(&self, tenant: &str, contact_id: &str) -> Result<DeleteOutcome, GraphError> {
        let summary = self
            .store
            .write(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})
                     DETACH DELETE c
                     RETURN count(*) AS nodes_deleted",
                )
                .param("tenant", tenant)
                .param("id", contact_id),
            )
            .await?;

        let orphans_reclaimed = self.reclaim_orphans(tenant).await?;
        info!(tenant, contact_id, orphans_reclaimed, "Deleted contact");

        Ok(DeleteOutcome {
            deleted: summary.nodes_deleted > 0,
            orphans_reclaimed,
        })
    }

    async fn reclaim_orphans(&self, tenant: &str) -> Result<u64, GraphError> {
        let summary = self
            .store
            .write(
                Statement::new(
                    "MATCH (n {tenant_id: $tenant})
                     WHERE (n:Company AND NOT (n)<-[:WORKS_AT]-(:Contact))
                        OR (n:Tag AND NOT (n)<-[:HAS_TAG]-(:Contact))
                     DETACH DELETE n
                     RETURN count(*) AS nodes_deleted",
                )
                .param("tenant", tenant),
            )
            .await?;
        Ok(summary.nodes_deleted)
    }

    async fn get_contact(&self, tenant: &str, contact_id: &str) -> Result<Option<Contact>, GraphError> {
        let rows = self
            .store
            .read(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})
                     RETURN c.id AS id,
                            coalesce(c.name, '') AS name,
                            c.email AS email,
                            c.company AS company,
                            c.job_title AS job_title,
                            coalesce(c.tags, []) AS tags,
                            c.notes AS notes",
                )
                .param("tenant", tenant)
                .param("id", contact_id),
            )
            .await?;
        Ok(decode_rows::<Contact>(rows)?.into_iter().next())
    }

    async fn write_similarity_edge(&self, tenant: &str, edge: &SimilarityEdge) -> Result<WriteSummary, GraphError> {
        // Sorted endpoints keep the stored direction stable across runs.
        let (a, b) = if edge.source_id <= edge.target_id {
            (edge.source_id.as_str(), edge.target_id.as_str())
        } else {
            (edge.target_id.as_str(), edge.source_id.as_str())
        };

        let summary = self
            .store
            .write(
                Statement::new(
                    "MATCH (a:Contact {tenant_id: $tenant, id: $a})
                     MATCH (b:Contact {tenant_id: $tenant, id: $b})
                     OPTIONAL MATCH (a)-[existing:SIMILARITY]-(b)
                     WITH a, b, count(existing) = 0 AS is_new
                     MERGE (a)-[r:SIMILARITY]-(b)
                     SET r.score = $score,
                         r.method = $method,
                         r.confidence = $confidence,
                         r.shared_tags = $shared_tags,
                         r.review_status = $review_status,
                         r.updated_at = datetime()
                     RETURN CASE WHEN is_new THEN 1 ELSE 0 END AS relationships_created",
                )
                .param("tenant", tenant)
                .param("a", a)
                .param("b", b)
                .param("score", edge.score)
                .param("method", edge.method.as_str())
                .param("confidence", edge.tier.as_str())
                .param("shared_tags", edge.shared_tags.clone())
                .param("review_status", edge.review_status.as_str()),
            )
            .await?;

        // No row back means one endpoint is missing and nothing was merged.
        if summary.rows == 0 {
            return Err(GraphError::MissingEndpoint {
                source_id: a.to_string(),
                target_id: b.to_string(),
            });
        }
        Ok(summary)
    }

    async fn find_tag_overlaps(&self, tenant: &str, min_shared: usize) -> Result<Vec<TagOverlap>, GraphError> {
        let rows = self
            .store
            .read(
                Statement::new(
                    "MATCH (a:Contact {tenant_id: $tenant})-[:HAS_TAG]->(t:Tag {tenant_id: $tenant})<-[:HAS_TAG]-(b:Contact {tenant_id: $tenant})
                     WHERE a.id < b.id
                     WITH a, b, collect(DISTINCT t.name) AS shared_tags
                     WHERE size(shared_tags) >= $min_shared
                     CALL {
                         WITH a
                         MATCH (a)-[:HAS_TAG]->(ta:Tag)
                         RETURN count(DISTINCT ta) AS source_tag_count
                     }
                     CALL {
                         WITH b
                         MATCH (b)-[:HAS_TAG]->(tb:Tag)
                         RETURN count(DISTINCT tb) AS target_tag_count
                     }
                     RETURN a.id AS source_id, b.id AS target_id, shared_tags,
                            source_tag_count, target_tag_count
                     ORDER BY size(shared_tags) DESC, source_id, target_id",
                )
                .param("tenant", tenant)
                .param("min_shared", min_shared as i64),
            )
            .await?;
        decode_rows(rows)
    }

    async fn similar_contacts(&self, tenant: &str, contact_id: &str) -> Result<Vec<SimilarityEdge>, GraphError> {
        let rows = self
            .store
            .read(
                Statement::new(
                    "MATCH (c:Contact {tenant_id: $tenant, id: $id})-[r:SIMILARITY]-(o:Contact {tenant_id: $tenant})
                     RETURN c.id AS source_id, o.id AS target_id, r.score AS score,
                            r.method AS method, r.confidence AS tier,
                            coalesce(r.shared_tags, []) AS shared_tags,
                            r.review_status AS review_status
                     ORDER BY r.score DESC",
                )
                .param("tenant", tenant)
                .param("id", contact_id),
            )
            .await?;
        decode_rows(rows)
    }
}
