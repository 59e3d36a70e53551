use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use pinecone_client::PineconeClient;
use rapport_common::{ConfidenceTier, Config, Contact, PendingRelationship};
use rapport_discovery::{
    ClaudeAssessor, DiscoveryConfig, DiscoveryJobRegistry, DiscoveryRunner, JobStore, MemoryJobStore,
    PgJobStore, PineconeIndex, RelationshipDiscoveryEngine, RelationshipReviewWorkflow,
};
use rapport_graph::{migrate::migrate, ContactGraph, ContactGraphSync, GraphClient, GraphStore};

#[derive(Parser)]
#[command(name = "rapport-discover", about = "Discover and review relationships between contacts")]
struct Cli {
    /// Tenant whose contacts are processed.
    #[arg(long, global = true, default_value = "")]
    tenant: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync contacts from a JSON file and run discovery.
    Discover {
        #[arg(long)]
        contacts: PathBuf,
        /// Log progress while the job runs.
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// List still-pending relationships of a job (needs DATABASE_URL).
    Pending {
        #[arg(long)]
        job: String,
        #[arg(long, default_value = "medium")]
        tier: ConfidenceTier,
    },
    /// Approve a relationship and write its graph edge.
    Approve {
        #[arg(long)]
        job: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
    /// Reject a relationship.
    Reject {
        #[arg(long)]
        job: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
    /// Ask the LLM to assess a relationship.
    Assess {
        #[arg(long)]
        job: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rapport=info".parse()?))
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(!cli.tenant.is_empty(), "--tenant is required");

    let config = Config::from_env()?;
    config.log_redacted();

    let client = GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await?;
    migrate(&client).await?;
    let store: Arc<dyn GraphStore> = Arc::new(client);
    let graph: Arc<dyn ContactGraph> = Arc::new(ContactGraphSync::new(store));

    let job_store: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await.context("connecting to job database")?;
            let pg = PgJobStore::new(pool);
            pg.ensure_schema().await?;
            Arc::new(pg)
        }
        None => Arc::new(MemoryJobStore::new()),
    };
    let ttl_secs = i64::try_from(config.discovery_job_ttl_secs).context("DISCOVERY_JOB_TTL_SECS out of range")?;
    let registry =
        Arc::new(DiscoveryJobRegistry::new(job_store).with_ttl(chrono::Duration::seconds(ttl_secs)));

    let tenant = cli.tenant.as_str();
    match cli.command {
        Command::Discover { contacts, wait, poll_ms } => {
            let raw = std::fs::read_to_string(&contacts)
                .with_context(|| format!("reading {}", contacts.display()))?;
            let contacts: Vec<Contact> = serde_json::from_str(&raw).context("parsing contacts file")?;

            let vectors = Arc::new(PineconeIndex::new(PineconeClient::new(
                config.pinecone_api_key.clone(),
                &config.pinecone_index_host,
            )));
            let engine = Arc::new(RelationshipDiscoveryEngine::new(
                graph,
                vectors,
                DiscoveryConfig {
                    top_k: config.discovery_top_k,
                    sync_batch_size: config.discovery_sync_batch_size,
                },
            ));
            let runner = DiscoveryRunner::new(engine, registry.clone());

            let submission = runner.submit(tenant, contacts).await?;
            info!(job_id = submission.job_id.as_str(), "Discovery submitted");

            if wait {
                let mut last = None;
                while !submission.handle.is_finished() {
                    if let Some(view) = registry.job_status(&submission.job_id, tenant).await? {
                        if last != Some(view.progress) {
                            info!(progress = view.progress, step = view.current_step.as_str(), "Discovery progress");
                            last = Some(view.progress);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(poll_ms)).await;
                }
            }

            let status = submission.handle.await?;
            info!(%status, "Discovery finished");
            let view = registry
                .job_status(&submission.job_id, tenant)
                .await?
                .context("job disappeared before it could be reported")?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Pending { job, tier } => {
            let workflow = RelationshipReviewWorkflow::new(graph, registry);
            let page = workflow.pending_relationships(tenant, &job, tier).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Approve { job, source, target } => {
            let workflow = RelationshipReviewWorkflow::new(graph, registry.clone());
            let relationship = lookup(&registry, tenant, &job, &source, &target).await?;
            let outcome = workflow.approve(tenant, &relationship, &job).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Reject { job, source, target } => {
            let workflow = RelationshipReviewWorkflow::new(graph, registry.clone());
            let relationship = lookup(&registry, tenant, &job, &source, &target).await?;
            workflow.reject(tenant, &relationship, &job).await?;
            println!("rejected {source} <-> {target}");
        }
        Command::Assess { job, source, target } => {
            let llm = Claude::new(config.anthropic_api_key.clone(), config.anthropic_model.clone());
            let workflow = RelationshipReviewWorkflow::new(graph, registry)
                .with_assessor(Arc::new(ClaudeAssessor::new(Arc::new(llm))));
            let assessment = workflow.assess_relationship(tenant, &source, &target, &job).await?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
    }

    Ok(())
}

async fn lookup(
    registry: &DiscoveryJobRegistry,
    tenant: &str,
    job_id: &str,
    source: &str,
    target: &str,
) -> Result<PendingRelationship> {
    let job = registry
        .get_job_for_user(job_id, tenant)
        .await?
        .with_context(|| format!("discovery job {job_id} not found"))?;
    job.relationships
        .find(source, target)
        .cloned()
        .with_context(|| format!("no relationship {source} <-> {target} in job {job_id}"))
}
