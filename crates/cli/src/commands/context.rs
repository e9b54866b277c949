use std::sync::Arc;

use procura_core::audit::TracingAuditSink;
use procura_core::config::{AppConfig, GatewayMode};
use procura_core::domain::document::DocumentId;
use procura_core::gateway::{ProcurementGateway, TargetRateSource};
use procura_core::resolver::TargetRateResolver;
use procura_core::workflow::{ActionRegistry, ReviewServices, ReviewSession};
use procura_db::repositories::SqlDraftStore;
use procura_db::{connect_with_config, migrations, DbPool, LocalProcurementBackend};
use procura_remote::HttpProcurementGateway;
use tracing::debug;

use super::{workflow_failure, CommandFailure};

/// Everything a review command needs: the pool drafts live in and the wired services.
pub struct ReviewContext {
    pub pool: DbPool,
    pub services: ReviewServices,
    pub correlation_id: String,
    pub actor: String,
}

impl ReviewContext {
    pub async fn build(config: &AppConfig, actor: String) -> Result<Self, CommandFailure> {
        let pool = open_pool(config).await?;

        let (gateway, source): (Arc<dyn ProcurementGateway>, Arc<dyn TargetRateSource>) =
            match config.gateway.mode {
                GatewayMode::Local => {
                    let backend = Arc::new(
                        LocalProcurementBackend::new(pool.clone())
                            .with_history_window(config.review.history_window)
                            .with_actor(actor.clone()),
                    );
                    (backend.clone(), backend)
                }
                GatewayMode::Remote => {
                    let remote = Arc::new(
                        HttpProcurementGateway::from_config(&config.gateway)
                            .map_err(|error| ("configuration", error.to_string(), 2u8))?,
                    );
                    (remote.clone(), remote)
                }
            };

        let services = ReviewServices {
            gateway,
            target_rates: Arc::new(TargetRateResolver::new(source)),
            drafts: Arc::new(SqlDraftStore::new(pool.clone())),
            audit: Arc::new(TracingAuditSink),
            actions: ActionRegistry::default(),
            policy: config.review.aggregation_policy(),
        };

        let correlation_id = format!("cli-{}", uuid::Uuid::new_v4());
        debug!(
            event_name = "cli.context.ready",
            correlation_id = %correlation_id,
            gateway_mode = ?config.gateway.mode,
            "review context ready"
        );

        Ok(Self { pool, services, correlation_id, actor })
    }

    pub async fn open(&self, document_id: &str) -> Result<ReviewSession, CommandFailure> {
        ReviewSession::open(
            self.services.clone(),
            &DocumentId(document_id.to_string()),
            self.correlation_id.clone(),
            self.actor.clone(),
        )
        .await
        .map_err(workflow_failure)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Connects and brings the schema up to date.
pub async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}
