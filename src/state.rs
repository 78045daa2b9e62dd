//! Application state for the sync service

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::PgStore;
use crate::error::BoxError;
use crate::notify::{LogNotifier, Notifier};
use crate::shopify::{FulfillmentClient, ShopifyClient};
use crate::store::{ConnectionStore, OrderStore, SnapshotStore, TaskStore};
use crate::sync::{
    CompletionService, FulfillmentEngine, SyncGuard, TaskProcessor, WebhookIngestor,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub completion: Arc<CompletionService>,
    pub processor: Arc<TaskProcessor>,
    pub ingestor: Arc<WebhookIngestor>,
    pub tasks: Arc<dyn TaskStore>,
    /// Static bearer token for `POST /background-sync`
    pub sync_trigger_token: String,
}

impl AppState {
    /// Connect to Postgres, run migrations, and wire the engine components
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Arc::new(PgStore::new(pool));
        let remote: Arc<dyn FulfillmentClient> = Arc::new(ShopifyClient::new()?);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        Ok(Self::assemble(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            remote,
            notifier,
            config,
        ))
    }

    /// Wire the engine from its collaborator seams. Split out so tests can
    /// inject in-memory stores and a mock remote client.
    pub fn assemble(
        orders: Arc<dyn OrderStore>,
        connections: Arc<dyn ConnectionStore>,
        tasks: Arc<dyn TaskStore>,
        snapshots: Arc<dyn SnapshotStore>,
        remote: Arc<dyn FulfillmentClient>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let guard = SyncGuard::new();
        let engine = Arc::new(FulfillmentEngine::new(
            remote.clone(),
            orders.clone(),
            guard,
        ));

        let completion = Arc::new(CompletionService::new(
            orders.clone(),
            connections.clone(),
            tasks.clone(),
            engine.clone(),
            notifier.clone(),
        ));

        let processor = Arc::new(TaskProcessor::new(
            tasks.clone(),
            orders.clone(),
            connections.clone(),
            remote,
            engine,
            notifier,
            config.processor.clone(),
        ));

        let ingestor = Arc::new(WebhookIngestor::new(connections, snapshots, orders));

        Self {
            completion,
            processor,
            ingestor,
            tasks,
            sync_trigger_token: config.sync_trigger_token.clone(),
        }
    }
}
