//! Wiring of configuration into live components.

use anyhow::Result;
use std::sync::Arc;

use crate::agent::{AgentSettings, RfpAgent};
use crate::config::Config;
use crate::embedding::create_provider;
use crate::ingest::Ingestor;
use crate::llm::ModelClient;
use crate::retriever::Retriever;
use crate::retry::BackoffPolicy;
use crate::sqlite_store::SqliteStore;
use crate::trace::create_tracer;

/// Everything a command needs: config, store, answering agent, ingestor.
pub struct App {
    pub config: Config,
    pub store: SqliteStore,
    pub agent: RfpAgent,
    pub ingestor: Ingestor,
}

impl App {
    /// Connect to the database, run migrations, and build providers.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = crate::db::connect(&config).await?;
        crate::migrate::run_migrations(&pool).await?;
        let store = SqliteStore::new(pool);

        let embedder = create_provider(&config.embedding)?;
        let search_backoff = BackoffPolicy::new(
            config.retry.search_max_attempts,
            config.retry.search_base_delay(),
        );
        let retriever = Retriever::new(
            embedder.clone(),
            Arc::new(store.clone()),
            search_backoff,
        );
        let model = ModelClient::from_config(&config)?;
        let settings = AgentSettings {
            breadth_seed: config.agent.breadth_seed,
            step_limit: config.agent.step_limit,
        };
        let agent = RfpAgent::new(Arc::new(store.clone()), retriever, model, settings)
            .with_tracer(create_tracer(&config.trace)?);
        let ingestor = Ingestor::from_config(store.clone(), embedder, &config);

        Ok(Self {
            config,
            store,
            agent,
            ingestor,
        })
    }

    pub async fn close(self) {
        self.store.pool().close().await;
    }
}
