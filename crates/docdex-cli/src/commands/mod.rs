//! Command implementations.

pub mod index;
pub mod jobs;
pub mod list;
pub mod remove;
pub mod search;

use anyhow::{Context as _, Result};
use docdex_core::embedder::{create_provider, Embedder};
use docdex_core::jobs::remote::RemoteClient;
use docdex_core::jobs::{EventBus, JobDispatch, PipelineManager};
use docdex_core::{Config, Store};
use std::sync::Arc;

/// Shared command context: config plus lazily built core components.
pub struct AppContext {
    /// Resolved core configuration.
    pub config: Config,
    /// Remote server base URL, when job commands should delegate.
    pub server: Option<String>,
}

impl AppContext {
    /// Creates the context.
    pub fn new(config: Config, server: Option<String>) -> Result<Self> {
        Ok(Self { config, server })
    }

    /// Opens the store at the configured location.
    pub fn open_store(&self) -> Result<Arc<Store>> {
        let embedder = Embedder::new(
            create_provider(&self.config.embedding).context("embedding provider setup failed")?,
        );
        let path = self
            .config
            .database_path()
            .context("could not resolve the data directory")?;
        Ok(Arc::new(
            Store::open(&path, embedder).context("could not open the document store")?,
        ))
    }

    /// Builds the job dispatcher: a remote client when `--server` is set,
    /// otherwise an embedded manager over the local store.
    pub async fn dispatcher(&self) -> Result<(Box<dyn JobDispatch>, EventBus)> {
        if let Some(server) = &self.server {
            let events = EventBus::new();
            let (client, proxy) = RemoteClient::connect(server.clone(), events.clone())
                .context("could not connect to the docdex server")?;
            // The proxy task lives as long as the process; leak the handle.
            std::mem::forget(proxy);
            return Ok((Box::new(client), events));
        }

        let store = self.open_store()?;
        let events = EventBus::new();
        let manager = PipelineManager::new(store, events.clone(), &self.config)
            .context("could not start the pipeline manager")?;
        if self.config.recover_jobs {
            manager.recover(true).await?;
        }
        Ok((Box::new(manager), events))
    }
}
