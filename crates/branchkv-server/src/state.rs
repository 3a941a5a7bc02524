//! Application state

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::invoker::HttpActionInvoker;
use branchkv_client::HttpTransport;
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Coordinator owning the local shard
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Create the state with the HTTP peer transport and action invoker
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.client_config())?);
        let invoker = Arc::new(HttpActionInvoker::from_config(&config)?);
        let coordinator = Arc::new(Coordinator::new(&config, transport, invoker));

        info!(
            address = %config.self_address,
            initial = %config.initial_server(),
            peers = config.peers().len(),
            threshold = config.threshold,
            "coordinator ready"
        );
        if config.action_host.is_none() {
            info!("no action host configured, conflicts stay unresolved");
        }

        Ok(Self::with_coordinator(config, coordinator))
    }

    /// Wrap an existing coordinator
    pub fn with_coordinator(config: ServerConfig, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }
}
