//! Fleet Coordinator
//!
//! One supervisor per configured exchange, all sharing a single shutdown
//! signal. Shutdown drains every supervisor and waits for each to close.

use futures_util::future::join_all;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::market::Exchanger;
use crate::models::status::SupervisorStatus;
use crate::services::bootstrap::ExchangerBootstrap;
use crate::services::exchange::ExchangeClient;
use crate::services::recorder::SnapshotSink;
use crate::services::supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorHandle};

/// Live view of every supervisor, shared with the status endpoints
#[derive(Clone, Default)]
pub struct StatusRegistry {
    supervisors: Arc<RwLock<Vec<SupervisorHandle>>>,
}

impl StatusRegistry {
    pub fn register(&self, handle: SupervisorHandle) {
        self.supervisors.write().push(handle);
    }

    pub fn snapshot(&self) -> Vec<SupervisorStatus> {
        self.supervisors
            .read()
            .iter()
            .map(|handle| {
                let stats = handle.stats();
                SupervisorStatus {
                    exchange: handle.name().to_string(),
                    state: handle.state(),
                    reconnects: stats.reconnects,
                    recorded: stats.recorded,
                    dropped: stats.dropped,
                    ignored: stats.ignored,
                }
            })
            .collect()
    }
}

pub struct FleetCoordinator {
    sink: Arc<dyn SnapshotSink>,
    config: SupervisorConfig,
    bootstrap: Option<ExchangerBootstrap>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<SupervisorHandle>,
    registry: StatusRegistry,
}

impl FleetCoordinator {
    pub fn new(sink: Arc<dyn SnapshotSink>, config: SupervisorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            sink,
            config,
            bootstrap: None,
            shutdown_tx,
            handles: Vec::new(),
            registry: StatusRegistry::default(),
        }
    }

    /// Register each client's markets before its first dial
    pub fn with_bootstrap(mut self, bootstrap: ExchangerBootstrap) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn registry(&self) -> StatusRegistry {
        self.registry.clone()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub async fn start<C: ExchangeClient>(&mut self, client: Arc<C>) -> SupervisorHandle {
        if let Some(bootstrap) = &self.bootstrap {
            Self::register_markets(bootstrap, client.as_ref()).await;
        }

        let supervisor = ConnectionSupervisor::new(client, self.sink.clone(), self.config.clone());
        let handle = supervisor.spawn(self.shutdown_tx.subscribe());
        info!(exchange = %handle.name(), "Supervisor started");

        self.registry.register(handle.clone());
        self.handles.push(handle.clone());
        handle
    }

    async fn register_markets<C: ExchangeClient>(bootstrap: &ExchangerBootstrap, client: &C) {
        let markets = match client.markets().await {
            Ok(markets) => markets,
            Err(e) => {
                warn!(exchange = %client.name(), error = %e, "Could not fetch market list");
                return;
            }
        };
        if markets.is_empty() {
            return;
        }

        match bootstrap.register(Exchanger::new(client.name()), markets).await {
            Ok(resolved) => client.adopt_markets(resolved),
            Err(e) => warn!(exchange = %client.name(), error = %e, "Exchanger registration failed"),
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Requests a drain on every supervisor and waits until all are closed
    pub async fn shutdown(self) {
        info!(supervisors = self.handles.len(), "Shutting down fleet");
        self.request_shutdown();
        join_all(self.handles.iter().map(|handle| handle.wait_closed())).await;
        info!("All supervisors closed");
    }

    /// Runs until `interrupt` resolves, then shuts down
    pub async fn run_until<F>(self, interrupt: F)
    where
        F: Future<Output = ()>,
    {
        interrupt.await;
        self.shutdown().await;
    }
}
