//! Wiring of the coordination core.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::auth::RegistrationVerifier;
use crate::config::{HubConfig, StorageBackend};
use crate::correlator::CallbackCorrelator;
use crate::dispatcher::TaskDispatcher;
use crate::error::HubError;
use crate::gateway::{Gateway, MessageRouter};
use crate::registry::ValidatorRegistry;
use crate::routes::{self, StatusState};
use crate::store::{LibsqlStore, MemoryStore, Store, TickReader, seed_targets};

/// One hub instance: shared tables plus the components that act on them
pub struct Hub {
    config: HubConfig,
    registry: Arc<ValidatorRegistry>,
    correlator: Arc<CallbackCorrelator>,
    dispatcher: Arc<TaskDispatcher>,
    router: Arc<MessageRouter>,
    ticks: Arc<dyn TickReader>,
}

impl Hub {
    pub fn new<S: Store + 'static>(config: HubConfig, store: Arc<S>) -> Self {
        let registry = Arc::new(ValidatorRegistry::new());
        let correlator = Arc::new(CallbackCorrelator::new());

        let dispatcher = Arc::new(TaskDispatcher::new(
            store.clone(),
            registry.clone(),
            correlator.clone(),
            config.dispatch.task_ttl(),
        ));

        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            correlator.clone(),
            RegistrationVerifier::new(config.auth.max_clock_skew()),
            store.clone(),
            store.clone(),
        ));

        Self { config, registry, correlator, dispatcher, router, ticks: store }
    }

    pub fn registry(&self) -> Arc<ValidatorRegistry> {
        self.registry.clone()
    }

    pub fn correlator(&self) -> Arc<CallbackCorrelator> {
        self.correlator.clone()
    }

    pub fn dispatcher(&self) -> Arc<TaskDispatcher> {
        self.dispatcher.clone()
    }

    pub fn status_state(&self) -> StatusState {
        StatusState {
            registry: self.registry.clone(),
            correlator: self.correlator.clone(),
            dispatcher: self.dispatcher.clone(),
            ticks: self.ticks.clone(),
        }
    }

    pub async fn bind_gateway(&self, addr: SocketAddr) -> std::io::Result<Gateway> {
        Gateway::bind(addr, self.router.clone()).await
    }

    /// Run until the status server stops or, without one, until ctrl-c.
    pub async fn run(self) -> Result<(), HubError> {
        let gateway = self.bind_gateway(self.config.gateway_addr()?).await?;
        let gateway_task = gateway.spawn();
        let dispatch_task = self.dispatcher.clone().start(self.config.dispatch.interval());
        let sweep_task = self.correlator.clone().start_sweeper(self.config.dispatch.sweep_interval());

        info!(
            "Dispatching every {}s, tasks expire after {}s",
            self.config.dispatch.interval().as_secs(),
            self.config.dispatch.task_ttl().as_secs()
        );

        let result = if self.config.status.enabled {
            let addr = self.config.status_addr()?;
            let state = self.status_state();
            info!("Status server listening on {}", addr);

            HttpServer::new(move || {
                App::new().app_data(web::Data::new(state.clone())).configure(routes::routes)
            })
            .bind(addr)?
            .run()
            .await
        } else {
            tokio::signal::ctrl_c().await
        };

        info!("Shutting down");
        gateway_task.abort();
        dispatch_task.abort();
        sweep_task.abort();

        Ok(result?)
    }
}

/// Open the configured backend, seed targets and run the hub
pub async fn serve(config: HubConfig) -> Result<(), HubError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage; results are lost on exit");
            start(config, Arc::new(MemoryStore::new())).await
        }
        StorageBackend::Libsql => {
            let store = LibsqlStore::open(&config.storage.path).await?;
            info!("Using libsql storage at {}", config.storage.path);
            start(config, Arc::new(store)).await
        }
    }
}

async fn start<S: Store + 'static>(config: HubConfig, store: Arc<S>) -> Result<(), HubError> {
    let seeded = seed_targets(store.as_ref(), &config.targets)
        .await
        .context("Failed to seed targets from config")?;
    if seeded > 0 {
        info!("Seeded {} targets from config", seeded);
    }

    Hub::new(config, store).run().await
}

/// Open the persistent store for one-shot admin commands
pub async fn open_admin_store(config: &HubConfig) -> Result<LibsqlStore, HubError> {
    if config.storage.backend == StorageBackend::Memory {
        return Err(anyhow::anyhow!("target admin commands need the libsql backend").into());
    }

    Ok(LibsqlStore::open(&config.storage.path).await?)
}
