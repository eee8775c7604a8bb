//! Server assembly
//!
//! Wires the store, ledger, routing engine, dispatcher, and middleware
//! into one axum router, and owns the two background loops.

mod auth;
mod cors;
mod health;

use std::time::Duration;

use crossbar_config::GatewayConfig;
use crossbar_llm::{Dispatcher, GatewayState, HealthMonitor, RetentionSweeper, llm_router};
use crossbar_llm::adapter::Adapters;
use crossbar_routing::{ClassifierClient, Router};
use crossbar_store::{BudgetLedger, Store};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: axum::Router,
    store: Store,
    port: u16,
    probe_interval: Duration,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error when the registry database cannot be opened.
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let store = Store::open(&config.db_path).await?;
        let ledger = BudgetLedger::new(store.clone());

        let classifier =
            ClassifierClient::new(config.classifier_url.clone(), config.classifier_model.clone());
        let router = Router::new(store.clone(), ledger.clone(), classifier);
        let dispatcher = Dispatcher::new(
            store.clone(),
            Adapters::new(config.anthropic_version.clone()),
        );

        let state = GatewayState::new(store.clone(), ledger, router, dispatcher);

        let health_router = axum::Router::new()
            .route("/health", axum::routing::get(health::health_handler))
            .with_state(state.clone());

        let mut app = llm_router(state).merge(health_router);

        app = app.layer(TraceLayer::new_for_http());

        // Bearer auth is active only when a gateway key is configured;
        // the liveness endpoint stays reachable either way
        if let Some(api_key) = config.api_key.clone() {
            app = app.layer(axum::middleware::from_fn(move |req, next| {
                let api_key = api_key.clone();
                async move { auth::auth_middleware(&api_key, req, next).await }
            }));
        }

        app = app.layer(axum::middleware::from_fn(cors::cors_middleware));

        Ok(Self {
            router: app,
            store,
            port: config.port,
            probe_interval: Duration::from_millis(config.probe_interval_ms),
        })
    }

    /// The assembled router, for embedding in tests
    pub fn into_router(self) -> axum::Router {
        self.router
    }

    /// Spawn the health-probe and retention loops
    pub fn spawn_background(&self, shutdown: &CancellationToken) {
        let monitor = HealthMonitor::new(self.store.clone(), self.probe_interval);
        tokio::spawn(monitor.run(shutdown.clone()));

        let sweeper = RetentionSweeper::new(self.store.clone());
        tokio::spawn(sweeper.run(shutdown.clone()));
    }

    /// Bind the configured port and serve until the token cancels
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot bind or serving fails.
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.spawn_background(&shutdown);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(port = self.port, "crossbar listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        Ok(())
    }
}
