//! Health Check Server - Liveness and Readiness Endpoints
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness asks the
//! chain client and the ledger store on every request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::chain_client::ChainClient;
use crate::ports::store::LedgerStore;

/// Collaborators checked by the readiness endpoint.
#[derive(Clone)]
pub struct HealthState {
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<dyn LedgerStore>,
}

impl HealthState {
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<dyn LedgerStore>) -> Self {
        Self { chain, store }
    }

    /// Ready when the node answers and the store is writable.
    pub async fn is_ready(&self) -> bool {
        let (chain_ok, store_ok) = tokio::join!(self.chain.is_healthy(), self.store.is_healthy());
        if !chain_ok || !store_ok {
            warn!(chain = chain_ok, store = store_ok, "Readiness check failing");
        }
        chain_ok && store_ok
    }
}

pub struct HealthServer {
    state: HealthState,
    port: u16,
}

impl HealthServer {
    pub fn new(state: HealthState, port: u16) -> Self {
        Self { state, port }
    }

    fn router(state: HealthState) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(state)
    }

    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(self.state);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness check: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        if state.is_ready().await {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}
