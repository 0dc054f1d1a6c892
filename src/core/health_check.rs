use crate::configuration::Context;
use crate::core::service_manager::{Error as ServiceManagerError, Service};
use crate::database::EventStore;
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub struct HealthService {
    port: u16,
    store: Arc<dyn EventStore>,
}

#[async_trait]
impl Service for HealthService {
    type Context = Context;
    const NAME: &'static str = "health";

    async fn new(context: Context) -> Self {
        Self {
            port: context.config.health_port,
            store: context.store,
        }
    }

    async fn run(self) -> Result<(), ServiceManagerError> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .map_err(|e| ServiceManagerError::new(&format!("Failed to bind port: {}", e)))?;
        info!("Health check server running on port {}", self.port);

        axum::serve(listener, router(self.store))
            .await
            .map_err(ServiceManagerError::from)
    }
}

fn router(store: Arc<dyn EventStore>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn readiness_check(State(store): State<Arc<dyn EventStore>>) -> (StatusCode, &'static str) {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "persistence unavailable")
        }
    }
}
