//! Local status API.
//!
//! Read-only view of the reconciliation loop for operators and monitors:
//! - Managed rooms and their session state
//! - Recordings whose stop request failed (orphaned remote jobs)

use anyhow::Result;
use axum::extract::State;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

use crate::reconcile::status::StatusHandle;

pub struct ApiServer {
    port: u16,
    status: StatusHandle,
}

impl ApiServer {
    pub fn new(port: u16, status: StatusHandle) -> Self {
        Self { port, status }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .route("/rooms", get(rooms))
            .route("/orphans", get(orphans))
            .with_state(self.status)
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("Status API listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /         - Service info");
        info!("  GET  /version  - Version info");
        info!("  GET  /rooms    - Managed rooms as of the last tick");
        info!("  GET  /orphans  - Recordings whose stop request failed");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info(State(status): State<StatusHandle>) -> Json<Value> {
    let snapshot = status.snapshot().await;
    Json(json!({
        "service": "roomwarden",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "tick": snapshot.tick,
        "rooms": snapshot.rooms.len(),
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "roomwarden"
    }))
}

async fn rooms(State(status): State<StatusHandle>) -> Json<Value> {
    let snapshot = status.snapshot().await;
    Json(json!({ "tick": snapshot.tick, "rooms": snapshot.rooms }))
}

async fn orphans(State(status): State<StatusHandle>) -> Json<Value> {
    let snapshot = status.snapshot().await;
    Json(json!({ "orphaned": snapshot.orphaned }))
}
