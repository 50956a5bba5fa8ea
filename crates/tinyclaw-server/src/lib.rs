//! Thin, read-only admin/dev HTTP surface: an SSE stream of `EventBus`
//! activity and a `/metrics` snapshot. No mutation endpoints — settings and
//! queue state are owned by `tinyclaw-cli`'s dispatch loop, not by this
//! server.
//!
//! Grounded on `clawhive-server`'s `lib.rs` (axum router, CORS + trace
//! layers, one `serve` entry point).

pub mod routes;
pub mod state;

use anyhow::Result;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "tinyclaw-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
