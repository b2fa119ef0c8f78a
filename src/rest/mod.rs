// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local only by default. The browser frontend posts
// submissions here and renders the EvaluationResult JSON directly.
//
// Endpoints:
//   POST /api/v1/eval          in-process DOM evaluation
//   POST /api/v1/eval/remote   remote sandbox evaluation
//   GET  /api/v1/health

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!(
        "{}:{}",
        ctx.config.server.bind_address, ctx.config.server.port
    );
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/eval", post(routes::eval::eval))
        .route("/api/v1/eval/remote", post(routes::eval::eval_remote))
        // The frontend dev server runs on a different origin.
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
