//! TRON Copilot - Entry Point
//!
//! Thin HTTP wiring: a streamed /chat endpoint for the frontend and a
//! /health probe. Everything interesting lives in the library.

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tron_copilot::{Agent, ChatRequest, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let port = config.listen_port;
    info!(
        "TRON Copilot v{} starting (network={}, model={})",
        env!("CARGO_PKG_VERSION"),
        config.default_network.as_str(),
        config.ai_model
    );

    let agent = Arc::new(Agent::from_config(config)?);

    let app = Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(agent);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Streamed chat endpoint.
async fn chat(State(agent): State<Arc<Agent>>, Json(request): Json<ChatRequest>) -> Response {
    let rx = agent.handle_message(request);
    let stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);

    Response::builder()
        .header("content-type", "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| "stream setup failed".into_response())
}

/// Health probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
