//! `depgraph serve` command implementation.
//!
//! Exposes the resolver over HTTP:
//!
//! ```text
//! GET /package/{name}/{version}          -> full dependency tree as JSON
//! GET /package/{scope}/{name}/{version}  -> same, for @scope/name
//! GET /health                            -> "ok"
//! ```

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use depgraph_core::deps::{DepsError, DepsService, Registry, RegistryClient};
use depgraph_core::Config;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Serve action.
#[derive(Debug, Clone)]
pub struct ServeAction {
    pub config: Config,
}

pub async fn run(action: ServeAction) -> Result<()> {
    let config = action.config;
    config.validate().into_diagnostic()?;

    let client = RegistryClient::with_timeout(&config.registry, config.request_timeout())
        .into_diagnostic()?;
    let service = Arc::new(DepsService::new(client, config.resolver_options()));

    let host_ip = if config.host == "localhost" {
        "127.0.0.1"
    } else {
        config.host.as_str()
    };
    let addr: SocketAddr = format!("{host_ip}:{}", config.port)
        .parse()
        .into_diagnostic()?;

    let listener = TcpListener::bind(addr).await.into_diagnostic()?;
    info!(
        registry = %config.registry,
        max_concurrency = config.max_concurrency,
        "Server running on http://{}:{}/",
        config.host,
        config.port
    );

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("Server stopped");
    Ok(())
}

/// Build the HTTP router around a shared service.
pub fn router<R: Registry>(service: Arc<DepsService<R>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/package/:name/:version", get(package::<R>))
        .route("/package/:scope/:name/:version", get(scoped_package::<R>))
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn package<R: Registry>(
    State(service): State<Arc<DepsService<R>>>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    tree_response(&service, &name, &version).await
}

async fn scoped_package<R: Registry>(
    State(service): State<Arc<DepsService<R>>>,
    Path((scope, name, version)): Path<(String, String, String)>,
) -> Response {
    let name = format!("{scope}/{name}");
    tree_response(&service, &name, &version).await
}

async fn tree_response<R: Registry>(
    service: &DepsService<R>,
    name: &str,
    version: &str,
) -> Response {
    let start = Instant::now();
    let result = service.tree_json(name, version).await;

    info!(
        name,
        version,
        ok = result.is_ok(),
        elapsed_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    match result {
        Ok(body) => json_body(body),
        Err(e) => error_response(&e),
    }
}

fn json_body(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn error_response(e: &DepsError) -> Response {
    let status = if e.is_request_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error!(code = e.code(), message = e.message(), "Request failed");

    (
        status,
        Json(serde_json::json!({ "code": e.code(), "message": e.message() })),
    )
        .into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
