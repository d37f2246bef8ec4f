//! HTTP surface: a thin router in front of the core.
//!
//! This module handles:
//! - Serving the static page at `/`
//! - Chat requests (merge defaults, resolve endpoint, pre-check, complete)
//! - Reading and updating the stored defaults
//! - The standalone connectivity diagnostic

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{Html, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use super::helpers::{diagnostic_error, err_response, ok_json, relay_error_response};
use super::parsing::{build_completion_request, parse_test_request};
use crate::ai::{CompletionInvoker, ConnectivityProbe, EndpointResolver};
use crate::core::config::{AppConfig, ConfigStore, ConfigUpdate, MaskedConfig};
use crate::core::models::{ChatAnswer, ChatRequest, CompletionRequest, TestApiRequest};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Everything a handler needs, shared across requests.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ConfigStore,
    pub resolver: EndpointResolver,
    pub probe: ConnectivityProbe,
    pub invoker: Arc<CompletionInvoker>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ConfigStore, http: Client) -> Self {
        let resolver = EndpointResolver::new(http.clone());
        Self {
            config,
            probe: ConnectivityProbe::new(http.clone(), resolver.clone()),
            resolver,
            invoker: Arc::new(CompletionInvoker::new(http)),
        }
    }

    #[must_use]
    pub fn with_invoker(mut self, invoker: CompletionInvoker) -> Self {
        self.invoker = Arc::new(invoker);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/save_config", post(save_config))
        .route("/get_config", get(get_config))
        .route("/test_api", post(test_api))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Binds the configured address and serves until the process stops.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the address
/// cannot be bound.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let http = Client::builder().build()?;
    let store = ConfigStore::new(config.stored_defaults());
    let app = router(AppState::new(store, http));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        base_url = %config.openai_api_base,
        model = %config.default_model,
        "Relay server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    info!("Serving index page");
    Html(INDEX_HTML)
}

#[tracing::instrument(level = "info", skip_all)]
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let response = handle_chat(&state, payload).await;
    info!(
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        status = response.status().as_u16(),
        "Chat request finished"
    );
    response
}

async fn handle_chat(
    state: &AppState,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected chat body: {}", e);
            return err_response(400, &format!("Invalid request body: {e}"));
        }
    };

    let defaults = state.config.snapshot().await;
    let merged = match build_completion_request(body, &defaults) {
        Ok(request) => request,
        Err(e) => {
            warn!("Chat request rejected: {}", e);
            return relay_error_response(&e);
        }
    };
    info!(base_url = %merged.base_url, model = %merged.model, "Chat request accepted");

    let resolved = state.resolver.resolve(&merged.base_url).await;
    info!(base_url = %resolved, "Using API root");
    let request = CompletionRequest {
        base_url: resolved,
        ..merged
    };

    if let Err(e) = state.probe.precheck(&request.base_url, &request.api_key).await {
        error!("Connectivity pre-check failed: {}", e);
        return relay_error_response(&e);
    }

    match state.invoker.complete(&request).await {
        Ok(answer) => ok_json(ChatAnswer { answer }),
        Err(e) => {
            error!("Chat completion failed: {}", e);
            relay_error_response(&e)
        }
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn save_config(
    State(state): State<AppState>,
    payload: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match payload {
        Ok(update) => update,
        Err(e) => {
            error!("Rejected configuration body: {}", e);
            return err_response(400, &format!("Invalid request body: {e}"));
        }
    };

    let masked = MaskedConfig::from(&state.config.update(update).await);
    info!(config = ?masked, "Configuration saved");
    ok_json(json!({ "message": "Configuration updated", "config": masked }))
}

#[tracing::instrument(level = "info", skip_all)]
async fn get_config(State(state): State<AppState>) -> Response {
    ok_json(json!({ "config": state.config.masked().await }))
}

#[tracing::instrument(level = "info", skip_all)]
async fn test_api(
    State(state): State<AppState>,
    payload: Result<Json<TestApiRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(e) => return diagnostic_error(400, &format!("Invalid request body: {e}")),
    };

    let (base_url, api_key) = match parse_test_request(body) {
        Ok(parsed) => parsed,
        Err(e) => return diagnostic_error(e.status_code(), &e.to_string()),
    };

    info!(base_url = %base_url, "Testing API connection");
    ok_json(state.probe.diagnose(&base_url, &api_key).await)
}
