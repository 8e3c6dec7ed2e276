use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analytics::AnalyticsSummary;
use crate::audit::{AuditStorage, AuditStore, JsonFileStorage, DEFAULT_MAX_ENTRIES};
use crate::classify::{build_classifier, DynClassifier};
use crate::config::{Settings, SettingsProvider, SharedSettings};
use crate::error::FilterError;
use crate::message::{dispatch, Request, Response};
use crate::search::AuditSummary;
use crate::service::{AuditQuery, FilterService, PostMeta};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FilterService>,
    pub settings: Arc<SharedSettings>,
}

impl AppState {
    pub fn new(service: Arc<FilterService>, settings: Arc<SharedSettings>) -> Self {
        Self { service, settings }
    }

    /// Wire the service from settings file, `AUDIT_LOG_PATH` and `AI_TEST_MODE`.
    pub async fn from_env() -> anyhow::Result<Self> {
        let settings = Arc::new(SharedSettings::new(
            Settings::load_default().context("loading settings")?,
        ));
        let storage: Arc<dyn AuditStorage> = Arc::new(JsonFileStorage::from_env());
        let store = AuditStore::load(storage, DEFAULT_MAX_ENTRIES)
            .await
            .context("loading audit log")?;
        info!(entries = store.len(), "audit log ready");
        let classifier: DynClassifier = build_classifier();
        let service = FilterService::new(Arc::new(store), settings.clone(), classifier);
        Ok(Self::new(Arc::new(service), settings))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/message", post(message))
        .route("/analyze", post(analyze))
        .route("/audit", get(audit_log).delete(clear_audit_log))
        .route("/audit/summary", get(audit_summary))
        .route("/analytics", get(poster_analytics))
        .route("/analytics/summary", get(analytics_summary))
        .route("/prompt/default", get(default_prompt))
        .route("/settings", get(get_settings).put(put_settings))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn status_for(e: &FilterError) -> StatusCode {
    match e {
        FilterError::Config(_) => StatusCode::BAD_REQUEST,
        FilterError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FilterError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(e: FilterError) -> (StatusCode, Json<Response>) {
    (status_for(&e), Json(e.into()))
}

/// Transport-neutral entry point; failures travel in the envelope.
async fn message(State(state): State<AppState>, Json(req): Json<Request>) -> Json<Response> {
    Json(dispatch(&state.service, req).await)
}

#[derive(serde::Deserialize)]
struct AnalyzeReq {
    content: String,
    #[serde(default)]
    metadata: PostMeta,
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> (StatusCode, Json<Response>) {
    match state.service.analyze(&body.content, &body.metadata).await {
        Ok(v) => (StatusCode::OK, Json(Response::Verdict(v))),
        Err(e) => failure(e),
    }
}

async fn audit_log(State(state): State<AppState>, Query(q): Query<AuditQuery>) -> Json<Response> {
    Json(Response::AuditLog(state.service.audit_log(&q).await))
}

async fn audit_summary(
    State(state): State<AppState>,
    Query(q): Query<AuditQuery>,
) -> Json<AuditSummary> {
    Json(state.service.audit_summary(&q).await)
}

async fn clear_audit_log(State(state): State<AppState>) -> (StatusCode, Json<Response>) {
    match state.service.clear_audit_log().await {
        Ok(()) => (StatusCode::OK, Json(Response::Cleared)),
        Err(e) => failure(e),
    }
}

async fn poster_analytics(State(state): State<AppState>) -> Json<Response> {
    Json(Response::Analytics(state.service.poster_analytics().await))
}

async fn analytics_summary(State(state): State<AppState>) -> Json<AnalyticsSummary> {
    Json(state.service.poster_analytics().await.summary())
}

async fn default_prompt(State(state): State<AppState>) -> Json<Response> {
    Json(Response::DefaultPrompt(state.service.default_prompt()))
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.current().redacted())
}

async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Json<Settings> {
    let redacted = settings.redacted();
    info!(
        provider = %settings.api_provider,
        enabled = settings.enabled,
        key_len = settings.api_key.len(),
        "settings replaced"
    );
    state.settings.replace(settings);
    Json(redacted)
}
