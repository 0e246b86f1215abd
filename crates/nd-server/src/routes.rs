use crate::error::ApiError;
use crate::feed::{list_mentions, FeedQuery};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use nd_core::{FlaggedArticle, Mention, NdError, Window};
use nd_dedup::analysis::{Overview, SourceReport, SpikeReport};
use nd_dedup::ingest::{run_ingest, IncomingMention, IngestReport};
use nd_dedup::pass::{CanonSweepReport, TitleSweepReport};
use nd_dedup::{
    run_canon_sweep, run_cleanup, run_overview, run_source_report, run_spike_report,
    run_title_sweep, CleanupReport, CleanupRequest, Mode,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub const ADMIN_HEADER: &str = "x-admin-key";

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cleanup_recent", get(cleanup_recent).post(cleanup_recent))
        .route("/api/dedupe", post(dedupe))
        .route("/api/dedupe_titles", post(dedupe_titles))
}

pub fn mention_routes() -> Router<AppState> {
    Router::new().route("/api/mentions", get(get_mentions).post(ingest_mentions))
}

pub fn flag_routes() -> Router<AppState> {
    Router::new().route(
        "/api/flagged",
        get(list_flagged).post(flag_article).delete(unflag_article),
    )
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sources", get(source_report))
        .route("/api/overview", get(overview))
        .route("/api/spikes", get(spikes))
}

/// Admin endpoints are open when no key is configured.
fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    query_key: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = state.config.server.admin_key.as_deref() else {
        return Ok(());
    };
    let supplied = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query_key);
    if supplied == Some(expected) {
        Ok(())
    } else {
        Err(NdError::Unauthorized.into())
    }
}

fn is_truthy(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

fn parse_hours(raw: Option<&str>) -> Result<Option<u32>, ApiError> {
    match raw.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => h.parse::<u32>().map(Some).map_err(|_| {
            ApiError::bad_request(format!("hours must be a positive integer, got {h:?}"))
        }),
        None => Ok(None),
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.store.backend(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

// ---- Admin passes ----

#[derive(Debug, Default, Deserialize)]
struct CleanupParams {
    window: Option<String>,
    hours: Option<String>,
    #[serde(rename = "do")]
    action: Option<String>,
    key: Option<String>,
}

async fn cleanup_recent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CleanupParams>,
) -> Result<Json<CleanupReport>, ApiError> {
    require_admin(&state, &headers, params.key.as_deref())?;
    let hours = parse_hours(params.hours.as_deref())?;
    let window = Window::parse(params.window.as_deref(), hours)?;
    let request = CleanupRequest { window, mode: Mode::parse(params.action.as_deref()) };
    let report = run_cleanup(&*state.store, &state.config.dedup, request, Utc::now()).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
struct AdminParams {
    key: Option<String>,
}

async fn dedupe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AdminParams>,
) -> Result<Json<CanonSweepReport>, ApiError> {
    require_admin(&state, &headers, params.key.as_deref())?;
    let report = run_canon_sweep(&*state.store, &state.config.dedup).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
struct TitleSweepParams {
    threshold: Option<String>,
    dry_run: Option<String>,
    key: Option<String>,
}

async fn dedupe_titles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TitleSweepParams>,
) -> Result<Json<TitleSweepReport>, ApiError> {
    require_admin(&state, &headers, params.key.as_deref())?;
    let threshold = match params.threshold.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => Some(t.parse::<f64>().map_err(|_| {
            ApiError::bad_request(format!("threshold must be a number, got {t:?}"))
        })?),
        None => None,
    };
    let dry_run = is_truthy(params.dry_run.as_deref());
    let report = run_title_sweep(&*state.store, &state.config.dedup, threshold, dry_run).await?;
    Ok(Json(report))
}

// ---- Mentions ----

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestBody {
    Batch(Vec<IncomingMention>),
    Wrapped { documents: Vec<IncomingMention> },
}

async fn ingest_mentions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AdminParams>,
    body: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<IngestReport>, ApiError> {
    require_admin(&state, &headers, params.key.as_deref())?;
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let items = match body {
        IngestBody::Batch(items) => items,
        IngestBody::Wrapped { documents } => documents,
    };
    let config = &state.config;
    let report = run_ingest(&*state.store, &config.dedup, &config.ingest, items, Utc::now()).await?;
    Ok(Json(report))
}

async fn get_mentions(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<Mention>>, ApiError> {
    let items = list_mentions(&*state.store, &query, state.config.dedup.scan_limit).await?;
    Ok(Json(items))
}

// ---- Analysis ----

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    window: Option<String>,
    hours: Option<String>,
}

impl WindowParams {
    fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.window) && blank(&self.hours)
    }

    fn window(&self) -> Result<Window, ApiError> {
        let hours = parse_hours(self.hours.as_deref())?;
        Ok(Window::parse(self.window.as_deref(), hours)?)
    }
}

/// Without `window` or `hours` the whole retained set is reported.
async fn source_report(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<SourceReport>, ApiError> {
    let window = if params.is_empty() {
        None
    } else {
        Some(params.window()?)
    };
    let report = run_source_report(&*state.store, &state.config.dedup, window, Utc::now()).await?;
    Ok(Json(report))
}

async fn overview(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Overview>, ApiError> {
    let window = params.window()?;
    let report = run_overview(&*state.store, &state.config.dedup, window, Utc::now()).await?;
    Ok(Json(report))
}

/// Defaults to `today`, like the monitoring dashboard it feeds.
async fn spikes(
    State(state): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Json<SpikeReport>, ApiError> {
    let window = if params.is_empty() {
        Window::Today
    } else {
        params.window()?
    };
    let report = run_spike_report(&*state.store, &state.config.dedup, window, Utc::now()).await?;
    Ok(Json(report))
}

// ---- Flagging ----

#[derive(Debug, Default, Deserialize)]
struct FlagBody {
    article_id: Option<String>,
    title: Option<String>,
    link: Option<String>,
    source: Option<String>,
}

impl FlagBody {
    fn article_id(&self) -> Result<String, ApiError> {
        self.article_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("article_id is required"))
    }
}

fn flag_body(body: Result<Json<FlagBody>, JsonRejection>) -> Result<FlagBody, ApiError> {
    body.map(|Json(b)| b).map_err(|e| ApiError::bad_request(e.body_text()))
}

async fn list_flagged(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let articles = state.store.flagged().await?;
    Ok(Json(json!({
        "ok": true,
        "flagged_count": articles.len(),
        "articles": articles,
    })))
}

async fn flag_article(
    State(state): State<AppState>,
    body: Result<Json<FlagBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = flag_body(body)?;
    let article_id = body.article_id()?;
    let article = FlaggedArticle::new(article_id.clone(), body.title, body.link, body.source);
    state.store.flag(&article).await?;
    info!(article_id = %article_id, "article flagged");
    Ok(Json(json!({
        "ok": true,
        "message": "Article flagged",
        "article_id": article_id,
    })))
}

async fn unflag_article(
    State(state): State<AppState>,
    body: Result<Json<FlagBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = flag_body(body)?;
    let article_id = body.article_id()?;
    if state.store.unflag(&article_id).await? {
        info!(article_id = %article_id, "article unflagged");
        Ok(Json(json!({
            "ok": true,
            "message": "Article unflagged",
            "article_id": article_id,
        })))
    } else {
        Ok(Json(json!({
            "ok": true,
            "message": "Article was not flagged",
            "article_id": article_id,
            "already_unflagged": true,
        })))
    }
}
