//! Admin HTTP API.
//!
//! Exposes the catalog engine as a small JSON API for the admin dashboard.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version, no auth) |
//! | `GET`  | `/categories` | Categories with a registered schema |
//! | `GET`  | `/categories/{category}/fields` | Field definitions |
//! | `GET`  | `/categories/{category}/analysis` | Quality analysis |
//! | `POST` | `/categories/{category}/standardize?dry_run=bool` | Standardize records |
//! | `POST` | `/categories/{category}/merge?dry_run=bool` | Merge duplicates |
//!
//! # Mutating runs
//!
//! Standardize and merge run on a spawned task that the handler awaits, so a
//! client that disconnects mid-run does not cancel it: the run commits and
//! releases its category lock regardless. Non-dry runs re-analyze the
//! category afterwards and return the fresh [`QualitySummary`] under
//! `summary` next to the run result.
//!
//! # Authorization
//!
//! Every endpoint except `/health` requires an `x-admin-email` header. The
//! injected [`Authorizer`] checks it once per request; handlers pass the
//! resulting [`AdminIdentity`] to the engine.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "busy", "message": "category 'nutrient' is busy: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `unknown_category` (404), `busy` (409), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from a different origin.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use catalog_steward_core::merge::MergeResult;
use catalog_steward_core::quality::QualitySummary;
use catalog_steward_core::schema::{FieldSchema, SCHEMA_VERSION};
use catalog_steward_core::standardize::StandardizationResult;

use crate::auth::{AdminIdentity, AllowlistAuthorizer, AuthError, Authorizer};
use crate::config::Config;
use crate::db;
use crate::engine::{AnalysisResponse, CatalogEngine};
use crate::error::EngineError;
use crate::sqlite_store::SqliteStore;

/// Header carrying the caller's admin email.
pub const ADMIN_HEADER: &str = "x-admin-email";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<CatalogEngine>,
    authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(engine: Arc<CatalogEngine>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { engine, authorizer }
    }
}

/// Starts the admin server on `[server].bind` over the configured SQLite
/// database. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let engine = Arc::new(CatalogEngine::from_config(config, store));
    let authorizer = Arc::new(AllowlistAuthorizer::from_config(&config.auth));

    if config.auth.admin_emails.is_empty() {
        tracing::warn!("auth.admin_emails is empty, every admin request will be rejected");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "admin server listening");
    println!("Admin server listening on http://{}", config.server.bind);

    serve(listener, AppState::new(engine, authorizer)).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// The full router with CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/categories", get(handle_categories))
        .route("/categories/{category}/fields", get(handle_fields))
        .route("/categories/{category}/analysis", get(handle_analysis))
        .route("/categories/{category}/standardize", post(handle_standardize))
        .route("/categories/{category}/merge", post(handle_merge))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"busy"`, `"forbidden"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("missing {} header", ADMIN_HEADER),
            ),
            AuthError::Forbidden(_) => {
                AppError::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::InvalidCategory(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", err.to_string())
            }
            EngineError::UnknownCategory(_) => {
                AppError::new(StatusCode::NOT_FOUND, "unknown_category", err.to_string())
            }
            EngineError::Busy { .. } => {
                AppError::new(StatusCode::CONFLICT, "busy", err.to_string())
            }
            EngineError::Store(_) => {
                error!(error = %err, "engine store failure");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    err.to_string(),
                )
            }
        }
    }
}

// ============ Authorization ============

/// Extractor that authorizes the `x-admin-email` header.
struct Admin(AdminIdentity);

impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let claimed = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok());
        Ok(Admin(state.authorizer.authorize(claimed)?))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    #[serde(default)]
    dry_run: bool,
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /categories ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoriesResponse {
    schema_version: u32,
    categories: Vec<String>,
}

async fn handle_categories(
    State(state): State<AppState>,
    Admin(_): Admin,
) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        schema_version: SCHEMA_VERSION,
        categories: state
            .engine
            .registry()
            .categories()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

// ============ GET /categories/{category}/fields ============

/// Unknown categories return an empty field map, not an error.
async fn handle_fields(
    State(state): State<AppState>,
    Admin(_): Admin,
    Path(category): Path<String>,
) -> Json<FieldSchema> {
    Json(state.engine.field_definitions(&category))
}

// ============ GET /categories/{category}/analysis ============

async fn handle_analysis(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(category): Path<String>,
) -> Result<Json<AnalysisResponse>, AppError> {
    Ok(Json(state.engine.analyze(&admin, &category).await?))
}

// ============ Mutating runs ============

/// Result of a standardize or merge run plus the category summary after it.
#[derive(Serialize)]
struct RunResponse<T> {
    #[serde(flatten)]
    result: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<QualitySummary>,
}

/// Drive `run` on its own task so dropping the request future does not
/// cancel it.
async fn run_detached<T, F>(run: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    match tokio::spawn(run).await {
        Ok(result) => result.map_err(AppError::from),
        Err(e) => {
            error!(error = %e, "mutating run aborted");
            Err(AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                format!("run aborted: {}", e),
            ))
        }
    }
}

async fn refreshed_summary(
    engine: &CatalogEngine,
    admin: &AdminIdentity,
    category: &str,
    dry_run: bool,
) -> Option<QualitySummary> {
    if dry_run {
        return None;
    }
    match engine.analyze(admin, category).await {
        Ok(analysis) => Some(analysis.summary),
        Err(e) => {
            warn!(category = %category, error = %e, "failed to refresh summary after run");
            None
        }
    }
}

// ============ POST /categories/{category}/standardize ============

async fn handle_standardize(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(category): Path<String>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunResponse<StandardizationResult>>, AppError> {
    let engine = state.engine.clone();
    let response = run_detached(async move {
        let result = engine
            .standardize(&admin, &category, params.dry_run)
            .await?;
        let summary = refreshed_summary(&engine, &admin, &category, params.dry_run).await;
        Ok(RunResponse { result, summary })
    })
    .await?;
    Ok(Json(response))
}

// ============ POST /categories/{category}/merge ============

async fn handle_merge(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(category): Path<String>,
    Query(params): Query<RunParams>,
) -> Result<Json<RunResponse<MergeResult>>, AppError> {
    let engine = state.engine.clone();
    let response = run_detached(async move {
        let result = engine
            .merge_duplicates(&admin, &category, params.dry_run)
            .await?;
        let summary = refreshed_summary(&engine, &admin, &category, params.dry_run).await;
        Ok(RunResponse { result, summary })
    })
    .await?;
    Ok(Json(response))
}
