//! HTTP API over the runtime.
//!
//! Exposes package ingestion and the learner-facing runtime verbs as JSON
//! endpoints. All routes live under `/api`.
//!
//! # Endpoints
//!
//! - `GET /api/packages` - List registered packages
//! - `PUT /api/packages/:package_id` - Ingest a manifest (raw XML body)
//! - `GET /api/packages/:package_id` - Package summary and validation report
//! - `GET /api/packages/:package_id/learners/:learner_id/launchable` - Launchable SCOs
//! - `GET /api/packages/:package_id/learners/:learner_id/next?current=` - Next SCO
//! - `GET /api/packages/:package_id/learners/:learner_id/previous?current=` - Previous SCO
//! - `POST /api/packages/:package_id/learners/:learner_id/scos/:sco_id/session` - Start a session
//! - `POST /api/packages/:package_id/learners/:learner_id/scos/:sco_id/commit` - Report progress
//! - `GET /api/packages/:package_id/learners/:learner_id/attempts` - Attempt records
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scorm_engine::api::{create_router, AppState};
//! use scorm_engine::config::Config;
//! use scorm_engine::runtime::RuntimeService;
//! use scorm_engine::store::MemoryAttemptStore;
//!
//! # async fn example() {
//! let config = Config::default();
//! let runtime = RuntimeService::new(&config, Arc::new(MemoryAttemptStore::new()));
//! let router = create_router(AppState::new(config, runtime));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        DefaultBodyLimit, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::attempt::{CommitOutcome, CompletionReport, LearnerAttempts, SessionStart};
use crate::config::Config;
use crate::error::ScormError;
use crate::ingest::{ingest_with, IngestedPackage};
use crate::manifest::SchemaVersion;
use crate::parser::ParseOptions;
use crate::runtime::RuntimeService;
use crate::sequencing::NavigationOutcome;
use crate::tree::OutlineNode;
use crate::validator::ValidationReport;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Summary of a registered package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    /// Identifier the package is registered under.
    pub package_id: String,
    /// Identifier declared by the manifest.
    pub manifest_identifier: String,
    /// SCORM edition of the manifest.
    pub schema_version: SchemaVersion,
    /// Title of the delivered organization.
    pub title: String,
    /// Whether the package can be delivered.
    pub active: bool,
    /// Number of launchable SCOs.
    pub launchable_count: usize,
    /// Outline of the delivered organization.
    pub outline: Vec<OutlineNode>,
    /// Validation outcome.
    pub validation: ValidationReport,
}

impl PackageSummary {
    fn new(package_id: &str, package: &IngestedPackage) -> Self {
        let structure = &package.structure;
        let title = structure
            .manifest
            .organization(&structure.organization_id)
            .map(|org| org.title.clone())
            .unwrap_or_default();
        Self {
            package_id: package_id.to_string(),
            manifest_identifier: structure.manifest.identifier.clone(),
            schema_version: structure.manifest.schema_version,
            title,
            active: package.is_active(),
            launchable_count: structure.launchable_count(),
            outline: structure.outline.clone(),
            validation: package.validation.clone(),
        }
    }
}

/// Response body for the package listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageListResponse {
    /// Registered package identifiers, sorted.
    pub package_ids: Vec<String>,
}

/// Response body for the launchable endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchableResponse {
    /// Launchable SCO identifiers, sorted.
    pub scos: Vec<String>,
}

/// Response body for the previous endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousResponse {
    /// The previous SCO, if any.
    pub target: Option<String>,
}

/// Query string of the navigation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationQuery {
    /// The SCO the learner is on.
    pub current: String,
}

/// Request body for the commit endpoint.
///
/// Either raw CMI element values, translated with the package's schema, or
/// an already typed completion report. A body matching neither shape is
/// rejected; the report shape denies unknown fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CommitRequest {
    /// Raw data model values keyed by element name.
    Cmi {
        /// Element values.
        cmi: BTreeMap<String, CmiValue>,
    },
    /// A typed report.
    Report(CompletionReport),
}

/// A single CMI value as sent by a content frame.
///
/// `SetValue` takes strings, but frames commonly post scores as JSON
/// numbers. Both are accepted and handed to the data model as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CmiValue {
    /// A string value.
    Text(String),
    /// A numeric value.
    Number(serde_json::Number),
    /// A boolean value.
    Flag(bool),
}

impl CmiValue {
    /// The value as the data model sees it.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
            Self::Flag(flag) => flag.to_string(),
        }
    }
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// The runtime serving learners.
    pub runtime: Arc<RuntimeService>,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(config: Config, runtime: RuntimeService) -> Self {
        Self {
            config,
            runtime: Arc::new(runtime),
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request body is not a usable manifest.
    BadManifest(String),
    /// The request body exceeds the manifest limit.
    TooLarge(String),
    /// Failure from the runtime.
    Runtime(ScormError),
}

impl From<ScormError> for ApiError {
    fn from(err: ScormError) -> Self {
        Self::Runtime(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadManifest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::TooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::Runtime(err) => {
                let status = match &err {
                    ScormError::Attempt(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    ScormError::UnknownPackage { .. } | ScormError::UnknownSco { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    ScormError::PackageInactive { .. } => StatusCode::CONFLICT,
                    ScormError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    let manifest_limit = usize::try_from(state.config.max_manifest_bytes).unwrap_or(usize::MAX);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let learner_routes = Router::new()
        .route("/launchable", get(handle_launchable))
        .route("/next", get(handle_next))
        .route("/previous", get(handle_previous))
        .route("/attempts", get(handle_attempts))
        .route("/scos/:sco_id/session", post(handle_session))
        .route("/scos/:sco_id/commit", post(handle_commit));

    let api_routes = Router::new()
        .route("/packages", get(handle_list_packages))
        .route(
            "/packages/:package_id",
            get(handle_package)
                .put(handle_ingest)
                .layer(DefaultBodyLimit::max(manifest_limit)),
        )
        .nest("/packages/:package_id/learners/:learner_id", learner_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_list_packages(State(state): State<Arc<AppState>>) -> Json<PackageListResponse> {
    Json(PackageListResponse {
        package_ids: state.runtime.package_ids().await,
    })
}

async fn handle_package(
    State(state): State<Arc<AppState>>,
    Path(package_id): Path<String>,
) -> Result<Json<PackageSummary>, ApiError> {
    let package = state.runtime.package(&package_id).await?;
    Ok(Json(PackageSummary::new(&package_id, &package)))
}

/// Handler for `PUT /api/packages/:package_id`.
///
/// Rejected manifests are not registered. Manifests that parse but fail
/// validation are registered as inactive.
async fn handle_ingest(
    State(state): State<Arc<AppState>>,
    Path(package_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<PackageSummary>), ApiError> {
    let limit = state.config.max_manifest_bytes;
    let body = body.map_err(|rejection| match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            warn!(package = %package_id, limit, "Manifest rejected: too large");
            ApiError::TooLarge(format!("Manifest exceeds the limit of {limit} bytes"))
        }
        other => ApiError::BadManifest(other.body_text()),
    })?;

    let options = ParseOptions {
        schema: state.config.schema_detection,
    };
    let package = ingest_with(&body, options).map_err(|e| {
        warn!(package = %package_id, error = %e, "Manifest rejected");
        match e {
            ScormError::Parse(_) | ScormError::Resolve(_) => ApiError::BadManifest(e.to_string()),
            other => ApiError::Runtime(other),
        }
    })?;

    let package = state.runtime.register_package(&package_id, package).await;
    let status = if package.is_active() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(PackageSummary::new(&package_id, &package))))
}

async fn handle_launchable(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id)): Path<(String, String)>,
) -> Result<Json<LaunchableResponse>, ApiError> {
    let scos = state
        .runtime
        .launchable_scos(&learner_id, &package_id)
        .await?;
    Ok(Json(LaunchableResponse {
        scos: scos.into_iter().collect(),
    }))
}

async fn handle_next(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id)): Path<(String, String)>,
    Query(query): Query<NavigationQuery>,
) -> Result<Json<NavigationOutcome>, ApiError> {
    let outcome = state
        .runtime
        .next_outcome(&learner_id, &package_id, &query.current)
        .await?;
    Ok(Json(outcome))
}

async fn handle_previous(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id)): Path<(String, String)>,
    Query(query): Query<NavigationQuery>,
) -> Result<Json<PreviousResponse>, ApiError> {
    let target = state
        .runtime
        .previous(&learner_id, &package_id, &query.current)
        .await?;
    Ok(Json(PreviousResponse { target }))
}

async fn handle_session(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id, sco_id)): Path<(String, String, String)>,
) -> Result<Json<SessionStart>, ApiError> {
    let start = state
        .runtime
        .start_session(&learner_id, &package_id, &sco_id)
        .await?;
    Ok(Json(start))
}

/// Handler for `POST .../scos/:sco_id/commit`.
async fn handle_commit(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id, sco_id)): Path<(String, String, String)>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<CommitOutcome>, ApiError> {
    let outcome = match request {
        CommitRequest::Cmi { cmi } => {
            info!(sco = %sco_id, elements = cmi.len(), "Received CMI commit");
            let cmi: BTreeMap<String, String> = cmi
                .into_iter()
                .map(|(element, value)| (element, value.into_text()))
                .collect();
            state
                .runtime
                .commit_cmi(&learner_id, &package_id, &sco_id, &cmi)
                .await?
        }
        CommitRequest::Report(report) => {
            state
                .runtime
                .report_completion(&learner_id, &package_id, &sco_id, &report)
                .await?
        }
    };
    Ok(Json(outcome))
}

async fn handle_attempts(
    State(state): State<Arc<AppState>>,
    Path((package_id, learner_id)): Path<(String, String)>,
) -> Result<Json<LearnerAttempts>, ApiError> {
    Ok(Json(state.runtime.attempts(&learner_id, &package_id).await?))
}
