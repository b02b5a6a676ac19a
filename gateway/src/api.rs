use crate::config::{GatewayConfig, Listener};
use crate::manage::{ManageError, ManageRequest, edit_packages, edit_repo_mappings};
use crate::metrics_defs::MANAGE_REJECTED;
use crate::serving::{Resolution, ServingGateway};
use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use shared::counter;
use std::sync::Arc;
use store::{ConfigRegistry, SeedOutcome};
use tokio::net::TcpListener;

const NOT_POPULATED_NOTE: &str = "Data might not be populated yet by the scheduled function";

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Manage(#[from] ManageError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to initialize repository mappings")]
    InitFailed,
}

#[derive(Clone)]
pub struct AppState {
    serving: ServingGateway,
    registry: ConfigRegistry,
    config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(registry: ConfigRegistry, config: GatewayConfig) -> Self {
        let serving = ServingGateway::new(registry.storage().clone(), config.merge_github_inline);
        AppState {
            serving,
            registry,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/package-data",
            get(package_data)
                .options(|| preflight("GET, OPTIONS"))
                .fallback(method_not_allowed),
        )
        .route(
            "/manage/packages",
            get(list_packages)
                .post(manage_packages)
                .options(|| preflight("GET, POST, OPTIONS"))
                .fallback(method_not_allowed),
        )
        .route(
            "/manage/repo-mappings",
            get(list_repo_mappings)
                .post(manage_repo_mappings)
                .options(|| preflight("GET, POST, OPTIONS"))
                .fallback(method_not_allowed),
        )
        .route(
            "/init-mappings",
            post(init_mappings)
                .options(|| preflight("POST, OPTIONS"))
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(middleware::map_response(with_cors))
        .with_state(state)
}

pub async fn serve(listener: Listener, app: Router) -> Result<(), ServeError> {
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = ?listener.local_addr()?, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

enum Cache {
    MaxAge(u64),
    NoCache,
}

fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    cache: Cache,
) -> Result<Response, GatewayError> {
    let body = serde_json::to_vec(body)?;
    let cache = match cache {
        Cache::MaxAge(secs) => format!("public, max-age={secs}"),
        Cache::NoCache => "no-cache".to_string(),
    };

    Ok((
        status,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CACHE_CONTROL, cache),
        ],
        body,
    )
        .into_response())
}

fn error_body(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// First non-empty `package` value. Repeated or unrelated parameters never
/// reject the request.
fn package_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(name, value)| name == "package" && !value.is_empty())
        .map(|(_, value)| value.as_str())
}

async fn package_data(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, GatewayError> {
    let package = package_param(&params);

    match state.serving.resolve(package).await {
        Resolution::Found(view) => json_response(
            StatusCode::OK,
            &view,
            Cache::MaxAge(state.config.data_max_age_secs),
        ),
        Resolution::NotFound {
            package: Some(_),
            access_method,
            ..
        } => json_response(
            StatusCode::NOT_FOUND,
            &json!({
                "error": "Package not found",
                "note": NOT_POPULATED_NOTE,
                "accessMethod": access_method,
            }),
            Cache::NoCache,
        ),
        Resolution::NotFound {
            package: None,
            environment,
            access_method,
        } => json_response(
            StatusCode::OK,
            &json!({
                "data": {},
                "error": "No data available",
                "note": NOT_POPULATED_NOTE,
                "environment": environment,
                "accessMethod": access_method,
            }),
            Cache::NoCache,
        ),
    }
}

async fn list_packages(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let packages = state.registry.package_list().await;
    json_response(
        StatusCode::OK,
        &json!({ "packages": packages }),
        Cache::MaxAge(state.config.list_max_age_secs),
    )
}

async fn manage_packages(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = ManageRequest::parse(&body)?;
    let current = state.registry.package_list().await;
    let (action, updated) = edit_packages(&current, request)?;

    if !state.registry.update_package_list(&updated).await {
        return Err(ManageError::UpdateFailed("package list").into());
    }

    json_response(
        StatusCode::OK,
        &json!({
            "message": format!("Packages {} successfully", action.past_tense()),
            "packages": updated,
        }),
        Cache::NoCache,
    )
}

async fn list_repo_mappings(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let mappings = state.registry.repo_mappings().await;
    json_response(
        StatusCode::OK,
        &json!({ "mappings": mappings }),
        Cache::MaxAge(state.config.list_max_age_secs),
    )
}

async fn manage_repo_mappings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = ManageRequest::parse(&body)?;
    let current = state.registry.repo_mappings().await;
    let (action, updated) = edit_repo_mappings(&current, request)?;

    if !state.registry.update_repo_mappings(&updated).await {
        return Err(ManageError::UpdateFailed("repository mappings").into());
    }

    json_response(
        StatusCode::OK,
        &json!({
            "message": format!("Repository mappings {} successfully", action.past_tense()),
            "mappings": updated,
        }),
        Cache::NoCache,
    )
}

async fn init_mappings(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let (message, mappings) = match state.registry.seed_repo_mappings().await {
        Some(SeedOutcome::Seeded(mappings)) => {
            ("Repository mappings initialized successfully", mappings)
        }
        Some(SeedOutcome::Existing(mappings)) => ("Repository mappings already exist", mappings),
        None => return Err(GatewayError::InitFailed),
    };

    json_response(
        StatusCode::OK,
        &json!({ "message": message, "mappings": mappings }),
        Cache::NoCache,
    )
}

async fn preflight(methods: &'static str) -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::ACCESS_CONTROL_ALLOW_METHODS, methods)],
    )
        .into_response()
}

async fn method_not_allowed() -> Response {
    error_body(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({ "error": "Method not allowed" }),
    )
}

async fn not_found() -> Response {
    error_body(StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers
        .entry(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .or_insert(HeaderValue::from_static("Content-Type"));
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Manage(ManageError::UpdateFailed(what)) => {
                tracing::error!(what, "management update failed");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("Failed to update {what}") }),
                )
            }
            GatewayError::Manage(e) => {
                let reason = match e {
                    ManageError::InvalidJson(_) => "invalid_json",
                    ManageError::InvalidAction(_) => "invalid_action",
                    _ => "invalid_payload",
                };
                counter!(MANAGE_REJECTED, "reason" => reason).increment(1);
                tracing::info!(error = %e, "rejected management request");
                error_body(StatusCode::BAD_REQUEST, json!({ "error": e.to_string() }))
            }
            GatewayError::Encode(e) => {
                tracing::error!(error = %e, "failed to encode response");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Failed to retrieve package data",
                        "message": e.to_string(),
                    }),
                )
            }
            GatewayError::InitFailed => error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to initialize repository mappings" }),
            ),
        }
    }
}
