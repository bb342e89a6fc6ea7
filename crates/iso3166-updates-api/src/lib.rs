use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use iso3166_updates::export::{ExportError, load_aggregate};
use iso3166_updates::types::Aggregate;
use iso3166_updates::utils::{FilterError, UpdatesFilter};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8056";
pub const DEFAULT_DATA_FILE: &str = "iso3166-updates.json";

#[derive(Clone)]
pub struct AppState {
    pub data_file: PathBuf,
}

impl AppState {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("ISO3166_UPDATES_DATA").unwrap_or_else(|_| DEFAULT_DATA_FILE.into()),
        )
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    BadRequest(#[from] FilterError),
    #[error(transparent)]
    Data(#[from] ExportError),
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Data(e) => {
                log::error!("Failed to load change records: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Change records are unavailable".to_string(),
                )
            }
        };
        let body = ErrorBody {
            status: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpdatesQuery {
    alpha: Option<String>,
    year: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api", get(query_handler))
        .route("/api/all", get(all_handler))
        .route("/api/alpha/{codes}", get(alpha_handler))
        .route("/api/year/{year}", get(year_handler))
        .route("/api/alpha/{codes}/year/{year}", get(alpha_year_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

async fn respond(
    state: &AppState,
    alpha: Option<&str>,
    year: Option<&str>,
) -> Result<Json<Aggregate>, ApiError> {
    let filter = UpdatesFilter::parse(alpha, year)?;
    let aggregate = load_aggregate(&state.data_file)?;
    log::debug!(
        "Serving {} country(ies) for alpha={:?} year={:?}",
        aggregate.len(),
        alpha,
        year
    );
    Ok(Json(filter.apply(&aggregate)))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Json<Aggregate>, ApiError> {
    respond(&state, query.alpha.as_deref(), query.year.as_deref()).await
}

async fn all_handler(State(state): State<Arc<AppState>>) -> Result<Json<Aggregate>, ApiError> {
    respond(&state, None, None).await
}

async fn alpha_handler(
    State(state): State<Arc<AppState>>,
    Path(codes): Path<String>,
) -> Result<Json<Aggregate>, ApiError> {
    respond(&state, Some(&codes), None).await
}

async fn year_handler(
    State(state): State<Arc<AppState>>,
    Path(year): Path<String>,
) -> Result<Json<Aggregate>, ApiError> {
    respond(&state, None, Some(&year)).await
}

async fn alpha_year_handler(
    State(state): State<Arc<AppState>>,
    Path((codes, year)): Path<(String, String)>,
) -> Result<Json<Aggregate>, ApiError> {
    respond(&state, Some(&codes), Some(&year)).await
}
