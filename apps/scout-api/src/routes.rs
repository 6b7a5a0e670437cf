use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use scout_service::{
	Error as ServiceError, ExpertMatch, PredictRequest, RebuildReport, SearchRequest,
};

pub const USER_HEADER: &str = "X-User-ID";

#[derive(Debug, Serialize)]
pub struct SearchResponse {
	pub user_id: String,
	pub search_id: Option<Uuid>,
	pub total_results: usize,
	pub experts: Vec<ExpertMatch>,
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
	pub search_id: Uuid,
	pub expert_id: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
	pub user_id: String,
	pub predictions: Vec<String>,
	pub confidence_scores: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
	pub user_id: String,
	pub trained_queries: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
	pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
	pub user_id: String,
	pub queries: Vec<String>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/experts/search", post(search))
		.route("/v1/experts/search/click", post(record_click))
		.route("/v1/experts/predict", get(predict))
		.route("/v1/users/{user_id}/train", post(train))
		.route("/v1/users/{user_id}/recent", get(recent))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/index/rebuild", post(rebuild_index))
		.route("/v1/admin/index/abort", post(abort_rebuild))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let user_id = required_user(&headers)?;
	let experts = state.service.search(&payload).await?;
	let total_results = experts.len();
	let search_id = match state
		.service
		.record_search(&user_id, &payload.query, total_results as u32)
		.await
	{
		Ok(search_id) => Some(search_id),
		Err(err) => {
			tracing::warn!(user_id = %user_id, error = %err, "Failed to record search history.");

			None
		},
	};

	state.service.update(&payload.query, &user_id).await?;

	Ok(Json(SearchResponse { user_id, search_id, total_results, experts }))
}

async fn record_click(
	State(state): State<AppState>,
	Json(payload): Json<ClickRequest>,
) -> Result<StatusCode, ApiError> {
	state.service.record_click(payload.search_id, &payload.expert_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn predict(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(params): Query<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
	let user_id = required_user(&headers)?;
	let response = state.service.predict(&user_id, &params).await?;

	Ok(Json(PredictResponse {
		user_id,
		predictions: response.predictions,
		confidence_scores: response.confidence_scores,
	}))
}

async fn train(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
) -> Result<Json<TrainResponse>, ApiError> {
	let trained_queries = state.service.train_user_model(&user_id).await?;

	Ok(Json(TrainResponse { user_id, trained_queries }))
}

async fn recent(
	State(state): State<AppState>,
	Path(user_id): Path<String>,
	Query(params): Query<RecentParams>,
) -> Result<Json<RecentResponse>, ApiError> {
	let queries = state.service.recent_queries(&user_id, params.limit).await?;

	Ok(Json(RecentResponse { user_id, queries }))
}

async fn rebuild_index(State(state): State<AppState>) -> Result<Json<RebuildReport>, ApiError> {
	Ok(Json(state.service.rebuild_index().await?))
}

async fn abort_rebuild(State(state): State<AppState>) -> StatusCode {
	state.service.abort_rebuild();

	StatusCode::ACCEPTED
}

fn required_user(headers: &HeaderMap) -> Result<String, ApiError> {
	let user_id = headers
		.get(USER_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty());

	match user_id {
		Some(user_id) => Ok(user_id.to_string()),
		None => Err(ApiError::new(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("{USER_HEADER} header is required."),
			Some(vec![USER_HEADER.to_string()]),
		)),
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
			ServiceError::IndexUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "INDEX_UNAVAILABLE"),
			ServiceError::BuildFailed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "BUILD_FAILED"),
			ServiceError::BuildAborted => (StatusCode::CONFLICT, "BUILD_ABORTED"),
			ServiceError::Provider { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed.");
		}

		Self::new(status, code, err.to_string(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
