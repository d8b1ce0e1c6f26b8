use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatseq_service::{
	ApplicationView, ChatView, CreateApplicationRequest, CreateMessageRequest, DeadIndexingJob,
	Error, MessageView, PageRequest, Paged, ReconcileOutcome, SearchResponse,
	UpdateApplicationRequest,
};
use chatseq_storage::models::Scope;

use crate::state::AppState;

const DEFAULT_DEAD_JOB_LIMIT: i64 = 100;
const MAX_DEAD_JOB_LIMIT: i64 = 1_000;

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
	#[serde(default)]
	q: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeadJobParams {
	limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SweepResponse {
	scheduled: u64,
}

#[derive(Debug, Serialize)]
struct ResyncResponse {
	counter: i64,
}

#[derive(Debug, Serialize)]
struct DeadJobsResponse {
	jobs: Vec<DeadIndexingJob>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
			Error::InvalidQuery { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY", message),
			Error::NotFound { message } =>
				ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
			Error::SequenceConflict { message } =>
				ApiError::new(StatusCode::CONFLICT, "SEQUENCE_CONFLICT", message),
			Error::SearchUnavailable { message } => {
				tracing::error!(error = %message, "Search index unavailable.");

				ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SEARCH_UNAVAILABLE", message)
			},
			Error::CounterStoreUnavailable { message } => {
				tracing::error!(error = %message, "Counter store unavailable.");

				ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "COUNTER_STORE_UNAVAILABLE", message)
			},
			Error::ReconciliationFailed { message } => {
				tracing::error!(error = %message, "Reconciliation failed.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "RECONCILIATION_FAILED", message)
			},
			Error::IndexingFailed { message, .. } => {
				tracing::error!(error = %message, "Indexing failed.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INDEXING_FAILED", message)
			},
			Error::Storage { message } => {
				tracing::error!(error = %message, "Request failed in storage.");

				ApiError::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL_ERROR",
					"Internal error.",
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/v1/applications", post(create_application))
		.route("/api/v1/applications/{token}", get(get_application).put(update_application))
		.route("/api/v1/applications/{token}/chats", get(list_chats).post(create_chat))
		.route("/api/v1/applications/{token}/chats/{number}", get(get_chat))
		.route(
			"/api/v1/applications/{token}/chats/{number}/messages",
			get(list_messages).post(create_message),
		)
		.route("/api/v1/applications/{token}/chats/{number}/messages/search", get(search_messages))
		.route(
			"/api/v1/applications/{token}/chats/{number}/messages/{message_number}",
			get(get_message),
		)
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/sweep", post(sweep))
		.route("/v1/admin/reconcile/{kind}/{id}", post(reconcile))
		.route("/v1/admin/resync/{kind}/{id}", post(resync))
		.route("/v1/admin/indexing/dead", get(dead_indexing_jobs))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn create_application(
	State(state): State<AppState>,
	Json(payload): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationView>), ApiError> {
	let response = state.service.create_application(payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn get_application(
	State(state): State<AppState>,
	Path(token): Path<String>,
) -> Result<Json<ApplicationView>, ApiError> {
	Ok(Json(state.service.get_application(&token).await?))
}

async fn update_application(
	State(state): State<AppState>,
	Path(token): Path<String>,
	Json(payload): Json<UpdateApplicationRequest>,
) -> Result<Json<ApplicationView>, ApiError> {
	Ok(Json(state.service.update_application(&token, payload).await?))
}

async fn list_chats(
	State(state): State<AppState>,
	Path(token): Path<String>,
	Query(page): Query<PageRequest>,
) -> Result<Json<Paged<ChatView>>, ApiError> {
	Ok(Json(state.service.list_chats(&token, page).await?))
}

async fn create_chat(
	State(state): State<AppState>,
	Path(token): Path<String>,
) -> Result<(StatusCode, Json<ChatView>), ApiError> {
	let response = state.service.create_chat(&token).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn get_chat(
	State(state): State<AppState>,
	Path((token, number)): Path<(String, i64)>,
) -> Result<Json<ChatView>, ApiError> {
	Ok(Json(state.service.get_chat(&token, number).await?))
}

async fn list_messages(
	State(state): State<AppState>,
	Path((token, number)): Path<(String, i64)>,
	Query(page): Query<PageRequest>,
) -> Result<Json<Paged<MessageView>>, ApiError> {
	Ok(Json(state.service.list_messages(&token, number, page).await?))
}

async fn create_message(
	State(state): State<AppState>,
	Path((token, number)): Path<(String, i64)>,
	Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
	let response = state.service.create_message(&token, number, payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn search_messages(
	State(state): State<AppState>,
	Path((token, number)): Path<(String, i64)>,
	Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
	Ok(Json(state.service.search(&token, number, &params.q).await?))
}

async fn get_message(
	State(state): State<AppState>,
	Path((token, number, message_number)): Path<(String, i64, i64)>,
) -> Result<Json<MessageView>, ApiError> {
	Ok(Json(state.service.get_message(&token, number, message_number).await?))
}

async fn sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>, ApiError> {
	let scheduled = state.service.sweep().await?;

	Ok(Json(SweepResponse { scheduled }))
}

async fn reconcile(
	State(state): State<AppState>,
	Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
	let scope = parse_scope(&kind, id)?;

	Ok(Json(state.service.reconcile(scope).await?))
}

async fn resync(
	State(state): State<AppState>,
	Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<ResyncResponse>, ApiError> {
	let scope = parse_scope(&kind, id)?;
	let counter = state.service.resync(scope).await?;

	Ok(Json(ResyncResponse { counter }))
}

async fn dead_indexing_jobs(
	State(state): State<AppState>,
	Query(params): Query<DeadJobParams>,
) -> Result<Json<DeadJobsResponse>, ApiError> {
	let limit = params.limit.unwrap_or(DEFAULT_DEAD_JOB_LIMIT).clamp(1, MAX_DEAD_JOB_LIMIT);
	let jobs = state.service.dead_indexing_jobs(limit).await?;

	Ok(Json(DeadJobsResponse { jobs }))
}

fn parse_scope(kind: &str, id: Uuid) -> Result<Scope, ApiError> {
	Scope::parse(kind, id).ok_or_else(|| {
		ApiError::new(
			StatusCode::BAD_REQUEST,
			"INVALID_REQUEST",
			format!("Unknown scope kind {kind:?}. Expected application or chat."),
		)
	})
}
