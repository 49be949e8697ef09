use std::path::PathBuf;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use snapbridge_protocol::{
	CaptureOptions, CaptureRequestBody, CaptureSummary, ErrorBody, ErrorCode, REQUEST_ID_HEADER, SAVED_PATH_HEADER,
	SessionInfo, StatusReport,
};
use snapbridge_runtime::{CaptureError, CapturePayload, RequestId};
use tracing::{debug, error, info};

use crate::store::ScreenshotStore;

use super::AppState;

pub(super) fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route("/status", get(status))
		.route("/sessions", get(sessions))
		.route("/capture", get(capture_from_query).post(capture_from_json))
		.route("/screenshot", get(capture_from_query))
		.route("/capture/{id}", get(capture_state).delete(cancel_capture))
		.with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
	Json(state.bridge.status())
}

async fn sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
	Json(state.bridge.registry().list())
}

/// Query-string form of [`CaptureRequestBody`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureQuery {
	id: Option<String>,
	#[serde(default)]
	persist_locally: bool,
	deliver_to_caller: Option<bool>,
	timeout_ms: Option<u64>,
}

impl From<CaptureQuery> for CaptureRequestBody {
	fn from(query: CaptureQuery) -> Self {
		let defaults = CaptureOptions::default();
		Self {
			id: query.id,
			options: CaptureOptions {
				persist_locally: query.persist_locally,
				deliver_to_caller: query.deliver_to_caller.unwrap_or(defaults.deliver_to_caller),
				timeout_ms: query.timeout_ms,
			},
		}
	}
}

async fn capture_from_query(
	State(state): State<AppState>,
	query: Result<Query<CaptureQuery>, QueryRejection>,
) -> Response {
	match query {
		Ok(Query(query)) => run_capture(&state, query.into()).await,
		Err(rejection) => invalid_input(rejection.body_text()),
	}
}

async fn capture_from_json(
	State(state): State<AppState>,
	body: Result<Json<CaptureRequestBody>, JsonRejection>,
) -> Response {
	match body {
		Ok(Json(body)) => run_capture(&state, body).await,
		Err(rejection) => invalid_input(rejection.body_text()),
	}
}

/// Submits the capture and holds the HTTP request open until it finishes.
///
/// If the caller hangs up first, axum drops this future and the pending capture is
/// cancelled with it.
async fn run_capture(state: &AppState, body: CaptureRequestBody) -> Response {
	let CaptureRequestBody { id, options } = body;
	let id = match id {
		Some(id) if id.trim().is_empty() => return invalid_input("request id must not be empty".into()),
		other => other.map(RequestId::from),
	};
	if options.timeout_ms == Some(0) {
		return invalid_input("timeoutMs must be positive".into());
	}
	if !options.deliver_to_caller && !options.persist_locally {
		return invalid_input("deliverToCaller=false requires persistLocally=true".into());
	}
	if options.persist_locally {
		if let Some(id) = id.as_ref().filter(|id| !ScreenshotStore::accepts_id(id.as_str())) {
			return invalid_input(format!(
				"request id '{id}' cannot be persisted; use letters, digits, '-', '_' or '.'"
			));
		}
	}

	let persist = options.persist_locally;
	let deliver = options.deliver_to_caller;

	let id = match state.bridge.submit(id, options) {
		Ok(id) => id,
		Err(err) => return capture_error(None, &err),
	};
	debug!(target = "snapbridge.http", request_id = %id, persist, deliver, "capture submitted");

	let payload = match state.bridge.await_result(&id, None).await {
		Ok(payload) => payload,
		Err(err) => return capture_error(Some(&id), &err),
	};

	let saved = if persist {
		match state.store.save(&id, &payload).await {
			Ok(path) => Some(path),
			Err(err) => {
				error!(target = "snapbridge.http", request_id = %id, dir = %state.store.dir().display(), error = %err, "saving capture failed");
				return error_response(
					Some(&id),
					ErrorBody {
						code: ErrorCode::InternalError,
						message: format!("saving capture failed: {err}"),
					},
				);
			}
		}
	} else {
		None
	};

	info!(target = "snapbridge.http", request_id = %id, size = payload.size(), "capture served");
	if deliver {
		image_response(&id, payload, saved)
	} else {
		let summary = CaptureSummary {
			request_id: id.to_string(),
			content_type: payload.content_type().to_string(),
			size: payload.size(),
			saved_path: saved.as_ref().map(|p| p.display().to_string()),
		};
		let mut response = Json(summary).into_response();
		set_headers(&mut response, &id, saved.as_ref());
		response
	}
}

async fn capture_state(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	match state.bridge.state(&id) {
		Some(capture) => Json(json!({ "requestId": id, "state": capture.to_string() })).into_response(),
		None => capture_error(None, &CaptureError::UnknownRequest(id)),
	}
}

async fn cancel_capture(State(state): State<AppState>, Path(id): Path<String>) -> Response {
	if state.bridge.cancel(&id) {
		info!(target = "snapbridge.http", request_id = %id, "capture cancelled by caller");
		StatusCode::NO_CONTENT.into_response()
	} else {
		capture_error(None, &CaptureError::UnknownRequest(id))
	}
}

fn image_response(id: &RequestId, payload: CapturePayload, saved: Option<PathBuf>) -> Response {
	let content_type =
		HeaderValue::from_str(payload.content_type()).unwrap_or(HeaderValue::from_static("application/octet-stream"));
	let mut response = payload.image.data.into_response();
	response.headers_mut().insert(CONTENT_TYPE, content_type);
	set_headers(&mut response, id, saved.as_ref());
	response
}

fn set_headers(response: &mut Response, id: &RequestId, saved: Option<&PathBuf>) {
	let headers = response.headers_mut();
	if let Ok(value) = HeaderValue::from_str(id.as_str()) {
		headers.insert(REQUEST_ID_HEADER, value);
	}
	if let Some(value) = saved.and_then(|p| HeaderValue::from_str(&p.display().to_string()).ok()) {
		headers.insert(SAVED_PATH_HEADER, value);
	}
}

fn capture_error(id: Option<&RequestId>, err: &CaptureError) -> Response {
	debug!(target = "snapbridge.http", request_id = ?id.map(RequestId::as_str), error = %err, "capture request failed");
	error_response(id, err.to_body())
}

fn invalid_input(message: String) -> Response {
	error_response(
		None,
		ErrorBody {
			code: ErrorCode::InvalidInput,
			message,
		},
	)
}

fn error_response(id: Option<&RequestId>, body: ErrorBody) -> Response {
	let status = StatusCode::from_u16(body.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	let mut response = (status, Json(body)).into_response();
	if let Some(value) = id.and_then(|id| HeaderValue::from_str(id.as_str()).ok()) {
		response.headers_mut().insert(REQUEST_ID_HEADER, value);
	}
	response
}
