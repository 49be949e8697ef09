//! HTTP client for a running snapbridge server.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use snapbridge_protocol::{
	CaptureRequestBody, CaptureSummary, DEFAULT_TIMEOUT_MS, ErrorBody, REQUEST_ID_HEADER, SAVED_PATH_HEADER,
	SessionInfo, StatusReport,
};

use crate::error::{CliError, Result};

/// Slack on top of the capture deadline so the server's own timeout wins the race.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

/// Image returned by a delivering capture.
#[derive(Debug, Clone)]
pub struct CapturedImage {
	pub request_id: Option<String>,
	pub content_type: String,
	pub bytes: Vec<u8>,
	pub saved_path: Option<String>,
}

impl CapturedImage {
	/// File extension matching the content type.
	pub fn extension(&self) -> &'static str {
		match self.content_type.as_str() {
			"image/png" => "png",
			"image/jpeg" | "image/jpg" => "jpg",
			"image/webp" => "webp",
			"image/gif" => "gif",
			_ => "bin",
		}
	}
}

/// What a capture request produced.
#[derive(Debug, Clone)]
pub enum CaptureResponse {
	Image(CapturedImage),
	/// `deliverToCaller: false`; the image only exists on the server.
	Summary(CaptureSummary),
}

#[derive(Debug, Clone)]
pub struct ApiClient {
	base: String,
	http: reqwest::Client,
}

impl ApiClient {
	pub fn new(base_url: &str) -> Result<Self> {
		let base = base_url.trim_end_matches('/');
		if !(base.starts_with("http://") || base.starts_with("https://")) {
			return Err(CliError::InvalidUrl(base_url.to_string()));
		}
		Ok(Self {
			base: base.to_string(),
			http: reqwest::Client::builder().build()?,
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base
	}

	pub async fn status(&self) -> Result<StatusReport> {
		let response = self.send(self.http.get(self.url("/status"))).await?;
		Ok(response.json().await?)
	}

	pub async fn sessions(&self) -> Result<Vec<SessionInfo>> {
		let response = self.send(self.http.get(self.url("/sessions"))).await?;
		Ok(response.json().await?)
	}

	pub async fn capture(&self, body: &CaptureRequestBody) -> Result<CaptureResponse> {
		let deadline = Duration::from_millis(body.options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
		let request = self
			.http
			.post(self.url("/capture"))
			.timeout(deadline + RESPONSE_GRACE)
			.json(body);
		let response = self.send(request).await?;

		if !body.options.deliver_to_caller {
			return Ok(CaptureResponse::Summary(response.json().await?));
		}

		let header = |name: &str| {
			response
				.headers()
				.get(name)
				.and_then(|v| v.to_str().ok())
				.map(str::to_string)
		};
		let request_id = header(REQUEST_ID_HEADER);
		let saved_path = header(SAVED_PATH_HEADER);
		let content_type = header(reqwest::header::CONTENT_TYPE.as_str())
			.unwrap_or_else(|| "application/octet-stream".to_string());
		let bytes = response.bytes().await?.to_vec();

		Ok(CaptureResponse::Image(CapturedImage {
			request_id,
			content_type,
			bytes,
			saved_path,
		}))
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.base)
	}

	/// Sends a request and turns non-success statuses into [`CliError`]s.
	async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
		let response = request.send().await.map_err(|source| {
			if source.is_connect() {
				CliError::Unreachable {
					url: self.base.clone(),
					source,
				}
			} else {
				CliError::Http(source)
			}
		})?;

		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		Err(error_from_response(status, response).await)
	}
}

async fn error_from_response(status: StatusCode, response: Response) -> CliError {
	let text = match response.text().await {
		Ok(text) => text,
		Err(err) => return CliError::Http(err),
	};
	match serde_json::from_str::<ErrorBody>(&text) {
		Ok(body) => CliError::from_body(status.as_u16(), body),
		Err(_) => CliError::UnexpectedStatus {
			status: status.as_u16(),
			body: text,
		},
	}
}
