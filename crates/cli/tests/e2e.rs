//! End-to-end tests: a real server on ephemeral ports, a scripted extension over
//! WebSocket, and HTTP callers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use snapbridge_cli::client::{ApiClient, CaptureResponse};
use snapbridge_cli::server::{Server, ServerConfig};
use snapbridge_protocol::{
	CaptureOptions, CaptureRequestBody, DataUrl, ErrorBody, ErrorCode, REQUEST_ID_HEADER, SAVED_PATH_HEADER,
	StatusReport,
};
use snapbridge_runtime::BridgeConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

struct TestServer {
	control: SocketAddr,
	http: SocketAddr,
	shots: PathBuf,
	stop: Option<oneshot::Sender<()>>,
	handle: JoinHandle<anyhow::Result<()>>,
	_temp: tempfile::TempDir,
}

impl TestServer {
	async fn start() -> Self {
		let temp = tempfile::tempdir().unwrap();
		let shots = temp.path().join("shots");
		let server = Server::bind(ServerConfig {
			host: "127.0.0.1".into(),
			control_port: 0,
			http_port: 0,
			bridge: BridgeConfig {
				default_timeout: Duration::from_secs(5),
				..BridgeConfig::default()
			},
			screenshot_dir: shots.clone(),
		})
		.await
		.unwrap();

		let control = server.control_addr().unwrap();
		let http = server.http_addr().unwrap();
		let (stop, stopped) = oneshot::channel::<()>();
		let handle = tokio::spawn(server.run(async move {
			let _ = stopped.await;
		}));

		Self {
			control,
			http,
			shots,
			stop: Some(stop),
			handle,
			_temp: temp,
		}
	}

	fn url(&self, path: &str) -> String {
		format!("http://{}{path}", self.http)
	}

	async fn status(&self) -> StatusReport {
		reqwest::get(self.url("/status")).await.unwrap().json().await.unwrap()
	}

	/// Polls `/status` until `check` holds.
	async fn wait_until(&self, check: impl Fn(&StatusReport) -> bool) {
		for _ in 0..200 {
			if check(&self.status().await) {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("server never reached expected status: {:?}", self.status().await);
	}

	async fn shutdown(mut self) -> anyhow::Result<()> {
		if let Some(stop) = self.stop.take() {
			let _ = stop.send(());
		}
		tokio::time::timeout(Duration::from_secs(5), self.handle)
			.await
			.expect("server did not stop")
			.unwrap()
	}
}

#[derive(Clone, Copy)]
enum Behaviour {
	Screenshot,
	/// Replies without echoing the request id.
	LegacyScreenshot,
	Silent,
	Fail(&'static str),
}

fn parse_frame(msg: &Message) -> Option<Value> {
	serde_json::from_str(msg.to_text().ok()?).ok()
}

/// Connects a scripted extension. Returns once its opening ping has been answered, so the
/// server has registered the session. The task yields every frame the extension saw.
async fn attach_extension(server: &TestServer, behaviour: Behaviour) -> JoinHandle<Vec<Value>> {
	let (ws, _) = connect_async(format!("ws://{}/", server.control)).await.unwrap();
	let (mut tx, mut rx) = ws.split();
	tx.send(Message::text(json!({ "type": "ping" }).to_string())).await.unwrap();

	let mut seen = Vec::new();
	loop {
		let msg = tokio::time::timeout(Duration::from_secs(5), rx.next())
			.await
			.expect("no pong from server")
			.expect("control channel closed")
			.unwrap();
		if let Some(value) = parse_frame(&msg) {
			let is_pong = value["action"] == "pong";
			seen.push(value);
			if is_pong {
				break;
			}
		}
	}

	tokio::spawn(async move {
		while let Some(Ok(msg)) = rx.next().await {
			let Some(value) = parse_frame(&msg) else {
				continue;
			};
			seen.push(value.clone());
			if value["action"] != "capture" {
				continue;
			}
			let request_id = value["requestId"].clone();
			let reply = match behaviour {
				Behaviour::Screenshot => json!({
					"action": "screenshot",
					"requestId": request_id,
					"dataUrl": DataUrl::encode("image/png", PNG),
				}),
				Behaviour::LegacyScreenshot => json!({
					"action": "screenshot",
					"dataUrl": DataUrl::encode("image/png", PNG),
				}),
				Behaviour::Silent => continue,
				Behaviour::Fail(message) => json!({ "requestId": request_id, "error": message }),
			};
			if tx.send(Message::text(reply.to_string())).await.is_err() {
				break;
			}
		}
		seen
	})
}

async fn error_body(response: reqwest::Response) -> ErrorBody {
	response.json().await.unwrap()
}

#[tokio::test]
async fn status_reports_no_extension() {
	let server = TestServer::start().await;

	let status = server.status().await;
	assert!(!status.extension_connected);
	assert_eq!(status.sessions, 0);
	assert_eq!(status.pending, 0);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn capture_round_trip() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Screenshot).await;

	let response = reqwest::get(server.url("/capture?timeoutMs=3000")).await.unwrap();

	assert_eq!(response.status(), 200);
	assert_eq!(response.headers()["content-type"], "image/png");
	let request_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
	assert!(request_id.starts_with("capture-"));
	assert_eq!(response.bytes().await.unwrap().as_ref(), PNG);
	assert_eq!(server.status().await.pending, 0);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn caller_supplied_id_is_echoed() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Screenshot).await;

	let response = reqwest::Client::new()
		.post(server.url("/capture"))
		.json(&json!({ "id": "my-shot" }))
		.send()
		.await
		.unwrap();

	assert_eq!(response.status(), 200);
	assert_eq!(response.headers()[REQUEST_ID_HEADER], "my-shot");

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn capture_without_extension_fails_fast() {
	let server = TestServer::start().await;

	let started = std::time::Instant::now();
	let response = reqwest::Client::new()
		.post(server.url("/capture"))
		.json(&json!({ "timeoutMs": 5000 }))
		.send()
		.await
		.unwrap();

	assert_eq!(response.status(), 503);
	assert_eq!(error_body(response).await.code, ErrorCode::NoSessionAvailable);
	assert!(started.elapsed() < Duration::from_secs(2));

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_extension_times_out() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Silent).await;

	let response = reqwest::get(server.url("/capture?timeoutMs=200")).await.unwrap();

	assert_eq!(response.status(), 504);
	assert!(response.headers().contains_key(REQUEST_ID_HEADER));
	assert_eq!(error_body(response).await.code, ErrorCode::Timeout);
	assert_eq!(server.status().await.pending, 0);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn extension_error_is_bad_gateway() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Fail("tab not capturable")).await;

	let response = reqwest::get(server.url("/capture")).await.unwrap();

	assert_eq!(response.status(), 502);
	let body = error_body(response).await;
	assert_eq!(body.code, ErrorCode::ExtensionFailed);
	assert!(body.message.contains("tab not capturable"));

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn legacy_reply_without_id_is_correlated() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::LegacyScreenshot).await;

	let response = reqwest::get(server.url("/screenshot")).await.unwrap();

	assert_eq!(response.status(), 200);
	assert_eq!(response.bytes().await.unwrap().as_ref(), PNG);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn persisted_capture_is_written_to_disk() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Screenshot).await;

	let response = reqwest::Client::new()
		.post(server.url("/capture"))
		.json(&json!({ "id": "kept", "persistLocally": true }))
		.send()
		.await
		.unwrap();

	assert_eq!(response.status(), 200);
	let saved = PathBuf::from(response.headers()[SAVED_PATH_HEADER].to_str().unwrap());
	assert_eq!(saved, server.shots.join("kept.png"));
	assert_eq!(std::fs::read(&saved).unwrap(), PNG);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn summary_only_capture() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Screenshot).await;
	let client = ApiClient::new(&server.url("")).unwrap();

	let response = client
		.capture(&CaptureRequestBody {
			id: Some("summary".into()),
			options: CaptureOptions {
				persist_locally: true,
				deliver_to_caller: false,
				timeout_ms: Some(3000),
			},
		})
		.await
		.unwrap();

	match response {
		CaptureResponse::Summary(summary) => {
			assert_eq!(summary.request_id, "summary");
			assert_eq!(summary.content_type, "image/png");
			assert_eq!(summary.size, PNG.len());
			assert!(summary.saved_path.unwrap().ends_with("summary.png"));
		}
		CaptureResponse::Image(_) => panic!("expected a summary"),
	}

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_capture_returns_image() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Screenshot).await;
	let client = ApiClient::new(&server.url("/")).unwrap();

	let status = client.status().await.unwrap();
	assert!(status.extension_connected);
	assert_eq!(client.sessions().await.unwrap().len(), 1);

	match client.capture(&CaptureRequestBody::default()).await.unwrap() {
		CaptureResponse::Image(image) => {
			assert_eq!(image.bytes, PNG);
			assert_eq!(image.extension(), "png");
			assert!(image.request_id.is_some());
			assert_eq!(image.saved_path, None);
		}
		CaptureResponse::Summary(_) => panic!("expected an image"),
	}

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_surfaces_server_errors() {
	let server = TestServer::start().await;
	let client = ApiClient::new(&server.url("")).unwrap();

	let err = client.capture(&CaptureRequestBody::default()).await.unwrap_err();
	assert_eq!(err.code(), ErrorCode::NoSessionAvailable);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_in_flight_id_is_conflict() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Silent).await;
	let url = server.url("/capture");

	let first = tokio::spawn({
		let url = url.clone();
		async move {
			reqwest::Client::new()
				.post(url)
				.json(&json!({ "id": "dup", "timeoutMs": 2000 }))
				.send()
				.await
				.unwrap()
				.status()
		}
	});
	server.wait_until(|s| s.pending == 1).await;

	let second = reqwest::Client::new()
		.post(url)
		.json(&json!({ "id": "dup" }))
		.send()
		.await
		.unwrap();
	assert_eq!(second.status(), 409);
	assert_eq!(error_body(second).await.code, ErrorCode::DuplicateRequestId);

	assert_eq!(first.await.unwrap(), 504);
	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn extension_disconnect_fails_pending_capture() {
	let server = TestServer::start().await;
	let extension = attach_extension(&server, Behaviour::Silent).await;

	let pending = tokio::spawn(reqwest::get(server.url("/capture?timeoutMs=5000")));
	server.wait_until(|s| s.pending == 1).await;

	extension.abort();
	let response = pending.await.unwrap().unwrap();

	assert_eq!(response.status(), 502);
	assert_eq!(error_body(response).await.code, ErrorCode::SessionDisconnected);
	server.wait_until(|s| !s.extension_connected).await;

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn capture_reaches_every_session() {
	let server = TestServer::start().await;
	let silent = attach_extension(&server, Behaviour::Silent).await;
	let _answering = attach_extension(&server, Behaviour::Screenshot).await;

	let response = reqwest::get(server.url("/capture?id=both")).await.unwrap();
	assert_eq!(response.status(), 200);

	server.shutdown().await.unwrap();
	let seen = silent.await.unwrap();
	assert!(seen.iter().any(|m| m["action"] == "capture" && m["requestId"] == "both"));
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
	let server = TestServer::start().await;
	let extension = attach_extension(&server, Behaviour::Silent).await;

	server.shutdown().await.unwrap();
	let seen = extension.await.unwrap();
	assert!(seen.iter().any(|m| m["action"] == "pong" && m["timestamp"].is_u64()));
}

#[tokio::test]
async fn invalid_input_is_rejected() {
	let server = TestServer::start().await;
	let client = reqwest::Client::new();

	let bad_json = client
		.post(server.url("/capture"))
		.header("content-type", "application/json")
		.body("{not json")
		.send()
		.await
		.unwrap();
	assert_eq!(bad_json.status(), 400);
	assert_eq!(error_body(bad_json).await.code, ErrorCode::InvalidInput);

	let empty_id = client
		.post(server.url("/capture"))
		.json(&json!({ "id": "  " }))
		.send()
		.await
		.unwrap();
	assert_eq!(empty_id.status(), 400);

	let bad_query = reqwest::get(server.url("/capture?timeoutMs=soon")).await.unwrap();
	assert_eq!(bad_query.status(), 400);

	let nowhere = client
		.post(server.url("/capture"))
		.json(&json!({ "deliverToCaller": false }))
		.send()
		.await
		.unwrap();
	assert_eq!(nowhere.status(), 400);
	assert_eq!(error_body(nowhere).await.code, ErrorCode::InvalidInput);

	let unsafe_name = client
		.post(server.url("/capture"))
		.json(&json!({ "id": "a/b", "persistLocally": true }))
		.send()
		.await
		.unwrap();
	assert_eq!(unsafe_name.status(), 400);
	assert_eq!(server.status().await.pending, 0);

	server.shutdown().await.unwrap();
}

#[tokio::test]
async fn capture_state_and_cancel() {
	let server = TestServer::start().await;
	let _extension = attach_extension(&server, Behaviour::Silent).await;
	let client = reqwest::Client::new();

	let pending = tokio::spawn(reqwest::get(server.url("/capture?id=stuck&timeoutMs=5000")));
	server.wait_until(|s| s.pending == 1).await;

	let state: Value = client
		.get(server.url("/capture/stuck"))
		.send()
		.await
		.unwrap()
		.json()
		.await
		.unwrap();
	assert_eq!(state["state"], "awaiting_result");

	let cancelled = client.delete(server.url("/capture/stuck")).send().await.unwrap();
	assert_eq!(cancelled.status(), 204);

	let response = pending.await.unwrap().unwrap();
	assert_eq!(response.status(), 500);
	assert_eq!(error_body(response).await.code, ErrorCode::Cancelled);

	let missing = client.delete(server.url("/capture/stuck")).send().await.unwrap();
	assert_eq!(missing.status(), 404);

	server.shutdown().await.unwrap();
}
