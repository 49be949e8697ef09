use std::net::SocketAddr;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use snapbridge_runtime::SessionId;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use super::AppState;

pub(super) fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(upgrade))
		.route("/extension", get(upgrade))
		.with_state(state)
}

async fn upgrade(
	ws: WebSocketUpgrade,
	ConnectInfo(remote): ConnectInfo<SocketAddr>,
	State(state): State<AppState>,
) -> Response {
	let limit = state.bridge.config().max_payload_bytes;
	ws.max_message_size(limit)
		.max_frame_size(limit)
		.on_upgrade(move |socket| run_session(socket, state, remote))
}

/// Pumps one extension connection until either side closes it.
///
/// Outbound commands arrive on the session's channel and are written by a dedicated
/// task, so a slow socket never blocks a broadcast. Inbound frames go straight to the
/// bridge.
async fn run_session(socket: WebSocket, state: AppState, remote: SocketAddr) {
	let (session, rx) = state.bridge.connect(Some(remote.to_string()));

	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();

	// Ends when the bridge drops the session (disconnect or shutdown) or the socket fails.
	let mut send_task = tokio::spawn(async move {
		while let Some(text) = rx_stream.next().await {
			if ws_tx.send(Message::Text(text.into())).await.is_err() {
				return;
			}
		}
		let _ = ws_tx.send(Message::Close(None)).await;
	});

	loop {
		tokio::select! {
			msg = ws_rx.next() => match msg {
				Some(Ok(Message::Text(text))) => handle_text(&state, session, text.as_str()),
				Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
					Ok(text) => handle_text(&state, session, text),
					Err(_) => warn!(target = "snapbridge.session", %session, len = bytes.len(), "non-UTF-8 binary frame ignored"),
				},
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					warn!(target = "snapbridge.session", %session, error = %err, "extension websocket error");
					break;
				}
			},
			_ = &mut send_task => {
				debug!(target = "snapbridge.session", %session, "writer finished");
				break;
			}
		}
	}

	state.bridge.disconnect(session);
	send_task.abort();
}

fn handle_text(state: &AppState, session: SessionId, text: &str) {
	debug!(target = "snapbridge.session", %session, len = text.len(), "frame received");
	if let Err(err) = state.bridge.handle_frame(session, text) {
		warn!(target = "snapbridge.session", %session, error = %err, "frame rejected");
	}
}
