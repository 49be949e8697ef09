//! Network front end: the extension control channel and the caller-facing HTTP API.
//!
//! Both listeners share one [`Bridge`]. They run on separate ports so the extension
//! endpoint can stay on a fixed well-known port while callers talk plain HTTP.

mod api;
mod control;

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use snapbridge_runtime::{Bridge, BridgeConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::store::ScreenshotStore;

/// Everything `serve` needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub host: String,
	/// Port 0 picks an ephemeral port.
	pub control_port: u16,
	pub http_port: u16,
	pub bridge: BridgeConfig,
	pub screenshot_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
	bridge: Arc<Bridge>,
	store: ScreenshotStore,
}

/// Bound but not yet serving.
pub struct Server {
	state: AppState,
	control: TcpListener,
	http: TcpListener,
}

impl Server {
	pub async fn bind(config: ServerConfig) -> Result<Self> {
		let control = TcpListener::bind((config.host.as_str(), config.control_port))
			.await
			.with_context(|| format!("Failed to bind control channel to {}:{}", config.host, config.control_port))?;
		let http = TcpListener::bind((config.host.as_str(), config.http_port))
			.await
			.with_context(|| format!("Failed to bind HTTP API to {}:{}", config.host, config.http_port))?;

		Ok(Self {
			state: AppState {
				bridge: Arc::new(Bridge::new(config.bridge)),
				store: ScreenshotStore::new(config.screenshot_dir),
			},
			control,
			http,
		})
	}

	pub fn control_addr(&self) -> io::Result<SocketAddr> {
		self.control.local_addr()
	}

	pub fn http_addr(&self) -> io::Result<SocketAddr> {
		self.http.local_addr()
	}

	pub fn bridge(&self) -> Arc<Bridge> {
		Arc::clone(&self.state.bridge)
	}

	/// Serves both listeners until `shutdown` resolves.
	///
	/// On shutdown the listeners stop accepting, every extension session is closed and
	/// captures still waiting on them fail with `SESSION_DISCONNECTED`.
	pub async fn run<F>(self, shutdown: F) -> Result<()>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let control_addr = self.control_addr()?;
		let http_addr = self.http_addr()?;
		info!(target = "snapbridge", %control_addr, %http_addr, "server listening");

		let (stop_tx, stop_rx) = watch::channel(false);
		let bridge = self.bridge();
		tokio::spawn(async move {
			shutdown.await;
			info!(target = "snapbridge", "shutting down");
			let _ = stop_tx.send(true);
			bridge.shutdown();
		});

		let control = axum::serve(
			self.control,
			control::router(self.state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
		)
		.with_graceful_shutdown(stopped(stop_rx.clone()));
		let api = axum::serve(self.http, api::router(self.state)).with_graceful_shutdown(stopped(stop_rx));

		tokio::try_join!(control.into_future(), api.into_future()).context("Server error")?;
		info!(target = "snapbridge", "server stopped");
		Ok(())
	}
}

async fn stopped(mut rx: watch::Receiver<bool>) {
	let _ = rx.wait_for(|stop| *stop).await;
}
