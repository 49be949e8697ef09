use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use snapbridge_protocol::{CaptureOptions, CaptureRequestBody};
use snapbridge_runtime::BridgeConfig;
use tracing::info;

use crate::cli::{CaptureArgs, Cli, ClientArgs, Commands, ServeArgs};
use crate::client::{ApiClient, CaptureResponse};
use crate::error::Result;
use crate::server::{Server, ServerConfig};
use crate::store::ScreenshotStore;

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => serve(args).await,
		Commands::Status(args) => status(args).await,
		Commands::Capture(args) => capture(args).await,
	}
}

impl ServeArgs {
	pub fn to_config(&self) -> anyhow::Result<ServerConfig> {
		let screenshot_dir = match &self.screenshot_dir {
			Some(dir) => dir.clone(),
			None => ScreenshotStore::default_dir()
				.context("No home directory found; pass --screenshot-dir")?,
		};
		Ok(ServerConfig {
			host: self.host.clone(),
			control_port: self.control_port,
			http_port: self.http_port,
			bridge: BridgeConfig {
				default_timeout: Duration::from_millis(self.timeout_ms),
				result_linger: Duration::from_millis(self.linger_ms),
				max_payload_bytes: self.max_payload_bytes,
			},
			screenshot_dir,
		})
	}
}

async fn serve(args: ServeArgs) -> Result<()> {
	let config = args.to_config()?;
	let screenshot_dir = config.screenshot_dir.clone();
	let server = Server::bind(config).await?;

	println!("Extension control channel on ws://{}", server.control_addr()?);
	println!("Capture API on http://{}", server.http_addr()?);
	println!("Screenshots saved to {}", screenshot_dir.display());
	println!("Press Ctrl+C to stop");

	server
		.run(async {
			if tokio::signal::ctrl_c().await.is_err() {
				std::future::pending::<()>().await;
			}
		})
		.await?;
	Ok(())
}

async fn status(args: ClientArgs) -> Result<()> {
	let client = ApiClient::new(&args.server)?;
	let report = client.status().await?;

	if report.extension_connected {
		println!("Extension connected ({} session(s), {} capture(s) pending)", report.sessions, report.pending);
		for session in client.sessions().await? {
			match session.remote {
				Some(remote) => println!("  session-{} from {remote}", session.id),
				None => println!("  session-{}", session.id),
			}
		}
	} else {
		println!("No extension connected to {}", client.base_url());
	}
	Ok(())
}

async fn capture(args: CaptureArgs) -> Result<()> {
	let client = ApiClient::new(&args.client.server)?;
	let body = CaptureRequestBody {
		id: args.id,
		options: CaptureOptions {
			persist_locally: args.persist,
			deliver_to_caller: !args.no_deliver,
			timeout_ms: args.timeout_ms,
		},
	};

	match client.capture(&body).await? {
		CaptureResponse::Image(image) => {
			let path = args.output.unwrap_or_else(|| {
				let stem = image.request_id.as_deref().unwrap_or("capture");
				PathBuf::from(format!("{stem}.{}", image.extension()))
			});
			tokio::fs::write(&path, &image.bytes)
				.await
				.with_context(|| format!("Failed to write {}", path.display()))?;
			info!(target = "snapbridge", path = %path.display(), size = image.bytes.len(), "capture written");
			println!("{}", path.display());
			if let Some(saved) = image.saved_path {
				println!("Also saved on server: {saved}");
			}
		}
		CaptureResponse::Summary(summary) => {
			println!("{}", serde_json::to_string_pretty(&summary)?);
		}
	}
	Ok(())
}
