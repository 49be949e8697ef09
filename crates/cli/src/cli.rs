use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};
use snapbridge_protocol::{DEFAULT_CONTROL_PORT, DEFAULT_HOST, DEFAULT_HTTP_PORT, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_TIMEOUT_MS};


/// Base URL `status` and `capture` talk to when `--server` is not given.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8766";

/// How long finished captures are remembered for late-result detection.
pub const DEFAULT_LINGER_MS: u64 = 30_000;

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "snapbridge")]
#[command(about = "Capture browser screenshots over HTTP through a connected extension")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the extension control channel and the HTTP capture API
	Serve(ServeArgs),

	/// Show whether an extension is connected to a running server
	Status(ClientArgs),

	/// Request a capture from a running server
	#[command(alias = "screenshot")]
	Capture(CaptureArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Address both listeners bind to
	#[arg(long, env = "SNAPBRIDGE_HOST", default_value = DEFAULT_HOST)]
	pub host: String,

	/// WebSocket port the extension connects to
	#[arg(long, env = "SNAPBRIDGE_CONTROL_PORT", default_value_t = DEFAULT_CONTROL_PORT)]
	pub control_port: u16,

	/// HTTP port callers send capture requests to
	#[arg(long, env = "SNAPBRIDGE_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
	pub http_port: u16,

	/// Default capture deadline in milliseconds
	#[arg(long, env = "SNAPBRIDGE_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
	pub timeout_ms: u64,

	/// Largest control-channel message accepted, in bytes
	#[arg(long, env = "SNAPBRIDGE_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
	pub max_payload_bytes: usize,

	/// Directory for captures requested with persistLocally
	#[arg(long, env = "SNAPBRIDGE_SCREENSHOT_DIR", value_name = "DIR")]
	pub screenshot_dir: Option<PathBuf>,

	/// How long finished captures are remembered, in milliseconds
	#[arg(long, env = "SNAPBRIDGE_LINGER_MS", default_value_t = DEFAULT_LINGER_MS)]
	pub linger_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
	/// Base URL of the snapbridge HTTP API
	#[arg(long, env = "SNAPBRIDGE_URL", default_value = DEFAULT_SERVER_URL, value_name = "URL")]
	pub server: String,
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
	#[command(flatten)]
	pub client: ClientArgs,

	/// Correlation id to use instead of a generated one
	#[arg(long)]
	pub id: Option<String>,

	/// Also save the image in the server's screenshot directory
	#[arg(long)]
	pub persist: bool,

	/// Only print a summary; the image stays on the server
	#[arg(long, requires = "persist", conflicts_with = "output")]
	pub no_deliver: bool,

	/// Capture deadline in milliseconds (server default if omitted)
	#[arg(long)]
	pub timeout_ms: Option<u64>,

	/// Where to write the image (defaults to <request-id>.<ext> in the current directory)
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<PathBuf>,
}
