use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default directives for a `-v` count.
///
/// - 0: warnings only, so a quiet server prints nothing but its listen addresses
/// - 1 (`-v`): session and capture lifecycle events
/// - 2+ (`-vv`): every frame, plus hyper and axum internals
pub fn default_directives(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "warn",
		1 => "info,hyper=warn,axum=warn,reqwest=warn",
		_ => "debug",
	}
}

/// Installs the global subscriber, writing to stderr. `RUST_LOG` overrides `verbosity`.
///
/// A second call is a no-op.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr.with_max_level(tracing::Level::TRACE))
		.with_target(true)
		.compact()
		.try_init();
}
