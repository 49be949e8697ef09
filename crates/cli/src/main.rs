use clap::Parser;
use snapbridge_cli::{cli::Cli, commands, error::CliError, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(&err);
		std::process::exit(1);
	}
}

fn handle_error(err: &CliError) {
	let body = err.to_body();
	let code = serde_json::to_value(body.code)
		.ok()
		.and_then(|v| v.as_str().map(str::to_string))
		.unwrap_or_default();
	eprintln!("error [{code}]: {}", body.message);
}
