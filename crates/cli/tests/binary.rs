//! Tests that run the `snapbridge` binary itself.

use std::process::Command;

fn snapbridge() -> Command {
	Command::new(env!("CARGO_BIN_EXE_snapbridge"))
}

fn unused_port() -> u16 {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	listener.local_addr().unwrap().port()
}

#[test]
fn help_lists_commands() {
	let output = snapbridge().arg("--help").output().unwrap();
	assert!(output.status.success());

	let stdout = String::from_utf8_lossy(&output.stdout);
	for command in ["serve", "status", "capture"] {
		assert!(stdout.contains(command), "missing {command} in help:\n{stdout}");
	}
}

#[test]
fn status_against_missing_server_exits_nonzero() {
	let output = snapbridge()
		.args(["status", "--server", &format!("http://127.0.0.1:{}", unused_port())])
		.env_remove("RUST_LOG")
		.output()
		.unwrap();

	assert_eq!(output.status.code(), Some(1));
	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("error [INTERNAL_ERROR]"), "stderr: {stderr}");
	assert!(stderr.contains("could not reach snapbridge server"), "stderr: {stderr}");
}

#[test]
fn capture_rejects_bad_url() {
	let output = snapbridge()
		.args(["capture", "--server", "ftp://example.com"])
		.output()
		.unwrap();

	assert_eq!(output.status.code(), Some(1));
	assert!(String::from_utf8_lossy(&output.stderr).contains("error [INVALID_INPUT]"));
}
