#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

fn framelink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_framelink"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn temp_file(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "framelink-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("temp file should be writable");
    path
}

/// Spawn `serve` on an ephemeral port and return the child with its URL.
fn spawn_server(extra: &[&str]) -> (Child, String) {
    let mut child = framelink()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg("127.0.0.1:0")
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("serve should announce its address");
    let announced: serde_json::Value =
        serde_json::from_str(&line).expect("listening line should be json");
    assert_eq!(announced["event"], "listening");
    let url = announced["url"]
        .as_str()
        .expect("url should be a string")
        .to_string();

    (child, url)
}

fn stop(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn version_prints_package_version() {
    let output = framelink()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("framelink {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn version_extended_reports_header_size() {
    let output = framelink()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: framelink"));
    assert!(stdout.contains("frame_header: 8 bytes"));
}

#[test]
fn send_round_trips_through_echo_server() {
    let (server, url) = spawn_server(&[]);

    let output = framelink()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(&url)
        .arg("--protocol-id")
        .arg("5")
        .arg("--json")
        .arg(r#"{"hello":"world"}"#)
        .arg("--wait")
        .arg("--wait-timeout")
        .arg("3s")
        .output()
        .expect("send should run");
    stop(server);

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let received: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send output should be json");
    assert_eq!(received["event"], "message-received");
    assert_eq!(received["protocol_id"], 5);
    assert_eq!(received["msg_type"], "binary");
    assert_eq!(received["payload"], r#"{"hello":"world"}"#);
    assert_eq!(received["wire_size"], 8 + r#"{"hello":"world"}"#.len());
}

#[test]
fn raw_output_prints_only_payload() {
    let (server, url) = spawn_server(&["--workers", "2"]);

    let output = framelink()
        .arg("--format")
        .arg("raw")
        .arg("send")
        .arg(&url)
        .arg("-p")
        .arg("9")
        .arg("--data")
        .arg("ping")
        .arg("--wait")
        .output()
        .expect("send should run");
    stop(server);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"ping");
}

#[test]
fn send_without_server_is_a_transport_error() {
    let port = {
        let scratch = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
        scratch.local_addr().expect("free port addr").port()
    };

    let output = framelink()
        .arg("send")
        .arg(format!("ws://127.0.0.1:{port}"))
        .arg("--protocol-id")
        .arg("1")
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn send_rejects_invalid_json() {
    let output = framelink()
        .arg("send")
        .arg("ws://127.0.0.1:1")
        .arg("--protocol-id")
        .arg("1")
        .arg("--json")
        .arg("{nope")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_rejects_zero_wait_timeout() {
    let output = framelink()
        .arg("send")
        .arg("ws://127.0.0.1:1")
        .arg("--protocol-id")
        .arg("1")
        .arg("--data")
        .arg("x")
        .arg("--wait-timeout")
        .arg("0s")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn serve_rejects_malformed_config_file() {
    let config = temp_file("bad-config", "{ not json");
    let output = framelink()
        .arg("serve")
        .arg("127.0.0.1:0")
        .arg("--config")
        .arg(&config)
        .output()
        .expect("serve should run");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn serve_rejects_invalid_settings() {
    let config = temp_file("zero-queue", r#"{"queue_capacity": 0}"#);
    let output = framelink()
        .arg("serve")
        .arg("127.0.0.1:0")
        .arg("--config")
        .arg(&config)
        .output()
        .expect("serve should run");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn serve_applies_config_file() {
    let config = temp_file("valid-config", r#"{"heartbeat": "30s", "max_connections": 4}"#);
    let (server, url) = spawn_server(&["--config", config.to_str().expect("utf-8 path")]);

    let output = framelink()
        .arg("--format")
        .arg("pretty")
        .arg("send")
        .arg(&url)
        .arg("--protocol-id")
        .arg("2")
        .arg("--data")
        .arg("configured")
        .arg("--wait")
        .output()
        .expect("send should run");
    stop(server);
    let _ = std::fs::remove_file(&config);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("protocol_id=2"));
    assert!(stdout.contains("payload=configured"));
}
