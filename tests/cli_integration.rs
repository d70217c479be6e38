use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn run_messenger(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_messenger"))
        .args(args)
        .env("MESSENGER_DATA_DIR", data_dir)
        .env_remove("MESSENGER_GATEWAY_URL")
        .env_remove("MESSENGER_REALTIME_URL")
        .env_remove("MESSENGER_SESSION_PATH")
        .env_remove("MESSENGER_STATE_PATH")
        .env_remove("MESSENGER_CACHE_DIR")
        .output()
        .expect("failed to execute messenger binary")
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let output = run_messenger(data_dir, args);
    assert!(
        output.status.success(),
        "messenger failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be valid json")
}

#[test]
fn doctor_reports_paths_under_the_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let value = run_json(dir.path(), &["doctor", "--json"]);

    let gateway = value["gatewayUrl"].as_str().expect("gatewayUrl");
    assert!(gateway.starts_with("http"));
    let realtime = value["realtimeUrl"].as_str().expect("realtimeUrl");
    assert!(realtime.starts_with("ws") && realtime.ends_with("/listen"));

    for key in ["sessionPath", "statePath", "cacheDir"] {
        let path = value[key].as_str().unwrap_or_else(|| panic!("missing {key}"));
        assert!(Path::new(path).starts_with(dir.path()), "{key} = {path}");
    }
}

#[test]
fn commands_needing_a_session_fail_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run_messenger(dir.path(), &["threads", "--json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("messenger login"), "stderr: {stderr}");
}

#[test]
fn logout_without_a_session_succeeds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = run_messenger(dir.path(), &["logout"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Logged out."));
}
