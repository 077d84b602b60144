//! CLI integration tests

use std::process::{Command, Output};

fn govctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_govctl"))
        .env_remove("GOVCTL_API_URL")
        .args(args)
        .output()
        .expect("Failed to execute govctl")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = govctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Module Governor"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("modules"), "Should show modules command");
    assert!(stdout.contains("ai-modules"), "Should show ai-modules command");
    assert!(stdout.contains("suspensions"), "Should show suspensions command");
    assert!(stdout.contains("shutdowns"), "Should show shutdowns command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = govctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("govctl"), "Should show binary name");
}

#[test]
fn test_modules_list_help() {
    let output = govctl(&["modules", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--state"));
    assert!(stdout.contains("--min-priority"));
    assert!(stdout.contains("--max-priority"));
}

#[test]
fn test_suspensions_history_help() {
    let output = govctl(&["suspensions", "history", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--limit"));
    assert!(stdout.contains("--module"));
}

/// Test that an unknown subcommand is rejected
#[test]
fn test_invalid_command() {
    let output = govctl(&["frobnicate"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_missing_module_id() {
    let output = govctl(&["modules", "get"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("<ID>"));
}

#[test]
fn test_invalid_state_filter() {
    let output = govctl(&["modules", "list", "--state", "sleeping"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("unknown module state"));
}

#[test]
fn test_unreachable_api_fails() {
    let output = govctl(&["--api-url", "http://127.0.0.1:1", "modules", "list"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to send request"));
}

#[test]
fn test_modules_list_json_against_mock_server() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v1/modules")
        .match_query(mockito::Matcher::UrlEncoded(
            "state".into(),
            "running".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"module_id":"indexer","name":"Indexer","description":"","priority":3,"state":"running"}]"#,
        )
        .create();

    let output = govctl(&[
        "--api-url",
        &server.url(),
        "--format",
        "json",
        "modules",
        "list",
        "--state",
        "running",
    ]);
    mock.assert();

    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["module_id"], "indexer");
    assert_eq!(parsed[0]["state"], "running");
}

#[test]
fn test_not_found_is_reported() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/v1/ai-modules/ghost")
        .with_status(404)
        .with_body(r#"{"error":"AI module 'ghost' not found"}"#)
        .create();

    let output = govctl(&["--api-url", &server.url(), "ai-modules", "get", "ghost"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("404"));
}
