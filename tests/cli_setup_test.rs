//! Integration tests for token setup and configuration handling.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use std::fs;

fn trello_token() -> String {
    "0123456789abcdef".repeat(4)
}

#[test]
fn test_setup_status_without_tokens() {
    let env = TestEnv::new();
    env.trellosa()
        .args(["-H", "setup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trello: not configured"))
        .stdout(predicate::str::contains("https://trello.com/1/authorize?key="))
        .stdout(predicate::str::contains(
            "https://bugzilla.mozilla.org/userprefs.cgi?tab=apikey",
        ));
}

#[test]
fn test_setup_stores_token_without_verification() {
    let env = TestEnv::new();
    env.trellosa()
        .args(["setup", "--no-verify", "--trello-token", &trello_token()])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""stored":["Trello"]"#))
        .stdout(predicate::str::contains(r#""source":"cli""#));

    let state = fs::read_to_string(env.path().join("state.kdl")).unwrap();
    assert!(state.contains(&trello_token()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(env.path().join("state.kdl"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    env.trellosa()
        .args(["-H", "setup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trello: 0123...cdef (from state)"));
}

#[test]
fn test_setup_rejects_malformed_token() {
    let env = TestEnv::new();
    env.trellosa()
        .args(["setup", "--no-verify", "--trello-token", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("64 alphanumeric"));
    assert!(!env.path().join("state.kdl").exists());
}

#[test]
fn test_env_token_takes_precedence_over_state() {
    let env = TestEnv::new();
    env.trellosa()
        .args(["setup", "--no-verify", "--trello-token", &trello_token()])
        .assert()
        .success();

    env.trellosa()
        .env("TRELLOSA_TRELLO_TOKEN", "f".repeat(64))
        .args(["setup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("env:TRELLOSA_TRELLO_TOKEN"))
        .stdout(predicate::str::contains("ffff...ffff"));
}

#[test]
fn test_pull_without_token_fails_cleanly() {
    let env = TestEnv::new();
    env.trellosa()
        .args(["pull"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#"{"error":"No Trello access token"#));
}

#[test]
fn test_config_output_format_human() {
    let env = TestEnv::new();
    fs::write(env.path().join("config.kdl"), "output-format \"human\"\n").unwrap();
    env.trellosa()
        .args(["log"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No snapshots stored"));
}

#[test]
fn test_invalid_config_is_reported() {
    let env = TestEnv::new();
    fs::write(env.path().join("config.kdl"), "board \"unterminated\n").unwrap();
    env.trellosa()
        .args(["log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}
