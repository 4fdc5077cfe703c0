//! Integration tests for the drill binary.
//!
//! These tests drive whole sessions through stdin:
//! - Completion with and without a review pass
//! - Exit confirmation and abandonment
//! - Config overrides and policy display

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a test directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the CLI with an isolated config home
fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("drill"));
    cmd.env("XDG_CONFIG_HOME", dir.path().join("config"));
    cmd.env("HOME", dir.path());
    cmd
}

fn write_exercises(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("exercises.json");
    fs::write(&path, json).expect("Failed to write exercises");
    path
}

const SESSION_PAYLOAD: &str = r#"{
    "session_id": 12,
    "exercises": [
        {
            "id": 1,
            "type": "multiple_choice",
            "question": "¿Cómo se dice agua?",
            "answer": "agua",
            "distractors": ["fuego", "tierra"],
            "word": "yaku",
            "translation": "agua"
        },
        {
            "id": 2,
            "type": "multiple_choice",
            "question": "¿Cómo se dice casa?",
            "answer": "casa",
            "distractors": ["sol", "luna"],
            "word": "wasi",
            "translation": "casa"
        }
    ]
}"#;

#[test]
fn test_cli_help() {
    let dir = setup_test_dir();
    cli(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vocabulary exercise session runner"));
}

#[test]
fn test_policy_shows_both_modes() {
    let dir = setup_test_dir();
    cli(&dir)
        .arg("policy")
        .assert()
        .success()
        .stdout(predicate::str::contains("detection"))
        .stdout(predicate::str::contains("max_attempts: 3"))
        .stdout(predicate::str::contains("practice"))
        .stdout(predicate::str::contains("max_attempts: 2"));
}

#[test]
fn test_policy_reads_config_override() {
    let dir = setup_test_dir();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[policy.practice]\nmax_attempts = 4\n").unwrap();

    cli(&dir)
        .args(["policy", "--mode", "practice", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts: 4"))
        .stdout(predicate::str::contains("detection").not());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = setup_test_dir();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[policy.detection]\nmax_attempts = 0\n").unwrap();

    cli(&dir)
        .arg("policy")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts must be at least 1"));
}

#[test]
fn test_all_correct_session_completes() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .arg("run")
        .arg("--exercises")
        .arg(&exercises)
        .arg("--instant")
        .write_stdin("agua\nCasa\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Correct!"))
        .stdout(predicate::str::contains("Session complete! (2/2)"))
        .stdout(predicate::str::contains("-- Review --").not());
}

#[test]
fn test_exhausted_exercise_is_reviewed() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .args(["run", "--mode", "practice", "--instant", "--exercises"])
        .arg(&exercises)
        .write_stdin("fuego\ntierra\ncasa\nagua\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Out of attempts!"))
        .stdout(predicate::str::contains("-- Review --"))
        .stdout(predicate::str::contains("Session complete!"));
}

#[test]
fn test_detection_mode_hides_incorrect_feedback() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .args(["run", "--mode", "detection", "--instant", "--exercises"])
        .arg(&exercises)
        .write_stdin("x\nx\nx\ncasa\nagua\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Out of attempts!").not())
        .stdout(predicate::str::contains("Session complete!"));
}

#[test]
fn test_quit_abandons_session() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .args(["run", "--instant", "--exercises"])
        .arg(&exercises)
        .write_stdin("agua\n:quit\ny\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("If you leave now"))
        .stdout(predicate::str::contains("Session abandoned."))
        .stdout(predicate::str::contains("Session complete!").not());
}

#[test]
fn test_declined_exit_keeps_session_running() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .args(["run", "--instant", "--exercises"])
        .arg(&exercises)
        .write_stdin(":quit\nn\nagua\ncasa\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session complete! (2/2)"));
}

#[test]
fn test_skip_defers_to_review() {
    let dir = setup_test_dir();
    // Bare array payload without a session id
    let exercises = write_exercises(
        &dir,
        r#"[
            {"id": 1, "type": "anagram", "question": "Unscramble: uaga", "answer": "agua"},
            {"id": 2, "type": "anagram", "question": "Unscramble: asac", "answer": "casa"}
        ]"#,
    );

    cli(&dir)
        .args(["run", "--instant", "--session-id", "99", "--exercises"])
        .arg(&exercises)
        .write_stdin(":skip\ncasa\nagua\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Review --"))
        .stdout(predicate::str::contains("Session complete!"));
}

#[test]
fn test_empty_payload_fails() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, "[]");

    cli(&dir)
        .args(["run", "--exercises"])
        .arg(&exercises)
        .assert()
        .failure()
        .stderr(predicate::str::contains("without exercises"));
}

#[test]
fn test_unknown_mode_fails() {
    let dir = setup_test_dir();
    let exercises = write_exercises(&dir, SESSION_PAYLOAD);

    cli(&dir)
        .args(["run", "--mode", "arcade", "--exercises"])
        .arg(&exercises)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown session mode"));
}
