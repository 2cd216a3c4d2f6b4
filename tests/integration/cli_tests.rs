//! Integration tests for the CLI binary.
//!
//! This test is registered as a [[test]] in the chatvault-cli crate so that
//! CARGO_BIN_EXE_cvault is available.

use std::path::Path;
use std::process::{Command, Output};

const MASTER: &str = "Correct-Horse-Battery-7";

/// Get a Command pointing to the `cvault` binary.
fn cvault_binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cvault"))
}

/// Run `cvault` against an isolated data root with cheap KDF parameters.
fn cvault(home: &Path, args: &[&str]) -> Output {
    cvault_binary()
        .env("CHATVAULT_HOME", home)
        .env("CHATVAULT_KDF", "argon2id$m=8,t=1,p=1")
        .env("CHATVAULT_MASTER", MASTER)
        .env("CHATVAULT_EXPORT_PASSPHRASE", "Export-Phrase-2024!")
        .args(args)
        .output()
        .expect("failed to execute cvault")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "cvault failed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn cli_responds_to_help() {
    let output = cvault_binary()
        .arg("--help")
        .output()
        .expect("failed to execute cvault --help");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(
        out.contains("cvault") || out.contains("Usage"),
        "cvault --help output should contain usage information, got: {out}"
    );
}

#[test]
fn cli_responds_to_version() {
    let output = cvault_binary()
        .arg("--version")
        .output()
        .expect("failed to execute cvault --version");

    assert!(output.status.success());
    assert!(stdout(&output).contains("0.2"));
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = cvault_binary()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute cvault");
    assert!(!output.status.success());
}

#[test]
fn cli_user_and_history_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();

    assert_ok(&cvault(home, &["user", "add", "--name", "Ann", "--credential", "sk-ann-123456"]));
    assert_ok(&cvault(home, &["user", "add", "--name", "Bob", "--credential", "sk-bob-123456"]));

    let list = cvault(home, &["user", "list"]);
    assert_ok(&list);
    let out = stdout(&list);
    assert!(out.contains("Ann"));
    assert!(out.contains("* Bob"));

    assert_ok(&cvault(home, &["user", "use", "ann"]));
    let whoami = cvault(home, &["user", "whoami"]);
    assert_ok(&whoami);
    assert!(stdout(&whoami).starts_with("Ann ("));

    let key = cvault(home, &["user", "key"]);
    assert_ok(&key);
    assert!(!stdout(&key).contains("sk-ann-123456"));
    let key = cvault(home, &["user", "key", "--show"]);
    assert!(stdout(&key).contains("sk-ann-123456"));

    assert_ok(&cvault(home, &["history", "append", "hello world"]));
    assert_ok(&cvault(home, &["history", "append", "--role", "assistant", "hi Ann"]));
    assert_ok(&cvault(home, &["history", "append", "hello again"]));

    let tail = cvault(home, &["history", "tail", "-n", "2"]);
    assert_ok(&tail);
    let out = stdout(&tail);
    assert_eq!(out.lines().count(), 2);
    assert!(out.lines().last().unwrap().ends_with("user: hello again"));

    let search = cvault(home, &["history", "search", "hello"]);
    assert_ok(&search);
    assert_eq!(stdout(&search).lines().filter(|l| l.starts_with('#')).count(), 2);

    // Bob's history is separate.
    let tail = cvault(home, &["history", "--user", "Bob", "tail"]);
    assert_ok(&tail);
    assert!(stdout(&tail).is_empty());
}

#[test]
fn cli_export_import() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("data");
    let dump = dir.path().join("dump.json");
    let plain = dir.path().join("dump.jsonl");

    assert_ok(&cvault(&home, &["user", "add", "--name", "Ann", "--credential", "k"]));
    assert_ok(&cvault(&home, &["history", "append", "keep me"]));

    let dump_str = dump.to_str().unwrap();
    assert_ok(&cvault(&home, &["history", "export", dump_str]));
    assert!(!std::fs::read_to_string(&dump).unwrap().contains("keep me"));

    // Plaintext needs explicit confirmation.
    let plain_str = plain.to_str().unwrap();
    assert!(!cvault(&home, &["history", "export", plain_str, "--plain"]).status.success());
    assert_ok(&cvault(&home, &["history", "export", plain_str, "--plain", "--yes"]));
    assert!(std::fs::read_to_string(&plain).unwrap().contains("keep me"));

    let preview = cvault(&home, &["history", "preview", dump_str]);
    assert_ok(&preview);
    assert!(stdout(&preview).starts_with("1 records"));

    assert_ok(&cvault(&home, &["history", "reset", "--yes"]));
    let import = cvault(&home, &["history", "import", dump_str]);
    assert_ok(&import);
    assert!(stdout(&import).contains("Imported 1 records"));

    let tail = cvault(&home, &["history", "tail"]);
    assert!(stdout(&tail).contains("keep me"));
}

#[test]
fn cli_wrong_passphrase_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();
    assert_ok(&cvault(home, &["user", "add", "--name", "Ann", "--credential", "k"]));

    let output = cvault_binary()
        .env("CHATVAULT_HOME", home)
        .env("CHATVAULT_KDF", "argon2id$m=8,t=1,p=1")
        .env("CHATVAULT_MASTER", "Wrong-Horse-Battery-7")
        .args(["user", "key"])
        .output()
        .expect("failed to execute cvault");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wrong passphrase"));
}

#[test]
fn cli_prune_and_wipe() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();
    assert_ok(&cvault(home, &["user", "add", "--name", "Ann", "--credential", "k1"]));
    std::fs::create_dir_all(home.join("users").join("stray")).unwrap();

    let prune = cvault(home, &["user", "prune"]);
    assert_ok(&prune);
    assert!(stdout(&prune).contains("Removed 1 orphaned directories"));
    assert!(!home.join("users").join("stray").exists());

    let refused = cvault(home, &["user", "wipe"]);
    assert!(!refused.status.success());

    assert_ok(&cvault(home, &["user", "wipe", "--yes"]));
    let list = cvault(home, &["user", "list"]);
    assert_ok(&list);
    assert!(!stdout(&list).contains("Ann"));

    assert_ok(&cvault(home, &["user", "wipe", "--hard", "--yes"]));
    assert!(!home.join("secrets.conf").exists());
}
