//! End-to-end tests for the tack CLI.
//!
//! Tests invoke the `tack` binary as a subprocess and verify JSON output.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn tack() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tack"))
}

fn tack_in(dir: &Path) -> Command {
    let mut cmd = tack();
    cmd.current_dir(dir);
    cmd
}

fn init_board() -> TempDir {
    let dir = TempDir::new().unwrap();
    let output = tack_in(dir.path()).arg("init").output().unwrap();
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    dir
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn post(dir: &Path, subject: &str, body: &str) -> serde_json::Value {
    let output = tack_in(dir)
        .args(["post", "--subject", subject, "--body", body])
        .output()
        .unwrap();
    json(&output)
}

// === Init ===

#[test]
fn e2e_init_creates_board_structure() {
    let dir = TempDir::new().unwrap();
    let output = tack_in(dir.path()).arg("init").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Initialized tack board"));

    assert!(dir.path().join("articles").is_dir());
    assert!(dir.path().join(".tack").join("config.toml").is_file());
    assert!(dir.path().join(".tack").join("index.db").is_file());
}

#[test]
fn e2e_commands_refuse_uninitialized_root() {
    let dir = TempDir::new().unwrap();
    let output = tack_in(dir.path()).arg("list").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("tack init"));
}

// === Post ===

#[test]
fn e2e_post_numbers_articles_sequentially() {
    let dir = init_board();
    let first = post(dir.path(), "Hello", "World");
    assert_eq!(first["dir"], 1);
    let second = post(dir.path(), "Second", "Post");
    assert_eq!(second["dir"], 2);

    let html = std::fs::read_to_string(dir.path().join("articles/1/index.html")).unwrap();
    assert!(html.contains("World"));
    assert!(html.contains("<!-- REPLIES END -->"));
}

#[test]
fn e2e_post_rejects_long_subject_with_user_error() {
    let dir = init_board();
    let output = tack_in(dir.path())
        .args(["post", "--subject", &"x".repeat(21), "--body", "text"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("limit is 20"));
    assert!(!dir.path().join("articles/1").exists());
}

#[test]
fn e2e_post_with_media_file() {
    let dir = init_board();
    let image = dir.path().join("pic.gif");
    std::fs::write(&image, b"GIF89a\x01\x00\x01\x00").unwrap();

    let output = tack_in(dir.path())
        .args(["post", "--subject", "Pic", "--body", "look"])
        .arg("--media")
        .arg(&image)
        .output()
        .unwrap();
    let result = json(&output);
    assert_eq!(result["dir"], 1);
    assert!(dir.path().join("articles/1/media.gif").is_file());
}

#[test]
fn e2e_post_rejects_unsupported_media() {
    let dir = init_board();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "plain text").unwrap();

    let output = tack_in(dir.path())
        .args(["post", "--subject", "Doc", "--body", "see file"])
        .arg("--media")
        .arg(&file)
        .args(["--media-type", "text/plain"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported file type"));
}

// === Reply + List ===

#[test]
fn e2e_reply_bumps_article_to_top_of_listing() {
    let dir = init_board();
    post(dir.path(), "Older", "first");
    post(dir.path(), "Newer", "second");

    let output = tack_in(dir.path())
        .args(["reply", "1", "--text", "Nice post!"])
        .output()
        .unwrap();
    let reply = json(&output);
    assert_eq!(reply["dir"], 1);

    let html = std::fs::read_to_string(dir.path().join("articles/1/index.html")).unwrap();
    assert!(html.contains("<p>Nice post!</p>"));

    let output = tack_in(dir.path()).arg("list").output().unwrap();
    let listed = json(&output);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["dir"], 1);
    assert_eq!(listed[0]["subject"], "Older");
}

#[test]
fn e2e_reply_to_missing_article_is_not_found() {
    let dir = init_board();
    let output = tack_in(dir.path())
        .args(["reply", "7", "--text", "anyone?"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Article not found."));
}

#[test]
fn e2e_list_table_format() {
    let dir = init_board();
    post(dir.path(), "Alpha", "a");

    let output = tack_in(dir.path())
        .args(["list", "--format", "table"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("---"));
    assert!(stdout.contains("Alpha"));
}

#[test]
fn e2e_show_prints_row() {
    let dir = init_board();
    post(dir.path(), "Alpha", "a");

    let output = tack_in(dir.path()).args(["show", "1"]).output().unwrap();
    let shown = json(&output);
    assert_eq!(shown["subject"], "Alpha");
    assert_eq!(shown["created_at"], shown["updated_at"]);
    assert_eq!(shown["replies"], 0);

    let output = tack_in(dir.path())
        .args(["reply", "1", "--text", "first!"])
        .output()
        .unwrap();
    json(&output);
    let shown = json(&tack_in(dir.path()).args(["show", "1"]).output().unwrap());
    assert_eq!(shown["replies"], 1);
}

// === Reindex + Install ===

#[test]
fn e2e_install_rebuilds_lost_index() {
    let dir = init_board();
    post(dir.path(), "Alpha", "a");
    post(dir.path(), "Beta", "b");

    let state = dir.path().join(".tack");
    std::fs::remove_file(state.join("index.db")).unwrap();
    for leftover in ["index.db-wal", "index.db-shm"] {
        let _ = std::fs::remove_file(state.join(leftover));
    }

    let report = json(&tack_in(dir.path()).arg("install").output().unwrap());
    assert_eq!(report["imported"], 2);
    assert_eq!(report["skipped"], 0);

    let stats = json(&tack_in(dir.path()).arg("stats").output().unwrap());
    assert_eq!(stats["articles"], 2);
    assert_eq!(stats["containers"], 2);
    assert_eq!(stats["max_dir"], 2);
}

#[test]
fn e2e_reindex_skips_corrupt_sidecar() {
    let dir = init_board();
    post(dir.path(), "Alpha", "a");
    post(dir.path(), "Beta", "b");
    std::fs::write(dir.path().join("articles/2/metadata.json"), "{").unwrap();

    let report = json(&tack_in(dir.path()).arg("reindex").output().unwrap());
    assert_eq!(report["imported"], 1);
    assert_eq!(report["skipped"], 1);
}

// === Completions ===

#[test]
fn e2e_completions_generate_script() {
    let output = tack().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tack"));
}
