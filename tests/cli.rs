mod common;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

use common::{spawn_fake_gemini, write_config, write_corpus};

const KEY_ENV: &str = "GCHAT_TEST_API_KEY";

fn gchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("gchat");
    path
}

fn run_gchat(
    cwd: &Path,
    config_path: &Path,
    args: &[&str],
    key: Option<&str>,
) -> (String, String, bool) {
    let binary = gchat_binary();
    let mut cmd = Command::new(&binary);
    cmd.current_dir(cwd)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove(KEY_ENV)
        .env("RUST_LOG", "info");
    if let Some(key) = key {
        cmd.env(KEY_ENV, key);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

async fn run_gchat_async(
    cwd: PathBuf,
    config_path: PathBuf,
    args: Vec<String>,
    key: Option<String>,
) -> (String, String, bool) {
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_gchat(&cwd, &config_path, &args, key.as_deref())
    })
    .await
    .unwrap()
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_init_writes_example_config() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config/chat.toml");

    let (stdout, stderr, success) = run_gchat(tmp.path(), &config_path, &["init"], None);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Wrote"));
    let written = std::fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("chunk_size = 300"));
    assert!(tmp.path().join("data").is_dir());

    let (_, stderr, success) = run_gchat(tmp.path(), &config_path, &["init"], None);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_missing_credential_is_fatal() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config_path = write_config(tmp.path(), "http://127.0.0.1:9", KEY_ENV);

    let (_, stderr, success) = run_gchat(tmp.path(), &config_path, &["ask", "Program X?"], None);
    assert!(!success);
    assert!(stderr.contains(KEY_ENV), "stderr: {}", stderr);
}

#[test]
fn test_missing_data_dir_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "http://127.0.0.1:9", KEY_ENV);

    let (_, stderr, success) = run_gchat(tmp.path(), &config_path, &["index"], Some("k"));
    assert!(!success);
    assert!(stderr.contains("data directory does not exist"), "stderr: {}", stderr);
}

#[test]
fn test_empty_data_dir_is_fatal() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    let config_path = write_config(tmp.path(), "http://127.0.0.1:9", KEY_ENV);

    let (_, stderr, success) = run_gchat(tmp.path(), &config_path, &["index"], Some("k"));
    assert!(!success);
    assert!(stderr.contains("no documents found"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("chat.toml");
    std::fs::write(
        &config_path,
        "[data]\nroot = \"data\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
    )
    .unwrap();

    let (_, stderr, success) = run_gchat(tmp.path(), &config_path, &["status"], None);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

#[test]
fn test_status_before_index() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "http://127.0.0.1:9", KEY_ENV);

    let (stdout, stderr, success) = run_gchat(tmp.path(), &config_path, &["status"], None);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("not built"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_index_is_idempotent() {
    let (base_url, stats) = spawn_fake_gemini().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config_path = write_config(tmp.path(), &base_url, KEY_ENV);
    let cwd = tmp.path().to_path_buf();
    let key = Some("test-key".to_string());

    let (stdout, stderr, success) =
        run_gchat_async(cwd.clone(), config_path.clone(), args(&["index"]), key.clone()).await;
    assert!(success, "index failed: {}", stderr);
    assert!(
        stdout.contains("Indexed 4 passages (4 embedded, 0 reused, 0 pruned)"),
        "stdout: {}",
        stdout
    );
    assert!(stderr.contains("Loaded 2 Markdown documents."));
    assert!(stderr.contains("Loaded 1 Text documents."));
    let embeds_after_first = stats.embed_requests.load(Ordering::SeqCst);

    let (stdout, _, success) =
        run_gchat_async(cwd.clone(), config_path.clone(), args(&["index"]), key.clone()).await;
    assert!(success);
    assert!(stdout.contains("(0 embedded, 4 reused, 0 pruned)"), "stdout: {}", stdout);
    assert_eq!(stats.embed_requests.load(Ordering::SeqCst), embeds_after_first);

    let (stdout, _, success) = run_gchat_async(
        cwd.clone(),
        config_path.clone(),
        args(&["index", "--rebuild"]),
        key.clone(),
    )
    .await;
    assert!(success);
    assert!(stdout.contains("(4 embedded, 0 reused, 0 pruned)"), "stdout: {}", stdout);

    let (stdout, _, success) =
        run_gchat_async(cwd, config_path, args(&["status"]), key).await;
    assert!(success);
    assert!(stdout.contains("Passages:    4"), "stdout: {}", stdout);
    assert!(stdout.contains("Documents:   3"), "stdout: {}", stdout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ask_streams_grounded_answer() {
    let (base_url, stats) = spawn_fake_gemini().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config_path = write_config(tmp.path(), &base_url, KEY_ENV);

    let (stdout, stderr, success) = run_gchat_async(
        tmp.path().to_path_buf(),
        config_path,
        args(&["ask", "How much does Program X cost?"]),
        Some("test-key".to_string()),
    )
    .await;
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(stdout.trim(), "Program X costs $500.");
    assert_eq!(stats.generate_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_search_prints_ranked_passages() {
    let (base_url, _stats) = spawn_fake_gemini().await;
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let config_path = write_config(tmp.path(), &base_url, KEY_ENV);

    let (stdout, stderr, success) = run_gchat_async(
        tmp.path().to_path_buf(),
        config_path,
        args(&["search", "Program X costs", "--k", "2"]),
        Some("test-key".to_string()),
    )
    .await;
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
    assert!(stdout.contains("pricing.md"));
}
