//! End-to-end tests using the actual git CLI
//!
//! A real server with `git http-backend` behind it: create over the JSON API,
//! clone, commit, push, read the push log, clone again.

use gitgate::{GitGateServer, HttpBackend, RepoStore};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;

const ZERO_ID: &str = "0000000000000000000000000000000000000000";

/// Check if git is available
fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git command with timeout
fn run_git_with_timeout(args: &[&str], cwd: &Path, timeout_secs: u64) -> std::io::Result<Output> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    loop {
        if child.try_wait()?.is_some() {
            return child.wait_with_output();
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("git command timed out after {}s", timeout_secs),
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn git(args: &[&str], cwd: &Path) -> String {
    let output = run_git_with_timeout(args, cwd, 30).unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

async fn start_server(root: &Path) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let store = RepoStore::open(root)
        .unwrap()
        .with_public_url(format!("http://{}", addr));
    let server = GitGateServer::new(
        Arc::new(store),
        Arc::new(HttpBackend::new("git")),
        addr.to_string(),
    );

    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

fn commit_file(work: &Path, file: &str, content: &str, message: &str) -> String {
    std::fs::write(work.join(file), content).unwrap();
    git(&["add", file], work);
    git(
        &[
            "-c", "user.email=test@test.com",
            "-c", "user.name=Test",
            "-c", "commit.gpgsign=false",
            "commit", "-m", message,
        ],
        work,
    );
    git(&["rev-parse", "HEAD"], work)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_push_clone_roundtrip() {
    if !git_available() {
        eprintln!("git not available, skipping test");
        return;
    }

    let server_dir = tempdir().unwrap();
    let addr = start_server(&server_dir.path().join("repos")).await;
    let client = reqwest::Client::new();

    // Create gov/portal
    let response = client
        .post(format!("http://{}/repos", addr))
        .json(&json!({ "org": "gov", "name": "portal" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let repo: Value = response.json().await.unwrap();
    let url = repo["clone_url_http"].as_str().unwrap().to_string();
    assert_eq!(url, format!("http://{}/gov/portal.git", addr));
    assert!(repo["path"].as_str().unwrap().ends_with("gov/portal.git"));

    // No pushes yet: a note, not an error
    let log: Value = client
        .get(format!("http://{}/repos/gov/portal/pushlog", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(log["pushes"], "");
    assert_eq!(log["note"], "No pushes logged yet");
    assert_eq!(log["entries"], json!([]));

    // Clone the empty repository, commit, push main
    let work_dir = tempdir().unwrap();
    git(&["clone", &url, "work"], work_dir.path());
    let work = work_dir.path().join("work");
    git(&["symbolic-ref", "HEAD", "refs/heads/main"], &work);
    let commit = commit_file(&work, "README.md", "# portal\n", "Initial commit");

    git(
        &["-c", "http.extraHeader=X-Pusher-Name: alice", "push", "origin", "main"],
        &work,
    );

    // Exactly one block with the transition we made
    let log: Value = client
        .get(format!("http://{}/repos/gov/portal/pushlog", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(log.get("note").is_none());
    let pushes = log["pushes"].as_str().unwrap();
    assert_eq!(pushes.matches("=== PUSH ===").count(), 1);
    assert!(pushes.contains(&format!("main {} -> {}", ZERO_ID, commit)));
    assert!(pushes.contains("pusher=alice"));

    let entries = log["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["pusher"], "alice");
    assert_eq!(
        entries[0]["updates"],
        json!([{ "ref_name": "refs/heads/main", "old_id": ZERO_ID, "new_id": commit }])
    );

    // A fresh clone sees the same content and refs
    let clone_dir = tempdir().unwrap();
    git(&["clone", &url, "cloned"], clone_dir.path());
    let cloned = clone_dir.path().join("cloned");
    assert_eq!(
        std::fs::read_to_string(cloned.join("README.md")).unwrap(),
        "# portal\n"
    );
    assert_eq!(git(&["rev-parse", "HEAD"], &cloned), commit);
    assert_eq!(git(&["rev-parse", "--abbrev-ref", "HEAD"], &cloned), "main");

    // Second push without an identity
    let second = commit_file(&work, "CHANGELOG.md", "v2\n", "Second commit");
    git(&["push", "origin", "main"], &work);

    let log: Value = client
        .get(format!("http://{}/repos/gov/portal/pushlog", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = log["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["pusher"], "unknown");
    assert_eq!(entries[1]["updates"][0]["old_id"], commit);
    assert_eq!(entries[1]["updates"][0]["new_id"], second);

    // Fetch picks up the second commit
    let cloned_head = {
        git(&["pull", "--ff-only", "origin", "main"], &cloned);
        git(&["rev-parse", "HEAD"], &cloned)
    };
    assert_eq!(cloned_head, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repository_api_errors() {
    if !git_available() {
        eprintln!("git not available, skipping test");
        return;
    }

    let server_dir = tempdir().unwrap();
    let root = server_dir.path().join("repos");
    let addr = start_server(&root).await;
    let client = reqwest::Client::new();

    let create = |org: &str, name: &str| {
        client
            .post(format!("http://{}/repos", addr))
            .json(&json!({ "org": org, "name": name }))
            .send()
    };

    assert_eq!(create("gov", "portal").await.unwrap().status(), 201);

    let conflict = create("gov", "portal").await.unwrap();
    assert_eq!(conflict.status(), 409);
    let body: Value = conflict.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    for (org, name) in [("..", "portal"), ("gov", "a/b"), ("gov", ""), ("g v", "x")] {
        let response = create(org, name).await.unwrap();
        assert_eq!(response.status(), 400, "{:?}/{:?}", org, name);
    }

    assert_eq!(create("health", "records").await.unwrap().status(), 201);

    let list: Value = client
        .get(format!("http://{}/repos", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<String> = list["repos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| format!("{}/{}", r["org"].as_str().unwrap(), r["name"].as_str().unwrap()))
        .collect();
    assert_eq!(names, vec!["gov/portal", "health/records"]);

    // Cloning an unknown repository reports not found without creating it
    let work_dir = tempdir().unwrap();
    let output = run_git_with_timeout(
        &["clone", &format!("http://{}/gov/missing.git", addr), "missing"],
        work_dir.path(),
        30,
    )
    .unwrap();
    assert!(!output.status.success());
    assert!(!root.join("gov").join("missing.git").exists());

    // ls-remote against an empty repository succeeds
    let output = run_git_with_timeout(
        &["ls-remote", &format!("http://{}/gov/portal.git", addr)],
        work_dir.path(),
        30,
    )
    .unwrap();
    assert!(
        output.status.success(),
        "ls-remote failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
