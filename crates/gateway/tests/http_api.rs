//! End-to-end tests for the HTTP surface against a real listener.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {serde_json::Value, tokio::net::TcpListener};

use {
    sandbar_config::DispatchConfig,
    sandbar_context::ContextStore,
    sandbar_dispatch::Dispatcher,
    sandbar_gateway::{GatewayState, build_gateway_app},
    sandbar_jobs::JobRegistry,
    sandbar_sandbox::{HostProvider, SandboxManager},
};

/// Start a gateway backed by host sandboxes under `root`.
async fn start_server(root: &std::path::Path) -> (SocketAddr, JobRegistry) {
    let sandboxes = SandboxManager::new(root.join("boxes"), Arc::new(HostProvider));
    let registry = JobRegistry::builder(
        Arc::new(Dispatcher::from_config(&DispatchConfig::default())),
        Arc::new(sandboxes),
    )
    .context(ContextStore::new(root.join("history.jsonl"), 1 << 20))
    .workers(2)
    .build();

    let app = build_gateway_app(GatewayState::new(registry.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, registry)
}

async fn schedule(addr: SocketAddr, kind: &str, code: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/schedule"))
        .json(&serde_json::json!({ "kind": kind, "code": code }))
        .send()
        .await
        .unwrap()
}

/// Poll `/status` until the job reaches a terminal state.
async fn poll_terminal(addr: SocketAddr, job_id: &str) -> Value {
    for _ in 0..100 {
        let body: Value = reqwest::get(format!("http://{addr}/status/{job_id}"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["state"] == "succeeded" || body["state"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {job_id} never finished");
}

#[tokio::test]
async fn schedule_and_status_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let (addr, _registry) = start_server(root.path()).await;

    let resp = schedule(addr, "shell", "echo over-http").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let status = poll_terminal(addr, &job_id).await;
    assert_eq!(status["state"], "succeeded");
    assert_eq!(status["stdout"], "over-http\n");
    assert_eq!(status["stderr"], "");
}

#[tokio::test]
async fn unknown_kind_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let (addr, _registry) = start_server(root.path()).await;

    let resp = schedule(addr, "fortran", "PRINT *, 'hi'").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unsupported job kind: fortran");

    let jobs: Value = reqwest::get(format!("http://{addr}/jobs"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let root = tempfile::tempdir().unwrap();
    let (addr, _registry) = start_server(root.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/schedule"))
        .header("content-type", "application/json")
        .body(r#"{"kind": "shell"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    let (addr, _registry) = start_server(root.path()).await;

    let resp = reqwest::get(format!("http://{addr}/status/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "job not found: does-not-exist");
}

#[tokio::test]
async fn jobs_and_context_listings() {
    let root = tempfile::tempdir().unwrap();
    let (addr, registry) = start_server(root.path()).await;

    let mut ids = Vec::new();
    for code in ["echo a", "echo b", "exit 3"] {
        let body: Value = schedule(addr, "shell", code).await.json().await.unwrap();
        ids.push(body["job_id"].as_str().unwrap().to_string());
    }
    for id in &ids {
        registry.wait(id).await.unwrap();
    }

    let jobs: Value = reqwest::get(format!("http://{addr}/jobs?limit=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], ids[2].as_str());
    assert_eq!(jobs[0]["state"], "failed");
    assert_eq!(jobs[0]["exit_code"], 3);

    let context: Value = reqwest::get(format!("http://{addr}/context"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(context.as_array().unwrap().len(), 6);

    let tail: Value = reqwest::get(format!("http://{addr}/context?tail=1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tail.as_array().unwrap().len(), 1);
    assert_eq!(tail[0]["role"], "assistant");
}

#[tokio::test]
async fn shutdown_rejects_new_jobs() {
    let root = tempfile::tempdir().unwrap();
    let (addr, registry) = start_server(root.path()).await;

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["accepting"], true);
    assert_eq!(health["workers"], 2);

    registry.shutdown().await;
    let resp = schedule(addr, "shell", "true").await;
    assert_eq!(resp.status(), 503);
}
