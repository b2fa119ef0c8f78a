//! Tests for the REST API surface.
//! Spins up the server on a random port and drives it with reqwest.

use std::sync::Arc;

use graded::config::Config;
use graded::rest::build_router;
use graded::AppContext;
use serde_json::{json, Value};

/// Find a free local port by binding to port 0.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_server() -> String {
    let port = find_free_port();
    let ctx = Arc::new(AppContext::new(Config::default()));
    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn health_reports_ok() {
    let base = start_server().await;
    let body: Value = reqwest::get(format!("{base}/api/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["instance_id"].is_string());
}

#[tokio::test]
async fn eval_round_trip_returns_result_json() {
    let base = start_server().await;
    let request = json!({
        "task": {
            "tests": [
                {"id": "h1", "code": "document.querySelector('h1') !== null"},
                {"id": "h2", "code": "document.querySelector('h2') !== null",
                 "failureMessage": "Add an h2"}
            ]
        },
        "files": {"index.html": "<h1>Hello</h1>"}
    });

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/eval"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["passed"], false);
    assert_eq!(body["passedIds"][0], "h1");
    assert_eq!(body["failedIds"][0], "h2");
    assert_eq!(body["messages"]["h2"], "Add an h2");
    assert_eq!(body["testLabels"]["h1"], "h1");
    assert_eq!(body["errorDetails"]["h2"]["errorType"], "assertion");
}

#[tokio::test]
async fn missing_task_or_files_is_a_400_with_degenerate_result() {
    let base = start_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/eval"))
        .json(&json!({"files": {"index.html": "<p></p>"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["passed"], false);
    assert_eq!(body["messages"]["error"], "Missing task or files");
    assert!(body["passedIds"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn remote_eval_without_credentials_reports_api_error() {
    let base = start_server().await;
    let request = json!({
        "task": {"tests": [{"id": "a", "code": "true"}]},
        "files": {"main.js": "var ok = true;"}
    });

    let response = reqwest::Client::new()
        .post(format!("{base}/api/v1/eval/remote"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["passed"], false);
    assert_eq!(body["failedIds"][0], "a");
    assert!(body["messages"]["_api_error"]
        .as_str()
        .unwrap()
        .contains("not configured"));
}
