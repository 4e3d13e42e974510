#![cfg(feature = "cli")]

mod common;

use boost_service::adapters::server::{create_router, ServerState};
use boost_service::utils::monitor::SystemMonitor;
use boost_service::Stage;
use common::*;
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Serve the router on an ephemeral port and return its base URL.
async fn spawn_server(openai: &MockServer, github: &MockServer) -> String {
    let dispatcher = Arc::new(dispatcher(&service_config(Stage::Local, openai, github)));
    let app = create_router(ServerState::new(dispatcher, Arc::new(SystemMonitor::new(false))));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", address)
}

#[tokio::test]
async fn test_unknown_function_is_404_without_body() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let base = spawn_server(&openai, &github).await;

    let response = reqwest::Client::new()
        .post(format!("{}/does_not_exist", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_user_agent_becomes_client_version() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    openai.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(completion("It prints hi."));
    });
    let base = spawn_server(&openai, &github).await;
    let client = reqwest::Client::new();
    let body = authorized(json!({ "code": "print('hi')", "version": "ignored" }));

    // 沒有 User-Agent 時 version 會被清掉
    let without_agent = client
        .post(format!("{}/explain", base))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(without_agent.status(), 401);

    let with_agent = client
        .post(format!("{}/explain/extra/segments", base))
        .header("User-Agent", CLIENT_VERSION)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(with_agent.status(), 200);
    assert_eq!(
        with_agent.headers()["content-type"],
        "application/json"
    );
    let payload: Value = with_agent.json().await.unwrap();
    assert_eq!(payload["explanation"], "It prints hi.");
}

#[tokio::test]
async fn test_empty_and_invalid_bodies() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let base = spawn_server(&openai, &github).await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{}/explain", base))
        .header("User-Agent", CLIENT_VERSION)
        .send()
        .await
        .unwrap();
    // 空 body 視為 {}，缺 organization 所以要求升級
    assert_eq!(empty.status(), 401);

    let invalid = client
        .post(format!("{}/explain", base))
        .header("User-Agent", CLIENT_VERSION)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
    let payload: Value = invalid.json().await.unwrap();
    assert!(payload["error"].as_str().unwrap().contains("not valid JSON"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explain_client_prints_response_body() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let base = spawn_server(&openai, &github).await;

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_explain_client"))
        .args(["--url", &base])
        .output()
        .await
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/explain"));
    assert!(stdout.contains("401"));
    assert!(stdout.contains("please upgrade"));
}

#[tokio::test]
async fn test_explain_client_reports_connection_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let unused = listener.local_addr().unwrap();
    drop(listener);

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_explain_client"))
        .args(["--url", &format!("http://{}", unused)])
        .output()
        .await
        .unwrap();

    // 連線失敗屬於 Medium 嚴重度
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Request failed: Could not connect to the Boost service"));
    assert!(stderr.contains("Check network connectivity"));
}
