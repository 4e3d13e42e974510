mod common;

use boost_service::utils::error::GENERIC_SERVICE_FAILURE;
use boost_service::{Stage, FunctionResponse};
use common::*;
use httpmock::prelude::*;
use serde_json::json;

fn error_of(response: &FunctionResponse) -> String {
    response.body_json().unwrap()["error"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_explain_end_to_end() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let completion_mock = openai.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("authorization", "Bearer sk-test")
            .json_body_partial(r#"{"model": "gpt-4"}"#)
            .body_contains("def add(a, b)");
        then.status(200).json_body(completion("It adds two numbers."));
    });

    let dispatcher = dispatcher(&service_config(Stage::Local, &openai, &github));
    let response = dispatcher
        .invoke(
            "explain",
            event(authorized(json!({ "code": "def add(a, b):\n    return a + b" }))),
        )
        .await;

    completion_mock.assert();
    assert_eq!(response.status_code, 200);
    assert!(response.headers.contains_key("X-API-Version"));
    let body = response.body_json().unwrap();
    assert_eq!(body["explanation"], "It adds two numbers.");
    assert_eq!(body["truncated"], false);
    assert_eq!(body["chunked"], false);
}

#[tokio::test]
async fn test_missing_version_asks_for_upgrade() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let dispatcher = dispatcher(&service_config(Stage::Local, &openai, &github));

    // 沒有 User-Agent header 也沒有 version 欄位
    let body = authorized(json!({ "code": "x = 1" }));
    let response = dispatcher
        .invoke("explain", json!({ "body": body.to_string() }))
        .await;

    assert_eq!(response.status_code, 401);
    assert!(error_of(&response).contains("please upgrade"));
}

#[tokio::test]
async fn test_organization_outside_session_is_rejected() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let dispatcher = dispatcher(&service_config(Stage::Local, &openai, &github));

    let mut body = authorized(json!({ "code": "x = 1" }));
    body["organization"] = json!("someone-else.org");
    let response = dispatcher.invoke("analyze", event(body)).await;

    assert_eq!(response.status_code, 401);
    assert!(error_of(&response).contains("login to github"));
}

#[tokio::test]
async fn test_unsubscribed_organization_is_rejected() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let mut config = service_config(Stage::Local, &openai, &github);
    config.subscriptions.auto_enroll = false;

    let response = dispatcher(&config)
        .invoke("explain", event(authorized(json!({ "code": "x = 1" }))))
        .await;

    assert_eq!(response.status_code, 401);
    assert!(error_of(&response).contains("subscribe"));
}

#[tokio::test]
async fn test_missing_code_is_a_bad_request() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let never_called = openai.mock(|when, then| {
        when.method(POST);
        then.status(200).json_body(completion("unused"));
    });

    let response = dispatcher(&service_config(Stage::Local, &openai, &github))
        .invoke("explain", event(authorized(json!({}))))
        .await;

    assert_eq!(response.status_code, 400);
    never_called.assert_hits(0);
}

#[tokio::test]
async fn test_unknown_function() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let dispatcher = dispatcher(&service_config(Stage::Local, &openai, &github));

    assert!(!dispatcher.knows("bogus"));
    let response = dispatcher.invoke("bogus", event(authorized(json!({})))).await;
    assert_eq!(response.status_code, 404);
}

#[tokio::test]
async fn test_implementation_failures_are_masked_in_prod() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    openai.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401).body("invalid api key");
    });

    let body = authorized(json!({ "code": "x = 1" }));

    let prod = dispatcher(&service_config(Stage::Prod, &openai, &github))
        .invoke("explain", event(body.clone()))
        .await;
    assert_eq!(prod.status_code, 500);
    assert_eq!(error_of(&prod), GENERIC_SERVICE_FAILURE);

    let dev = dispatcher(&service_config(Stage::Dev, &openai, &github))
        .invoke("explain", event(body))
        .await;
    assert_eq!(dev.status_code, 500);
    assert!(error_of(&dev).contains("OpenAI authentication failed"));
}

#[tokio::test]
async fn test_rate_limit_is_reported_to_caller() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    openai.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(429).body("Rate limit reached for gpt-4");
    });

    let response = dispatcher(&service_config(Stage::Prod, &openai, &github))
        .invoke("explain", event(authorized(json!({ "code": "x = 1" }))))
        .await;

    assert_eq!(response.status_code, 429);
    assert!(error_of(&response).contains("Rate limit"));
}

#[tokio::test]
async fn test_user_organizations() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();
    let dispatcher = dispatcher(&service_config(Stage::Local, &openai, &github));

    let response = dispatcher
        .invoke(
            "user_organizations",
            event(json!({ "session": SESSION })),
        )
        .await;

    assert_eq!(response.status_code, 200);
    let body = response.body_json().unwrap();
    assert_eq!(body["organizations"], json!([ORGANIZATION]));
    assert_eq!(body["email"], "unittest@polytest.ai");
    assert!(dispatcher.functions().contains(&"user_organizations"));
}

#[tokio::test]
async fn test_user_organizations_requires_session() {
    let openai = MockServer::start();
    let github = github_rejecting_tokens();

    let response = dispatcher(&service_config(Stage::Local, &openai, &github))
        .invoke("user_organizations", event(json!({})))
        .await;

    assert_eq!(response.status_code, 401);
}
