#![allow(dead_code)]

use boost_service::{build_dispatcher, FunctionDispatcher, ServiceConfig, Stage};
use httpmock::prelude::*;
use serde_json::{json, Value};

pub const SESSION: &str = "testemail: unittest@polytest.ai";
pub const ORGANIZATION: &str = "polytest.ai";
pub const CLIENT_VERSION: &str = "boost-vscode/0.9.5";

pub fn prompt_dir() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/prompts").to_string()
}

pub fn fixture(path: &str) -> String {
    let full = format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), path);
    std::fs::read_to_string(&full).unwrap_or_else(|e| panic!("fixture {}: {}", full, e))
}

/// GitHub rejects every token, so sessions fall back to `testemail:`.
pub fn github_rejecting_tokens() -> MockServer {
    let github = MockServer::start();
    github.mock(|when, then| {
        when.method(GET);
        then.status(401).json_body(json!({ "message": "Bad credentials" }));
    });
    github
}

pub fn service_config(stage: Stage, openai: &MockServer, github: &MockServer) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.service.stage = stage;
    config.openai.endpoint = openai.base_url();
    config.openai.api_key = "sk-test".to_string();
    config.github.api_url = github.base_url();
    config.storage.prompt_dir = prompt_dir();
    config
}

pub fn dispatcher(config: &ServiceConfig) -> FunctionDispatcher {
    build_dispatcher(config, None).unwrap()
}

/// API Gateway style event: JSON body as a string plus headers.
pub fn event(body: Value) -> Value {
    json!({
        "body": body.to_string(),
        "headers": { "User-Agent": CLIENT_VERSION },
    })
}

pub fn authorized(mut body: Value) -> Value {
    body["session"] = json!(SESSION);
    body["organization"] = json!(ORGANIZATION);
    body
}

pub fn completion(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

pub fn function_completion(name: &str, arguments: Value) -> Value {
    json!({
        "choices": [{ "message": {
            "role": "assistant",
            "content": null,
            "function_call": { "name": name, "arguments": arguments.to_string() }
        } }]
    })
}
