use crate::domain::ports::{ChatCompletion, CompletionRequest, CompletionResponse};
use crate::utils::error::{BoostError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: CompletionResponse,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            url,
            request.model
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => BoostError::RateLimited {
                    message: error_text,
                },
                StatusCode::UNAUTHORIZED => BoostError::ConfigError {
                    message: "OpenAI authentication failed (check OPENAI_API_KEY)".to_string(),
                },
                _ => BoostError::Upstream {
                    message: format!("OpenAI HTTP {}: {}", status, error_text),
                },
            });
        }

        let body: ChatCompletionBody = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| BoostError::Upstream {
                message: "OpenAI returned no choices".to_string(),
            })
    }
}
