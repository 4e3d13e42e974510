use crate::domain::model::{Account, ChatMessage, FunctionCall};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Byte-oriented read access to prompt files (local directory or S3 bucket).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Who a session token belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionIdentity {
    pub email: Option<String>,
    pub username: Option<String>,
    pub organizations: Option<Vec<String>>,
}

impl SessionIdentity {
    pub fn belongs_to(&self, organization: &str) -> bool {
        self.organizations
            .as_ref()
            .is_some_and(|orgs| orgs.iter().any(|org| org == organization))
    }
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn identify(&self, session: &str) -> Result<SessionIdentity>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// `None` when the organization has no usable subscription.
    async fn check(&self, email: &str, organization: &str) -> Result<Option<Account>>;
}
