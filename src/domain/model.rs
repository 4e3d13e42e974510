use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::BoostError;

/// Deployment stage; drives prompt lookup order and error masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dev,
    Test,
    Staging,
    Prod,
    #[default]
    Local,
}

impl Stage {
    /// 搜尋順序：由目前 stage 往後找，最後落到 local
    pub const SEARCH_ORDER: [Stage; 5] = [
        Stage::Dev,
        Stage::Test,
        Stage::Staging,
        Stage::Prod,
        Stage::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Dev => "dev",
            Stage::Test => "test",
            Stage::Staging => "staging",
            Stage::Prod => "prod",
            Stage::Local => "local",
        }
    }

    pub fn search_path(&self) -> &'static [Stage] {
        let start = Self::SEARCH_ORDER
            .iter()
            .position(|stage| stage == self)
            .unwrap_or(Self::SEARCH_ORDER.len() - 1);
        &Self::SEARCH_ORDER[start..]
    }

    pub fn masks_internal_errors(&self) -> bool {
        matches!(self, Stage::Prod | Stage::Staging)
    }

    pub fn exposes_error_details(&self) -> bool {
        matches!(self, Stage::Dev | Stage::Test)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Stage::Dev),
            "test" => Ok(Stage::Test),
            "staging" => Ok(Stage::Staging),
            "prod" => Ok(Stage::Prod),
            "local" => Ok(Stage::Local),
            other => Err(BoostError::InvalidConfigValueError {
                field: "stage".to_string(),
                value: other.to_string(),
                reason: "Expected one of dev, test, staging, prod, local".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Trial,
    Paid,
    Suspended,
}

impl AccountStatus {
    pub fn is_usable(&self) -> bool {
        !matches!(self, AccountStatus::Suspended)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub email: Option<String>,
    pub organization: String,
    pub status: AccountStatus,
}

/// Result of one analysis run, after chunks are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub output: String,
    pub truncated: bool,
    pub chunked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Bugsfound,
    Nobugsfound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub status: ReportStatus,
    pub details: Vec<Bug>,
}

/// Lambda-style response envelope shared by the dev server and the Lambda binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FunctionResponse {
    pub fn json(status_code: u16, api_version: &str, body: &serde_json::Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("X-API-Version".to_string(), api_version.to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    pub fn error(status_code: u16, api_version: &str, message: &str) -> Self {
        Self::json(
            status_code,
            api_version,
            &serde_json::json!({ "error": message }),
        )
    }

    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}
