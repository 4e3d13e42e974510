use thiserror::Error;

/// 使用者可見的通用錯誤訊息（prod/staging 隱藏內部細節）
pub const GENERIC_SERVICE_FAILURE: &str =
    "Internal Boost Service error has occurred. Please retry or contact Boost Support if the error continues";

#[derive(Error, Debug)]
pub enum BoostError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Unauthorized {
        message: String,
        reason: UnauthorizedReason,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("LLM rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("Upstream service error: {message}")]
    Upstream { message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    UpgradeRequired,
    GitHubAccessNotFound,
    InvalidSubscriber,
    InvalidSession,
}

impl UnauthorizedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnauthorizedReason::UpgradeRequired => "UpgradeRequired",
            UnauthorizedReason::GitHubAccessNotFound => "GitHubAccessNotFound",
            UnauthorizedReason::InvalidSubscriber => "InvalidSubscriber",
            UnauthorizedReason::InvalidSession => "InvalidSession",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl BoostError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        BoostError::BadRequest {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>, reason: UnauthorizedReason) -> Self {
        BoostError::Unauthorized {
            message: message.into(),
            reason,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        BoostError::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            BoostError::BadRequest { .. } => 400,
            BoostError::Unauthorized { .. } => 401,
            BoostError::NotFound { .. } => 404,
            BoostError::RateLimited { .. } => 429,
            BoostError::Upstream { .. } | BoostError::HttpError(_) => 502,
            _ => 500,
        }
    }

    /// 服務本身的實作錯誤，而非呼叫端或上游造成
    pub fn is_implementation_failure(&self) -> bool {
        matches!(
            self,
            BoostError::IoError(_)
                | BoostError::SerializationError(_)
                | BoostError::ConfigError { .. }
                | BoostError::InvalidConfigValueError { .. }
                | BoostError::MissingConfigError { .. }
                | BoostError::Internal { .. }
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BoostError::BadRequest { .. } | BoostError::NotFound { .. } => ErrorSeverity::Low,
            BoostError::RateLimited { .. }
            | BoostError::Upstream { .. }
            | BoostError::HttpError(_) => ErrorSeverity::Medium,
            BoostError::Unauthorized { .. }
            | BoostError::ConfigError { .. }
            | BoostError::InvalidConfigValueError { .. }
            | BoostError::MissingConfigError { .. } => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            BoostError::HttpError(e) if e.is_connect() => {
                "Could not connect to the Boost service".to_string()
            }
            BoostError::HttpError(e) if e.is_timeout() => "The request timed out".to_string(),
            BoostError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid configuration for '{}': {}", field, reason)
            }
            BoostError::MissingConfigError { field } => {
                format!("Missing required configuration '{}'", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            BoostError::BadRequest { .. } => "Check the request fields for the selected function",
            BoostError::Unauthorized { reason, .. } => match reason {
                UnauthorizedReason::UpgradeRequired => {
                    "Send both 'version' and 'organization' with the request"
                }
                UnauthorizedReason::GitHubAccessNotFound => {
                    "Log in to GitHub and make sure the organization is one of your organizations"
                }
                UnauthorizedReason::InvalidSubscriber => "Subscribe the organization to the service",
                UnauthorizedReason::InvalidSession => "Send a GitHub session token with the request",
            },
            BoostError::NotFound { .. } => "Verify the function name or prompt file exists",
            BoostError::RateLimited { .. } => "Wait a minute and retry the request",
            BoostError::Upstream { .. } | BoostError::HttpError(_) => {
                "Check network connectivity and the upstream endpoint"
            }
            BoostError::ConfigError { .. }
            | BoostError::InvalidConfigValueError { .. }
            | BoostError::MissingConfigError { .. } => "Review the configuration file and environment",
            _ => "Retry the request; if it keeps failing, check the service logs",
        }
    }
}

pub type Result<T> = std::result::Result<T, BoostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BoostError::bad_request("x").status_code(), 400);
        assert_eq!(
            BoostError::unauthorized("x", UnauthorizedReason::UpgradeRequired).status_code(),
            401
        );
        assert_eq!(
            BoostError::RateLimited {
                message: "slow down".to_string()
            }
            .status_code(),
            429
        );
        assert_eq!(BoostError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_implementation_failures() {
        assert!(BoostError::internal("boom").is_implementation_failure());
        assert!(!BoostError::bad_request("missing code").is_implementation_failure());
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(BoostError::from(parse_error).is_implementation_failure());
    }
}
