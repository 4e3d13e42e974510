use crate::domain::model::{AccountStatus, Stage};
use crate::utils::error::{BoostError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Service configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub openai: OpenAiConfig,
    pub github: GithubConfig,
    pub subscriptions: SubscriptionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub stage: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// 0 disables the max_tokens parameter
    pub max_output_tokens: u32,
    pub rate_limit_tokens_per_minute: usize,
    pub timeout_seconds: u64,
    pub concurrent_chunks: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            api_key: String::new(),
            model: crate::core::usage::DEFAULT_MODEL.to_string(),
            max_output_tokens: 0,
            rate_limit_tokens_per_minute: 40_000,
            timeout_seconds: 360,
            concurrent_chunks: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Unknown organizations start a trial instead of being rejected.
    pub auto_enroll: bool,
    pub organizations: HashMap<String, AccountStatus>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            auto_enroll: true,
            organizations: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub prompt_dir: String,
    pub bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prompt_dir: "prompts".to_string(),
            bucket: None,
        }
    }
}

impl ServiceConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BoostError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| BoostError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| BoostError::internal(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// `OPENAI_API_KEY` fills in a key the file leaves empty.
    /// `BOOST_STAGE` replaces the file's stage; `OPENAI_API_KEY` only fills
    /// an empty key.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(stage) = lookup("BOOST_STAGE").filter(|s| !s.trim().is_empty()) {
            self.service.stage = stage.parse()?;
        }
        if self.openai.api_key.is_empty() {
            if let Some(key) = lookup("OPENAI_API_KEY") {
                self.openai.api_key = key;
            }
        }
        Ok(self)
    }

    pub fn stage(&self) -> Stage {
        self.service.stage
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Result<()> {
        validate_url("openai.endpoint", &self.openai.endpoint)?;
        validate_non_empty_string("openai.model", &self.openai.model)?;
        validate_range(
            "openai.rate_limit_tokens_per_minute",
            self.openai.rate_limit_tokens_per_minute,
            1,
            usize::MAX,
        )?;
        validate_range(
            "openai.timeout_seconds",
            self.openai.timeout_seconds as usize,
            1,
            900,
        )?;
        validate_range("openai.concurrent_chunks", self.openai.concurrent_chunks, 1, 50)?;
        validate_url("github.api_url", &self.github.api_url)?;
        validate_path("storage.prompt_dir", &self.storage.prompt_dir)?;
        if let Some(bucket) = &self.storage.bucket {
            validate_non_empty_string("storage.bucket", bucket)?;
        }

        tracing::debug!("✅ Service configuration validation passed");
        Ok(())
    }
}
