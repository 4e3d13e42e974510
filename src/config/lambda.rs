use crate::config::toml_config::{ServiceConfig, DEFAULT_OPENAI_ENDPOINT};
use crate::domain::model::Stage;
use crate::domain::ports::Storage;
use crate::utils::error::{BoostError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url, Validate};
use async_trait::async_trait;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client as S3Client;
use std::env;

#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub stage: Stage,
    pub openai_api_key: String,
    pub openai_endpoint: String,
    pub prompt_bucket: Option<String>,
    pub s3_region: String,
    /// Deployed function name, e.g. `boost-prod-explain`.
    pub function_name: String,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            stage: match env::var("BOOST_STAGE") {
                Ok(stage) => stage.parse()?,
                Err(_) => Stage::Local,
            },
            openai_api_key: env::var("OPENAI_API_KEY").map_err(|_| BoostError::MissingConfigError {
                field: "OPENAI_API_KEY".to_string(),
            })?,
            openai_endpoint: env::var("OPENAI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OPENAI_ENDPOINT.to_string()),
            prompt_bucket: env::var("PROMPT_BUCKET").ok().filter(|b| !b.is_empty()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-west-2".to_string()),
            function_name: env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default(),
        })
    }

    /// Analysis function served by this deployment: the suffix after the last `-`.
    pub fn analysis_function(&self) -> &str {
        self.function_name
            .rsplit('-')
            .next()
            .unwrap_or(&self.function_name)
    }

    /// Defaults for the rest of the service, with the environment applied on top.
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.service.stage = self.stage;
        config.openai.api_key = self.openai_api_key.clone();
        config.openai.endpoint = self.openai_endpoint.clone();
        config.storage.bucket = self.prompt_bucket.clone();
        config
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("OPENAI_API_KEY", &self.openai_api_key)?;
        validate_url("OPENAI_ENDPOINT", &self.openai_endpoint)?;
        validate_aws_region("S3_REGION", &self.s3_region)?;
        if let Some(bucket) = &self.prompt_bucket {
            validate_s3_bucket_name("PROMPT_BUCKET", bucket)?;
        }

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    let invalid = |reason: &str| BoostError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: bucket_name.to_string(),
        reason: reason.to_string(),
    };

    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid("S3 bucket name must be between 3 and 63 characters"));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(invalid("S3 bucket name cannot start or end with a hyphen"));
    }

    Ok(())
}

fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(BoostError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }

    Ok(())
}

/// Staged prompt files in an S3 bucket, keyed `{stage}/{filename}`.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                return Err(match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => BoostError::NotFound {
                        message: format!("s3://{}/{}", self.bucket, path),
                    },
                    other => BoostError::Upstream {
                        message: format!("Failed to read s3://{}/{}: {}", self.bucket, path, other),
                    },
                })
            }
        };

        let data = resp.body.collect().await.map_err(|e| BoostError::Upstream {
            message: format!("Failed to collect S3 data: {}", e),
        })?;

        Ok(data.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(function_name: &str) -> LambdaConfig {
        LambdaConfig {
            stage: Stage::Prod,
            openai_api_key: "sk-test".to_string(),
            openai_endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            prompt_bucket: Some("boost-prompts".to_string()),
            s3_region: "us-west-2".to_string(),
            function_name: function_name.to_string(),
        }
    }

    #[test]
    fn test_analysis_function_from_deployment_name() {
        assert_eq!(config("boost-prod-explain").analysis_function(), "explain");
        assert_eq!(config("customscan_function").analysis_function(), "customscan_function");
    }

    #[test]
    fn test_validation() {
        assert!(config("explain").validate().is_ok());

        let mut bad = config("explain");
        bad.prompt_bucket = Some("Bad_Bucket".to_string());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_service_config_carries_env() {
        let service = config("explain").service_config();
        assert_eq!(service.stage(), Stage::Prod);
        assert_eq!(service.openai.api_key, "sk-test");
        assert_eq!(service.storage.bucket.as_deref(), Some("boost-prompts"));
    }
}
