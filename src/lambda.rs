#[cfg(feature = "lambda")]
use aws_config::BehaviorVersion;
#[cfg(feature = "lambda")]
use aws_sdk_s3::config::Region;
#[cfg(feature = "lambda")]
use aws_sdk_s3::Client as S3Client;
#[cfg(feature = "lambda")]
use boost_service::config::lambda::{LambdaConfig, S3Storage};
#[cfg(feature = "lambda")]
use boost_service::domain::ports::Storage;
#[cfg(feature = "lambda")]
use boost_service::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use boost_service::{build_dispatcher, FunctionDispatcher, FunctionResponse};
#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use serde_json::Value;
#[cfg(feature = "lambda")]
use std::sync::Arc;

#[cfg(feature = "lambda")]
async fn function_handler(
    dispatcher: Arc<FunctionDispatcher>,
    function: String,
    event: LambdaEvent<Value>,
) -> Result<FunctionResponse, Error> {
    tracing::info!(
        "Invoking {} (request {})",
        function,
        event.context.request_id
    );
    Ok(dispatcher.invoke(&function, event.payload).await)
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    // 創建Lambda配置
    let lambda_config = LambdaConfig::from_env()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    lambda_config
        .validate()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    // 有設定 bucket 才建立 S3 客戶端
    let remote: Option<Arc<dyn Storage>> = match &lambda_config.prompt_bucket {
        Some(bucket) => {
            let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let config = aws_sdk_s3::config::Builder::from(&config)
                .region(Region::new(lambda_config.s3_region.clone()))
                .build();
            let storage: Arc<dyn Storage> =
                Arc::new(S3Storage::new(S3Client::from_conf(config), bucket.clone()));
            Some(storage)
        }
        None => None,
    };

    let dispatcher = build_dispatcher(&lambda_config.service_config(), remote)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    let dispatcher = Arc::new(dispatcher);
    let function = lambda_config.analysis_function().to_string();
    tracing::info!(
        "Boost Lambda ready: function {} (stage {})",
        function,
        lambda_config.stage
    );

    run(service_fn(move |event: LambdaEvent<Value>| {
        function_handler(dispatcher.clone(), function.clone(), event)
    }))
    .await
}

#[cfg(not(feature = "lambda"))]
fn main() {
    eprintln!("The lambda binary requires the `lambda` feature");
}
