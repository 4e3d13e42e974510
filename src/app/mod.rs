pub mod dispatcher;
pub mod processors;

use crate::adapters::{
    github::GithubSessionVerifier, openai::OpenAiClient, subscriptions::ConfiguredSubscriptions,
};
use crate::config::{cli::LocalStorage, toml_config::ServiceConfig};
use crate::core::auth::Authorizer;
use crate::core::processor::{AnalysisEngine, EngineSettings};
use crate::core::prompts::PromptStore;
use crate::core::throttler::Throttler;
use crate::domain::ports::{ChatCompletion, SessionVerifier, Storage};
use crate::utils::error::Result;
use dispatcher::FunctionDispatcher;
use processors::ProcessorRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Wire the production adapters into a dispatcher. `remote` is the prompt
/// bucket, searched before the bundled prompt directory.
pub fn build_dispatcher(
    config: &ServiceConfig,
    remote: Option<Arc<dyn Storage>>,
) -> Result<FunctionDispatcher> {
    let llm: Arc<dyn ChatCompletion> = Arc::new(OpenAiClient::new(
        &config.openai.endpoint,
        &config.openai.api_key,
        Duration::from_secs(config.openai.timeout_seconds),
    )?);
    let verifier: Arc<dyn SessionVerifier> =
        Arc::new(GithubSessionVerifier::new(&config.github.api_url)?);
    Ok(assemble(config, llm, verifier, remote))
}

/// Same wiring with caller-supplied LLM and GitHub clients.
pub fn assemble(
    config: &ServiceConfig,
    llm: Arc<dyn ChatCompletion>,
    verifier: Arc<dyn SessionVerifier>,
    remote: Option<Arc<dyn Storage>>,
) -> FunctionDispatcher {
    let stage = config.stage();
    let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(&config.storage.prompt_dir));
    let mut prompts = PromptStore::new(stage, local);
    if let Some(remote) = remote {
        prompts = prompts.with_remote(remote);
    }

    let engine = AnalysisEngine::new(
        llm,
        Arc::new(prompts),
        Arc::new(Throttler::new(config.openai.rate_limit_tokens_per_minute)),
        EngineSettings {
            default_model: config.openai.model.clone(),
            max_output_tokens: config.openai.max_output_tokens,
            concurrent_chunks: config.openai.concurrent_chunks,
        },
    );
    let authorizer = Authorizer::new(
        verifier,
        Arc::new(ConfiguredSubscriptions::new(&config.subscriptions)),
    );

    tracing::debug!(
        "Dispatcher ready for stage {} with prompts from {}",
        stage,
        config.storage.prompt_dir
    );
    FunctionDispatcher::new(
        stage,
        Arc::new(engine),
        Arc::new(authorizer),
        ProcessorRegistry::standard(),
    )
}
