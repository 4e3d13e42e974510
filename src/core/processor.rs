use crate::core::chunking::chunk_input;
use crate::core::optimizer::optimize_messages;
use crate::core::prompts::PromptStore;
use crate::core::throttler::{Admission, Throttler};
use crate::core::usage::{
    collate_user_input, count_message_tokens, model_context_window, UsageReport, DEFAULT_MODEL,
};
use crate::domain::model::{Account, ChatMessage, ProcessOutput};
use crate::domain::ports::{ChatCompletion, CompletionRequest, CompletionResponse};
use crate::utils::error::{BoostError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sampling temperature for output that mixes structure with explanation.
pub const TEMPERATURE_MEDIUM: f32 = 0.5;

pub type FormatArgs = HashMap<String, String>;

/// Extra format arguments for one chunk, given how many input lines precede it.
pub type ChunkArgs<'a> = &'a (dyn Fn(usize) -> FormatArgs + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    /// Rendered with the request's format arguments and sent as the user message.
    Main,
    System,
    /// Fixed conversation priming, sent as-is.
    User,
    Assistant,
}

/// Static description of one analysis function.
#[derive(Debug, Clone)]
pub struct ProcessorProfile {
    pub prompts: Vec<(PromptRole, &'static str)>,
    /// Request field that may be split across several LLM calls.
    pub chunkable_input: Option<&'static str>,
    /// Share of the model's context window reserved for input.
    pub input_ratio: f64,
    pub temperature: Option<f32>,
}

impl ProcessorProfile {
    pub fn new(main: &'static str, system: &'static str) -> Self {
        Self {
            prompts: vec![(PromptRole::System, system), (PromptRole::Main, main)],
            chunkable_input: Some("code"),
            input_ratio: 0.5,
            temperature: None,
        }
    }

    pub fn chunk_on(mut self, input: Option<&'static str>) -> Self {
        self.chunkable_input = input;
        self
    }

    pub fn input_ratio(mut self, ratio: f64) -> Self {
        self.input_ratio = ratio;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn prompt(&self, role: PromptRole) -> Option<&'static str> {
        self.prompts
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, file)| *file)
    }
}

/// Forced function-call schema for structured output.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub schema: Value,
}

/// One authorized call of an analysis function.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub function_name: String,
    pub correlation_id: String,
    pub account: Account,
    pub data: Map<String, Value>,
}

impl Invocation {
    /// String view of a request field; `null` counts as absent.
    pub fn field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn require(&self, key: &str, message: &str) -> Result<String> {
        self.field(key)
            .ok_or_else(|| BoostError::bad_request(message.to_string()))
    }

    fn number(&self, key: &str) -> Result<Option<f32>> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64().map(|v| v as f32)),
            Some(Value::String(s)) => s.trim().parse::<f32>().map(Some).map_err(|_| {
                BoostError::bad_request(format!("Error: {} must be a number", key))
            }),
            Some(_) => Err(BoostError::bad_request(format!(
                "Error: {} must be a number",
                key
            ))),
        }
    }

    pub fn log_prefix(&self) -> String {
        format!(
            "{}:{}:{}",
            self.function_name,
            self.account.email.as_deref().unwrap_or("unknown"),
            self.correlation_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_model: String,
    pub max_output_tokens: u32,
    pub concurrent_chunks: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 0,
            concurrent_chunks: 5,
        }
    }
}

/// Result of running one profile: one response per chunk, in chunk order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub responses: Vec<CompletionResponse>,
    pub truncated: bool,
    pub chunked: bool,
}

impl RunOutcome {
    pub fn into_output(self) -> ProcessOutput {
        let output = self
            .responses
            .iter()
            .filter_map(|r| r.content.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n");
        ProcessOutput {
            output,
            truncated: self.truncated,
            chunked: self.chunked,
        }
    }
}

/// Prompt rendering, input fitting and throttled LLM calls shared by every
/// analysis function.
pub struct AnalysisEngine {
    llm: Arc<dyn ChatCompletion>,
    prompts: Arc<PromptStore>,
    throttler: Arc<Throttler>,
    settings: EngineSettings,
}

impl AnalysisEngine {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        prompts: Arc<PromptStore>,
        throttler: Arc<Throttler>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            llm,
            prompts,
            throttler,
            settings,
        }
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub async fn render_messages(
        &self,
        profile: &ProcessorProfile,
        args: &FormatArgs,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages = Vec::with_capacity(profile.prompts.len());
        for (role, file) in &profile.prompts {
            let template = self.prompts.get(file).await?;
            messages.push(match role {
                PromptRole::System => ChatMessage::system(template.text()),
                PromptRole::User => ChatMessage::user(template.text()),
                PromptRole::Assistant => ChatMessage::assistant(template.text()),
                PromptRole::Main => ChatMessage::user(template.format(args)?),
            });
        }
        Ok(messages)
    }

    pub async fn process_input(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        args: FormatArgs,
    ) -> Result<ProcessOutput> {
        let outcome = self.run(profile, invocation, args, None, None).await?;
        Ok(outcome.into_output())
    }

    /// Run caller-built messages; they are truncated to fit but never chunked.
    pub async fn process_messages(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        messages: Vec<ChatMessage>,
    ) -> Result<ProcessOutput> {
        let started = Instant::now();
        let model = self.model_for(invocation);
        let budget = input_budget(&model, profile.input_ratio);
        let (messages, discarded) = optimize_messages(messages, budget)?;

        let responses = self
            .complete_all(profile, invocation, &model, vec![messages], None, started)
            .await?;
        Ok(RunOutcome {
            responses,
            truncated: discarded > 0,
            chunked: false,
        }
        .into_output())
    }

    pub async fn process_function(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        args: FormatArgs,
        function: &FunctionSpec,
    ) -> Result<RunOutcome> {
        self.run(profile, invocation, args, Some(function), None).await
    }

    /// Like [`process_function`](Self::process_function), but `per_chunk`
    /// overrides format arguments for each chunk when the input is split.
    pub async fn process_function_chunked(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        args: FormatArgs,
        function: &FunctionSpec,
        per_chunk: ChunkArgs<'_>,
    ) -> Result<RunOutcome> {
        self.run(profile, invocation, args, Some(function), Some(per_chunk))
            .await
    }

    async fn run(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        args: FormatArgs,
        function: Option<&FunctionSpec>,
        per_chunk: Option<ChunkArgs<'_>>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let model = self.model_for(invocation);
        let budget = input_budget(&model, profile.input_ratio);

        let messages = self.render_messages(profile, &args).await?;
        let total = count_message_tokens(&messages);

        let mut truncated = false;
        let mut chunked = false;
        let batches = if total <= budget {
            vec![messages]
        } else if let Some(key) = profile
            .chunkable_input
            .filter(|key| args.contains_key(*key))
        {
            let mut skeleton = args.clone();
            skeleton.insert(key.to_string(), String::new());
            if let Some(per_chunk) = per_chunk {
                // 以最大的行偏移計算額外參數長度
                skeleton.extend(per_chunk(args[key].lines().count()));
            }
            let overhead = count_message_tokens(&self.render_messages(profile, &skeleton).await?);
            let chunks = chunk_input(&args[key], budget.saturating_sub(overhead))?;

            tracing::info!(
                "{}: input of {} tokens split into {} chunks (budget {})",
                invocation.log_prefix(),
                total,
                chunks.len(),
                budget
            );

            let mut batches = Vec::with_capacity(chunks.len());
            let mut lines_before = 0;
            for chunk in chunks {
                let mut chunk_args = args.clone();
                if let Some(per_chunk) = per_chunk {
                    chunk_args.extend(per_chunk(lines_before));
                }
                lines_before += chunk.matches('\n').count();
                chunk_args.insert(key.to_string(), chunk);
                batches.push(self.render_messages(profile, &chunk_args).await?);
            }
            chunked = batches.len() > 1;
            batches
        } else {
            let (optimized, discarded) = optimize_messages(messages, budget)?;
            truncated = discarded > 0;
            vec![optimized]
        };

        let responses = self
            .complete_all(profile, invocation, &model, batches, function, started)
            .await?;

        Ok(RunOutcome {
            responses,
            truncated,
            chunked,
        })
    }

    async fn complete_all(
        &self,
        profile: &ProcessorProfile,
        invocation: &Invocation,
        model: &str,
        batches: Vec<Vec<ChatMessage>>,
        function: Option<&FunctionSpec>,
        started: Instant,
    ) -> Result<Vec<CompletionResponse>> {
        let (temperature, top_p) = match invocation.number("top_p")? {
            Some(top_p) => (None, Some(top_p)),
            None => (
                invocation.number("temperature")?.or(profile.temperature),
                None,
            ),
        };
        let max_tokens = (self.settings.max_output_tokens != 0).then_some(self.settings.max_output_tokens);

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrent_chunks.max(1)));
        let mut handles = Vec::with_capacity(batches.len());
        let mut sent = Vec::with_capacity(batches.len());

        for messages in batches {
            let request = CompletionRequest {
                model: model.to_string(),
                messages,
                temperature,
                top_p,
                max_tokens,
                functions: function.map(|f| vec![f.schema.clone()]),
                function_call: function.map(|f| serde_json::json!({ "name": f.name })),
            };
            sent.extend(request.messages.iter().cloned());

            let llm = self.llm.clone();
            let throttler = self.throttler.clone();
            let semaphore = semaphore.clone();
            let input_tokens = count_message_tokens(&request.messages);
            let needed = input_tokens + max_tokens.map(|t| t as usize).unwrap_or(input_tokens);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| BoostError::internal(format!("chunk semaphore closed: {}", e)))?;
                let admission = throttler.acquire(needed, input_tokens, started).await;
                let response = llm.complete(request).await;
                if admission == Admission::Granted {
                    throttler.release(needed).await;
                }
                response
            }));
        }

        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            let response = handle
                .await
                .map_err(|e| BoostError::internal(format!("LLM task failed: {}", e)))?;
            match response {
                Ok(r) => responses.push(r),
                Err(e) => {
                    if matches!(e, BoostError::RateLimited { .. }) {
                        tracing::warn!("{}: OPENAI_RATE_LIMIT", invocation.log_prefix());
                    }
                    return Err(e);
                }
            }
        }

        self.log_usage(invocation, model, &sent, &responses);
        Ok(responses)
    }

    fn log_usage(
        &self,
        invocation: &Invocation,
        model: &str,
        messages: &[ChatMessage],
        responses: &[CompletionResponse],
    ) {
        let output: String = responses
            .iter()
            .map(|r| match (&r.content, &r.function_call) {
                (Some(content), _) => content.as_str(),
                (None, Some(call)) => call.arguments.as_str(),
                (None, None) => "",
            })
            .collect::<Vec<_>>()
            .join("\n");
        let user_input = collate_user_input(&invocation.data);
        let usage = UsageReport::measure(model, messages, &user_input, &output);

        tracing::info!(
            correlation_id = %invocation.correlation_id,
            function = %invocation.function_name,
            organization = %invocation.account.organization,
            input_tokens = usage.input_tokens,
            customer_input_tokens = usage.customer_input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total_tokens(),
            openai_cost = format!("{:.5}", usage.openai_cost),
            boost_cost = format!("{:.5}", usage.boost_cost),
            "BOOST_COST"
        );
    }

    fn model_for(&self, invocation: &Invocation) -> String {
        invocation
            .field("model")
            .unwrap_or_else(|| self.settings.default_model.clone())
    }
}

fn input_budget(model: &str, ratio: f64) -> usize {
    (model_context_window(model) as f64 * ratio).floor() as usize
}

/// A named analysis function exposed by the service.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn api_version(&self) -> &str {
        API_VERSION
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value>;
}
