use crate::core::processor::{
    AnalysisEngine, FormatArgs, Invocation, Processor, ProcessorProfile,
};
use crate::core::prompts::PromptTemplate;
use crate::domain::model::ChatMessage;
use crate::utils::error::{BoostError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

const MAIN_PROMPT: &str = "customprocess.prompt";
const SYSTEM_PROMPT: &str = "customprocess-role-system.prompt";

/// Runs a caller-supplied prompt against a code fragment.
pub struct CustomProcessor {
    profile: ProcessorProfile,
}

impl CustomProcessor {
    pub fn new() -> Self {
        Self {
            profile: ProcessorProfile::new(MAIN_PROMPT, SYSTEM_PROMPT).chunk_on(None),
        }
    }

    async fn build_messages(
        &self,
        engine: &AnalysisEngine,
        invocation: &Invocation,
        code: String,
        prompt: String,
    ) -> Result<Vec<ChatMessage>> {
        if let Some(messages) = invocation.data.get("messages").filter(|v| !v.is_null()) {
            return parse_messages(messages);
        }

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);
        args.insert("prompt".to_string(), prompt.clone());

        // 使用者的 prompt 自帶 {code} 時直接當作模板
        let custom = PromptTemplate::new(prompt);
        let user = if custom.contains_placeholder("code") {
            custom.format(&args).map_err(|e| {
                BoostError::bad_request(format!("Error: the custom prompt cannot be rendered: {}", e))
            })?
        } else {
            engine.prompts().get(MAIN_PROMPT).await?.format(&args)?
        };

        let system = match invocation.field("role_system") {
            Some(system) => system,
            None => engine.prompts().get(SYSTEM_PROMPT).await?.text().to_string(),
        };

        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }
}

impl Default for CustomProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `messages` may arrive as a JSON array or as a JSON-encoded string.
fn parse_messages(raw: &Value) -> Result<Vec<ChatMessage>> {
    let parsed = match raw {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| BoostError::bad_request(format!("Error: invalid messages: {}", e)))
}

#[async_trait]
impl Processor for CustomProcessor {
    fn name(&self) -> &'static str {
        "customprocess"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require(
            "code",
            "Error: please provide a code fragment to analyze for coding guidelines",
        )?;
        let prompt = invocation.require(
            "prompt",
            "Error: please provide a custom prompt to run against the code fragment",
        )?;

        let messages = self.build_messages(engine, invocation, code, prompt).await?;
        let result = engine
            .process_messages(&self.profile, invocation, messages)
            .await?;

        Ok(json!({
            "analysis": result.output,
            "truncated": result.truncated,
            "chunked": result.chunked,
        }))
    }
}
