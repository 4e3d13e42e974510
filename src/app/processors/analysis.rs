use crate::core::processor::{
    AnalysisEngine, FormatArgs, Invocation, Processor, ProcessorProfile, PromptRole,
    TEMPERATURE_MEDIUM,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Single code input, single text output.
pub struct TextProcessor {
    name: &'static str,
    profile: ProcessorProfile,
    output_key: &'static str,
    missing_code: &'static str,
}

impl TextProcessor {
    pub fn explain() -> Self {
        Self {
            name: "explain",
            profile: ProcessorProfile::new("explain.prompt", "explain-role-system.prompt"),
            output_key: "explanation",
            missing_code: "Error: please provide a code fragment to explain",
        }
    }

    pub fn analyze() -> Self {
        Self {
            name: "analyze",
            profile: ProcessorProfile::new("analyze.prompt", "analyze-role-system.prompt"),
            output_key: "analysis",
            missing_code: "Error: please provide a code fragment to analyze",
        }
    }

    pub fn compliance() -> Self {
        Self {
            name: "compliance",
            profile: ProcessorProfile::new("compliance.prompt", "compliance-role-system.prompt"),
            output_key: "analysis",
            missing_code: "Error: please provide a code fragment to analyze for compliance",
        }
    }

    pub fn performance() -> Self {
        Self {
            name: "performance",
            profile: ProcessorProfile::new("performance.prompt", "performance-role-system.prompt")
                .temperature(TEMPERATURE_MEDIUM),
            output_key: "analysis",
            missing_code: "Error: please provide a code fragment to analyze",
        }
    }

    pub fn codeguidelines() -> Self {
        Self {
            name: "codeguidelines",
            profile: ProcessorProfile::new(
                "codeguidelines.prompt",
                "codeguidelines-role-system.prompt",
            ),
            output_key: "analysis",
            missing_code: "Error: please provide a code fragment to analyze for coding guidelines",
        }
    }
}

#[async_trait]
impl Processor for TextProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require("code", self.missing_code)?;

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);

        let result = engine.process_input(&self.profile, invocation, args).await?;
        let mut body = serde_json::Map::new();
        body.insert(self.output_key.to_string(), Value::String(result.output));
        body.insert("truncated".to_string(), Value::Bool(result.truncated));
        body.insert("chunked".to_string(), Value::Bool(result.chunked));
        Ok(Value::Object(body))
    }
}

pub struct SummarizeProcessor {
    profile: ProcessorProfile,
}

impl SummarizeProcessor {
    pub fn new() -> Self {
        Self {
            profile: ProcessorProfile::new("summarize.prompt", "summarize-role-system.prompt")
                .chunk_on(None),
        }
    }
}

impl Default for SummarizeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for SummarizeProcessor {
    fn name(&self) -> &'static str {
        "summarize"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let inputs = invocation.require("inputs", "Error: please provide the inputs to summarize")?;
        let analysis_type = invocation.require(
            "analysis_type",
            "Error: please provide the analysis type of the inputs",
        )?;
        let analysis_label = invocation.require(
            "analysis_label",
            "Error: please provide the analysis label of the inputs",
        )?;

        let mut args = FormatArgs::new();
        args.insert("inputs".to_string(), inputs);
        args.insert("analysis_type".to_string(), analysis_type.clone());
        args.insert("analysis_label".to_string(), analysis_label.clone());

        let result = engine.process_input(&self.profile, invocation, args).await?;
        Ok(json!({
            "analysis": result.output,
            "analysis_type": analysis_type,
            "analysis_label": analysis_label,
        }))
    }
}

/// Generates code in a target language from an explanation of existing code.
pub struct GenerateProcessor {
    profile: ProcessorProfile,
}

impl GenerateProcessor {
    pub fn new() -> Self {
        // explanation 通常比程式碼長，所以切分 explanation
        let profile = ProcessorProfile {
            prompts: vec![
                (PromptRole::System, "convert-role-system.prompt"),
                (PromptRole::User, "convert-role-user.prompt"),
                (PromptRole::Assistant, "convert-role-assistant.prompt"),
                (PromptRole::Main, "convert.prompt"),
            ],
            ..ProcessorProfile::new("convert.prompt", "convert-role-system.prompt")
        }
        .chunk_on(Some("explanation"));
        Self { profile }
    }
}

impl Default for GenerateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for GenerateProcessor {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let explanation = invocation.require(
            "explanation",
            "Error: please provide the initial code explanation",
        )?;
        // 舊版客戶端送的是 originalCode
        let code = match invocation.field("originalCode") {
            Some(code) => code,
            None => invocation.require("code", "Error: please provide the original code")?,
        };
        let language = invocation
            .field("language")
            .unwrap_or_else(|| "python".to_string());

        let mut args = FormatArgs::new();
        args.insert("explanation".to_string(), explanation);
        args.insert("code".to_string(), code);
        args.insert("language".to_string(), language);

        let result = engine.process_input(&self.profile, invocation, args).await?;
        Ok(json!({
            "code": result.output,
            "truncated": result.truncated,
            "chunked": result.chunked,
        }))
    }
}

pub struct TestGenProcessor {
    profile: ProcessorProfile,
}

impl TestGenProcessor {
    pub fn new() -> Self {
        Self {
            profile: ProcessorProfile::new("testgen.prompt", "testgen-role-system.prompt"),
        }
    }
}

impl Default for TestGenProcessor {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_test_framework(language: &str) -> String {
    if language == "python" {
        "pytest".to_string()
    } else {
        format!("the best framework for {} tests", language)
    }
}

#[async_trait]
impl Processor for TestGenProcessor {
    fn name(&self) -> &'static str {
        "testgen"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require(
            "code",
            "Error: please provide a code fragment to generate tests for",
        )?;
        let language = invocation
            .field("language")
            .unwrap_or_else(|| "python".to_string());
        let framework = invocation
            .field("framework")
            .unwrap_or_else(|| default_test_framework(&language));

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);
        args.insert("language".to_string(), language);
        args.insert("framework".to_string(), framework);

        let result = engine.process_input(&self.profile, invocation, args).await?;
        Ok(json!({
            "testcode": result.output,
            "truncated": result.truncated,
            "chunked": result.chunked,
        }))
    }
}
