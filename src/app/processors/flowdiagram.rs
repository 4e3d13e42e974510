use crate::core::processor::{
    AnalysisEngine, FormatArgs, Invocation, Processor, ProcessorProfile, TEMPERATURE_MEDIUM,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use std::sync::LazyLock;

static FENCED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("fence regex"));
static NESTED_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[([^\[\]]*\[[^\[\]]*\][^\[\]]*)\]").expect("bracket regex"));

/// Ordered rewrites applied inside each fenced block.
static BLOCK_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r#" \\"(.*)\\""#, "[$1]"),
        (r#"\\"(.*)\\""#, " $1 "),
        (r#" "(.*)""#, " $1"),
        ("\u{1}", ""),
        (r"\((.*)\)", " $1 "),
        // mermaid 的保留字 end 黏在標點後會讓 renderer 失敗
        (r"([^\s\w]|_)end([^\s\w]|_|$)", "${1}ends${2}"),
        (r"(fill:|stroke:)(\w)", "${1}#${2}"),
        (r"===", "=="),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("mermaid regex"), replacement))
    .collect()
});

/// Repair common LLM mistakes in mermaid diagrams so they render.
pub fn sanitize_mermaid(markdown: &str) -> String {
    let flattened = NESTED_BRACKETS.replace_all(markdown, |caps: &Captures| {
        format!("[ {} ]", caps[1].replace(['[', ']'], ""))
    });

    let cleaned = FENCED
        .replace_all(&flattened, |caps: &Captures| {
            let mut block = caps[1].to_string();
            for (pattern, replacement) in BLOCK_REWRITES.iter() {
                block = pattern.replace_all(&block, *replacement).into_owned();
            }
            format!("```{}```", block)
        })
        .into_owned();

    if cleaned != markdown {
        tracing::debug!("Cleaned mermaid code, original:\n{}", markdown);
    }
    cleaned
}

pub struct FlowDiagramProcessor {
    profile: ProcessorProfile,
}

impl FlowDiagramProcessor {
    pub fn new() -> Self {
        Self {
            profile: ProcessorProfile::new("flowdiagram.prompt", "flowdiagram-role-system.prompt")
                .temperature(TEMPERATURE_MEDIUM),
        }
    }
}

impl Default for FlowDiagramProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for FlowDiagramProcessor {
    fn name(&self) -> &'static str {
        "flowdiagram"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require("code", "Error: please provide the original code")?;

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);

        let result = engine.process_input(&self.profile, invocation, args).await?;
        Ok(json!({
            "analysis": sanitize_mermaid(&result.output),
            "truncated": result.truncated,
            "chunked": result.chunked,
        }))
    }
}
