use crate::core::processor::{
    AnalysisEngine, FormatArgs, Invocation, Processor, ProcessorProfile,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Architectural blueprint of a project, seeded from code and refined with
/// each further batch of code.
pub struct BlueprintProcessor {
    seed: ProcessorProfile,
    update: ProcessorProfile,
}

impl BlueprintProcessor {
    pub fn new() -> Self {
        Self {
            seed: ProcessorProfile::new("blueprint-seed.prompt", "blueprint-role-system.prompt"),
            update: ProcessorProfile::new(
                "blueprint-update.prompt",
                "blueprint-role-system.prompt",
            ),
        }
    }
}

impl Default for BlueprintProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for BlueprintProcessor {
    fn name(&self) -> &'static str {
        "blueprint"
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require("code", "Error: please provide a code fragment to blueprint")?;

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);

        let profile = match invocation.field("blueprint") {
            Some(prior) => {
                args.insert("prior_blueprint".to_string(), prior);
                &self.update
            }
            None => &self.seed,
        };

        let result = engine.process_input(profile, invocation, args).await?;
        Ok(json!({
            "blueprint": result.output,
            "truncated": result.truncated,
            "chunked": result.chunked,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::processors::testing::{engine, invocation, MockLlm};
    use std::sync::Arc;

    const PROMPTS: &[(&str, &str)] = &[
        ("blueprint-seed.prompt", "Seed from {code}"),
        ("blueprint-update.prompt", "Update {prior_blueprint} with {code}"),
        ("blueprint-role-system.prompt", "You are an architect."),
    ];

    #[tokio::test]
    async fn test_seed_without_prior_blueprint() {
        let llm = Arc::new(MockLlm::text("# Blueprint"));
        let engine = engine(llm.clone(), PROMPTS);
        let inv = invocation("blueprint", json!({ "code": "mod a;", "blueprint": null }));

        let result = BlueprintProcessor::new().process(&engine, &inv).await.unwrap();
        assert_eq!(result["blueprint"], "# Blueprint");
        assert_eq!(llm.sent()[0].messages[1].content, "Seed from mod a;");
    }

    #[tokio::test]
    async fn test_update_with_prior_blueprint() {
        let llm = Arc::new(MockLlm::text("# Blueprint v2"));
        let engine = engine(llm.clone(), PROMPTS);
        let inv = invocation("blueprint", json!({ "code": "mod b;", "blueprint": "# v1" }));

        BlueprintProcessor::new().process(&engine, &inv).await.unwrap();
        assert_eq!(llm.sent()[0].messages[1].content, "Update # v1 with mod b;");
    }
}
