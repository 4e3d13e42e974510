pub mod analysis;
pub mod blueprint;
pub mod bug_report;
pub mod custom;
pub mod flowdiagram;

use crate::core::processor::Processor;
use std::collections::HashMap;
use std::sync::Arc;

/// Function name → processor lookup used by the dispatcher.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<&'static str, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every analysis function the service exposes.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(analysis::TextProcessor::explain()));
        registry.register(Arc::new(analysis::TextProcessor::analyze()));
        registry.register(Arc::new(analysis::TextProcessor::compliance()));
        registry.register(Arc::new(analysis::TextProcessor::codeguidelines()));
        registry.register(Arc::new(analysis::TextProcessor::performance()));
        registry.register(Arc::new(analysis::SummarizeProcessor::new()));
        registry.register(Arc::new(analysis::GenerateProcessor::new()));
        registry.register(Arc::new(analysis::TestGenProcessor::new()));
        registry.register(Arc::new(flowdiagram::FlowDiagramProcessor::new()));
        registry.register(Arc::new(blueprint::BlueprintProcessor::new()));
        registry.register(Arc::new(custom::CustomProcessor::new()));
        registry.register(Arc::new(bug_report::BugReportProcessor::compliance()));
        registry.register(Arc::new(bug_report::BugReportProcessor::custom_scan()));
        registry.register(Arc::new(bug_report::BugReportProcessor::security()));
        registry.register(Arc::new(bug_report::BugReportProcessor::performance()));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.name(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.processors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::core::processor::{AnalysisEngine, EngineSettings, Invocation};
    use crate::core::prompts::PromptStore;
    use crate::core::throttler::Throttler;
    use crate::domain::model::{Account, AccountStatus, FunctionCall, Stage};
    use crate::domain::ports::{
        ChatCompletion, CompletionRequest, CompletionResponse, Storage,
    };
    use crate::utils::error::{BoostError, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    pub struct MemoryStorage {
        files: HashMap<String, String>,
    }

    impl MemoryStorage {
        pub fn with_files(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files
                .get(path)
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| BoostError::NotFound {
                    message: path.to_string(),
                })
        }
    }

    /// Records every request and answers with a fixed reply.
    pub struct MockLlm {
        pub requests: Mutex<Vec<CompletionRequest>>,
        reply: CompletionResponse,
    }

    impl MockLlm {
        pub fn text(content: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: CompletionResponse {
                    content: Some(content.to_string()),
                    function_call: None,
                },
            }
        }

        pub fn function(name: &str, arguments: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: CompletionResponse {
                    content: None,
                    function_call: Some(FunctionCall {
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    }),
                },
            }
        }

        pub fn sent(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatCompletion for MockLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    pub fn engine(llm: Arc<MockLlm>, prompts: &[(&str, &str)]) -> AnalysisEngine {
        let store = PromptStore::new(Stage::Local, Arc::new(MemoryStorage::with_files(prompts)));
        AnalysisEngine::new(
            llm,
            Arc::new(store),
            Arc::new(Throttler::new(1_000_000)),
            EngineSettings::default(),
        )
    }

    pub fn invocation(function: &str, data: Value) -> Invocation {
        Invocation {
            function_name: function.to_string(),
            correlation_id: "test-correlation".to_string(),
            account: Account {
                email: Some("dev@example.com".to_string()),
                organization: "example".to_string(),
                status: AccountStatus::Active,
            },
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry() {
        let registry = ProcessorRegistry::standard();
        assert_eq!(
            registry.names(),
            vec![
                "analyze",
                "blueprint",
                "codeguidelines",
                "compliance",
                "compliance_function",
                "customprocess",
                "customscan_function",
                "explain",
                "flowdiagram",
                "generate",
                "performance",
                "performance_function",
                "security_function",
                "summarize",
                "testgen",
            ]
        );
        assert!(registry.get("explain").is_some());
        assert!(registry.get("user_organizations").is_none());
    }
}
