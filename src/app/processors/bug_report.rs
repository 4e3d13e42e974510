use crate::core::processor::{
    AnalysisEngine, FormatArgs, FunctionSpec, Invocation, Processor, ProcessorProfile,
    RunOutcome, TEMPERATURE_MEDIUM,
};
use crate::domain::model::{Bug, FunctionReport, ReportStatus};
use crate::utils::error::{BoostError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Function-call schema through which the LLM reports bugs.
pub fn report_bugs_schema(kind: &str, bug_type_description: &str) -> FunctionSpec {
    let name = format!("report_{}_bugs", kind);
    let schema = json!({
        "name": name,
        "description": format!("reports {} bugs in the code", kind),
        "parameters": {
            "type": "object",
            "properties": {
                "bugs": {
                    "type": "array",
                    "description": "the list of bugs found in the code",
                    "items": {
                        "type": "object",
                        "properties": {
                            "lineNumber": {
                                "type": "integer",
                                "description": "the line number where the bug begins, calculated from the original line number of the chunk if given"
                            },
                            "severity": {
                                "type": "integer",
                                "description": "the severity of the bug, 1-10, 10 being the most severe"
                            },
                            "bugType": {
                                "type": "string",
                                "description": bug_type_description
                            },
                            "description": {
                                "type": "string",
                                "description": "a description in markdown format of why the bug is a bug and how it might be exposed"
                            },
                            "solution": {
                                "type": "string",
                                "description": "the solution description in markdown format of how to fix the bug"
                            }
                        }
                    }
                }
            }
        }
    });
    FunctionSpec { name, schema }
}

#[derive(Debug, Deserialize)]
struct ReportedBugs {
    #[serde(default)]
    bugs: Option<Vec<Bug>>,
}

/// Merge the function-call arguments of every chunk into one report.
/// Arguments that do not parse are logged and skipped.
pub fn collect_report(outcome: &RunOutcome, log_prefix: &str) -> FunctionReport {
    let mut details = Vec::new();

    for (index, response) in outcome.responses.iter().enumerate() {
        let Some(call) = &response.function_call else {
            tracing::warn!("{}: chunk {} returned no function call", log_prefix, index);
            continue;
        };
        match serde_json::from_str::<ReportedBugs>(&call.arguments) {
            Ok(reported) => details.extend(reported.bugs.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(
                    "{}: Error parsing function call arguments of chunk {}: {}",
                    log_prefix,
                    index,
                    e
                );
            }
        }
    }

    if details.is_empty() {
        tracing::info!("{}: No bugs found with function output", log_prefix);
        FunctionReport {
            status: ReportStatus::Nobugsfound,
            details,
        }
    } else {
        FunctionReport {
            status: ReportStatus::Bugsfound,
            details,
        }
    }
}

/// `inputMetadata.lineNumberBase`; `None` when no metadata was sent.
pub fn line_number_base(invocation: &Invocation) -> Result<Option<i64>> {
    let metadata = match invocation.data.get("inputMetadata") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).map_err(|e| {
            BoostError::bad_request(format!("Error: inputMetadata is not valid JSON: {}", e))
        })?,
        Some(other) => other.clone(),
    };

    Ok(Some(
        metadata
            .get("lineNumberBase")
            .and_then(Value::as_i64)
            .unwrap_or(0),
    ))
}

/// Line-numbering hint for a chunk starting `lines_before` lines into the
/// input. Empty for an unchunked input without metadata.
pub fn line_number_hint(base: Option<i64>, lines_before: usize) -> String {
    if base.is_none() && lines_before == 0 {
        return String::new();
    }
    format!(
        "When identifying source numbers for issues, treat the first line of the code as line number {}",
        base.unwrap_or(0) + lines_before as i64 + 1
    )
}

enum ReportKind {
    /// Fixed bug taxonomy described to the model.
    Fixed {
        kind: &'static str,
        bug_type: &'static str,
    },
    CustomScan,
}

/// Structured bug reporting through a forced function call.
pub struct BugReportProcessor {
    name: &'static str,
    kind: ReportKind,
    profile: ProcessorProfile,
}

impl BugReportProcessor {
    pub fn compliance() -> Self {
        Self {
            name: "compliance_function",
            kind: ReportKind::Fixed {
                kind: "compliance",
                bug_type: "the type of bug, e.g. \"privacy-leak\", using standard issue types from GDPR, CCPA, ISO 27001, etc",
            },
            profile: Self::profile(
                "compliance-function.prompt",
                "compliance-function-role-system.prompt",
            ),
        }
    }

    pub fn security() -> Self {
        Self {
            name: "security_function",
            kind: ReportKind::Fixed {
                kind: "security",
                bug_type: "the type of bug, e.g. \"sql-injection\", using standard bug types from the MITRE CWE taxonomy",
            },
            profile: Self::profile(
                "security-function.prompt",
                "security-function-role-system.prompt",
            ),
        }
    }

    pub fn performance() -> Self {
        Self {
            name: "performance_function",
            kind: ReportKind::Fixed {
                kind: "performance",
                bug_type: "the type of issue, e.g. \"Memory\", \"Disk\", using one of the following types: CPU, Memory, Disk, Network and Datastore",
            },
            profile: Self::profile(
                "performance-function.prompt",
                "performance-function-role-system.prompt",
            ),
        }
    }

    pub fn custom_scan() -> Self {
        Self {
            name: "customscan_function",
            kind: ReportKind::CustomScan,
            profile: Self::profile(
                "customscan-function.prompt",
                "customscan-function-role-system.prompt",
            ),
        }
    }

    // 函式輸出很短，輸入可用 80% 的 context
    fn profile(main: &'static str, system: &'static str) -> ProcessorProfile {
        ProcessorProfile::new(main, system)
            .input_ratio(0.8)
            .temperature(TEMPERATURE_MEDIUM)
    }

    fn prepare(&self, invocation: &Invocation, args: &mut FormatArgs) -> Result<FunctionSpec> {
        match self.kind {
            ReportKind::Fixed { kind, bug_type } => Ok(report_bugs_schema(kind, bug_type)),
            ReportKind::CustomScan => {
                let guidance = invocation.require(
                    "customScanGuidance",
                    "Error: please provide custom scan guidance to run against the code fragment",
                )?;
                let categories = invocation.require(
                    "customScanCategories",
                    "Error: please provide custom scan categories to run against the code fragment",
                )?;
                let description = invocation.field("scanTypeDescription").unwrap_or_else(|| {
                    format!(
                        "the type of code logic issue, using one of the following types: {}",
                        categories
                    )
                });

                args.insert("customScanGuidance".to_string(), guidance);
                args.insert("customScanCategories".to_string(), categories);
                Ok(report_bugs_schema("customScan", &description))
            }
        }
    }
}

#[async_trait]
impl Processor for BugReportProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&self, engine: &AnalysisEngine, invocation: &Invocation) -> Result<Value> {
        let code = invocation.require("code", "Error: please provide a code fragment to analyze")?;

        let base = line_number_base(invocation)?;

        let mut args = FormatArgs::new();
        args.insert("code".to_string(), code);
        args.insert("lineNumberBase".to_string(), line_number_hint(base, 0));
        let function = self.prepare(invocation, &mut args)?;

        // 切片後每段的行號從原始位置起算
        let per_chunk = move |lines_before: usize| {
            FormatArgs::from([(
                "lineNumberBase".to_string(),
                line_number_hint(base, lines_before),
            )])
        };
        let outcome = engine
            .process_function_chunked(&self.profile, invocation, args, &function, &per_chunk)
            .await?;
        let report = collect_report(&outcome, &invocation.log_prefix());
        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::processors::testing::{engine, invocation, MockLlm};
    use crate::domain::model::FunctionCall;
    use crate::domain::ports::CompletionResponse;
    use std::sync::Arc;

    const COMPLIANCE_PROMPTS: &[(&str, &str)] = &[
        ("compliance-function.prompt", "{lineNumberBase}\n---\n{code}"),
        ("compliance-function-role-system.prompt", "You are a compliance scanner."),
    ];

    const SCAN_PROMPTS: &[(&str, &str)] = &[
        (
            "customscan-function.prompt",
            "Scan for {customScanGuidance} ({customScanCategories}).\n{lineNumberBase}\n\n{code}",
        ),
        ("customscan-function-role-system.prompt", "You are a code scanner."),
    ];

    fn call(arguments: &str) -> CompletionResponse {
        CompletionResponse {
            content: None,
            function_call: Some(FunctionCall {
                name: "report_compliance_bugs".to_string(),
                arguments: arguments.to_string(),
            }),
        }
    }

    #[test]
    fn test_collect_report_skips_corrupt_chunks() {
        let outcome = RunOutcome {
            responses: vec![
                call(r#"{"bugs": [{"lineNumber": 3, "severity": 8, "bugType": "privacy-leak"}]}"#),
                call("{not json"),
                call(r#"{"bugs": []}"#),
            ],
            truncated: false,
            chunked: true,
        };
        let report = collect_report(&outcome, "test");
        assert_eq!(report.status, ReportStatus::Bugsfound);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].line_number, Some(3));
    }

    #[test]
    fn test_collect_report_no_bugs() {
        let outcome = RunOutcome {
            responses: vec![call(r#"{"bugs": []}"#)],
            truncated: false,
            chunked: false,
        };
        let report = collect_report(&outcome, "test");
        assert_eq!(report.status, ReportStatus::Nobugsfound);
        assert!(report.details.is_empty());
    }

    #[test]
    fn test_line_number_base() {
        let inv = invocation(
            "compliance_function",
            json!({ "inputMetadata": "{\"lineNumberBase\": 2820}" }),
        );
        assert_eq!(line_number_base(&inv).unwrap(), Some(2820));
        assert!(line_number_hint(Some(2820), 0).ends_with("line number 2821"));

        let without = invocation("compliance_function", json!({}));
        assert_eq!(line_number_base(&without).unwrap(), None);
        assert_eq!(line_number_hint(None, 0), "");
        assert!(line_number_hint(None, 40).ends_with("line number 41"));

        let corrupt = invocation("compliance_function", json!({ "inputMetadata": "{" }));
        assert!(matches!(
            line_number_base(&corrupt),
            Err(BoostError::BadRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_each_chunk_gets_its_own_line_base() {
        let llm = Arc::new(MockLlm::function("report_compliance_bugs", r#"{"bugs": []}"#));
        let engine = engine(llm.clone(), COMPLIANCE_PROMPTS);
        let code: String = (0..3000)
            .map(|i| format!("let value_{} = read_card({});\n", i, i))
            .collect();
        let inv = invocation(
            "compliance_function",
            json!({ "code": code, "inputMetadata": { "lineNumberBase": 10 } }),
        );

        BugReportProcessor::compliance()
            .process(&engine, &inv)
            .await
            .unwrap();

        let sent = llm.sent();
        assert!(sent.len() > 1);
        for request in &sent {
            let prompt = &request.messages[1].content;
            let (hint, body) = prompt.split_once("\n---\n").unwrap();
            // 每段第一行的變數編號即為它在原始輸入中的行索引
            let first_index: i64 = body
                .trim_start_matches("let value_")
                .split(' ')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!(hint.ends_with(&format!("line number {}", 10 + first_index + 1)));
        }
    }

    #[tokio::test]
    async fn test_custom_scan_injects_categories_into_schema() {
        let llm = Arc::new(MockLlm::function(
            "report_customScan_bugs",
            r#"{"bugs": [{"lineNumber": 2830, "severity": 6, "bugType": "MissingSync", "description": "promise not awaited"}]}"#,
        ));
        let engine = engine(llm.clone(), SCAN_PROMPTS);
        let inv = invocation(
            "customscan_function",
            json!({
                "code": "executeCell(cell);",
                "customScanGuidance": "async issues",
                "customScanCategories": "Deadlock, MissingSync",
            }),
        );

        let result = BugReportProcessor::custom_scan()
            .process(&engine, &inv)
            .await
            .unwrap();
        assert_eq!(result["status"], "bugsfound");
        assert_eq!(result["details"][0]["bugType"], "MissingSync");

        let request = &llm.sent()[0];
        assert_eq!(
            request.function_call,
            Some(json!({ "name": "report_customScan_bugs" }))
        );
        let schema = &request.functions.as_ref().unwrap()[0];
        assert_eq!(
            schema["parameters"]["properties"]["bugs"]["items"]["properties"]["bugType"]["description"],
            "the type of code logic issue, using one of the following types: Deadlock, MissingSync"
        );
    }

    #[tokio::test]
    async fn test_custom_scan_requires_guidance() {
        let llm = Arc::new(MockLlm::function("report_customScan_bugs", "{}"));
        let engine = engine(llm, SCAN_PROMPTS);
        let inv = invocation(
            "customscan_function",
            json!({ "code": "x", "customScanCategories": "Deadlock" }),
        );
        let err = BugReportProcessor::custom_scan()
            .process(&engine, &inv)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("custom scan guidance"));
    }
}
