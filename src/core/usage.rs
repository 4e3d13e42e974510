use crate::domain::model::ChatMessage;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

pub const DEFAULT_MODEL: &str = "gpt-4";

const BOOST_COST_PER_KB: f64 = 0.06;

const GPT4_PROMPT_LT_8K: f64 = 0.03 / 1000.0;
const GPT4_PROMPT_LT_32K: f64 = 0.06 / 1000.0;
const GPT4_COMPLETION_LT_8K: f64 = 0.06 / 1000.0;
const GPT4_COMPLETION_LT_32K: f64 = 0.12 / 1000.0;
const GPT35_PER_TOKEN: f64 = 0.002 / 1000.0;
const DEFAULT_PER_TOKEN: f64 = 0.02 / 1000.0;

/// Request keys that steer processing and are not billed as user input.
pub const CONTROL_KEYS: [&str; 6] = [
    "model",
    "top_p",
    "temperature",
    "session",
    "organization",
    "version",
];

// gpt-4 與 gpt-3.5 共用 cl100k_base 編碼
static TOKENIZER: LazyLock<CoreBPE> = LazyLock::new(|| {
    get_bpe_from_model(DEFAULT_MODEL).expect("cl100k_base ranks are bundled with tiktoken-rs")
});

/// BPE token count of `text` under the gpt-4 encoding.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    TOKENIZER.encode_with_special_tokens(text).len()
}

pub fn count_message_tokens(messages: &[ChatMessage]) -> usize {
    // 每則訊息額外的角色/分隔開銷
    messages
        .iter()
        .map(|m| count_tokens(&m.content) + 4)
        .sum()
}

pub fn model_context_window(model: &str) -> usize {
    match model {
        "gpt-4-32k" => 32_768,
        "gpt-3.5-turbo" => 4_096,
        "gpt-3.5-turbo-16k" => 16_384,
        m if m.starts_with("gpt-4-turbo") || m.starts_with("gpt-4o") => 128_000,
        _ => 8_192,
    }
}

pub fn openai_cost(tokens: usize, model: &str, is_input: bool) -> f64 {
    let per_token = if model.starts_with("gpt-4") {
        match (is_input, tokens < 8000) {
            (true, true) => GPT4_PROMPT_LT_8K,
            (true, false) => GPT4_PROMPT_LT_32K,
            (false, true) => GPT4_COMPLETION_LT_8K,
            (false, false) => GPT4_COMPLETION_LT_32K,
        }
    } else if model.starts_with("gpt-3.5-turbo") {
        GPT35_PER_TOKEN
    } else {
        DEFAULT_PER_TOKEN
    };

    tokens as f64 * per_token
}

pub fn boost_cost(payload_bytes: usize) -> f64 {
    (payload_bytes as f64 / 1024.0) * BOOST_COST_PER_KB
}

pub fn collate_user_input(data: &Map<String, Value>) -> String {
    data.iter()
        .filter(|(key, _)| !CONTROL_KEYS.contains(&key.as_str()))
        .map(|(_, value)| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub input_tokens: usize,
    pub customer_input_tokens: usize,
    pub output_tokens: usize,
    pub openai_cost: f64,
    pub boost_cost: f64,
}

impl UsageReport {
    pub fn measure(
        model: &str,
        messages: &[ChatMessage],
        user_input: &str,
        output: &str,
    ) -> Self {
        let input_tokens = count_message_tokens(messages);
        let customer_input_tokens = count_tokens(user_input);
        let output_tokens = count_tokens(output);
        let prompt_bytes: usize = messages.iter().map(|m| m.content.len()).sum();

        Self {
            input_tokens,
            customer_input_tokens,
            output_tokens,
            openai_cost: openai_cost(input_tokens, model, true)
                + openai_cost(output_tokens, model, false),
            boost_cost: boost_cost(prompt_bytes + user_input.len()),
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}
