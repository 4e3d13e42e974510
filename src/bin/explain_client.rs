use boost_service::utils::error::ErrorSeverity;
use boost_service::BoostError;
use clap::Parser;
use serde_json::{json, Map, Value};

/// Post one request to the local dev server's `/explain` function and print
/// whatever comes back.
#[derive(Debug, Parser)]
#[command(name = "explain_client")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    url: String,

    #[arg(long, default_value = "example input")]
    input: String,

    #[arg(long, help = "GitHub session token (or `testemail: you@example.com`)")]
    session: Option<String>,

    #[arg(long)]
    organization: Option<String>,

    #[arg(long, help = "Code to explain")]
    code: Option<String>,
}

fn payload(args: &Args) -> Value {
    let mut body = Map::new();
    body.insert("input".to_string(), json!(args.input));
    for (key, value) in [
        ("session", &args.session),
        ("organization", &args.organization),
        ("code", &args.code),
    ] {
        if let Some(value) = value {
            body.insert(key.to_string(), json!(value));
        }
    }
    Value::Object(body)
}

fn render(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let endpoint = format!("{}/explain", args.url.trim_end_matches('/'));

    println!("🚀 POST {}", endpoint);
    let result = async {
        let response = reqwest::Client::new()
            .post(&endpoint)
            .json(&payload(&args))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;

    match result {
        Ok((status, body)) => {
            println!("📋 HTTP {}", status);
            println!("{}", render(&body));
        }
        Err(e) => {
            let error = BoostError::from(e);
            eprintln!("❌ Request failed: {}", error.user_friendly_message());
            eprintln!("💡 建議: {}", error.recovery_suggestion());
            std::process::exit(exit_code(&error));
        }
    }
}

fn exit_code(error: &BoostError) -> i32 {
    match error.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    }
}
