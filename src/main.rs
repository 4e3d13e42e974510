use anyhow::Context;
use boost_service::adapters::server::{create_router, ServerState};
use boost_service::utils::error::{BoostError, ErrorSeverity};
use boost_service::utils::monitor::SystemMonitor;
use boost_service::utils::{logger, validation::Validate};
use boost_service::{build_dispatcher, CliConfig, ServiceConfig};
use clap::Parser;
use std::sync::Arc;

fn load_service_config(cli: &CliConfig) -> boost_service::Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📄 Loading configuration from {}", path);
            ServiceConfig::from_file(path)?
        }
        None => ServiceConfig::default(),
    }
    .with_env_overrides()?;

    if let Some(stage) = cli.stage {
        config.service.stage = stage;
    }
    if let Some(prompt_dir) = &cli.prompt_dir {
        config.storage.prompt_dir = prompt_dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn exit_with(error: &BoostError) -> ! {
    tracing::error!(
        "❌ Startup failed: {} (Severity: {:?})",
        error,
        error.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", error.recovery_suggestion());

    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 建議: {}", error.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match error.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting boost-local");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    let config = match load_service_config(&cli) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    if config.openai.api_key.is_empty() {
        tracing::warn!("⚠️ OPENAI_API_KEY is not set; analysis functions will fail upstream");
    }

    let dispatcher = match build_dispatcher(&config, None) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => exit_with(&e),
    };

    let monitor = Arc::new(SystemMonitor::new(cli.monitor));
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let app = create_router(ServerState::new(dispatcher.clone(), monitor.clone()));
    let listener = tokio::net::TcpListener::bind(cli.address())
        .await
        .with_context(|| format!("failed to bind {}", cli.address()))?;

    tracing::info!(
        "✅ Serving {} functions on http://{} (stage: {})",
        dispatcher.functions().len(),
        cli.address(),
        dispatcher.stage()
    );
    println!("✅ Boost dev server listening on http://{}", cli.address());
    println!("📋 Functions: {}", dispatcher.functions().join(", "));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    monitor.log_final_stats();
    Ok(())
}
