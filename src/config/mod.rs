pub mod cli;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::Stage;
#[cfg(feature = "cli")]
use clap::Parser;

/// Local development server options.
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "boost-local")]
#[command(about = "Local development server for the Boost code analysis functions")]
pub struct CliConfig {
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(long, default_value = "8000")]
    pub port: u16,

    #[arg(long, short = 'c', help = "Service configuration file (TOML)")]
    pub config: Option<String>,

    #[arg(long, help = "Override the configured stage (dev, test, staging, prod, local)")]
    pub stage: Option<Stage>,

    #[arg(long, help = "Directory holding the bundled prompt files")]
    pub prompt_dir: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process CPU and memory after each request")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
