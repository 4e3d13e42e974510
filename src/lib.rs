pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::ServiceConfig};

#[cfg(feature = "lambda")]
pub use config::lambda::{LambdaConfig, S3Storage};

pub use app::dispatcher::FunctionDispatcher;
pub use app::{assemble, build_dispatcher};
pub use domain::model::{FunctionResponse, Stage};
pub use utils::error::{BoostError, Result};
