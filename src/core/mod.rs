pub mod auth;
pub mod chunking;
pub mod optimizer;
pub mod processor;
pub mod prompts;
pub mod throttler;
pub mod usage;

pub use crate::domain::ports::{ChatCompletion, SessionVerifier, Storage, SubscriptionStore};
pub use crate::utils::error::Result;
