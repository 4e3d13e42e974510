// Adapters layer: concrete clients for the services the domain ports describe.

pub mod github;
pub mod openai;
#[cfg(feature = "cli")]
pub mod server;
pub mod subscriptions;
