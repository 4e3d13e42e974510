use crate::domain::model::Account;
use crate::domain::ports::{SessionIdentity, SessionVerifier, SubscriptionStore};
use crate::utils::error::{BoostError, Result, UnauthorizedReason};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

fn string_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Checks that a request comes from a GitHub user of a subscribed organization.
pub struct Authorizer {
    verifier: Arc<dyn SessionVerifier>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl Authorizer {
    pub fn new(
        verifier: Arc<dyn SessionVerifier>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            verifier,
            subscriptions,
        }
    }

    pub async fn validate(&self, data: &Map<String, Value>, correlation_id: &str) -> Result<Account> {
        let organization = string_field(data, "organization");
        let version = data.get("version").filter(|v| !v.is_null());

        // 舊版客戶端沒有送 version/organization
        let (Some(organization), Some(_)) = (organization, version) else {
            return Err(BoostError::unauthorized(
                "Error: please upgrade to use this service",
                UnauthorizedReason::UpgradeRequired,
            ));
        };

        let session = string_field(data, "session").unwrap_or_default();
        let started = Instant::now();
        let identity = self.verifier.identify(session).await?;
        tracing::info!(
            "Execution time {} github_verify_email: {:.3} seconds",
            correlation_id,
            started.elapsed().as_secs_f64()
        );
        tracing::info!(
            "BOOST_USAGE: email is {}",
            identity.email.as_deref().unwrap_or("None")
        );

        if !identity.belongs_to(organization) {
            tracing::warn!(
                "{}: GITHUB_ACCESS_NOT_FOUND for organization {}",
                correlation_id,
                organization
            );
            return Err(BoostError::unauthorized(
                "Error: please login to github to use this service",
                UnauthorizedReason::GitHubAccessNotFound,
            ));
        }

        let email = identity.email.clone().unwrap_or_default();
        match self.subscriptions.check(&email, organization).await? {
            Some(account) if account.status.is_usable() => Ok(account),
            _ => Err(BoostError::unauthorized(
                "Error: please subscribe to use this service",
                UnauthorizedReason::InvalidSubscriber,
            )),
        }
    }

    /// Identity behind a session, without organization or subscription checks.
    pub async fn identify(&self, data: &Map<String, Value>) -> Result<SessionIdentity> {
        let Some(session) = string_field(data, "session") else {
            return Err(BoostError::unauthorized(
                "Invalid authentication/authorization",
                UnauthorizedReason::InvalidSession,
            ));
        };
        self.verifier.identify(session).await
    }
}
