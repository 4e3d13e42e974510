use crate::config::toml_config::SubscriptionConfig;
use crate::domain::model::{Account, AccountStatus};
use crate::domain::ports::SubscriptionStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Subscriptions kept in the service configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredSubscriptions {
    organizations: HashMap<String, AccountStatus>,
    auto_enroll: bool,
}

impl ConfiguredSubscriptions {
    pub fn new(config: &SubscriptionConfig) -> Self {
        Self {
            organizations: config.organizations.clone(),
            auto_enroll: config.auto_enroll,
        }
    }
}

#[async_trait]
impl SubscriptionStore for ConfiguredSubscriptions {
    async fn check(&self, email: &str, organization: &str) -> Result<Option<Account>> {
        let status = match self.organizations.get(organization) {
            Some(status) => *status,
            None if self.auto_enroll => {
                tracing::info!(
                    "Enrolling organization {} for {} in a trial",
                    organization,
                    email
                );
                AccountStatus::Trial
            }
            None => {
                tracing::warn!("No subscription for organization {}", organization);
                return Ok(None);
            }
        };

        Ok(Some(Account {
            email: Some(email.to_string()),
            organization: organization.to_string(),
            status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(auto_enroll: bool) -> ConfiguredSubscriptions {
        let mut organizations = HashMap::new();
        organizations.insert("polytest.ai".to_string(), AccountStatus::Paid);
        organizations.insert("lapsed".to_string(), AccountStatus::Suspended);
        ConfiguredSubscriptions::new(&SubscriptionConfig {
            auto_enroll,
            organizations,
        })
    }

    #[test]
    fn test_configured_organization() {
        let account = tokio_test::block_on(store(false).check("a@polytest.ai", "polytest.ai"))
            .unwrap()
            .unwrap();
        assert_eq!(account.status, AccountStatus::Paid);
        assert_eq!(account.email.as_deref(), Some("a@polytest.ai"));
    }

    #[test]
    fn test_unknown_organization() {
        assert!(tokio_test::block_on(store(false).check("a@b.c", "unknown"))
            .unwrap()
            .is_none());
        let trial = tokio_test::block_on(store(true).check("a@b.c", "unknown"))
            .unwrap()
            .unwrap();
        assert_eq!(trial.status, AccountStatus::Trial);
    }

    #[test]
    fn test_suspended_is_returned_unusable() {
        let account = tokio_test::block_on(store(true).check("a@b.c", "lapsed"))
            .unwrap()
            .unwrap();
        assert!(!account.status.is_usable());
    }
}
