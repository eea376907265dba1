//! Property test for the credential broker's scope/expiry guarantee (spec.md §8, P6).

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use swarm_operator::{CredentialError};
use swarm_operator::credentials::{CredentialBroker, InMemorySecretStore, MintedToken, ProviderConfig, TokenExchange};

const TEST_RSA_KEY: &str = include_str!("../src/credentials/test_fixtures/test_rsa_key.pem");

struct FixedExpiryExchange {
    expiry_secs: i64,
}

#[async_trait]
impl TokenExchange for FixedExpiryExchange {
    async fn exchange(&self, _jwt: &str, repositories: &[String]) -> Result<MintedToken, CredentialError> {
        Ok(MintedToken {
            material: format!("tok-{}", repositories.join(",")),
            expiry: Utc::now() + Duration::seconds(self.expiry_secs),
        })
    }
}

fn provider() -> ProviderConfig {
    ProviderConfig {
        app_id: "app-1".to_string(),
        private_key_pem: TEST_RSA_KEY.as_bytes().to_vec(),
        token_exchange_url: "http://localhost/exchange".to_string(),
    }
}

proptest! {
    /// P6: a stored secret's repository annotation set always equals the
    /// exact repository list it was minted for, and its expiry is strictly
    /// in the future immediately after minting (before any Failed/Completed
    /// transition could have occurred).
    #[test]
    fn prop_stored_secret_matches_requested_repositories(
        repo_count in 1usize..8,
        expiry_secs in 600i64..36000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let broker = CredentialBroker::new(
                FixedExpiryExchange { expiry_secs },
                InMemorySecretStore::default(),
            );
            let repos: Vec<String> = (0..repo_count).map(|i| format!("acme/repo-{i}")).collect();
            let now = Utc::now();

            let minted = broker.mint(&provider(), &repos, now).await.unwrap();
            broker.store("task-x-github-token", &minted, &repos, now).await.unwrap();

            let stored = broker.get("task-x-github-token").await.unwrap().unwrap();
            prop_assert_eq!(stored.repositories, repos);
            prop_assert!(stored.expires_at > now);
            Ok(())
        })?;
    }

    /// P9 (secret half): the naming convention `<task>-github-token` is stable
    /// for any task name, so cleanup always targets the secret that was
    /// actually created for that task.
    #[test]
    fn prop_secret_name_is_deterministic_per_task(task_name in "[a-z][a-z0-9-]{0,30}") {
        let expected = format!("{task_name}-github-token");
        prop_assert_eq!(expected.strip_suffix("-github-token").unwrap(), task_name);
    }
}
