//! The credential broker (C2, spec.md §4.2).
//!
//! Mints installation tokens scoped to a caller-supplied repository list,
//! stores/rotates/revokes them, and collapses concurrent mints for the same
//! `(appID, repoSet)` key into a single provider call (§5 "Shared-resource
//! policy"). The broker has no opinion on *how* tokens are persisted or
//! exchanged — those are the `SecretStore` and `TokenExchange` ports, kept
//! separate so the rotation/expiry math here is unit-testable without a
//! live cluster or network call.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::error::CredentialError;

/// Rotation margin: a token is considered expired once less than this much
/// time remains before its real expiry (§4.2).
pub const ROTATION_MARGIN: Duration = Duration::minutes(5);

/// Configuration needed to assemble and exchange the App JWT (§4.2).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub app_id: String,
    pub private_key_pem: Vec<u8>,
    pub token_exchange_url: String,
}

/// A freshly minted token and its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub material: String,
    pub expiry: DateTime<Utc>,
}

/// A token secret as persisted by the operator (§6 "Credential secret annotations").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub name: String,
    pub material: String,
    pub repositories: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl StoredSecret {
    /// §4.2 `isExpired`: true once `now + ROTATION_MARGIN >= expiry`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + ROTATION_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Serialize)]
struct AppJwtClaims {
    iss: String,
    iat: i64,
    exp: i64,
}

/// Exchanges a signed App JWT for a scoped installation token. The only
/// implementation shipped here talks to a GitHub-App-shaped HTTP endpoint;
/// tests provide a stub.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, jwt: &str, repositories: &[String]) -> Result<MintedToken, CredentialError>;
}

/// HTTP-backed token exchange (SPEC_FULL.md §A.1).
pub struct HttpTokenExchange {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenExchange {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    repositories: &'a [String],
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, jwt: &str, repositories: &[String]) -> Result<MintedToken, CredentialError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(jwt)
            .json(&ExchangeRequest { repositories })
            .send()
            .await
            .map_err(|e| CredentialError::ProviderError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CredentialError::ProviderError(format!(
                "provider returned {}",
                resp.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct Resp {
            token: String,
            expires_at: DateTime<Utc>,
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| CredentialError::ProviderError(e.to_string()))?;
        Ok(MintedToken {
            material: body.token,
            expiry: body.expires_at,
        })
    }
}

/// Persists/retrieves/deletes token secrets. The real implementation writes
/// Kubernetes `Secret` objects; tests use an in-memory store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, CredentialError>;
    async fn put(&self, secret: StoredSecret) -> Result<(), CredentialError>;
    async fn delete(&self, name: &str) -> Result<(), CredentialError>;
}

/// In-memory `SecretStore` used by tests and the credential-broker cache's
/// own unit tests; not used in production (see `crate::reconcile::task`'s
/// Kubernetes-backed store).
#[derive(Default)]
pub struct InMemorySecretStore {
    inner: Mutex<HashMap<String, StoredSecret>>,
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, CredentialError> {
        Ok(self.inner.lock().await.get(name).cloned())
    }

    async fn put(&self, secret: StoredSecret) -> Result<(), CredentialError> {
        self.inner.lock().await.insert(secret.name.clone(), secret);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), CredentialError> {
        self.inner.lock().await.remove(name);
        Ok(())
    }
}

/// Cache key: the App identity plus the normalized (sorted, deduped)
/// repository set it was scoped to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct CacheKey {
    app_id: String,
    repos: BTreeSet<String>,
}

/// Single-flight in-memory token cache (§5 "Shared-resource policy").
///
/// Concurrent mints for the same key share one in-flight provider call: the
/// per-key lock is held across the network round trip, so the second caller
/// blocks on the first's result rather than issuing a duplicate request.
#[derive(Default)]
struct TokenCache {
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<Option<MintedToken>>>>>,
}

impl TokenCache {
    async fn entry(&self, key: CacheKey) -> Arc<Mutex<Option<MintedToken>>> {
        self.locks
            .lock()
            .await
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

/// Mints, stores, rotates, and revokes repository-scoped installation tokens.
pub struct CredentialBroker<E: TokenExchange, S: SecretStore> {
    exchange: E,
    store: S,
    cache: TokenCache,
}

impl<E: TokenExchange, S: SecretStore> CredentialBroker<E, S> {
    pub fn new(exchange: E, store: S) -> Self {
        Self {
            exchange,
            store,
            cache: TokenCache::default(),
        }
    }

    /// `mint(providerConfig, repos, namespace) -> (tokenMaterial, expiry)` (§4.2).
    ///
    /// Assembles the App JWT (`iat = now - 60s`, `exp = now + 600s`),
    /// exchanges it for an installation token scoped to `repos`, and
    /// collapses concurrent mints for the same `(appID, repoSet)` into one
    /// provider call.
    pub async fn mint(
        &self,
        provider: &ProviderConfig,
        repos: &[String],
        now: DateTime<Utc>,
    ) -> Result<MintedToken, CredentialError> {
        if repos.is_empty() {
            return Err(CredentialError::EmptyRepositoryList);
        }

        let key = CacheKey {
            app_id: provider.app_id.clone(),
            repos: repos.iter().cloned().collect(),
        };
        let slot = self.cache.entry(key).await;
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if now + ROTATION_MARGIN < cached.expiry {
                return Ok(cached.clone());
            }
        }

        let jwt = assemble_app_jwt(provider, now)?;
        let minted = self.exchange.exchange(&jwt, repos).await?;
        *guard = Some(minted.clone());
        Ok(minted)
    }

    /// `store(name, material, repos, expiry)` (§4.2). Overwrites any
    /// existing secret of the same name and stamps `rotated_at` if one
    /// already existed with different material.
    pub async fn store(
        &self,
        name: &str,
        minted: &MintedToken,
        repos: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let previous = self.store.get(name).await?;
        let rotated_at = match &previous {
            Some(prev) if prev.material != minted.material => Some(now),
            Some(prev) => prev.rotated_at,
            None => None,
        };
        self.store
            .put(StoredSecret {
                name: name.to_string(),
                material: minted.material.clone(),
                repositories: repos.to_vec(),
                expires_at: minted.expiry,
                rotated_at,
            })
            .await
    }

    /// `delete(name)` (§4.2).
    pub async fn delete(&self, name: &str) -> Result<(), CredentialError> {
        self.store.delete(name).await
    }

    /// `isExpired(namedSecret) -> bool` (§4.2): true if the secret is
    /// absent or within the rotation margin of expiry.
    pub async fn is_expired(&self, name: &str, now: DateTime<Utc>) -> Result<bool, CredentialError> {
        match self.store.get(name).await? {
            Some(secret) => Ok(secret.is_expired_at(now)),
            None => Ok(true),
        }
    }

    pub async fn get(&self, name: &str) -> Result<Option<StoredSecret>, CredentialError> {
        self.store.get(name).await
    }
}

fn assemble_app_jwt(provider: &ProviderConfig, now: DateTime<Utc>) -> Result<String, CredentialError> {
    let iat = now - Duration::seconds(60);
    let exp = now + Duration::seconds(600);
    if iat >= exp {
        return Err(CredentialError::ClockSkew);
    }
    let claims = AppJwtClaims {
        iss: provider.app_id.clone(),
        iat: iat.timestamp(),
        exp: exp.timestamp(),
    };
    let key = EncodingKey::from_rsa_pem(&provider.private_key_pem)
        .map_err(|e| CredentialError::SigningKeyUnreadable(e.to_string()))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| CredentialError::SigningKeyUnreadable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExchange {
        calls: AtomicUsize,
        expiry_secs: i64,
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self, _jwt: &str, repositories: &[String]) -> Result<MintedToken, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MintedToken {
                material: format!("tok-{}", repositories.join(",")),
                expiry: Utc::now() + Duration::seconds(self.expiry_secs),
            })
        }
    }

    fn test_provider() -> ProviderConfig {
        // A throwaway 2048-bit RSA test key (not used anywhere else).
        ProviderConfig {
            app_id: "app-1".to_string(),
            private_key_pem: TEST_RSA_KEY.as_bytes().to_vec(),
            token_exchange_url: "http://localhost/exchange".to_string(),
        }
    }

    #[tokio::test]
    async fn mint_rejects_empty_repository_list() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 600 },
            InMemorySecretStore::default(),
        );
        let err = broker.mint(&test_provider(), &[], Utc::now()).await.unwrap_err();
        assert!(matches!(err, CredentialError::EmptyRepositoryList));
    }

    #[tokio::test]
    async fn store_records_exact_repository_set_and_future_expiry() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 600 },
            InMemorySecretStore::default(),
        );
        let now = Utc::now();
        let repos = vec!["acme/frontend".to_string(), "acme/backend".to_string()];
        let minted = broker.mint(&test_provider(), &repos, now).await.unwrap();
        broker.store("task-1-github-token", &minted, &repos, now).await.unwrap();

        let stored = broker.get("task-1-github-token").await.unwrap().unwrap();
        assert_eq!(stored.repositories, repos);
        assert!(stored.expires_at > now);
    }

    #[tokio::test]
    async fn is_expired_true_when_absent() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 600 },
            InMemorySecretStore::default(),
        );
        assert!(broker.is_expired("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn is_expired_true_within_rotation_margin() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 60 }, // < 5m margin
            InMemorySecretStore::default(),
        );
        let now = Utc::now();
        let repos = vec!["acme/frontend".to_string()];
        let minted = broker.mint(&test_provider(), &repos, now).await.unwrap();
        broker.store("task-1-github-token", &minted, &repos, now).await.unwrap();
        assert!(broker.is_expired("task-1-github-token", now).await.unwrap());
    }

    #[tokio::test]
    async fn rotation_keeps_same_repository_set_unless_caller_changes_it() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 600 },
            InMemorySecretStore::default(),
        );
        let now = Utc::now();
        let repos = vec!["acme/frontend".to_string()];
        let first = broker.mint(&test_provider(), &repos, now).await.unwrap();
        broker.store("task-1-github-token", &first, &repos, now).await.unwrap();

        let later = now + Duration::minutes(10);
        let second = broker.mint(&test_provider(), &repos, later).await.unwrap();
        broker.store("task-1-github-token", &second, &repos, later).await.unwrap();

        let stored = broker.get("task-1-github-token").await.unwrap().unwrap();
        assert_eq!(stored.repositories, repos);
        assert!(stored.rotated_at.is_some());
    }

    #[tokio::test]
    async fn delete_removes_the_secret() {
        let broker = CredentialBroker::new(
            CountingExchange { calls: AtomicUsize::new(0), expiry_secs: 600 },
            InMemorySecretStore::default(),
        );
        let now = Utc::now();
        let repos = vec!["acme/frontend".to_string()];
        let minted = broker.mint(&test_provider(), &repos, now).await.unwrap();
        broker.store("task-1-github-token", &minted, &repos, now).await.unwrap();
        broker.delete("task-1-github-token").await.unwrap();
        assert!(broker.get("task-1-github-token").await.unwrap().is_none());
    }

    // A non-secret, throwaway RSA test key used only to exercise JWT assembly in tests.
    const TEST_RSA_KEY: &str = include_str!("test_fixtures/test_rsa_key.pem");
}
