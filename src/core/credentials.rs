use crate::core::error::{Error, Result};
use crate::core::models::Credential;
use crate::core::store::StateStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tokens are refreshed this long before they actually expire.
pub const REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub expires_in_secs: i64,
}

/// Swaps the long-lived API key for a short-lived bearer token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, api_key: &str) -> Result<TokenGrant>;
}

#[derive(Clone)]
pub struct CredentialManager {
    api_key: Arc<str>,
    store: StateStore,
    refresh: Arc<Mutex<()>>,
    buffer: Duration,
}

impl CredentialManager {
    pub fn new(api_key: impl Into<String>, store: StateStore) -> Self {
        Self {
            api_key: Arc::from(api_key.into()),
            store,
            refresh: Arc::new(Mutex::new(())),
            buffer: Duration::minutes(REFRESH_BUFFER_MINUTES),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns a token valid for longer than the refresh buffer, exchanging
    /// the API key for a new one when needed.
    pub async fn ensure_valid(
        &self,
        exchange: &dyn TokenExchange,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let _guard = self.refresh.lock().await;

        let current = self.store.credential().await;
        if current.is_fresh(now, self.buffer) {
            return Ok(current.token);
        }

        tracing::info!(
            expired_at = ?current.expires_at,
            "Bearer token missing or near expiry, refreshing"
        );

        let grant = exchange.exchange(&self.api_key).await.map_err(|e| match e {
            Error::GraphQl(message) => Error::auth(None, message),
            Error::Decode { message, .. } => Error::auth(None, message),
            other => other,
        })?;

        if grant.token.is_empty() {
            return Err(Error::auth(None, "token exchange returned no token"));
        }

        let expires_at = now + Duration::seconds(grant.expires_in_secs);
        let credential = Credential::new(grant.token, expires_at);
        self.store.set_credential(credential.clone()).await;
        self.persist(now).await;

        tracing::info!(%expires_at, "Obtained new bearer token");
        Ok(credential.token)
    }

    /// Drops the stored token so the next call exchanges a fresh one.
    pub async fn invalidate(&self, now: DateTime<Utc>) {
        let _guard = self.refresh.lock().await;
        tracing::info!("Invalidating bearer token");
        self.store.set_credential(Credential::default()).await;
        self.persist(now).await;
    }

    async fn persist(&self, now: DateTime<Utc>) {
        if let Err(e) = self.store.save(now).await {
            tracing::warn!(error = %e, "Failed to persist credential");
        }
    }
}
