use crate::core::credentials::{CredentialManager, TokenExchange, TokenGrant};
use crate::core::error::{is_auth_failure_status, is_retryable_status, Error, Result};
use crate::core::retry::{parse_retry_after, RetryPolicy};
use crate::core::settings::ApiSettings;
use crate::octopus::queries::{self, GraphQlResponse, ObtainTokenData};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const USER_AGENT: &str = concat!("octojoin/", env!("CARGO_PKG_VERSION"));

/// Substrings that mark an otherwise successful response as an auth failure.
pub const AUTH_FAILURE_MARKERS: [&str; 6] = [
    "Signature of the JWT has expired",
    "JWT has expired",
    "Token has expired",
    "KT-CT-1139",
    "KT-CT-1143",
    "Authentication failed",
];

const AUTH_ERROR_CODES: [&str; 2] = ["KT-CT-1139", "KT-CT-1143"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    None,
    /// HTTP basic auth with the API key as username.
    ApiKey,
    /// Raw bearer token in the `Authorization` header.
    Bearer,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Decodes a GraphQL body, failing on non-200 status or an `errors` list.
    pub fn graphql<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.ensure_status(endpoint, &[200])?;
        self.json::<GraphQlResponse<T>>(endpoint)?.into_data(endpoint)
    }

    pub fn ensure_status(&self, endpoint: &str, accepted: &[u16]) -> Result<()> {
        if accepted.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::Status {
                endpoint: endpoint.to_string(),
                status: self.status,
            })
        }
    }
}

pub fn find_auth_marker(body: &str) -> Option<&'static str> {
    AUTH_FAILURE_MARKERS
        .into_iter()
        .find(|marker| body.contains(marker))
}

fn auth_error_code(body: &str) -> Option<&'static str> {
    AUTH_ERROR_CODES.into_iter().find(|code| body.contains(code))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub requests_total: u64,
    pub retries_total: u64,
}

pub struct Transport {
    client: reqwest::Client,
    credentials: CredentialManager,
    token_url: String,
    policy: RetryPolicy,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
    requests_total: AtomicU64,
    retries_total: AtomicU64,
}

impl Transport {
    pub fn new(api: &ApiSettings, credentials: CredentialManager) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| Error::Transport {
                endpoint: "client builder".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            credentials,
            token_url: api.graphql_url.clone(),
            policy: RetryPolicy::new(api.max_retries, api.backoff_base()),
            min_interval: api.min_interval(),
            last_request: Mutex::new(None),
            requests_total: AtomicU64::new(0),
            retries_total: AtomicU64::new(0),
        })
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
        }
    }

    pub async fn get(&self, url: &str, auth: Auth) -> Result<ApiResponse> {
        self.request(Method::GET, url, None, auth, self.policy).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>, auth: Auth) -> Result<ApiResponse> {
        self.request(Method::POST, url, body, auth, self.policy).await
    }

    pub async fn graphql(&self, url: &str, query: &str, variables: Value) -> Result<ApiResponse> {
        let body = json!({ "query": query, "variables": variables });
        self.post(url, Some(&body), Auth::Bearer).await
    }

    /// Issues one logical call. Transport errors and retryable statuses are
    /// retried with backoff; an auth failure on a bearer call invalidates the
    /// token and repeats the call once.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        auth: Auth,
        policy: RetryPolicy,
    ) -> Result<ApiResponse> {
        let mut policy = policy;
        loop {
            let token = match auth {
                Auth::Bearer => Some(self.credentials.ensure_valid(self, Utc::now()).await?),
                Auth::None | Auth::ApiKey => None,
            };

            let response = self
                .send_with_retry(&method, url, body, auth, token.as_deref(), &policy)
                .await?;

            let marker = match response.status {
                200 if auth == Auth::Bearer => find_auth_marker(&response.body),
                status if is_auth_failure_status(status) => Some("rejected credentials"),
                _ => None,
            };
            let Some(marker) = marker else {
                return Ok(response);
            };

            if auth == Auth::Bearer && policy.retry_on_auth {
                tracing::warn!(url, status = response.status, marker, "Auth failure, refreshing token and retrying once");
                self.credentials.invalidate(Utc::now()).await;
                policy = policy.without_auth_retry();
                continue;
            }

            return Err(Error::auth(
                auth_error_code(&response.body),
                format!("{} returned status {}: {}", url, response.status, marker),
            ));
        }
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        auth: Auth,
        token: Option<&str>,
        policy: &RetryPolicy,
    ) -> Result<ApiResponse> {
        let mut attempt = 0;
        loop {
            self.pace().await;
            self.requests_total.fetch_add(1, Ordering::Relaxed);

            let mut request = self.client.request(method.clone(), url);
            request = match (auth, token) {
                (Auth::ApiKey, _) => request.basic_auth(self.credentials.api_key(), None::<&str>),
                (Auth::Bearer, Some(token)) => request.header(AUTHORIZATION, token),
                _ => request,
            };
            if let Some(body) = body {
                request = request.json(body);
            }

            let started = Instant::now();
            let response = match request.send().await {
                Ok(response) => response,
                Err(source) => {
                    if policy.can_retry(attempt) {
                        self.back_off_after_failure(url, attempt, policy, &source).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Transport {
                        endpoint: url.to_string(),
                        source,
                    });
                }
            };

            let status = response.status().as_u16();
            tracing::debug!(%method, url, status, elapsed_ms = started.elapsed().as_millis() as u64, "API request");

            if is_retryable_status(status) {
                if policy.can_retry(attempt) {
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let delay = policy.delay_for(attempt, retry_after);
                    tracing::warn!(
                        url,
                        status,
                        attempt = attempt + 1,
                        max_attempts = policy.max_retries + 1,
                        ?delay,
                        "Retryable status, backing off"
                    );
                    self.retries_total.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(Error::RateLimited {
                    endpoint: url.to_string(),
                    status,
                    attempts: attempt + 1,
                });
            }

            // The client timeout also covers the body, so a stalled or cut
            // off body is a transport failure like a failed send.
            match response.text().await {
                Ok(body) => return Ok(ApiResponse { status, body }),
                Err(source) if policy.can_retry(attempt) => {
                    self.back_off_after_failure(url, attempt, policy, &source).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(Error::Transport {
                        endpoint: url.to_string(),
                        source,
                    })
                }
            }
        }
    }

    async fn back_off_after_failure(
        &self,
        url: &str,
        attempt: u32,
        policy: &RetryPolicy,
        source: &reqwest::Error,
    ) {
        let delay = policy.backoff(attempt);
        tracing::warn!(
            url,
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            error = %source,
            ?delay,
            "Request failed, retrying"
        );
        self.retries_total.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(?wait, "Pacing outbound request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl TokenExchange for Transport {
    async fn exchange(&self, api_key: &str) -> Result<TokenGrant> {
        let body = json!({
            "query": queries::OBTAIN_TOKEN,
            "variables": { "input": { "APIKey": api_key } },
        });
        let response = self
            .request(
                Method::POST,
                &self.token_url,
                Some(&body),
                Auth::None,
                self.policy.without_auth_retry(),
            )
            .await?;

        let data: ObtainTokenData = response.graphql(&self.token_url)?;
        Ok(TokenGrant {
            token: data.obtain_kraken_token.token,
            expires_in_secs: data.obtain_kraken_token.refresh_expires_in,
        })
    }
}
