//! Bearer-token lifecycle for one identity provider.
//!
//! # States
//!
//! ```text
//! NoToken ──► Refreshing ──► Valid ──(time)──► Expired ──► Refreshing ──► Valid
//!                  │                                            │
//!                  └──────────────► Failed ◄────────────────────┘
//! ```
//!
//! `Failed` is not stored: a failed refresh leaves whatever token was there
//! before (valid or not) untouched and reports the error to the caller.
//!
//! # Concurrency
//!
//! The hot path (a valid token exists) takes a read lock on an
//! `Arc<Token>` and returns without touching the network. Refreshes are
//! serialised behind an async mutex and double-checked against an attempt
//! counter: a caller that waited while someone else finished a refresh
//! shares that refresh's outcome, the new token or the failure, instead of
//! issuing its own request. A new token is published by swapping the `Arc`,
//! so readers see either the old token or the new one, never a partial write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::telemetry;
use crate::types::{AuthConfig, Token};
use crate::{MimirError, Result};

/// Observable state of a [`TokenManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Valid,
    Expired,
}

/// Owns the token for one [`AuthConfig`].
pub struct TokenManager {
    config: AuthConfig,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Arc<Token>>>,
    /// Failure of the last finished refresh, cleared by a committed token.
    last_failure: RwLock<Option<RefreshFailure>>,
    /// Bumped whenever a refresh finishes, successfully or not.
    attempts: AtomicU64,
    refresh: Mutex<()>,
}

/// Why a token request produced no token.
#[derive(Debug, Clone)]
enum RefreshFailure {
    /// The endpoint answered without a usable token.
    Rejected(String),
    /// The endpoint could not be reached.
    Unreachable(String),
}

impl TokenManager {
    pub fn new(config: AuthConfig, http: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            http,
            clock,
            current: RwLock::new(None),
            last_failure: RwLock::new(None),
            attempts: AtomicU64::new(0),
            refresh: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The stored token, valid or not.
    pub fn current(&self) -> Option<Arc<Token>> {
        self.current.read().unwrap().clone()
    }

    pub fn state(&self) -> TokenState {
        match self.current() {
            None => TokenState::NoToken,
            Some(token) if token.is_valid_at(self.clock.epoch_secs()) => TokenState::Valid,
            Some(_) => TokenState::Expired,
        }
    }

    /// Return a valid access token, requesting a new one if needed.
    ///
    /// With `force_refresh` the stored token is replaced even if still valid,
    /// unless another caller finished a refresh while this one waited. At
    /// most one token request is in flight; callers queued behind it get its
    /// result, including its error.
    #[instrument(skip(self), fields(host = %self.config.host))]
    pub async fn get_token(&self, force_refresh: bool) -> Result<String> {
        let seen = self.attempts.load(Ordering::Acquire);

        if !force_refresh {
            if let Some(token) = self.valid_token() {
                return Ok(token.access_token.clone());
            }
        }

        let _guard = self.refresh.lock().await;

        // Someone else finished a refresh while we waited for the lock.
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(failure) = self.last_failure.read().unwrap().clone() {
                debug!("sharing failed refresh of a concurrent caller");
                return Err(self.to_error(failure));
            }
            if let Some(token) = self.valid_token() {
                debug!("reusing token refreshed by a concurrent caller");
                return Ok(token.access_token.clone());
            }
        }

        match self.request_token().await {
            Ok(token) => {
                let access_token = token.access_token.clone();
                self.commit(token);
                Ok(access_token)
            }
            Err(failure) => {
                self.fail(failure.clone());
                Err(self.to_error(failure))
            }
        }
    }

    fn valid_token(&self) -> Option<Arc<Token>> {
        let now = self.clock.epoch_secs();
        self.current
            .read()
            .unwrap()
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .cloned()
    }

    fn commit(&self, token: Token) {
        let token = Arc::new(token);
        *self.current.write().unwrap() = Some(token);
        *self.last_failure.write().unwrap() = None;
        self.attempts.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a failed refresh. The stored token is left as it was.
    fn fail(&self, failure: RefreshFailure) {
        *self.last_failure.write().unwrap() = Some(failure);
        self.attempts.fetch_add(1, Ordering::AcqRel);
    }

    /// POST credentials to the token endpoint and parse the reply.
    async fn request_token(&self) -> std::result::Result<Token, RefreshFailure> {
        let url = self.config.token_url();
        let body = TokenRequest {
            client_id: &self.config.credentials.client_id,
            secret: &self.config.credentials.secret,
        };

        let result: std::result::Result<Token, RefreshFailure> = async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_failure(&e))?;

            let status = response.status();
            let text = response.text().await.map_err(|e| transport_failure(&e))?;

            if text.trim().is_empty() {
                return Err(RefreshFailure::Rejected(format!(
                    "empty token response (HTTP {status}), check client credentials"
                )));
            }
            if !status.is_success() {
                return Err(RefreshFailure::Rejected(format!(
                    "token endpoint returned HTTP {status}"
                )));
            }

            let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| {
                RefreshFailure::Rejected(format!("unparseable token response: {e}"))
            })?;
            if parsed.access_token.is_empty() {
                return Err(RefreshFailure::Rejected(
                    "token response has no access token".to_string(),
                ));
            }
            if parsed.expires_in == 0 {
                warn!(url = %url, "token response has no expiry, token will not be reused");
            }

            Ok(Token::new(
                parsed.access_token,
                parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
                parsed.expires_in,
                self.clock.epoch_secs(),
            ))
        }
        .await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::TOKEN_REFRESHES_TOTAL,
            "host" => self.config.host.clone(),
            "status" => status,
        )
        .increment(1);

        if let Err(failure) = &result {
            warn!(url = %url, error = ?failure, "token request failed");
        }
        result
    }

    fn to_error(&self, failure: RefreshFailure) -> MimirError {
        let host = self.config.host.clone();
        let port = self.config.port_label();
        let path = self.config.token_path.clone();
        match failure {
            RefreshFailure::Rejected(reason) => MimirError::Authentication {
                host,
                port,
                path,
                reason,
            },
            RefreshFailure::Unreachable(reason) => MimirError::AuthTransport {
                host,
                port,
                path,
                reason,
            },
        }
    }
}

fn transport_failure(err: &reqwest::Error) -> RefreshFailure {
    if err.is_timeout() {
        RefreshFailure::Unreachable("request timed out".to_string())
    } else {
        RefreshFailure::Unreachable(err.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
}

/// Accepts both camelCase and OAuth2-style snake_case field names.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(alias = "access_token")]
    access_token: String,
    #[serde(default, alias = "token_type")]
    token_type: Option<String>,
    #[serde(default, alias = "expires_in")]
    expires_in: u64,
}
