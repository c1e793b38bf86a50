//! Bearer tokens issued by an identity provider.

use serde::{Deserialize, Serialize};

/// An access token and its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds from `issued_at`.
    pub expires_in: u64,
    /// Epoch seconds at which the token was stored.
    pub issued_at: u64,
}

impl Token {
    /// Create a new token.
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: u64,
        issued_at: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_in,
            issued_at,
        }
    }

    /// Epoch second at which the token stops being valid.
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    /// Valid while `issued_at + expires_in > now`.
    pub fn is_valid_at(&self, now_epoch_secs: u64) -> bool {
        self.expires_at() > now_epoch_secs
    }
}
