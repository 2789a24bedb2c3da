use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use super::token::{optional_seconds, seconds, TokenGrant};

/// Response from `create/codepair`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodePairResponse {
    pub verification_uri: String,
    pub user_code: String,
    pub device_code: String,
    #[serde(deserialize_with = "seconds")]
    pub expires_in: i64,
    #[serde(default, alias = "interval", deserialize_with = "optional_seconds")]
    pub poll_interval: Option<i64>,
}

/// Outcome of one poll against the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePoll {
    /// Non-200: the user has not finished yet.
    Pending { status: u16 },
    Authorized { grant: TokenGrant },
}

/// A code pair that is being polled.
///
/// Owned by the state machine; observers only ever see the user code and
/// verification URI through the code-pair hooks.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_at: Instant,
    pub poll_interval: Duration,
    pub attempts_remaining: u64,
}

impl PendingAuthorization {
    pub fn from_response(response: CodePairResponse, default_interval: Duration) -> Self {
        let poll_interval = response
            .poll_interval
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(default_interval)
            .max(Duration::from_secs(1));
        let expires_in = response.expires_in.max(0) as u64;
        let attempts_remaining = expires_in / poll_interval.as_secs().max(1);
        Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
            poll_interval,
            attempts_remaining,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_remaining == 0 || Instant::now() >= self.expires_at
    }
}
