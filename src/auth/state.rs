//! Authorization state values shared with observers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of the device credential.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationState {
    #[default]
    Uninitialized,
    Authorizing,
    Refreshed,
    Expired,
}

/// Error code paired with an [`AuthorizationState`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationError {
    #[default]
    NoError,
    AuthorizationFailed,
    AuthorizationExpired,
}

/// The `{state, error, token}` tuple delivered to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub state: AuthorizationState,
    pub error: AuthorizationError,
    pub token: String,
}

impl AuthStatus {
    pub fn new(state: AuthorizationState, error: AuthorizationError, token: impl Into<String>) -> Self {
        Self {
            state,
            error,
            token: token.into(),
        }
    }

    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn is_refreshed(&self) -> bool {
        self.state == AuthorizationState::Refreshed
    }
}
