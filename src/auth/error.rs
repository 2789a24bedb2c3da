use strum::Display;
use thiserror::Error;

/// Failures from the authorization server exchange.
///
/// Every network or parsing problem is folded into one of these two kinds
/// before it reaches the state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// Connection refused, timeout, TLS failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Non-200 status, malformed JSON, or a missing field.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ExchangeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Protocol(_) => FailureKind::Protocol,
        }
    }

    pub(crate) fn missing_field(field: &str) -> Self {
        Self::Protocol(format!("response missing `{field}`"))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Protocol(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}

/// Why the last flow or refresh did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Protocol,
    /// The device code ran out of poll attempts.
    Expiry,
    /// A refresh came due while disconnected.
    OfflineRefresh,
}
