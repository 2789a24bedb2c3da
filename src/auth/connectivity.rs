use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Binary network signal from the host's network-status provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
}

impl ConnectivityStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<bool> for ConnectivityStatus {
    fn from(connected: bool) -> Self {
        if connected {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}

/// Receiver of connectivity transitions.
pub trait ConnectivityObserver: Send + Sync {
    fn on_connectivity_changed(&self, status: ConnectivityStatus);
}
