//! Code-based linking: device-code authorization, token refresh and
//! credential persistence.

pub mod connectivity;
pub mod device_code;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod observer;
pub mod state;
pub mod store;
pub mod token;

pub use connectivity::{ConnectivityObserver, ConnectivityStatus};
pub use device_code::{CodePairResponse, DevicePoll, PendingAuthorization};
pub use engine::{CblAuthorizer, Snapshot, TaskKind};
pub use error::{ExchangeError, FailureKind};
pub use exchange::{AuthExchange, HttpExchange};
pub use observer::{AuthStateObserver, ObserverRegistry};
pub use state::{AuthStatus, AuthorizationError, AuthorizationState};
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore};
pub use token::{Credential, TokenGrant, TokenInfo, UserProfile};
