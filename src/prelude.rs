//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthStateObserver, AuthStatus, AuthorizationError, AuthorizationState, CblAuthorizer,
    ConnectivityObserver, ConnectivityStatus, CredentialStore, FileCredentialStore, Snapshot,
};
pub use crate::config::{CblConfig, DeviceIdentity};
pub use crate::error::{CblError, Result};
