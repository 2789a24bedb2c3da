//! cbl: Code-Based Linking device authorization client.
//!
//! Obtains an access token for a headless device through the device-code
//! grant: the device shows a short code, the user confirms it in a browser,
//! and the client polls until the authorization server issues tokens. The
//! refresh token is persisted and the access token is refreshed before it
//! expires for as long as the process runs.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cbl::prelude::*;
//!
//! struct PrintState;
//!
//! impl AuthStateObserver for PrintState {
//!     fn on_auth_state_changed(
//!         &self,
//!         state: AuthorizationState,
//!         error: AuthorizationError,
//!         _token: &str,
//!     ) {
//!         println!("{state} ({error})");
//!     }
//!
//!     fn on_code_pair_received(&self, verification_uri: &str, user_code: &str) {
//!         println!("Visit {verification_uri} and enter {user_code}");
//!     }
//! }
//!
//! # async fn example() -> cbl::error::Result<()> {
//! let authorizer = CblAuthorizer::new(CblConfig::load(None)?)?;
//! authorizer.subscribe(Arc::new(PrintState)).await?;
//! authorizer.authorize()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod prelude;
pub mod scheduler;

#[cfg(feature = "cli")]
pub mod cli;
