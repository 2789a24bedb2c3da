//! CLI command handlers for login, status, logout and run.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{
    AuthStateObserver, AuthStatus, AuthorizationError, AuthorizationState, CblAuthorizer,
    ConnectivityStatus, CredentialStore, FileCredentialStore,
};
use crate::config::CblConfig;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug)]
enum CliEvent {
    State(AuthStatus),
    CodePair {
        verification_uri: String,
        user_code: String,
    },
    CodeExpired,
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<CliEvent>,
}

impl AuthStateObserver for ChannelObserver {
    fn on_auth_state_changed(
        &self,
        state: AuthorizationState,
        error: AuthorizationError,
        token: &str,
    ) {
        let _ = self
            .tx
            .send(CliEvent::State(AuthStatus::new(state, error, token)));
    }

    fn on_code_pair_received(&self, verification_uri: &str, user_code: &str) {
        let _ = self.tx.send(CliEvent::CodePair {
            verification_uri: verification_uri.to_string(),
            user_code: user_code.to_string(),
        });
    }

    fn on_code_pair_expired(&self) {
        let _ = self.tx.send(CliEvent::CodeExpired);
    }
}

async fn start(
    config: CblConfig,
) -> Result<(CblAuthorizer, mpsc::UnboundedReceiver<CliEvent>), Box<dyn std::error::Error>> {
    let authorizer = CblAuthorizer::new(config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    authorizer.subscribe(Arc::new(ChannelObserver { tx })).await?;
    // Drop the replayed status.
    let _ = rx.recv().await;
    Ok((authorizer, rx))
}

/// Handle `cbl login`.
pub async fn handle_login(config: CblConfig) -> CliResult {
    config.validate()?;
    let wait_for_code = config.request_timeout() + std::time::Duration::from_secs(5);
    let (authorizer, mut rx) = start(config).await?;
    authorizer.authorize()?;

    let code_pair = tokio::time::timeout(wait_for_code, async {
        while let Some(event) = rx.recv().await {
            if let CliEvent::CodePair {
                verification_uri,
                user_code,
            } = event
            {
                return Some((verification_uri, user_code));
            }
        }
        None
    })
    .await;
    match code_pair {
        Ok(Some((verification_uri, user_code))) => {
            println!("🔗 Visit: {verification_uri}");
            println!("📋 Enter code: {user_code}");
            println!("⏳ Waiting for authorization...");
        }
        Ok(None) => return Err("authorizer stopped before a code was issued".into()),
        Err(_) => return Err("no code pair received; check network and client id".into()),
    }

    while let Some(event) = rx.recv().await {
        match event {
            CliEvent::State(status) if status.is_refreshed() => {
                println!("✅ Device linked");
                authorizer.shutdown()?;
                return Ok(());
            }
            CliEvent::CodeExpired => {
                authorizer.shutdown()?;
                return Err("code expired before the device was linked; run `cbl login` again".into());
            }
            _ => continue,
        }
    }
    Err("authorizer stopped unexpectedly".into())
}

/// Handle `cbl status`.
pub async fn handle_status(config: CblConfig) -> CliResult {
    let store = FileCredentialStore::new(config.store_path.clone());
    let record = store.load()?;
    let identity = config.identity.clone().or_record(&record);

    println!("🔐 Link Status\n");
    println!("  Client ID:     {}", display_or_unset(&identity.client_id));
    println!("  Product ID:    {}", display_or_unset(&identity.product_id));
    println!(
        "  Serial number: {}",
        display_or_unset(&identity.device_serial_number)
    );
    println!("  Store:         {}", store.path().display());
    if record.refresh_token.is_empty() {
        println!("  Linked:        ❌ No refresh token stored");
    } else {
        println!("  Linked:        ✅ Refresh token stored");
    }
    Ok(())
}

/// Handle `cbl logout`.
pub async fn handle_logout(config: CblConfig) -> CliResult {
    let (authorizer, mut rx) = start(config).await?;
    authorizer.deauthorize()?;
    let _ = rx.recv().await;
    authorizer.shutdown()?;
    println!("✅ Logged out");
    Ok(())
}

/// Handle `cbl run`.
pub async fn handle_run(config: CblConfig, login: bool) -> CliResult {
    let stored = FileCredentialStore::new(config.store_path.clone()).refresh_token()?;
    let (authorizer, mut rx) = start(config).await?;

    if !stored.is_empty() {
        authorizer.set_connectivity(ConnectivityStatus::Connected)?;
    } else if login {
        authorizer.authorize()?;
    } else {
        return Err("no refresh token stored; run `cbl login` first".into());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                authorizer.shutdown()?;
                println!("👋 Stopped");
                return Ok(());
            }
            event = rx.recv() => match event {
                Some(CliEvent::State(status)) => {
                    println!("  {} ({})", status.state, status.error);
                }
                Some(CliEvent::CodePair { verification_uri, user_code }) => {
                    println!("🔗 Visit: {verification_uri}");
                    println!("📋 Enter code: {user_code}");
                }
                Some(CliEvent::CodeExpired) => {
                    eprintln!("⚠️  Code expired, requesting a new one");
                    authorizer.authorize()?;
                }
                None => return Err("authorizer stopped unexpectedly".into()),
            }
        }
    }
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
