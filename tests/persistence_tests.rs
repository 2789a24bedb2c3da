mod auth_support;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use cbl::auth::{
    AuthorizationError, AuthorizationState, CblAuthorizer, ConnectivityStatus, CredentialStore,
    FileCredentialStore,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use auth_support::{code_pair, grant, status, test_config, RecordingObserver, ScriptedExchange};

fn credentials_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("cbl").join("credentials.toml")
}

#[tokio::test(start_paused = true)]
async fn refresh_token_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = credentials_path(&temp_dir);
    let exchange = ScriptedExchange::new();

    let store = Arc::new(FileCredentialStore::new(&path));
    let first = CblAuthorizer::spawn(test_config(), exchange.clone(), store).unwrap();
    let (observer, mut events) = RecordingObserver::new();
    first.subscribe(observer).await.unwrap();
    events.next_state().await;

    exchange.push_code_pair(Ok(code_pair("device-1", 600, 10)));
    exchange.push_authorized(grant("AT1", Some("RT1"), 3600));
    first.authorize().unwrap();
    assert_eq!(
        events.next_state().await.state,
        AuthorizationState::Authorizing
    );
    assert_eq!(
        events.next_state().await,
        status(AuthorizationState::Refreshed, AuthorizationError::NoError, "AT1")
    );
    first.shutdown().unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let file: toml::Table = toml::from_str(&raw).unwrap();
    assert_eq!(file["version"].as_integer(), Some(1));
    assert_eq!(file["record"]["refresh_token"].as_str(), Some("RT1"));
    assert_eq!(file["record"]["product_id"].as_str(), Some("sample_app"));

    let store = Arc::new(FileCredentialStore::new(&path));
    let second = CblAuthorizer::spawn(test_config(), exchange.clone(), store).unwrap();
    let (observer, mut events) = RecordingObserver::new();
    second.subscribe(observer).await.unwrap();
    assert_eq!(
        events.next_state().await,
        status(AuthorizationState::Uninitialized, AuthorizationError::NoError, "")
    );

    exchange.push_refresh(Ok(grant("AT2", None, 3600)));
    second.set_connectivity(ConnectivityStatus::Connected).unwrap();
    assert_eq!(
        events.next_state().await,
        status(AuthorizationState::Refreshed, AuthorizationError::NoError, "AT2")
    );
    assert_eq!(exchange.refresh_tokens_used(), vec!["RT1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn deauthorize_clears_refresh_token_on_disk_but_keeps_identity() {
    let temp_dir = TempDir::new().unwrap();
    let path = credentials_path(&temp_dir);
    let seeded = FileCredentialStore::new(&path);
    seeded.set_refresh_token("RT0").unwrap();

    let store = Arc::new(FileCredentialStore::new(&path));
    let authorizer = CblAuthorizer::spawn(test_config(), ScriptedExchange::new(), store).unwrap();
    let (observer, mut events) = RecordingObserver::new();
    authorizer.subscribe(observer).await.unwrap();
    events.next_state().await;

    authorizer.deauthorize().unwrap();
    events.next_state().await;

    let record = FileCredentialStore::new(&path).load().unwrap();
    assert_eq!(record.refresh_token, "");
    assert_eq!(record.device_serial_number, "DSN-1");
}
