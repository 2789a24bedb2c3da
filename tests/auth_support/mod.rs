#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cbl::auth::{
    AuthExchange, AuthStateObserver, AuthStatus, AuthorizationError, AuthorizationState,
    CodePairResponse, CredentialRecord, CredentialStore, DevicePoll, ExchangeError, TokenGrant,
    TokenInfo, UserProfile,
};
use cbl::config::{CblConfig, DeviceIdentity};
use cbl::error::Result;
use tokio::sync::mpsc;

pub const CLIENT_ID: &str = "amzn1.application-oa2-client.test";

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::new(CLIENT_ID, "sample_app", "DSN-1")
}

pub fn test_config() -> CblConfig {
    CblConfig::default()
        .with_identity(identity())
        .with_store_path("/nonexistent/cbl/credentials.toml")
}

pub fn code_pair(device_code: &str, expires_in: i64, interval: i64) -> CodePairResponse {
    CodePairResponse {
        verification_uri: "https://amazon.com/us/code".to_string(),
        user_code: format!("USER-{device_code}"),
        device_code: device_code.to_string(),
        expires_in,
        poll_interval: Some(interval),
    }
}

pub fn grant(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_in,
    }
}

pub fn status(state: AuthorizationState, error: AuthorizationError, token: &str) -> AuthStatus {
    AuthStatus::new(state, error, token)
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    record: Mutex<CredentialRecord>,
    saves: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(record),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn seeded(refresh_token: &str) -> Self {
        let identity = identity();
        Self::with_record(CredentialRecord {
            client_id: identity.client_id,
            product_id: identity.product_id,
            device_serial_number: identity.device_serial_number,
            refresh_token: refresh_token.to_string(),
        })
    }

    pub fn record(&self) -> CredentialRecord {
        self.record.lock().expect("store lock poisoned").clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<CredentialRecord> {
        Ok(self.record())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        *self.record.lock().expect("store lock poisoned") = record.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Exchange double that replays queued responses.
///
/// Empty queues answer with a transport error for code pairs and refreshes
/// and with `Pending` for polls.
#[derive(Default)]
pub struct ScriptedExchange {
    code_pairs: Mutex<VecDeque<std::result::Result<CodePairResponse, ExchangeError>>>,
    polls: Mutex<VecDeque<std::result::Result<DevicePoll, ExchangeError>>>,
    refreshes: Mutex<VecDeque<std::result::Result<TokenGrant, ExchangeError>>>,
    poll_latency: Mutex<Duration>,
    refresh_latency: Mutex<Duration>,
    token_info: Mutex<Option<TokenInfo>>,
    code_pair_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    polled_device_codes: Mutex<Vec<String>>,
    refresh_tokens_used: Mutex<Vec<String>>,
}

impl ScriptedExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_code_pair(&self, response: std::result::Result<CodePairResponse, ExchangeError>) {
        self.code_pairs.lock().unwrap().push_back(response);
    }

    pub fn push_poll(&self, response: std::result::Result<DevicePoll, ExchangeError>) {
        self.polls.lock().unwrap().push_back(response);
    }

    pub fn push_pending_polls(&self, count: usize) {
        for _ in 0..count {
            self.push_poll(Ok(DevicePoll::Pending { status: 400 }));
        }
    }

    pub fn push_authorized(&self, grant: TokenGrant) {
        self.push_poll(Ok(DevicePoll::Authorized { grant }));
    }

    pub fn push_refresh(&self, response: std::result::Result<TokenGrant, ExchangeError>) {
        self.refreshes.lock().unwrap().push_back(response);
    }

    pub fn set_poll_latency(&self, latency: Duration) {
        *self.poll_latency.lock().unwrap() = latency;
    }

    pub fn set_refresh_latency(&self, latency: Duration) {
        *self.refresh_latency.lock().unwrap() = latency;
    }

    pub fn set_token_info(&self, info: TokenInfo) {
        *self.token_info.lock().unwrap() = Some(info);
    }

    pub fn code_pair_calls(&self) -> usize {
        self.code_pair_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn polled_device_codes(&self) -> Vec<String> {
        self.polled_device_codes.lock().unwrap().clone()
    }

    pub fn refresh_tokens_used(&self) -> Vec<String> {
        self.refresh_tokens_used.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthExchange for ScriptedExchange {
    async fn request_code_pair(
        &self,
        _identity: &DeviceIdentity,
        _scope: &str,
    ) -> std::result::Result<CodePairResponse, ExchangeError> {
        self.code_pair_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.code_pairs.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ExchangeError::Transport("no scripted code pair".into())))
    }

    async fn poll_device_token(
        &self,
        device_code: &str,
        _user_code: &str,
    ) -> std::result::Result<DevicePoll, ExchangeError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polled_device_codes
            .lock()
            .unwrap()
            .push(device_code.to_string());
        let latency = *self.poll_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let next = self.polls.lock().unwrap().pop_front();
        next.unwrap_or(Ok(DevicePoll::Pending { status: 400 }))
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        _client_id: &str,
    ) -> std::result::Result<TokenGrant, ExchangeError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_used
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        let latency = *self.refresh_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let next = self.refreshes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ExchangeError::Transport("no scripted refresh".into())))
    }

    async fn verify_token(
        &self,
        _access_token: &str,
    ) -> std::result::Result<TokenInfo, ExchangeError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let info = self.token_info.lock().unwrap().clone();
        info.ok_or_else(|| ExchangeError::Protocol("no scripted token info".into()))
    }

    async fn fetch_profile(
        &self,
        _access_token: &str,
    ) -> std::result::Result<UserProfile, ExchangeError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserProfile {
            user_id: Some("amzn1.account.test".to_string()),
            name: Some("Test User".to_string()),
            email: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    State(AuthStatus),
    CodePair { verification_uri: String, user_code: String },
    CodeExpired,
}

/// Observer that forwards every callback into a channel.
pub struct RecordingObserver {
    tx: mpsc::UnboundedSender<Event>,
}

impl RecordingObserver {
    pub fn new() -> (Arc<Self>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), Events { rx })
    }
}

impl AuthStateObserver for RecordingObserver {
    fn on_auth_state_changed(
        &self,
        state: AuthorizationState,
        error: AuthorizationError,
        token: &str,
    ) {
        let _ = self.tx.send(Event::State(AuthStatus::new(state, error, token)));
    }

    fn on_code_pair_received(&self, verification_uri: &str, user_code: &str) {
        let _ = self.tx.send(Event::CodePair {
            verification_uri: verification_uri.to_string(),
            user_code: user_code.to_string(),
        });
    }

    fn on_code_pair_expired(&self) {
        let _ = self.tx.send(Event::CodeExpired);
    }
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    /// Next event; panics if none arrives within a simulated day.
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(86_400), self.rx.recv())
            .await
            .expect("timed out waiting for observer event")
            .expect("observer channel closed")
    }

    pub async fn next_state(&mut self) -> AuthStatus {
        loop {
            if let Event::State(status) = self.next().await {
                return status;
            }
        }
    }

    /// Events delivered within `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            events.push(event);
        }
        events
    }

    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
