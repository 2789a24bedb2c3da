//! Authorization state machine.
//!
//! A single actor task owns every piece of mutable state: the status tuple,
//! the in-memory credential, the pending code pair and the timer table.
//! Callers talk to it through [`CblAuthorizer`], timers and network replies
//! arrive on a second channel, and the actor handles one message at a time.
//! HTTP calls run on their own tasks and report back tagged with the
//! generation they were started under; replies from an abandoned flow or
//! credential are dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::connectivity::{ConnectivityObserver, ConnectivityStatus};
use super::device_code::{CodePairResponse, DevicePoll, PendingAuthorization};
use super::error::{ExchangeError, FailureKind};
use super::exchange::{AuthExchange, HttpExchange};
use super::observer::{AuthStateObserver, ObserverRegistry};
use super::state::{AuthStatus, AuthorizationError, AuthorizationState};
use super::store::{CredentialRecord, CredentialStore, FileCredentialStore};
use super::token::{Credential, TokenGrant};
use crate::config::{CblConfig, DeviceIdentity};
use crate::error::{CblError, Result};
use crate::scheduler::{Scheduler, TaskHandle};

/// Timer kinds owned by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Poll,
    Refresh,
}

/// Point-in-time view of the authorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: AuthStatus,
    pub connected: bool,
    /// A device-code poll task is scheduled.
    pub poll_live: bool,
    /// Delay the live refresh timer was armed with.
    pub refresh_delay: Option<Duration>,
    pub pending_user_code: Option<String>,
    pub last_failure: Option<FailureKind>,
    pub observer_count: usize,
}

enum Command {
    Authorize,
    Deauthorize,
    Connectivity(ConnectivityStatus),
    Subscribe {
        observer: Arc<dyn AuthStateObserver>,
        reply: oneshot::Sender<bool>,
    },
    Unsubscribe {
        observer: Arc<dyn AuthStateObserver>,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown,
}

enum Internal {
    Timer(TaskHandle<TaskKind>),
    CodePair {
        flow: u64,
        result: std::result::Result<CodePairResponse, ExchangeError>,
    },
    Poll {
        flow: u64,
        result: std::result::Result<DevicePoll, ExchangeError>,
    },
    Refresh {
        epoch: u64,
        refresh_token: String,
        result: std::result::Result<TokenGrant, ExchangeError>,
    },
}

impl From<TaskHandle<TaskKind>> for Internal {
    fn from(handle: TaskHandle<TaskKind>) -> Self {
        Self::Timer(handle)
    }
}

/// Handle to the CBL authorization actor.
///
/// Cheap to clone. The actor stops once [`CblAuthorizer::shutdown`] is
/// called or every handle has been dropped; live timers are cancelled with
/// it.
///
/// # Example
/// ```no_run
/// use cbl::auth::CblAuthorizer;
/// use cbl::config::CblConfig;
///
/// # async fn example() -> cbl::error::Result<()> {
/// let authorizer = CblAuthorizer::new(CblConfig::load(None)?)?;
/// authorizer.authorize()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CblAuthorizer {
    commands: mpsc::UnboundedSender<Command>,
}

impl CblAuthorizer {
    /// Start an authorizer talking HTTPS and persisting to
    /// `config.store_path`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CblConfig) -> Result<Self> {
        let exchange = Arc::new(HttpExchange::new(&config)?);
        let store = Arc::new(FileCredentialStore::new(config.store_path.clone()));
        Self::spawn(config, exchange, store)
    }

    /// Start an authorizer with explicit collaborators.
    ///
    /// The device identity is resolved from `config`, with empty fields
    /// filled from the stored record, and written back to the store.
    pub fn spawn(
        config: CblConfig,
        exchange: Arc<dyn AuthExchange>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let record = store.load()?;
        let identity = config.identity.clone().or_record(&record);
        persist_identity(store.as_ref(), &record, &identity);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let engine = Engine {
            scheduler: Scheduler::new(internal_tx.clone()),
            internal_tx,
            config,
            identity,
            exchange,
            store,
            observers: ObserverRegistry::new(),
            status: AuthStatus::uninitialized(),
            credential: None,
            pending: None,
            connected: true,
            flow: 0,
            epoch: 0,
            poll_in_flight: false,
            refresh_in_flight: false,
            last_failure: None,
        };
        tokio::spawn(engine.run(commands_rx, internal_rx));
        Ok(Self {
            commands: commands_tx,
        })
    }

    /// Start a device-code flow, abandoning any flow already in progress.
    pub fn authorize(&self) -> Result<()> {
        self.send(Command::Authorize)
    }

    /// Forget the credential and clear the stored refresh token.
    pub fn deauthorize(&self) -> Result<()> {
        self.send(Command::Deauthorize)
    }

    /// Register `observer`; it has received the current status by the time
    /// this resolves. Returns `false` if it was already registered.
    pub async fn subscribe(&self, observer: Arc<dyn AuthStateObserver>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { observer, reply })?;
        rx.await.map_err(|_| CblError::Shutdown)
    }

    pub async fn unsubscribe(&self, observer: Arc<dyn AuthStateObserver>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { observer, reply })?;
        rx.await.map_err(|_| CblError::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| CblError::Shutdown)
    }

    pub fn set_connectivity(&self, status: ConnectivityStatus) -> Result<()> {
        self.send(Command::Connectivity(status))
    }

    /// Stop the actor. Messages already queued ahead of this are handled.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| CblError::Shutdown)
    }
}

impl ConnectivityObserver for CblAuthorizer {
    fn on_connectivity_changed(&self, status: ConnectivityStatus) {
        if self.set_connectivity(status).is_err() {
            tracing::debug!(%status, "connectivity change after shutdown ignored");
        }
    }
}

fn persist_identity(store: &dyn CredentialStore, record: &CredentialRecord, identity: &DeviceIdentity) {
    let updated = CredentialRecord {
        client_id: identity.client_id.clone(),
        product_id: identity.product_id.clone(),
        device_serial_number: identity.device_serial_number.clone(),
        refresh_token: record.refresh_token.clone(),
    };
    if &updated == record {
        return;
    }
    if let Err(err) = store.save(&updated) {
        tracing::warn!(error = %err, "failed to persist device identity");
    }
}

struct Engine {
    config: CblConfig,
    identity: DeviceIdentity,
    exchange: Arc<dyn AuthExchange>,
    store: Arc<dyn CredentialStore>,
    observers: ObserverRegistry,
    scheduler: Scheduler<TaskKind, Internal>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    status: AuthStatus,
    credential: Option<Credential>,
    pending: Option<PendingAuthorization>,
    connected: bool,
    /// Bumped whenever an authorization flow starts or ends.
    flow: u64,
    /// Bumped whenever the credential is discarded.
    epoch: u64,
    poll_in_flight: bool,
    refresh_in_flight: bool,
    last_failure: Option<FailureKind>,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        tracing::debug!(client_id = %self.identity.client_id, "cbl authorizer started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        self.scheduler.cancel_all();
        tracing::debug!("cbl authorizer stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Authorize => self.authorize(),
            Command::Deauthorize => self.deauthorize(),
            Command::Connectivity(status) => self.on_connectivity(status),
            Command::Subscribe { observer, reply } => {
                let added = self.observers.subscribe(observer, &self.status);
                let _ = reply.send(added);
            }
            Command::Unsubscribe { observer, reply } => {
                let _ = reply.send(self.observers.unsubscribe(&observer));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Timer(handle) => {
                if !self.scheduler.accept(&handle) {
                    return;
                }
                match handle.kind() {
                    TaskKind::Poll => self.on_poll_tick(),
                    TaskKind::Refresh => self.on_refresh_due(),
                }
            }
            Internal::CodePair { flow, result } => {
                if flow != self.flow {
                    tracing::debug!(flow, current = self.flow, "stale code pair response dropped");
                    return;
                }
                self.on_code_pair(result);
            }
            Internal::Poll { flow, result } => {
                if flow != self.flow {
                    tracing::debug!(flow, current = self.flow, "stale poll response dropped");
                    return;
                }
                self.poll_in_flight = false;
                self.on_poll_result(result);
            }
            Internal::Refresh {
                epoch,
                refresh_token,
                result,
            } => {
                if epoch != self.epoch {
                    tracing::debug!(epoch, current = self.epoch, "stale refresh response dropped");
                    return;
                }
                self.refresh_in_flight = false;
                self.on_refresh_result(&refresh_token, result);
            }
        }
    }

    fn authorize(&mut self) {
        if !self.connected {
            tracing::warn!("authorize requested while offline; check network settings");
            return;
        }
        if self.identity.has_placeholder_client_id() {
            tracing::error!(
                client_id = %self.identity.client_id,
                "authorize requested without a configured client id"
            );
            return;
        }

        self.abandon_flow();
        let flow = self.flow;
        let exchange = self.exchange.clone();
        let identity = self.identity.clone();
        let scope = self.config.scope();
        let tx = self.internal_tx.clone();
        tracing::info!(flow, scope, "requesting code pair");
        tokio::spawn(async move {
            let result = exchange.request_code_pair(&identity, scope).await;
            let _ = tx.send(Internal::CodePair { flow, result });
        });
    }

    fn on_code_pair(&mut self, result: std::result::Result<CodePairResponse, ExchangeError>) {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "code pair request failed");
                self.last_failure = Some(err.kind());
                // A re-authorize already tore down the previous flow.
                if self.status.state == AuthorizationState::Authorizing && self.pending.is_none() {
                    self.transition(
                        AuthorizationState::Uninitialized,
                        AuthorizationError::NoError,
                        String::new(),
                    );
                }
                return;
            }
        };

        let pending = PendingAuthorization::from_response(response, self.config.poll_interval());
        tracing::info!(
            user_code = %pending.user_code,
            verification_uri = %pending.verification_uri,
            attempts = pending.attempts_remaining,
            interval_secs = pending.poll_interval.as_secs(),
            "code pair received"
        );
        self.discard_credential();
        self.scheduler
            .schedule_repeating(TaskKind::Poll, Duration::ZERO, pending.poll_interval);
        let verification_uri = pending.verification_uri.clone();
        let user_code = pending.user_code.clone();
        self.pending = Some(pending);

        self.transition(
            AuthorizationState::Authorizing,
            AuthorizationError::NoError,
            String::new(),
        );
        self.observers.notify_code_pair(&verification_uri, &user_code);
    }

    fn on_poll_tick(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            self.scheduler.cancel_kind(TaskKind::Poll);
            return;
        };
        if self.poll_in_flight {
            tracing::debug!("previous poll still in flight; tick skipped");
            return;
        }
        if pending.is_exhausted() {
            self.expire_flow();
            return;
        }

        pending.attempts_remaining -= 1;
        tracing::debug!(attempts_remaining = pending.attempts_remaining, "polling for device token");
        let device_code = pending.device_code.clone();
        let user_code = pending.user_code.clone();
        let flow = self.flow;
        let exchange = self.exchange.clone();
        let tx = self.internal_tx.clone();
        self.poll_in_flight = true;
        tokio::spawn(async move {
            let result = exchange.poll_device_token(&device_code, &user_code).await;
            let _ = tx.send(Internal::Poll { flow, result });
        });
    }

    fn on_poll_result(&mut self, result: std::result::Result<DevicePoll, ExchangeError>) {
        let Some(exhausted) = self.pending.as_ref().map(PendingAuthorization::is_exhausted) else {
            return;
        };
        match result {
            Ok(DevicePoll::Pending { status }) => {
                tracing::debug!(status, "authorization still pending");
            }
            Ok(DevicePoll::Authorized { grant }) => {
                self.complete_authorization(grant);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "device token poll failed");
                self.last_failure = Some(err.kind());
            }
        }
        if exhausted {
            self.expire_flow();
        }
    }

    fn complete_authorization(&mut self, grant: TokenGrant) {
        self.abandon_flow();
        let credential = grant.into_credential("");
        if let Err(err) = self.store.set_refresh_token(&credential.refresh_token) {
            tracing::error!(error = %err, "failed to persist refresh token");
        }
        let access_token = credential.access_token.clone();
        tracing::info!(expires_in = credential.expires_in_secs, "device authorized");
        self.install_credential(credential);

        if self.config.enable_user_profile {
            self.spawn_profile_fetch(access_token);
        }
    }

    fn expire_flow(&mut self) {
        tracing::info!("code pair expired before the user completed authorization");
        self.abandon_flow();
        self.last_failure = Some(FailureKind::Expiry);
        self.transition(
            AuthorizationState::Uninitialized,
            AuthorizationError::NoError,
            String::new(),
        );
        self.observers.notify_code_pair_expired();
    }

    fn on_refresh_due(&mut self) {
        if !self.connected {
            tracing::warn!("refresh due while offline; token expired");
            self.discard_credential();
            self.last_failure = Some(FailureKind::OfflineRefresh);
            self.transition(
                AuthorizationState::Expired,
                AuthorizationError::AuthorizationExpired,
                String::new(),
            );
            return;
        }
        self.start_refresh();
    }

    fn start_refresh(&mut self) {
        if self.refresh_in_flight {
            tracing::debug!("refresh already in flight");
            return;
        }
        let refresh_token = match &self.credential {
            Some(credential) if !credential.refresh_token.is_empty() => {
                credential.refresh_token.clone()
            }
            _ => match self.store.refresh_token() {
                Ok(token) => token,
                Err(err) => {
                    tracing::error!(error = %err, "failed to read stored refresh token");
                    return;
                }
            },
        };
        if refresh_token.is_empty() {
            tracing::debug!("no refresh token stored; refresh skipped");
            return;
        }
        if self.identity.client_id.is_empty() {
            tracing::debug!("no client id; refresh skipped");
            return;
        }

        let epoch = self.epoch;
        let client_id = self.identity.client_id.clone();
        let exchange = self.exchange.clone();
        let tx = self.internal_tx.clone();
        self.refresh_in_flight = true;
        tracing::info!(epoch, "refreshing access token");
        tokio::spawn(async move {
            let result = exchange.refresh_token(&refresh_token, &client_id).await;
            let _ = tx.send(Internal::Refresh {
                epoch,
                refresh_token,
                result,
            });
        });
    }

    fn on_refresh_result(
        &mut self,
        used_refresh_token: &str,
        result: std::result::Result<TokenGrant, ExchangeError>,
    ) {
        match result {
            Ok(grant) => {
                let credential = grant.into_credential(used_refresh_token);
                if credential.refresh_token != used_refresh_token {
                    if let Err(err) = self.store.set_refresh_token(&credential.refresh_token) {
                        tracing::error!(error = %err, "failed to persist rotated refresh token");
                    }
                }
                tracing::info!(expires_in = credential.expires_in_secs, "access token refreshed");
                self.install_credential(credential);
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                self.discard_credential();
                self.last_failure = Some(err.kind());
                self.transition(
                    AuthorizationState::Uninitialized,
                    AuthorizationError::AuthorizationFailed,
                    String::new(),
                );
            }
        }
    }

    fn on_connectivity(&mut self, status: ConnectivityStatus) {
        let was_connected = self.connected;
        self.connected = status.is_connected();
        if was_connected != self.connected {
            tracing::info!(%status, "connectivity changed");
        }
        if !self.connected {
            return;
        }
        if self.status.is_refreshed() {
            return;
        }
        if self.pending.is_some() {
            tracing::debug!("authorization in progress; reconnect refresh skipped");
            return;
        }
        self.start_refresh();
    }

    fn deauthorize(&mut self) {
        self.abandon_flow();
        self.discard_credential();
        if let Err(err) = self.store.clear_refresh_token() {
            tracing::error!(error = %err, "failed to clear stored refresh token");
        }
        self.last_failure = None;
        tracing::info!("deauthorized");
        self.transition(
            AuthorizationState::Uninitialized,
            AuthorizationError::NoError,
            String::new(),
        );
    }

    /// Arm the refresh timer and announce the new access token.
    fn install_credential(&mut self, credential: Credential) {
        let lifetime = Duration::from_secs(credential.expires_in_secs.max(0) as u64);
        let delay = lifetime.saturating_sub(self.config.refresh_margin());
        self.scheduler.schedule_once(TaskKind::Refresh, delay);
        let access_token = credential.access_token.clone();
        self.credential = Some(credential);
        self.last_failure = None;
        self.transition(
            AuthorizationState::Refreshed,
            AuthorizationError::NoError,
            access_token,
        );
    }

    fn discard_credential(&mut self) {
        self.scheduler.cancel_kind(TaskKind::Refresh);
        self.credential = None;
        self.epoch += 1;
        self.refresh_in_flight = false;
    }

    /// Cancel polling and invalidate every reply from the current flow.
    fn abandon_flow(&mut self) {
        self.scheduler.cancel_kind(TaskKind::Poll);
        self.pending = None;
        self.flow += 1;
        self.poll_in_flight = false;
    }

    fn transition(&mut self, state: AuthorizationState, error: AuthorizationError, token: String) {
        self.status = AuthStatus::new(state, error, token);
        tracing::info!(state = %state, error = %error, "authorization state changed");
        self.observers.notify_all(&self.status);
    }

    fn spawn_profile_fetch(&self, access_token: String) {
        let exchange = self.exchange.clone();
        let client_id = self.identity.client_id.clone();
        tokio::spawn(async move {
            let info = match exchange.verify_token(&access_token).await {
                Ok(info) => info,
                Err(err) => {
                    tracing::warn!(error = %err, "token verification failed");
                    return;
                }
            };
            if info.aud != client_id {
                tracing::warn!(aud = %info.aud, "token audience does not match client id");
                return;
            }
            match exchange.fetch_profile(&access_token).await {
                Ok(profile) => tracing::info!(
                    user_id = ?profile.user_id,
                    name = ?profile.name,
                    "user profile fetched"
                ),
                Err(err) => tracing::warn!(error = %err, "user profile fetch failed"),
            }
        });
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            connected: self.connected,
            poll_live: self.scheduler.is_live(TaskKind::Poll),
            refresh_delay: self.scheduler.armed_delay(TaskKind::Refresh),
            pending_user_code: self.pending.as_ref().map(|p| p.user_code.clone()),
            last_failure: self.last_failure,
            observer_count: self.observers.len(),
        }
    }
}
