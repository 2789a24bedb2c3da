//! Fan-out of authorization state changes.

use std::sync::Arc;

use super::state::{AuthStatus, AuthorizationError, AuthorizationState};

/// Consumer of the credential (e.g. the voice engine's auth provider).
///
/// Callbacks run on the authorizer task and must not block.
pub trait AuthStateObserver: Send + Sync {
    fn on_auth_state_changed(
        &self,
        state: AuthorizationState,
        error: AuthorizationError,
        token: &str,
    );

    /// A new code pair is ready to show to the user.
    fn on_code_pair_received(&self, _verification_uri: &str, _user_code: &str) {}

    /// The displayed code ran out before the user finished.
    fn on_code_pair_expired(&self) {}
}

/// Subscriber set keyed by `Arc` identity.
///
/// Every `subscribe` call replays the current status to the caller before
/// returning, so a late subscriber never has to wait for the next transition.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn AuthStateObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` and deliver `current` to it.
    ///
    /// Returns `false` when the observer was already registered; it is
    /// still replayed the current status.
    pub fn subscribe(&mut self, observer: Arc<dyn AuthStateObserver>, current: &AuthStatus) -> bool {
        let added = !self.contains(&observer);
        if added {
            self.observers.push(observer.clone());
        }
        observer.on_auth_state_changed(current.state, current.error, &current.token);
        added
    }

    pub fn unsubscribe(&mut self, observer: &Arc<dyn AuthStateObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|existing| !same_observer(existing, observer));
        self.observers.len() != before
    }

    pub fn notify_all(&self, status: &AuthStatus) {
        for observer in &self.observers {
            observer.on_auth_state_changed(status.state, status.error, &status.token);
        }
    }

    pub fn notify_code_pair(&self, verification_uri: &str, user_code: &str) {
        for observer in &self.observers {
            observer.on_code_pair_received(verification_uri, user_code);
        }
    }

    pub fn notify_code_pair_expired(&self) {
        for observer in &self.observers {
            observer.on_code_pair_expired();
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn contains(&self, observer: &Arc<dyn AuthStateObserver>) -> bool {
        self.observers
            .iter()
            .any(|existing| same_observer(existing, observer))
    }
}

// Compare data pointers only; vtable pointers for the same type can differ
// across codegen units.
fn same_observer(a: &Arc<dyn AuthStateObserver>, b: &Arc<dyn AuthStateObserver>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
