//! Timer facility that feeds a single-consumer event queue.
//!
//! Timers never run work themselves. When a task fires, its [`TaskHandle`]
//! is posted into the owner's channel, so every firing is processed in order
//! with the owner's other events. The owner calls [`Scheduler::accept`] on
//! each delivered handle to drop firings from tasks that were replaced or
//! cancelled after the message was queued.
//!
//! At most one task per kind is live: scheduling a kind cancels whatever
//! was previously scheduled under it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Identifies one scheduled instance of a task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle<K> {
    kind: K,
    id: u64,
}

impl<K: Copy> TaskHandle<K> {
    pub fn kind(&self) -> K {
        self.kind
    }
}

struct LiveTask {
    id: u64,
    join: JoinHandle<()>,
    repeating: bool,
    delay: Duration,
}

/// Per-kind timer table owned by a single consumer.
pub struct Scheduler<K, E> {
    sink: mpsc::UnboundedSender<E>,
    live: HashMap<K, LiveTask>,
    next_id: u64,
}

impl<K, E> Scheduler<K, E>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
    E: From<TaskHandle<K>> + Send + 'static,
{
    pub fn new(sink: mpsc::UnboundedSender<E>) -> Self {
        Self {
            sink,
            live: HashMap::new(),
            next_id: 0,
        }
    }

    /// Fire once after `delay`.
    pub fn schedule_once(&mut self, kind: K, delay: Duration) -> TaskHandle<K> {
        let handle = self.next_handle(kind);
        let sink = self.sink.clone();
        let join = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = sink.send(E::from(handle));
        });
        self.install(handle, join, false, delay);
        handle
    }

    /// Fire after `initial_delay`, then every `interval` until cancelled.
    pub fn schedule_repeating(
        &mut self,
        kind: K,
        initial_delay: Duration,
        interval: Duration,
    ) -> TaskHandle<K> {
        let handle = self.next_handle(kind);
        let sink = self.sink.clone();
        let interval = interval.max(Duration::from_millis(1));
        let join = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + initial_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sink.send(E::from(handle)).is_err() {
                    break;
                }
            }
        });
        self.install(handle, join, true, initial_delay);
        handle
    }

    /// Cancel `handle` if it is still the live task of its kind.
    ///
    /// Returns `false` for handles that already fired, were replaced, or
    /// were cancelled before.
    pub fn cancel(&mut self, handle: &TaskHandle<K>) -> bool {
        match self.live.get(&handle.kind) {
            Some(task) if task.id == handle.id => {
                self.cancel_kind(handle.kind);
                true
            }
            _ => false,
        }
    }

    /// Cancel whatever task of `kind` is live.
    pub fn cancel_kind(&mut self, kind: K) -> bool {
        match self.live.remove(&kind) {
            Some(task) => {
                task.join.abort();
                tracing::debug!(?kind, id = task.id, "scheduled task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.live.drain() {
            task.join.abort();
        }
    }

    /// Validate a delivered firing.
    ///
    /// One-shot tasks stop being live once accepted.
    pub fn accept(&mut self, fired: &TaskHandle<K>) -> bool {
        match self.live.get(&fired.kind) {
            Some(task) if task.id == fired.id => {
                if !task.repeating {
                    self.live.remove(&fired.kind);
                }
                true
            }
            _ => {
                tracing::trace!(kind = ?fired.kind, id = fired.id, "stale firing dropped");
                false
            }
        }
    }

    pub fn is_live(&self, kind: K) -> bool {
        self.live.contains_key(&kind)
    }

    /// Delay the live task of `kind` was armed with.
    pub fn armed_delay(&self, kind: K) -> Option<Duration> {
        self.live.get(&kind).map(|task| task.delay)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn next_handle(&mut self, kind: K) -> TaskHandle<K> {
        self.next_id += 1;
        TaskHandle {
            kind,
            id: self.next_id,
        }
    }

    fn install(&mut self, handle: TaskHandle<K>, join: JoinHandle<()>, repeating: bool, delay: Duration) {
        let replaced = self.live.insert(
            handle.kind,
            LiveTask {
                id: handle.id,
                join,
                repeating,
                delay,
            },
        );
        if let Some(previous) = replaced {
            previous.join.abort();
            tracing::debug!(kind = ?handle.kind, id = previous.id, "scheduled task replaced");
        }
        tracing::debug!(
            kind = ?handle.kind,
            id = handle.id,
            delay_ms = delay.as_millis() as u64,
            repeating,
            "task scheduled"
        );
    }
}

impl<K, E> Drop for Scheduler<K, E> {
    fn drop(&mut self) {
        for (_, task) in self.live.drain() {
            task.join.abort();
        }
    }
}
