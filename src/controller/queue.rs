//! Deduplicating, rate-limited work queue
//!
//! Each key is tracked through an explicit state machine:
//!
//! ```text
//! absent --add--> queued --get--> processing --done--> absent
//!                                     |  ^
//!                                   add  |
//!                                     v  |
//!                            processing+dirty --done--> queued
//! ```
//!
//! A key is never handed to two workers at once, and an `add` that arrives
//! while the key is being processed is folded into exactly one follow-up pass.

use crate::controller::rate_limit::{default_controller_rate_limiter, RateLimiter};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Queued,
    Processing,
    ProcessingDirty,
}

struct State<K> {
    queue: VecDeque<K>,
    keys: HashMap<K, KeyState>,
    shutting_down: bool,
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    available: Notify,
    limiter: Box<dyn RateLimiter<K>>,
    shutdown: CancellationToken,
}

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Queue using the default controller rate limiter
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, Box::new(default_controller_rate_limiter()))
    }

    pub fn with_rate_limiter(name: impl Into<String>, limiter: Box<dyn RateLimiter<K>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    keys: HashMap::new(),
                    shutting_down: false,
                }),
                available: Notify::new(),
                limiter,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark `key` as needing processing.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }

        match state.keys.get(&key).copied() {
            None => {
                state.keys.insert(key.clone(), KeyState::Queued);
                state.queue.push_back(key);
                drop(state);
                self.inner.available.notify_one();
            }
            Some(KeyState::Processing) => {
                trace!(queue = %self.inner.name, ?key, "key busy, marking dirty");
                state.keys.insert(key, KeyState::ProcessingDirty);
            }
            Some(KeyState::Queued) | Some(KeyState::ProcessingDirty) => {}
        }
    }

    /// Wait for the next key and mark it as processing.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.keys.insert(key.clone(), KeyState::Processing);
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Finish processing `key`, queueing it again if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        match state.keys.get(key).copied() {
            Some(KeyState::ProcessingDirty) => {
                state.keys.insert(key.clone(), KeyState::Queued);
                state.queue.push_back(key.clone());
                drop(state);
                self.inner.available.notify_one();
            }
            Some(KeyState::Processing) => {
                state.keys.remove(key);
            }
            Some(KeyState::Queued) | None => {}
        }
    }

    /// Clear the retry history of `key` after a successful pass.
    pub fn forget(&self, key: &K) {
        self.inner.limiter.forget(key);
    }

    /// Number of failures recorded for `key` since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    /// Add `key` again once the rate limiter allows it.
    pub fn add_rate_limited(&self, key: K) {
        if self.is_shutting_down() {
            return;
        }
        let delay = self.inner.limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Add `key` after `delay`, unless the queue shuts down first.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = self.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(key),
            }
        });
    }

    /// Stop accepting keys. Queued keys are still handed out, then `get`
    /// returns `None`.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.shutdown.cancel();
        self.inner.available.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of `key`, `None` when the queue does not track it.
    pub fn key_state(&self, key: &K) -> Option<KeyState> {
        self.lock().keys.get(key).copied()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
