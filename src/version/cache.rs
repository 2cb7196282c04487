//! In-process single-flight TTL cache
//!
//! Every key holds either one in-flight load or a settled outcome with an
//! expiry. Concurrent callers for the same key share the in-flight load, and
//! the load runs on its own task so a caller giving up never cancels it.
//!
//! A loader reports how its outcome should be kept through [`Load`]:
//! successes are kept for the default max age, failures are dropped so the
//! next caller retries, and [`Load::Settled`] pins any outcome (including a
//! negative one such as "not found") for an explicit duration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a loader together with its caching policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Load<V, E> {
    /// Success kept for the default max age
    Fresh(V),
    /// Outcome kept for `max_age`, whether it is a success or a failure
    Settled {
        result: Result<V, E>,
        max_age: Duration,
    },
    /// Failure handed to current waiters only
    Failed(E),
}

impl<V, E> From<Result<V, E>> for Load<V, E> {
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(value) => Load::Fresh(value),
            Err(e) => Load::Failed(e),
        }
    }
}

type SharedOutcome<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Slot<V, E> {
    Pending {
        id: u64,
        outcome: SharedOutcome<V, E>,
    },
    Settled {
        result: Result<V, E>,
        expires_at: Instant,
    },
}

struct Slots<V, E> {
    entries: HashMap<String, Slot<V, E>>,
    next_id: u64,
}

impl<V, E> Slots<V, E> {
    /// Drops the pending entry for `key` if it still belongs to load `id`
    fn clear_pending(&mut self, key: &str, id: u64) -> bool {
        if matches!(self.entries.get(key), Some(Slot::Pending { id: current, .. }) if *current == id)
        {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }
}

type LoadTask<V, E> = JoinHandle<Result<V, E>>;

enum Lookup<V, E> {
    Hit(Result<V, E>),
    Join(SharedOutcome<V, E>),
    /// A pending slot was registered for the caller, who must start the load
    Claimed {
        outcome: SharedOutcome<V, E>,
        guard: PendingGuard<V, E>,
        start: oneshot::Sender<LoadTask<V, E>>,
    },
}

/// Key-scoped single-flight cache with per-entry expiry
pub struct SharedCache<V, E> {
    slots: Arc<Mutex<Slots<V, E>>>,
}

impl<V, E> Clone for SharedCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<V, E> Default for SharedCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock_slots<V, E>(slots: &Mutex<Slots<V, E>>) -> MutexGuard<'_, Slots<V, E>> {
    // The map is never left half-updated, so a poisoned lock is still usable
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V, E> SharedCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                entries: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Returns the cached outcome for `key`, joins the in-flight load, or
    /// starts a new load with `loader`.
    ///
    /// `loader` is invoked at most once per miss and never while another load
    /// for the same key is in flight.
    pub async fn get<F, Fut>(&self, key: &str, loader: F, default_max_age: Duration) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Load<V, E>> + Send + 'static,
    {
        match self.lookup(key) {
            Lookup::Hit(result) => {
                debug!("Cache hit for {}", key);
                result
            }
            Lookup::Join(outcome) => {
                debug!("Joining in-flight load for {}", key);
                outcome.await
            }
            Lookup::Claimed {
                outcome,
                guard,
                start,
            } => {
                debug!("Cache miss for {}, starting load", key);
                // Invoked outside the lock so a loader may touch this cache synchronously
                let load = loader();
                let task = tokio::spawn(async move {
                    let load = load.await;
                    guard.settle(load, default_max_age)
                });
                // Waiters may all be gone; the task still settles the slot
                let _ = start.send(task);
                outcome.await
            }
        }
    }

    /// Number of entries currently held, pending or settled (expired ones included)
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves `key` under a single lock acquisition, registering a pending
    /// slot on a miss so later callers join it
    fn lookup(&self, key: &str) -> Lookup<V, E> {
        let mut slots = lock_slots(&self.slots);
        match slots.entries.get(key) {
            Some(Slot::Settled { result, expires_at }) if Instant::now() < *expires_at => {
                return Lookup::Hit(result.clone());
            }
            Some(Slot::Pending { outcome, .. }) => return Lookup::Join(outcome.clone()),
            _ => {}
        }

        let id = slots.next_id;
        slots.next_id += 1;

        let (start, started) = oneshot::channel::<LoadTask<V, E>>();
        let task_key = key.to_string();
        let outcome = async move {
            let task = match started.await {
                Ok(task) => task,
                Err(_) => panic!("loader for {} panicked before starting", task_key),
            };
            match task.await {
                Ok(result) => result,
                Err(e) => match e.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    Err(e) => panic!("load for {} was cancelled: {}", task_key, e),
                },
            }
        }
        .boxed()
        .shared();

        slots.entries.insert(
            key.to_string(),
            Slot::Pending {
                id,
                outcome: outcome.clone(),
            },
        );

        Lookup::Claimed {
            outcome,
            guard: PendingGuard {
                slots: Arc::clone(&self.slots),
                key: key.to_string(),
                id,
                armed: true,
            },
            start,
        }
    }
}

/// Owns the pending marker of one load; clears it if the load never settles
struct PendingGuard<V, E> {
    slots: Arc<Mutex<Slots<V, E>>>,
    key: String,
    id: u64,
    armed: bool,
}

impl<V: Clone, E: Clone> PendingGuard<V, E> {
    fn settle(mut self, load: Load<V, E>, default_max_age: Duration) -> Result<V, E> {
        self.armed = false;

        let (result, max_age) = match load {
            Load::Fresh(value) => (Ok(value), Some(default_max_age)),
            Load::Settled { result, max_age } => (result, Some(max_age)),
            Load::Failed(e) => (Err(e), None),
        };

        let mut slots = lock_slots(&self.slots);
        if !slots.clear_pending(&self.key, self.id) {
            return result;
        }

        if let Some(max_age) = max_age {
            debug!("Caching {} for {:?}", self.key, max_age);
            slots.entries.insert(
                self.key.clone(),
                Slot::Settled {
                    result: result.clone(),
                    expires_at: Instant::now() + max_age,
                },
            );
        }

        result
    }
}

impl<V, E> Drop for PendingGuard<V, E> {
    fn drop(&mut self) {
        if self.armed {
            lock_slots(&self.slots).clear_pending(&self.key, self.id);
        }
    }
}
