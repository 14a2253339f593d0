//! In-process token revocation list.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Set of revoked tokens, each with the instant its revocation stops mattering.
///
/// A token is revoked iff it has an entry and `now < expires_at`. Cloning
/// yields another handle to the same list. Entries are evicted lazily by
/// [`is_revoked`](Self::is_revoked) and in bulk by [`sweep`](Self::sweep).
///
/// The list lives in one process; a multi-instance deployment needs a
/// shared store behind the same API.
#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    entries: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revokes `token` until `expires_at`, replacing any earlier entry.
    pub fn add(&self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(token.into(), expires_at);
        metrics::gauge!("revoked_tokens").set(entries.len() as f64);
    }

    /// Returns true while the token's revocation is active.
    pub fn is_revoked(&self, token: &str) -> bool {
        let now = Utc::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(token) {
                None => return false,
                Some(expires_at) if now < *expires_at => return true,
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking in case it was re-added.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(expires_at) = entries.get(token) {
            if now < *expires_at {
                return true;
            }
            entries.remove(token);
        }
        false
    }

    /// Removes every entry whose expiry has passed and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, expires_at| now < *expires_at);
        metrics::gauge!("revoked_tokens").set(entries.len() as f64);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a background task that sweeps every `interval`.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let list = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = list.sweep();
                        tracing::debug!(removed, remaining = list.len(), "swept revoked tokens");
                    }
                }
            }
            tracing::debug!("revocation sweeper stopped");
        });

        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owns the background sweeper started by [`RevocationList::spawn_sweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the sweeper and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "revocation sweeper task failed");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
