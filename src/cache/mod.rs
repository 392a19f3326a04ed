//! Per-run deduplication cache
//!
//! Maps a normalized entity key to its terminal outcome so each key is
//! resolved by network activity at most once per run. This is a correctness
//! requirement, not an optimization: re-querying a blocked source can deepen
//! its cooldown for every other task in the batch.
//!
//! Claims are linearizable per key. The first claimant becomes the owner and
//! resolves the entity; concurrent claimants for the same key park on a watch
//! channel and observe the owner's terminal result without touching the
//! network. An owner that disappears without fulfilling (worker panic or
//! abort) releases the key so a waiter can take over instead of hanging.

use crate::task::EntityTask;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

enum Entry {
    Pending(watch::Receiver<bool>),
    Done(Arc<EntityTask>),
}

type Shared = Arc<Mutex<HashMap<String, Entry>>>;

/// Outcome of a claim on an entity key
pub enum Claim {
    /// Caller owns resolution for this key and must fulfill the ticket
    Owner(ClaimTicket),
    /// Another task already resolved this key
    Cached(Arc<EntityTask>),
}

/// Ownership token for a pending key
///
/// Dropping an unfulfilled ticket releases the key.
pub struct ClaimTicket {
    key: String,
    map: Shared,
    tx: Option<watch::Sender<bool>>,
}

impl Drop for ClaimTicket {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            // Never fulfilled: remove the pending marker and wake waiters so
            // one of them can re-claim
            self.map.lock().remove(&self.key);
            let _ = tx.send(true);
        }
    }
}

#[derive(Default)]
pub struct DedupeCache {
    map: Shared,
}

impl DedupeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, waiting out any in-flight resolution by another task
    pub async fn claim(&self, key: &str) -> Claim {
        loop {
            let mut rx = {
                let mut map = self.map.lock();
                match map.get(key) {
                    Some(Entry::Done(task)) => return Claim::Cached(Arc::clone(task)),
                    Some(Entry::Pending(rx)) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(false);
                        map.insert(key.to_string(), Entry::Pending(rx));
                        return Claim::Owner(ClaimTicket {
                            key: key.to_string(),
                            map: Arc::clone(&self.map),
                            tx: Some(tx),
                        });
                    }
                }
            };
            // Parked until the owner fulfills or releases, then re-examine
            let _ = rx.changed().await;
        }
    }

    /// Publishes the owner's terminal result for its key
    pub fn fulfill(&self, mut ticket: ClaimTicket, task: Arc<EntityTask>) {
        debug_assert!(task.is_terminal(), "cached task must be terminal");
        let tx = ticket.tx.take().expect("ticket fulfilled twice");
        self.map
            .lock()
            .insert(ticket.key.clone(), Entry::Done(task));
        let _ = tx.send(true);
    }

    /// Terminal result for `key`, if one has been published
    pub fn get(&self, key: &str) -> Option<Arc<EntityTask>> {
        match self.map.lock().get(key) {
            Some(Entry::Done(task)) => Some(Arc::clone(task)),
            _ => None,
        }
    }

    /// Number of published terminal results
    pub fn resolved_count(&self) -> usize {
        self.map
            .lock()
            .values()
            .filter(|e| matches!(e, Entry::Done(_)))
            .count()
    }
}
