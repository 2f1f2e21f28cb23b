// Rust guideline compliant 2026-10-18

//! Per-user sliding window of recently seen transactions.
//!
//! Each entry expires on its own once it is older than the window. There is
//! no bucket-level TTL: a burst straddling the window boundary ages out one
//! entry at a time.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// One sighting of a transaction for a user.
#[derive(Debug, Clone)]
struct VelocityEntry {
    transaction_id: String,
    seen_at: Instant,
}

/// Short-term transaction history keyed by user.
///
/// Backed by a sharded map: every operation locks only the shard holding the
/// user's bucket, so unrelated users never contend on a single lock.
#[derive(Debug, Default)]
pub struct VelocityStore {
    users: DashMap<String, VecDeque<VelocityEntry>>,
}

/// `true` while `seen_at` is strictly inside `window` of `now`.
fn is_live(seen_at: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(seen_at) < window
}

fn prune(bucket: &mut VecDeque<VelocityEntry>, now: Instant, window: Duration) {
    bucket.retain(|e| is_live(e.seen_at, now, window));
}

impl VelocityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sighting of `transaction_id` to `user_id`'s history.
    pub fn record(&self, user_id: &str, transaction_id: &str, now: Instant) {
        self.users.entry(user_id.to_owned()).or_default().push_back(VelocityEntry {
            transaction_id: transaction_id.to_owned(),
            seen_at: now,
        });
    }

    /// Number of `user_id`'s entries within `window` of `now`.
    ///
    /// Expired entries are pruned as a side effect.
    #[must_use]
    pub fn count_recent(&self, user_id: &str, now: Instant, window: Duration) -> usize {
        match self.users.get_mut(user_id) {
            Some(mut bucket) => {
                prune(&mut bucket, now, window);
                bucket.len()
            }
            None => 0,
        }
    }

    /// Prune, count, then record, all under the user's lock.
    ///
    /// Returns the count taken *before* the current transaction was recorded.
    #[must_use]
    pub fn observe(
        &self,
        user_id: &str,
        transaction_id: &str,
        now: Instant,
        window: Duration,
    ) -> usize {
        let mut bucket = self.users.entry(user_id.to_owned()).or_default();
        prune(&mut bucket, now, window);
        let prior = bucket.len();
        bucket.push_back(VelocityEntry { transaction_id: transaction_id.to_owned(), seen_at: now });
        prior
    }

    /// Drop users whose every entry has expired. Returns how many were removed.
    pub fn purge_idle(&self, now: Instant, window: Duration) -> usize {
        let before = self.users.len();
        self.users.retain(|_, bucket| {
            prune(bucket, now, window);
            !bucket.is_empty()
        });
        let removed = before.saturating_sub(self.users.len());
        if removed > 0 {
            tracing::debug!(removed, "velocity.purge_idle");
        }
        removed
    }

    /// Number of users currently tracked.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Transaction ids currently held for `user_id`, oldest first.
    #[must_use]
    pub fn history(&self, user_id: &str) -> Vec<String> {
        self.users
            .get(user_id)
            .map(|b| b.iter().map(|e| e.transaction_id.clone()).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
