//! Sliding window tracker that owns all per-client state.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::key::ClientKey;
use super::window::RequestHistory;
use crate::config::LimiterConfig;

/// Outcome of a single [`WindowTracker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request fits within the client's quota.
    Allow {
        /// Requests still available in the current window
        remaining: u64,
    },
    /// The client has exceeded its quota.
    Deny {
        /// Time until one more request would be allowed
        retry_after: Duration,
    },
}

impl Decision {
    /// True for [`Decision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Per-client sliding window log.
///
/// Histories live in a sharded map. The read, prune, append and write back of
/// one check all happen under the write guard of the shard holding that key,
/// so concurrent checks for the same client are serialised while clients in
/// other shards proceed in parallel.
pub struct WindowTracker {
    /// Request histories indexed by client key
    histories: DashMap<ClientKey, RequestHistory>,
    /// Quota settings, fixed for the tracker's lifetime
    config: LimiterConfig,
}

impl WindowTracker {
    /// Create an empty tracker.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            histories: DashMap::new(),
            config,
        }
    }

    /// The quota settings this tracker enforces.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Record a request from `key` arriving at `now` and decide whether it is
    /// allowed.
    ///
    /// The attempt is recorded whether or not it is allowed, so a client that
    /// keeps sending while over quota stays denied until it backs off.
    pub fn check(&self, key: &ClientKey, now: Instant) -> Decision {
        let limit = self.config.limit();
        let window = self.config.window();
        // Only the newest limit + 1 timestamps can influence a decision.
        let cap = usize::try_from(limit).unwrap_or(usize::MAX).saturating_add(1);

        trace!(key = %key, "Checking request window");

        let (count, retry_after) = {
            let mut history = self.histories.entry(key.clone()).or_insert_with(|| {
                debug!(key = %key, limit, window = ?window, "Tracking new client");
                RequestHistory::new()
            });

            history.prune(now, window);
            history.record(now, cap);

            let count = history.len() as u64;
            let retry_after = if count > limit {
                history.retry_after(now, limit, window)
            } else {
                Duration::ZERO
            };
            (count, retry_after)
        };

        if count > limit {
            debug!(key = %key, count, limit, retry_after = ?retry_after, "Request limit exceeded");
            Decision::Deny { retry_after }
        } else {
            Decision::Allow {
                remaining: limit - count,
            }
        }
    }

    /// Remove every client whose history has fully expired at `now`.
    ///
    /// Returns the number of clients removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.config.window();
        let mut removed = 0;

        self.histories.retain(|_, history| {
            let keep = !history.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });

        debug!(removed, remaining = self.histories.len(), "Swept expired clients");
        removed
    }

    /// Number of requests from `key` that are live at `now`.
    pub fn history_len(&self, key: &ClientKey, now: Instant) -> usize {
        self.histories
            .get(key)
            .map_or(0, |history| history.live_len(now, self.config.window()))
    }

    /// Number of clients currently tracked.
    pub fn client_count(&self) -> usize {
        self.histories.len()
    }

    /// Forget all clients.
    pub fn clear(&self) {
        self.histories.clear();
    }
}
