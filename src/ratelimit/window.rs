//! Per-client request history for the sliding window.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Arrival times of the requests counted against one client, oldest first.
///
/// A timestamp `ts` is live at `now` when it is younger than `window`, so the
/// window is the half-open interval `(now - window, now]`. Ages are compared
/// rather than `ts + window`, which would overflow for very long windows.
#[derive(Debug, Clone, Default)]
pub struct RequestHistory {
    timestamps: VecDeque<Instant>,
}

impl RequestHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp that has left the window.
    ///
    /// Timestamps are ordered, so only the expired prefix is visited.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if is_live(oldest, now, window) {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    /// Append `now` and keep at most `cap` of the most recent timestamps.
    ///
    /// `now` is clamped to the newest stored timestamp so the history stays
    /// ordered when concurrent callers read the clock before taking the lock.
    pub fn record(&mut self, now: Instant, cap: usize) {
        let at = self.timestamps.back().map_or(now, |&newest| newest.max(now));
        self.timestamps.push_back(at);
        while self.timestamps.len() > cap {
            self.timestamps.pop_front();
        }
    }

    /// How long until one more request would fit under `limit`, assuming no
    /// other request arrives in the meantime.
    pub fn retry_after(&self, now: Instant, limit: u64, window: Duration) -> Duration {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        if limit == 0 || self.timestamps.len() < limit {
            return Duration::ZERO;
        }

        // The next request is allowed once the limit-th most recent entry expires.
        let blocking = self.timestamps[self.timestamps.len() - limit];
        window.saturating_sub(now.saturating_duration_since(blocking))
    }

    /// True when no timestamp is live at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.timestamps.back().map_or(true, |&newest| !is_live(newest, now, window))
    }

    /// Number of timestamps live at `now`, without pruning.
    pub fn live_len(&self, now: Instant, window: Duration) -> usize {
        let expired = self.timestamps.partition_point(|&ts| !is_live(ts, now, window));
        self.timestamps.len() - expired
    }

    /// Number of stored timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

fn is_live(ts: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(ts) < window
}
