//! Background removal of clients whose windows have expired.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::tracker::WindowTracker;

/// Periodically sweep `tracker` every `interval`.
///
/// The task only holds a weak reference and exits on the first tick after
/// the last strong reference to the tracker is dropped.
pub fn spawn_sweeper(tracker: &Arc<WindowTracker>, interval: Duration) -> JoinHandle<()> {
    let weak: Weak<WindowTracker> = Arc::downgrade(tracker);

    info!(interval = ?interval, "Starting window sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(tracker) = weak.upgrade() else {
                debug!("Tracker dropped, stopping window sweeper");
                break;
            };
            tracker.sweep(Instant::now());
        }
    })
}
