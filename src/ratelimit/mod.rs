//! Rate limiting logic and state management.

mod key;
mod sweeper;
mod tracker;
mod window;

pub use key::ClientKey;
pub use sweeper::spawn_sweeper;
pub use tracker::{Decision, WindowTracker};
pub use window::RequestHistory;
