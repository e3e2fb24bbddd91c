//! Tower middleware that puts the window tracker in front of a service.

mod hook;
mod layer;
mod response;

pub use hook::{LogRejections, Rejection, RejectionHook};
pub use layer::{Limiter, RateLimitLayer};
pub use response::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
