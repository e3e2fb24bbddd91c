//! Hooks fired when a request is turned away.

use std::time::Duration;
use tracing::{error, warn};

use crate::identity::AddressParseError;
use crate::ratelimit::ClientKey;

/// Why a request did not reach the inner service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection<'a> {
    /// The client is over its quota (429)
    QuotaExceeded {
        /// The client that was denied
        key: &'a ClientKey,
        /// Time until the client may try again
        retry_after: Duration,
    },
    /// No client key could be derived (500)
    IdentityExtraction(&'a AddressParseError),
}

/// Observer for rejected requests.
///
/// Called inline on the request path, so implementations must not block.
pub trait RejectionHook: Send + Sync {
    /// Handle one rejection.
    fn on_rejection(&self, rejection: &Rejection<'_>);
}

impl<F> RejectionHook for F
where
    F: Fn(&Rejection<'_>) + Send + Sync,
{
    fn on_rejection(&self, rejection: &Rejection<'_>) {
        self(rejection)
    }
}

/// Default hook: emit a tracing event per rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRejections;

impl RejectionHook for LogRejections {
    fn on_rejection(&self, rejection: &Rejection<'_>) {
        match rejection {
            Rejection::QuotaExceeded { key, retry_after } => {
                warn!(key = %key, retry_after = ?retry_after, "Request rejected: limit exceeded");
            }
            Rejection::IdentityExtraction(err) => {
                error!(error = %err, "Request rejected: client identity unavailable");
            }
        }
    }
}
