//! Reqlimit - per-client request limiting middleware
//!
//! This crate rejects excess traffic from any single client within a sliding
//! time window. [`Limiter`] wraps any tower service answering
//! `http::Request`s; allowed requests pass through untouched, denied ones get
//! a 429 and never reach the inner service.
//!
//! State is held in memory by one [`WindowTracker`] per limiter and is not
//! shared between processes.

pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod ratelimit;

pub use config::{IdentityPolicy, LimiterConfig, ReqlimitConfig};
pub use error::{ReqlimitError, Result};
pub use middleware::{Limiter, RateLimitLayer};
pub use ratelimit::{ClientKey, Decision, WindowTracker};
