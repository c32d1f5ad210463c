#![doc = include_str!("../README.md")]
//!
//! # Core Components
//!
//! - [`Bucket`] - A single identity's token bucket, refilled in whole intervals
//! - [`Registry`] - Buckets keyed by identity, created on first use
//! - [`Limit`] - Rate, burst and refill interval shared by buckets
//! - [`Clock`] trait and implementations for time sources
//! - [`interval_count`] and [`next_after`] - The interval arithmetic behind refills
//!
//! # Quick Start
//!
//! ```rust
//! use std::num::NonZeroU32;
//!
//! use tollgate::{Limit, Registry};
//!
//! // 10 requests per second, bursts of 20
//! let limit = Limit::per_second_and_burst(
//!     NonZeroU32::new(10).unwrap(),
//!     NonZeroU32::new(20).unwrap()
//! );
//!
//! let registry = Registry::new(limit);
//!
//! if registry.draw("203.0.113.7", 1) {
//!     // serve the request
//! } else {
//!     // reply with 429 Too Many Requests
//! }
//! ```

mod bucket;
mod clock;
mod error;
mod interval;
mod limit;
mod registry;

pub use bucket::Bucket;
#[cfg(feature = "tokio")]
pub use clock::TokioClock;
pub use clock::{Clock, ManualClock, StdClock, Timestamp};
#[cfg(feature = "quanta")]
pub use clock::{FastClock, QuantaClock};
pub use error::*;
pub use interval::{interval_count, next_after};
pub use limit::Limit;
#[cfg(feature = "serde")]
pub use limit::LimitConfig;
pub use registry::Registry;
