//! # fusebox
//!
//! Async circuit breaker for protecting callers from a failing dependency.
//!
//! A [`CircuitBreaker`] wraps any fallible action and moves through three
//! states:
//!
//! 1. **Closed**: calls run. Action errors are returned as-is and counted.
//! 2. **Open**: after `failure_threshold` consecutive failures, calls are
//!    rejected without running the action.
//! 3. **Half-open**: after `cooldown`, calls run as recovery probes. One
//!    success closes the circuit; `half_open_trial_limit` consecutive
//!    failures open it again.
//!
//! ## Key Guarantees
//!
//! 1. **No retries**: the action runs at most once per call
//! 2. **Fast-fail**: an open circuit never runs the action
//! 3. **Non-blocking recovery**: the cooldown runs as a background Tokio task
//! 4. **Shareable**: one breaker serves many concurrent callers
//!
//! ## Example
//!
//! ```rust,ignore
//! use fusebox::{BreakerError, CircuitBreaker};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::builder()
//!     .failure_threshold(3)
//!     .half_open_trial_limit(2)
//!     .cooldown(Duration::from_secs(1))
//!     .build()?;
//!
//! match breaker.guard(|| client.fetch_quote()).await {
//!     Ok(quote) => println!("quote: {}", quote),
//!     Err(BreakerError::Open { .. }) => println!("backend down, using cached quote"),
//!     Err(e) => println!("request failed: {}", e),
//! }
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod state;

// Re-export main types at crate root
pub use breaker::{CircuitBreaker, CircuitBreakerBuilder};
pub use config::{CircuitBreakerConfig, ConfigError};
pub use error::BreakerError;
pub use state::CircuitState;
