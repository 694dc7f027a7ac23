//! Backoff policy and attempt budget.
//!
//! Transactions share one [`BackoffPolicy`] read-only across invocations;
//! each invocation owns its own [`RetryBudget`].

mod policy;

pub use policy::{BackoffPolicy, RetryBudget, DEFAULT_CONSTANT_DELAY, DEFAULT_LIMIT};
