use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default total attempt budget for one transaction.
pub const DEFAULT_LIMIT: u32 = 5;

/// Default delay of the constant policy.
pub const DEFAULT_CONSTANT_DELAY: Duration = Duration::from_millis(300);

/// Exponent cap so `2^attempt` stays well inside `u32`.
const MAX_EXPONENT: u32 = 16;

/// Maps an attempt index to the delay before the next try.
///
/// The index is the number of recoverable errors seen so far (1 before the
/// first retry). Policies are pure and cheap to clone.
#[derive(Clone)]
pub enum BackoffPolicy {
    /// Same delay every time.
    Constant(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    /// Caller-supplied mapping.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Constant(DEFAULT_CONSTANT_DELAY)
    }
}

impl fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffPolicy::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            BackoffPolicy::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            BackoffPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BackoffPolicy {
    pub fn constant(delay: Duration) -> Self {
        BackoffPolicy::Constant(delay)
    }

    /// Exponential policy without an effective cap.
    pub fn exponential(base: Duration) -> Self {
        BackoffPolicy::Exponential {
            base,
            max: Duration::MAX,
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        BackoffPolicy::Custom(Arc::new(f))
    }

    /// Delay before retrying after `attempt` recoverable errors.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Constant(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let factor = 1u32 << attempt.min(MAX_EXPONENT);
                base.saturating_mul(factor).min(*max)
            }
            BackoffPolicy::Custom(f) => f(attempt),
        }
    }
}

/// Attempts remaining for one invocation.
///
/// Every recoverable error consumes one attempt; once the counter reaches
/// zero the invocation must fail instead of doing more work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    limit: u32,
    remaining: u32,
}

impl RetryBudget {
    /// A limit of 0 is treated as 1: there is always at least one attempt.
    pub fn new(limit: u32) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            remaining: limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Number of attempts consumed so far.
    pub fn used(&self) -> u32 {
        self.limit - self.remaining
    }

    /// Record one recoverable error. Returns the attempt index to hand to the
    /// backoff policy, or `None` when the budget is exhausted.
    pub fn consume(&mut self) -> Option<u32> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            None
        } else {
            Some(self.used())
        }
    }
}
