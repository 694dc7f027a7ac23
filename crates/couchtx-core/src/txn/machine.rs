//! Conflict/retry state machine driving one transaction invocation.
//!
//! ```text
//! Modify -> Store -> Done
//!             |-- conflict -> Reload -> Modify
//!             `-- error    -> Backoff -> Store
//! Modify  -- error -> Backoff -> Modify   (document restored)
//! Reload  -- error -> Backoff -> Reload
//! ```
//!
//! Each phase returns a [`Step`]; one loop dispatches steps, owns the error
//! aggregate and the attempt budget, and races every suspension point
//! against cancellation and the deadline.

use std::future::Future;

use tokio::time::Instant;

use super::error::{AttemptError, TransactionError};
use super::transform::Transform;
use super::TransactionOptions;
use crate::control::CancelToken;
use crate::document::{Document, Target};
use crate::retry::RetryBudget;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Apply the transform to the working document.
    Modify,
    /// Write the working document.
    Store,
    /// Replace the working document with the store's current copy.
    Reload,
}

/// Outcome of one phase.
#[derive(Debug)]
enum Step {
    Goto(Phase),
    /// Recoverable error: consume an attempt, back off, then resume at the phase.
    Retry(Phase, AttemptError),
    /// Write accepted; the working document is final.
    Done,
}

/// Why a suspension point stopped early.
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    Deadline,
}

impl Interrupt {
    fn into_error(self, errors: Vec<AttemptError>) -> TransactionError {
        match self {
            Interrupt::Cancelled => TransactionError::Cancelled { errors },
            Interrupt::Deadline => TransactionError::DeadlineExceeded { errors },
        }
    }
}

/// Per-invocation mutable state. Never shared between invocations.
#[derive(Debug)]
struct AttemptContext {
    doc: Document,
    budget: RetryBudget,
    errors: Vec<AttemptError>,
    conflicts: u32,
    /// Still on an id target's first fetch, where `create_missing` applies.
    first_fetch: bool,
}

pub(crate) struct Machine<'a, S: ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) transform: &'a Transform,
    pub(crate) options: &'a TransactionOptions,
    pub(crate) cancel: Option<&'a CancelToken>,
    pub(crate) deadline: Option<Instant>,
}

impl<S: DocumentStore + ?Sized> Machine<'_, S> {
    /// Run the invocation to success or a terminal error.
    pub(crate) async fn drive(&self, target: Target) -> Result<Document, TransactionError> {
        let first_fetch = matches!(target, Target::Id(_));
        let (doc, mut phase) = match target {
            Target::Id(id) => (Document::new(id), Phase::Reload),
            Target::Document(doc) => (doc, Phase::Modify),
        };
        let mut ctx = AttemptContext {
            doc,
            budget: RetryBudget::new(self.options.limit),
            errors: Vec::new(),
            conflicts: 0,
            first_fetch,
        };

        loop {
            let outcome = self.interruptible(self.step(phase, &mut ctx)).await;
            let step = match outcome {
                Ok(step) => step,
                Err(interrupt) => return Err(self.interrupted(interrupt, ctx)),
            };
            match step {
                Step::Goto(next) => phase = next,
                Step::Done => {
                    tracing::debug!(
                        rev = ctx.doc.rev.as_deref().unwrap_or(""),
                        conflicts = ctx.conflicts,
                        attempts = ctx.budget.used() + 1,
                        "transaction committed"
                    );
                    return Ok(ctx.doc);
                }
                Step::Retry(next, error) => {
                    tracing::warn!(phase = ?next, "transaction attempt failed: {}", error);
                    ctx.errors.push(error);
                    let Some(attempt) = ctx.budget.consume() else {
                        tracing::info!(
                            limit = ctx.budget.limit(),
                            errors = ctx.errors.len(),
                            "transaction gave up: too many errors"
                        );
                        return Err(TransactionError::Exhausted {
                            attempts: ctx.budget.limit(),
                            errors: ctx.errors,
                        });
                    };
                    let delay = self.options.backoff.delay(attempt);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    tracing::debug!(attempt, delay_ms, "backing off");
                    let slept = self.interruptible(tokio::time::sleep(delay)).await;
                    if let Err(interrupt) = slept {
                        return Err(self.interrupted(interrupt, ctx));
                    }
                    phase = next;
                }
            }
        }
    }

    async fn step(&self, phase: Phase, ctx: &mut AttemptContext) -> Step {
        match phase {
            Phase::Modify => self.modify(ctx).await,
            Phase::Store => self.store(ctx).await,
            Phase::Reload => self.reload(ctx).await,
        }
    }

    /// The transform sees a copy; on failure `ctx.doc` is still the pristine document.
    async fn modify(&self, ctx: &mut AttemptContext) -> Step {
        match self.transform.apply(ctx.doc.clone()).await {
            Ok(mut next) => {
                if next.id != ctx.doc.id || next.rev != ctx.doc.rev {
                    tracing::debug!(
                        returned_id = %next.id,
                        "transform changed document identity; keeping id and revision"
                    );
                    next.id = ctx.doc.id.clone();
                    next.rev = ctx.doc.rev.clone();
                }
                ctx.doc = next;
                Step::Goto(Phase::Store)
            }
            Err(e) => Step::Retry(Phase::Modify, AttemptError::Transform(e)),
        }
    }

    /// Conflicts take precedence over the generic retry: reload only, no attempt consumed.
    async fn store(&self, ctx: &mut AttemptContext) -> Step {
        match self.store.insert(&ctx.doc).await {
            Ok(result) => {
                ctx.doc.apply_write(&result);
                Step::Done
            }
            Err(e) if e.is_conflict() => {
                ctx.conflicts += 1;
                tracing::debug!(conflicts = ctx.conflicts, "write conflict; reloading");
                ctx.errors.push(AttemptError::Conflict(e));
                Step::Goto(Phase::Reload)
            }
            // Resubmit the same transformed body; the transform is not re-applied.
            Err(e) => Step::Retry(Phase::Store, AttemptError::Store(e)),
        }
    }

    async fn reload(&self, ctx: &mut AttemptContext) -> Step {
        match self.store.get(&ctx.doc.id).await {
            Ok(current) => {
                ctx.doc = current;
                ctx.first_fetch = false;
                Step::Goto(Phase::Modify)
            }
            Err(e) if e.is_not_found() && ctx.first_fetch && self.options.create_missing => {
                tracing::debug!("document missing; starting from an empty document");
                ctx.doc = Document::new(ctx.doc.id.clone());
                ctx.first_fetch = false;
                Step::Goto(Phase::Modify)
            }
            Err(e) => Step::Retry(Phase::Reload, AttemptError::Reload(e)),
        }
    }

    fn interrupted(&self, interrupt: Interrupt, ctx: AttemptContext) -> TransactionError {
        tracing::info!(reason = ?interrupt, errors = ctx.errors.len(), "transaction interrupted");
        interrupt.into_error(ctx.errors)
    }

    /// Await `fut` unless cancellation or the deadline comes first.
    async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Interrupt::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Interrupt::Deadline);
        }
        tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel) => Err(Interrupt::Cancelled),
            _ = wait_deadline(self.deadline) => Err(Interrupt::Deadline),
            out = fut => Ok(out),
        }
    }
}

async fn wait_cancelled(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
