//! Expectations: resource-scoped postconditions with a deadline.
//!
//! A reconciler registers an [`Expectation`] after triggering some
//! asynchronous change (for example creating a child resource) and checks on
//! it in later reconciliations until it is fulfilled or times out.

pub mod cleaner;
pub mod manager;

use std::fmt;
use std::sync::Arc;

use helmsman_core::HelmsmanResult;

pub use cleaner::{
    expectation_cleanup_task, ExpectationCleanupMetrics, ExpectationCleanupSnapshot,
    PeriodicCleanerExpectationManager,
};
pub use manager::{ExpectationManager, RegisteredExpectation, StaleReason};

/// Predicate over a primary resource and its reconciliation context.
pub trait Expectation<P, C>: Send + Sync {
    /// Name used to tell expectations on the same resource apart.
    fn name(&self) -> &str {
        ""
    }

    /// Evaluate the predicate. Errors propagate to the caller of the check.
    fn is_fulfilled(&self, primary: &P, context: &C) -> HelmsmanResult<bool>;
}

/// Shared handle to a registered expectation.
pub type SharedExpectation<P, C> = Arc<dyn Expectation<P, C>>;

/// [`Expectation`] from an infallible closure.
pub struct FnExpectation<F> {
    name: String,
    predicate: F,
}

impl<F> FnExpectation<F> {
    pub fn new(predicate: F) -> Self {
        Self::named("", predicate)
    }

    pub fn named(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<P, C, F> Expectation<P, C> for FnExpectation<F>
where
    F: Fn(&P, &C) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_fulfilled(&self, primary: &P, context: &C) -> HelmsmanResult<bool> {
        Ok((self.predicate)(primary, context))
    }
}

/// [`Expectation`] from a fallible closure.
pub struct TryFnExpectation<F> {
    name: String,
    predicate: F,
}

impl<F> TryFnExpectation<F> {
    pub fn new(predicate: F) -> Self {
        Self::named("", predicate)
    }

    pub fn named(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<P, C, F> Expectation<P, C> for TryFnExpectation<F>
where
    F: Fn(&P, &C) -> HelmsmanResult<bool> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_fulfilled(&self, primary: &P, context: &C) -> HelmsmanResult<bool> {
        (self.predicate)(primary, context)
    }
}

/// Outcome of checking a registered expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectationStatus {
    /// Predicate held; the registration was removed.
    Fulfilled,
    /// Deadline passed before the predicate held; the registration was removed.
    TimedOut,
    /// Still waiting; the registration is kept.
    NotFulfilled,
}

impl fmt::Display for ExpectationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::TimedOut => f.write_str("timed out"),
            Self::NotFulfilled => f.write_str("not fulfilled"),
        }
    }
}

/// Result of a check: nothing registered, or the expectation and its status.
pub enum ExpectationResult<P, C> {
    Absent,
    Checked {
        expectation: SharedExpectation<P, C>,
        status: ExpectationStatus,
    },
}

impl<P, C> ExpectationResult<P, C> {
    pub fn is_expectation_present(&self) -> bool {
        matches!(self, Self::Checked { .. })
    }

    pub fn is_fulfilled(&self) -> bool {
        self.status() == Some(ExpectationStatus::Fulfilled)
    }

    pub fn is_timed_out(&self) -> bool {
        self.status() == Some(ExpectationStatus::TimedOut)
    }

    pub fn is_not_fulfilled(&self) -> bool {
        self.status() == Some(ExpectationStatus::NotFulfilled)
    }

    pub fn status(&self) -> Option<ExpectationStatus> {
        match self {
            Self::Absent => None,
            Self::Checked { status, .. } => Some(*status),
        }
    }

    pub fn expectation(&self) -> Option<&SharedExpectation<P, C>> {
        match self {
            Self::Absent => None,
            Self::Checked { expectation, .. } => Some(expectation),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.expectation().map(|e| e.name())
    }
}

impl<P, C> fmt::Debug for ExpectationResult<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Checked {
                expectation,
                status,
            } => f
                .debug_struct("Checked")
                .field("name", &expectation.name())
                .field("status", status)
                .finish(),
        }
    }
}
