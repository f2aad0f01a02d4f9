//! Registry of outstanding expectations, at most one per primary resource.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use helmsman_core::{system_clock, Clock, HelmsmanResult, Resource, ResourceId, ResourcePresence};

use super::{ExpectationResult, ExpectationStatus, SharedExpectation};

/// An expectation together with its registration time and timeout.
pub struct RegisteredExpectation<P, C> {
    registered_at: Instant,
    timeout: Duration,
    expectation: SharedExpectation<P, C>,
    generation: u64,
}

impl<P, C> Clone for RegisteredExpectation<P, C> {
    fn clone(&self) -> Self {
        Self {
            registered_at: self.registered_at,
            timeout: self.timeout,
            expectation: Arc::clone(&self.expectation),
            generation: self.generation,
        }
    }
}

impl<P, C> RegisteredExpectation<P, C> {
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expectation(&self) -> &SharedExpectation<P, C> {
        &self.expectation
    }

    /// True once `now` is strictly past `registered_at + timeout`.
    pub fn is_timed_out(&self, now: Instant) -> bool {
        elapsed_beyond(self.registered_at, self.timeout, now)
    }
}

impl<P, C> fmt::Debug for RegisteredExpectation<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredExpectation")
            .field("name", &self.expectation.name())
            .field("registered_at", &self.registered_at)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn elapsed_beyond(start: Instant, limit: Duration, now: Instant) -> bool {
    now.saturating_duration_since(start) > limit
}

/// Why the cleaner dropped a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The primary resource no longer exists.
    Missing,
    /// `registered_at + timeout + grace` has passed.
    Expired,
}

/// Tracks expectations per primary resource.
///
/// Registering replaces any previous registration for the same resource.
/// A check that finds the expectation fulfilled or timed out removes it.
/// Predicates are evaluated without holding any map lock.
pub struct ExpectationManager<P, C> {
    registered: DashMap<ResourceId, RegisteredExpectation<P, C>>,
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<P, C> Default for ExpectationManager<P, C> {
    fn default() -> Self {
        Self::with_clock(system_clock())
    }
}

impl<P, C> fmt::Debug for ExpectationManager<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectationManager")
            .field("registered", &self.registered.len())
            .finish()
    }
}

impl<P, C> ExpectationManager<P, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            registered: DashMap::new(),
            generation: AtomicU64::new(0),
            clock,
        }
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Resources with a registration.
    pub fn registered_ids(&self) -> Vec<ResourceId> {
        self.registered.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove the registration for `id`, if any.
    pub fn cleanup_id(&self, id: &ResourceId) {
        self.registered.remove(id);
    }

    fn registration(&self, id: &ResourceId) -> Option<RegisteredExpectation<P, C>> {
        self.registered.get(id).map(|r| r.value().clone())
    }

    /// Remove the registration for `id` only if it is still `generation`.
    fn remove_generation(&self, id: &ResourceId, generation: u64) -> bool {
        self.registered
            .remove_if(id, |_, r| r.generation == generation)
            .is_some()
    }

    /// Drop registrations whose resource is gone or whose deadline plus
    /// `grace` has passed.
    ///
    /// Snapshots the registry first and evaluates presence without holding
    /// any map lock. A registration replaced during the scan is kept.
    pub fn remove_stale(
        &self,
        presence: &dyn ResourcePresence,
        grace: Duration,
    ) -> Vec<(ResourceId, StaleReason)> {
        let now = self.clock.now();
        let candidates: Vec<(ResourceId, u64, Instant, Duration)> = self
            .registered
            .iter()
            .map(|e| {
                let r = e.value();
                (e.key().clone(), r.generation, r.registered_at, r.timeout)
            })
            .collect();

        let mut removed = Vec::new();
        for (id, generation, registered_at, timeout) in candidates {
            let reason = if !presence.contains(&id) {
                StaleReason::Missing
            } else if elapsed_beyond(registered_at, timeout.saturating_add(grace), now) {
                StaleReason::Expired
            } else {
                continue;
            };
            if self.remove_generation(&id, generation) {
                removed.push((id, reason));
            }
        }
        removed
    }
}

impl<P: Resource, C> ExpectationManager<P, C> {
    /// Register `expectation` for `primary`, replacing any earlier one.
    pub fn set_expectation(
        &self,
        primary: &P,
        timeout: Duration,
        expectation: SharedExpectation<P, C>,
    ) {
        let id = ResourceId::from_resource(primary);
        tracing::debug!(
            resource = %id,
            expectation = expectation.name(),
            timeout_ms = timeout.as_millis() as u64,
            "Registering expectation"
        );
        let registration = RegisteredExpectation {
            registered_at: self.clock.now(),
            timeout,
            expectation,
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        };
        self.registered.insert(id, registration);
    }

    /// Check the registered expectation for `primary`.
    ///
    /// A predicate error is returned as is and leaves the registration in
    /// place.
    pub fn check_on_expectation(
        &self,
        primary: &P,
        context: &C,
    ) -> HelmsmanResult<ExpectationResult<P, C>> {
        let id = ResourceId::from_resource(primary);
        match self.registration(&id) {
            Some(registration) => self.evaluate(&id, registration, primary, context),
            None => Ok(ExpectationResult::Absent),
        }
    }

    /// Like [`ExpectationManager::check_on_expectation`], but only if the
    /// registered expectation carries `name`.
    pub fn check_expectation_named(
        &self,
        name: &str,
        primary: &P,
        context: &C,
    ) -> HelmsmanResult<ExpectationResult<P, C>> {
        let id = ResourceId::from_resource(primary);
        match self.registration(&id) {
            Some(registration) if registration.expectation.name() == name => {
                self.evaluate(&id, registration, primary, context)
            }
            _ => Ok(ExpectationResult::Absent),
        }
    }

    fn evaluate(
        &self,
        id: &ResourceId,
        registration: RegisteredExpectation<P, C>,
        primary: &P,
        context: &C,
    ) -> HelmsmanResult<ExpectationResult<P, C>> {
        let status = if registration.expectation.is_fulfilled(primary, context)? {
            ExpectationStatus::Fulfilled
        } else if registration.is_timed_out(self.clock.now()) {
            ExpectationStatus::TimedOut
        } else {
            ExpectationStatus::NotFulfilled
        };

        if status != ExpectationStatus::NotFulfilled {
            self.remove_generation(id, registration.generation);
            tracing::debug!(
                resource = %id,
                expectation = registration.expectation.name(),
                %status,
                "Expectation resolved"
            );
        }

        Ok(ExpectationResult::Checked {
            expectation: registration.expectation,
            status,
        })
    }

    /// Register `expectation` unless it already holds.
    ///
    /// Returns whether a registration was made.
    pub fn check_and_set_expectation(
        &self,
        primary: &P,
        context: &C,
        timeout: Duration,
        expectation: SharedExpectation<P, C>,
    ) -> HelmsmanResult<bool> {
        if expectation.is_fulfilled(primary, context)? {
            return Ok(false);
        }
        self.set_expectation(primary, timeout, expectation);
        Ok(true)
    }

    /// True if an expectation is registered that has neither timed out nor
    /// been fulfilled. Never removes the registration.
    pub fn ongoing_expectation_present(&self, primary: &P, context: &C) -> HelmsmanResult<bool> {
        let Some(registration) = self.registration(&ResourceId::from_resource(primary)) else {
            return Ok(false);
        };
        if registration.is_timed_out(self.clock.now()) {
            return Ok(false);
        }
        Ok(!registration.expectation.is_fulfilled(primary, context)?)
    }

    pub fn is_expectation_present(&self, primary: &P) -> bool {
        self.registered
            .contains_key(&ResourceId::from_resource(primary))
    }

    /// True if the registered expectation for `primary` carries `name`.
    pub fn is_expectation_present_named(&self, name: &str, primary: &P) -> bool {
        self.registered
            .get(&ResourceId::from_resource(primary))
            .is_some_and(|r| r.expectation.name() == name)
    }

    pub fn get_expectation(&self, primary: &P) -> Option<SharedExpectation<P, C>> {
        self.registration(&ResourceId::from_resource(primary))
            .map(|r| r.expectation)
    }

    pub fn get_expectation_name(&self, primary: &P) -> Option<String> {
        self.get_expectation(primary).map(|e| e.name().to_string())
    }

    /// Remove the registration for `primary`, typically on deletion.
    pub fn cleanup(&self, primary: &P) {
        self.cleanup_id(&ResourceId::from_resource(primary));
    }

    /// Same as [`ExpectationManager::cleanup`].
    pub fn remove_expectation(&self, primary: &P) {
        self.cleanup(primary);
    }
}
