//! Per-tenant circuit breaker.
//!
//! Closed until `threshold` consecutive failures, then open for `cooldown`.
//! After the cooldown one probe call is let through (half-open): success
//! closes the circuit, failure re-opens it. A probe whose permit is dropped
//! without an outcome (the call was cancelled) counts as a failure.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

/// Admission for one call. Report the outcome with [`CircuitPermit::succeed`]
/// or [`CircuitPermit::fail`].
#[must_use]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// Returns true when this failure opened the circuit.
    pub fn fail(mut self) -> bool {
        self.settled = true;
        self.breaker.record_failure()
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.abandon_probe();
        }
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// A permit when a call may go out now.
    pub fn try_acquire(&self) -> Option<CircuitPermit<'_>> {
        let mut inner = self.inner.lock();
        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open { until } if Instant::now() >= until => {
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                true
            }
            CircuitState::Open { .. } => return None,
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => return None,
        };
        Some(CircuitPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
    }

    fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.probe_in_flight = false;
        let trip = matches!(inner.state, CircuitState::HalfOpen)
            || (matches!(inner.state, CircuitState::Closed) && inner.consecutive_failures >= self.threshold);
        if trip {
            inner.state = CircuitState::Open {
                until: Instant::now() + self.cooldown,
            };
        }
        trip
    }

    fn abandon_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            inner.probe_in_flight = false;
            inner.state = CircuitState::Open {
                until: Instant::now() + self.cooldown,
            };
        }
    }
}
