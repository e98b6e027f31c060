//! Per-backend circuit breaker

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    consecutive_failures: u32,
    /// Set while open; requests are refused until this instant
    open_until: Option<Instant>,
}

/// Opens after `threshold` consecutive failures. Once the cooldown has
/// passed a single trial request is let through (half-open); its outcome
/// closes the breaker or re-opens it for another cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a request may go to the backend now
    pub fn allow(&self) -> bool {
        let mut inner = self.inner();
        match inner.open_until {
            None => true,
            Some(until) if Instant::now() >= until => {
                // Half-open: this caller is the trial; others wait out a
                // fresh cooldown
                inner.open_until = Some(Instant::now() + self.cooldown);
                true
            }
            Some(_) => false,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner();
        inner.consecutive_failures = 0;
        inner.open_until = None;
    }

    /// Returns true when this failure opened the breaker
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.consecutive_failures >= self.threshold {
            let was_closed = inner.open_until.is_none();
            inner.open_until = Some(Instant::now() + self.cooldown);
            return was_closed;
        }
        false
    }

    pub fn is_open(&self) -> bool {
        self.inner().open_until.is_some()
    }
}
