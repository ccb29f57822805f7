//! Circuit breaker for the dedicated breaker pool.
//!
//! Closed until N consecutive failures, then open for a cooldown,
//! then a half-open probe: one request is allowed through; success
//! closes the breaker, failure re-opens it.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

enum Inner {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match &*self.inner.lock() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// May a request proceed right now? An open breaker past its
    /// cooldown transitions to half-open and admits one probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::Closed { .. } => true,
            Inner::HalfOpen => false, // one probe already in flight
            Inner::Open { until } => {
                if Instant::now() >= *until {
                    info!("Circuit breaker half-open, admitting probe");
                    *inner = Inner::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::HalfOpen => {
                info!("Circuit breaker closed after successful probe");
                *inner = Inner::Closed {
                    consecutive_failures: 0,
                };
            }
            Inner::Closed { .. } => {
                *inner = Inner::Closed {
                    consecutive_failures: 0,
                };
            }
            Inner::Open { .. } => {}
        }
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match &*inner {
            Inner::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(failures, "Circuit breaker opened");
                    *inner = Inner::Open {
                        until: Instant::now() + self.config.cooldown,
                    };
                } else {
                    *inner = Inner::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            Inner::HalfOpen => {
                warn!("Circuit breaker probe failed, re-opening");
                *inner = Inner::Open {
                    until: Instant::now() + self.config.cooldown,
                };
            }
            Inner::Open { .. } => {}
        }
    }
}
