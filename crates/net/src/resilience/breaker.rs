//! Circuit breaker shared by every call to the same portal origin

use dashmap::DashMap;
use edx_config::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are refused until the cooldown deadline
    Open,
    /// One trial call is allowed through
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl BreakerSettings {
    #[must_use]
    pub fn from_config(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Consecutive-failure circuit breaker
///
/// State lives behind a mutex that is never held across an await, so
/// overlapping transfers to one origin see each other's failures atomically.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                open_until: None,
                trial_started: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to place a call
    ///
    /// # Errors
    ///
    /// Returns the remaining wait when the breaker refuses the call.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let deadline = inner.open_until.unwrap_or(now);
                if now >= deadline {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(deadline - now)
                }
            }
            CircuitState::HalfOpen => {
                // A trial whose caller vanished must not wedge the breaker
                let trial_deadline = inner
                    .trial_started
                    .map_or(now, |started| started + self.settings.cooldown);
                if now >= trial_deadline {
                    inner.trial_started = Some(now);
                    Ok(())
                } else {
                    Err(trial_deadline - now)
                }
            }
        }
    }

    /// Record a call that reached the portal and got a considered answer.
    /// Returns `true` when this closed a half-open breaker.
    pub fn record_success(&self) -> bool {
        let mut inner = self.lock();
        let was_half_open = inner.state == CircuitState::HalfOpen;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.open_until = None;
        inner.trial_started = None;
        was_half_open
    }

    /// Record a transient failure. Returns the failure count when this call
    /// tripped the breaker open.
    pub fn record_failure(&self) -> Option<u32> {
        self.record_failure_at(Instant::now())
    }

    fn record_failure_at(&self, now: Instant) -> Option<u32> {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trips = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.settings.failure_threshold,
            CircuitState::Open => false,
        };
        if trips {
            inner.state = CircuitState::Open;
            inner.open_until = Some(now + self.settings.cooldown);
            inner.trial_started = None;
            Some(inner.consecutive_failures)
        } else {
            None
        }
    }

    #[must_use]
    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }
}

/// Breakers keyed by portal origin (`scheme://host:port`)
#[derive(Debug)]
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

static PROCESS_REGISTRY: OnceLock<Arc<BreakerRegistry>> = OnceLock::new();

impl BreakerRegistry {
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Registry shared by every client in the process
    ///
    /// The first caller's settings win; later callers get the same instance.
    #[must_use]
    pub fn process_wide(settings: BreakerSettings) -> Arc<Self> {
        let registry = PROCESS_REGISTRY.get_or_init(|| Arc::new(Self::new(settings)));
        if registry.settings != settings {
            tracing::debug!(
                requested = ?settings,
                active = ?registry.settings,
                "process-wide breaker registry already initialised"
            );
        }
        Arc::clone(registry)
    }

    /// Breaker for one origin, created closed on first use
    #[must_use]
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.settings)))
            .clone()
    }

    #[must_use]
    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerSettings {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 1000);
        let now = Instant::now();
        assert_eq!(cb.record_failure_at(now), None);
        assert_eq!(cb.record_failure_at(now), None);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.record_failure_at(now), Some(3));
        assert_eq!(cb.state(), CircuitState::Open);

        let wait = cb.try_acquire_at(now + Duration::from_millis(400)).unwrap_err();
        assert_eq!(wait, Duration::from_millis(600));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(2, 1000);
        let now = Instant::now();
        cb.record_failure_at(now);
        assert!(!cb.record_success());
        cb.record_failure_at(now);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_trial_success_closes() {
        let cb = breaker(1, 100);
        let now = Instant::now();
        cb.record_failure_at(now);

        let later = now + Duration::from_millis(100);
        assert!(cb.try_acquire_at(later).is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Only one trial at a time
        assert!(cb.try_acquire_at(later).is_err());

        assert!(cb.record_success());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire_at(later).is_ok());
    }

    #[test]
    fn test_half_open_trial_failure_reopens() {
        let cb = breaker(2, 100);
        let now = Instant::now();
        cb.record_failure_at(now);
        cb.record_failure_at(now);

        let later = now + Duration::from_millis(150);
        assert!(cb.try_acquire_at(later).is_ok());
        assert!(cb.record_failure_at(later).is_some());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire_at(later + Duration::from_millis(50)).is_err());
        assert!(cb.try_acquire_at(later + Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn test_registry_shares_breaker_per_target() {
        let registry = BreakerRegistry::new(BreakerSettings::default());
        let a = registry.breaker("https://portal.example");
        let b = registry.breaker("https://portal.example");
        let other = registry.breaker("https://mirror.example");

        a.record_failure();
        assert_eq!(b.consecutive_failures(), 1);
        assert_eq!(other.consecutive_failures(), 0);
    }
}
