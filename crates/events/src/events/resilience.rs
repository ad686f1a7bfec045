use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decisions taken by the retry policy and circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResilienceEvent {
    RetryScheduled {
        target: String,
        attempt: u32,
        max_attempts: u32,
        reason: String,
        delay: Duration,
    },

    CircuitOpened {
        target: String,
        consecutive_failures: u32,
        cooldown: Duration,
    },

    /// Call refused without touching the network
    CircuitRejected {
        target: String,
        retry_after: Duration,
    },

    CircuitClosed {
        target: String,
    },
}
