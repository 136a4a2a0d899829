//! Circuit breaker for emergency trading halts.
//!
//! The breaker holds a stored deadline rather than a timer: it is
//! considered active until `resume_at`, and is re-evaluated on every check.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Reason for circuit breaker activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Too many consecutive losses.
    ConsecutiveLosses,
    /// Session loss reached the emergency stop.
    EmergencyStop,
    /// Manual activation.
    Manual,
}

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Whether trading is currently halted.
    pub tripped: bool,
    pub trip_reason: Option<TripReason>,
    /// Free-form operator note for manual trips.
    pub trip_note: Option<String>,
    pub tripped_at: Option<DateTime<Utc>>,
    /// When trading can resume.
    pub resume_at: Option<DateTime<Utc>>,
    /// Trips since start.
    pub total_trips: u32,
}

/// Breaker with a fixed cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    cooldown: Duration,
    state: CircuitBreakerState,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: CircuitBreakerState::default(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether trading is halted at `now`; an elapsed cooldown resets the breaker.
    pub fn is_active(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.tripped {
            return false;
        }
        match self.state.resume_at {
            Some(resume_at) if now >= resume_at => {
                info!(
                    reason = ?self.state.trip_reason,
                    resume_at = %resume_at,
                    "Circuit breaker cooldown elapsed, trading resumed"
                );
                self.clear();
                false
            }
            _ => true,
        }
    }

    pub fn trip(&mut self, reason: TripReason, note: Option<String>, now: DateTime<Utc>) {
        let resume_at = now + self.cooldown;

        self.state.tripped = true;
        self.state.trip_reason = Some(reason);
        self.state.trip_note = note;
        self.state.tripped_at = Some(now);
        self.state.resume_at = Some(resume_at);
        self.state.total_trips += 1;

        error!(
            reason = ?reason,
            note = ?self.state.trip_note,
            resume_at = %resume_at,
            "Circuit breaker TRIPPED - trading halted"
        );
    }

    /// Operator reset.
    pub fn reset(&mut self) {
        self.clear();
        info!("Circuit breaker reset");
    }

    fn clear(&mut self) {
        self.state.tripped = false;
        self.state.trip_reason = None;
        self.state.trip_note = None;
        self.state.tripped_at = None;
        self.state.resume_at = None;
    }

    pub fn state(&self) -> &CircuitBreakerState {
        &self.state
    }
}
