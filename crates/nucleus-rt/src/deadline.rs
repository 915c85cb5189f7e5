//! Cooperative cancellation (§5 "Cancellation").
//!
//! The evaluator never spawns background work; a `Deadline` is a cheap
//! `Instant`-based check threaded through `eval` and consulted between
//! examined elements of `grep`/`filter`/`map`/`reduce`, and at the start of
//! each synthesis candidate.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_zero_duration_deadline_is_immediately_expired() {
        let d = Deadline::after(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.is_expired());
    }

    #[test]
    fn a_generous_deadline_is_not_yet_expired() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.is_expired());
    }
}
