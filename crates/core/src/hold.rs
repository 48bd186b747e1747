//! Hold-expiry and teardown admission policy.
//!
//! After a job reaches the hold point its TimerRecord sits in `WAITING`
//! until the hold duration has elapsed, when the sweep promotes it to
//! `TIMEOUT`. A `TIMEOUT` record is admitted for teardown only when no PC
//! on its server is working and it is the earliest-started `TIMEOUT`
//! record of that server.

use std::time::Duration;

use crate::status::TimerState;
use crate::types::{JobId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub hold: Duration,
    pub tolerance: Duration,
}

impl HoldPolicy {
    pub fn new(hold: Duration, tolerance: Duration) -> Self {
        Self { hold, tolerance }
    }

    /// True when `elapsed + tolerance >= hold`.
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        elapsed + self.tolerance >= self.hold
    }

    /// Same check against wall-clock timestamps; a start in the future
    /// counts as zero elapsed.
    pub fn is_expired_at(&self, start: Timestamp, now: Timestamp) -> bool {
        let elapsed = (now - start).to_std().unwrap_or(Duration::ZERO);
        self.is_expired(elapsed)
    }
}

/// Result of the teardown admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// The job's record is not `TIMEOUT` yet.
    NotExpired(TimerState),
    /// Another PC on the server holds the session.
    SessionBusy,
    /// An earlier-started `TIMEOUT` record goes first.
    NotFirst { head: JobId },
}

/// Decide whether `job_id` may be torn down now.
///
/// `head` is the earliest-started `TIMEOUT` record on the job's server.
pub fn admit(job_id: JobId, state: TimerState, working_count: i64, head: Option<JobId>) -> Admission {
    if state != TimerState::Timeout {
        return Admission::NotExpired(state);
    }
    if working_count > 0 {
        return Admission::SessionBusy;
    }
    match head {
        Some(head) if head != job_id => Admission::NotFirst { head },
        _ => Admission::Admit,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn policy() -> HoldPolicy {
        HoldPolicy::new(Duration::from_secs(660), Duration::from_secs(1))
    }

    #[test]
    fn threshold_minus_one_second_is_expired() {
        assert!(policy().is_expired(Duration::from_secs(659)));
        assert!(policy().is_expired(Duration::from_secs(660)));
    }

    #[test]
    fn threshold_minus_two_seconds_is_not_expired() {
        assert!(!policy().is_expired(Duration::from_secs(658)));
    }

    #[test]
    fn future_start_counts_as_zero() {
        let now = Utc::now();
        assert!(!policy().is_expired_at(now + chrono::Duration::seconds(5), now));
        assert!(policy().is_expired_at(now - chrono::Duration::seconds(659), now));
    }

    #[test]
    fn admit_requires_timeout_state() {
        assert_eq!(
            admit(1, TimerState::Waiting, 0, Some(1)),
            Admission::NotExpired(TimerState::Waiting)
        );
    }

    #[test]
    fn admit_refuses_while_sibling_working() {
        assert_eq!(admit(1, TimerState::Timeout, 1, Some(1)), Admission::SessionBusy);
    }

    #[test]
    fn admit_only_fifo_head() {
        assert_eq!(
            admit(2, TimerState::Timeout, 0, Some(1)),
            Admission::NotFirst { head: 1 }
        );
        assert_eq!(admit(1, TimerState::Timeout, 0, Some(1)), Admission::Admit);
    }
}
