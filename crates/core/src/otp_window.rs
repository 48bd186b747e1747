//! OTP window arithmetic.
//!
//! The OTP gate runs inside a bounded window. The first wrong code rolls
//! the window so the user gets another attempt: an early miss restarts it,
//! a late one leaves `total - renewal` remaining. Later wrong codes do not
//! extend it again, so the loop cannot be kept alive forever.
//! Independently, once `renewal` has elapsed the upstream code has rotated
//! and a fresh extraction is due exactly once.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct OtpWindow {
    start: Instant,
    total: Duration,
    renewal: Duration,
    renewed: bool,
    rolled: bool,
}

impl OtpWindow {
    pub fn new(now: Instant, total: Duration, renewal: Duration) -> Self {
        Self {
            start: now,
            total,
            renewal,
            renewed: false,
            rolled: false,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.total
    }

    /// Roll the window start after the first wrong code. Returns whether
    /// the window moved.
    pub fn on_wrong(&mut self, now: Instant) -> bool {
        if self.rolled {
            return false;
        }
        self.rolled = true;
        let keep = if self.elapsed(now) >= self.renewal {
            self.renewal
        } else {
            Duration::ZERO
        };
        self.start = now - keep;
        true
    }

    /// Returns true the first time `renewal` has elapsed.
    pub fn renewal_due(&mut self, now: Instant) -> bool {
        if !self.renewed && self.elapsed(now) >= self.renewal {
            self.renewed = true;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: Instant) -> OtpWindow {
        OtpWindow::new(start, Duration::from_secs(135), Duration::from_secs(65))
    }

    #[test]
    fn expires_at_total() {
        let t0 = Instant::now();
        let w = window(t0);
        assert!(!w.expired(t0 + Duration::from_secs(134)));
        assert!(w.expired(t0 + Duration::from_secs(135)));
    }

    #[test]
    fn early_wrong_restarts_window() {
        let t0 = Instant::now();
        let mut w = window(t0);
        let now = t0 + Duration::from_secs(30);
        w.on_wrong(now);
        assert_eq!(w.elapsed(now), Duration::ZERO);
        assert!(!w.expired(now + Duration::from_secs(134)));
    }

    #[test]
    fn late_wrong_keeps_renewal_interval() {
        let t0 = Instant::now();
        let mut w = window(t0);
        let now = t0 + Duration::from_secs(100);
        w.on_wrong(now);
        assert_eq!(w.elapsed(now), Duration::from_secs(65));
        assert!(w.expired(now + Duration::from_secs(70)));
    }

    #[test]
    fn only_first_wrong_rolls_window() {
        let t0 = Instant::now();
        let mut w = window(t0);
        assert!(w.on_wrong(t0 + Duration::from_secs(30)));
        let later = t0 + Duration::from_secs(60);
        assert!(!w.on_wrong(later));
        assert_eq!(w.elapsed(later), Duration::from_secs(30));
    }

    #[test]
    fn renewal_fires_once() {
        let t0 = Instant::now();
        let mut w = window(t0);
        assert!(!w.renewal_due(t0 + Duration::from_secs(64)));
        assert!(w.renewal_due(t0 + Duration::from_secs(65)));
        assert!(!w.renewal_due(t0 + Duration::from_secs(90)));
    }
}
