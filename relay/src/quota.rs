//! Error-quota circuit breaker across the relayed path.
//!
//! Every relay-reported error is timestamped into the session. When more
//! than `allotment` errors fall inside the sliding window, the relayed path
//! is considered exhausted until a new session is started.

use crate::session::Session;
use avk_types::{Timestamp, VerificationParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaGuard {
    window_secs: u64,
    allotment: u32,
}

impl QuotaGuard {
    pub fn new(window_secs: u64, allotment: u32) -> Self {
        Self {
            window_secs,
            allotment,
        }
    }

    pub fn from_params(params: &VerificationParams) -> Self {
        Self::new(params.relay_error_window_secs, params.relay_error_allotment)
    }

    /// Record one relay error at `now`, dropping entries outside the window.
    pub fn record_error(&self, session: &mut Session, now: Timestamp) {
        self.prune(session, now);
        session.error_timestamps.push(now);
    }

    /// Errors inside the window ending at `now`.
    pub fn recent_errors(&self, session: &Session, now: Timestamp) -> usize {
        session
            .error_timestamps
            .iter()
            .filter(|t| !t.has_expired(self.window_secs, now))
            .count()
    }

    /// Whether the breaker is open.
    pub fn is_exhausted(&self, session: &Session, now: Timestamp) -> bool {
        self.recent_errors(session, now) > self.allotment as usize
    }

    fn prune(&self, session: &mut Session, now: Timestamp) {
        session
            .error_timestamps
            .retain(|t| !t.has_expired(self.window_secs, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_allotment() {
        let guard = QuotaGuard::new(10_800, 2);
        let mut s = Session::default();
        let t = Timestamp::new(1_000_000);
        guard.record_error(&mut s, t);
        guard.record_error(&mut s, t);
        assert!(!guard.is_exhausted(&s, t));
        guard.record_error(&mut s, t);
        assert!(guard.is_exhausted(&s, t));
    }

    #[test]
    fn old_errors_fall_out_of_window() {
        let guard = QuotaGuard::new(10_800, 2);
        let mut s = Session::default();
        for _ in 0..3 {
            guard.record_error(&mut s, Timestamp::new(0));
        }
        let later = Timestamp::new(10_800);
        assert!(!guard.is_exhausted(&s, later));
        guard.record_error(&mut s, later);
        assert_eq!(s.error_timestamps.len(), 1);
    }
}
