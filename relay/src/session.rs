//! Relay session state.

use crate::api::SessionQuota;
use avk_types::{Address, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle of a relay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No token yet.
    Unstarted,
    /// Token held and quota left.
    Active,
    /// Token held but quota used up; a new session is needed.
    Exhausted,
}

/// A relay session owned by one verification run.
///
/// Replaced wholesale when a new session is started, never patched into a
/// different session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    pub callback_url: Option<String>,
    pub captcha_token: Option<String>,
    pub active: bool,
    pub wallet_address: Option<Address>,
    /// Times at which the relay reported an error, oldest first.
    pub error_timestamps: Vec<Timestamp>,
}

impl Session {
    /// A fresh session from a successful start.
    pub fn started(token: String, callback_url: Option<String>, captcha_token: String) -> Self {
        Self {
            token: Some(token),
            callback_url,
            captcha_token: Some(captcha_token),
            active: true,
            wallet_address: None,
            error_timestamps: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.token, self.active) {
            (None, _) => SessionPhase::Unstarted,
            (Some(_), true) => SessionPhase::Active,
            (Some(_), false) => SessionPhase::Exhausted,
        }
    }

    /// Apply a `checkSession` result.
    ///
    /// The session is usable only if it can still request attestations and
    /// submit meta-transactions, and it can obtain a pepper (either one is
    /// already cached locally or the relay still has pepper quota). The wallet
    /// address falls back to the one already known.
    pub fn apply_check(
        &mut self,
        quota: &SessionQuota,
        wallet_address: Option<Address>,
        has_cached_pepper: bool,
    ) {
        let no_pepper = !has_cached_pepper && quota.distributed_blinded_pepper == 0;
        self.active = !(no_pepper
            || quota.request_subsidised_attestation == 0
            || quota.submit_meta_transaction == 0);
        if let Some(wallet) = wallet_address {
            self.wallet_address = Some(wallet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(pepper: u32, request: u32, submit: u32) -> SessionQuota {
        SessionQuota {
            distributed_blinded_pepper: pepper,
            request_subsidised_attestation: request,
            submit_meta_transaction: submit,
        }
    }

    #[test]
    fn phases() {
        let mut s = Session::default();
        assert_eq!(s.phase(), SessionPhase::Unstarted);
        s = Session::started("t".into(), None, "c".into());
        assert_eq!(s.phase(), SessionPhase::Active);
        s.active = false;
        assert_eq!(s.phase(), SessionPhase::Exhausted);
    }

    #[test]
    fn no_request_quota_and_no_pepper_deactivates() {
        let mut s = Session::started("t".into(), None, "c".into());
        s.apply_check(&quota(0, 0, 10), None, false);
        assert!(!s.active);
    }

    #[test]
    fn cached_pepper_covers_missing_pepper_quota() {
        let mut s = Session::started("t".into(), None, "c".into());
        s.apply_check(&quota(0, 3, 10), None, true);
        assert!(s.active);
        s.apply_check(&quota(0, 3, 10), None, false);
        assert!(!s.active);
    }

    #[test]
    fn wallet_address_falls_back() {
        let wallet = Address::new("0x00000000000000000000000000000000000000aa");
        let mut s = Session::started("t".into(), None, "c".into());
        s.apply_check(&quota(1, 1, 1), Some(wallet.clone()), false);
        s.apply_check(&quota(1, 1, 1), None, false);
        assert_eq!(s.wallet_address, Some(wallet));
    }
}
