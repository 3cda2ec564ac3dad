//! Persisted verification state.
//!
//! The host serialises a snapshot when the app is backgrounded or closed and
//! hands it back to [`VerificationOrchestrator::restore`] on the next launch.
//! Nothing survives a restart implicitly.
//!
//! [`VerificationOrchestrator::restore`]: crate::VerificationOrchestrator::restore

use crate::error::VerificationError;
use avk_relay::Session;
use avk_types::{ActionableAttestation, Address, Timestamp, VerificationStatus};
use serde::{Deserialize, Serialize};

/// Current snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub version: u32,
    /// Relay session, including its error history.
    pub session: Session,
    pub status: VerificationStatus,
    /// Actionable attestations as of the last refresh.
    pub actionable: Vec<ActionableAttestation>,
    /// Wallet found or made verified by the last run.
    pub verified_wallet: Option<Address>,
    pub last_reveal_attempt: Option<Timestamp>,
}

impl Default for VerificationSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session: Session::default(),
            status: VerificationStatus::Idle,
            actionable: Vec::new(),
            verified_wallet: None,
            last_reveal_attempt: None,
        }
    }
}

impl VerificationSnapshot {
    pub fn to_json(&self) -> Result<String, VerificationError> {
        serde_json::to_string(self).map_err(|e| VerificationError::Snapshot(e.to_string()))
    }

    /// Parse a snapshot, rejecting formats from a newer release.
    pub fn from_json(json: &str) -> Result<Self, VerificationError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| VerificationError::Snapshot(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(VerificationError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_keeps_session() {
        let mut snapshot = VerificationSnapshot {
            status: VerificationStatus::CompletingAttestations,
            verified_wallet: Some(Address::new("0x00000000000000000000000000000000000000a1")),
            last_reveal_attempt: Some(Timestamp::new(1_700_000_000)),
            ..Default::default()
        };
        snapshot.session = Session::started("tok".into(), None, "captcha".into());
        snapshot.session.error_timestamps.push(Timestamp::new(1_700_000_100));

        let restored = VerificationSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn newer_version_is_rejected() {
        let snapshot = VerificationSnapshot {
            version: SNAPSHOT_VERSION + 1,
            ..Default::default()
        };
        let err = VerificationSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, VerificationError::Snapshot(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(VerificationSnapshot::from_json("{not json").is_err());
    }
}
