//! Aggregate attestation status and the orchestrator's lifecycle marker.

use crate::attestation::AttestationStat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate counts for an identifier+account pair, recomputed on every refresh.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttestationsStatus {
    pub is_verified: bool,
    /// Attestations still to complete; negative when over-completed.
    pub num_attestations_remaining: i64,
    pub total: u32,
    pub completed: u32,
}

impl AttestationsStatus {
    /// Status for an account with no attestation history.
    pub fn unverified(required: u32) -> Self {
        Self {
            is_verified: false,
            num_attestations_remaining: i64::from(required),
            total: 0,
            completed: 0,
        }
    }

    /// Status for an account already known to be verified.
    pub fn verified(required: u32) -> Self {
        Self {
            is_verified: true,
            num_attestations_remaining: 0,
            total: required,
            completed: required,
        }
    }

    /// Derive the status from raw contract counters.
    ///
    /// Verified means enough completions and a completion ratio of at least
    /// `threshold`. This is the naive contract view; revoked accounts are
    /// corrected separately by the directory.
    pub fn from_stat(stat: AttestationStat, required: u32, threshold: f64) -> Self {
        let remaining = i64::from(required) - i64::from(stat.completed);
        let fraction = if stat.total < 1 {
            0.0
        } else {
            f64::from(stat.completed) / f64::from(stat.total)
        };
        Self {
            is_verified: remaining <= 0 && fraction >= threshold,
            num_attestations_remaining: remaining,
            total: stat.total,
            completed: stat.completed,
        }
    }

    /// Remaining attestations clamped to zero.
    pub fn remaining(&self) -> usize {
        usize::try_from(self.num_attestations_remaining.max(0)).unwrap_or(0)
    }
}

/// Externally observable lifecycle of a verification attempt.
///
/// Mutated only by the orchestrator; read by the host UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// No attempt has run yet.
    #[default]
    Idle,
    /// Cancelled by the user.
    Stopped,
    Prepping,
    GettingStatus,
    RequestingAttestations,
    CompletingAttestations,
    Done,
    Failed,
    SaltQuotaExceeded,
    InsufficientBalance,
}

impl VerificationStatus {
    /// Whether no further transitions happen without a new run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped
                | Self::Done
                | Self::Failed
                | Self::SaltQuotaExceeded
                | Self::InsufficientBalance
        )
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
