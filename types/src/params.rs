//! Verification parameters: the tunable constants of an attestation run.
//!
//! Every field has a serde default, so a config file only needs to name the
//! values it overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All tunables consumed by the orchestrator and its collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationParams {
    // ── Attestation counts ───────────────────────────────────────────────
    /// Completed attestations needed to count as verified.
    pub num_attestations_required: u32,

    /// Minimum completed/total ratio for the verified flag.
    pub attestation_threshold: f64,

    /// Upper bound on outstanding actionable attestations a run will accept.
    pub max_actionable_attestations: u32,

    // ── Timing ───────────────────────────────────────────────────────────
    /// Overall deadline for one verification attempt.
    pub verification_timeout_secs: u64,

    /// Wait before retrying a reveal the issuer has not yet seen on chain.
    pub reveal_retry_delay_secs: u64,

    /// Per-index delay between concurrent completions.
    pub completion_stagger_secs: u64,

    /// Interval between block-number polls when waiting for a block boundary.
    pub block_poll_interval_ms: u64,

    /// Upper bound on waiting for a relayed transaction receipt.
    pub receipt_timeout_ms: u64,

    // ── Retries ──────────────────────────────────────────────────────────
    /// Attempts for a completion that reverts.
    pub completion_revert_retries: u32,

    /// Attempts for each attestation directory read.
    pub directory_read_attempts: u32,

    /// Attempts for the relay readiness probe.
    pub readiness_retries: u32,

    /// Base backoff for the readiness probe; doubles per attempt.
    pub readiness_backoff_ms: u64,

    /// Attempts to deploy the relayed wallet.
    pub deploy_wallet_attempts: u32,

    /// Attempts for each individual relay call.
    pub relay_call_attempts: u32,

    // ── Relay error budget ───────────────────────────────────────────────
    /// Sliding window over which relay errors are counted.
    pub relay_error_window_secs: u64,

    /// Errors tolerated inside the window before the relay is bypassed.
    pub relay_error_allotment: u32,
}

impl VerificationParams {
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn reveal_retry_delay(&self) -> Duration {
        Duration::from_secs(self.reveal_retry_delay_secs)
    }

    pub fn completion_stagger(&self) -> Duration {
        Duration::from_secs(self.completion_stagger_secs)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn readiness_backoff(&self) -> Duration {
        Duration::from_millis(self.readiness_backoff_ms)
    }

    /// Parameters with every timer shortened, for tests and local harnesses.
    pub fn fast() -> Self {
        Self {
            verification_timeout_secs: 30,
            reveal_retry_delay_secs: 1,
            completion_stagger_secs: 0,
            block_poll_interval_ms: 10,
            receipt_timeout_ms: 200,
            readiness_backoff_ms: 10,
            ..Self::default()
        }
    }
}

impl Default for VerificationParams {
    fn default() -> Self {
        Self {
            num_attestations_required: 3,
            attestation_threshold: 0.25,
            max_actionable_attestations: 5,
            verification_timeout_secs: 600,
            reveal_retry_delay_secs: 10,
            completion_stagger_secs: 1,
            block_poll_interval_ms: 1000,
            receipt_timeout_ms: 20_000,
            completion_revert_retries: 3,
            directory_read_attempts: 3,
            readiness_retries: 3,
            readiness_backoff_ms: 5000,
            deploy_wallet_attempts: 3,
            relay_call_attempts: 3,
            relay_error_window_secs: 3 * 3600,
            relay_error_allotment: 2,
        }
    }
}
