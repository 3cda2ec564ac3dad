//! Events recorded during a run for the host to drain.

use crate::error::CodeIntakeError;
use avk_types::{Address, CodeInputType, VerificationStatus};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub enum VerificationEvent {
    StatusChanged(VerificationStatus),
    /// One reveal request finished.
    Revealed {
        issuer: Address,
        success: bool,
        needed_retry: bool,
    },
    CodeAccepted {
        issuer: Address,
        input_type: CodeInputType,
    },
    /// A code the user should be told about was rejected.
    CodeRejected {
        input_type: CodeInputType,
        error: CodeIntakeError,
    },
    AttestationCompleted { issuer: Address },
    /// A wallet verified in an earlier attempt was found; no new attestations
    /// are needed.
    VerifiedWalletFound { wallet: Address },
    WalletDeployed { wallet: Address },
    /// The relay could not be used; the run continues on the direct path.
    RelayBypassed { reason: String },
    /// The run ended with an error, already classified into a status.
    Failed { message: String },
}

/// Shared, append-only event buffer.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<VerificationEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: VerificationEvent) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Take every event recorded since the last drain.
    pub fn drain(&self) -> Vec<VerificationEvent> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
