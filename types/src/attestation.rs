//! Attestation records exchanged with the chain, issuers, and the code intake.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One outstanding attestation request that has been assigned to an issuer.
///
/// An immutable snapshot read from the chain. The set is re-fetched after
/// every state-changing operation because issuers can be added or drop out
/// server-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableAttestation {
    pub issuer: Address,
    /// Base URL of the issuer's attestation service.
    pub attestation_service_url: String,
    /// Version string the issuer's service reports.
    pub version: String,
    /// Block in which the attestation was requested.
    pub block_number: u64,
}

/// A code accepted by the intake for one issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationCode {
    /// Full attestation code, `0x`-prefixed hex.
    pub code: String,
    /// Short security code the full code was expanded from, if any.
    pub short_code: Option<String>,
    pub issuer: Address,
}

/// Raw completed/total counters for an identifier+account pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationStat {
    pub completed: u32,
    pub total: u32,
}

/// An attestation request that has been paid for but not yet had issuers selected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnselectedRequest {
    /// Zero means "no pending unselected request".
    pub block_number: u64,
    pub attestations_requested: u32,
    pub fee_token: Option<Address>,
}

impl UnselectedRequest {
    pub fn is_pending(&self) -> bool {
        self.block_number != 0
    }
}

/// How an attestation message reached the intake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeInputType {
    /// Push notification or platform auto-read.
    Automatic,
    /// Typed or pasted by the user.
    Manual,
    /// Opened through a verification deep link.
    DeepLink,
}

impl CodeInputType {
    /// Whether the user explicitly submitted this input and should see errors.
    pub fn is_user_submitted(&self) -> bool {
        matches!(self, Self::Manual | Self::DeepLink)
    }
}

impl fmt::Display for CodeInputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::DeepLink => "deep_link",
        };
        f.write_str(s)
    }
}
