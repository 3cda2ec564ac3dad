//! Contract calls the verification flow submits, and their receipts.

use avk_types::{Address, Identifier, TxHash};
use serde::{Deserialize, Serialize};

/// A state-changing contract call, described by intent.
///
/// The external chain client owns ABI encoding; the verification flow only
/// decides which call to make with which arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// Approve the attestations contract to spend `amount` of the fee token.
    ApproveAttestationFee { fee_token: Address, amount: u128 },
    /// Pay for `count` new attestation requests.
    RequestAttestations {
        identifier: Identifier,
        count: u32,
        fee_token: Address,
    },
    /// Assign issuers to the pending unselected request.
    SelectIssuers { identifier: Identifier },
    /// Submit an issuer's code to complete one attestation.
    Complete {
        identifier: Identifier,
        issuer: Address,
        code: String,
    },
    /// Register the account's wallet address and data encryption key.
    SetAccount {
        wallet: Address,
        data_encryption_key: String,
    },
}

impl ContractCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::ApproveAttestationFee { .. } => "approve",
            Self::RequestAttestations { .. } => "request",
            Self::SelectIssuers { .. } => "selectIssuers",
            Self::Complete { .. } => "complete",
            Self::SetAccount { .. } => "setAccount",
        }
    }
}

/// Human-readable tag and gas budget attached to a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub tag: String,
    pub gas: Option<u64>,
}

impl TxContext {
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            gas: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}
