use avk_types::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no unselected attestation request to wait for")]
    NoUnselectedRequest,

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },
}

impl ChainError {
    /// Whether a read can be retried without changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Timeout(_))
    }
}

/// A meta-transaction wallet failed the allow-list or signer check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletValidationError {
    #[error("wallet {wallet} uses implementation {implementation}, which is not allowed")]
    InvalidImplementation {
        wallet: Address,
        implementation: Address,
    },

    #[error("wallet {wallet} is signed by {actual}, expected {expected}")]
    InvalidSigner {
        wallet: Address,
        actual: Address,
        expected: Address,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}
