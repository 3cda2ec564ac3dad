//! Relay error taxonomy.

use avk_chain::{ChainError, WalletValidationError};
use avk_types::TxHash;
use thiserror::Error;

/// Failure talking to the relay over HTTP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("unauthorised")]
    Unauthorised,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("not found: {0}")]
    NotFound(String),

    /// Pepper quota used up for this account.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The account cannot pay for more pepper quota.
    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("request rejected ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthorised,
            402 => Self::InsufficientBalance,
            403 => Self::QuotaExceeded,
            404 => Self::NotFound(message),
            502 | 503 => Self::ServiceUnavailable,
            status => Self::Request { status, message },
        }
    }
}

/// Failure of a relayed transaction after the relay accepted it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("timed out waiting for receipt of {0}")]
    Timeout(TxHash),

    #[error("transaction {tx_hash} reverted: {reason}")]
    Revert { tx_hash: TxHash, reason: String },

    #[error("event {event} not found in {tx_hash}")]
    EventNotFound { tx_hash: TxHash, event: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("relay rejected session credentials")]
    AuthenticationFailed,

    #[error("could not sign login message: {0}")]
    LoginSignature(String),

    #[error("relay is down")]
    ServiceDown,

    /// More relay errors in the window than the allotment allows.
    #[error("relay error quota exceeded")]
    ErrorQuotaExceeded,

    #[error("no active relay session")]
    SessionInvalid,

    #[error(transparent)]
    InvalidWallet(#[from] WalletValidationError),
}

impl RelayError {
    /// The transaction reached the chain and reverted.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Tx(TxError::Revert { .. }) | Self::Chain(ChainError::Reverted(_)))
    }

    /// A retry of the same call might succeed.
    ///
    /// Auth failures, an unavailable service and reverts are never retried
    /// by the per-call policy.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(e) => matches!(
                e,
                FetchError::Network(_) | FetchError::Decode(_) | FetchError::Request { .. }
            ),
            Self::Tx(TxError::Timeout(_)) | Self::Tx(TxError::EventNotFound { .. }) => true,
            Self::Chain(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverts_are_not_transient() {
        let e = RelayError::Tx(TxError::Revert {
            tx_hash: TxHash::ZERO,
            reason: "nonce".into(),
        });
        assert!(e.is_revert());
        assert!(!e.is_transient());
    }

    #[test]
    fn bail_on_auth_and_unavailable() {
        assert!(!RelayError::Fetch(FetchError::Unauthorised).is_transient());
        assert!(!RelayError::Fetch(FetchError::ServiceUnavailable).is_transient());
        assert!(RelayError::Fetch(FetchError::Network("reset".into())).is_transient());
        assert!(RelayError::Tx(TxError::Timeout(TxHash::ZERO)).is_transient());
    }
}
