use avk_crypto::CryptoError;
use avk_relay::{FetchError, RelayError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No pepper stored locally and no fetch was attempted.
    #[error("pepper not cached")]
    PepperNotCached,

    /// The account has used up its pepper quota.
    #[error("salt quota exceeded")]
    SaltQuotaExceeded,

    /// The account cannot pay for more pepper quota.
    #[error("insufficient balance for pepper quota")]
    InsufficientBalance,

    #[error("pepper fetch failed: {0}")]
    Fetch(FetchError),

    #[error("pepper fetch through relay failed: {0}")]
    Relay(RelayError),

    #[error("could not sign pepper request: {0}")]
    Signing(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("pepper cache: {0}")]
    Cache(String),
}

impl From<FetchError> for IdentityError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::QuotaExceeded => Self::SaltQuotaExceeded,
            FetchError::InsufficientBalance => Self::InsufficientBalance,
            other => Self::Fetch(other),
        }
    }
}

impl From<RelayError> for IdentityError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Fetch(fetch) => fetch.into(),
            other => Self::Relay(other),
        }
    }
}
