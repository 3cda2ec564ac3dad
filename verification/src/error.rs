use avk_chain::{ChainError, WalletValidationError};
use avk_identity::IdentityError;
use avk_issuer::IssuerError;
use avk_relay::{FetchError, RelayError};
use avk_types::{Address, VerificationStatus};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("verification cancelled")]
    Cancelled,

    #[error("verification timed out after {0}")]
    Timeout(String),

    #[error("salt quota exceeded")]
    SaltQuotaExceeded,

    #[error("insufficient balance")]
    InsufficientBalance,

    /// A new relay session is needed but no captcha token was supplied.
    #[error("captcha token required to start a relay session")]
    CaptchaRequired,

    #[error("relay session has no quota left")]
    SessionExhausted,

    #[error("relay is not ready: {0}")]
    RelayNotReady(RelayError),

    #[error("more than one verified wallet for this identifier: {}", format_wallets(.0))]
    MultipleVerifiedWallets(Vec<Address>),

    #[error("requesting {requested} more would exceed {max} actionable attestations (have {actionable})")]
    MaxActionableExceeded {
        requested: usize,
        actionable: usize,
        max: usize,
    },

    #[error("completion for issuer {issuer} failed: {reason}")]
    Completion { issuer: Address, reason: String },

    #[error(transparent)]
    InvalidWallet(#[from] WalletValidationError),

    #[error(transparent)]
    Relay(RelayError),

    #[error(transparent)]
    Chain(ChainError),

    #[error(transparent)]
    Identity(IdentityError),

    #[error(transparent)]
    Issuer(#[from] IssuerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Completions finished but the account is still short of the requirement.
    #[error("verification incomplete: {remaining} attestations remaining")]
    Incomplete { remaining: usize },
}

fn format_wallets(wallets: &[Address]) -> String {
    wallets
        .iter()
        .map(Address::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<RelayError> for VerificationError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Fetch(FetchError::InsufficientBalance) => Self::InsufficientBalance,
            RelayError::InvalidWallet(w) => Self::InvalidWallet(w),
            other => Self::Relay(other),
        }
    }
}

impl From<ChainError> for VerificationError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InsufficientBalance { .. } => Self::InsufficientBalance,
            other => Self::Chain(other),
        }
    }
}

impl From<IdentityError> for VerificationError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::SaltQuotaExceeded => Self::SaltQuotaExceeded,
            IdentityError::InsufficientBalance => Self::InsufficientBalance,
            other => Self::Identity(other),
        }
    }
}

impl VerificationError {
    /// The user-visible status this error ends a run in.
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::Cancelled => VerificationStatus::Stopped,
            Self::SaltQuotaExceeded => VerificationStatus::SaltQuotaExceeded,
            Self::InsufficientBalance => VerificationStatus::InsufficientBalance,
            _ => VerificationStatus::Failed,
        }
    }

    /// A transaction reached the chain and reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            Self::Relay(e) => e.is_revert(),
            Self::Chain(ChainError::Reverted(_)) => true,
            _ => false,
        }
    }

    /// Worth repeating the same step once more.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Relay(e) => e.is_transient(),
            Self::Chain(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Why an inbound message was not accepted as a code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeIntakeError {
    #[error("message is empty")]
    Empty,

    #[error("no attestation code in message")]
    NoCode,

    /// The code was already accepted.
    #[error("code already entered")]
    RepeatCode,

    #[error("no issuer matches the code")]
    NoMatchingIssuer,

    #[error("code is not valid for issuer {0}")]
    InvalidCode(Address),

    #[error("security code lookup failed: {0}")]
    SecurityCode(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl CodeIntakeError {
    /// Whether the user should be told about this failure.
    ///
    /// Empty and repeated automatic input is dropped silently; every failure
    /// of a manual or deep-link submission is shown.
    pub fn is_user_visible(&self, user_submitted: bool) -> bool {
        match self {
            Self::Empty => false,
            Self::RepeatCode | Self::NoCode => user_submitted,
            _ => true,
        }
    }
}
