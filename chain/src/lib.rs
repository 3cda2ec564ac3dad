//! Chain-facing side of phone-number attestation.
//!
//! The chain client itself (RPC transport, contract encoding, transaction
//! signing) lives outside this workspace. This crate defines the traits it
//! must implement and builds the attestation-specific logic on top of them:
//! the [`AttestationDirectory`] read model and wallet allow-list validation.

pub mod call;
pub mod directory;
pub mod error;
pub mod traits;
pub mod wallet;

pub use call::{ContractCall, TxContext, TxReceipt};
pub use directory::{is_attestation_expired, AttestationDirectory};
pub use error::{ChainError, WalletValidationError};
pub use traits::{
    AccountSigner, ChainReader, MetaTransactionSigner, RawTransaction, TransactionSender,
};
pub use wallet::{verify_wallet, verified_wallets};
