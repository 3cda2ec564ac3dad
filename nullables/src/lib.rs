//! Nullable infrastructure for deterministic testing.
//!
//! Every collaborator of the verification flow (clock, chain, signer, relay,
//! issuer services, pepper service, code retrieval) has an in-memory
//! implementation here that:
//! - Returns deterministic values
//! - Can be scripted to fail in specific ways
//! - Records what was asked of it for assertions
//! - Never touches the filesystem or network
//!
//! The chain double is a small simulation: requests, issuer selection,
//! completions and wallet deployments all act on the same state, so the relay
//! and issuer doubles built on top of it stay consistent with each other.

pub mod chain;
pub mod clock;
pub mod issuer;
pub mod pepper;
pub mod relay;
pub mod retriever;
pub mod signer;

pub use chain::{NullChain, SentCall};
pub use clock::NullClock;
pub use issuer::{NullIssuer, RevealOutcome};
pub use pepper::NullPepperService;
pub use relay::{DeployMode, NullRelay};
pub use retriever::NullCodeRetriever;
pub use signer::{decode_meta_transaction, NullMetaSigner, NullSigner};
