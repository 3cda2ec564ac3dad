//! Phone-number attestation verification.
//!
//! A run takes one phone number through four stages:
//! 1. **Prepping**: bring up a relay session (or use the account directly),
//!    resolve the phone number's on-chain identifier and settle the wallet.
//! 2. **Requesting**: pay for attestations and select issuers until enough
//!    are assigned.
//! 3. **Revealing**: ask each issuer to send its code to the phone.
//! 4. **Completing**: submit each code as it arrives, then register the
//!    account.
//!
//! The [`VerificationOrchestrator`] drives a run; hosts steer it through a
//! [`VerificationControl`] and feed it messages through a [`CodeSink`].

pub mod backend;
pub mod code;
pub mod config;
pub mod error;
pub mod events;
pub mod intake;
pub mod orchestrator;
pub mod retriever;
pub mod signals;
pub mod snapshot;

pub use backend::{AttestationBackend, DirectBackend, RelayedBackend};
pub use code::{extract_attestation_code, extract_security_code};
pub use config::VerificationConfig;
pub use error::{CodeIntakeError, VerificationError};
pub use events::{EventLog, VerificationEvent};
pub use intake::{listen, CodeBook, CodeIntake, IntakeContext};
pub use orchestrator::{Collaborators, VerificationOrchestrator};
pub use retriever::{CodeRetriever, CodeSink, InboundMessage};
pub use signals::{ControlSignal, VerificationControl};
pub use snapshot::{VerificationSnapshot, SNAPSHOT_VERSION};
