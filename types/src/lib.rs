//! Fundamental types for phone-number attestation.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! account addresses, phone numbers, peppers and identifiers, attestation records,
//! verification statuses, timestamps, and protocol parameters.

pub mod address;
pub mod attestation;
pub mod error;
pub mod hash;
pub mod params;
pub mod phone;
pub mod status;
pub mod time;

pub use address::Address;
pub use attestation::{
    ActionableAttestation, AttestationCode, AttestationStat, CodeInputType, UnselectedRequest,
};
pub use error::TypesError;
pub use hash::{Identifier, TxHash};
pub use params::VerificationParams;
pub use phone::{E164Number, Pepper};
pub use status::{AttestationsStatus, VerificationStatus};
pub use time::{Clock, SystemClock, Timestamp};
