//! Identifier resolution for phone numbers.
//!
//! A phone number is never put on chain. Instead its identifier is
//! `blake2b("tel://" ‖ number ‖ "__" ‖ pepper)`, where the pepper is obtained
//! once through a blinded OPRF exchange (so the pepper service never sees the
//! number) and cached locally from then on.

pub mod cache;
pub mod error;
pub mod odis;
pub mod resolver;
pub mod source;

pub use cache::{FilePepperCache, MemoryPepperCache, PepperCache};
pub use error::IdentityError;
pub use odis::{OdisPepperSource, BLINDED_SALT_PATH};
pub use resolver::{IdentifierResolver, PhoneIdentity};
pub use source::{PepperSource, RelayPepperSource};
