//! `IdentifierResolver`: phone number to on-chain identifier.

use crate::cache::PepperCache;
use crate::error::IdentityError;
use crate::source::PepperSource;
use avk_crypto::{blind, identifier_for, pepper_from_evaluation, unblind};
use avk_types::{E164Number, Identifier, Pepper};
use std::sync::Arc;
use tracing::{debug, info};

/// The resolved identity of a phone number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneIdentity {
    pub identifier: Identifier,
    pub pepper: Pepper,
}

#[derive(Clone)]
pub struct IdentifierResolver {
    cache: Arc<dyn PepperCache>,
    client_version: String,
}

impl IdentifierResolver {
    pub fn new(cache: Arc<dyn PepperCache>, client_version: impl Into<String>) -> Self {
        Self {
            cache,
            client_version: client_version.into(),
        }
    }

    pub fn has_cached_pepper(&self, phone: &E164Number) -> bool {
        matches!(self.cache.get(phone), Ok(Some(_)))
    }

    /// Resolve from the local cache only.
    ///
    /// Fails with [`IdentityError::PepperNotCached`] when no pepper is stored;
    /// never touches the network.
    pub fn resolve_cached(&self, phone: &E164Number) -> Result<PhoneIdentity, IdentityError> {
        let pepper = self.cache.get(phone)?.ok_or(IdentityError::PepperNotCached)?;
        Ok(PhoneIdentity {
            identifier: identifier_for(phone, &pepper),
            pepper,
        })
    }

    /// Resolve, fetching the pepper from `source` on a cache miss.
    ///
    /// The phone number is blinded before it leaves this process. A fetched
    /// pepper is persisted before the identity is returned.
    pub async fn resolve(
        &self,
        phone: &E164Number,
        source: &mut dyn PepperSource,
    ) -> Result<PhoneIdentity, IdentityError> {
        match self.resolve_cached(phone) {
            Ok(identity) => {
                debug!("pepper found in cache");
                return Ok(identity);
            }
            Err(IdentityError::PepperNotCached) => {}
            Err(e) => return Err(e),
        }

        let (blinded, factor) = blind(phone.as_str().as_bytes())?;
        let evaluation = source
            .blinded_evaluation(&blinded, &self.client_version)
            .await?;
        let unblinded = unblind(&factor, &evaluation)?;
        let pepper = pepper_from_evaluation(&unblinded)?;

        self.cache.set(phone, &pepper)?;
        info!("pepper fetched and cached");
        Ok(PhoneIdentity {
            identifier: identifier_for(phone, &pepper),
            pepper,
        })
    }
}
