//! Where blinded pepper evaluations come from.

use crate::error::IdentityError;
use async_trait::async_trait;
use avk_crypto::BlindedMessage;
use avk_relay::RelaySessionClient;

/// A service that evaluates a blinded phone number under its OPRF key.
///
/// Returns the base64 evaluation; unblinding happens on the caller's side.
#[async_trait]
pub trait PepperSource: Send {
    async fn blinded_evaluation(
        &mut self,
        blinded: &BlindedMessage,
        client_version: &str,
    ) -> Result<String, IdentityError>;
}

/// Fetches the evaluation through an active relay session.
pub struct RelayPepperSource<'a> {
    client: &'a mut RelaySessionClient,
}

impl<'a> RelayPepperSource<'a> {
    pub fn new(client: &'a mut RelaySessionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PepperSource for RelayPepperSource<'_> {
    async fn blinded_evaluation(
        &mut self,
        blinded: &BlindedMessage,
        client_version: &str,
    ) -> Result<String, IdentityError> {
        let evaluation = self
            .client
            .get_distributed_blinded_pepper(&blinded.to_base64(), client_version)
            .await?;
        Ok(evaluation)
    }
}
