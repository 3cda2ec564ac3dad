//! Attestation backends: the state-changing calls of a run, sent either
//! directly from the account or relayed through its meta-transaction wallet.

use crate::error::VerificationError;
use async_trait::async_trait;
use avk_chain::{ChainError, ChainReader, ContractCall, TransactionSender, TxContext};
use avk_relay::RelaySessionClient;
use avk_types::{Address, Identifier};
use std::sync::Arc;
use tracing::{debug, info};

/// The write side of a verification run.
///
/// `account` is the address attestations are made for: the signer itself on
/// the direct path, the meta-transaction wallet on the relayed one.
#[async_trait]
pub trait AttestationBackend: Send {
    fn account(&self) -> &Address;

    /// Pay for `count` new attestations. `include_approval` also approves the
    /// fee spend first.
    async fn request_attestations(
        &mut self,
        identifier: &Identifier,
        count: u32,
        include_approval: bool,
    ) -> Result<(), VerificationError>;

    async fn select_issuers(&mut self, identifier: &Identifier) -> Result<(), VerificationError>;

    async fn complete(
        &mut self,
        identifier: &Identifier,
        issuer: &Address,
        code: &str,
    ) -> Result<(), VerificationError>;

    /// Register the wallet address and data encryption key for `account`.
    async fn set_account(
        &mut self,
        wallet: &Address,
        data_encryption_key: &str,
    ) -> Result<(), VerificationError>;
}

/// Sends transactions from the account through the host's chain client.
pub struct DirectBackend {
    chain: Arc<dyn ChainReader>,
    sender: Arc<dyn TransactionSender>,
    account: Address,
}

impl DirectBackend {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        sender: Arc<dyn TransactionSender>,
        account: Address,
    ) -> Self {
        Self {
            chain,
            sender,
            account,
        }
    }

    async fn send(&self, call: ContractCall, tag: &str) -> Result<(), VerificationError> {
        let receipt = self
            .sender
            .send(call, &self.account, TxContext::tagged(tag))
            .await?;
        debug!(tag, tx = %receipt.tx_hash, block = receipt.block_number, "transaction confirmed");
        Ok(())
    }
}

#[async_trait]
impl AttestationBackend for DirectBackend {
    fn account(&self) -> &Address {
        &self.account
    }

    async fn request_attestations(
        &mut self,
        identifier: &Identifier,
        count: u32,
        include_approval: bool,
    ) -> Result<(), VerificationError> {
        let fee_token = self.chain.attestation_fee_token().await?;
        let fee = self.chain.attestation_request_fee(&fee_token).await?;
        let required = fee.saturating_mul(u128::from(count));
        let available = self.chain.token_balance(&fee_token, &self.account).await?;
        if available < required {
            info!(required, available, "fee balance too low to request attestations");
            return Err(ChainError::InsufficientBalance {
                required,
                available,
            }
            .into());
        }

        if include_approval {
            self.send(
                ContractCall::ApproveAttestationFee {
                    fee_token: fee_token.clone(),
                    amount: required,
                },
                "approve attestation fee",
            )
            .await?;
        }
        self.send(
            ContractCall::RequestAttestations {
                identifier: *identifier,
                count,
                fee_token,
            },
            "request attestations",
        )
        .await
    }

    async fn select_issuers(&mut self, identifier: &Identifier) -> Result<(), VerificationError> {
        self.send(
            ContractCall::SelectIssuers {
                identifier: *identifier,
            },
            "select issuers",
        )
        .await
    }

    async fn complete(
        &mut self,
        identifier: &Identifier,
        issuer: &Address,
        code: &str,
    ) -> Result<(), VerificationError> {
        self.send(
            ContractCall::Complete {
                identifier: *identifier,
                issuer: issuer.clone(),
                code: code.to_string(),
            },
            "complete attestation",
        )
        .await
    }

    async fn set_account(
        &mut self,
        wallet: &Address,
        data_encryption_key: &str,
    ) -> Result<(), VerificationError> {
        self.send(
            ContractCall::SetAccount {
                wallet: wallet.clone(),
                data_encryption_key: data_encryption_key.to_string(),
            },
            "register account",
        )
        .await
    }
}

/// Relays every call through the session's meta-transaction wallet.
pub struct RelayedBackend<'a> {
    client: &'a mut RelaySessionClient,
    wallet: Address,
}

impl<'a> RelayedBackend<'a> {
    pub fn new(client: &'a mut RelaySessionClient, wallet: Address) -> Self {
        Self { client, wallet }
    }
}

#[async_trait]
impl AttestationBackend for RelayedBackend<'_> {
    fn account(&self) -> &Address {
        &self.wallet
    }

    async fn request_attestations(
        &mut self,
        identifier: &Identifier,
        count: u32,
        include_approval: bool,
    ) -> Result<(), VerificationError> {
        let receipt = self
            .client
            .request_attestations(identifier, &self.wallet, count, include_approval)
            .await?;
        debug!(tx = %receipt.tx_hash, count, "relayed attestation request confirmed");
        Ok(())
    }

    async fn select_issuers(&mut self, identifier: &Identifier) -> Result<(), VerificationError> {
        self.client.select_issuers(identifier, &self.wallet).await?;
        Ok(())
    }

    async fn complete(
        &mut self,
        identifier: &Identifier,
        issuer: &Address,
        code: &str,
    ) -> Result<(), VerificationError> {
        self.client
            .complete_attestation(identifier, &self.wallet, issuer, code)
            .await?;
        Ok(())
    }

    async fn set_account(
        &mut self,
        wallet: &Address,
        data_encryption_key: &str,
    ) -> Result<(), VerificationError> {
        let call = ContractCall::SetAccount {
            wallet: wallet.clone(),
            data_encryption_key: data_encryption_key.to_string(),
        };
        self.client.submit_meta_transaction(&self.wallet, call).await?;
        Ok(())
    }
}
