//! Collaborator traits implemented by the host's chain client.

use crate::call::{ContractCall, TxContext, TxReceipt};
use crate::error::ChainError;
use async_trait::async_trait;
use avk_types::{
    ActionableAttestation, Address, AttestationStat, Identifier, TxHash, UnselectedRequest,
};
use serde::{Deserialize, Serialize};

/// Read-only contract and node queries.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Raw completed/total counters for `account` under `identifier`.
    async fn attestation_stat(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<AttestationStat, ChainError>;

    /// Incomplete attestations assigned to issuers that run an attestation service.
    async fn actionable_attestations(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<Vec<ActionableAttestation>, ChainError>;

    /// Accounts currently associated with `identifier`.
    async fn lookup_accounts_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Vec<Address>, ChainError>;

    async fn unselected_request(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<UnselectedRequest, ChainError>;

    /// Blocks after which an unselected request expires.
    async fn attestation_expiry_blocks(&self) -> Result<u64, ChainError>;

    /// Blocks that must pass between a request and issuer selection.
    async fn select_issuers_wait_blocks(&self) -> Result<u64, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;

    /// The issuer among `issuers` whose attestation signer produced `code`, if any.
    async fn find_matching_issuer(
        &self,
        identifier: &Identifier,
        account: &Address,
        code: &str,
        issuers: &[Address],
    ) -> Result<Option<Address>, ChainError>;

    async fn validate_attestation_code(
        &self,
        identifier: &Identifier,
        account: &Address,
        issuer: &Address,
        code: &str,
    ) -> Result<bool, ChainError>;

    /// Implementation contract behind a meta-transaction wallet proxy.
    async fn wallet_implementation(&self, wallet: &Address) -> Result<Address, ChainError>;

    /// Key that controls a meta-transaction wallet.
    async fn wallet_signer(&self, wallet: &Address) -> Result<Address, ChainError>;

    /// Wallet emitted by a `WalletDeployed` event for `owner` in `block_number`.
    async fn deployed_wallet(
        &self,
        deployer: &Address,
        owner: &Address,
        block_number: u64,
    ) -> Result<Option<Address>, ChainError>;

    /// Wallet address registered for `account`; `None` when unset.
    async fn account_wallet_address(&self, account: &Address)
        -> Result<Option<Address>, ChainError>;

    /// Data encryption key registered for `account`; `None` when unset.
    async fn account_data_encryption_key(
        &self,
        account: &Address,
    ) -> Result<Option<String>, ChainError>;

    /// Token attestation fees are paid in.
    async fn attestation_fee_token(&self) -> Result<Address, ChainError>;

    /// Fee for a single attestation request, in fee-token base units.
    async fn attestation_request_fee(&self, fee_token: &Address) -> Result<u128, ChainError>;

    async fn token_balance(&self, token: &Address, account: &Address) -> Result<u128, ChainError>;

    /// Receipt of a mined transaction; `None` while pending.
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainError>;
}

/// Signs and submits transactions for an account, then awaits the receipt.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn send(
        &self,
        call: ContractCall,
        from: &Address,
        context: TxContext,
    ) -> Result<TxReceipt, ChainError>;
}

/// A meta-transaction ready for a relay to submit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub destination: Address,
    /// ABI-encoded `executeMetaTransaction` call data, `0x`-prefixed hex.
    pub data: String,
}

/// Wraps contract calls in meta-transactions signed for a wallet.
#[async_trait]
pub trait MetaTransactionSigner: Send + Sync {
    /// Sign `call` for execution by `wallet`. `nonce_offset` is added to the
    /// wallet's current nonce so batched calls can be signed up front.
    async fn sign_meta_transaction(
        &self,
        wallet: &Address,
        call: &ContractCall,
        nonce_offset: u32,
    ) -> Result<RawTransaction, ChainError>;
}

/// The connected, unlocked account key.
#[async_trait]
pub trait AccountSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Compressed public key used as the account's data encryption key.
    fn data_encryption_key(&self) -> String;

    /// Personal-message signature over `message`, `0x`-prefixed hex.
    async fn sign_message(&self, message: &[u8]) -> Result<String, ChainError>;
}
