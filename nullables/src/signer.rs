//! Nullable signers for the account key and meta-transaction wallets.

use async_trait::async_trait;
use avk_chain::{AccountSigner, ChainError, ContractCall, MetaTransactionSigner, RawTransaction};
use avk_crypto::sha256;
use avk_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Account signer with a fixed address. Signatures are a hash of the message.
pub struct NullSigner {
    address: Address,
    fail: AtomicBool,
    signatures: AtomicU32,
}

impl NullSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            fail: AtomicBool::new(false),
            signatures: AtomicU32::new(0),
        }
    }

    /// Make every subsequent signature request fail.
    pub fn fail_signing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn signatures(&self) -> u32 {
        self.signatures.load(Ordering::SeqCst)
    }
}

impl Default for NullSigner {
    fn default() -> Self {
        Self::new(Address::new("0x00000000000000000000000000000000000a11ce"))
    }
}

#[async_trait]
impl AccountSigner for NullSigner {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn data_encryption_key(&self) -> String {
        format!("0x02{}", hex::encode(sha256(self.address.as_str().as_bytes())))
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, ChainError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::Signing("signer locked".into()));
        }
        self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{}", hex::encode(sha256(message))))
    }
}

#[derive(Serialize, Deserialize)]
struct EncodedMetaTransaction {
    call: ContractCall,
    nonce_offset: u32,
}

/// Encodes the call as JSON in `data` instead of ABI-encoding it, so
/// [`NullRelay`](crate::NullRelay) can decode and apply it.
#[derive(Default)]
pub struct NullMetaSigner;

#[async_trait]
impl MetaTransactionSigner for NullMetaSigner {
    async fn sign_meta_transaction(
        &self,
        wallet: &Address,
        call: &ContractCall,
        nonce_offset: u32,
    ) -> Result<RawTransaction, ChainError> {
        let data = serde_json::to_string(&EncodedMetaTransaction {
            call: call.clone(),
            nonce_offset,
        })
        .map_err(|e| ChainError::Signing(e.to_string()))?;
        Ok(RawTransaction {
            destination: wallet.clone(),
            data,
        })
    }
}

/// Recover the call a [`NullMetaSigner`] wrapped.
pub fn decode_meta_transaction(raw: &RawTransaction) -> Option<ContractCall> {
    serde_json::from_str::<EncodedMetaTransaction>(&raw.data)
        .ok()
        .map(|m| m.call)
}
