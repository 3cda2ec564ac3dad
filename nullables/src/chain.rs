//! Nullable chain: an in-memory model of the attestation contracts.

use async_trait::async_trait;
use avk_chain::{ChainError, ChainReader, ContractCall, TransactionSender, TxContext, TxReceipt};
use avk_crypto::{blake2b_256_multi, security_code_prefix};
use avk_types::{
    ActionableAttestation, Address, AttestationStat, Identifier, TxHash, UnselectedRequest,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A call that reached the chain, successfully or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentCall {
    pub from: Address,
    pub call: ContractCall,
    pub tag: String,
    pub reverted: bool,
}

struct Issuer {
    address: Address,
    url: String,
}

type Pair = (Identifier, Address);

struct ChainState {
    block: u64,
    blocks_per_read: u64,
    expiry_blocks: u64,
    select_wait_blocks: u64,
    issuers: Vec<Issuer>,
    stats: HashMap<Pair, AttestationStat>,
    actionable: HashMap<Pair, Vec<ActionableAttestation>>,
    unselected: HashMap<Pair, UnselectedRequest>,
    associated: HashMap<Identifier, Vec<Address>>,
    wallet_implementations: HashMap<Address, Address>,
    wallet_signers: HashMap<Address, Address>,
    deployments: HashMap<(Address, u64), Address>,
    account_wallets: HashMap<Address, Address>,
    account_deks: HashMap<Address, String>,
    fee_token: Address,
    fee: u128,
    balances: HashMap<Address, u128>,
    receipts: HashMap<TxHash, TxReceipt>,
    receipt_delay: u32,
    sent: Vec<SentCall>,
    reverts: HashMap<&'static str, u32>,
    read_failures: u32,
    tx_counter: u64,
}

/// In-memory chain implementing [`ChainReader`] and [`TransactionSender`].
///
/// The block number advances by one on every `block_number` read, so waits
/// on block boundaries terminate without any external driver.
pub struct NullChain {
    state: Mutex<ChainState>,
}

impl Default for NullChain {
    fn default() -> Self {
        Self::new()
    }
}

impl NullChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                block: 100,
                blocks_per_read: 1,
                expiry_blocks: 1_000,
                select_wait_blocks: 3,
                issuers: Vec::new(),
                stats: HashMap::new(),
                actionable: HashMap::new(),
                unselected: HashMap::new(),
                associated: HashMap::new(),
                wallet_implementations: HashMap::new(),
                wallet_signers: HashMap::new(),
                deployments: HashMap::new(),
                account_wallets: HashMap::new(),
                account_deks: HashMap::new(),
                fee_token: Address::new("0x000000000000000000000000000000000000fee0"),
                fee: 1_000,
                balances: HashMap::new(),
                receipts: HashMap::new(),
                receipt_delay: 0,
                sent: Vec::new(),
                reverts: HashMap::new(),
                read_failures: 0,
                tx_counter: 0,
            }),
        }
    }

    /// A chain with `count` registered issuers.
    pub fn with_issuers(count: usize) -> Self {
        let chain = Self::new();
        for i in 1..=count {
            chain.add_issuer(
                Address::new(format!("0x{:040x}", 0x1550_0000 + i)),
                format!("https://issuer-{i}.test"),
            );
        }
        chain
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_issuer(&self, address: Address, url: impl Into<String>) {
        self.lock().issuers.push(Issuer {
            address,
            url: url.into(),
        });
    }

    pub fn issuers(&self) -> Vec<Address> {
        self.lock().issuers.iter().map(|i| i.address.clone()).collect()
    }

    pub fn block(&self) -> u64 {
        self.lock().block
    }

    pub fn set_block(&self, block: u64) {
        self.lock().block = block;
    }

    /// Blocks to advance per `block_number` read. Zero freezes the chain.
    pub fn set_blocks_per_read(&self, blocks: u64) {
        self.lock().blocks_per_read = blocks;
    }

    pub fn set_select_wait_blocks(&self, blocks: u64) {
        self.lock().select_wait_blocks = blocks;
    }

    pub fn set_expiry_blocks(&self, blocks: u64) {
        self.lock().expiry_blocks = blocks;
    }

    pub fn set_stat(&self, identifier: Identifier, account: &Address, stat: AttestationStat) {
        self.lock().stats.insert((identifier, account.clone()), stat);
    }

    pub fn stat(&self, identifier: Identifier, account: &Address) -> AttestationStat {
        self.lock()
            .stats
            .get(&(identifier, account.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn associate(&self, identifier: Identifier, account: &Address) {
        let mut state = self.lock();
        let accounts = state.associated.entry(identifier).or_default();
        if !accounts.contains(account) {
            accounts.push(account.clone());
        }
    }

    pub fn dissociate(&self, identifier: Identifier, account: &Address) {
        if let Some(accounts) = self.lock().associated.get_mut(&identifier) {
            accounts.retain(|a| a != account);
        }
    }

    /// Make `account` fully verified for `identifier`.
    pub fn mark_verified(&self, identifier: Identifier, account: &Address, completed: u32) {
        self.set_stat(
            identifier,
            account,
            AttestationStat {
                completed,
                total: completed,
            },
        );
        self.associate(identifier, account);
    }

    /// Put an unselected request on chain as if it was paid for at `block`.
    pub fn set_unselected_request(
        &self,
        identifier: Identifier,
        account: &Address,
        block: u64,
        count: u32,
    ) {
        let mut state = self.lock();
        let fee_token = state.fee_token.clone();
        state.unselected.insert(
            (identifier, account.clone()),
            UnselectedRequest {
                block_number: block,
                attestations_requested: count,
                fee_token: Some(fee_token),
            },
        );
    }

    /// Assign issuers to `account` directly, bypassing request and selection.
    pub fn add_actionable(&self, identifier: Identifier, account: &Address, count: usize) {
        let mut state = self.lock();
        let block = state.block;
        select_issuers(&mut state, identifier, account, count as u32, block);
    }

    pub fn actionable_count(&self, identifier: Identifier, account: &Address) -> usize {
        self.lock()
            .actionable
            .get(&(identifier, account.clone()))
            .map_or(0, Vec::len)
    }

    pub fn register_wallet(&self, wallet: &Address, implementation: &Address, signer: &Address) {
        let mut state = self.lock();
        state
            .wallet_implementations
            .insert(wallet.clone(), implementation.clone());
        state.wallet_signers.insert(wallet.clone(), signer.clone());
    }

    /// Record a `WalletDeployed` event for `owner` in a new transaction.
    pub fn record_deployment(
        &self,
        owner: &Address,
        wallet: &Address,
        implementation: &Address,
    ) -> TxHash {
        self.register_wallet(wallet, implementation, owner);
        let mut state = self.lock();
        let block = state.block;
        state.deployments.insert((owner.clone(), block), wallet.clone());
        mint_receipt(&mut state, true)
    }

    pub fn set_account_registration(&self, account: &Address, wallet: &Address, dek: &str) {
        let mut state = self.lock();
        state.account_wallets.insert(account.clone(), wallet.clone());
        state.account_deks.insert(account.clone(), dek.to_string());
    }

    pub fn account_wallet(&self, account: &Address) -> Option<Address> {
        self.lock().account_wallets.get(account).cloned()
    }

    pub fn fee_token(&self) -> Address {
        self.lock().fee_token.clone()
    }

    pub fn set_fee(&self, fee: u128) {
        self.lock().fee = fee;
    }

    pub fn set_balance(&self, account: &Address, amount: u128) {
        self.lock().balances.insert(account.clone(), amount);
    }

    /// Revert the next `times` calls of `method` (see [`ContractCall::method`]).
    pub fn revert_next(&self, method: &'static str, times: u32) {
        self.lock().reverts.insert(method, times);
    }

    /// Fail the next `times` actionable-attestation reads with an RPC error.
    pub fn fail_reads(&self, times: u32) {
        self.lock().read_failures = times;
    }

    /// Report `None` for the next `reads` receipt lookups.
    pub fn delay_receipts(&self, reads: u32) {
        self.lock().receipt_delay = reads;
    }

    pub fn sent_calls(&self) -> Vec<SentCall> {
        self.lock().sent.clone()
    }

    /// Successful calls of `method`.
    pub fn count_sent(&self, method: &str) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|s| s.call.method() == method && !s.reverted)
            .count()
    }

    /// Full attestation code an issuer signs for this pair, `0x`-prefixed hex.
    pub fn attestation_code(
        &self,
        identifier: Identifier,
        account: &Address,
        issuer: &Address,
    ) -> String {
        hex_code(&identifier, account, issuer)
    }

    /// The SMS an issuer sends for the full code.
    pub fn code_message(
        &self,
        identifier: Identifier,
        account: &Address,
        issuer: &Address,
    ) -> String {
        let b64 = STANDARD.encode(code_bytes(&identifier, account, issuer));
        format!("Your verification code is {b64}")
    }

    /// Deep link carrying the full code.
    pub fn code_deep_link(
        &self,
        identifier: Identifier,
        account: &Address,
        issuer: &Address,
    ) -> String {
        let b64 = STANDARD.encode(code_bytes(&identifier, account, issuer));
        format!("avk://wallet/v/{b64}")
    }

    /// Short security code: issuer prefix followed by seven digits.
    pub fn security_code(
        &self,
        identifier: Identifier,
        account: &Address,
        issuer: &Address,
    ) -> String {
        let h = blake2b_256_multi(&[
            b"short",
            identifier.as_bytes(),
            account.as_str().as_bytes(),
            issuer.as_str().as_bytes(),
        ]);
        let mut n = [0u8; 8];
        n.copy_from_slice(&h[..8]);
        let digits = u64::from_be_bytes(n) % 10_000_000;
        format!("{}{digits:07}", security_code_prefix(issuer))
    }

    /// Apply a call as `from`; shared by direct sends and relayed submissions.
    ///
    /// A receipt is stored either way; a reverted call yields its reason.
    pub fn submit(
        &self,
        from: &Address,
        call: ContractCall,
        tag: &str,
    ) -> (TxHash, Result<TxReceipt, String>) {
        let mut state = self.lock();
        let outcome = apply(&mut state, from, &call);
        state.sent.push(SentCall {
            from: from.clone(),
            call,
            tag: tag.to_string(),
            reverted: outcome.is_err(),
        });
        let tx_hash = mint_receipt(&mut state, outcome.is_ok());
        let block_number = state.block;
        let result = outcome.map(|()| TxReceipt {
            tx_hash,
            block_number,
            success: true,
        });
        (tx_hash, result)
    }
}

fn code_bytes(identifier: &Identifier, account: &Address, issuer: &Address) -> Vec<u8> {
    let parts: [&[u8]; 3] = [
        identifier.as_bytes(),
        account.as_str().as_bytes(),
        issuer.as_str().as_bytes(),
    ];
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&blake2b_256_multi(&[b"r", parts[0], parts[1], parts[2]]));
    out.extend_from_slice(&blake2b_256_multi(&[b"s", parts[0], parts[1], parts[2]]));
    out.push(0x1b);
    out
}

fn mint_receipt(state: &mut ChainState, success: bool) -> TxHash {
    state.tx_counter += 1;
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&state.tx_counter.to_be_bytes());
    let tx_hash = TxHash::new(bytes);
    let receipt = TxReceipt {
        tx_hash,
        block_number: state.block,
        success,
    };
    state.receipts.insert(tx_hash, receipt);
    tx_hash
}

fn select_issuers(
    state: &mut ChainState,
    identifier: Identifier,
    account: &Address,
    count: u32,
    request_block: u64,
) {
    let key = (identifier, account.clone());
    let taken: Vec<Address> = state
        .actionable
        .get(&key)
        .map(|list| list.iter().map(|a| a.issuer.clone()).collect())
        .unwrap_or_default();
    let chosen: Vec<ActionableAttestation> = state
        .issuers
        .iter()
        .filter(|i| !taken.contains(&i.address))
        .take(count as usize)
        .map(|i| ActionableAttestation {
            issuer: i.address.clone(),
            attestation_service_url: i.url.clone(),
            version: "1.1.0".into(),
            block_number: request_block,
        })
        .collect();
    let added = chosen.len() as u32;
    state.actionable.entry(key.clone()).or_default().extend(chosen);
    state.stats.entry(key).or_default().total += added;
}

fn apply(state: &mut ChainState, from: &Address, call: &ContractCall) -> Result<(), String> {
    if let Some(remaining) = state.reverts.get_mut(call.method()) {
        if *remaining > 0 {
            *remaining -= 1;
            return Err(format!("{} reverted: nonce too low", call.method()));
        }
    }

    match call {
        ContractCall::ApproveAttestationFee { .. } => Ok(()),
        ContractCall::RequestAttestations {
            identifier, count, ..
        } => {
            let key = (*identifier, from.clone());
            if let Some(existing) = state.unselected.get(&key) {
                if existing.is_pending()
                    && state.block < existing.block_number + state.expiry_blocks
                {
                    return Err("pending unselected request exists".into());
                }
            }
            let fee = state.fee.saturating_mul(u128::from(*count));
            if let Some(balance) = state.balances.get_mut(from) {
                if *balance < fee {
                    return Err("insufficient fee balance".into());
                }
                *balance -= fee;
            }
            let fee_token = state.fee_token.clone();
            state.unselected.insert(
                key,
                UnselectedRequest {
                    block_number: state.block,
                    attestations_requested: *count,
                    fee_token: Some(fee_token),
                },
            );
            Ok(())
        }
        ContractCall::SelectIssuers { identifier } => {
            let key = (*identifier, from.clone());
            let request = state
                .unselected
                .get(&key)
                .filter(|r| r.is_pending())
                .cloned()
                .ok_or_else(|| "no unselected attestation request".to_string())?;
            if state.block < request.block_number + state.select_wait_blocks {
                return Err("issuer selection window has not passed".into());
            }
            state.unselected.remove(&key);
            select_issuers(
                state,
                *identifier,
                from,
                request.attestations_requested,
                request.block_number,
            );
            Ok(())
        }
        ContractCall::Complete {
            identifier,
            issuer,
            code,
        } => {
            let key = (*identifier, from.clone());
            if hex_code(identifier, from, issuer) != *code {
                return Err("invalid attestation code".into());
            }
            let list = state.actionable.entry(key.clone()).or_default();
            let before = list.len();
            list.retain(|a| &a.issuer != issuer);
            if list.len() == before {
                return Err("no incomplete attestation for issuer".into());
            }
            state.stats.entry(key).or_default().completed += 1;
            let accounts = state.associated.entry(*identifier).or_default();
            if !accounts.contains(from) {
                accounts.push(from.clone());
            }
            Ok(())
        }
        ContractCall::SetAccount {
            wallet,
            data_encryption_key,
        } => {
            state.account_wallets.insert(from.clone(), wallet.clone());
            state
                .account_deks
                .insert(from.clone(), data_encryption_key.clone());
            Ok(())
        }
    }
}

fn hex_code(identifier: &Identifier, account: &Address, issuer: &Address) -> String {
    format!("0x{}", hex::encode(code_bytes(identifier, account, issuer)))
}

#[async_trait]
impl ChainReader for NullChain {
    async fn attestation_stat(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<AttestationStat, ChainError> {
        Ok(self.stat(*identifier, account))
    }

    async fn actionable_attestations(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<Vec<ActionableAttestation>, ChainError> {
        let mut state = self.lock();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(ChainError::Rpc("connection reset".into()));
        }
        Ok(state
            .actionable
            .get(&(*identifier, account.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn lookup_accounts_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Vec<Address>, ChainError> {
        Ok(self
            .lock()
            .associated
            .get(identifier)
            .cloned()
            .unwrap_or_default())
    }

    async fn unselected_request(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<UnselectedRequest, ChainError> {
        Ok(self
            .lock()
            .unselected
            .get(&(*identifier, account.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn attestation_expiry_blocks(&self) -> Result<u64, ChainError> {
        Ok(self.lock().expiry_blocks)
    }

    async fn select_issuers_wait_blocks(&self) -> Result<u64, ChainError> {
        Ok(self.lock().select_wait_blocks)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let mut state = self.lock();
        let current = state.block;
        state.block += state.blocks_per_read;
        Ok(current)
    }

    async fn find_matching_issuer(
        &self,
        identifier: &Identifier,
        account: &Address,
        code: &str,
        issuers: &[Address],
    ) -> Result<Option<Address>, ChainError> {
        Ok(issuers
            .iter()
            .find(|issuer| hex_code(identifier, account, issuer) == code)
            .cloned())
    }

    async fn validate_attestation_code(
        &self,
        identifier: &Identifier,
        account: &Address,
        issuer: &Address,
        code: &str,
    ) -> Result<bool, ChainError> {
        if hex_code(identifier, account, issuer) != code {
            return Ok(false);
        }
        Ok(self
            .lock()
            .actionable
            .get(&(*identifier, account.clone()))
            .is_some_and(|list| list.iter().any(|a| &a.issuer == issuer)))
    }

    async fn wallet_implementation(&self, wallet: &Address) -> Result<Address, ChainError> {
        Ok(self
            .lock()
            .wallet_implementations
            .get(wallet)
            .cloned()
            .unwrap_or_else(Address::zero))
    }

    async fn wallet_signer(&self, wallet: &Address) -> Result<Address, ChainError> {
        Ok(self
            .lock()
            .wallet_signers
            .get(wallet)
            .cloned()
            .unwrap_or_else(Address::zero))
    }

    async fn deployed_wallet(
        &self,
        _deployer: &Address,
        owner: &Address,
        block_number: u64,
    ) -> Result<Option<Address>, ChainError> {
        Ok(self
            .lock()
            .deployments
            .get(&(owner.clone(), block_number))
            .cloned())
    }

    async fn account_wallet_address(
        &self,
        account: &Address,
    ) -> Result<Option<Address>, ChainError> {
        Ok(self.account_wallet(account))
    }

    async fn account_data_encryption_key(
        &self,
        account: &Address,
    ) -> Result<Option<String>, ChainError> {
        Ok(self.lock().account_deks.get(account).cloned())
    }

    async fn attestation_fee_token(&self) -> Result<Address, ChainError> {
        Ok(self.fee_token())
    }

    async fn attestation_request_fee(&self, _fee_token: &Address) -> Result<u128, ChainError> {
        Ok(self.lock().fee)
    }

    async fn token_balance(&self, _token: &Address, account: &Address) -> Result<u128, ChainError> {
        Ok(self.lock().balances.get(account).copied().unwrap_or(0))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let mut state = self.lock();
        if state.receipt_delay > 0 {
            state.receipt_delay -= 1;
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }
}

#[async_trait]
impl TransactionSender for NullChain {
    async fn send(
        &self,
        call: ContractCall,
        from: &Address,
        context: TxContext,
    ) -> Result<TxReceipt, ChainError> {
        let (_, outcome) = self.submit(from, call, &context.tag);
        outcome.map_err(ChainError::Reverted)
    }
}
