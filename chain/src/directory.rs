//! Attestation directory: the read model over on-chain attestation state.

use crate::error::ChainError;
use crate::traits::ChainReader;
use avk_types::{
    ActionableAttestation, Address, AttestationsStatus, Identifier, UnselectedRequest,
    VerificationParams,
};
use avk_utils::{retry, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Delay between bounded-retry attempts of a directory read.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the issuer-selection window.
const SELECT_ISSUERS_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether a request made at `request_block` has expired at `current_block`.
pub fn is_attestation_expired(current_block: u64, request_block: u64, expiry_blocks: u64) -> bool {
    current_block >= request_block.saturating_add(expiry_blocks)
}

/// Queries attestation status and actionable requests for an identifier.
pub struct AttestationDirectory {
    chain: Arc<dyn ChainReader>,
    required: u32,
    threshold: f64,
    read_policy: RetryPolicy,
    poll_interval: Duration,
}

impl AttestationDirectory {
    pub fn new(chain: Arc<dyn ChainReader>, params: &VerificationParams) -> Self {
        Self {
            chain,
            required: params.num_attestations_required,
            threshold: params.attestation_threshold,
            read_policy: RetryPolicy::fixed(params.directory_read_attempts, READ_RETRY_DELAY),
            poll_interval: params.block_poll_interval(),
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    /// Actionable attestations, retried a bounded number of times on RPC failure.
    pub async fn get_actionable_attestations(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<Vec<ActionableAttestation>, ChainError> {
        retry(
            &self.read_policy,
            "actionable_attestations",
            || self.chain.actionable_attestations(identifier, account),
            ChainError::is_transient,
        )
        .await
    }

    /// Attestation status with the revoked-account correction applied.
    ///
    /// The raw counters can say "verified" for an account that has since been
    /// dissociated from the identifier. Such an account is reported as
    /// unverified with at least one attestation remaining.
    pub async fn get_attestations_status(
        &self,
        account: &Address,
        identifier: &Identifier,
    ) -> Result<AttestationsStatus, ChainError> {
        let stat = self.chain.attestation_stat(identifier, account).await?;
        let mut status = AttestationsStatus::from_stat(stat, self.required, self.threshold);

        if status.is_verified {
            let accounts = self.lookup_accounts_for_identifier(identifier).await?;
            if !accounts.contains(account) {
                warn!(%account, "counters report verified but account is not associated; treating as revoked");
                status.is_verified = false;
            }
        }
        if !status.is_verified && status.num_attestations_remaining <= 0 {
            status.num_attestations_remaining = 1;
        }
        Ok(status)
    }

    pub async fn lookup_accounts_for_identifier(
        &self,
        identifier: &Identifier,
    ) -> Result<Vec<Address>, ChainError> {
        self.chain.lookup_accounts_for_identifier(identifier).await
    }

    pub async fn get_unselected_request(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<UnselectedRequest, ChainError> {
        self.chain.unselected_request(identifier, account).await
    }

    /// Whether a request made at `block_number` is past the expiry window now.
    pub async fn is_attestation_expired(&self, block_number: u64) -> Result<bool, ChainError> {
        let expiry = self.chain.attestation_expiry_blocks().await?;
        let current = self.chain.block_number().await?;
        Ok(is_attestation_expired(current, block_number, expiry))
    }

    /// The pending unselected request if it can still be selected.
    pub async fn reusable_unselected_request(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<Option<UnselectedRequest>, ChainError> {
        let request = self.get_unselected_request(identifier, account).await?;
        if !request.is_pending() {
            return Ok(None);
        }
        if self.is_attestation_expired(request.block_number).await? {
            debug!(block = request.block_number, "unselected request expired");
            return Ok(None);
        }
        Ok(Some(request))
    }

    /// Block until the selection window of the pending request has passed.
    ///
    /// Polls the block number rather than sleeping a fixed time, so slow or
    /// fast block production is handled.
    pub async fn wait_for_selecting_issuers(
        &self,
        identifier: &Identifier,
        account: &Address,
    ) -> Result<(), ChainError> {
        let request = self.get_unselected_request(identifier, account).await?;
        if !request.is_pending() {
            return Err(ChainError::NoUnselectedRequest);
        }
        let wait_blocks = self.chain.select_issuers_wait_blocks().await?;
        let target = request.block_number.saturating_add(wait_blocks);
        let deadline = Instant::now() + SELECT_ISSUERS_WAIT_TIMEOUT;

        loop {
            let current = self.chain.block_number().await?;
            if current >= target {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ChainError::Timeout(format!(
                    "issuer selection window (block {current} < {target})"
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Block until the chain has produced a block after the current one.
    pub async fn wait_for_next_block(&self) -> Result<(), ChainError> {
        let start = self.chain.block_number().await?;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if self.chain.block_number().await? > start {
                return Ok(());
            }
        }
    }
}
