//! Attestation directory and wallet validation against the in-memory chain.

use avk_chain::{
    verified_wallets, verify_wallet, AttestationDirectory, ChainError, WalletValidationError,
};
use avk_nullables::NullChain;
use avk_types::{Address, AttestationStat, Identifier, VerificationParams};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn identifier() -> Identifier {
    Identifier::new([7u8; 32])
}

fn account(n: u64) -> Address {
    Address::new(format!("0x{n:040x}"))
}

fn directory(chain: &Arc<NullChain>) -> AttestationDirectory {
    AttestationDirectory::new(chain.clone(), &VerificationParams::fast())
}

// ---------------------------------------------------------------------------
// 1. Status and the revoked-account correction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn associated_account_with_enough_completions_is_verified() {
    let chain = Arc::new(NullChain::new());
    chain.mark_verified(identifier(), &account(1), 3);

    let status = directory(&chain)
        .get_attestations_status(&account(1), &identifier())
        .await
        .unwrap();
    assert!(status.is_verified);
    assert_eq!(status.remaining(), 0);
}

#[tokio::test]
async fn revoked_account_is_reported_unverified() {
    let chain = Arc::new(NullChain::new());
    chain.mark_verified(identifier(), &account(1), 3);
    chain.dissociate(identifier(), &account(1));

    let status = directory(&chain)
        .get_attestations_status(&account(1), &identifier())
        .await
        .unwrap();
    assert!(!status.is_verified);
    assert_eq!(status.num_attestations_remaining, 1);
}

#[tokio::test]
async fn below_threshold_needs_one_more() {
    let chain = Arc::new(NullChain::new());
    chain.set_stat(
        identifier(),
        &account(1),
        AttestationStat {
            completed: 3,
            total: 20,
        },
    );
    chain.associate(identifier(), &account(1));

    let status = directory(&chain)
        .get_attestations_status(&account(1), &identifier())
        .await
        .unwrap();
    assert!(!status.is_verified);
    assert_eq!(status.remaining(), 1);
}

#[tokio::test]
async fn fresh_account_needs_all_attestations() {
    let chain = Arc::new(NullChain::new());
    let status = directory(&chain)
        .get_attestations_status(&account(1), &identifier())
        .await
        .unwrap();
    assert!(!status.is_verified);
    assert_eq!(status.remaining(), 3);
}

// ---------------------------------------------------------------------------
// 2. Bounded read retries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn actionable_reads_survive_transient_failures() {
    let chain = Arc::new(NullChain::with_issuers(3));
    chain.add_actionable(identifier(), &account(1), 2);
    chain.fail_reads(2);

    let list = directory(&chain)
        .get_actionable_attestations(&identifier(), &account(1))
        .await
        .unwrap();
    assert_eq!(list.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn actionable_reads_give_up_after_attempts() {
    let chain = Arc::new(NullChain::with_issuers(3));
    chain.fail_reads(3);

    let err = directory(&chain)
        .get_actionable_attestations(&identifier(), &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Rpc(_)));
}

// ---------------------------------------------------------------------------
// 3. Unselected requests and the selection window
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn waits_until_selection_window_passes() {
    let chain = Arc::new(NullChain::new());
    let block = chain.block();
    chain.set_unselected_request(identifier(), &account(1), block, 3);
    chain.set_select_wait_blocks(5);

    directory(&chain)
        .wait_for_selecting_issuers(&identifier(), &account(1))
        .await
        .unwrap();
    assert!(chain.block() >= block + 5);
}

#[tokio::test]
async fn waiting_without_a_request_fails() {
    let chain = Arc::new(NullChain::new());
    let err = directory(&chain)
        .wait_for_selecting_issuers(&identifier(), &account(1))
        .await
        .unwrap_err();
    assert_eq!(err, ChainError::NoUnselectedRequest);
}

#[tokio::test(start_paused = true)]
async fn stalled_chain_times_out() {
    let chain = Arc::new(NullChain::new());
    let block = chain.block();
    chain.set_unselected_request(identifier(), &account(1), block, 3);
    chain.set_blocks_per_read(0);

    let err = directory(&chain)
        .wait_for_selecting_issuers(&identifier(), &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::Timeout(_)));
}

#[tokio::test]
async fn expired_unselected_request_is_not_reused() {
    let chain = Arc::new(NullChain::new());
    chain.set_expiry_blocks(10);
    chain.set_unselected_request(identifier(), &account(1), 50, 3);
    let dir = directory(&chain);

    assert_eq!(
        dir.reusable_unselected_request(&identifier(), &account(1))
            .await
            .unwrap(),
        None
    );

    let block = chain.block();
    chain.set_unselected_request(identifier(), &account(1), block, 2);
    let reused = dir
        .reusable_unselected_request(&identifier(), &account(1))
        .await
        .unwrap()
        .expect("fresh request is reusable");
    assert_eq!(reused.attestations_requested, 2);
}

// ---------------------------------------------------------------------------
// 4. Wallet validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wallet_with_unknown_implementation_is_rejected() {
    let chain = NullChain::new();
    let allowed = vec![account(0xaaa)];
    chain.register_wallet(&account(10), &account(0xbad), &account(1));

    let err = verify_wallet(&chain, &account(10), &allowed, &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletValidationError::InvalidImplementation { .. }));
}

#[tokio::test]
async fn wallet_of_another_signer_is_rejected() {
    let chain = NullChain::new();
    let allowed = vec![account(0xaaa)];
    chain.register_wallet(&account(10), &account(0xaaa), &account(2));

    let err = verify_wallet(&chain, &account(10), &allowed, &account(1))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletValidationError::InvalidSigner { .. }));
}

#[tokio::test]
async fn verified_wallets_skip_invalid_candidates() {
    let chain = Arc::new(NullChain::new());
    let allowed = vec![account(0xaaa)];
    let signer = account(1);

    // Valid, verified wallet.
    chain.register_wallet(&account(10), &account(0xaaa), &signer);
    chain.mark_verified(identifier(), &account(10), 3);
    // Verified, but another signer's wallet.
    chain.register_wallet(&account(11), &account(0xaaa), &account(2));
    chain.mark_verified(identifier(), &account(11), 3);
    // Valid wallet, not enough completions.
    chain.register_wallet(&account(12), &account(0xaaa), &signer);
    chain.set_stat(
        identifier(),
        &account(12),
        AttestationStat {
            completed: 1,
            total: 1,
        },
    );
    chain.associate(identifier(), &account(12));

    let found = verified_wallets(&directory(&chain), &identifier(), &allowed, &signer)
        .await
        .unwrap();
    assert_eq!(found, vec![account(10)]);
}
