//! Meta-transaction wallet validation.

use crate::directory::AttestationDirectory;
use crate::error::{ChainError, WalletValidationError};
use crate::traits::ChainReader;
use avk_types::{Address, Identifier};
use futures_util::future::join_all;
use tracing::debug;

/// Check that `wallet` runs an allowed implementation and is controlled by `signer`.
pub async fn verify_wallet(
    chain: &dyn ChainReader,
    wallet: &Address,
    allowed_implementations: &[Address],
    signer: &Address,
) -> Result<(), WalletValidationError> {
    let implementation = chain.wallet_implementation(wallet).await?;
    if !allowed_implementations.contains(&implementation) {
        return Err(WalletValidationError::InvalidImplementation {
            wallet: wallet.clone(),
            implementation,
        });
    }
    let actual = chain.wallet_signer(wallet).await?;
    if &actual != signer {
        return Err(WalletValidationError::InvalidSigner {
            wallet: wallet.clone(),
            actual,
            expected: signer.clone(),
        });
    }
    Ok(())
}

/// Accounts associated with `identifier` that are valid wallets of `signer`
/// and verified on chain.
///
/// Candidates are checked independently; any that fail validation are
/// skipped rather than treated as errors. Callers decide what more than one
/// result means.
pub async fn verified_wallets(
    directory: &AttestationDirectory,
    identifier: &Identifier,
    allowed_implementations: &[Address],
    signer: &Address,
) -> Result<Vec<Address>, ChainError> {
    let candidates = directory.lookup_accounts_for_identifier(identifier).await?;
    let chain = directory.chain().as_ref();

    let checks = join_all(candidates.iter().map(|candidate| async move {
        if let Err(e) = verify_wallet(chain, candidate, allowed_implementations, signer).await {
            debug!(%candidate, error = %e, "candidate wallet rejected");
            return Ok(None);
        }
        let status = directory.get_attestations_status(candidate, identifier).await?;
        Ok::<_, ChainError>(status.is_verified.then(|| candidate.clone()))
    }))
    .await;

    let mut verified = Vec::new();
    for check in checks {
        if let Some(wallet) = check? {
            verified.push(wallet);
        }
    }
    Ok(verified)
}
