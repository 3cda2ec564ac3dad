//! Nullable relay backed by a [`NullChain`].

use crate::chain::NullChain;
use crate::pepper::NullPepperService;
use crate::signer::decode_meta_transaction;
use async_trait::async_trait;
use avk_chain::RawTransaction;
use avk_relay::{
    BlindedPepperRequest, BlindedPepperResponse, CheckSessionResponse, DeployWalletResponse,
    FetchError, RelayApi, RequestAttestationsRequest, SessionQuota, StartSessionRequest,
    StartSessionResponse,
};
use avk_types::{Address, TxHash};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// How `deployWallet` behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployMode {
    /// Respond with the deployed address straight away.
    Immediate,
    /// Respond with a deployment transaction to be reconciled on chain.
    InProgress,
    /// Deploy, but report an error to the client.
    FailAfterDeploy,
    /// Fail without deploying.
    Fail,
}

struct RelayState {
    up: bool,
    reject_login: bool,
    tokens: Vec<String>,
    owner: Option<Address>,
    quota: SessionQuota,
    wallet: Option<Address>,
    deploy_mode: DeployMode,
    wallets_deployed: u32,
    calls: HashMap<&'static str, u32>,
    failures: HashMap<&'static str, VecDeque<FetchError>>,
}

/// In-memory relay that submits meta-transactions to a [`NullChain`].
pub struct NullRelay {
    chain: Arc<NullChain>,
    pepper: NullPepperService,
    deployer: Address,
    state: Mutex<RelayState>,
}

impl NullRelay {
    pub fn new(chain: Arc<NullChain>, pepper: NullPepperService) -> Self {
        Self {
            chain,
            pepper,
            deployer: Address::new("0x00000000000000000000000000000000de91050e"),
            state: Mutex::new(RelayState {
                up: true,
                reject_login: false,
                tokens: Vec::new(),
                owner: None,
                quota: SessionQuota {
                    distributed_blinded_pepper: 1,
                    request_subsidised_attestation: 10,
                    submit_meta_transaction: 20,
                },
                wallet: None,
                deploy_mode: DeployMode::Immediate,
                wallets_deployed: 0,
                calls: HashMap::new(),
                failures: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_up(&self, up: bool) {
        self.lock().up = up;
    }

    pub fn reject_login(&self) {
        self.lock().reject_login = true;
    }

    pub fn set_quota(&self, quota: SessionQuota) {
        self.lock().quota = quota;
    }

    pub fn quota(&self) -> SessionQuota {
        self.lock().quota
    }

    pub fn set_deploy_mode(&self, mode: DeployMode) {
        self.lock().deploy_mode = mode;
    }

    /// A wallet the relay already knows about for this account.
    pub fn set_wallet(&self, wallet: Option<Address>) {
        self.lock().wallet = wallet;
    }

    /// Invalidate every issued token.
    pub fn expire_sessions(&self) {
        self.lock().tokens.clear();
    }

    /// Queue `error` as the response to the next call of `action`.
    pub fn fail_next(&self, action: &'static str, error: FetchError) {
        self.lock()
            .failures
            .entry(action)
            .or_default()
            .push_back(error);
    }

    /// Calls made to `action`, including failed ones.
    pub fn calls(&self, action: &str) -> u32 {
        self.lock().calls.get(action).copied().unwrap_or(0)
    }

    pub fn wallets_deployed(&self) -> u32 {
        self.lock().wallets_deployed
    }

    fn hit(&self, action: &'static str) -> Result<(), FetchError> {
        let mut state = self.lock();
        *state.calls.entry(action).or_default() += 1;
        if let Some(e) = state.failures.get_mut(action).and_then(VecDeque::pop_front) {
            return Err(e);
        }
        Ok(())
    }

    fn authorise(&self, action: &'static str, token: &str) -> Result<(), FetchError> {
        self.hit(action)?;
        if self.lock().tokens.iter().any(|t| t == token) {
            Ok(())
        } else {
            Err(FetchError::Unauthorised)
        }
    }

    fn relay(&self, raw: &RawTransaction, tag: &str) -> Result<TxHash, FetchError> {
        let call = decode_meta_transaction(raw)
            .ok_or_else(|| FetchError::Request {
                status: 400,
                message: "undecodable meta-transaction".into(),
            })?;
        let (tx_hash, _) = self.chain.submit(&raw.destination, call, tag);
        Ok(tx_hash)
    }

    fn deploy(&self, owner: &Address, implementation: &Address) -> (Address, TxHash) {
        let n = {
            let mut state = self.lock();
            state.wallets_deployed += 1;
            state.wallets_deployed
        };
        let wallet = Address::new(format!("0x{:040x}", 0x3a11_e700 + u64::from(n)));
        let tx_hash = self.chain.record_deployment(owner, &wallet, implementation);
        self.lock().wallet = Some(wallet.clone());
        (wallet, tx_hash)
    }
}

#[async_trait]
impl RelayApi for NullRelay {
    async fn check_service(&self) -> Result<(), FetchError> {
        self.hit("ready")?;
        if self.lock().up {
            Ok(())
        } else {
            Err(FetchError::ServiceUnavailable)
        }
    }

    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, FetchError> {
        self.hit("startSession")?;
        let mut state = self.lock();
        if state.reject_login || request.captcha_response_token.is_empty() {
            return Err(FetchError::Unauthorised);
        }
        let token = format!("session-{}", state.tokens.len() + 1);
        state.tokens.push(token.clone());
        state.owner = Some(request.external_account.clone());
        Ok(StartSessionResponse {
            token,
            callback_url: None,
        })
    }

    async fn check_session(&self, token: &str) -> Result<CheckSessionResponse, FetchError> {
        self.authorise("checkSession", token)?;
        let state = self.lock();
        Ok(CheckSessionResponse {
            quota: state.quota,
            meta_tx_wallet_address: state.wallet.clone(),
        })
    }

    async fn distributed_blinded_pepper(
        &self,
        token: &str,
        request: &BlindedPepperRequest,
    ) -> Result<BlindedPepperResponse, FetchError> {
        self.authorise("distributedBlindedPepper", token)?;
        {
            let mut state = self.lock();
            if state.quota.distributed_blinded_pepper == 0 {
                return Err(FetchError::QuotaExceeded);
            }
            state.quota.distributed_blinded_pepper -= 1;
        }
        let combined_signature = self.pepper.evaluate_b64(&request.blinded_phone_number)?;
        Ok(BlindedPepperResponse { combined_signature })
    }

    async fn deploy_wallet(
        &self,
        token: &str,
        implementation: &Address,
    ) -> Result<DeployWalletResponse, FetchError> {
        self.authorise("deployWallet", token)?;
        let (mode, owner, existing) = {
            let state = self.lock();
            (state.deploy_mode, state.owner.clone(), state.wallet.clone())
        };
        if existing.is_some() {
            return Err(FetchError::Request {
                status: 400,
                message: "wallet already deployed".into(),
            });
        }
        let owner = owner.ok_or(FetchError::Unauthorised)?;
        match mode {
            DeployMode::Immediate => {
                let (wallet_address, _) = self.deploy(&owner, implementation);
                Ok(DeployWalletResponse::Deployed { wallet_address })
            }
            DeployMode::InProgress => {
                let (_, tx_hash) = self.deploy(&owner, implementation);
                Ok(DeployWalletResponse::InProgress {
                    tx_hash,
                    deployer_address: self.deployer.clone(),
                })
            }
            DeployMode::FailAfterDeploy => {
                self.deploy(&owner, implementation);
                Err(FetchError::ServiceUnavailable)
            }
            DeployMode::Fail => Err(FetchError::ServiceUnavailable),
        }
    }

    async fn request_subsidised_attestations(
        &self,
        token: &str,
        request: &RequestAttestationsRequest,
    ) -> Result<TxHash, FetchError> {
        self.authorise("requestSubsidisedAttestations", token)?;
        {
            let mut state = self.lock();
            if state.quota.request_subsidised_attestation == 0 {
                return Err(FetchError::QuotaExceeded);
            }
            state.quota.request_subsidised_attestation -= 1;
        }
        if let Some(approve) = &request.approve {
            self.relay(approve, "relayed approve")?;
        }
        self.relay(&request.request, "relayed request")
    }

    async fn submit_meta_transaction(
        &self,
        token: &str,
        tx: &RawTransaction,
    ) -> Result<TxHash, FetchError> {
        self.authorise("submitMetaTransaction", token)?;
        {
            let mut state = self.lock();
            if state.quota.submit_meta_transaction == 0 {
                return Err(FetchError::QuotaExceeded);
            }
            state.quota.submit_meta_transaction -= 1;
        }
        self.relay(tx, "relayed meta-transaction")
    }
}
