//! In-process fakes for handler and processor tests
//!
//! `FakeLedger` is one shared book of balances, nonces and transaction statuses across
//! every network. Submitted payloads take effect immediately according to what the test
//! programmed for them; funding transactions are JSON documents produced by `FakeSigner`.
//! A transaction's hash is a function of its network and bytes, like a real chain's, so
//! broadcasting the same bytes twice includes them once.

use crate::chain::{ChainClient, ChainManager, TxStatus};
use crate::config::{ConfirmationConfig, OrchestratorConfig};
use crate::error::{RampError, RampResult};
use crate::phases::{PhaseDeps, PhaseProcessor, PhaseRegistry};
use crate::ramp::{
    AccountAsset, AssetId, BalanceExpectation, FiatCurrency, MoonbeamReceiverCall, Network,
    RampDirection, RampMetadata, RampPhase, RampState, RampUpdate, RouteClass, StellarTarget,
    TxData, UnsignedTx,
};
use crate::state::{MemoryRampStore, RampStore};
use crate::tx::{FundingSigner, NonceManager, SignedTx};

use async_trait::async_trait;
use ethers::types::Bytes;
use ethers::utils::keccak256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER: &str = "0x00000000000000000000000000000000000000aa";
pub const EPH_PENDULUM: &str = "5Eph";
pub const EPH_STELLAR: &str = "GEPH";
pub const EPH_EVM: &str = "0x00000000000000000000000000000000000000bb";
pub const USER_ASSETHUB: &str = "15UserAssetHub";
pub const BRLA_PAYOUT: &str = "0x00000000000000000000000000000000000000cc";
pub const RECEIVER: &str = "0x2AB52086e8edaB28193172209407FF9df1103CDc";

pub fn usdc_pendulum() -> AssetId {
    AssetId::OrmlToken {
        currency: serde_json::json!({ "XCM": 12 }),
    }
}

pub fn eurc_pendulum() -> AssetId {
    AssetId::OrmlToken {
        currency: serde_json::json!({ "Stellar": { "AlphaNum4": { "code": "EURC" } } }),
    }
}

pub fn brla_moonbeam() -> AssetId {
    AssetId::Erc20 {
        address: "0xfeB25F3fDDad13F82C4d6dbc1481516F62236429".into(),
    }
}

pub fn brla_pendulum() -> AssetId {
    AssetId::OrmlToken {
        currency: serde_json::json!({ "XCM": 13 }),
    }
}

pub fn usdc_assethub() -> AssetId {
    AssetId::SubstrateAsset { id: 1337 }
}

pub fn eurc_stellar() -> AssetId {
    AssetId::StellarCredit {
        code: "EURC".into(),
        issuer: "GANCHOR".into(),
    }
}

/// Programmed consequence of a submitted payload
#[derive(Debug, Clone, Default)]
pub struct Effect {
    /// Account whose nonce the transaction consumes
    pub signer: Option<(Network, String)>,
    pub credits: Vec<(Network, String, AssetId, Decimal)>,
}

impl Effect {
    pub fn signed_by(network: Network, signer: &str) -> Self {
        Self {
            signer: Some((network, signer.to_string())),
            credits: Vec::new(),
        }
    }

    pub fn credit(self, network: Network, account: &str, asset: AssetId, amount: i64) -> Self {
        self.credit_raw(network, account, asset, Decimal::from(amount))
    }

    fn credit_raw(
        mut self,
        network: Network,
        account: &str,
        asset: AssetId,
        amount: Decimal,
    ) -> Self {
        self.credits.push((network, account.to_string(), asset, amount));
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum FundingPayload {
    Transfer {
        from: String,
        to: String,
        asset: AssetId,
        amount: Decimal,
        nonce: u64,
    },
    Call {
        from: String,
        contract: String,
        nonce: u64,
    },
}

/// Hash the fake chains include `payload` under
pub fn fake_tx_hash(network: Network, payload: &str) -> String {
    format!("0x{}", hex::encode(keccak256(format!("{}:{}", network, payload))))
}

#[derive(Default)]
struct Book {
    balances: HashMap<(Network, String, String), Decimal>,
    nonces: HashMap<(Network, String), u64>,
    statuses: HashMap<String, TxStatus>,
    submissions: Vec<(Network, String)>,
    effects: HashMap<String, Effect>,
    failing: HashSet<String>,
    /// Payload fragments whose next submission lands but never answers
    lost_acks: Vec<String>,
}

impl Book {
    fn credit(&mut self, network: Network, account: &str, asset: &AssetId, amount: Decimal) {
        *self
            .balances
            .entry((network, account.to_string(), asset.to_string()))
            .or_default() += amount;
    }

    fn bump_nonce(&mut self, network: Network, account: &str) {
        *self.nonces.entry((network, account.to_string())).or_default() += 1;
    }

    fn spend_nonce(&mut self, effect: &Effect) {
        if let Some((network, ref signer)) = effect.signer {
            self.bump_nonce(network, signer);
        }
    }

    fn apply(&mut self, effect: &Effect) {
        for (network, account, asset, amount) in &effect.credits {
            self.credit(*network, account, asset, *amount);
        }
    }
}

#[derive(Default)]
pub struct FakeLedger {
    book: Mutex<Book>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap()
    }

    pub fn set_balance(&self, network: Network, account: &str, asset: &AssetId, amount: Decimal) {
        self.book()
            .balances
            .insert((network, account.to_string(), asset.to_string()), amount);
    }

    pub fn balance_of(&self, network: Network, account: &str, asset: &AssetId) -> Decimal {
        self.book()
            .balances
            .get(&(network, account.to_string(), asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_nonce(&self, network: Network, account: &str, nonce: u64) {
        self.book().nonces.insert((network, account.to_string()), nonce);
    }

    pub fn nonce(&self, network: Network, account: &str) -> u64 {
        self.book()
            .nonces
            .get(&(network, account.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Program what happens when `key` (a payload, or a contract for funding calls) lands
    pub fn on_submit(&self, key: &str, effect: Effect) {
        self.book().effects.insert(key.to_string(), effect);
    }

    /// Make `payload` revert when submitted; the revert still spends the signer's nonce
    pub fn fail_payload(&self, payload: &str) {
        self.book().failing.insert(payload.to_string());
    }

    /// The next submission containing `fragment` is applied but its answer is lost
    pub fn lose_ack(&self, fragment: &str) {
        self.book().lost_acks.push(fragment.to_string());
    }

    fn take_lost_ack(&self, payload: &str) -> bool {
        let mut book = self.book();
        match book.lost_acks.iter().position(|f| payload.contains(f.as_str())) {
            Some(i) => {
                book.lost_acks.remove(i);
                true
            }
            None => false,
        }
    }

    /// Submit as a chain node would: include immediately and apply the effect
    pub fn broadcast(&self, network: Network, payload: &str) -> String {
        let mut book = self.book();
        book.submissions.push((network, payload.to_string()));
        let hash = fake_tx_hash(network, payload);
        if book.statuses.contains_key(&hash) {
            return hash;
        }
        let block = book.submissions.len() as u64;

        let effect = match serde_json::from_str::<FundingPayload>(payload) {
            Ok(FundingPayload::Transfer {
                from,
                to,
                asset,
                amount,
                ..
            }) => Effect::signed_by(network, &from).credit_raw(network, &to, asset, amount),
            Ok(FundingPayload::Call { from, contract, .. }) => {
                let mut effect = book.effects.get(&contract).cloned().unwrap_or_default();
                effect.signer = Some((network, from));
                effect
            }
            Err(_) => book.effects.get(payload).cloned().unwrap_or_default(),
        };

        book.spend_nonce(&effect);
        let status = if book.failing.contains(payload) {
            TxStatus::Failed {
                reason: "execution reverted".into(),
            }
        } else {
            book.apply(&effect);
            TxStatus::Confirmed { block }
        };
        book.statuses.insert(hash.clone(), status);
        hash
    }

    pub fn status_of(&self, hash: &str) -> Option<TxStatus> {
        self.book().statuses.get(hash).cloned()
    }

    pub fn submissions(&self) -> Vec<(Network, String)> {
        self.book().submissions.clone()
    }

    pub fn submissions_of(&self, payload: &str) -> usize {
        self.book()
            .submissions
            .iter()
            .filter(|(_, p)| p == payload)
            .count()
    }

    /// Funding-account calls sent to `contract`
    pub fn calls_to(&self, contract: &str) -> usize {
        self.book()
            .submissions
            .iter()
            .filter(|(_, p)| {
                matches!(
                    serde_json::from_str::<FundingPayload>(p),
                    Ok(FundingPayload::Call { contract: ref c, .. }) if c == contract
                )
            })
            .count()
    }

    pub fn client(self: &Arc<Self>, network: Network) -> Arc<dyn ChainClient> {
        Arc::new(FakeChain {
            network,
            ledger: self.clone(),
        })
    }

    /// A chain manager with a client for every network
    pub fn chains(self: &Arc<Self>) -> Arc<ChainManager> {
        let manager = ChainManager::new();
        for network in Network::ALL {
            manager.register(self.client(network));
        }
        Arc::new(manager)
    }
}

struct FakeChain {
    network: Network,
    ledger: Arc<FakeLedger>,
}

#[async_trait]
impl ChainClient for FakeChain {
    fn network(&self) -> Network {
        self.network
    }

    async fn submit(&self, encoded_tx: &str) -> RampResult<String> {
        let hash = self.ledger.broadcast(self.network, encoded_tx);
        if self.ledger.take_lost_ack(encoded_tx) {
            return Err(RampError::Internal("connection reset by peer".into()));
        }
        Ok(hash)
    }

    fn tx_hash(&self, encoded_tx: &str) -> Option<String> {
        self.network
            .is_evm()
            .then(|| fake_tx_hash(self.network, encoded_tx))
    }

    async fn tx_status(&self, hash: &str) -> RampResult<TxStatus> {
        Ok(self
            .ledger
            .book()
            .statuses
            .get(hash)
            .cloned()
            .unwrap_or(TxStatus::NotFound))
    }

    async fn balance(&self, account: &str, asset: &AssetId) -> RampResult<Decimal> {
        Ok(self.ledger.balance_of(self.network, account, asset))
    }

    async fn next_nonce(&self, account: &str) -> RampResult<u64> {
        Ok(self.ledger.nonce(self.network, account))
    }

    async fn latest_block(&self) -> RampResult<u64> {
        Ok(self.ledger.book().submissions.len() as u64)
    }
}

/// Funding signer producing `FundingPayload` documents
pub struct FakeSigner;

#[async_trait]
impl FundingSigner for FakeSigner {
    fn address(&self, network: Network) -> RampResult<String> {
        Ok(format!("funding-{}", network))
    }

    async fn sign_transfer(
        &self,
        network: Network,
        to: &str,
        asset: &AssetId,
        amount_raw: Decimal,
        nonce: u64,
    ) -> RampResult<SignedTx> {
        let encoded = serde_json::to_string(&FundingPayload::Transfer {
            from: self.address(network)?,
            to: to.to_string(),
            asset: asset.clone(),
            amount: amount_raw,
            nonce,
        })?;
        Ok(SignedTx {
            hash: fake_tx_hash(network, &encoded),
            encoded,
        })
    }

    async fn sign_contract_call(
        &self,
        network: Network,
        contract: &str,
        _calldata: Bytes,
        nonce: u64,
    ) -> RampResult<SignedTx> {
        let encoded = serde_json::to_string(&FundingPayload::Call {
            from: self.address(network)?,
            contract: contract.to_string(),
            nonce,
        })?;
        Ok(SignedTx {
            hash: fake_tx_hash(network, &encoded),
            encoded,
        })
    }
}

pub fn test_confirmation() -> ConfirmationConfig {
    ConfirmationConfig {
        poll_interval_ms: 1,
        timeout_secs: 1,
        bridge_timeout_secs: 1,
    }
}

pub fn test_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        instance_id: "test-instance".into(),
        max_phase_iterations: 32,
        lock_ttl_secs: 1200,
        recovery_interval_secs: 1,
        stale_after_secs: 0,
        recovery_batch_size: 10,
        submit_retries: 2,
        retry_delay_ms: 1,
        health_check_interval_secs: 30,
    }
}

pub fn test_deps(ledger: &Arc<FakeLedger>) -> PhaseDeps {
    PhaseDeps {
        store: Arc::new(MemoryRampStore::new()),
        chains: ledger.chains(),
        funding: Arc::new(FakeSigner),
        nonces: Arc::new(NonceManager::new()),
        confirmation: test_confirmation(),
        submit_retries: 2,
        retry_delay: Duration::from_millis(1),
    }
}

impl PhaseDeps {
    pub fn with_store(mut self, store: Arc<MemoryRampStore>) -> Self {
        self.store = store;
        self
    }
}

/// Processor with every standard handler, wired to `ledger` and `store`
pub fn test_processor(ledger: &Arc<FakeLedger>, store: Arc<MemoryRampStore>) -> PhaseProcessor {
    let deps = test_deps(ledger).with_store(store.clone());
    let registry = PhaseRegistry::standard(deps).unwrap();
    PhaseProcessor::new(store, Arc::new(registry), &test_orchestrator_config())
}

fn tx(network: Network, phase: RampPhase, nonce: u64, signer: &str, payload: &str) -> UnsignedTx {
    UnsignedTx {
        network,
        phase,
        nonce,
        signer: signer.to_string(),
        tx_data: TxData::Encoded(payload.to_string()),
        meta: serde_json::Value::Null,
    }
}

fn expect(network: Network, account: &str, asset: AssetId, amount: i64) -> BalanceExpectation {
    BalanceExpectation {
        holding: AccountAsset {
            network,
            account: account.to_string(),
            asset,
        },
        amount_raw: Decimal::from(amount),
    }
}

/// Polygon to Stellar EURC offramp, as the transaction builders would hand it over
pub fn offramp_state() -> RampState {
    use RampPhase::*;

    let route = RouteClass::new(RampDirection::Offramp, Network::Polygon, FiatCurrency::Eurc)
        .unwrap();
    let unsigned = vec![
        tx(Network::Polygon, SquidRouterApprove, 0, USER, "0xapprove"),
        tx(Network::Polygon, SquidRouterSwap, 1, USER, "0xswap"),
        tx(Network::Pendulum, DistributeFees, 0, EPH_PENDULUM, "0xfees"),
        tx(Network::Pendulum, NablaApprove, 1, EPH_PENDULUM, "0xnablaapprove"),
        tx(Network::Pendulum, NablaSwap, 2, EPH_PENDULUM, "0xnablaswap"),
        tx(Network::Pendulum, SpacewalkRedeem, 3, EPH_PENDULUM, "0xredeem"),
        tx(Network::Stellar, StellarPayment, 100, EPH_STELLAR, "AAAApayment"),
        tx(Network::Stellar, StellarCleanup, 101, EPH_STELLAR, "AAAAcleanup"),
    ];

    let mut metadata = RampMetadata {
        substrate_ephemeral_address: Some(EPH_PENDULUM.into()),
        stellar_ephemeral_account_id: Some(EPH_STELLAR.into()),
        stellar_target: Some(StellarTarget {
            account_id: "GANCHORDEST".into(),
            asset_code: "EURC".into(),
            asset_issuer: "GANCHOR".into(),
        }),
        moonbeam_receiver_call: Some(MoonbeamReceiverCall {
            receiver_contract: RECEIVER.into(),
            receiver_id: format!("0x{}", "11".repeat(32)),
            payload: "0x0102".into(),
        }),
        ..Default::default()
    };
    metadata.expected_arrivals.insert(
        MoonbeamToPendulum,
        expect(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    metadata.expected_arrivals.insert(
        SpacewalkRedeem,
        expect(Network::Stellar, EPH_STELLAR, eurc_stellar(), 900),
    );
    metadata.subsidy_targets.insert(
        SubsidizePreSwap,
        expect(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    metadata.subsidy_targets.insert(
        SubsidizePostSwap,
        expect(Network::Pendulum, EPH_PENDULUM, eurc_pendulum(), 950),
    );
    metadata.ephemeral_funding = vec![
        expect(Network::Pendulum, EPH_PENDULUM, AssetId::Native, 100),
        expect(Network::Stellar, EPH_STELLAR, AssetId::Native, 25),
    ];
    metadata.cleanup_holdings.insert(
        StellarCleanup,
        vec![AccountAsset {
            network: Network::Stellar,
            account: EPH_STELLAR.into(),
            asset: eurc_stellar(),
        }],
    );

    RampState::new("quote-offramp", route, unsigned, metadata)
}

/// Program the ledger for `offramp_state` and store a fresh ramp
pub async fn offramp_fixture(ledger: &Arc<FakeLedger>) -> (Arc<MemoryRampStore>, RampState) {
    ledger.set_nonce(Network::Stellar, EPH_STELLAR, 100);

    ledger.on_submit("0xapprove", Effect::signed_by(Network::Polygon, USER));
    ledger.on_submit("0xswap", Effect::signed_by(Network::Polygon, USER));
    ledger.on_submit(
        RECEIVER,
        Effect::default().credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    ledger.on_submit("0xfees", Effect::signed_by(Network::Pendulum, EPH_PENDULUM));
    ledger.on_submit("0xnablaapprove", Effect::signed_by(Network::Pendulum, EPH_PENDULUM));
    ledger.on_submit(
        "0xnablaswap",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), -1000)
            .credit(Network::Pendulum, EPH_PENDULUM, eurc_pendulum(), 940),
    );
    ledger.on_submit(
        "0xredeem",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, eurc_pendulum(), -950)
            .credit(Network::Stellar, EPH_STELLAR, eurc_stellar(), 905),
    );
    ledger.on_submit(
        "AAAApayment",
        Effect::signed_by(Network::Stellar, EPH_STELLAR)
            .credit(Network::Stellar, EPH_STELLAR, eurc_stellar(), -900),
    );
    ledger.on_submit(
        "AAAAcleanup",
        Effect::signed_by(Network::Stellar, EPH_STELLAR)
            .credit(Network::Stellar, EPH_STELLAR, eurc_stellar(), -5),
    );

    let store = Arc::new(MemoryRampStore::new());
    let state = offramp_state();
    store.create(&state).await.unwrap();
    (store, state)
}

/// Store the client's signatures (the fixture's payloads are already encoded)
pub async fn start(store: &Arc<MemoryRampStore>, state: &RampState) -> RampState {
    store
        .update(state.id, RampUpdate::presigned(state.unsigned_txs.clone()))
        .await
        .unwrap()
}

/// Polygon to BRL offramp: the EURC route up to the swap, then out through Moonbeam
pub fn brl_offramp_state() -> RampState {
    use RampPhase::*;

    let route =
        RouteClass::new(RampDirection::Offramp, Network::Polygon, FiatCurrency::Brl).unwrap();
    let unsigned = vec![
        tx(Network::Polygon, SquidRouterApprove, 0, USER, "0xapprove"),
        tx(Network::Polygon, SquidRouterSwap, 1, USER, "0xswap"),
        tx(Network::Pendulum, DistributeFees, 0, EPH_PENDULUM, "0xfees"),
        tx(Network::Pendulum, NablaApprove, 1, EPH_PENDULUM, "0xnablaapprove"),
        tx(Network::Pendulum, NablaSwap, 2, EPH_PENDULUM, "0xnablaswapbrl"),
        tx(Network::Pendulum, PendulumToMoonbeamXcm, 3, EPH_PENDULUM, "0xtomoonbeam"),
        tx(Network::Moonbeam, BrlaPayoutOnMoonbeam, 0, EPH_EVM, "0xbrlapayout"),
        tx(Network::Pendulum, PendulumCleanup, 4, EPH_PENDULUM, "0xpendulumcleanup"),
    ];

    let mut metadata = RampMetadata {
        evm_ephemeral_address: Some(EPH_EVM.into()),
        substrate_ephemeral_address: Some(EPH_PENDULUM.into()),
        moonbeam_receiver_call: Some(MoonbeamReceiverCall {
            receiver_contract: RECEIVER.into(),
            receiver_id: format!("0x{}", "22".repeat(32)),
            payload: "0x0304".into(),
        }),
        ephemeral_funding: vec![
            expect(Network::Pendulum, EPH_PENDULUM, AssetId::Native, 100),
            expect(Network::Moonbeam, EPH_EVM, AssetId::Native, 10),
        ],
        ..Default::default()
    };
    metadata.expected_arrivals.insert(
        MoonbeamToPendulum,
        expect(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    metadata.expected_arrivals.insert(
        PendulumToMoonbeamXcm,
        expect(Network::Moonbeam, EPH_EVM, brla_moonbeam(), 950),
    );
    metadata.subsidy_targets.insert(
        SubsidizePreSwap,
        expect(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    metadata.subsidy_targets.insert(
        SubsidizePostSwap,
        expect(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), 950),
    );
    metadata.cleanup_holdings.insert(
        PendulumCleanup,
        vec![AccountAsset {
            network: Network::Pendulum,
            account: EPH_PENDULUM.into(),
            asset: AssetId::Native,
        }],
    );

    RampState::new("quote-offramp-brl", route, unsigned, metadata)
}

/// Program the ledger for `brl_offramp_state` and store a fresh ramp
pub async fn brl_offramp_fixture(ledger: &Arc<FakeLedger>) -> (Arc<MemoryRampStore>, RampState) {
    ledger.on_submit("0xapprove", Effect::signed_by(Network::Polygon, USER));
    ledger.on_submit("0xswap", Effect::signed_by(Network::Polygon, USER));
    ledger.on_submit(
        RECEIVER,
        Effect::default().credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 1000),
    );
    ledger.on_submit("0xfees", Effect::signed_by(Network::Pendulum, EPH_PENDULUM));
    ledger.on_submit("0xnablaapprove", Effect::signed_by(Network::Pendulum, EPH_PENDULUM));
    ledger.on_submit(
        "0xnablaswapbrl",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), -1000)
            .credit(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), 940),
    );
    ledger.on_submit(
        "0xtomoonbeam",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), -950)
            .credit(Network::Moonbeam, EPH_EVM, brla_moonbeam(), 950),
    );
    ledger.on_submit(
        "0xbrlapayout",
        Effect::signed_by(Network::Moonbeam, EPH_EVM)
            .credit(Network::Moonbeam, EPH_EVM, brla_moonbeam(), -950)
            .credit(Network::Moonbeam, BRLA_PAYOUT, brla_moonbeam(), 950),
    );
    ledger.on_submit(
        "0xpendulumcleanup",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM).credit(
            Network::Pendulum,
            EPH_PENDULUM,
            AssetId::Native,
            -100,
        ),
    );

    let store = Arc::new(MemoryRampStore::new());
    let state = brl_offramp_state();
    store.create(&state).await.unwrap();
    (store, state)
}

/// BRL to AssetHub USDC onramp: BRLA is minted to the EVM ephemeral on Moonbeam
pub fn onramp_state() -> RampState {
    use RampPhase::*;

    let route =
        RouteClass::new(RampDirection::Onramp, Network::AssetHub, FiatCurrency::Brl).unwrap();
    let unsigned = vec![
        tx(Network::Moonbeam, MoonbeamToPendulumXcm, 0, EPH_EVM, "0xtopendulum"),
        tx(Network::Pendulum, NablaApprove, 0, EPH_PENDULUM, "0xnablaapprove"),
        tx(Network::Pendulum, NablaSwap, 1, EPH_PENDULUM, "0xnablaswaponramp"),
        tx(Network::Pendulum, DistributeFees, 2, EPH_PENDULUM, "0xfees"),
        tx(Network::Pendulum, PendulumToAssethubXcm, 3, EPH_PENDULUM, "0xtoassethub"),
        tx(Network::Pendulum, PendulumCleanup, 4, EPH_PENDULUM, "0xpendulumcleanup"),
    ];

    let mut metadata = RampMetadata {
        evm_ephemeral_address: Some(EPH_EVM.into()),
        substrate_ephemeral_address: Some(EPH_PENDULUM.into()),
        ephemeral_funding: vec![
            expect(Network::Pendulum, EPH_PENDULUM, AssetId::Native, 100),
            expect(Network::Moonbeam, EPH_EVM, AssetId::Native, 10),
        ],
        ..Default::default()
    };
    metadata.expected_arrivals.insert(
        BrlaOnrampMint,
        expect(Network::Moonbeam, EPH_EVM, brla_moonbeam(), 500),
    );
    metadata.expected_arrivals.insert(
        MoonbeamToPendulumXcm,
        expect(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), 500),
    );
    metadata.expected_arrivals.insert(
        PendulumToAssethubXcm,
        expect(Network::AssetHub, USER_ASSETHUB, usdc_assethub(), 100),
    );
    metadata.subsidy_targets.insert(
        SubsidizePreSwap,
        expect(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), 500),
    );
    metadata.subsidy_targets.insert(
        SubsidizePostSwap,
        expect(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 100),
    );
    metadata.cleanup_holdings.insert(
        PendulumCleanup,
        vec![
            AccountAsset {
                network: Network::Pendulum,
                account: EPH_PENDULUM.into(),
                asset: usdc_pendulum(),
            },
            AccountAsset {
                network: Network::Pendulum,
                account: EPH_PENDULUM.into(),
                asset: AssetId::Native,
            },
        ],
    );

    RampState::new("quote-onramp", route, unsigned, metadata)
}

/// Program the ledger for `onramp_state` and store a fresh ramp
///
/// The BRLA mint itself is left to the test: credit `brla_moonbeam()` to `EPH_EVM`.
pub async fn onramp_fixture(ledger: &Arc<FakeLedger>) -> (Arc<MemoryRampStore>, RampState) {
    ledger.on_submit(
        "0xtopendulum",
        Effect::signed_by(Network::Moonbeam, EPH_EVM)
            .credit(Network::Moonbeam, EPH_EVM, brla_moonbeam(), -500)
            .credit(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), 500),
    );
    ledger.on_submit("0xnablaapprove", Effect::signed_by(Network::Pendulum, EPH_PENDULUM));
    ledger.on_submit(
        "0xnablaswaponramp",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, brla_pendulum(), -500)
            .credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), 98),
    );
    ledger.on_submit(
        "0xfees",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), -1),
    );
    ledger.on_submit(
        "0xtoassethub",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM)
            .credit(Network::Pendulum, EPH_PENDULUM, usdc_pendulum(), -100)
            .credit(Network::AssetHub, USER_ASSETHUB, usdc_assethub(), 100),
    );
    ledger.on_submit(
        "0xpendulumcleanup",
        Effect::signed_by(Network::Pendulum, EPH_PENDULUM).credit(
            Network::Pendulum,
            EPH_PENDULUM,
            AssetId::Native,
            -100,
        ),
    );

    let store = Arc::new(MemoryRampStore::new());
    let state = onramp_state();
    store.create(&state).await.unwrap();
    (store, state)
}
