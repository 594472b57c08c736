//! Ramp Service: the boundary between clients and the phase engine
//!
//! Registration asks the transaction builder for the route's unsigned transactions and
//! stores a fresh ramp at `initial`. Start stores the client's signatures and hands the
//! ramp to the processor without waiting for it.

use crate::config::TxBuilderConfig;
use crate::error::{RampError, RampResult};
use crate::phases::PhaseProcessor;
use crate::ramp::{
    ErrorLogEntry, Network, PhaseHistoryEntry, PresignedTx, RampMetadata, RampPhase, RampState,
    RampUpdate, RouteClass, UnsignedTx,
};
use crate::state::RampStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upper bound on presigned transactions accepted in one start call
pub const MAX_PRESIGNED_TXS: usize = 100;

lazy_static! {
    static ref EVM_ADDRESS: Regex =
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningAccount {
    pub network: Network,
    pub address: String,
}

/// What the transaction builders hand over for a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedRamp {
    pub route: RouteClass,
    pub unsigned_txs: Vec<UnsignedTx>,
    #[serde(default)]
    pub metadata: RampMetadata,
}

/// Builds the unsigned transactions for a quote's route
#[async_trait]
pub trait RampTransactionBuilder: Send + Sync {
    /// Expired or already consumed quotes are reported as `Unrecoverable`
    async fn prepare(
        &self,
        quote_id: &str,
        signing_accounts: &[SigningAccount],
        additional_data: Option<&serde_json::Value>,
    ) -> RampResult<PreparedRamp>;
}

/// Transaction builder reached over HTTP
pub struct HttpTransactionBuilder {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest<'a> {
    quote_id: &'a str,
    signing_accounts: &'a [SigningAccount],
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_data: Option<&'a serde_json::Value>,
}

impl HttpTransactionBuilder {
    pub fn new(config: &TxBuilderConfig) -> RampResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RampError::Config(format!("transaction builder client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RampTransactionBuilder for HttpTransactionBuilder {
    async fn prepare(
        &self,
        quote_id: &str,
        signing_accounts: &[SigningAccount],
        additional_data: Option<&serde_json::Value>,
    ) -> RampResult<PreparedRamp> {
        let url = format!("{}/v1/ramp/prepare", self.url);
        let response = self
            .client
            .post(&url)
            .json(&PrepareRequest {
                quote_id,
                signing_accounts,
                additional_data,
            })
            .send()
            .await
            .map_err(|e| RampError::Internal(format!("transaction builder unreachable: {}", e)))?;

        let status = response.status();
        match status {
            s if s.is_success() => response
                .json::<PreparedRamp>()
                .await
                .map_err(|e| RampError::Internal(format!("transaction builder response: {}", e))),
            StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::CONFLICT => Err(
                RampError::Unrecoverable(format!("quote {} is expired or already used", quote_id)),
            ),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(RampError::Validation(format!("quote {}: {}", quote_id, body)))
            }
            other => Err(RampError::Internal(format!(
                "transaction builder returned {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRampRequest {
    pub quote_id: String,
    pub signing_accounts: Vec<SigningAccount>,
    #[serde(default)]
    pub additional_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRampResponse {
    pub id: Uuid,
    pub unsigned_txs: Vec<UnsignedTx>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRampRequest {
    pub ramp_id: Uuid,
    pub presigned_txs: Vec<PresignedTx>,
    #[serde(default)]
    pub additional_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RampStatus {
    pub id: Uuid,
    pub route: RouteClass,
    pub current_phase: RampPhase,
    pub phase_history: Vec<PhaseHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RampState> for RampStatus {
    fn from(state: RampState) -> Self {
        Self {
            id: state.id,
            route: state.route,
            current_phase: state.current_phase,
            phase_history: state.phase_history,
            created_at: state.created_at,
            updated_at: state.updated_at,
        }
    }
}

pub struct RampService {
    store: Arc<dyn RampStore>,
    builder: Arc<dyn RampTransactionBuilder>,
    processor: Arc<PhaseProcessor>,
}

impl RampService {
    pub fn new(
        store: Arc<dyn RampStore>,
        builder: Arc<dyn RampTransactionBuilder>,
        processor: Arc<PhaseProcessor>,
    ) -> Self {
        Self {
            store,
            builder,
            processor,
        }
    }

    pub async fn register_ramp(
        &self,
        request: RegisterRampRequest,
    ) -> RampResult<RegisterRampResponse> {
        if request.quote_id.trim().is_empty() {
            return Err(RampError::Validation("quoteId is required".into()));
        }
        validate_signing_accounts(&request.signing_accounts)?;

        let prepared = self
            .builder
            .prepare(
                &request.quote_id,
                &request.signing_accounts,
                request.additional_data.as_ref(),
            )
            .await?;

        if let Some(stray) = prepared
            .unsigned_txs
            .iter()
            .find(|tx| !prepared.route.contains(tx.phase))
        {
            return Err(RampError::Internal(format!(
                "transaction builder produced a {} transaction outside route {}",
                stray.phase, prepared.route
            )));
        }

        let mut metadata = prepared.metadata;
        if request.additional_data.is_some() {
            metadata.additional_data = request.additional_data;
        }

        let state = RampState::new(
            request.quote_id,
            prepared.route,
            prepared.unsigned_txs,
            metadata,
        );
        self.store.create(&state).await?;

        info!(
            ramp_id = %state.id,
            quote_id = %state.quote_id,
            "Registered {} ramp with {} unsigned transactions",
            state.route,
            state.unsigned_txs.len()
        );
        crate::metrics::record_ramp_registered(state.route.kind().as_str());

        Ok(RegisterRampResponse {
            id: state.id,
            unsigned_txs: state.unsigned_txs,
        })
    }

    pub async fn start_ramp(&self, request: StartRampRequest) -> RampResult<()> {
        let id = request.ramp_id;
        let state = self.store.get(id).await?.ok_or(RampError::NotFound(id))?;

        validate_presigned(&state, &request.presigned_txs)?;

        if state.presigned_txs.as_ref() == Some(&request.presigned_txs) {
            info!(ramp_id = %id, "Presigned transactions already stored, resuming processing");
        } else {
            let update = RampUpdate {
                presigned_txs: Some(request.presigned_txs),
                metadata: request.additional_data.map(|data| RampMetadata {
                    additional_data: Some(data),
                    ..Default::default()
                }),
                ..Default::default()
            };
            self.store.update(id, update).await?;
            info!(ramp_id = %id, "Ramp started");
            crate::metrics::record_ramp_started(state.route.kind().as_str());
        }

        self.trigger_processing(id);
        Ok(())
    }

    /// Run the processor for `id` in the background
    pub fn trigger_processing(&self, id: Uuid) {
        let processor = self.processor.clone();
        tokio::spawn(async move {
            match processor.process_ramp(id).await {
                Ok(outcome) => info!(ramp_id = %id, "Processing stopped: {:?}", outcome),
                Err(e) => error!(ramp_id = %id, "Processing halted: {}", e),
            }
        });
    }

    pub async fn get_ramp_status(&self, id: Uuid) -> RampResult<RampStatus> {
        let state = self.store.get(id).await?.ok_or(RampError::NotFound(id))?;
        Ok(state.into())
    }

    pub async fn get_error_logs(&self, id: Uuid) -> RampResult<Vec<ErrorLogEntry>> {
        let state = self.store.get(id).await?.ok_or(RampError::NotFound(id))?;
        Ok(state.error_logs)
    }
}

fn validate_signing_accounts(accounts: &[SigningAccount]) -> RampResult<()> {
    if accounts.is_empty() {
        return Err(RampError::Validation("signingAccounts must not be empty".into()));
    }
    if let Some(account) = accounts.iter().find(|a| a.address.trim().is_empty()) {
        return Err(RampError::Validation(format!(
            "signing account for {} has no address",
            account.network
        )));
    }
    Ok(())
}

/// Check the client's signatures against the ramp's unsigned transactions
fn validate_presigned(state: &RampState, presigned: &[PresignedTx]) -> RampResult<()> {
    if presigned.is_empty() || presigned.len() > MAX_PRESIGNED_TXS {
        return Err(RampError::Validation(format!(
            "presignedTxs must hold between 1 and {} entries, got {}",
            MAX_PRESIGNED_TXS,
            presigned.len()
        )));
    }

    for tx in presigned {
        if tx.tx_data.is_empty() {
            return Err(RampError::Validation(format!("{}: txData is empty", tx.phase)));
        }
        if tx.signer.trim().is_empty() {
            return Err(RampError::Validation(format!("{}: signer is empty", tx.phase)));
        }
        if tx.network.is_evm() && !EVM_ADDRESS.is_match(&tx.signer) {
            return Err(RampError::Validation(format!(
                "{}: signer {} is not an EVM address",
                tx.phase, tx.signer
            )));
        }
        if !state.unsigned_txs.iter().any(|u| u.matches(tx)) {
            return Err(RampError::Validation(format!(
                "{}: no unsigned transaction on {} with nonce {} for {}",
                tx.phase, tx.network, tx.nonce, tx.signer
            )));
        }
    }

    let mut signed_per_phase: HashMap<RampPhase, usize> = HashMap::new();
    for tx in presigned {
        *signed_per_phase.entry(tx.phase).or_default() += 1;
    }
    for (phase, signed) in signed_per_phase {
        let expected = state.unsigned_for(phase).count();
        if signed != expected {
            return Err(RampError::Validation(format!(
                "{}: expected {} presigned transactions, got {}",
                phase, expected, signed
            )));
        }
    }

    if let Some(ref stored) = state.presigned_txs {
        if stored.as_slice() != presigned {
            warn!(
                ramp_id = %state.id,
                "Rejecting different presigned transactions for a started ramp"
            );
            return Err(RampError::Validation(format!(
                "ramp {} was already started with other presigned transactions",
                state.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::{offramp_fixture, offramp_state, test_processor, FakeLedger, USER};
    use crate::state::MemoryRampStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBuilder {
        calls: AtomicUsize,
        expired: bool,
    }

    impl FakeBuilder {
        fn new(expired: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expired,
            })
        }
    }

    #[async_trait]
    impl RampTransactionBuilder for FakeBuilder {
        async fn prepare(
            &self,
            quote_id: &str,
            _signing_accounts: &[SigningAccount],
            _additional_data: Option<&serde_json::Value>,
        ) -> RampResult<PreparedRamp> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.expired {
                return Err(RampError::Unrecoverable(format!("quote {} expired", quote_id)));
            }
            let state = offramp_state();
            Ok(PreparedRamp {
                route: state.route,
                unsigned_txs: state.unsigned_txs,
                metadata: state.metadata,
            })
        }
    }

    fn accounts() -> Vec<SigningAccount> {
        vec![
            SigningAccount {
                network: Network::Polygon,
                address: USER.into(),
            },
            SigningAccount {
                network: Network::Pendulum,
                address: "5Eph".into(),
            },
        ]
    }

    fn register_request(quote: &str) -> RegisterRampRequest {
        RegisterRampRequest {
            quote_id: quote.into(),
            signing_accounts: accounts(),
            additional_data: Some(serde_json::json!({ "walletAddress": USER })),
        }
    }

    async fn service_with(
        builder: Arc<FakeBuilder>,
    ) -> (RampService, Arc<MemoryRampStore>, Arc<FakeLedger>, RampState) {
        let ledger = FakeLedger::new();
        let (store, state) = offramp_fixture(&ledger).await;
        let processor = Arc::new(test_processor(&ledger, store.clone()));
        let service = RampService::new(store.clone(), builder, processor);
        (service, store, ledger, state)
    }

    async fn wait_settled(store: &MemoryRampStore, id: Uuid) -> RampState {
        for _ in 0..500 {
            let state = store.get(id).await.unwrap().unwrap();
            if state.is_settled() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ramp {} did not settle", id);
    }

    #[tokio::test]
    async fn test_register_creates_initial_state_in_route_order() {
        let (service, store, _, _) = service_with(FakeBuilder::new(false)).await;

        let response = service.register_ramp(register_request("quote-2")).await.unwrap();
        let state = store.get(response.id).await.unwrap().unwrap();
        assert_eq!(state.current_phase, RampPhase::Initial);
        assert_eq!(
            state.metadata.additional_data,
            Some(serde_json::json!({ "walletAddress": USER }))
        );

        use RampPhase::*;
        let phases: Vec<RampPhase> = response.unsigned_txs.iter().map(|tx| tx.phase).collect();
        for expected in [
            SquidRouterApprove,
            SquidRouterSwap,
            NablaApprove,
            NablaSwap,
            SpacewalkRedeem,
            StellarPayment,
            StellarCleanup,
        ] {
            assert!(phases.contains(&expected), "missing {}", expected);
        }
        let positions: Vec<usize> = phases
            .iter()
            .map(|p| state.route.position(*p).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_register_validates_signing_accounts_before_building() {
        let builder = FakeBuilder::new(false);
        let (service, _, _, _) = service_with(builder.clone()).await;

        let mut request = register_request("quote-2");
        request.signing_accounts.clear();
        assert!(matches!(
            service.register_ramp(request).await,
            Err(RampError::Validation(_))
        ));

        let mut request = register_request("quote-2");
        request.signing_accounts[1].address = " ".into();
        assert!(matches!(
            service.register_ramp(request).await,
            Err(RampError::Validation(_))
        ));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_quote_creates_nothing() {
        let (service, _, _, _) = service_with(FakeBuilder::new(true)).await;

        let err = service.register_ramp(register_request("quote-2")).await.unwrap_err();
        assert!(matches!(err, RampError::Unrecoverable(_)));
        assert!(err.to_string().contains("quote-2"));
    }

    #[tokio::test]
    async fn test_start_runs_ramp_to_completion_in_background() {
        let (service, store, ledger, state) = service_with(FakeBuilder::new(false)).await;

        service
            .start_ramp(StartRampRequest {
                ramp_id: state.id,
                presigned_txs: state.unsigned_txs.clone(),
                additional_data: None,
            })
            .await
            .unwrap();

        let done = wait_settled(&store, state.id).await;
        assert_eq!(done.current_phase, RampPhase::StellarCleanup);
        assert_eq!(ledger.submissions_of("AAAAcleanup"), 1);

        let status = service.get_ramp_status(state.id).await.unwrap();
        assert_eq!(status.current_phase, RampPhase::StellarCleanup);
        assert_eq!(status.phase_history.len(), done.route.phases().len());
        assert!(service.get_error_logs(state.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_malformed_presigned_without_writing() {
        let (service, store, _, state) = service_with(FakeBuilder::new(false)).await;
        let start = |txs: Vec<PresignedTx>| StartRampRequest {
            ramp_id: state.id,
            presigned_txs: txs,
            additional_data: None,
        };

        let empty = service.start_ramp(start(vec![])).await;
        assert!(matches!(empty, Err(RampError::Validation(_))));

        let mut bad_signer = state.unsigned_txs.clone();
        bad_signer[0].signer = "not-an-address".into();
        let err = service.start_ramp(start(bad_signer)).await.unwrap_err();
        assert!(err.to_string().contains("not an EVM address"));

        let mut wrong_nonce = state.unsigned_txs.clone();
        wrong_nonce[1].nonce = 9;
        assert!(service.start_ramp(start(wrong_nonce)).await.is_err());

        let mut duplicated = state.unsigned_txs.clone();
        duplicated.push(duplicated[0].clone());
        let err = service.start_ramp(start(duplicated)).await.unwrap_err();
        assert!(err.to_string().contains("expected 1 presigned transactions, got 2"));

        let too_many = vec![state.unsigned_txs[0].clone(); MAX_PRESIGNED_TXS + 1];
        assert!(service.start_ramp(start(too_many)).await.is_err());

        assert_eq!(store.get(state.id).await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_restart_accepts_same_signatures_only() {
        let (service, store, _, state) = service_with(FakeBuilder::new(false)).await;
        let request = StartRampRequest {
            ramp_id: state.id,
            presigned_txs: state.unsigned_txs.clone(),
            additional_data: None,
        };

        service.start_ramp(request.clone()).await.unwrap();
        wait_settled(&store, state.id).await;
        service.start_ramp(request.clone()).await.unwrap();

        let mut other = request;
        other.presigned_txs.pop();
        assert!(matches!(
            service.start_ramp(other).await,
            Err(RampError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ramp_queries_are_not_found() {
        let (service, _, _, _) = service_with(FakeBuilder::new(false)).await;
        let id = Uuid::new_v4();
        assert!(matches!(service.get_ramp_status(id).await, Err(RampError::NotFound(_))));
        assert!(matches!(service.get_error_logs(id).await, Err(RampError::NotFound(_))));
    }
}
