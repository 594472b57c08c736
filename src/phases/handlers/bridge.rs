//! Bridge-and-wait phases
//!
//! Funds move between networks (XCM transfers, the Moonbeam receiver contract, Spacewalk
//! redemption, BRLA minting). Arrival is proved by the destination balance, never by the
//! triggering transaction alone, so the balance check is also the recovery predicate.

use super::common::{
    presigned_or_missing, rebroadcast_if_unseen, record_and_submit, submit_presigned_once,
};
use crate::chain::{wait_for_balance, wait_for_confirmation};
use crate::error::{RampError, RampResult};
use crate::phases::handler::{PhaseDeps, PhaseHandler, PhaseStep};
use crate::ramp::{MoonbeamReceiverCall, Network, RampPhase, RampState};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::Bytes;
use tracing::{debug, info};

/// What sets the bridge in motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// A client-signed transaction for the phase
    Presigned,
    /// `executeXCM` on the Moonbeam receiver contract, sent from the funding account
    ReceiverCall,
    /// Nothing to send; an outside party moves the funds
    External,
}

pub struct BridgeHandler {
    phase: RampPhase,
    deps: PhaseDeps,
    trigger: Trigger,
}

/// `executeXCM(bytes32,bytes)` call data
pub fn execute_xcm_calldata(call: &MoonbeamReceiverCall) -> RampResult<Bytes> {
    let decode = |field: &str, value: &str| {
        ::hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| RampError::Validation(format!("receiver call {}: {}", field, e)))
    };

    let id = decode("receiverId", &call.receiver_id)?;
    if id.len() != 32 {
        return Err(RampError::Validation(format!(
            "receiver call receiverId must be 32 bytes, got {}",
            id.len()
        )));
    }
    let payload = decode("payload", &call.payload)?;

    let mut data = ethers::utils::id("executeXCM(bytes32,bytes)").to_vec();
    data.extend(abi::encode(&[Token::FixedBytes(id), Token::Bytes(payload)]));
    Ok(data.into())
}

impl BridgeHandler {
    pub fn presigned(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            trigger: Trigger::Presigned,
        }
    }

    pub fn receiver_call(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            trigger: Trigger::ReceiverCall,
        }
    }

    pub fn external(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            trigger: Trigger::External,
        }
    }

    /// Metadata the phase cannot start without
    fn check_entry(&self, state: &RampState) -> RampResult<()> {
        state.metadata.require_arrival(self.phase)?;
        match self.trigger {
            Trigger::ReceiverCall => {
                state.metadata.require_receiver_call(self.phase)?;
            }
            _ if self.phase == RampPhase::SpacewalkRedeem => {
                state.metadata.require_stellar_target(self.phase)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn send_receiver_call(&self, state: &RampState) -> RampResult<()> {
        let deps = &self.deps;
        let call = state.metadata.require_receiver_call(self.phase)?;
        let moonbeam = deps.chains.get(Network::Moonbeam)?;

        let hash = match state.metadata.funding_tx(self.phase, Network::Moonbeam) {
            Some(recorded) => {
                rebroadcast_if_unseen(
                    deps,
                    moonbeam.as_ref(),
                    state,
                    self.phase,
                    &recorded.hash,
                    &recorded.encoded,
                )
                .await?;
                recorded.hash.clone()
            }
            None => {
                let calldata = execute_xcm_calldata(call)?;
                let funding = deps.funding.address(Network::Moonbeam)?;

                let lease = deps.nonces.acquire(moonbeam.as_ref(), &funding).await?;
                let signed = deps
                    .funding
                    .sign_contract_call(
                        Network::Moonbeam,
                        &call.receiver_contract,
                        calldata,
                        lease.nonce(),
                    )
                    .await?;
                record_and_submit(deps, moonbeam.as_ref(), state, self.phase, signed, lease)
                    .await?
                    .hash
            }
        };

        wait_for_confirmation(
            moonbeam.as_ref(),
            &hash,
            deps.confirmation.poll_interval(),
            deps.confirmation.timeout(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PhaseHandler for BridgeHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    async fn already_applied(&self, state: &RampState) -> RampResult<bool> {
        self.check_entry(state)?;
        let expected = state.metadata.require_arrival(self.phase)?;
        let holding = &expected.holding;

        let client = self.deps.chains.get(holding.network)?;
        let balance = client.balance(&holding.account, &holding.asset).await?;
        debug!(
            ramp_id = %state.id,
            phase = %self.phase,
            "Destination holds {} of {} (expecting {})",
            balance,
            holding.asset,
            expected.amount_raw
        );
        Ok(balance >= expected.amount_raw)
    }

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep> {
        self.check_entry(state)?;

        match self.trigger {
            Trigger::Presigned => {
                let Some(tx) = presigned_or_missing(state, self.phase)? else {
                    return Ok(PhaseStep::Waiting);
                };
                submit_presigned_once(&self.deps, state, &tx).await?;
            }
            Trigger::ReceiverCall => self.send_receiver_call(state).await?,
            Trigger::External => {}
        }

        let expected = state.metadata.require_arrival(self.phase)?;
        let holding = &expected.holding;
        let client = self.deps.chains.get(holding.network)?;

        info!(
            ramp_id = %state.id,
            phase = %self.phase,
            "Waiting for {} of {} at {} on {}",
            expected.amount_raw,
            holding.asset,
            holding.account,
            holding.network
        );
        wait_for_balance(
            client.as_ref(),
            &holding.account,
            &holding.asset,
            expected.amount_raw,
            self.deps.confirmation.poll_interval(),
            self.deps.confirmation.bridge_timeout(),
        )
        .await?;

        Ok(PhaseStep::Done)
    }
}
