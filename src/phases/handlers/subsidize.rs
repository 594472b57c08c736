//! Subsidize phases: top ephemeral accounts up to what the next steps need
//!
//! The funding account pays exactly the shortfall between a target and the current
//! balance. No shortfall means no transfer; the phase still transitions. `fundEphemeral`
//! works the same way over the native fee balances of every ephemeral account.

use super::common::{rebroadcast_if_unseen, record_and_submit};
use crate::chain::{wait_for_balance, wait_for_confirmation, ChainClient};
use crate::error::{RampError, RampResult};
use crate::phases::handler::{PhaseDeps, PhaseHandler, PhaseStep};
use crate::ramp::{BalanceExpectation, RampPhase, RampState};
use crate::state::SubsidyRecord;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{info, warn};

/// Where a subsidize phase reads its targets from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Targets {
    /// The single `subsidyTargets` entry of the phase
    Subsidy,
    /// Every `ephemeralFunding` entry
    EphemeralFunding,
}

pub struct SubsidizeHandler {
    phase: RampPhase,
    deps: PhaseDeps,
    targets: Targets,
}

impl SubsidizeHandler {
    pub fn new(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            targets: Targets::Subsidy,
        }
    }

    /// Native fee balances for the ephemeral accounts
    pub fn ephemeral_funding(deps: PhaseDeps) -> Self {
        Self {
            phase: RampPhase::FundEphemeral,
            deps,
            targets: Targets::EphemeralFunding,
        }
    }

    fn targets<'a>(&self, state: &'a RampState) -> RampResult<Vec<&'a BalanceExpectation>> {
        let targets: Vec<_> = match self.targets {
            Targets::Subsidy => vec![state.metadata.require_subsidy_target(self.phase)?],
            Targets::EphemeralFunding => state
                .metadata
                .require_ephemeral_funding(self.phase)?
                .iter()
                .collect(),
        };

        // funding transactions are tracked per (phase, network)
        let mut networks = HashSet::new();
        if let Some(dup) = targets.iter().find(|t| !networks.insert(t.holding.network)) {
            return Err(RampError::Validation(format!(
                "phase {} has more than one target on {}",
                self.phase, dup.holding.network
            )));
        }
        Ok(targets)
    }

    async fn balance(&self, target: &BalanceExpectation) -> RampResult<Decimal> {
        let holding = &target.holding;
        let client = self.deps.chains.get(holding.network)?;
        client.balance(&holding.account, &holding.asset).await
    }

    async fn wait_topped_up(
        &self,
        client: &dyn ChainClient,
        hash: &str,
        target: &BalanceExpectation,
    ) -> RampResult<()> {
        let confirmation = &self.deps.confirmation;
        wait_for_confirmation(
            client,
            hash,
            confirmation.poll_interval(),
            confirmation.timeout(),
        )
        .await?;
        wait_for_balance(
            client,
            &target.holding.account,
            &target.holding.asset,
            target.amount_raw,
            confirmation.poll_interval(),
            confirmation.timeout(),
        )
        .await?;
        Ok(())
    }

    async fn top_up(&self, state: &RampState, target: &BalanceExpectation) -> RampResult<()> {
        let deps = &self.deps;
        let holding = &target.holding;
        let client = deps.chains.get(holding.network)?;

        if let Some(recorded) = state.metadata.funding_tx(self.phase, holding.network) {
            rebroadcast_if_unseen(
                deps,
                client.as_ref(),
                state,
                self.phase,
                &recorded.hash,
                &recorded.encoded,
            )
            .await?;
            return self.wait_topped_up(client.as_ref(), &recorded.hash, target).await;
        }

        let balance = client.balance(&holding.account, &holding.asset).await?;
        let shortfall = target.amount_raw - balance;
        if shortfall <= Decimal::ZERO {
            info!(
                ramp_id = %state.id,
                phase = %self.phase,
                "Balance {} of {} on {} covers target, no subsidy",
                balance,
                holding.asset,
                holding.network
            );
            return Ok(());
        }

        let payer = deps.funding.address(holding.network)?;
        let lease = deps.nonces.acquire(client.as_ref(), &payer).await?;
        let signed = deps
            .funding
            .sign_transfer(
                holding.network,
                &holding.account,
                &holding.asset,
                shortfall,
                lease.nonce(),
            )
            .await?;
        let recorded =
            record_and_submit(deps, client.as_ref(), state, self.phase, signed, lease).await?;

        info!(
            ramp_id = %state.id,
            phase = %self.phase,
            "Subsidized {} of {} to {} ({})",
            shortfall,
            holding.asset,
            holding.account,
            recorded.hash
        );
        crate::metrics::record_subsidy(holding.network, self.phase);

        let record = SubsidyRecord {
            ramp_id: state.id,
            phase: self.phase,
            network: holding.network,
            asset: holding.asset.clone(),
            amount_raw: shortfall,
            payer,
            tx_hash: recorded.hash.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = deps.store.record_subsidy(&record).await {
            warn!(ramp_id = %state.id, phase = %self.phase, "Failed to record subsidy: {}", e);
        }

        self.wait_topped_up(client.as_ref(), &recorded.hash, target).await
    }
}

#[async_trait]
impl PhaseHandler for SubsidizeHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    async fn already_applied(&self, state: &RampState) -> RampResult<bool> {
        for target in self.targets(state)? {
            if self.balance(target).await? < target.amount_raw {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep> {
        for target in self.targets(state)? {
            self.top_up(state, target).await?;
        }
        Ok(PhaseStep::Done)
    }
}
