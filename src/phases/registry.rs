//! Phase name to handler lookup, built once at startup

use super::handler::{PhaseDeps, PhaseHandler};
use super::handlers::{
    BridgeHandler, CleanupHandler, CompleteHandler, InitialHandler, PresignedPhaseHandler,
    SubsidizeHandler,
};
use crate::error::{RampError, RampResult};
use crate::ramp::{routed_phases, RampPhase};

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct PhaseRegistry {
    handlers: HashMap<RampPhase, Arc<dyn PhaseHandler>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every phase any route can reach, wired to the shared dependencies
    pub fn standard(deps: PhaseDeps) -> RampResult<Self> {
        use RampPhase::*;

        let mut registry = Self::new();
        registry.register(Arc::new(InitialHandler))?;
        registry.register(Arc::new(CompleteHandler))?;

        let presigned = [
            SquidRouterApprove,
            SquidRouterSwap,
            NablaApprove,
            NablaSwap,
            StellarPayment,
            BrlaPayoutOnMoonbeam,
        ];
        for phase in presigned {
            registry.register(Arc::new(PresignedPhaseHandler::required(phase, deps.clone())))?;
        }
        let fees = PresignedPhaseHandler::optional(DistributeFees, deps.clone());
        registry.register(Arc::new(fees))?;

        let receiver = BridgeHandler::receiver_call(MoonbeamToPendulum, deps.clone());
        registry.register(Arc::new(receiver))?;
        let bridged = [
            AssethubToPendulum,
            MoonbeamToPendulumXcm,
            PendulumToMoonbeamXcm,
            PendulumToAssethubXcm,
            SpacewalkRedeem,
        ];
        for phase in bridged {
            registry.register(Arc::new(BridgeHandler::presigned(phase, deps.clone())))?;
        }
        registry.register(Arc::new(BridgeHandler::external(BrlaOnrampMint, deps.clone())))?;

        registry.register(Arc::new(SubsidizeHandler::ephemeral_funding(deps.clone())))?;
        for phase in [SubsidizePreSwap, SubsidizePostSwap] {
            registry.register(Arc::new(SubsidizeHandler::new(phase, deps.clone())))?;
        }
        for phase in [StellarCleanup, PendulumCleanup] {
            registry.register(Arc::new(CleanupHandler::new(phase, deps.clone())))?;
        }

        let missing = registry.missing_phases();
        if !missing.is_empty() {
            return Err(RampError::Config(format!(
                "no handler for routed phases: {:?}",
                missing
            )));
        }
        Ok(registry)
    }

    /// Add a handler; duplicates and phases outside every route are configuration errors
    pub fn register(&mut self, handler: Arc<dyn PhaseHandler>) -> RampResult<()> {
        let phase = handler.phase();
        if !routed_phases().any(|p| p == phase) {
            return Err(RampError::Config(format!(
                "phase {} does not appear in any route",
                phase
            )));
        }
        if self.handlers.insert(phase, handler).is_some() {
            return Err(RampError::Config(format!(
                "handler for phase {} registered twice",
                phase
            )));
        }
        Ok(())
    }

    pub fn get(&self, phase: RampPhase) -> Option<Arc<dyn PhaseHandler>> {
        self.handlers.get(&phase).cloned()
    }

    /// Routed phases without a handler
    pub fn missing_phases(&self) -> Vec<RampPhase> {
        routed_phases()
            .filter(|p| !self.handlers.contains_key(p))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}
