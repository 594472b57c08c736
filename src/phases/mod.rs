//! Phase orchestration engine
//!
//! This module provides:
//! - The `PhaseHandler` contract and the single-phase `execute` step
//! - The `PhaseRegistry`, built once at startup with injected dependencies
//! - The `PhaseProcessor`, which walks a ramp through its route in a bounded loop
//! - Handlers for every routed phase

mod handler;
pub mod handlers;
mod lock;
mod processor;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use handler::{PhaseDeps, PhaseHandler, PhaseStep};
pub use processor::{PhaseProcessor, ProcessOutcome};
pub use registry::PhaseRegistry;
