//! Ramp domain model
//!
//! - Phase names and networks
//! - Route classes with their static phase tables
//! - Phase-tagged transaction records
//! - Typed metadata and the durable ramp state

pub mod metadata;
pub mod phase;
pub mod route;
pub mod state;
pub mod tx;

pub use metadata::{
    AccountAsset, BalanceExpectation, FundingTx, MoonbeamReceiverCall, RampMetadata, StellarTarget,
};
pub use phase::{Network, NetworkKind, RampPhase};
pub use route::{routed_phases, FiatCurrency, RampDirection, RouteClass, RouteKind};
pub use state::{ErrorLogEntry, PhaseHistoryEntry, PhaseTransition, RampState, RampUpdate};
pub use tx::{AssetId, PresignedTx, TxData, UnsignedTx};
