//! Phase handler implementations
//!
//! - `lifecycle`: entry and exit phases
//! - `presigned`: one client-signed transaction per phase
//! - `bridge`: cross-network transfers proved by destination balances
//! - `subsidize`: funding-account top-ups
//! - `cleanup`: residual sweeps

mod bridge;
mod cleanup;
mod common;
mod lifecycle;
mod presigned;
mod subsidize;

pub use bridge::{execute_xcm_calldata, BridgeHandler};
pub use cleanup::CleanupHandler;
pub use lifecycle::{CompleteHandler, InitialHandler};
pub use presigned::PresignedPhaseHandler;
pub use subsidize::SubsidizeHandler;
