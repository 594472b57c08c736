//! Funding account transactions: nonce allocation and signing

pub mod funding;
pub mod nonce;

pub use funding::{FundingSigner, FundingWallet, SignedTx};
pub use nonce::{NonceLease, NonceManager};
