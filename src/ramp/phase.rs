//! Phase names and network identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named step of a ramp route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RampPhase {
    Initial,
    FundEphemeral,
    SquidRouterApprove,
    SquidRouterSwap,
    MoonbeamToPendulum,
    MoonbeamToPendulumXcm,
    AssethubToPendulum,
    BrlaOnrampMint,
    DistributeFees,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    SubsidizePostSwap,
    SpacewalkRedeem,
    StellarPayment,
    PendulumToMoonbeamXcm,
    PendulumToAssethubXcm,
    BrlaPayoutOnMoonbeam,
    StellarCleanup,
    PendulumCleanup,
    Complete,
}

impl RampPhase {
    pub const ALL: [RampPhase; 21] = [
        RampPhase::Initial,
        RampPhase::FundEphemeral,
        RampPhase::SquidRouterApprove,
        RampPhase::SquidRouterSwap,
        RampPhase::MoonbeamToPendulum,
        RampPhase::MoonbeamToPendulumXcm,
        RampPhase::AssethubToPendulum,
        RampPhase::BrlaOnrampMint,
        RampPhase::DistributeFees,
        RampPhase::SubsidizePreSwap,
        RampPhase::NablaApprove,
        RampPhase::NablaSwap,
        RampPhase::SubsidizePostSwap,
        RampPhase::SpacewalkRedeem,
        RampPhase::StellarPayment,
        RampPhase::PendulumToMoonbeamXcm,
        RampPhase::PendulumToAssethubXcm,
        RampPhase::BrlaPayoutOnMoonbeam,
        RampPhase::StellarCleanup,
        RampPhase::PendulumCleanup,
        RampPhase::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RampPhase::Initial => "initial",
            RampPhase::FundEphemeral => "fundEphemeral",
            RampPhase::SquidRouterApprove => "squidRouterApprove",
            RampPhase::SquidRouterSwap => "squidRouterSwap",
            RampPhase::MoonbeamToPendulum => "moonbeamToPendulum",
            RampPhase::MoonbeamToPendulumXcm => "moonbeamToPendulumXcm",
            RampPhase::AssethubToPendulum => "assethubToPendulum",
            RampPhase::BrlaOnrampMint => "brlaOnrampMint",
            RampPhase::DistributeFees => "distributeFees",
            RampPhase::SubsidizePreSwap => "subsidizePreSwap",
            RampPhase::NablaApprove => "nablaApprove",
            RampPhase::NablaSwap => "nablaSwap",
            RampPhase::SubsidizePostSwap => "subsidizePostSwap",
            RampPhase::SpacewalkRedeem => "spacewalkRedeem",
            RampPhase::StellarPayment => "stellarPayment",
            RampPhase::PendulumToMoonbeamXcm => "pendulumToMoonbeamXcm",
            RampPhase::PendulumToAssethubXcm => "pendulumToAssethubXcm",
            RampPhase::BrlaPayoutOnMoonbeam => "brlaPayoutOnMoonbeam",
            RampPhase::StellarCleanup => "stellarCleanup",
            RampPhase::PendulumCleanup => "pendulumCleanup",
            RampPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for RampPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RampPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RampPhase::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown ramp phase: {}", s))
    }
}

/// Networks a ramp can touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Polygon,
    Arbitrum,
    Base,
    Avalanche,
    Bsc,
    Moonbeam,
    Pendulum,
    AssetHub,
    Stellar,
}

/// Transaction family of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Evm,
    Substrate,
    Stellar,
}

impl Network {
    pub const ALL: [Network; 10] = [
        Network::Ethereum,
        Network::Polygon,
        Network::Arbitrum,
        Network::Base,
        Network::Avalanche,
        Network::Bsc,
        Network::Moonbeam,
        Network::Pendulum,
        Network::AssetHub,
        Network::Stellar,
    ];

    pub fn kind(&self) -> NetworkKind {
        match self {
            Network::Ethereum
            | Network::Polygon
            | Network::Arbitrum
            | Network::Base
            | Network::Avalanche
            | Network::Bsc
            | Network::Moonbeam => NetworkKind::Evm,
            Network::Pendulum | Network::AssetHub => NetworkKind::Substrate,
            Network::Stellar => NetworkKind::Stellar,
        }
    }

    pub fn is_evm(&self) -> bool {
        self.kind() == NetworkKind::Evm
    }

    /// EVM chain id, if any
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Network::Ethereum => Some(1),
            Network::Polygon => Some(137),
            Network::Arbitrum => Some(42161),
            Network::Base => Some(8453),
            Network::Avalanche => Some(43114),
            Network::Bsc => Some(56),
            Network::Moonbeam => Some(1284),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Base => "base",
            Network::Avalanche => "avalanche",
            Network::Bsc => "bsc",
            Network::Moonbeam => "moonbeam",
            Network::Pendulum => "pendulum",
            Network::AssetHub => "assethub",
            Network::Stellar => "stellar",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Network::ALL
            .into_iter()
            .find(|n| n.as_str() == lower)
            .ok_or_else(|| format!("unknown network: {}", s))
    }
}
