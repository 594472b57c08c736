//! Route classes and their static phase tables
//!
//! A route class is the (direction, crypto-side network, fiat currency) triple. The
//! destination network of an offramp is implied by the fiat rail: EURC and ARS settle
//! through the Stellar anchors, BRL through BRLA on Moonbeam.

use super::phase::{Network, NetworkKind, RampPhase};
use crate::error::{RampError, RampResult};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampDirection {
    Onramp,
    Offramp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FiatCurrency {
    Eurc,
    Ars,
    Brl,
}

/// Which phase table a route class uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    OfframpEvmStellar,
    OfframpEvmBrl,
    OfframpAssetHubStellar,
    OfframpAssetHubBrl,
    OnrampBrlAssetHub,
    OnrampBrlEvm,
}

use RampPhase::*;

const OFFRAMP_EVM_STELLAR: &[RampPhase] = &[
    Initial,
    FundEphemeral,
    SquidRouterApprove,
    SquidRouterSwap,
    MoonbeamToPendulum,
    DistributeFees,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    SubsidizePostSwap,
    SpacewalkRedeem,
    StellarPayment,
    StellarCleanup,
];

const OFFRAMP_EVM_BRL: &[RampPhase] = &[
    Initial,
    FundEphemeral,
    SquidRouterApprove,
    SquidRouterSwap,
    MoonbeamToPendulum,
    DistributeFees,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    SubsidizePostSwap,
    PendulumToMoonbeamXcm,
    BrlaPayoutOnMoonbeam,
    PendulumCleanup,
];

const OFFRAMP_ASSETHUB_STELLAR: &[RampPhase] = &[
    Initial,
    FundEphemeral,
    AssethubToPendulum,
    DistributeFees,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    SubsidizePostSwap,
    SpacewalkRedeem,
    StellarPayment,
    StellarCleanup,
];

const OFFRAMP_ASSETHUB_BRL: &[RampPhase] = &[
    Initial,
    FundEphemeral,
    AssethubToPendulum,
    DistributeFees,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    SubsidizePostSwap,
    PendulumToMoonbeamXcm,
    BrlaPayoutOnMoonbeam,
    PendulumCleanup,
];

const ONRAMP_BRL_ASSETHUB: &[RampPhase] = &[
    Initial,
    BrlaOnrampMint,
    FundEphemeral,
    MoonbeamToPendulumXcm,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    DistributeFees,
    SubsidizePostSwap,
    PendulumToAssethubXcm,
    PendulumCleanup,
    Complete,
];

const ONRAMP_BRL_EVM: &[RampPhase] = &[
    Initial,
    BrlaOnrampMint,
    FundEphemeral,
    MoonbeamToPendulumXcm,
    SubsidizePreSwap,
    NablaApprove,
    NablaSwap,
    DistributeFees,
    SubsidizePostSwap,
    PendulumToMoonbeamXcm,
    SquidRouterApprove,
    SquidRouterSwap,
    PendulumCleanup,
    Complete,
];

impl RouteKind {
    pub const ALL: [RouteKind; 6] = [
        RouteKind::OfframpEvmStellar,
        RouteKind::OfframpEvmBrl,
        RouteKind::OfframpAssetHubStellar,
        RouteKind::OfframpAssetHubBrl,
        RouteKind::OnrampBrlAssetHub,
        RouteKind::OnrampBrlEvm,
    ];

    pub fn phases(&self) -> &'static [RampPhase] {
        match self {
            RouteKind::OfframpEvmStellar => OFFRAMP_EVM_STELLAR,
            RouteKind::OfframpEvmBrl => OFFRAMP_EVM_BRL,
            RouteKind::OfframpAssetHubStellar => OFFRAMP_ASSETHUB_STELLAR,
            RouteKind::OfframpAssetHubBrl => OFFRAMP_ASSETHUB_BRL,
            RouteKind::OnrampBrlAssetHub => ONRAMP_BRL_ASSETHUB,
            RouteKind::OnrampBrlEvm => ONRAMP_BRL_EVM,
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::OfframpEvmStellar => "offramp_evm_stellar",
            RouteKind::OfframpEvmBrl => "offramp_evm_brl",
            RouteKind::OfframpAssetHubStellar => "offramp_assethub_stellar",
            RouteKind::OfframpAssetHubBrl => "offramp_assethub_brl",
            RouteKind::OnrampBrlAssetHub => "onramp_brl_assethub",
            RouteKind::OnrampBrlEvm => "onramp_brl_evm",
        }
    }
}

/// Phases that appear in at least one route table
pub fn routed_phases() -> impl Iterator<Item = RampPhase> {
    RampPhase::ALL
        .into_iter()
        .filter(|p| RouteKind::ALL.iter().any(|k| k.phases().contains(p)))
}

/// Phase table for a combination, `None` when the combination is unsupported
fn resolve_kind(
    direction: RampDirection,
    network: Network,
    fiat: FiatCurrency,
) -> Option<RouteKind> {
    let kind = network.kind();
    let assethub = network == Network::AssetHub;
    match (direction, fiat) {
        (RampDirection::Offramp, FiatCurrency::Eurc | FiatCurrency::Ars) => match kind {
            NetworkKind::Evm => Some(RouteKind::OfframpEvmStellar),
            _ if assethub => Some(RouteKind::OfframpAssetHubStellar),
            _ => None,
        },
        (RampDirection::Offramp, FiatCurrency::Brl) => match kind {
            NetworkKind::Evm => Some(RouteKind::OfframpEvmBrl),
            _ if assethub => Some(RouteKind::OfframpAssetHubBrl),
            _ => None,
        },
        (RampDirection::Onramp, FiatCurrency::Brl) => match kind {
            NetworkKind::Evm => Some(RouteKind::OnrampBrlEvm),
            _ if assethub => Some(RouteKind::OnrampBrlAssetHub),
            _ => None,
        },
        (RampDirection::Onramp, _) => None,
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRouteClass {
    direction: RampDirection,
    network: Network,
    fiat: FiatCurrency,
}

/// Direction x network x currency; only supported combinations can be constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRouteClass")]
pub struct RouteClass {
    direction: RampDirection,
    network: Network,
    fiat: FiatCurrency,
    /// Resolved once at construction
    #[serde(skip_serializing)]
    kind: RouteKind,
}

impl TryFrom<RawRouteClass> for RouteClass {
    type Error = RampError;

    fn try_from(raw: RawRouteClass) -> Result<Self, Self::Error> {
        RouteClass::new(raw.direction, raw.network, raw.fiat)
    }
}

impl RouteClass {
    pub fn new(direction: RampDirection, network: Network, fiat: FiatCurrency) -> RampResult<Self> {
        let kind = resolve_kind(direction, network, fiat).ok_or_else(|| {
            RampError::Validation(format!(
                "unsupported route: {:?} {} {:?}",
                direction, network, fiat
            ))
        })?;
        Ok(Self {
            direction,
            network,
            fiat,
            kind,
        })
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn direction(&self) -> RampDirection {
        self.direction
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn fiat(&self) -> FiatCurrency {
        self.fiat
    }

    /// Network the user's funds leave from
    pub fn source_network(&self) -> Network {
        match self.direction {
            RampDirection::Offramp => self.network,
            RampDirection::Onramp => Network::Moonbeam,
        }
    }

    /// Network the funds settle on
    pub fn destination_network(&self) -> Network {
        match (self.direction, self.fiat) {
            (RampDirection::Onramp, _) => self.network,
            (RampDirection::Offramp, FiatCurrency::Brl) => Network::Moonbeam,
            (RampDirection::Offramp, _) => Network::Stellar,
        }
    }

    pub fn phases(&self) -> &'static [RampPhase] {
        self.kind().phases()
    }

    pub fn contains(&self, phase: RampPhase) -> bool {
        self.phases().contains(&phase)
    }

    pub fn terminal_phase(&self) -> RampPhase {
        // Tables are non-empty constants.
        *self.phases().last().unwrap_or(&Complete)
    }

    pub fn is_terminal(&self, phase: RampPhase) -> bool {
        self.terminal_phase() == phase
    }

    /// Successor of `current`, or `None` when `current` is terminal
    pub fn next_phase(&self, current: RampPhase) -> RampResult<Option<RampPhase>> {
        let phases = self.phases();
        let idx = phases
            .iter()
            .position(|p| *p == current)
            .ok_or_else(|| {
                RampError::Validation(format!("phase {} is not part of route {}", current, self))
            })?;
        Ok(phases.get(idx + 1).copied())
    }

    /// Index of `phase` within the table
    pub fn position(&self, phase: RampPhase) -> Option<usize> {
        self.phases().iter().position(|p| *p == phase)
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            RampDirection::Onramp => "onramp",
            RampDirection::Offramp => "offramp",
        };
        write!(
            f,
            "{}:{}->{}:{:?}",
            dir,
            self.source_network(),
            self.destination_network(),
            self.fiat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_routes() -> Vec<RouteClass> {
        vec![
            RouteClass::new(RampDirection::Offramp, Network::Polygon, FiatCurrency::Eurc).unwrap(),
            RouteClass::new(RampDirection::Offramp, Network::Arbitrum, FiatCurrency::Brl).unwrap(),
            RouteClass::new(RampDirection::Offramp, Network::AssetHub, FiatCurrency::Ars).unwrap(),
            RouteClass::new(RampDirection::Offramp, Network::AssetHub, FiatCurrency::Brl).unwrap(),
            RouteClass::new(RampDirection::Onramp, Network::AssetHub, FiatCurrency::Brl).unwrap(),
            RouteClass::new(RampDirection::Onramp, Network::Base, FiatCurrency::Brl).unwrap(),
        ]
    }

    #[test]
    fn test_every_route_kind_is_reachable() {
        let kinds: Vec<_> = all_routes().iter().map(|r| r.kind()).collect();
        for kind in RouteKind::ALL {
            assert!(kinds.contains(&kind), "{:?} unreachable", kind);
        }
    }

    #[test]
    fn test_next_phase_walks_table_and_ends_with_none() {
        for route in all_routes() {
            let phases = route.phases();
            assert_eq!(phases[0], Initial);
            for window in phases.windows(2) {
                assert_eq!(route.next_phase(window[0]).unwrap(), Some(window[1]));
            }
            let last = *phases.last().unwrap();
            assert_eq!(route.next_phase(last).unwrap(), None);
            assert!(route.is_terminal(last));
        }
    }

    #[test]
    fn test_tables_have_no_duplicate_phases() {
        for kind in RouteKind::ALL {
            let phases = kind.phases();
            for (i, p) in phases.iter().enumerate() {
                assert!(!phases[i + 1..].contains(p), "{:?} repeats {}", kind, p);
            }
        }
    }

    #[test]
    fn test_terminal_phases() {
        let routes = all_routes();
        assert_eq!(routes[0].terminal_phase(), StellarCleanup);
        assert_eq!(routes[1].terminal_phase(), PendulumCleanup);
        assert_eq!(routes[4].terminal_phase(), Complete);
    }

    #[test]
    fn test_phase_outside_table_is_rejected() {
        let route = all_routes()[0];
        assert!(route.next_phase(BrlaPayoutOnMoonbeam).is_err());
        assert!(!route.contains(Complete));
    }

    #[test]
    fn test_unsupported_routes() {
        assert!(
            RouteClass::new(RampDirection::Onramp, Network::Polygon, FiatCurrency::Eurc).is_err()
        );
        assert!(
            RouteClass::new(RampDirection::Offramp, Network::Pendulum, FiatCurrency::Eurc).is_err()
        );
        assert!(
            RouteClass::new(RampDirection::Offramp, Network::Stellar, FiatCurrency::Brl).is_err()
        );
    }

    #[test]
    fn test_deserialization_validates_combination() {
        let ok: RouteClass = serde_json::from_str(
            r#"{"direction":"offramp","network":"polygon","fiat":"EURC"}"#,
        )
        .unwrap();
        assert_eq!(ok.destination_network(), Network::Stellar);
        assert_eq!(ok.source_network(), Network::Polygon);

        let bad = serde_json::from_str::<RouteClass>(
            r#"{"direction":"onramp","network":"polygon","fiat":"ARS"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_kind_is_resolved_once_and_not_serialized() {
        let route =
            RouteClass::new(RampDirection::Offramp, Network::AssetHub, FiatCurrency::Brl).unwrap();
        assert_eq!(route.kind(), RouteKind::OfframpAssetHubBrl);

        let json = serde_json::to_value(route).unwrap();
        assert!(json.get("kind").is_none());
        let back: RouteClass = serde_json::from_value(json).unwrap();
        assert_eq!(back, route);
        assert_eq!(back.kind(), RouteKind::OfframpAssetHubBrl);
    }

    #[test]
    fn test_ephemerals_are_funded_before_the_first_pendulum_step() {
        for kind in RouteKind::ALL {
            let phases = kind.phases();
            let funded = phases.iter().position(|p| *p == FundEphemeral);
            let funded = funded.unwrap_or_else(|| panic!("{:?} never funds ephemerals", kind));
            let first_pendulum = phases
                .iter()
                .position(|p| matches!(p, SubsidizePreSwap | NablaApprove | DistributeFees))
                .unwrap();
            assert!(funded < first_pendulum, "{:?}", kind);
        }
    }
}
