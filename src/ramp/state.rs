//! Durable ramp state and its update contract

use super::metadata::RampMetadata;
use super::phase::RampPhase;
use super::route::RouteClass;
use super::tx::{PresignedTx, UnsignedTx};
use crate::error::{RampError, RampResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseHistoryEntry {
    pub phase: RampPhase,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub phase: RampPhase,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub recoverable: bool,
}

impl ErrorLogEntry {
    pub fn from_error(phase: RampPhase, err: &RampError) -> Self {
        Self {
            phase,
            timestamp: Utc::now(),
            error: err.to_string(),
            details: Some(format!("{:?}", err)),
            recoverable: err.is_retryable(),
        }
    }
}

/// One successful phase transition
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub from: RampPhase,
    pub to: RampPhase,
    pub metadata: Option<serde_json::Value>,
}

/// Partial update applied atomically by a `RampStore`
#[derive(Debug, Clone, Default)]
pub struct RampUpdate {
    pub presigned_txs: Option<Vec<PresignedTx>>,
    pub metadata: Option<RampMetadata>,
    pub transition: Option<PhaseTransition>,
    pub error_log: Option<ErrorLogEntry>,
}

impl RampUpdate {
    pub fn metadata(patch: RampMetadata) -> Self {
        Self {
            metadata: Some(patch),
            ..Default::default()
        }
    }

    pub fn transition(from: RampPhase, to: RampPhase) -> Self {
        Self {
            transition: Some(PhaseTransition {
                from,
                to,
                metadata: None,
            }),
            ..Default::default()
        }
    }

    pub fn error_log(entry: ErrorLogEntry) -> Self {
        Self {
            error_log: Some(entry),
            ..Default::default()
        }
    }

    pub fn presigned(txs: Vec<PresignedTx>) -> Self {
        Self {
            presigned_txs: Some(txs),
            ..Default::default()
        }
    }
}

/// Durable record of one ramp's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampState {
    pub id: Uuid,
    pub quote_id: String,
    pub route: RouteClass,
    pub current_phase: RampPhase,
    pub unsigned_txs: Vec<UnsignedTx>,
    pub presigned_txs: Option<Vec<PresignedTx>>,
    pub metadata: RampMetadata,
    pub phase_history: Vec<PhaseHistoryEntry>,
    pub error_logs: Vec<ErrorLogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RampState {
    /// Fresh state at `initial`
    pub fn new(
        quote_id: impl Into<String>,
        route: RouteClass,
        unsigned_txs: Vec<UnsignedTx>,
        metadata: RampMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            quote_id: quote_id.into(),
            route,
            current_phase: RampPhase::Initial,
            unsigned_txs,
            presigned_txs: None,
            metadata,
            phase_history: vec![PhaseHistoryEntry {
                phase: RampPhase::Initial,
                timestamp: now,
                metadata: None,
            }],
            error_logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.route.is_terminal(self.current_phase)
    }

    /// Terminal with nothing left to do, not even a pending cleanup sweep
    pub fn is_settled(&self) -> bool {
        self.is_terminal()
            && (self.current_phase == RampPhase::Complete
                || self.metadata.completed_cleanups.contains(&self.current_phase))
    }

    /// Halted on an error that retrying will not fix
    ///
    /// True when the latest error log is non-recoverable and no transition happened
    /// after it. Such a ramp is left to operators instead of the recovery worker.
    pub fn is_parked(&self) -> bool {
        let Some(last_error) = self.error_logs.last() else {
            return false;
        };
        let last_transition = self.phase_history.last().map(|h| h.timestamp);
        !last_error.recoverable && last_transition.map_or(true, |t| last_error.timestamp >= t)
    }

    pub fn unsigned_for(&self, phase: RampPhase) -> impl Iterator<Item = &UnsignedTx> {
        self.unsigned_txs.iter().filter(move |tx| tx.phase == phase)
    }

    pub fn presigned_for(&self, phase: RampPhase) -> impl Iterator<Item = &PresignedTx> {
        self.presigned_txs
            .iter()
            .flatten()
            .filter(move |tx| tx.phase == phase)
    }

    /// First presigned transaction for `phase`
    pub fn presigned_tx(&self, phase: RampPhase) -> Option<&PresignedTx> {
        self.presigned_for(phase).next()
    }

    /// Whether the ramp expects a client-signed transaction for `phase`
    pub fn expects_signature(&self, phase: RampPhase) -> bool {
        self.unsigned_for(phase).next().is_some()
    }

    /// Apply `update`, validating everything before mutating anything
    pub fn apply(&mut self, update: RampUpdate) -> RampResult<()> {
        if let Some(ref presigned) = update.presigned_txs {
            if let Some(ref existing) = self.presigned_txs {
                if existing != presigned {
                    return Err(RampError::Validation(format!(
                        "ramp {} already has presigned transactions",
                        self.id
                    )));
                }
            }
            for tx in presigned {
                if !self.unsigned_txs.iter().any(|u| u.matches(tx)) {
                    return Err(RampError::Validation(format!(
                        "presigned transaction for {} on {} (nonce {}) has no unsigned counterpart",
                        tx.phase, tx.network, tx.nonce
                    )));
                }
            }
        }

        if let Some(ref transition) = update.transition {
            if self.current_phase != transition.from {
                return Err(RampError::PhaseMismatch {
                    expected: transition.from,
                    actual: self.current_phase,
                });
            }
            if self.route.next_phase(transition.from)? != Some(transition.to) {
                return Err(RampError::InvalidTransition {
                    from: transition.from,
                    to: transition.to,
                });
            }
        }

        let now = Utc::now();
        if let Some(presigned) = update.presigned_txs {
            self.presigned_txs = Some(presigned);
        }
        if let Some(patch) = update.metadata {
            self.metadata.merge(patch);
        }
        if let Some(transition) = update.transition {
            self.phase_history.push(PhaseHistoryEntry {
                phase: transition.to,
                timestamp: now,
                metadata: transition.metadata,
            });
            self.current_phase = transition.to;
        }
        if let Some(entry) = update.error_log {
            self.error_logs.push(entry);
        }
        self.updated_at = now;
        Ok(())
    }
}
