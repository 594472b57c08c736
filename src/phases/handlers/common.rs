//! Submission helpers shared by the handlers

use crate::chain::{wait_for_confirmation, ChainClient, TxStatus};
use crate::error::{RampError, RampResult};
use crate::phases::handler::PhaseDeps;
use crate::ramp::{FundingTx, PresignedTx, RampMetadata, RampPhase, RampState, RampUpdate};
use crate::tx::{NonceLease, SignedTx};

use tracing::{info, warn};

/// Broadcast `encoded`, retrying transient failures
///
/// Rebroadcasting the same signed bytes is harmless: the nonce lets at most one copy land.
pub async fn submit_with_retry(
    deps: &PhaseDeps,
    client: &dyn ChainClient,
    encoded: &str,
) -> RampResult<String> {
    let max_attempts = deps.submit_retries.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match client.submit(encoded).await {
            Ok(hash) => {
                info!(
                    "Transaction {} sent on {} (attempt {}/{})",
                    hash,
                    client.network(),
                    attempts,
                    max_attempts
                );
                return Ok(hash);
            }
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                warn!(
                    "Submission on {} failed (attempt {}/{}): {}",
                    client.network(),
                    attempts,
                    max_attempts,
                    e
                );
                tokio::time::sleep(deps.retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Persist the hash of a client-signed transaction so a restart sees it in flight
pub async fn record_submission(
    deps: &PhaseDeps,
    state: &RampState,
    phase: RampPhase,
    hash: &str,
) -> RampResult<()> {
    deps.store
        .update(state.id, RampUpdate::metadata(RampMetadata::with_submitted_hash(phase, hash)))
        .await?;
    Ok(())
}

/// Persist a signed funding transaction, then broadcast it
///
/// The record lands before any node sees the bytes, so a crash after the broadcast
/// resumes from the recorded hash instead of signing and paying a second time. From
/// the moment it is recorded the transaction owns its nonce.
pub async fn record_and_submit(
    deps: &PhaseDeps,
    client: &dyn ChainClient,
    state: &RampState,
    phase: RampPhase,
    signed: SignedTx,
    lease: NonceLease,
) -> RampResult<FundingTx> {
    let record = FundingTx {
        phase,
        network: client.network(),
        hash: signed.hash,
        encoded: signed.encoded,
    };
    deps.store
        .update(state.id, RampUpdate::metadata(RampMetadata::with_funding_tx(record.clone())))
        .await?;
    lease.commit();

    let hash = submit_with_retry(deps, client, &record.encoded).await?;
    if !hash.eq_ignore_ascii_case(&record.hash) {
        warn!(
            ramp_id = %state.id,
            phase = %phase,
            "Node reported hash {} for transaction recorded as {}",
            hash,
            record.hash
        );
    }
    Ok(record)
}

/// Broadcast a recorded transaction again if the chain has never seen it
///
/// Covers a crash between recording and broadcasting. A copy already known to the node
/// is left alone.
pub async fn rebroadcast_if_unseen(
    deps: &PhaseDeps,
    client: &dyn ChainClient,
    state: &RampState,
    phase: RampPhase,
    hash: &str,
    encoded: &str,
) -> RampResult<()> {
    if client.tx_status(hash).await? != TxStatus::NotFound {
        info!(ramp_id = %state.id, phase = %phase, "Transaction {} already in flight", hash);
        return Ok(());
    }

    info!(
        ramp_id = %state.id,
        phase = %phase,
        "Recorded transaction {} never reached {}, broadcasting it",
        hash,
        client.network()
    );
    submit_with_retry(deps, client, encoded).await?;
    Ok(())
}

/// Whether the presigned transaction's effect has landed
///
/// A known hash (recorded, or derived from the signed bytes) settles it by its receipt:
/// only a confirmed transaction counts, a reverted one does not. Without a hash the
/// signer's nonce having moved past the transaction's nonce means it was included.
pub async fn presigned_landed(
    deps: &PhaseDeps,
    state: &RampState,
    tx: &PresignedTx,
) -> RampResult<bool> {
    let client = deps.chains.get(tx.network)?;

    let known = match state.metadata.submitted_hash(tx.phase) {
        Some(hash) => Some(hash.to_string()),
        None => client.tx_hash(tx.tx_data.encoded(tx.phase)?),
    };
    if let Some(hash) = known {
        return Ok(matches!(client.tx_status(&hash).await?, TxStatus::Confirmed { .. }));
    }

    Ok(client.next_nonce(&tx.signer).await? > tx.nonce)
}

/// Submit a presigned transaction at most once and wait for it to be confirmed
///
/// Where the hash can be derived from the signed bytes it is recorded before the
/// broadcast, and the receipt decides the outcome: a reverted transaction fails the
/// phase even if its nonce is spent.
pub async fn submit_presigned_once(
    deps: &PhaseDeps,
    state: &RampState,
    tx: &PresignedTx,
) -> RampResult<()> {
    let phase = tx.phase;
    let client = deps.chains.get(tx.network)?;
    let encoded = tx.tx_data.encoded(phase)?;

    let hash = match state.metadata.submitted_hash(phase) {
        Some(hash) => {
            // hashes that are derivable were recorded before their broadcast
            if client.tx_hash(encoded).is_some() {
                rebroadcast_if_unseen(deps, client.as_ref(), state, phase, hash, encoded).await?;
            }
            hash.to_string()
        }
        None => match client.tx_hash(encoded) {
            Some(hash) => {
                record_submission(deps, state, phase, &hash).await?;
                if client.tx_status(&hash).await? == TxStatus::NotFound {
                    if client.next_nonce(&tx.signer).await? > tx.nonce {
                        return Err(RampError::Unrecoverable(format!(
                            "nonce {} of {} was spent by a transaction other than {}",
                            tx.nonce, tx.signer, hash
                        )));
                    }
                    submit_with_retry(deps, client.as_ref(), encoded).await?;
                } else {
                    info!(
                        ramp_id = %state.id,
                        phase = %phase,
                        "Transaction {} already broadcast",
                        hash
                    );
                }
                hash
            }
            None => {
                if client.next_nonce(&tx.signer).await? > tx.nonce {
                    info!(
                        ramp_id = %state.id,
                        phase = %phase,
                        "Nonce {} of {} already used, not resubmitting",
                        tx.nonce,
                        tx.signer
                    );
                    return Ok(());
                }

                let hash = submit_with_retry(deps, client.as_ref(), encoded).await?;
                record_submission(deps, state, phase, &hash).await?;
                hash
            }
        },
    };

    wait_for_confirmation(
        client.as_ref(),
        &hash,
        deps.confirmation.poll_interval(),
        deps.confirmation.timeout(),
    )
    .await?;
    Ok(())
}

/// First presigned transaction for `phase`, if the client supplied one
pub fn presigned_or_missing(
    state: &RampState,
    phase: RampPhase,
) -> RampResult<Option<PresignedTx>> {
    match state.presigned_tx(phase) {
        Some(tx) => Ok(Some(tx.clone())),
        None if state.presigned_txs.is_none() => Ok(None),
        None => Err(RampError::Unrecoverable(format!(
            "no presigned transaction for phase {}",
            phase
        ))),
    }
}
