//! Bounded polling for confirmations and arrivals
//!
//! A submitted transaction only counts once it is observed as committed. Every wait has
//! a fixed poll interval and an overall timeout; transient RPC errors are tolerated
//! until the timeout, anything else ends the wait immediately.

use super::{ChainClient, TxStatus};
use crate::error::{RampError, RampResult};
use crate::ramp::AssetId;

use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Poll `check` until it yields a value, a non-retryable error occurs, or `timeout` passes
pub async fn wait_until<T, F, Fut>(
    operation: &str,
    poll_interval: Duration,
    timeout: Duration,
    mut check: F,
) -> RampResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RampResult<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error: Option<RampError> = None;

    loop {
        match check().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if e.is_retryable() => {
                warn!("Polling {} failed, retrying: {}", operation, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Err(match last_error {
                Some(RampError::ExternalChain { network, message }) => RampError::ExternalChain {
                    network,
                    message: format!("{} timed out: {}", operation, message),
                },
                _ => RampError::Timeout {
                    operation: operation.to_string(),
                },
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Wait until `hash` is confirmed; returns the including block
pub async fn wait_for_confirmation(
    client: &dyn ChainClient,
    hash: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> RampResult<u64> {
    let network = client.network();

    let block = wait_until(
        &format!("confirmation of {} on {}", hash, network),
        poll_interval,
        timeout,
        || async move {
            match client.tx_status(hash).await? {
                TxStatus::Confirmed { block } => Ok(Some(block)),
                TxStatus::Failed { reason } => Err(RampError::Unrecoverable(format!(
                    "transaction {} failed on {}: {}",
                    hash, network, reason
                ))),
                TxStatus::Pending | TxStatus::NotFound => {
                    debug!("Transaction {} on {} not yet confirmed", hash, network);
                    Ok(None)
                }
            }
        },
    )
    .await?;

    info!("Transaction {} confirmed on {} (block {})", hash, network, block);
    Ok(block)
}

/// Wait until `account` holds at least `minimum` of `asset`; returns the observed balance
pub async fn wait_for_balance(
    client: &dyn ChainClient,
    account: &str,
    asset: &AssetId,
    minimum: Decimal,
    poll_interval: Duration,
    timeout: Duration,
) -> RampResult<Decimal> {
    let network = client.network();

    wait_until(
        &format!("{} of {} at {} on {}", minimum, asset, account, network),
        poll_interval,
        timeout,
        || async move {
            let balance = client.balance(account, asset).await?;
            Ok((balance >= minimum).then_some(balance))
        },
    )
    .await
}
