// Waiter primitives
//
// Deadline-bounded polling. A probe is retried at a fixed interval until it
// produces a value, fails, or the deadline passes. Probe errors are not
// retried: the only tolerated "not yet" answer is `Ok(None)`.

use std::future::Future;

use alloy_primitives::B256;
use anyhow::{Context, Result};
use log::debug;
use thiserror::Error;
use tokio::time::{sleep, timeout_at, Duration, Instant};

use crate::rpc::{EthRpc, Receipt};

/// The deadline passed before the awaited condition held
#[derive(Debug, Error)]
#[error("Timeout waiting for {what} after {elapsed:?}")]
pub struct WaitTimeout {
    pub what: String,
    pub elapsed: Duration,
}

/// Poll `probe` every `interval` until it returns `Some`, or fail once
/// `deadline` is reached.
///
/// # Arguments
///
/// * `deadline` - Instant after which waiting is abandoned
/// * `interval` - Delay between two probes
/// * `what` - Description used in the timeout error
/// * `probe` - Returns `Ok(Some(_))` when done, `Ok(None)` to keep waiting
///
/// # Errors
///
/// The first probe error, unchanged, or a [`WaitTimeout`] naming `what`.
pub async fn poll_until<T, F, Fut>(
    deadline: Instant,
    interval: Duration,
    what: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let mut attempts = 0u64;

    timeout_at(deadline, async {
        loop {
            attempts += 1;
            if let Some(value) = probe().await? {
                return Ok(value);
            }
            if log::log_enabled!(log::Level::Debug) {
                debug!("Still waiting for {} (attempt {})", what, attempts);
            }
            sleep(interval).await;
        }
    })
    .await
    .map_err(|_| WaitTimeout {
        what: what.to_string(),
        elapsed: Instant::now().saturating_duration_since(started),
    })?
}

/// Wait until the receipt of `hash` reports the block it was mined in.
///
/// A receipt the node does not know yet, or one without a block number,
/// means "keep waiting". Any RPC error aborts the wait.
///
/// # Returns
///
/// The receipt and its block number.
pub async fn wait_for_receipt<R: EthRpc + ?Sized>(
    rpc: &R,
    hash: B256,
    deadline: Instant,
    interval: Duration,
) -> Result<(Receipt, u64)> {
    poll_until(deadline, interval, "transaction receipt", || async move {
        let receipt = rpc
            .transaction_receipt(hash)
            .await
            .context("failed to get receipt")?;
        Ok(receipt.and_then(|r| r.mined_at().map(|block| (r, block))))
    })
    .await
}
