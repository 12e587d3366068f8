//! Transaction submission and confirmation
//!
//! Sends one transfer from the genesis miner to the validators contract and
//! waits for it to be mined. Every failure is fatal to the calling scenario.

use alloy_primitives::{Address, B256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use log::info;
use tokio::time::{Duration, Instant};

use crate::config::defaults;
use crate::rpc::EthRpc;
use crate::transaction::{parse_private_key, TransferBuilder};
use crate::waiters::{wait_for_receipt, WaitTimeout};

/// A transfer that made it into a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinedTransfer {
    pub hash: B256,
    pub block_number: u64,
    pub nonce: u64,
}

/// Sender, transfer template and polling cadence for submissions
pub struct Submitter {
    signer: PrivateKeySigner,
    builder: TransferBuilder,
    poll_interval: Duration,
}

impl Submitter {
    pub fn new(signer: PrivateKeySigner, builder: TransferBuilder, poll_interval: Duration) -> Self {
        Self {
            signer,
            builder,
            poll_interval,
        }
    }

    /// The genesis miner sending 1 ether to the validators contract
    pub fn from_miner_key(poll_interval: Duration) -> Result<Self> {
        let signer = parse_private_key(defaults::MINER_KEY).context("failed to convert key")?;
        Ok(Self::new(signer, TransferBuilder::default(), poll_interval))
    }

    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// Submit a fresh transfer and wait until it is mined or `deadline` passes
    pub async fn send_and_wait<R: EthRpc + ?Sized>(
        &self,
        rpc: &R,
        deadline: Instant,
    ) -> Result<MinedTransfer> {
        let sender = self.sender();
        let nonce = rpc
            .pending_nonce_at(sender)
            .await
            .context("failed to get nonce")?;

        let signed = self.builder.sign(&self.signer, nonce).await?;

        let accepted = rpc
            .send_raw_transaction(&signed.raw)
            .await
            .context("failed to send tx")?;
        if accepted != signed.hash {
            log::warn!(
                "Node reported hash {} for transaction {}",
                accepted,
                signed.hash
            );
        }

        let (_, block_number) = wait_for_receipt(rpc, signed.hash, deadline, self.poll_interval)
            .await
            .map_err(|e| {
                if e.is::<WaitTimeout>() {
                    e.context("timeout when getting receipt")
                } else {
                    e
                }
            })?;

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Transaction {} from {} (nonce {}) mined in block {}",
                signed.hash, sender, nonce, block_number
            );
        }

        Ok(MinedTransfer {
            hash: signed.hash,
            block_number,
            nonce,
        })
    }
}
