//! Test transfer construction and signing

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_network::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use hex::FromHex;
use log::debug;

use crate::config::defaults;

/// Parse a 32-byte hex private key, with or without `0x`
pub fn parse_private_key(key: &str) -> Result<PrivateKeySigner> {
    let key = key.strip_prefix("0x").unwrap_or(key);
    let bytes = <[u8; 32]>::from_hex(key)
        .map_err(|e| anyhow!("invalid private key (expected 32-byte hex): {e}"))?;
    PrivateKeySigner::from_slice(&bytes).context("invalid secp256k1 private key")
}

/// Builder for the legacy value transfers the scenarios submit
#[derive(Debug, Clone)]
pub struct TransferBuilder {
    chain_id: u64,
    to: Address,
    value: U256,
    gas_limit: u64,
    gas_price: u128,
}

impl Default for TransferBuilder {
    fn default() -> Self {
        Self::new(defaults::CHAIN_ID, defaults::VALIDATORS_CONTRACT)
    }
}

impl TransferBuilder {
    /// 1 ether, 500k gas at 100 gwei, to `to` on `chain_id`
    pub fn new(chain_id: u64, to: Address) -> Self {
        Self {
            chain_id,
            to,
            value: U256::from(defaults::TRANSFER_VALUE_WEI),
            gas_limit: defaults::TRANSFER_GAS_LIMIT,
            gas_price: defaults::TRANSFER_GAS_PRICE_WEI,
        }
    }

    /// Unsigned legacy transaction; the chain id makes the signature
    /// replay-protected (EIP-155)
    pub fn build(&self, nonce: u64) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: Bytes::default(),
        }
    }

    /// Build and sign the transfer for `nonce`
    pub async fn sign(&self, signer: &PrivateKeySigner, nonce: u64) -> Result<SignedTransfer> {
        let mut tx = self.build(nonce);
        let signature = signer
            .sign_transaction(&mut tx)
            .await
            .context("failed to sign tx")?;
        let envelope: TxEnvelope = tx.into_signed(signature).into();

        let signed = SignedTransfer {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718(),
            envelope,
        };
        debug!("Signed transfer {} with nonce {nonce}", signed.hash);
        Ok(signed)
    }
}

/// A signed transfer ready for `eth_sendRawTransaction`
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub hash: B256,
    pub raw: Vec<u8>,
    pub envelope: TxEnvelope,
}
