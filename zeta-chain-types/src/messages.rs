// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::cctx::CoinType;
use crate::error::{CrosschainError, CrosschainResult};
use crate::header::HeaderData;
use crate::proof::Proof;
use crate::MAX_MESSAGE_LENGTH;
use ethers::types::U256;
use ethers::utils::keccak256;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive, Display,
)]
#[repr(u8)]
pub enum ReceiveStatus {
    Success = 0,
    Failed = 1,
}

/// Vote for an observed inbound event on an external chain.
///
/// The ballot digest excludes `creator` and `in_block_height` so that every
/// validator observing the same event computes the same ballot ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVoteOnObservedInboundTx {
    pub creator: String,
    pub sender: String,
    pub sender_chain_id: i64,
    pub tx_origin: String,
    pub receiver: String,
    pub receiver_chain: i64,
    pub amount: U256,
    pub message: String,
    pub in_tx_hash: String,
    pub in_block_height: u64,
    pub gas_limit: u64,
    pub coin_type: CoinType,
    pub asset: String,
    pub event_index: u64,
}

impl MsgVoteOnObservedInboundTx {
    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.creator.is_empty() {
            return Err(CrosschainError::InvalidAddress("empty creator".to_string()));
        }
        if self.sender_chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.sender_chain_id));
        }
        if self.receiver_chain < 0 {
            return Err(CrosschainError::InvalidChainId(self.receiver_chain));
        }
        if self.message.len() > MAX_MESSAGE_LENGTH {
            return Err(CrosschainError::InvalidMessage(format!(
                "message is too long: {}",
                self.message.len()
            )));
        }
        Ok(())
    }

    pub fn digest(&self) -> String {
        let mut m = self.clone();
        m.creator = String::new();
        m.in_block_height = 0;
        let bytes = serde_json::to_vec(&m).expect("message encoding should not fail");
        format!("0x{}", hex::encode(keccak256(bytes)))
    }
}

/// Vote for an observed outbound transaction landed on an external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVoteOnObservedOutboundTx {
    pub creator: String,
    pub cctx_hash: String,
    pub outbound_tx_hash: String,
    pub observed_outbound_height: u64,
    pub observed_outbound_gas_used: u64,
    pub observed_outbound_effective_gas_price: U256,
    pub observed_outbound_gas_limit: u64,
    pub value_received: U256,
    pub status: ReceiveStatus,
    pub chain_id: i64,
    pub outbound_tx_tss_nonce: u64,
    pub coin_type: CoinType,
}

impl MsgVoteOnObservedOutboundTx {
    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.creator.is_empty() {
            return Err(CrosschainError::InvalidAddress("empty creator".to_string()));
        }
        if self.chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.chain_id));
        }
        Ok(())
    }

    pub fn digest(&self) -> String {
        let mut m = self.clone();
        m.creator = String::new();
        let bytes = serde_json::to_vec(&m).expect("message encoding should not fail");
        format!("0x{}", hex::encode(keccak256(bytes)))
    }
}

/// Submit a candidate hash for an outbound nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddToOutTxTracker {
    pub creator: String,
    pub chain_id: i64,
    pub nonce: u64,
    pub tx_hash: String,
    pub proof: Option<Proof>,
    pub block_hash: String,
    pub tx_index: i64,
}

impl MsgAddToOutTxTracker {
    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.chain_id));
        }
        if self.tx_hash.is_empty() {
            return Err(CrosschainError::InvalidMessage("empty tx hash".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddToOutTxTrackerResponse {
    /// True when the nonce's CCTX is no longer pending; the caller should
    /// discard any local state for the nonce.
    pub is_removed: bool,
}

/// Hint the observers to scan a specific inbound transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddToInTxTracker {
    pub creator: String,
    pub chain_id: i64,
    pub tx_hash: String,
    pub coin_type: CoinType,
    pub proof: Option<Proof>,
    pub block_hash: String,
    pub tx_index: i64,
}

impl MsgAddToInTxTracker {
    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.chain_id));
        }
        if self.tx_hash.is_empty() {
            return Err(CrosschainError::InvalidMessage("empty tx hash".to_string()));
        }
        Ok(())
    }
}

/// Vote an external block header into the header store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddBlockHeader {
    pub creator: String,
    pub chain_id: i64,
    pub block_hash: Vec<u8>,
    pub height: u64,
    pub header: HeaderData,
}

impl MsgAddBlockHeader {
    pub fn validate_basic(&self) -> CrosschainResult<()> {
        if self.chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.chain_id));
        }
        if self.block_hash.len() != 32 {
            return Err(CrosschainError::InvalidMessage(format!(
                "block hash must be 32 bytes, got {}",
                self.block_hash.len()
            )));
        }
        // parent hash must be decodable from the raw header
        self.header
            .parent_hash()
            .map_err(|e| CrosschainError::NoParentHash(e.to_string()))?;
        Ok(())
    }

    pub fn digest(&self) -> String {
        let mut m = self.clone();
        m.creator = String::new();
        let bytes = serde_json::to_vec(&m).expect("message encoding should not fail");
        format!("0x{}", hex::encode(keccak256(bytes)))
    }
}

/// Admin: sweep TSS funds to a freshly rotated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMigrateTssFunds {
    pub creator: String,
    pub chain_id: i64,
    pub amount: U256,
}

/// Admin: flip protocol-wide crosschain switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateCrosschainFlags {
    pub creator: String,
    pub is_inbound_enabled: bool,
    pub is_outbound_enabled: bool,
    pub gas_price_increase_flags: Option<GasPriceIncreaseFlags>,
    pub block_header_verification_flags: Option<BlockHeaderVerificationFlags>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceIncreaseFlags {
    /// Blocks a CCTX may stay pending before its fee is bumped.
    pub epoch_length: i64,
    /// Pending duration that triggers a bump, seconds.
    pub retry_interval_seconds: u64,
    pub gas_price_increase_percent: u32,
    pub gas_price_increase_max: u32,
    pub max_pending_cctxs: u32,
}

impl Default for GasPriceIncreaseFlags {
    fn default() -> Self {
        Self {
            epoch_length: 100,
            retry_interval_seconds: 600,
            gas_price_increase_percent: 100,
            gas_price_increase_max: 500,
            max_pending_cctxs: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderVerificationFlags {
    pub is_eth_type_chain_enabled: bool,
    pub is_btc_type_chain_enabled: bool,
}

/// Admin: abort a stuck pending CCTX.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAbortStuckCctx {
    pub creator: String,
    pub cctx_index: String,
}

/// Gas price sample pushed by the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgGasPriceVoter {
    pub creator: String,
    pub chain_id: i64,
    pub price: u64,
    pub block_number: u64,
    pub supply: String,
}
