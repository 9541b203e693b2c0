// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::U256;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Asset class carried by a CCTX.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, Display,
)]
#[repr(u8)]
pub enum CoinType {
    Zeta = 0,
    Gas = 1,
    Erc20 = 2,
    /// Administrative command outbound (e.g. TSS fund migration); amount
    /// checks are bypassed for this type.
    Cmd = 3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, Display,
)]
#[repr(u8)]
pub enum CctxStatus {
    PendingInbound = 0,
    PendingOutbound = 1,
    OutboundMined = 3,
    PendingRevert = 4,
    Reverted = 5,
    Aborted = 6,
}

impl CctxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CctxStatus::OutboundMined | CctxStatus::Reverted | CctxStatus::Aborted
        )
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TryFromPrimitive, Display,
)]
#[repr(u8)]
pub enum TxFinalizationStatus {
    NotFinalized = 0,
    Finalized = 1,
    Executed = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundTxParams {
    pub sender: String,
    pub sender_chain_id: i64,
    pub tx_origin: String,
    pub asset: String,
    pub amount: U256,
    pub coin_type: CoinType,
    pub inbound_tx_observed_hash: String,
    pub inbound_tx_observed_external_height: u64,
    pub inbound_tx_finalized_zeta_height: u64,
    pub inbound_tx_ballot_index: String,
    pub tx_finalization_status: TxFinalizationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundTxParams {
    pub receiver: String,
    pub receiver_chain_id: i64,
    pub coin_type: CoinType,
    pub amount: U256,
    pub outbound_tx_tss_nonce: u64,
    pub outbound_tx_gas_limit: u64,
    pub outbound_tx_gas_price: String,
    pub outbound_tx_hash: String,
    pub outbound_tx_ballot_index: String,
    pub outbound_tx_observed_external_height: u64,
    pub outbound_tx_gas_used: u64,
    pub outbound_tx_effective_gas_price: U256,
    pub tss_pubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status: CctxStatus,
    pub status_message: String,
    pub last_update_timestamp: i64,
    pub is_abort_refunded: bool,
}

/// The cross-chain transaction record, the central entity of the crosschain
/// module. Created by the inbound-vote handler on ballot finalization and
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainTx {
    pub creator: String,
    pub index: String,
    pub zeta_fees: U256,
    pub relayed_message: String,
    pub cctx_status: Status,
    pub inbound_tx_params: InboundTxParams,
    pub outbound_tx_params: Vec<OutboundTxParams>,
}

impl CrossChainTx {
    /// The active outbound attempt. A CCTX always carries at least one
    /// outbound entry from creation; a revert appends a second.
    pub fn current_outbound(&self) -> &OutboundTxParams {
        self.outbound_tx_params
            .last()
            .expect("cctx must have at least one outbound param")
    }

    pub fn current_outbound_mut(&mut self) -> &mut OutboundTxParams {
        self.outbound_tx_params
            .last_mut()
            .expect("cctx must have at least one outbound param")
    }

    pub fn is_pending(&self) -> bool {
        self.cctx_status.status.is_pending()
    }

    /// Amount credited to the aborted-ZETA accounting when this CCTX aborts.
    pub fn aborted_amount(&self) -> U256 {
        let outbound = self.current_outbound();
        if !outbound.amount.is_zero() {
            return outbound.amount;
        }
        self.inbound_tx_params.amount
    }

    pub fn log_identifier(&self) -> String {
        let outbound = self.current_outbound();
        format!(
            "{}-{}-{}-{}",
            self.inbound_tx_params.sender,
            self.inbound_tx_params.sender_chain_id,
            outbound.receiver_chain_id,
            outbound.outbound_tx_tss_nonce
        )
    }
}

/// Maps an external inbound hash to every CCTX it originated. One external
/// transaction can generate multiple CCTXs when it carries multiple events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTxHashToCctx {
    pub in_tx_hash: String,
    pub cctx_index: Vec<String>,
}

/// One candidate hash inside an outbound tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHashOnTracker {
    pub tx_hash: String,
    pub tx_signer: String,
    pub proved: bool,
}

/// The nonce → candidate-hash tracker for one outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutTxTracker {
    pub chain_id: i64,
    pub nonce: u64,
    pub hash_list: Vec<TxHashOnTracker>,
}

impl OutTxTracker {
    pub fn contains_hash(&self, tx_hash: &str) -> bool {
        self.hash_list
            .iter()
            .any(|h| h.tx_hash.eq_ignore_ascii_case(tx_hash))
    }
}

/// A hint for the observer to scan a specific external transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTxTracker {
    pub chain_id: i64,
    pub tx_hash: String,
    pub coin_type: CoinType,
}

/// Binds one pending CCTX to its `(tss, chain, nonce)` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceToCctx {
    pub chain_id: i64,
    pub nonce: u64,
    pub cctx_index: String,
    pub tss_pubkey: String,
}

/// Next nonce to assign per chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNonces {
    pub chain_id: i64,
    pub nonce: u64,
}

/// Median gas price samples reported by observers, per chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrice {
    pub chain_id: i64,
    pub signers: Vec<String>,
    pub block_nums: Vec<u64>,
    pub prices: Vec<u64>,
    pub median_index: u64,
}

impl GasPrice {
    pub fn median_price(&self) -> Option<u64> {
        self.prices.get(self.median_index as usize).copied()
    }
}

/// Highest external block height recorded from finalized outbound votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBlockHeight {
    pub chain_id: i64,
    pub last_send_height: u64,
    pub last_receive_height: u64,
}

/// Aggregate amount of ZETA locked in aborted CCTXs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZetaAccounting {
    pub aborted_zeta_amount: U256,
}

pub fn finalized_inbound_key(chain_id: i64, tx_hash: &str, event_index: u64) -> String {
    format!("{chain_id}-{tx_hash}-{event_index}")
}
