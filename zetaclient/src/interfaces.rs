// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The seams of the daemon: chain RPC adapters, the ZetaCore client and the
//! opaque TSS signer. Observers, confirmers and signers depend only on these
//! traits, which keeps each per-chain task testable in isolation.

use crate::error::ClientResult;
use async_trait::async_trait;
use bitcoin::Network;
use ethers::types::{
    Address as EthAddress, Block, Bytes, Log, Transaction, TransactionReceipt, TxHash, H256, U256,
};
use zeta_chain_types::{
    BlockHeaderState, ChainParams, CrossChainTx, InTxTracker, MsgAddBlockHeader,
    MsgAddToOutTxTracker, MsgGasPriceVoter, MsgVoteOnObservedInboundTx,
    MsgVoteOnObservedOutboundTx, OutTxTracker,
};
use zeta_crosschain::CrosschainFlags;

/// Uniform view over an EVM chain. Implementations validate responses
/// before returning so downstream code never sees half-populated records.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Current tip height.
    async fn block_number(&self) -> ClientResult<u64>;

    async fn header_by_number(&self, number: u64) -> ClientResult<Block<TxHash>>;

    /// Block with full transaction bodies.
    async fn block_by_number(&self, number: u64) -> ClientResult<Block<Transaction>>;

    /// Returns `(tx, is_pending)`.
    async fn transaction_by_hash(&self, hash: H256) -> ClientResult<(Transaction, bool)>;

    /// `Ok(None)` when the transaction is not yet mined.
    async fn transaction_receipt(&self, hash: H256) -> ClientResult<Option<TransactionReceipt>>;

    async fn suggest_gas_price(&self) -> ClientResult<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256>;

    /// Logs emitted by `address` with `topic0` in `[from, to]`.
    async fn filter_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: EthAddress,
        topic0: H256,
    ) -> ClientResult<Vec<Log>>;
}

/// Uniform view over a Bitcoin chain.
#[async_trait]
pub trait BtcRpc: Send + Sync {
    async fn get_block_count(&self) -> ClientResult<u64>;

    async fn get_block_hash(&self, height: u64) -> ClientResult<bitcoin::BlockHash>;

    async fn get_block(&self, hash: &bitcoin::BlockHash) -> ClientResult<bitcoin::Block>;

    /// Returns `(tx, confirmations)`; zero confirmations means mempool.
    async fn get_raw_transaction(
        &self,
        txid: &bitcoin::Txid,
    ) -> ClientResult<(bitcoin::Transaction, u64)>;

    async fn send_raw_transaction(&self, tx: &bitcoin::Transaction) -> ClientResult<bitcoin::Txid>;

    /// Fee rate estimate in sat/vB.
    async fn estimate_fee_rate(&self) -> ClientResult<u64>;
}

/// RPC surface of the crosschain module as seen by this validator.
#[async_trait]
pub trait ZetaCoreClient: Send + Sync {
    /// The validator account used as `creator` on votes.
    fn operator_address(&self) -> String;

    async fn post_vote_inbound(&self, msg: MsgVoteOnObservedInboundTx) -> ClientResult<String>;

    async fn post_vote_outbound(&self, msg: MsgVoteOnObservedOutboundTx) -> ClientResult<String>;

    async fn post_gas_price(&self, msg: MsgGasPriceVoter) -> ClientResult<()>;

    async fn post_add_block_header(&self, msg: MsgAddBlockHeader) -> ClientResult<()>;

    /// Returns true when the nonce's CCTX is no longer pending and the
    /// caller should discard local state for it.
    async fn add_to_out_tx_tracker(&self, msg: MsgAddToOutTxTracker) -> ClientResult<bool>;

    async fn get_all_out_tx_trackers(&self, chain_id: i64) -> ClientResult<Vec<OutTxTracker>>;

    async fn get_in_tx_trackers(&self, chain_id: i64) -> ClientResult<Vec<InTxTracker>>;

    async fn get_pending_cctxs(&self, chain_id: i64) -> ClientResult<Vec<CrossChainTx>>;

    async fn get_cctx_by_nonce(&self, chain_id: i64, nonce: u64)
        -> ClientResult<Option<CrossChainTx>>;

    async fn get_crosschain_flags(&self) -> ClientResult<CrosschainFlags>;

    async fn get_chain_params(&self, chain_id: i64) -> ClientResult<ChainParams>;

    async fn get_block_header_state(&self, chain_id: i64)
        -> ClientResult<Option<BlockHeaderState>>;

    async fn get_zeta_block_height(&self) -> ClientResult<u64>;
}

/// A recoverable secp256k1 signature produced by the TSS network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TssSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl TssSignature {
    pub fn compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

/// The threshold signer shared by the validator set. Opaque: the protocol
/// rounds happen elsewhere; callers only see `sign` block until the quorum
/// produced a signature (or the request is cancelled with the task).
#[async_trait]
pub trait TssSigner: Send + Sync {
    /// Identifier of the active TSS key.
    fn pubkey(&self) -> String;

    fn evm_address(&self) -> EthAddress;

    /// Compressed secp256k1 public key, for Bitcoin witnesses.
    fn btc_pubkey(&self) -> [u8; 33];

    fn btc_address(&self, network: Network) -> ClientResult<bitcoin::Address>;

    async fn sign(&self, digest: [u8; 32]) -> ClientResult<TssSignature>;
}
