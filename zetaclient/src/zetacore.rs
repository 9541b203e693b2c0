// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZetaCore client implementations. `InProcessZetaCore` drives a local
//! keeper directly: it backs single-process deployments and every test; a
//! network-attached implementation plugs in behind the same trait.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::ZetaCoreClient;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use zeta_chain_types::{
    BlockHeaderState, ChainParams, CrossChainTx, CrosschainError, InTxTracker, MsgAddBlockHeader,
    MsgAddToOutTxTracker, MsgGasPriceVoter, MsgVoteOnObservedInboundTx,
    MsgVoteOnObservedOutboundTx, OutTxTracker,
};
use zeta_crosschain::{CrosschainFlags, CrosschainKeeper};

pub struct InProcessZetaCore {
    keeper: Arc<Mutex<CrosschainKeeper>>,
    operator: String,
}

impl InProcessZetaCore {
    pub fn new(keeper: Arc<Mutex<CrosschainKeeper>>, operator: &str) -> Self {
        Self {
            keeper,
            operator: operator.to_string(),
        }
    }

    pub fn keeper(&self) -> Arc<Mutex<CrosschainKeeper>> {
        self.keeper.clone()
    }
}

#[async_trait]
impl ZetaCoreClient for InProcessZetaCore {
    fn operator_address(&self) -> String {
        self.operator.clone()
    }

    async fn post_vote_inbound(&self, msg: MsgVoteOnObservedInboundTx) -> ClientResult<String> {
        let mut keeper = self.keeper.lock().await;
        match keeper.vote_on_observed_inbound_tx(&msg) {
            Ok(ballot) => Ok(ballot),
            // replays and double votes are benign from the observer's side
            Err(CrosschainError::ObservedTxAlreadyFinalized(b))
            | Err(CrosschainError::DuplicateVote(b)) => Ok(b),
            Err(e) => Err(e.into()),
        }
    }

    async fn post_vote_outbound(&self, msg: MsgVoteOnObservedOutboundTx) -> ClientResult<String> {
        let mut keeper = self.keeper.lock().await;
        match keeper.vote_on_observed_outbound_tx(&msg) {
            Ok(ballot) => Ok(ballot),
            Err(CrosschainError::ObservedTxAlreadyFinalized(b))
            | Err(CrosschainError::DuplicateVote(b)) => Ok(b),
            Err(e) => Err(e.into()),
        }
    }

    async fn post_gas_price(&self, msg: MsgGasPriceVoter) -> ClientResult<()> {
        let mut keeper = self.keeper.lock().await;
        keeper.gas_price_voter(&msg)?;
        Ok(())
    }

    async fn post_add_block_header(&self, msg: MsgAddBlockHeader) -> ClientResult<()> {
        let mut keeper = self.keeper.lock().await;
        match keeper.add_block_header(&msg) {
            Ok(()) => Ok(()),
            // another validator's vote finalized this header first
            Err(CrosschainError::ObservedTxAlreadyFinalized(_))
            | Err(CrosschainError::DuplicateVote(_))
            | Err(CrosschainError::BlockAlreadyExist(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_to_out_tx_tracker(&self, msg: MsgAddToOutTxTracker) -> ClientResult<bool> {
        let mut keeper = self.keeper.lock().await;
        let response = keeper.add_to_out_tx_tracker(&msg)?;
        Ok(response.is_removed)
    }

    async fn get_all_out_tx_trackers(&self, chain_id: i64) -> ClientResult<Vec<OutTxTracker>> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.get_all_out_tx_tracker_by_chain(chain_id))
    }

    async fn get_in_tx_trackers(&self, chain_id: i64) -> ClientResult<Vec<InTxTracker>> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.get_all_in_tx_tracker_by_chain(chain_id))
    }

    async fn get_pending_cctxs(&self, chain_id: i64) -> ClientResult<Vec<CrossChainTx>> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.get_pending_cctxs(chain_id))
    }

    async fn get_cctx_by_nonce(
        &self,
        chain_id: i64,
        nonce: u64,
    ) -> ClientResult<Option<CrossChainTx>> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.get_cctx_by_nonce(chain_id, nonce))
    }

    async fn get_crosschain_flags(&self) -> ClientResult<CrosschainFlags> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.flags.clone())
    }

    async fn get_chain_params(&self, chain_id: i64) -> ClientResult<ChainParams> {
        let keeper = self.keeper.lock().await;
        keeper
            .chain_params
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| ClientError::Core(CrosschainError::UnsupportedChain(chain_id)))
    }

    async fn get_block_header_state(
        &self,
        chain_id: i64,
    ) -> ClientResult<Option<BlockHeaderState>> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.get_block_header_state(chain_id))
    }

    async fn get_zeta_block_height(&self) -> ClientResult<u64> {
        let keeper = self.keeper.lock().await;
        Ok(keeper.zeta_block_height())
    }
}
