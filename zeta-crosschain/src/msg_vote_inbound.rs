// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Inbound vote handling: ballot bookkeeping, CCTX creation on finalization
//! and the coin-type specific deposit processing.

use crate::ballot::{ObservationType, VoteType};
use crate::keeper::CrosschainKeeper;
use ethers::types::U256;
use tracing::info;
use zeta_chain_types::{
    is_zeta_chain, CctxStatus, CoinType, CrossChainTx, CrosschainError, CrosschainResult,
    InboundTxParams, MsgVoteOnObservedInboundTx, OutboundTxParams, Status, TxFinalizationStatus,
};

impl CrosschainKeeper {
    /// Vote on an observed inbound event. Returns the ballot index.
    ///
    /// The first vote opens the ballot; the finalizing vote creates the CCTX
    /// and runs deposit processing. Votes arriving after finalization are
    /// rejected with `ObservedTxAlreadyFinalized`.
    pub fn vote_on_observed_inbound_tx(
        &mut self,
        msg: &MsgVoteOnObservedInboundTx,
    ) -> CrosschainResult<String> {
        msg.validate_basic()?;
        if msg.message.len() > self.params.max_message_length {
            return Err(CrosschainError::InvalidMessage(format!(
                "message is too long: {}",
                msg.message.len()
            )));
        }
        if !self.flags.is_inbound_enabled {
            return Err(CrosschainError::InboundDisabled);
        }
        if !self.is_observer(&msg.creator) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        self.supported_chain_params(msg.sender_chain_id)?;
        self.supported_chain_params(msg.receiver_chain)?;

        let index = msg.digest();
        let ballot = self.find_or_create_ballot(&index, ObservationType::InboundTx);
        if ballot.is_finalized() {
            return Err(CrosschainError::ObservedTxAlreadyFinalized(index));
        }
        let finalized_now = ballot.add_vote(&msg.creator, VoteType::SuccessObservation)?;
        if !finalized_now {
            return Ok(index);
        }

        // Ballot finalized: consume the event exactly once.
        if self.is_finalized_inbound(msg.sender_chain_id, &msg.in_tx_hash, msg.event_index) {
            return Err(CrosschainError::ObservedTxAlreadyFinalized(format!(
                "{}-{}-{}",
                msg.sender_chain_id, msg.in_tx_hash, msg.event_index
            )));
        }
        self.set_finalized_inbound(msg.sender_chain_id, &msg.in_tx_hash, msg.event_index);

        let mut cctx = self.create_new_cctx(msg, &index);
        self.process_finalized_inbound(&mut cctx, msg);
        self.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        info!(
            %index,
            status = %cctx.cctx_status.status,
            "inbound ballot finalized, cctx created"
        );
        Ok(index)
    }

    fn create_new_cctx(&self, msg: &MsgVoteOnObservedInboundTx, index: &str) -> CrossChainTx {
        let tx_origin = if msg.tx_origin.is_empty() {
            msg.sender.clone()
        } else {
            msg.tx_origin.clone()
        };
        CrossChainTx {
            creator: msg.creator.clone(),
            index: index.to_string(),
            zeta_fees: U256::zero(),
            relayed_message: msg.message.clone(),
            cctx_status: Status {
                status: CctxStatus::PendingInbound,
                status_message: String::new(),
                last_update_timestamp: self.block_time_unix(),
                is_abort_refunded: false,
            },
            inbound_tx_params: InboundTxParams {
                sender: msg.sender.clone(),
                sender_chain_id: msg.sender_chain_id,
                tx_origin,
                asset: msg.asset.clone(),
                amount: msg.amount,
                coin_type: msg.coin_type,
                inbound_tx_observed_hash: msg.in_tx_hash.clone(),
                inbound_tx_observed_external_height: msg.in_block_height,
                inbound_tx_finalized_zeta_height: self.zeta_block_height(),
                inbound_tx_ballot_index: index.to_string(),
                tx_finalization_status: TxFinalizationStatus::Finalized,
            },
            outbound_tx_params: vec![OutboundTxParams {
                receiver: msg.receiver.clone(),
                receiver_chain_id: msg.receiver_chain,
                coin_type: msg.coin_type,
                amount: U256::zero(),
                outbound_tx_tss_nonce: 0,
                outbound_tx_gas_limit: msg.gas_limit,
                outbound_tx_gas_price: String::new(),
                outbound_tx_hash: String::new(),
                outbound_tx_ballot_index: String::new(),
                outbound_tx_observed_external_height: 0,
                outbound_tx_gas_used: 0,
                outbound_tx_effective_gas_price: U256::zero(),
                tss_pubkey: self.tss.tss_pubkey.clone(),
            }],
        }
    }

    /// Coin-type specific processing once the inbound ballot finalized.
    fn process_finalized_inbound(
        &mut self,
        cctx: &mut CrossChainTx,
        msg: &MsgVoteOnObservedInboundTx,
    ) {
        if is_zeta_chain(msg.receiver_chain) {
            self.process_zeta_deposit(cctx, msg);
        } else {
            self.process_external_outbound(cctx, msg);
        }
    }

    /// Deposit into ZetaChain; no external outbound is needed on success.
    fn process_zeta_deposit(&mut self, cctx: &mut CrossChainTx, msg: &MsgVoteOnObservedInboundTx) {
        match msg.coin_type {
            CoinType::Zeta => match self.fungible.deposit_zeta(&msg.receiver, msg.amount) {
                Ok(()) => mined(cctx, self.block_time_unix()),
                Err(e) => abort(cctx, self.block_time_unix(), &e.to_string()),
            },
            CoinType::Gas | CoinType::Erc20 => {
                let zrc20 = if msg.coin_type == CoinType::Gas {
                    self.fungible.gas_coin_zrc20(msg.sender_chain_id)
                } else {
                    self.fungible.zrc20_by_asset(msg.sender_chain_id, &msg.asset)
                };
                let zrc20 = match zrc20 {
                    Some(z) => z,
                    None => {
                        let err = CrosschainError::ForeignCoinNotFound(format!(
                            "chain {} asset {:?}",
                            msg.sender_chain_id, msg.asset
                        ));
                        return abort(cctx, self.block_time_unix(), &err.to_string());
                    }
                };

                // Liquidity cap: a deposit that would mint above the cap is
                // bounced back to the sender instead of finalizing the mint.
                let cap = self.fungible.liquidity_cap(&zrc20);
                if !cap.is_zero() && self.fungible.total_supply(&zrc20) + msg.amount > cap {
                    match self.fungible.mint_zrc20(&zrc20, &msg.sender, msg.amount) {
                        Ok(()) => revert_with_message(
                            cctx,
                            self.block_time_unix(),
                            "liquidity cap exceeded, deposit refunded",
                        ),
                        Err(e) => abort(cctx, self.block_time_unix(), &e.to_string()),
                    }
                    return;
                }

                let result = if msg.message.is_empty() {
                    self.fungible.mint_zrc20(&zrc20, &msg.receiver, msg.amount)
                } else {
                    self.fungible
                        .deposit_zrc20_and_call(&zrc20, &msg.receiver, msg.amount, &msg.message)
                };
                match result {
                    Ok(()) => mined(cctx, self.block_time_unix()),
                    Err(CrosschainError::ContractCall(reason)) => {
                        // Deposit-and-call reverted: bounce the asset back to
                        // the sender on the source chain.
                        self.schedule_external_revert(cctx, &reason);
                    }
                    Err(e) => abort(cctx, self.block_time_unix(), &e.to_string()),
                }
            }
            CoinType::Cmd => abort(
                cctx,
                self.block_time_unix(),
                "cmd cctx cannot target ZetaChain",
            ),
        }
    }

    /// The CCTX needs an external outbound; assign nonce and gas price.
    fn process_external_outbound(
        &mut self,
        cctx: &mut CrossChainTx,
        msg: &MsgVoteOnObservedInboundTx,
    ) {
        let median = match self.median_gas_price(msg.receiver_chain) {
            Some(price) => price,
            None => {
                return abort(
                    cctx,
                    self.block_time_unix(),
                    &format!("gas price not found for chain {}", msg.receiver_chain),
                )
            }
        };
        let nonce = self.get_and_increment_nonce(msg.receiver_chain);
        let time = self.block_time_unix();
        let outbound = cctx.current_outbound_mut();
        outbound.amount = msg.amount;
        outbound.outbound_tx_tss_nonce = nonce;
        outbound.outbound_tx_gas_price = median.to_string();
        cctx.cctx_status.status = CctxStatus::PendingOutbound;
        cctx.cctx_status.last_update_timestamp = time;
    }

    /// Append a revert outbound targeting the original sender on the source
    /// chain. Used when deposit processing fails after finalization.
    pub(crate) fn schedule_external_revert(&mut self, cctx: &mut CrossChainTx, reason: &str) {
        let sender_chain = cctx.inbound_tx_params.sender_chain_id;
        let median = match self.median_gas_price(sender_chain) {
            Some(price) => price,
            None => {
                return abort(
                    cctx,
                    self.block_time_unix(),
                    &format!("{reason}; gas price not found for revert chain {sender_chain}"),
                )
            }
        };
        let nonce = self.get_and_increment_nonce(sender_chain);
        let time = self.block_time_unix();
        let gas_limit = cctx.current_outbound().outbound_tx_gas_limit;
        cctx.outbound_tx_params.push(OutboundTxParams {
            receiver: cctx.inbound_tx_params.sender.clone(),
            receiver_chain_id: sender_chain,
            coin_type: cctx.inbound_tx_params.coin_type,
            amount: cctx.inbound_tx_params.amount,
            outbound_tx_tss_nonce: nonce,
            outbound_tx_gas_limit: gas_limit,
            outbound_tx_gas_price: median.to_string(),
            outbound_tx_hash: String::new(),
            outbound_tx_ballot_index: String::new(),
            outbound_tx_observed_external_height: 0,
            outbound_tx_gas_used: 0,
            outbound_tx_effective_gas_price: U256::zero(),
            tss_pubkey: self.tss.tss_pubkey.clone(),
        });
        cctx.cctx_status.status = CctxStatus::PendingRevert;
        cctx.cctx_status.status_message = reason.to_string();
        cctx.cctx_status.last_update_timestamp = time;
    }
}

pub(crate) fn mined(cctx: &mut CrossChainTx, time: i64) {
    cctx.cctx_status.status = CctxStatus::OutboundMined;
    cctx.cctx_status.last_update_timestamp = time;
    cctx.inbound_tx_params.tx_finalization_status = TxFinalizationStatus::Executed;
}

pub(crate) fn abort(cctx: &mut CrossChainTx, time: i64, message: &str) {
    cctx.cctx_status.status = CctxStatus::Aborted;
    cctx.cctx_status.status_message = message.to_string();
    cctx.cctx_status.last_update_timestamp = time;
}

pub(crate) fn revert_with_message(cctx: &mut CrossChainTx, time: i64, message: &str) {
    cctx.cctx_status.status = CctxStatus::Reverted;
    cctx.cctx_status.status_message = message.to_string();
    cctx.cctx_status.last_update_timestamp = time;
}
