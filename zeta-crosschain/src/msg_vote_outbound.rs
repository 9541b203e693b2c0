// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outbound vote handling: confirmation bookkeeping and the CCTX state
//! transitions out of `PendingOutbound`/`PendingRevert`.

use crate::ballot::{ObservationType, VoteType};
use crate::keeper::CrosschainKeeper;
use crate::msg_vote_inbound::{abort, mined};
use tracing::info;
use zeta_chain_types::{
    is_zeta_chain, CctxStatus, CoinType, CrossChainTx, CrosschainError, CrosschainResult,
    LastBlockHeight, MsgVoteOnObservedOutboundTx, OutboundTxParams, ReceiveStatus,
    TxFinalizationStatus,
};

impl CrosschainKeeper {
    /// Vote on an observed outbound transaction. Returns the ballot index.
    pub fn vote_on_observed_outbound_tx(
        &mut self,
        msg: &MsgVoteOnObservedOutboundTx,
    ) -> CrosschainResult<String> {
        msg.validate_basic()?;
        if !self.is_observer(&msg.creator) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        let mut cctx = self
            .get_cross_chain_tx(&msg.cctx_hash)
            .ok_or_else(|| CrosschainError::CannotFindCctx(msg.cctx_hash.clone()))?;
        {
            let outbound = cctx.current_outbound();
            if outbound.outbound_tx_tss_nonce != msg.outbound_tx_tss_nonce
                || outbound.receiver_chain_id != msg.chain_id
            {
                return Err(CrosschainError::OutboundParamsMismatch(format!(
                    "expected chain {} nonce {}, got chain {} nonce {}",
                    outbound.receiver_chain_id,
                    outbound.outbound_tx_tss_nonce,
                    msg.chain_id,
                    msg.outbound_tx_tss_nonce
                )));
            }
        }

        let ballot_index = msg.digest();
        let ballot = self.find_or_create_ballot(&ballot_index, ObservationType::OutboundTx);
        if ballot.is_finalized() {
            return Err(CrosschainError::ObservedTxAlreadyFinalized(ballot_index));
        }
        let finalized_now = ballot.add_vote(&msg.creator, VoteType::SuccessObservation)?;
        if !finalized_now {
            return Ok(ballot_index);
        }

        // Terminal states are absorbing; the nonce index should have been
        // cleared on the transition, so this is a defensive re-check.
        if cctx.cctx_status.status.is_terminal() {
            return Err(CrosschainError::StatusNotPending);
        }

        self.record_observation(&mut cctx, msg, &ballot_index);
        self.apply_transition(&mut cctx, msg);

        // The finalized attempt's slot in the nonce index is released; a
        // revert re-binds under its fresh nonce inside the combined setter.
        let tss = self.tss.tss_pubkey.clone();
        self.remove_nonce_to_cctx(&tss, msg.chain_id, msg.outbound_tx_tss_nonce);
        self.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        info!(
            index = %cctx.index,
            status = %cctx.cctx_status.status,
            "outbound ballot finalized"
        );
        Ok(ballot_index)
    }

    fn record_observation(
        &mut self,
        cctx: &mut CrossChainTx,
        msg: &MsgVoteOnObservedOutboundTx,
        ballot_index: &str,
    ) {
        let outbound = cctx.current_outbound_mut();
        outbound.outbound_tx_hash = msg.outbound_tx_hash.clone();
        outbound.outbound_tx_observed_external_height = msg.observed_outbound_height;
        outbound.outbound_tx_gas_used = msg.observed_outbound_gas_used;
        outbound.outbound_tx_effective_gas_price = msg.observed_outbound_effective_gas_price;
        outbound.outbound_tx_ballot_index = ballot_index.to_string();
        if msg.status == ReceiveStatus::Success && msg.coin_type != CoinType::Cmd {
            outbound.amount = msg.value_received;
        }

        let mut heights = self
            .get_last_block_height(msg.chain_id)
            .unwrap_or(LastBlockHeight {
                chain_id: msg.chain_id,
                last_send_height: 0,
                last_receive_height: 0,
            });
        if msg.observed_outbound_height > heights.last_receive_height {
            heights.last_receive_height = msg.observed_outbound_height;
        }
        self.set_last_block_height(&heights);
    }

    fn apply_transition(&mut self, cctx: &mut CrossChainTx, msg: &MsgVoteOnObservedOutboundTx) {
        let time = self.block_time_unix();
        match (msg.status, cctx.cctx_status.status) {
            (ReceiveStatus::Success, CctxStatus::PendingOutbound) => mined(cctx, time),
            (ReceiveStatus::Success, CctxStatus::PendingRevert) => {
                // Keep the status message: it carries the original failure
                // reason (e.g. the destination revert selector).
                cctx.cctx_status.status = CctxStatus::Reverted;
                cctx.cctx_status.last_update_timestamp = time;
                cctx.inbound_tx_params.tx_finalization_status = TxFinalizationStatus::Executed;
            }
            (ReceiveStatus::Failed, CctxStatus::PendingOutbound) => {
                self.handle_failed_outbound(cctx)
            }
            (ReceiveStatus::Failed, CctxStatus::PendingRevert) => {
                abort(cctx, time, "revert transaction failed")
            }
            (_, other) => {
                // PendingInbound never reaches here: a CCTX only enters the
                // nonce index once it leaves PendingInbound.
                abort(cctx, time, &format!("unexpected status {other} on outbound vote"))
            }
        }
    }

    /// A first outbound attempt failed on the destination chain.
    fn handle_failed_outbound(&mut self, cctx: &mut CrossChainTx) {
        let time = self.block_time_unix();
        let inbound = cctx.inbound_tx_params.clone();

        if inbound.coin_type == CoinType::Cmd {
            return abort(cctx, time, "cmd outbound failed");
        }

        if is_zeta_chain(inbound.sender_chain_id) {
            // ZetaChain-originated withdrawal: the refund executes inside
            // ZetaCore, no external revert outbound is needed.
            let result = match inbound.coin_type {
                CoinType::Zeta => self.fungible.deposit_zeta(&inbound.sender, inbound.amount),
                CoinType::Gas => match self.fungible.gas_coin_zrc20(cctx.current_outbound().receiver_chain_id) {
                    Some(zrc20) => self.fungible.mint_zrc20(&zrc20, &inbound.sender, inbound.amount),
                    None => Err(CrosschainError::ForeignCoinNotFound(format!(
                        "chain {}",
                        cctx.current_outbound().receiver_chain_id
                    ))),
                },
                CoinType::Erc20 => {
                    match self
                        .fungible
                        .zrc20_by_asset(cctx.current_outbound().receiver_chain_id, &inbound.asset)
                    {
                        Some(zrc20) => {
                            self.fungible.mint_zrc20(&zrc20, &inbound.sender, inbound.amount)
                        }
                        None => Err(CrosschainError::Zrc20NotFound(inbound.asset.clone())),
                    }
                }
                CoinType::Cmd => unreachable!("cmd handled above"),
            };
            return match result {
                Ok(()) => {
                    cctx.cctx_status.status = CctxStatus::Reverted;
                    cctx.cctx_status.status_message =
                        "outbound failed, amount reverted on ZetaChain".to_string();
                    cctx.cctx_status.last_update_timestamp = time;
                }
                Err(e) => abort(cctx, time, &e.to_string()),
            };
        }

        // Externally-originated: append a revert attempt back to the sender,
        // net of the gas burned by the failed attempt.
        let failed = cctx.current_outbound().clone();
        let gas_fee = failed
            .outbound_tx_effective_gas_price
            .saturating_mul(failed.outbound_tx_gas_used.into());
        let revert_amount = match inbound.amount.checked_sub(gas_fee) {
            Some(amount) if !amount.is_zero() => amount,
            _ => {
                return abort(
                    cctx,
                    time,
                    "insufficient amount to cover revert gas fee",
                )
            }
        };
        let median = match self.median_gas_price(inbound.sender_chain_id) {
            Some(price) => price,
            None => {
                return abort(
                    cctx,
                    time,
                    &format!("gas price not found for revert chain {}", inbound.sender_chain_id),
                )
            }
        };
        let nonce = self.get_and_increment_nonce(inbound.sender_chain_id);
        cctx.outbound_tx_params.push(OutboundTxParams {
            receiver: inbound.sender.clone(),
            receiver_chain_id: inbound.sender_chain_id,
            coin_type: inbound.coin_type,
            amount: revert_amount,
            outbound_tx_tss_nonce: nonce,
            outbound_tx_gas_limit: failed.outbound_tx_gas_limit,
            outbound_tx_gas_price: median.to_string(),
            outbound_tx_hash: String::new(),
            outbound_tx_ballot_index: String::new(),
            outbound_tx_observed_external_height: 0,
            outbound_tx_gas_used: 0,
            outbound_tx_effective_gas_price: ethers::types::U256::zero(),
            tss_pubkey: self.tss.tss_pubkey.clone(),
        });
        cctx.cctx_status.status = CctxStatus::PendingRevert;
        cctx.cctx_status.status_message = "outbound failed, reverting to sender".to_string();
        cctx.cctx_status.last_update_timestamp = time;
    }
}
