// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The outbound tracker & confirmer: polls candidate hashes submitted by
//! peers, selects the unique confirmed one and emits the outbound vote with
//! coin-type specific amount semantics.

use crate::compliance;
use crate::error::{ClientError, ClientResult};
use crate::observer::events::{
    event_topic, parse_withdrawn, parse_zeta_received, parse_zeta_reverted, validate_evm_tx_log,
    WITHDRAWN_SIG, ZETA_RECEIVED_SIG, ZETA_REVERTED_SIG,
};
use crate::observer::evm::EvmObserver;
use ethers::types::{
    Address as EthAddress, Transaction, TransactionReceipt, H256, U256, U64,
};
use tracing::{debug, error, info, warn};
use zeta_chain_types::{
    CoinType, CrossChainTx, MsgVoteOnObservedOutboundTx, ReceiveStatus,
};

impl EvmObserver {
    /// One confirmer tick: walk the tracker list (ascending nonce) and try
    /// to confirm exactly one hash per nonce.
    pub async fn observe_out_tx(&self) -> ClientResult<()> {
        // hints from our own signer are only an optimization; the tracker
        // list is the source of truth
        let _ = self.drain_broadcast_hints().await;

        let trackers = self.core.get_all_out_tx_trackers(self.chain.id).await?;
        for tracker in trackers {
            let nonce = tracker.nonce;
            if self.is_tx_confirmed(nonce).await {
                continue;
            }
            let mut confirmed_count = 0usize;
            let mut confirmed_pair: Option<(TransactionReceipt, Transaction)> = None;
            for entry in &tracker.hash_list {
                match self.check_confirmed_tx(&entry.tx_hash, nonce).await {
                    Ok(Some((receipt, tx))) => {
                        confirmed_count += 1;
                        info!(
                            chain = %self.chain,
                            nonce,
                            tx_hash = %entry.tx_hash,
                            "confirmed outbound"
                        );
                        confirmed_pair = Some((receipt, tx));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(chain = %self.chain, nonce, tx_hash = %entry.tx_hash, "check: {e}");
                    }
                }
            }
            match confirmed_count {
                0 => {} // yield; retry next tick
                1 => {
                    let (receipt, tx) = confirmed_pair.expect("counted one");
                    self.set_tx_n_receipt(nonce, receipt, tx).await;
                }
                _ => {
                    // cannot infer canonicality from this vantage; alarm and
                    // leave the nonce alone for the operator
                    error!(
                        chain = %self.chain,
                        nonce,
                        confirmed_count,
                        "multiple confirmed outbound hashes for one nonce"
                    );
                    self.metrics
                        .outbound_multiple_confirmations
                        .with_label_values(&[&self.chain.name])
                        .inc();
                }
            }
        }
        Ok(())
    }

    /// Record a confirmed `(receipt, tx)` pair in memory and on disk; the
    /// pending entry for the nonce is dropped.
    pub async fn set_tx_n_receipt(
        &self,
        nonce: u64,
        receipt: TransactionReceipt,
        tx: Transaction,
    ) {
        self.pending_txs.lock().await.remove(&nonce);
        if let Err(e) = self.store.save_confirmed(nonce, &receipt, &tx) {
            error!(chain = %self.chain, nonce, "persisting confirmed pair: {e}");
        }
        self.confirmed.lock().await.insert(nonce, (receipt, tx));
        self.metrics
            .outbound_confirmed
            .with_label_values(&[&self.chain.name])
            .inc();
    }

    pub async fn get_tx_n_receipt(&self, nonce: u64) -> Option<(TransactionReceipt, Transaction)> {
        self.confirmed.lock().await.get(&nonce).cloned()
    }

    pub async fn is_tx_confirmed(&self, nonce: u64) -> bool {
        self.confirmed.lock().await.contains_key(&nonce)
    }

    /// Discard local state for a nonce ZetaCore no longer tracks.
    pub async fn forget_nonce(&self, nonce: u64) {
        self.pending_txs.lock().await.remove(&nonce);
        self.confirmed.lock().await.remove(&nonce);
        let _ = self.store.remove_confirmed(nonce);
    }

    /// The confirmation chain: fetch, recover sender (must be TSS),
    /// nonce match, depth, inclusion cross-check. `Ok(None)` means "not
    /// confirmed yet"; hard mismatches are logged by the caller.
    pub async fn check_confirmed_tx(
        &self,
        tx_hash: &str,
        nonce: u64,
    ) -> ClientResult<Option<(TransactionReceipt, Transaction)>> {
        let hash: H256 = tx_hash
            .parse()
            .map_err(|_| ClientError::InvalidResponse(format!("bad tx hash {tx_hash}")))?;
        let (tx, is_pending) = self.evm.transaction_by_hash(hash).await?;

        // local recovery of the sender; it must be the TSS address
        let from = tx
            .recover_from()
            .map_err(|e| ClientError::InvalidResponse(format!("sender recovery: {e}")))?;
        if from != self.tss.evm_address() {
            return Err(ClientError::InvalidResponse(format!(
                "sender {from:?} is not the tss address"
            )));
        }
        if tx.nonce != U256::from(nonce) {
            return Err(ClientError::InvalidResponse(format!(
                "nonce mismatch: wanted {nonce}, got {}",
                tx.nonce
            )));
        }
        if is_pending {
            self.pending_txs.lock().await.insert(nonce, tx);
            return Ok(None);
        }

        let Some(receipt) = self.evm.transaction_receipt(hash).await? else {
            return Ok(None);
        };
        let receipt_block = receipt
            .block_number
            .ok_or_else(|| ClientError::InvalidResponse("receipt without block".to_string()))?
            .as_u64();

        let params = self.chain_params().await;
        if receipt_block + params.confirmation_count > self.get_last_block() {
            debug!(
                chain = %self.chain,
                nonce,
                receipt_block,
                "included but not confirmed yet"
            );
            return Ok(None);
        }

        self.check_tx_inclusion(&tx, &receipt).await?;
        Ok(Some((receipt, tx)))
    }

    /// Cross-check the receipt against the block body; a mismatch is the
    /// strongest local signal of a reorg, so the cached block is dropped.
    pub async fn check_tx_inclusion(
        &self,
        tx: &Transaction,
        receipt: &TransactionReceipt,
    ) -> ClientResult<()> {
        let block_number = receipt
            .block_number
            .ok_or_else(|| ClientError::InvalidResponse("receipt without block".to_string()))?
            .as_u64();
        let block = self.get_block_by_number_cached(block_number).await?;
        let index = receipt.transaction_index.as_usize();
        let Some(tx_at_index) = block.transactions.get(index) else {
            return Err(ClientError::InvalidResponse(format!(
                "transaction index {index} out of range [0, {}) in block {block_number}",
                block.transactions.len()
            )));
        };
        if tx_at_index.hash != tx.hash {
            self.remove_cached_block(block_number).await;
            return Err(ClientError::InvalidResponse(format!(
                "transaction at index {index} has hash {:?}, expected {:?} in block {block_number}",
                tx_at_index.hash, tx.hash
            )));
        }
        Ok(())
    }

    /// Returns `(included, confirmed)`. Once the nonce has a confirmed pair
    /// this builds and posts the outbound vote with the coin-type
    /// amount semantics.
    pub async fn is_send_outtx_processed(&self, cctx: &CrossChainTx) -> ClientResult<(bool, bool)> {
        let outbound = cctx.current_outbound();
        let nonce = outbound.outbound_tx_tss_nonce;
        let Some((receipt, tx)) = self.get_tx_n_receipt(nonce).await else {
            return Ok((false, false));
        };
        let status = if receipt.status == Some(U64::one()) {
            ReceiveStatus::Success
        } else {
            ReceiveStatus::Failed
        };

        // restricted CCTXs: vote through as a cancellation, amounts bypassed
        if compliance::is_cctx_restricted(cctx) {
            self.post_vote_outbound(cctx, &receipt, &tx, status, outbound.amount, CoinType::Cmd)
                .await?;
            return Ok((true, true));
        }

        match outbound.coin_type {
            CoinType::Cmd => {
                self.post_vote_outbound(cctx, &receipt, &tx, status, tx.value, CoinType::Cmd)
                    .await?;
                Ok((true, true))
            }
            CoinType::Gas => {
                // a bare value transfer; no event to check
                let amount = if status == ReceiveStatus::Success {
                    tx.value
                } else {
                    U256::zero()
                };
                self.post_vote_outbound(cctx, &receipt, &tx, status, amount, CoinType::Gas)
                    .await?;
                Ok((true, true))
            }
            CoinType::Zeta => self.process_zeta_outbound(cctx, &receipt, &tx, status).await,
            CoinType::Erc20 => self.process_erc20_outbound(cctx, &receipt, &tx, status).await,
        }
    }

    /// Message-pass outbound: the amount is declared by the connector's
    /// ZetaReceived/ZetaReverted event, which must come from the configured
    /// connector contract.
    async fn process_zeta_outbound(
        &self,
        cctx: &CrossChainTx,
        receipt: &TransactionReceipt,
        tx: &Transaction,
        status: ReceiveStatus,
    ) -> ClientResult<(bool, bool)> {
        let params = self.chain_params().await;
        if status == ReceiveStatus::Failed {
            self.post_vote_outbound(cctx, receipt, tx, status, U256::zero(), CoinType::Zeta)
                .await?;
            return Ok((true, true));
        }
        let connector: EthAddress = params
            .connector_contract_address
            .parse()
            .map_err(|_| ClientError::InvalidResponse("connector address unset".to_string()))?;

        for log in &receipt.logs {
            let topic0 = log.topics.first().copied().unwrap_or_default();
            if topic0 == event_topic(ZETA_RECEIVED_SIG) {
                validate_evm_tx_log(log, connector, Some(tx.hash), topic0)?;
                let event = parse_zeta_received(log)?;
                if !send_hash_matches(&cctx.index, event.send_hash) {
                    warn!(chain = %self.chain, "ZetaReceived send hash does not match cctx");
                    continue;
                }
                self.post_vote_outbound(
                    cctx,
                    receipt,
                    tx,
                    ReceiveStatus::Success,
                    event.zeta_value,
                    CoinType::Zeta,
                )
                .await?;
                return Ok((true, true));
            }
            if topic0 == event_topic(ZETA_REVERTED_SIG) {
                validate_evm_tx_log(log, connector, Some(tx.hash), topic0)?;
                let event = parse_zeta_reverted(log)?;
                if !send_hash_matches(&cctx.index, event.send_hash) {
                    warn!(chain = %self.chain, "ZetaReverted send hash does not match cctx");
                    continue;
                }
                self.post_vote_outbound(
                    cctx,
                    receipt,
                    tx,
                    ReceiveStatus::Success,
                    event.remaining_zeta_value,
                    CoinType::Zeta,
                )
                .await?;
                return Ok((true, true));
            }
        }
        // included, but the declaring event has not been found
        Ok((true, false))
    }

    /// ERC20 withdrawal: amount declared by the custody `Withdrawn` event.
    async fn process_erc20_outbound(
        &self,
        cctx: &CrossChainTx,
        receipt: &TransactionReceipt,
        tx: &Transaction,
        status: ReceiveStatus,
    ) -> ClientResult<(bool, bool)> {
        let params = self.chain_params().await;
        if status == ReceiveStatus::Failed {
            self.post_vote_outbound(cctx, receipt, tx, status, U256::zero(), CoinType::Erc20)
                .await?;
            return Ok((true, true));
        }
        let custody: EthAddress = params
            .erc20_custody_contract_address
            .parse()
            .map_err(|_| ClientError::InvalidResponse("custody address unset".to_string()))?;

        for log in &receipt.logs {
            if log.topics.first() == Some(&event_topic(WITHDRAWN_SIG)) {
                validate_evm_tx_log(log, custody, Some(tx.hash), event_topic(WITHDRAWN_SIG))?;
                let event = parse_withdrawn(log)?;
                self.post_vote_outbound(
                    cctx,
                    receipt,
                    tx,
                    ReceiveStatus::Success,
                    event.amount,
                    CoinType::Erc20,
                )
                .await?;
                return Ok((true, true));
            }
        }
        Ok((true, false))
    }

    async fn post_vote_outbound(
        &self,
        cctx: &CrossChainTx,
        receipt: &TransactionReceipt,
        tx: &Transaction,
        status: ReceiveStatus,
        value_received: U256,
        coin_type: CoinType,
    ) -> ClientResult<()> {
        let outbound = cctx.current_outbound();
        let msg = MsgVoteOnObservedOutboundTx {
            creator: self.core.operator_address(),
            cctx_hash: cctx.index.clone(),
            outbound_tx_hash: format!("{:?}", receipt.transaction_hash),
            observed_outbound_height: receipt.block_number.unwrap_or_default().as_u64(),
            observed_outbound_gas_used: receipt.gas_used.unwrap_or_default().as_u64(),
            observed_outbound_effective_gas_price: receipt
                .effective_gas_price
                .or(tx.gas_price)
                .unwrap_or_default(),
            observed_outbound_gas_limit: tx.gas.as_u64(),
            value_received,
            status,
            chain_id: self.chain.id,
            outbound_tx_tss_nonce: outbound.outbound_tx_tss_nonce,
            coin_type,
        };
        self.core.post_vote_outbound(msg).await?;
        self.metrics
            .outbound_votes_posted
            .with_label_values(&[&self.chain.name])
            .inc();
        Ok(())
    }
}

/// CCTX indexes are hex digests; the connector reports them as bytes32.
fn send_hash_matches(cctx_index: &str, send_hash: H256) -> bool {
    cctx_index.eq_ignore_ascii_case(&format!("{send_hash:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use zeta_chain_types::{CctxStatus, OutTxTracker, TxHashOnTracker};

    #[tokio::test]
    async fn test_check_confirmed_tx_happy_path() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok(); // refresh last_block

        // a signed TSS tx at nonce 3 mined in block 100 (tip 200, depth 14)
        let (tx, receipt) = harness.add_signed_outbound(3, 100, true).await;
        let result = harness
            .observer
            .check_confirmed_tx(&format!("{:?}", tx.hash), 3)
            .await
            .unwrap();
        let (got_receipt, got_tx) = result.expect("confirmed");
        assert_eq!(got_receipt.block_number, receipt.block_number);
        assert_eq!(got_tx.hash, tx.hash);
    }

    #[tokio::test]
    async fn test_check_confirmed_tx_rejects_wrong_nonce() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        let (tx, _receipt) = harness.add_signed_outbound(3, 100, true).await;
        let err = harness
            .observer
            .check_confirmed_tx(&format!("{:?}", tx.hash), 4)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonce mismatch"));
    }

    #[tokio::test]
    async fn test_check_confirmed_tx_rejects_non_tss_sender() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        let (tx, _receipt) = harness.add_foreign_outbound(3, 100).await;
        let err = harness
            .observer
            .check_confirmed_tx(&format!("{:?}", tx.hash), 3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not the tss address"));
    }

    #[tokio::test]
    async fn test_check_confirmed_tx_waits_for_depth() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        // mined at 195: 195 + 14 > 200, not confirmed yet
        let (tx, _receipt) = harness.add_signed_outbound(3, 195, true).await;
        let result = harness
            .observer
            .check_confirmed_tx(&format!("{:?}", tx.hash), 3)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_inclusion_mismatch_invalidates_cache() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        let (tx, receipt) = harness.add_signed_outbound(3, 100, true).await;

        // warm the cache, then let the node swap the block body (reorg)
        harness
            .observer
            .check_confirmed_tx(&format!("{:?}", tx.hash), 3)
            .await
            .unwrap();
        harness.swap_block_transactions(100).await;
        // cached block still says the old tx; refetch-after-invalidation is
        // what the next call exercises
        harness.observer.remove_cached_block(100).await;
        let err = harness
            .observer
            .check_tx_inclusion(&tx, &receipt)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has hash"));
    }

    #[tokio::test]
    async fn test_observe_out_tx_confirms_unique_hash() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        let (tx, _receipt) = harness.add_signed_outbound(7, 100, true).await;

        // a pending cctx at nonce 7 with a tracker entry
        harness
            .add_pending_cctx_with_tracker(7, &format!("{:?}", tx.hash))
            .await;

        harness.observer.observe_out_tx().await.unwrap();
        assert!(harness.observer.is_tx_confirmed(7).await);

        // gas cctx: the vote reaches the keeper and finalizes
        let cctx = harness.cctx_by_nonce(7).await;
        let (included, confirmed) = harness
            .observer
            .is_send_outtx_processed(&cctx)
            .await
            .unwrap();
        assert!(included);
        assert!(confirmed);
        let done = harness.cctx_by_index(&cctx.index).await;
        assert_eq!(done.cctx_status.status, CctxStatus::OutboundMined);
    }

    #[tokio::test]
    async fn test_multiple_confirmed_hashes_alarm_no_vote() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        // two *different* signed txs for the same nonce, both "mined"
        // (a glitchy or hacked endpoint)
        let (tx_a, _) = harness.add_signed_outbound(9, 100, true).await;
        let (tx_b, _) = harness.add_signed_outbound_conflicting(9, 101).await;

        harness.add_pending_cctx_with_tracker(9, &format!("{:?}", tx_a.hash)).await;
        harness
            .keeper_add_tracker_hash(9, &format!("{:?}", tx_b.hash))
            .await;

        harness.observer.observe_out_tx().await.unwrap();
        // policy: no confirmation recorded, operator alarm instead
        assert!(!harness.observer.is_tx_confirmed(9).await);
        assert_eq!(
            harness
                .observer
                .metrics
                .outbound_multiple_confirmations
                .get_metric_with_label_values(&[&harness.observer.chain.name])
                .unwrap()
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_confirmed_pair_survives_restart() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        let (tx, receipt) = harness.add_signed_outbound(11, 100, true).await;
        harness.observer.set_tx_n_receipt(11, receipt, tx).await;

        // a new observer over the same store sees the confirmation
        let reborn = harness.rebuild_observer().await;
        assert!(reborn.is_tx_confirmed(11).await);
    }

    #[test]
    fn test_send_hash_matches() {
        let hash = H256::repeat_byte(0xab);
        let index = format!("{hash:?}");
        assert!(send_hash_matches(&index, hash));
        assert!(send_hash_matches(&index.to_uppercase().replace("0X", "0x"), hash));
        assert!(!send_hash_matches("0xdead", hash));
    }

    #[tokio::test]
    async fn test_tracker_for_unknown_hash_stays_unconfirmed() {
        let harness = ObserverHarness::new().await;
        harness.evm.set_tip(200).await;
        harness.observer.observe_in_tx().await.ok();
        harness
            .add_pending_cctx_with_tracker(13, &format!("{:?}", H256::repeat_byte(0x77)))
            .await;
        harness.observer.observe_out_tx().await.unwrap();
        assert!(!harness.observer.is_tx_confirmed(13).await);
        let tracker: Option<OutTxTracker> = {
            let keeper = harness.core.keeper();
            let keeper = keeper.lock().await;
            keeper.get_out_tx_tracker(harness.chain_id(), 13)
        };
        let tracker = tracker.unwrap();
        assert_eq!(
            tracker.hash_list,
            vec![TxHashOnTracker {
                tx_hash: format!("{:?}", H256::repeat_byte(0x77)),
                tx_signer: OPERATOR.to_string(),
                proved: false,
            }]
        );
    }
}
