// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Bitcoin inbound observer: scans confirmed blocks for outputs paying
//! the TSS P2WPKH address, extracts the OP_RETURN memo, and votes deposits
//! into ZetaCore. Also confirms outbound nonce-marked transactions.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::{BtcRpc, TssSigner, ZetaCoreClient};
use crate::metrics::ZetaclientMetrics;
use crate::observer::calc_block_range_to_scan;
use crate::store::ObserverStore;
use crate::compliance;
use bitcoin::Network;
use ethers::types::U256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeta_chain_types::{
    nonce_mark_amount, Chain, ChainParams, CoinType, CrossChainTx, MsgGasPriceVoter,
    MsgVoteOnObservedInboundTx, MsgVoteOnObservedOutboundTx, ReceiveStatus, MAX_BLOCKS_PER_SCAN,
};

pub struct BtcObserver {
    chain: Chain,
    zeta_chain_id: i64,
    network: Network,
    params: RwLock<ChainParams>,
    btc: Arc<dyn BtcRpc>,
    core: Arc<dyn ZetaCoreClient>,
    tss: Arc<dyn TssSigner>,
    store: ObserverStore,
    last_scanned: AtomicU64,
    last_block: AtomicU64,
    metrics: Arc<ZetaclientMetrics>,
}

impl BtcObserver {
    pub async fn new(
        chain: Chain,
        zeta_chain_id: i64,
        network: Network,
        params: ChainParams,
        btc: Arc<dyn BtcRpc>,
        core: Arc<dyn ZetaCoreClient>,
        tss: Arc<dyn TssSigner>,
        store: ObserverStore,
        metrics: Arc<ZetaclientMetrics>,
        scan_from: Option<u64>,
    ) -> ClientResult<Arc<Self>> {
        let observer = Self {
            chain,
            zeta_chain_id,
            network,
            params: RwLock::new(params),
            btc,
            core,
            tss,
            store,
            last_scanned: AtomicU64::new(0),
            last_block: AtomicU64::new(0),
            metrics,
        };
        let cursor = match scan_from {
            Some(height) => height,
            None => match observer.store.get_last_block_scanned()? {
                Some(height) => height,
                None => {
                    let tip = observer.btc.get_block_count().await?;
                    observer.store.set_last_block_scanned(tip)?;
                    tip
                }
            },
        };
        observer.last_scanned.store(cursor, Ordering::Release);
        info!(chain = %observer.chain, cursor, "btc observer starting");
        Ok(Arc::new(observer))
    }

    pub async fn chain_params(&self) -> ChainParams {
        self.params.read().await.clone()
    }

    pub async fn update_chain_params(&self) {
        if let Ok(params) = self.core.get_chain_params(self.chain.id).await {
            *self.params.write().await = params;
        }
    }

    pub fn get_last_block_scanned(&self) -> u64 {
        self.last_scanned.load(Ordering::Acquire)
    }

    pub fn get_last_block(&self) -> u64 {
        self.last_block.load(Ordering::Acquire)
    }

    /// One inbound tick over the confirmed window.
    pub async fn observe_in_tx(&self) -> ClientResult<()> {
        let flags = self.core.get_crosschain_flags().await?;
        if !flags.is_inbound_enabled {
            return Err(ClientError::Core(
                zeta_chain_types::CrosschainError::InboundDisabled,
            ));
        }

        let tip = self.btc.get_block_count().await?;
        self.last_block.store(tip, Ordering::Release);
        self.metrics
            .last_external_block
            .with_label_values(&[&self.chain.name])
            .set(tip as i64);

        let params = self.chain_params().await;
        if tip < params.confirmation_count {
            return Err(ClientError::Rpc(format!(
                "current block height {tip} is too low"
            )));
        }
        let confirmed_tip = tip - params.confirmation_count;
        let last_scanned = self.get_last_block_scanned();
        if last_scanned >= confirmed_tip {
            debug!(chain = %self.chain, "no new confirmed block");
            return Ok(());
        }

        let (start_block, to_block) =
            calc_block_range_to_scan(confirmed_tip, last_scanned, MAX_BLOCKS_PER_SCAN);

        for height in start_block..=to_block {
            let hash = match self.btc.get_block_hash(height).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(chain = %self.chain, height, "get block hash: {e}");
                    return self.advance_cursor(height - 1);
                }
            };
            let block = match self.btc.get_block(&hash).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(chain = %self.chain, height, "get block: {e}");
                    return self.advance_cursor(height - 1);
                }
            };
            for tx in &block.txdata {
                if let Some(msg) = self.extract_deposit(tx, height) {
                    if self.core.post_vote_inbound(msg).await.is_err() {
                        return self.advance_cursor(height - 1);
                    }
                    self.metrics
                        .inbound_votes_posted
                        .with_label_values(&[&self.chain.name, "btc_deposit"])
                        .inc();
                }
            }
        }
        self.advance_cursor(to_block)
    }

    fn advance_cursor(&self, height: u64) -> ClientResult<()> {
        if height > self.get_last_block_scanned() {
            self.last_scanned.store(height, Ordering::Release);
            self.metrics
                .last_scanned_block
                .with_label_values(&[&self.chain.name])
                .set(height as i64);
            self.store.set_last_block_scanned(height)?;
        }
        Ok(())
    }

    /// A deposit pays the TSS P2WPKH address from a non-TSS input; the memo
    /// (receiver on ZetaChain) rides in an OP_RETURN output.
    fn extract_deposit(
        &self,
        tx: &bitcoin::Transaction,
        height: u64,
    ) -> Option<MsgVoteOnObservedInboundTx> {
        let tss_address = self.tss.btc_address(self.network).ok()?;
        let tss_script = tss_address.script_pubkey();

        // spends from the TSS key are outbounds, not deposits
        if tx
            .input
            .iter()
            .any(|vin| vin.witness.nth(1) == Some(&self.tss.btc_pubkey()[..]))
        {
            return None;
        }

        let paid: u64 = tx
            .output
            .iter()
            .filter(|out| out.script_pubkey == tss_script)
            .map(|out| out.value)
            .sum();
        if paid == 0 {
            return None;
        }

        let sender = tx
            .input
            .first()
            .and_then(|vin| vin.witness.nth(1))
            .and_then(|pubkey| bitcoin::PublicKey::from_slice(pubkey).ok())
            .and_then(|pubkey| bitcoin::Address::p2wpkh(&pubkey, self.network).ok())
            .map(|address| address.to_string())
            .unwrap_or_default();

        let memo = tx.output.iter().find_map(|out| op_return_payload(&out.script_pubkey));
        // the memo's first 20 bytes name the receiver on ZetaChain; a bare
        // donation without a memo credits the sender's own address
        let receiver = match &memo {
            Some(memo) if memo.len() >= 20 => format!("0x{}", hex::encode(&memo[..20])),
            _ => sender.clone(),
        };
        if compliance::contains_restricted_address(&[sender.as_str(), receiver.as_str()]) {
            warn!(chain = %self.chain, "restricted address in btc deposit, skipping vote");
            return None;
        }

        Some(MsgVoteOnObservedInboundTx {
            creator: self.core.operator_address(),
            sender,
            sender_chain_id: self.chain.id,
            tx_origin: String::new(),
            receiver,
            receiver_chain: self.zeta_chain_id,
            amount: U256::from(paid),
            message: memo.map(hex::encode).unwrap_or_default(),
            in_tx_hash: tx.txid().to_string(),
            in_block_height: height,
            gas_limit: 90_000,
            coin_type: CoinType::Gas,
            asset: String::new(),
            event_index: 0,
        })
    }

    /// Confirm tracker candidates: depth-confirmed, nonce-marked, TSS-sent.
    pub async fn observe_out_tx(&self) -> ClientResult<()> {
        let params = self.chain_params().await;
        let trackers = self.core.get_all_out_tx_trackers(self.chain.id).await?;
        for tracker in trackers {
            for entry in &tracker.hash_list {
                let Ok(txid) = entry.tx_hash.parse::<bitcoin::Txid>() else {
                    continue;
                };
                let (tx, confirmations) = match self.btc.get_raw_transaction(&txid).await {
                    Ok(found) => found,
                    Err(_) => continue,
                };
                if confirmations < params.confirmation_count {
                    continue;
                }
                if tx.output.first().map(|out| out.value) != Some(nonce_mark_amount(tracker.nonce))
                {
                    warn!(chain = %self.chain, nonce = tracker.nonce, "tracker tx without nonce mark");
                    continue;
                }
                if !tx
                    .input
                    .iter()
                    .all(|vin| vin.witness.nth(1) == Some(&self.tss.btc_pubkey()[..]))
                {
                    warn!(chain = %self.chain, nonce = tracker.nonce, "tracker tx not signed by tss");
                    continue;
                }
                let Some(cctx) = self
                    .core
                    .get_cctx_by_nonce(self.chain.id, tracker.nonce)
                    .await?
                else {
                    continue;
                };
                self.post_vote_outbound(&cctx, &tx, confirmations).await?;
                break;
            }
        }
        Ok(())
    }

    async fn post_vote_outbound(
        &self,
        cctx: &CrossChainTx,
        tx: &bitcoin::Transaction,
        confirmations: u64,
    ) -> ClientResult<()> {
        let amount = tx.output.get(1).map(|out| out.value).unwrap_or(0);
        let height = self.get_last_block().saturating_sub(confirmations.saturating_sub(1));
        let msg = MsgVoteOnObservedOutboundTx {
            creator: self.core.operator_address(),
            cctx_hash: cctx.index.clone(),
            outbound_tx_hash: tx.txid().to_string(),
            observed_outbound_height: height,
            observed_outbound_gas_used: 0,
            observed_outbound_effective_gas_price: U256::zero(),
            observed_outbound_gas_limit: 0,
            value_received: U256::from(amount),
            // a mined Bitcoin transaction cannot revert
            status: ReceiveStatus::Success,
            chain_id: self.chain.id,
            outbound_tx_tss_nonce: cctx.current_outbound().outbound_tx_tss_nonce,
            coin_type: cctx.current_outbound().coin_type,
        };
        self.core.post_vote_outbound(msg).await?;
        self.metrics
            .outbound_votes_posted
            .with_label_values(&[&self.chain.name])
            .inc();
        Ok(())
    }

    /// Report the node's fee-rate estimate as the chain's gas price.
    pub async fn post_gas_price(&self) -> ClientResult<()> {
        let fee_rate = self.btc.estimate_fee_rate().await?;
        let block_number = self.btc.get_block_count().await?;
        self.core
            .post_gas_price(MsgGasPriceVoter {
                creator: self.core.operator_address(),
                chain_id: self.chain.id,
                price: fee_rate,
                block_number,
                supply: "100".to_string(),
            })
            .await?;
        self.metrics
            .gas_price_posted
            .with_label_values(&[&self.chain.name])
            .inc();
        Ok(())
    }
}

/// Extract the payload of a standard OP_RETURN output (single push ≤ 75).
fn op_return_payload(script: &bitcoin::Script) -> Option<Vec<u8>> {
    let bytes = script.as_bytes();
    if bytes.len() < 3 || bytes[0] != 0x6a {
        return None;
    }
    let push_len = bytes[1] as usize;
    if push_len > 75 || bytes.len() < 2 + push_len {
        return None;
    }
    Some(bytes[2..2 + push_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::btc::{BtcSigner, BtcUtxo};
    use crate::signer::TestTssSigner;
    use crate::test_utils::{test_keeper, OPERATOR, ZETA_CHAIN_ID};
    use crate::zetacore::InProcessZetaCore;
    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version};
    use bitcoin::hashes::Hash;
    use bitcoin::script::PushBytesBuf;
    use bitcoin::hash_types::TxMerkleNode;
    use bitcoin::{
        Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
        Txid, Witness,
    };
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;
    use zeta_chain_types::{chain_from_id, default_chain_params, BTC_TESTNET_CHAIN_ID};

    struct MockBtcState {
        tip: u64,
        blocks: HashMap<u64, Block>,
        raw_txs: HashMap<Txid, (Transaction, u64)>,
        fee_rate: u64,
    }

    struct MockBtcRpc {
        state: TokioMutex<MockBtcState>,
    }

    impl MockBtcRpc {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: TokioMutex::new(MockBtcState {
                    tip: 0,
                    blocks: HashMap::new(),
                    raw_txs: HashMap::new(),
                    fee_rate: 7,
                }),
            })
        }

        async fn set_tip(&self, tip: u64) {
            self.state.lock().await.tip = tip;
        }

        async fn put_block(&self, height: u64, block: Block) {
            self.state.lock().await.blocks.insert(height, block);
        }

        async fn put_raw_tx(&self, tx: Transaction, confirmations: u64) {
            self.state
                .lock()
                .await
                .raw_txs
                .insert(tx.txid(), (tx, confirmations));
        }
    }

    #[async_trait]
    impl BtcRpc for MockBtcRpc {
        async fn get_block_count(&self) -> ClientResult<u64> {
            Ok(self.state.lock().await.tip)
        }

        async fn get_block_hash(&self, height: u64) -> ClientResult<BlockHash> {
            let state = self.state.lock().await;
            if state.blocks.contains_key(&height) || height <= state.tip {
                Ok(BlockHash::from_byte_array([height as u8; 32]))
            } else {
                Err(ClientError::NotFound(format!("block {height}")))
            }
        }

        async fn get_block(&self, hash: &BlockHash) -> ClientResult<Block> {
            let state = self.state.lock().await;
            let height = hash.to_byte_array()[0] as u64;
            Ok(state
                .blocks
                .get(&height)
                .cloned()
                .unwrap_or_else(empty_btc_block))
        }

        async fn get_raw_transaction(
            &self,
            txid: &Txid,
        ) -> ClientResult<(Transaction, u64)> {
            let state = self.state.lock().await;
            state
                .raw_txs
                .get(txid)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(format!("tx {txid}")))
        }

        async fn send_raw_transaction(&self, tx: &Transaction) -> ClientResult<Txid> {
            Ok(tx.txid())
        }

        async fn estimate_fee_rate(&self) -> ClientResult<u64> {
            Ok(self.state.lock().await.fee_rate)
        }
    }

    fn empty_btc_block() -> Block {
        Block {
            header: Header {
                version: Version::from_consensus(1),
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: 1_700_000_000,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: 0,
            },
            txdata: vec![],
        }
    }

    /// A user deposit: pays the TSS, memo names the zEVM receiver.
    fn deposit_tx(tss: &TestTssSigner, sats: u64, memo: &[u8]) -> Transaction {
        let user = TestTssSigner::new_with_seed(0x66);
        let user_pubkey = user.btc_pubkey();
        let mut witness = Witness::new();
        witness.push([0u8; 71]); // placeholder signature
        witness.push(user_pubkey);

        let tss_script = tss
            .btc_address(Network::Testnet)
            .unwrap()
            .script_pubkey();
        let memo_script = ScriptBuf::new_op_return(
            &PushBytesBuf::try_from(memo.to_vec()).unwrap(),
        );
        Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::all_zeros(),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness,
            }],
            output: vec![
                TxOut {
                    value: sats,
                    script_pubkey: tss_script,
                },
                TxOut {
                    value: 0,
                    script_pubkey: memo_script,
                },
            ],
        }
    }

    struct BtcHarness {
        btc: Arc<MockBtcRpc>,
        core: Arc<InProcessZetaCore>,
        tss: Arc<TestTssSigner>,
        observer: Arc<BtcObserver>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> BtcHarness {
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let mut keeper = test_keeper(&tss);
        keeper
            .chain_params
            .insert(BTC_TESTNET_CHAIN_ID, default_chain_params(BTC_TESTNET_CHAIN_ID));
        let core = Arc::new(InProcessZetaCore::new(
            Arc::new(TokioMutex::new(keeper)),
            OPERATOR,
        ));
        let btc = MockBtcRpc::new();
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::ObserverStore::open(dir.path(), "btc_testnet").unwrap();
        let observer = BtcObserver::new(
            chain_from_id(BTC_TESTNET_CHAIN_ID).unwrap(),
            ZETA_CHAIN_ID,
            Network::Testnet,
            default_chain_params(BTC_TESTNET_CHAIN_ID),
            btc.clone(),
            core.clone(),
            tss.clone(),
            store,
            crate::metrics::ZetaclientMetrics::new_for_testing(),
            Some(0),
        )
        .await
        .unwrap();
        BtcHarness {
            btc,
            core,
            tss,
            observer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_btc_deposit_scanned_and_voted() {
        let h = harness().await;
        h.btc.set_tip(120).await; // depth 14, confirmed tip 106

        let memo = [0x22u8; 20];
        let tx = deposit_tx(&h.tss, 250_000, &memo);
        let mut block = empty_btc_block();
        block.txdata = vec![tx.clone()];
        h.btc.put_block(50, block).await;

        h.observer.observe_in_tx().await.unwrap();
        assert_eq!(h.observer.get_last_block_scanned(), 100); // batch cap

        let keeper = h.core.keeper();
        let keeper = keeper.lock().await;
        let cctxs = keeper.get_all_cross_chain_tx();
        assert_eq!(cctxs.len(), 1);
        let inbound = &cctxs[0].inbound_tx_params;
        assert_eq!(inbound.coin_type, CoinType::Gas);
        assert_eq!(inbound.amount, U256::from(250_000u64));
        assert_eq!(
            cctxs[0].current_outbound().receiver,
            format!("0x{}", hex::encode(memo))
        );
    }

    #[tokio::test]
    async fn test_btc_no_op_below_depth() {
        let h = harness().await;
        h.btc.set_tip(5).await;
        assert!(h.observer.observe_in_tx().await.is_err());
        assert_eq!(h.observer.get_last_block_scanned(), 0);
    }

    #[tokio::test]
    async fn test_btc_outbound_confirmed_by_nonce_mark() {
        let h = harness().await;
        h.btc.set_tip(120).await;
        let _ = h.observer.observe_in_tx().await;

        // a pending btc cctx at nonce 7
        {
            let keeper = h.core.keeper();
            let mut keeper = keeper.lock().await;
            let mut cctx = crate::test_utils::pending_gas_cctx(
                "0xbtc7",
                BTC_TESTNET_CHAIN_ID,
                7,
                ethers::types::Address::repeat_byte(0x77),
            );
            cctx.outbound_tx_params[0].receiver =
                "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".to_string();
            keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        }

        // the signed outbound serving nonce 7, mined with enough depth
        let signer = BtcSigner::new(Network::Testnet, h.tss.clone());
        let outbound = signer
            .build_signed_tx(
                &[BtcUtxo {
                    outpoint: OutPoint {
                        txid: Txid::all_zeros(),
                        vout: 0,
                    },
                    value_sats: 1_000_000,
                }],
                &bitcoin::Address::from_str("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx")
                    .unwrap()
                    .require_network(Network::Testnet)
                    .unwrap(),
                500_000,
                7,
                5,
            )
            .await
            .unwrap();
        h.btc.put_raw_tx(outbound.clone(), 20).await;
        {
            let keeper = h.core.keeper();
            let mut keeper = keeper.lock().await;
            keeper
                .add_to_out_tx_tracker(&zeta_chain_types::MsgAddToOutTxTracker {
                    creator: OPERATOR.to_string(),
                    chain_id: BTC_TESTNET_CHAIN_ID,
                    nonce: 7,
                    tx_hash: outbound.txid().to_string(),
                    proof: None,
                    block_hash: String::new(),
                    tx_index: 0,
                })
                .unwrap();
        }

        h.observer.observe_out_tx().await.unwrap();

        let keeper = h.core.keeper();
        let keeper = keeper.lock().await;
        let cctx = keeper.get_cross_chain_tx("0xbtc7").unwrap();
        assert_eq!(
            cctx.cctx_status.status,
            zeta_chain_types::CctxStatus::OutboundMined
        );
        assert_eq!(
            cctx.current_outbound().amount,
            U256::from(500_000u64)
        );
    }

    use std::str::FromStr;

    #[test]
    fn test_op_return_payload() {
        let memo = [0x11u8; 20];
        let script = ScriptBuf::new_op_return(&PushBytesBuf::try_from(memo.to_vec()).unwrap());
        assert_eq!(op_return_payload(&script), Some(memo.to_vec()));

        let not_op_return = ScriptBuf::new();
        assert_eq!(op_return_payload(&not_op_return), None);
    }
}
