// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures: a programmable EVM RPC mock, a wired observer harness
//! backed by an in-process keeper, and signed-transaction builders.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::{EvmRpc, TssSigner};
use crate::metrics::ZetaclientMetrics;
use crate::observer::events::{event_topic, ZETA_SENT_SIG};
use crate::observer::evm::EvmObserver;
use crate::signer::TestTssSigner;
use crate::store::ObserverStore;
use crate::zetacore::InProcessZetaCore;
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address as EthAddress, Block, Bytes, Log, Signature, Transaction, TransactionReceipt,
    TransactionRequest, TxHash, H256, U256, U64,
};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use zeta_chain_types::{
    chain_from_id, default_chain_params, CctxStatus, ChainParams, CoinType, CrossChainTx,
    GasPrice, InboundTxParams, MsgAddToOutTxTracker, OutboundTxParams, Status,
    TxFinalizationStatus,
};
use zeta_crosschain::{AuthorityKeeper, CrosschainKeeper, MemFungibleKeeper, TssState};

pub const OPERATOR: &str = "zeta1operator";
pub const ADMIN: &str = "zeta1admin";
pub const EMERGENCY: &str = "zeta1emergency";
pub const TEST_CHAIN_ID: i64 = 5;
pub const ZETA_CHAIN_ID: i64 = 7001;

pub fn connector_address() -> EthAddress {
    EthAddress::repeat_byte(0x0c)
}

pub fn custody_address() -> EthAddress {
    EthAddress::repeat_byte(0x0d)
}

#[derive(Default)]
struct MockState {
    tip: u64,
    gas_price: u64,
    blocks: HashMap<u64, Block<Transaction>>,
    txs: HashMap<H256, (Transaction, bool)>,
    receipts: HashMap<H256, TransactionReceipt>,
    logs: Vec<Log>,
    broadcasts: Vec<Bytes>,
}

/// A programmable EVM RPC double. Unknown blocks come back empty-but-valid
/// so whole-range scans do not require seeding every height.
pub struct MockEvmRpc {
    state: Mutex<MockState>,
}

impl MockEvmRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                gas_price: 30_000_000_000,
                ..Default::default()
            }),
        })
    }

    pub async fn set_tip(&self, tip: u64) {
        self.state.lock().await.tip = tip;
    }

    pub async fn set_gas_price(&self, price: u64) {
        self.state.lock().await.gas_price = price;
    }

    pub async fn add_log(&self, log: Log) {
        self.state.lock().await.logs.push(log);
    }

    pub async fn add_tx(&self, tx: Transaction, is_pending: bool) {
        self.state.lock().await.txs.insert(tx.hash, (tx, is_pending));
    }

    pub async fn add_receipt(&self, receipt: TransactionReceipt) {
        self.state
            .lock()
            .await
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    pub async fn put_block(&self, number: u64, block: Block<Transaction>) {
        self.state.lock().await.blocks.insert(number, block);
    }

    pub async fn broadcast_count(&self) -> usize {
        self.state.lock().await.broadcasts.len()
    }

    pub async fn last_broadcast(&self) -> Option<Bytes> {
        self.state.lock().await.broadcasts.last().cloned()
    }
}

pub fn empty_block(number: u64) -> Block<Transaction> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Block {
        number: Some(U64::from(number)),
        hash: Some(H256::from_low_u64_be(number + 1)),
        parent_hash: H256::from_low_u64_be(number),
        timestamp: U256::from(now),
        ..Default::default()
    }
}

#[async_trait]
impl EvmRpc for MockEvmRpc {
    async fn block_number(&self) -> ClientResult<u64> {
        Ok(self.state.lock().await.tip)
    }

    async fn header_by_number(&self, number: u64) -> ClientResult<Block<TxHash>> {
        let state = self.state.lock().await;
        let block = state
            .blocks
            .get(&number)
            .cloned()
            .unwrap_or_else(|| empty_block(number));
        Ok(Block {
            hash: block.hash,
            parent_hash: block.parent_hash,
            number: block.number,
            timestamp: block.timestamp,
            transactions: block.transactions.iter().map(|t| t.hash).collect(),
            ..Default::default()
        })
    }

    async fn block_by_number(&self, number: u64) -> ClientResult<Block<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .blocks
            .get(&number)
            .cloned()
            .unwrap_or_else(|| empty_block(number)))
    }

    async fn transaction_by_hash(&self, hash: H256) -> ClientResult<(Transaction, bool)> {
        let state = self.state.lock().await;
        state
            .txs
            .get(&hash)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("transaction {hash:?}")))
    }

    async fn transaction_receipt(&self, hash: H256) -> ClientResult<Option<TransactionReceipt>> {
        let state = self.state.lock().await;
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn suggest_gas_price(&self) -> ClientResult<U256> {
        Ok(U256::from(self.state.lock().await.gas_price))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        let hash = H256::from(keccak256(&raw));
        self.state.lock().await.broadcasts.push(raw);
        Ok(hash)
    }

    async fn filter_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: EthAddress,
        topic0: H256,
    ) -> ClientResult<Vec<Log>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|n| n.as_u64()).unwrap_or(0);
                log.address == address
                    && log.topics.first() == Some(&topic0)
                    && block >= from_block
                    && block <= to_block
            })
            .cloned()
            .collect())
    }
}

/// Build a real signed legacy transaction (EIP-155) so local sender
/// recovery works in tests.
pub fn make_signed_tx(
    signer: &TestTssSigner,
    chain_id: u64,
    nonce: u64,
    to: EthAddress,
    value: U256,
) -> Transaction {
    let request = TransactionRequest::new()
        .from(signer.evm_address())
        .to(to)
        .nonce(nonce)
        .value(value)
        .gas(90_000u64)
        .gas_price(30_000_000_000u64)
        .chain_id(chain_id);
    let typed: TypedTransaction = request.into();
    let sighash = typed.sighash();
    let signature = signer.sign_recoverable_sync(sighash.0);
    let sig = Signature {
        r: U256::from_big_endian(&signature.r),
        s: U256::from_big_endian(&signature.s),
        v: signature.recovery_id as u64 + 35 + 2 * chain_id,
    };
    let raw = typed.rlp_signed(&sig);
    let hash = H256::from(keccak256(&raw));
    Transaction {
        hash,
        nonce: nonce.into(),
        from: signer.evm_address(),
        to: Some(to),
        value,
        gas: U256::from(90_000u64),
        gas_price: Some(U256::from(30_000_000_000u64)),
        input: Bytes::default(),
        v: sig.v.into(),
        r: sig.r,
        s: sig.s,
        chain_id: Some(U256::from(chain_id)),
        ..Default::default()
    }
}

pub fn zeta_sent_log(
    connector: EthAddress,
    sender: EthAddress,
    dest_chain: u64,
    amount: U256,
    block: u64,
    tx_hash: H256,
) -> Log {
    let mut dest_topic = [0u8; 32];
    U256::from(dest_chain).to_big_endian(&mut dest_topic);
    let data = encode(&[
        Token::Bytes(vec![0x22; 20]),
        Token::Uint(amount),
        Token::Uint(U256::from(250_000u64)),
        Token::Bytes(vec![]),
        Token::Bytes(vec![]),
    ]);
    Log {
        address: connector,
        topics: vec![
            event_topic(ZETA_SENT_SIG),
            H256::from(sender),
            H256::from(sender),
            H256::from(dest_topic),
        ],
        data: data.into(),
        block_number: Some(block.into()),
        transaction_index: Some(0.into()),
        log_index: Some(0.into()),
        transaction_hash: Some(tx_hash),
        ..Default::default()
    }
}

/// A keeper wired for tests: single observer (this validator), the test TSS
/// key, params and gas prices for the observed chain and a BSC-style
/// destination.
pub fn test_keeper(tss: &TestTssSigner) -> CrosschainKeeper {
    let mut fungible = MemFungibleKeeper::new();
    fungible.deploy_gas_coin(TEST_CHAIN_ID, "zrc20_eth_goerli");
    let mut keeper = CrosschainKeeper::new(Box::new(fungible));
    keeper.observer_set = vec![OPERATOR.to_string()];
    keeper.authority = AuthorityKeeper::new(EMERGENCY, ADMIN);
    keeper.tss = TssState {
        tss_pubkey: "zetapub1tss".to_string(),
        eth_address: format!("{:?}", tss.evm_address()),
        btc_address: tss
            .btc_address(bitcoin::Network::Testnet)
            .map(|a| a.to_string())
            .unwrap_or_default(),
    };
    for chain_id in [TEST_CHAIN_ID, 97, ZETA_CHAIN_ID] {
        let mut params = default_chain_params(chain_id);
        params.connector_contract_address = format!("{:?}", connector_address());
        params.erc20_custody_contract_address = format!("{:?}", custody_address());
        keeper.chain_params.insert(chain_id, params);
    }
    for chain_id in [TEST_CHAIN_ID, 97] {
        keeper.set_gas_price(&GasPrice {
            chain_id,
            signers: vec![OPERATOR.to_string()],
            block_nums: vec![1],
            prices: vec![30_000_000_000],
            median_index: 0,
        });
    }
    keeper.begin_block(
        10,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64,
    );
    keeper
}

pub fn pending_gas_cctx(index: &str, chain_id: i64, nonce: u64, receiver: EthAddress) -> CrossChainTx {
    CrossChainTx {
        creator: OPERATOR.to_string(),
        index: index.to_string(),
        zeta_fees: U256::zero(),
        relayed_message: String::new(),
        cctx_status: Status {
            status: CctxStatus::PendingOutbound,
            status_message: String::new(),
            last_update_timestamp: 0,
            is_abort_refunded: false,
        },
        inbound_tx_params: InboundTxParams {
            sender: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            sender_chain_id: ZETA_CHAIN_ID,
            tx_origin: String::new(),
            asset: String::new(),
            amount: U256::exp10(15),
            coin_type: CoinType::Gas,
            inbound_tx_observed_hash: format!("0xin{index}"),
            inbound_tx_observed_external_height: 1,
            inbound_tx_finalized_zeta_height: 1,
            inbound_tx_ballot_index: index.to_string(),
            tx_finalization_status: TxFinalizationStatus::Finalized,
        },
        outbound_tx_params: vec![OutboundTxParams {
            receiver: format!("{receiver:?}"),
            receiver_chain_id: chain_id,
            coin_type: CoinType::Gas,
            amount: U256::exp10(15),
            outbound_tx_tss_nonce: nonce,
            outbound_tx_gas_limit: 90_000,
            outbound_tx_gas_price: "30000000000".to_string(),
            outbound_tx_hash: String::new(),
            outbound_tx_ballot_index: String::new(),
            outbound_tx_observed_external_height: 0,
            outbound_tx_gas_used: 0,
            outbound_tx_effective_gas_price: U256::zero(),
            tss_pubkey: "zetapub1tss".to_string(),
        }],
    }
}

pub struct ObserverHarness {
    pub evm: Arc<MockEvmRpc>,
    pub core: Arc<InProcessZetaCore>,
    pub tss: Arc<TestTssSigner>,
    pub observer: Arc<EvmObserver>,
    pub metrics: Arc<ZetaclientMetrics>,
    _dir: tempfile::TempDir,
}

impl ObserverHarness {
    pub async fn new() -> Self {
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let keeper = Arc::new(Mutex::new(test_keeper(&tss)));
        let core = Arc::new(InProcessZetaCore::new(keeper, OPERATOR));
        let evm = MockEvmRpc::new();
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().to_path_buf();
        let metrics = ZetaclientMetrics::new_for_testing();
        let chain = chain_from_id(TEST_CHAIN_ID).unwrap();
        let mut params: ChainParams = default_chain_params(TEST_CHAIN_ID);
        params.connector_contract_address = format!("{:?}", connector_address());
        params.erc20_custody_contract_address = format!("{:?}", custody_address());

        let store = ObserverStore::open(&db_path, &chain.name).unwrap();
        let observer = EvmObserver::new(
            chain,
            ZETA_CHAIN_ID,
            params,
            evm.clone(),
            core.clone(),
            tss.clone(),
            store,
            metrics.clone(),
            Some(0),
        )
        .await
        .unwrap();

        Self {
            evm,
            core,
            tss,
            observer,
            metrics,
            _dir: dir,
        }
    }

    pub fn chain_id(&self) -> i64 {
        TEST_CHAIN_ID
    }

    pub fn set_cursor(&self, height: u64) {
        self.observer.set_cursor_for_testing(height);
    }

    pub async fn keeper_cctx_count(&self) -> usize {
        let keeper = self.core.keeper();
        let keeper = keeper.lock().await;
        keeper.get_all_cross_chain_tx().len()
    }

    pub async fn first_cctx(&self) -> CrossChainTx {
        let keeper = self.core.keeper();
        let keeper = keeper.lock().await;
        keeper
            .get_all_cross_chain_tx()
            .into_iter()
            .next()
            .expect("no cctx in keeper")
    }

    pub async fn cctx_by_index(&self, index: &str) -> CrossChainTx {
        let keeper = self.core.keeper();
        let keeper = keeper.lock().await;
        keeper.get_cross_chain_tx(index).expect("unknown cctx")
    }

    pub async fn cctx_by_nonce(&self, nonce: u64) -> CrossChainTx {
        let keeper = self.core.keeper();
        let keeper = keeper.lock().await;
        keeper
            .get_cctx_by_nonce(TEST_CHAIN_ID, nonce)
            .expect("no cctx bound to nonce")
    }

    /// Seed a ZetaSent event (message pass to chain 97) at `block`.
    pub async fn add_zeta_sent_event(&self, block: u64, amount_zeta: u64) {
        let log = zeta_sent_log(
            connector_address(),
            EthAddress::repeat_byte(0x11),
            97,
            U256::exp10(18) * amount_zeta,
            block,
            H256::from_low_u64_be(0xbeef_0000 + block),
        );
        self.evm.add_log(log).await;
    }

    /// Seed a native transfer of `wei` into the TSS address at `block`.
    pub async fn add_tss_gas_deposit(&self, block: u64, wei: u64) {
        let user = TestTssSigner::new_with_seed(0x55);
        let tx = make_signed_tx(
            &user,
            TEST_CHAIN_ID as u64,
            0,
            self.tss.evm_address(),
            U256::from(wei),
        );
        let mut tx = tx;
        tx.block_number = Some(block.into());
        let receipt = TransactionReceipt {
            transaction_hash: tx.hash,
            block_number: Some(block.into()),
            status: Some(U64::one()),
            gas_used: Some(U256::from(21_000u64)),
            ..Default::default()
        };
        let mut blk = empty_block(block);
        blk.transactions = vec![tx.clone()];
        self.evm.put_block(block, blk).await;
        self.evm.add_receipt(receipt).await;
        self.evm.add_tx(tx, false).await;
    }

    /// A TSS-signed outbound at `nonce` mined in `mined_block`.
    pub async fn add_signed_outbound(
        &self,
        nonce: u64,
        mined_block: u64,
        success: bool,
    ) -> (Transaction, TransactionReceipt) {
        let mut tx = make_signed_tx(
            &self.tss,
            TEST_CHAIN_ID as u64,
            nonce,
            EthAddress::repeat_byte(0x77),
            U256::exp10(15),
        );
        tx.block_number = Some(mined_block.into());
        tx.transaction_index = Some(0.into());
        let receipt = TransactionReceipt {
            transaction_hash: tx.hash,
            block_number: Some(mined_block.into()),
            transaction_index: 0.into(),
            status: Some(if success { U64::one() } else { U64::zero() }),
            gas_used: Some(U256::from(21_000u64)),
            effective_gas_price: Some(U256::from(30_000_000_000u64)),
            ..Default::default()
        };
        let mut blk = empty_block(mined_block);
        blk.transactions = vec![tx.clone()];
        self.evm.put_block(mined_block, blk).await;
        self.evm.add_tx(tx.clone(), false).await;
        self.evm.add_receipt(receipt.clone()).await;
        (tx, receipt)
    }

    /// A *different* TSS-signed tx for the same nonce, also "mined".
    pub async fn add_signed_outbound_conflicting(
        &self,
        nonce: u64,
        mined_block: u64,
    ) -> (Transaction, TransactionReceipt) {
        let mut tx = make_signed_tx(
            &self.tss,
            TEST_CHAIN_ID as u64,
            nonce,
            EthAddress::repeat_byte(0x78),
            U256::exp10(14),
        );
        tx.block_number = Some(mined_block.into());
        tx.transaction_index = Some(0.into());
        let receipt = TransactionReceipt {
            transaction_hash: tx.hash,
            block_number: Some(mined_block.into()),
            transaction_index: 0.into(),
            status: Some(U64::one()),
            gas_used: Some(U256::from(21_000u64)),
            effective_gas_price: Some(U256::from(30_000_000_000u64)),
            ..Default::default()
        };
        let mut blk = empty_block(mined_block);
        blk.transactions = vec![tx.clone()];
        self.evm.put_block(mined_block, blk).await;
        self.evm.add_tx(tx.clone(), false).await;
        self.evm.add_receipt(receipt.clone()).await;
        (tx, receipt)
    }

    /// An outbound signed by a key that is NOT the TSS.
    pub async fn add_foreign_outbound(
        &self,
        nonce: u64,
        mined_block: u64,
    ) -> (Transaction, TransactionReceipt) {
        let stranger = TestTssSigner::new_with_seed(0x99);
        let mut tx = make_signed_tx(
            &stranger,
            TEST_CHAIN_ID as u64,
            nonce,
            EthAddress::repeat_byte(0x77),
            U256::exp10(15),
        );
        tx.block_number = Some(mined_block.into());
        let receipt = TransactionReceipt {
            transaction_hash: tx.hash,
            block_number: Some(mined_block.into()),
            status: Some(U64::one()),
            ..Default::default()
        };
        self.evm.add_tx(tx.clone(), false).await;
        self.evm.add_receipt(receipt.clone()).await;
        (tx, receipt)
    }

    /// Replace the transactions of a mined block (simulated reorg).
    pub async fn swap_block_transactions(&self, number: u64) {
        let impostor = make_signed_tx(
            &self.tss,
            TEST_CHAIN_ID as u64,
            424242,
            EthAddress::repeat_byte(0x66),
            U256::one(),
        );
        let mut blk = empty_block(number);
        blk.transactions = vec![impostor];
        self.evm.put_block(number, blk).await;
    }

    /// Seed a pending gas CCTX at `nonce` plus its first tracker entry.
    pub async fn add_pending_cctx_with_tracker(&self, nonce: u64, tx_hash: &str) {
        {
            let keeper = self.core.keeper();
            let mut keeper = keeper.lock().await;
            let cctx = pending_gas_cctx(
                &format!("0xcctx{nonce}"),
                TEST_CHAIN_ID,
                nonce,
                EthAddress::repeat_byte(0x77),
            );
            keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        }
        self.keeper_add_tracker_hash(nonce, tx_hash).await;
    }

    pub async fn keeper_add_tracker_hash(&self, nonce: u64, tx_hash: &str) {
        let keeper = self.core.keeper();
        let mut keeper = keeper.lock().await;
        keeper
            .add_to_out_tx_tracker(&MsgAddToOutTxTracker {
                creator: OPERATOR.to_string(),
                chain_id: TEST_CHAIN_ID,
                nonce,
                tx_hash: tx_hash.to_string(),
                proof: None,
                block_hash: String::new(),
                tx_index: 0,
            })
            .unwrap();
    }

    /// A fresh observer over the same persistent store, as after a restart.
    pub async fn rebuild_observer(&self) -> Arc<EvmObserver> {
        let chain = chain_from_id(TEST_CHAIN_ID).unwrap();
        let mut params = default_chain_params(TEST_CHAIN_ID);
        params.connector_contract_address = format!("{:?}", connector_address());
        params.erc20_custody_contract_address = format!("{:?}", custody_address());
        let store = self.observer.store.clone_handle();
        EvmObserver::new(
            chain,
            ZETA_CHAIN_ID,
            params,
            self.evm.clone(),
            self.core.clone(),
            self.tss.clone(),
            store,
            ZetaclientMetrics::new_for_testing(),
            None,
        )
        .await
        .unwrap()
    }
}
