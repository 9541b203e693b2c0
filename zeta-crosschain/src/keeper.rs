// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::ballot::{Ballot, ObservationType};
use crate::fungible::FungibleKeeper;
use crate::observer::{AuthorityKeeper, CrosschainFlags, KeeperParams, PolicyType, TssState};
use crate::store::{
    in_tx_tracker_index, nonce_to_cctx_index, out_tx_tracker_index, CrosschainStore,
    BLOCK_HEADER_KEY, BLOCK_HEADER_STATE_KEY, CHAIN_NONCES_KEY, FINALIZED_INBOUNDS_KEY,
    GAS_PRICE_KEY, IN_TX_HASH_TO_CCTX_KEY, IN_TX_TRACKER_KEY_PREFIX, LAST_BLOCK_HEIGHT_KEY,
    NONCE_TO_CCTX_KEY, OUT_TX_TRACKER_KEY_PREFIX, SEND_KEY, ZETA_ACCOUNTING_KEY,
};
use std::collections::BTreeMap;
use zeta_chain_types::{
    BlockHeader, BlockHeaderState, ChainNonces, ChainParams, CoinType, CrossChainTx,
    CrosschainError, CrosschainResult, GasPrice, InTxHashToCctx, InTxTracker, LastBlockHeight,
    NonceToCctx, OutTxTracker, ZetaAccounting,
};

/// Owns every record of the crosschain module and enforces its invariants.
/// Message handlers live in the `msg_*` modules; this type provides storage
/// CRUD plus the combined setters that keep the secondary indexes in sync.
pub struct CrosschainKeeper {
    pub(crate) store: CrosschainStore,
    pub observer_set: Vec<String>,
    pub authority: AuthorityKeeper,
    pub flags: CrosschainFlags,
    pub tss: TssState,
    pub chain_params: BTreeMap<i64, ChainParams>,
    pub params: KeeperParams,
    pub fungible: Box<dyn FungibleKeeper>,
    pub(crate) ballots: BTreeMap<String, Ballot>,
    zeta_block_height: u64,
    block_time_unix: i64,
}

impl CrosschainKeeper {
    pub fn new(fungible: Box<dyn FungibleKeeper>) -> Self {
        Self {
            store: CrosschainStore::new(),
            observer_set: Vec::new(),
            authority: AuthorityKeeper::default(),
            flags: CrosschainFlags::default(),
            tss: TssState::default(),
            chain_params: BTreeMap::new(),
            params: KeeperParams::default(),
            fungible,
            ballots: BTreeMap::new(),
            zeta_block_height: 1,
            block_time_unix: 0,
        }
    }

    /// Advance the consensus clock; called once per ZetaCore block.
    pub fn begin_block(&mut self, height: u64, time_unix: i64) {
        self.zeta_block_height = height;
        self.block_time_unix = time_unix;
    }

    pub fn zeta_block_height(&self) -> u64 {
        self.zeta_block_height
    }

    pub fn block_time_unix(&self) -> i64 {
        self.block_time_unix
    }

    pub fn is_observer(&self, creator: &str) -> bool {
        self.observer_set.iter().any(|o| o == creator)
    }

    pub fn is_authorized(&self, creator: &str, policy: PolicyType) -> bool {
        self.authority.is_authorized(creator, policy)
    }

    pub fn supported_chain_params(&self, chain_id: i64) -> CrosschainResult<&ChainParams> {
        self.chain_params
            .get(&chain_id)
            .filter(|p| p.is_supported)
            .ok_or(CrosschainError::UnsupportedChain(chain_id))
    }

    // ---- ballots ----

    pub(crate) fn find_or_create_ballot(
        &mut self,
        identifier: &str,
        observation_type: ObservationType,
    ) -> &mut Ballot {
        if !self.ballots.contains_key(identifier) {
            let ballot = Ballot::new(
                identifier.to_string(),
                observation_type,
                self.observer_set.clone(),
            );
            self.ballots.insert(identifier.to_string(), ballot);
        }
        self.ballots.get_mut(identifier).expect("just inserted")
    }

    pub fn ballot(&self, identifier: &str) -> Option<&Ballot> {
        self.ballots.get(identifier)
    }

    // ---- CCTX ----

    pub fn set_cross_chain_tx(&mut self, cctx: &CrossChainTx) {
        self.store.set(SEND_KEY, &cctx.index, cctx);
    }

    pub fn get_cross_chain_tx(&self, index: &str) -> Option<CrossChainTx> {
        self.store.get(SEND_KEY, index)
    }

    pub fn get_all_cross_chain_tx(&self) -> Vec<CrossChainTx> {
        self.store
            .iterate_prefix::<CrossChainTx>(SEND_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    /// Store a CCTX and keep the secondary indexes in sync:
    /// 1. the record itself, 2. inbound hash → cctx indexes, 3. the
    /// nonce → cctx binding while pending, 4. the aborted-ZETA accounting.
    pub fn set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&mut self, cctx: &CrossChainTx) {
        self.set_cross_chain_tx(cctx);

        let in_hash = cctx.inbound_tx_params.inbound_tx_observed_hash.clone();
        let mut mapping: InTxHashToCctx = self
            .store
            .get(IN_TX_HASH_TO_CCTX_KEY, &in_hash)
            .unwrap_or_default();
        mapping.in_tx_hash = in_hash.clone();
        if !mapping.cctx_index.iter().any(|i| i == &cctx.index) {
            mapping.cctx_index.push(cctx.index.clone());
        }
        self.store.set(IN_TX_HASH_TO_CCTX_KEY, &in_hash, &mapping);

        let outbound = cctx.current_outbound();
        match cctx.cctx_status.status {
            s if s.is_pending() && s != zeta_chain_types::CctxStatus::PendingInbound => {
                self.set_nonce_to_cctx(&NonceToCctx {
                    chain_id: outbound.receiver_chain_id,
                    nonce: outbound.outbound_tx_tss_nonce,
                    cctx_index: cctx.index.clone(),
                    tss_pubkey: self.tss.tss_pubkey.clone(),
                });
            }
            zeta_chain_types::CctxStatus::Aborted if outbound.coin_type == CoinType::Zeta => {
                self.add_zeta_aborted_amount(cctx.aborted_amount());
            }
            _ => {}
        }
    }

    pub fn get_in_tx_hash_to_cctx(&self, in_tx_hash: &str) -> Option<InTxHashToCctx> {
        self.store.get(IN_TX_HASH_TO_CCTX_KEY, in_tx_hash)
    }

    pub fn set_in_tx_hash_to_cctx(&mut self, mapping: &InTxHashToCctx) {
        self.store
            .set(IN_TX_HASH_TO_CCTX_KEY, &mapping.in_tx_hash.clone(), mapping);
    }

    pub fn get_all_in_tx_hash_to_cctx(&self) -> Vec<InTxHashToCctx> {
        self.store
            .iterate_prefix::<InTxHashToCctx>(IN_TX_HASH_TO_CCTX_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    // ---- nonce index ----

    pub fn set_nonce_to_cctx(&mut self, binding: &NonceToCctx) {
        let key = nonce_to_cctx_index(&binding.tss_pubkey, binding.chain_id, binding.nonce);
        self.store.set(NONCE_TO_CCTX_KEY, &key, binding);
    }

    pub fn get_nonce_to_cctx(&self, tss_pubkey: &str, chain_id: i64, nonce: u64) -> Option<NonceToCctx> {
        self.store
            .get(NONCE_TO_CCTX_KEY, &nonce_to_cctx_index(tss_pubkey, chain_id, nonce))
    }

    pub fn remove_nonce_to_cctx(&mut self, tss_pubkey: &str, chain_id: i64, nonce: u64) {
        self.store
            .delete(NONCE_TO_CCTX_KEY, &nonce_to_cctx_index(tss_pubkey, chain_id, nonce));
    }

    pub fn get_cctx_by_nonce(&self, chain_id: i64, nonce: u64) -> Option<CrossChainTx> {
        let binding = self.get_nonce_to_cctx(&self.tss.tss_pubkey, chain_id, nonce)?;
        self.get_cross_chain_tx(&binding.cctx_index)
    }

    /// CCTXs currently bound in the nonce index for a chain, nonce order.
    pub fn get_pending_cctxs(&self, chain_id: i64) -> Vec<CrossChainTx> {
        let mut bindings: Vec<NonceToCctx> = self
            .store
            .iterate_prefix::<NonceToCctx>(NONCE_TO_CCTX_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .filter(|b| b.chain_id == chain_id && b.tss_pubkey == self.tss.tss_pubkey)
            .collect();
        bindings.sort_by_key(|b| b.nonce);
        bindings
            .iter()
            .filter_map(|b| self.get_cross_chain_tx(&b.cctx_index))
            .collect()
    }

    // ---- chain nonces ----

    pub fn get_and_increment_nonce(&mut self, chain_id: i64) -> u64 {
        let key = chain_id.to_string();
        let mut nonces: ChainNonces = self
            .store
            .get(CHAIN_NONCES_KEY, &key)
            .unwrap_or(ChainNonces { chain_id, nonce: 0 });
        let assigned = nonces.nonce;
        nonces.nonce += 1;
        self.store.set(CHAIN_NONCES_KEY, &key, &nonces);
        assigned
    }

    pub fn get_chain_nonces(&self, chain_id: i64) -> Option<ChainNonces> {
        self.store.get(CHAIN_NONCES_KEY, &chain_id.to_string())
    }

    pub fn set_chain_nonces(&mut self, nonces: &ChainNonces) {
        self.store
            .set(CHAIN_NONCES_KEY, &nonces.chain_id.to_string(), nonces);
    }

    pub fn get_all_chain_nonces(&self) -> Vec<ChainNonces> {
        self.store
            .iterate_prefix::<ChainNonces>(CHAIN_NONCES_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    // ---- trackers ----

    pub fn set_out_tx_tracker(&mut self, tracker: &OutTxTracker) {
        let key = out_tx_tracker_index(tracker.chain_id, tracker.nonce);
        self.store.set(OUT_TX_TRACKER_KEY_PREFIX, &key, tracker);
    }

    pub fn get_out_tx_tracker(&self, chain_id: i64, nonce: u64) -> Option<OutTxTracker> {
        self.store
            .get(OUT_TX_TRACKER_KEY_PREFIX, &out_tx_tracker_index(chain_id, nonce))
    }

    pub fn remove_out_tx_tracker(&mut self, chain_id: i64, nonce: u64) {
        self.store
            .delete(OUT_TX_TRACKER_KEY_PREFIX, &out_tx_tracker_index(chain_id, nonce));
    }

    /// Trackers for one chain in ascending nonce order.
    pub fn get_all_out_tx_tracker_by_chain(&self, chain_id: i64) -> Vec<OutTxTracker> {
        let mut trackers: Vec<OutTxTracker> = self
            .store
            .iterate_prefix::<OutTxTracker>(OUT_TX_TRACKER_KEY_PREFIX)
            .into_iter()
            .map(|(_, v)| v)
            .filter(|t| t.chain_id == chain_id)
            .collect();
        trackers.sort_by_key(|t| t.nonce);
        trackers
    }

    pub fn get_all_out_tx_tracker(&self) -> Vec<OutTxTracker> {
        self.store
            .iterate_prefix::<OutTxTracker>(OUT_TX_TRACKER_KEY_PREFIX)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn set_in_tx_tracker(&mut self, tracker: &InTxTracker) {
        let key = in_tx_tracker_index(tracker.chain_id, &tracker.tx_hash);
        self.store.set(IN_TX_TRACKER_KEY_PREFIX, &key, tracker);
    }

    pub fn get_in_tx_tracker(&self, chain_id: i64, tx_hash: &str) -> Option<InTxTracker> {
        self.store
            .get(IN_TX_TRACKER_KEY_PREFIX, &in_tx_tracker_index(chain_id, tx_hash))
    }

    pub fn remove_in_tx_tracker(&mut self, chain_id: i64, tx_hash: &str) {
        self.store
            .delete(IN_TX_TRACKER_KEY_PREFIX, &in_tx_tracker_index(chain_id, tx_hash));
    }

    pub fn get_all_in_tx_tracker(&self) -> Vec<InTxTracker> {
        self.store
            .iterate_prefix::<InTxTracker>(IN_TX_TRACKER_KEY_PREFIX)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn get_all_in_tx_tracker_by_chain(&self, chain_id: i64) -> Vec<InTxTracker> {
        self.get_all_in_tx_tracker()
            .into_iter()
            .filter(|t| t.chain_id == chain_id)
            .collect()
    }

    // ---- finalized inbounds ----

    pub fn is_finalized_inbound(&self, chain_id: i64, tx_hash: &str, event_index: u64) -> bool {
        let key = zeta_chain_types::finalized_inbound_key(chain_id, tx_hash, event_index);
        self.store.has(FINALIZED_INBOUNDS_KEY, &key)
    }

    pub fn set_finalized_inbound(&mut self, chain_id: i64, tx_hash: &str, event_index: u64) {
        let key = zeta_chain_types::finalized_inbound_key(chain_id, tx_hash, event_index);
        self.store.set(FINALIZED_INBOUNDS_KEY, &key, &true);
    }

    /// Restore a finalized-inbound marker from its exported key.
    pub fn set_finalized_inbound_raw(&mut self, key: &str) {
        self.store.set(FINALIZED_INBOUNDS_KEY, key, &true);
    }

    pub fn get_all_finalized_inbound(&self) -> Vec<String> {
        self.store
            .iterate_prefix::<bool>(FINALIZED_INBOUNDS_KEY)
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    // ---- gas price ----

    pub fn set_gas_price(&mut self, price: &GasPrice) {
        self.store
            .set(GAS_PRICE_KEY, &price.chain_id.to_string(), price);
    }

    pub fn get_gas_price(&self, chain_id: i64) -> Option<GasPrice> {
        self.store.get(GAS_PRICE_KEY, &chain_id.to_string())
    }

    pub fn get_all_gas_price(&self) -> Vec<GasPrice> {
        self.store
            .iterate_prefix::<GasPrice>(GAS_PRICE_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    pub fn median_gas_price(&self, chain_id: i64) -> Option<u64> {
        self.get_gas_price(chain_id).and_then(|g| g.median_price())
    }

    // ---- last block heights ----

    pub fn set_last_block_height(&mut self, height: &LastBlockHeight) {
        self.store
            .set(LAST_BLOCK_HEIGHT_KEY, &height.chain_id.to_string(), height);
    }

    pub fn get_last_block_height(&self, chain_id: i64) -> Option<LastBlockHeight> {
        self.store.get(LAST_BLOCK_HEIGHT_KEY, &chain_id.to_string())
    }

    pub fn get_all_last_block_height(&self) -> Vec<LastBlockHeight> {
        self.store
            .iterate_prefix::<LastBlockHeight>(LAST_BLOCK_HEIGHT_KEY)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    // ---- zeta accounting ----

    pub fn get_zeta_accounting(&self) -> ZetaAccounting {
        self.store
            .get(ZETA_ACCOUNTING_KEY, "")
            .unwrap_or_default()
    }

    pub fn set_zeta_accounting(&mut self, accounting: &ZetaAccounting) {
        self.store.set(ZETA_ACCOUNTING_KEY, "", accounting);
    }

    pub fn add_zeta_aborted_amount(&mut self, amount: ethers::types::U256) {
        let mut accounting = self.get_zeta_accounting();
        accounting.aborted_zeta_amount = accounting.aborted_zeta_amount.saturating_add(amount);
        self.set_zeta_accounting(&accounting);
    }

    // ---- block headers ----

    pub fn set_block_header(&mut self, header: &BlockHeader) {
        self.store
            .set(BLOCK_HEADER_KEY, &hex::encode(&header.hash), header);
    }

    pub fn get_block_header(&self, hash: &[u8]) -> Option<BlockHeader> {
        self.store.get(BLOCK_HEADER_KEY, &hex::encode(hash))
    }

    pub fn set_block_header_state(&mut self, state: &BlockHeaderState) {
        self.store
            .set(BLOCK_HEADER_STATE_KEY, &state.chain_id.to_string(), state);
    }

    pub fn get_block_header_state(&self, chain_id: i64) -> Option<BlockHeaderState> {
        self.store
            .get(BLOCK_HEADER_STATE_KEY, &chain_id.to_string())
    }
}
