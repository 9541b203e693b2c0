// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Prefix-keyed ordered KV backing the crosschain module. Every record type
//! lives under its own typed prefix so genesis export can walk one prefix at
//! a time in key order.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

pub const SEND_KEY: &str = "Send-value-";
pub const LAST_BLOCK_HEIGHT_KEY: &str = "LastBlockHeight-value-";
pub const FINALIZED_INBOUNDS_KEY: &str = "FinalizedInbounds-value-";
pub const GAS_PRICE_KEY: &str = "GasPrice-value-";
pub const OUT_TX_TRACKER_KEY_PREFIX: &str = "OutTxTracker-value-";
pub const IN_TX_TRACKER_KEY_PREFIX: &str = "InTxTracker-value-";
pub const IN_TX_HASH_TO_CCTX_KEY: &str = "InTxHashToCctx-value-";
pub const ZETA_ACCOUNTING_KEY: &str = "ZetaAccounting-value-";
pub const NONCE_TO_CCTX_KEY: &str = "NonceToCctx-value-";
pub const CHAIN_NONCES_KEY: &str = "ChainNonces-value-";
pub const BLOCK_HEADER_KEY: &str = "BlockHeader-value-";
pub const BLOCK_HEADER_STATE_KEY: &str = "BlockHeaderState-value-";

pub fn out_tx_tracker_index(chain_id: i64, nonce: u64) -> String {
    format!("{chain_id}/{nonce}/")
}

pub fn in_tx_tracker_index(chain_id: i64, tx_hash: &str) -> String {
    format!("{chain_id}/{tx_hash}")
}

pub fn nonce_to_cctx_index(tss_pubkey: &str, chain_id: i64, nonce: u64) -> String {
    format!("{tss_pubkey}/{chain_id}/{nonce}")
}

/// Ordered KV store with a JSON codec. A persisted record that fails to
/// decode implies state corruption; that is a panic, not an error.
#[derive(Debug, Default, Clone)]
pub struct CrosschainStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl CrosschainStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(prefix: &str, key: &str) -> Vec<u8> {
        let mut k = prefix.as_bytes().to_vec();
        k.extend_from_slice(key.as_bytes());
        k
    }

    pub fn set<T: Serialize>(&mut self, prefix: &str, key: &str, value: &T) {
        let bytes = serde_json::to_vec(value).expect("record encoding should not fail");
        self.map.insert(Self::full_key(prefix, key), bytes);
    }

    pub fn get<T: DeserializeOwned>(&self, prefix: &str, key: &str) -> Option<T> {
        self.map.get(&Self::full_key(prefix, key)).map(|bytes| {
            serde_json::from_slice(bytes)
                .unwrap_or_else(|e| panic!("corrupt record under {prefix}{key}: {e}"))
        })
    }

    pub fn has(&self, prefix: &str, key: &str) -> bool {
        self.map.contains_key(&Self::full_key(prefix, key))
    }

    pub fn delete(&mut self, prefix: &str, key: &str) {
        self.map.remove(&Self::full_key(prefix, key));
    }

    /// All records under a prefix, in key order.
    pub fn iterate_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Vec<(String, T)> {
        let pref = prefix.as_bytes();
        self.map
            .range(pref.to_vec()..)
            .take_while(|(k, _)| k.starts_with(pref))
            .map(|(k, v)| {
                let key = String::from_utf8_lossy(&k[pref.len()..]).to_string();
                let value = serde_json::from_slice(v)
                    .unwrap_or_else(|e| panic!("corrupt record under {prefix}{key}: {e}"));
                (key, value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
