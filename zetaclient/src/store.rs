// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-validator persistent store backing the scan cursor and confirmed
//! outbound receipts, so a restarted observer resumes where it stopped
//! instead of re-scanning from the tip.

use crate::error::{ClientError, ClientResult};
use ethers::types::{Transaction, TransactionReceipt};
use std::path::Path;

const RECEIPTS_TREE: &str = "receipts";
const TRANSACTIONS_TREE: &str = "transactions";
const LAST_BLOCK_TREE: &str = "last_block";

const LAST_BLOCK_KEY: &[u8] = b"last_scanned";

pub struct ObserverStore {
    receipts: sled::Tree,
    transactions: sled::Tree,
    last_block: sled::Tree,
}

impl ObserverStore {
    /// Open (or create) the store for one chain under `db_path`.
    pub fn open(db_path: &Path, chain_name: &str) -> ClientResult<Self> {
        let db = sled::open(db_path.join(chain_name))
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(Self {
            receipts: db
                .open_tree(RECEIPTS_TREE)
                .map_err(|e| ClientError::Db(e.to_string()))?,
            transactions: db
                .open_tree(TRANSACTIONS_TREE)
                .map_err(|e| ClientError::Db(e.to_string()))?,
            last_block: db
                .open_tree(LAST_BLOCK_TREE)
                .map_err(|e| ClientError::Db(e.to_string()))?,
        })
    }

    pub fn set_last_block_scanned(&self, height: u64) -> ClientResult<()> {
        self.last_block
            .insert(LAST_BLOCK_KEY, &height.to_be_bytes())
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(())
    }

    pub fn get_last_block_scanned(&self) -> ClientResult<Option<u64>> {
        let value = self
            .last_block
            .get(LAST_BLOCK_KEY)
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(value.map(|bytes| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes);
            u64::from_be_bytes(raw)
        }))
    }

    /// Persist a confirmed `(receipt, tx)` pair under its nonce.
    pub fn save_confirmed(
        &self,
        nonce: u64,
        receipt: &TransactionReceipt,
        tx: &Transaction,
    ) -> ClientResult<()> {
        let key = nonce.to_be_bytes();
        let receipt_bytes =
            serde_json::to_vec(receipt).map_err(|e| ClientError::Db(e.to_string()))?;
        let tx_bytes = serde_json::to_vec(tx).map_err(|e| ClientError::Db(e.to_string()))?;
        self.receipts
            .insert(key, receipt_bytes)
            .map_err(|e| ClientError::Db(e.to_string()))?;
        self.transactions
            .insert(key, tx_bytes)
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(())
    }

    /// All confirmed pairs, for rebuilding the in-memory map on restart.
    /// A persisted record that fails to decode implies corruption: panic.
    pub fn load_confirmed(&self) -> ClientResult<Vec<(u64, TransactionReceipt, Transaction)>> {
        let mut out = Vec::new();
        for entry in self.receipts.iter() {
            let (key, receipt_bytes) = entry.map_err(|e| ClientError::Db(e.to_string()))?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&key);
            let nonce = u64::from_be_bytes(raw);
            let receipt: TransactionReceipt = serde_json::from_slice(&receipt_bytes)
                .unwrap_or_else(|e| panic!("corrupt receipt record for nonce {nonce}: {e}"));
            let tx_bytes = self
                .transactions
                .get(key)
                .map_err(|e| ClientError::Db(e.to_string()))?;
            let Some(tx_bytes) = tx_bytes else {
                continue;
            };
            let tx: Transaction = serde_json::from_slice(&tx_bytes)
                .unwrap_or_else(|e| panic!("corrupt transaction record for nonce {nonce}: {e}"));
            out.push((nonce, receipt, tx));
        }
        Ok(out)
    }

    /// Drop a confirmed pair once ZetaCore finalized the nonce.
    pub fn remove_confirmed(&self, nonce: u64) -> ClientResult<()> {
        let key = nonce.to_be_bytes();
        self.receipts
            .remove(key)
            .map_err(|e| ClientError::Db(e.to_string()))?;
        self.transactions
            .remove(key)
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(())
    }

    /// A second handle over the same trees; used to model a restart in
    /// tests without releasing the sled file lock.
    pub fn clone_handle(&self) -> Self {
        Self {
            receipts: self.receipts.clone(),
            transactions: self.transactions.clone(),
            last_block: self.last_block.clone(),
        }
    }

    pub fn flush(&self) -> ClientResult<()> {
        self.receipts
            .flush()
            .and_then(|_| self.transactions.flush())
            .and_then(|_| self.last_block.flush())
            .map_err(|e| ClientError::Db(e.to_string()))?;
        Ok(())
    }
}
