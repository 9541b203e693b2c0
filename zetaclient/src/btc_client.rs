// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bitcoin RPC adapter over bitcoincore-rpc. The underlying client is
//! blocking; calls are bridged onto the blocking pool.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::BtcRpc;
use async_trait::async_trait;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use std::sync::Arc;
use tracing::info;

/// Default conf target for fee estimation, blocks.
const FEE_ESTIMATE_CONF_TARGET: u16 = 1;
/// Fallback fee rate when the node has no estimate (fresh regtest), sat/vB.
const FALLBACK_FEE_RATE_SAT_PER_VB: u64 = 5;

pub struct BtcCoreClient {
    client: Arc<Client>,
}

impl BtcCoreClient {
    pub fn connect(endpoint: &str, user: &str, password: &str) -> ClientResult<Self> {
        let auth = if user.is_empty() {
            Auth::None
        } else {
            Auth::UserPass(user.to_string(), password.to_string())
        };
        let client = Client::new(endpoint, auth)
            .map_err(|e| ClientError::Config(format!("btc endpoint {endpoint}: {e}")))?;
        info!(endpoint, "btc client connected");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn blocking<T, F>(&self, call: F) -> ClientResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> Result<T, bitcoincore_rpc::Error> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| ClientError::Rpc(format!("btc rpc task join: {e}")))?
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl BtcRpc for BtcCoreClient {
    async fn get_block_count(&self) -> ClientResult<u64> {
        self.blocking(|c| c.get_block_count()).await
    }

    async fn get_block_hash(&self, height: u64) -> ClientResult<bitcoin::BlockHash> {
        self.blocking(move |c| c.get_block_hash(height)).await
    }

    async fn get_block(&self, hash: &bitcoin::BlockHash) -> ClientResult<bitcoin::Block> {
        let hash = *hash;
        self.blocking(move |c| c.get_block(&hash)).await
    }

    async fn get_raw_transaction(
        &self,
        txid: &bitcoin::Txid,
    ) -> ClientResult<(bitcoin::Transaction, u64)> {
        let txid = *txid;
        let info = self
            .blocking(move |c| c.get_raw_transaction_info(&txid, None))
            .await?;
        let tx = info
            .transaction()
            .map_err(|e| ClientError::InvalidResponse(format!("undecodable raw tx: {e}")))?;
        Ok((tx, info.confirmations.unwrap_or(0) as u64))
    }

    async fn send_raw_transaction(&self, tx: &bitcoin::Transaction) -> ClientResult<bitcoin::Txid> {
        let tx = tx.clone();
        self.blocking(move |c| c.send_raw_transaction(&tx)).await
    }

    async fn estimate_fee_rate(&self) -> ClientResult<u64> {
        let estimate = self
            .blocking(|c| c.estimate_smart_fee(FEE_ESTIMATE_CONF_TARGET, None))
            .await?;
        Ok(estimate
            .fee_rate
            .map(|rate| (rate.to_sat() / 1000).max(1))
            .unwrap_or(FALLBACK_FEE_RATE_SAT_PER_VB))
    }
}
