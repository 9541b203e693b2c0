// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The EVM RPC adapter. Responses are validated at this boundary (matching
//! hashes, populated block numbers) so downstream observers never handle
//! half-populated records.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::EvmRpc;
use crate::metered_eth_provider::{new_metered_eth_provider, MeteredEthHttpProvider};
use crate::metrics::ZetaclientMetrics;
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::{
    Address as EthAddress, Block, BlockId, BlockNumber, Bytes, Filter, Log, Transaction,
    TransactionReceipt, TxHash, H256, U256, U64,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct EvmClient<P> {
    provider: Provider<P>,
    chain_id: i64,
}

impl EvmClient<MeteredEthHttpProvider> {
    /// Connect and verify the endpoint serves the expected chain.
    pub async fn connect(
        endpoint: &str,
        chain_id: i64,
        chain_name: &str,
        metrics: Arc<ZetaclientMetrics>,
    ) -> ClientResult<Self> {
        let provider = new_metered_eth_provider(endpoint, chain_name, metrics)
            .map_err(|e| ClientError::Config(format!("bad endpoint {endpoint}: {e}")))?;
        let client = Self { provider, chain_id };
        client.describe().await?;
        Ok(client)
    }
}

impl<P> EvmClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new_from_provider(provider: Provider<P>, chain_id: i64) -> Self {
        Self { provider, chain_id }
    }

    async fn describe(&self) -> ClientResult<()> {
        let remote_chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        if remote_chain_id != U256::from(self.chain_id as u64) {
            return Err(ClientError::Config(format!(
                "chain id mismatch: expected {}, endpoint serves {}; refusing to observe the wrong network",
                self.chain_id, remote_chain_id
            )));
        }
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        info!(
            chain_id = self.chain_id,
            block = block_number.as_u64(),
            "evm client connected"
        );
        Ok(())
    }
}

/// Reject transactions the node returned in a shape we cannot trust.
fn validate_transaction(tx: &Transaction) -> ClientResult<()> {
    if tx.hash == H256::zero() {
        return Err(ClientError::InvalidResponse(
            "transaction with zero hash".to_string(),
        ));
    }
    Ok(())
}

fn validate_mined_block<T>(block: &Block<T>, number: u64) -> ClientResult<()> {
    match block.number {
        Some(n) if n == U64::from(number) => {}
        other => {
            return Err(ClientError::InvalidResponse(format!(
                "block number mismatch: asked {number}, got {other:?}"
            )))
        }
    }
    if block.hash.is_none() {
        return Err(ClientError::InvalidResponse(format!(
            "mined block {number} without hash"
        )));
    }
    Ok(())
}

#[async_trait]
impl<P> EvmRpc for EvmClient<P>
where
    P: JsonRpcClient + 'static,
{
    async fn block_number(&self) -> ClientResult<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(number.as_u64())
    }

    async fn header_by_number(&self, number: u64) -> ClientResult<Block<TxHash>> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumber::Number(number.into())))
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?
            .ok_or_else(|| ClientError::NotFound(format!("block {number}")))?;
        validate_mined_block(&block, number)?;
        Ok(block)
    }

    async fn block_by_number(&self, number: u64) -> ClientResult<Block<Transaction>> {
        let block = self
            .provider
            .get_block_with_txs(BlockId::Number(BlockNumber::Number(number.into())))
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?
            .ok_or_else(|| ClientError::NotFound(format!("block {number}")))?;
        validate_mined_block(&block, number)?;
        for tx in &block.transactions {
            validate_transaction(tx)?;
        }
        Ok(block)
    }

    async fn transaction_by_hash(&self, hash: H256) -> ClientResult<(Transaction, bool)> {
        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?
            .ok_or_else(|| ClientError::NotFound(format!("transaction {hash:?}")))?;
        validate_transaction(&tx)?;
        if tx.hash != hash {
            return Err(ClientError::InvalidResponse(format!(
                "transaction hash mismatch: asked {hash:?}, got {:?}",
                tx.hash
            )));
        }
        let is_pending = tx.block_number.is_none();
        Ok((tx, is_pending))
    }

    async fn transaction_receipt(&self, hash: H256) -> ClientResult<Option<TransactionReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        if let Some(receipt) = &receipt {
            if receipt.block_number.is_none() {
                warn!(?hash, "receipt without block number, treating as unmined");
                return Ok(None);
            }
        }
        Ok(receipt)
    }

    async fn suggest_gas_price(&self) -> ClientResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn filter_logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: EthAddress,
        topic0: H256,
    ) -> ClientResult<Vec<Log>> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(address)
            .topic0(topic0);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        // Safeguard: every log must come from the requested contract.
        for log in &logs {
            if log.address != address {
                return Err(ClientError::InvalidResponse(format!(
                    "provider returned log from {:?}, expected {:?}",
                    log.address, address
                )));
            }
        }
        Ok(logs)
    }
}
