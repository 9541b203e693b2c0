// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Outbound signing: the per-chain scheduler that turns pending CCTXs into
//! signed, broadcast and tracker-registered transactions, with fee-bumped
//! retries while a nonce stays pending.

pub mod btc;
pub mod evm;

use crate::error::{ClientError, ClientResult};
use crate::interfaces::{TssSignature, TssSigner, ZetaCoreClient};
use crate::observer::evm::{bump_gas_price, EvmObserver};
use crate::signer::evm::EvmSigner;
use async_trait::async_trait;
use bitcoin::Network;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::types::{Address as EthAddress, U256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
use zeta_chain_types::{Chain, CrossChainTx, MsgAddToOutTxTracker};

/// A TSS signer backed by a local secp256k1 key. Stands in for the real
/// threshold network in tests and single-node development runs.
pub struct TestTssSigner {
    key: SigningKey,
}

impl TestTssSigner {
    pub fn new_deterministic() -> Self {
        Self::new_with_seed(0x42)
    }

    pub fn new_with_seed(seed: u8) -> Self {
        let bytes = [seed; 32];
        Self {
            key: SigningKey::from_slice(&bytes).expect("nonzero seed is a valid scalar"),
        }
    }

    pub fn sign_recoverable_sync(&self, digest: [u8; 32]) -> TssSignature {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .expect("signing cannot fail on a valid digest");
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        TssSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        }
    }
}

#[async_trait]
impl TssSigner for TestTssSigner {
    fn pubkey(&self) -> String {
        "zetapub1tss".to_string()
    }

    fn evm_address(&self) -> EthAddress {
        let verifying = self.key.verifying_key();
        let point = verifying.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        EthAddress::from_slice(&hash[12..])
    }

    fn btc_pubkey(&self) -> [u8; 33] {
        let verifying = self.key.verifying_key();
        let point = verifying.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    fn btc_address(&self, network: Network) -> ClientResult<bitcoin::Address> {
        let pubkey = bitcoin::PublicKey::from_slice(&self.btc_pubkey())
            .map_err(|e| ClientError::Tss(e.to_string()))?;
        bitcoin::Address::p2wpkh(&pubkey, network).map_err(|e| ClientError::Tss(e.to_string()))
    }

    async fn sign(&self, digest: [u8; 32]) -> ClientResult<TssSignature> {
        Ok(self.sign_recoverable_sync(digest))
    }
}

struct BroadcastState {
    last_broadcast: Instant,
    gas_price: U256,
    attempts: u32,
}

/// Drives outbound processing for one EVM chain: pick up pending CCTXs,
/// confirm landed ones through the observer, (re)broadcast the rest.
pub struct OutboundScheduler {
    chain: Chain,
    signer: EvmSigner,
    core: Arc<dyn ZetaCoreClient>,
    observer: Arc<EvmObserver>,
    broadcasts: Mutex<HashMap<u64, BroadcastState>>,
}

impl OutboundScheduler {
    pub fn new(
        chain: Chain,
        signer: EvmSigner,
        core: Arc<dyn ZetaCoreClient>,
        observer: Arc<EvmObserver>,
    ) -> Self {
        Self {
            chain,
            signer,
            core,
            observer,
            broadcasts: Mutex::new(HashMap::new()),
        }
    }

    /// One scheduling pass over the pending CCTXs of this chain.
    pub async fn schedule(&self) -> ClientResult<()> {
        let flags = self.core.get_crosschain_flags().await?;
        if !flags.is_outbound_enabled {
            return Ok(());
        }
        let params = self.observer.chain_params().await;
        let cctxs = self.core.get_pending_cctxs(self.chain.id).await?;
        let lookahead = params.outbound_tx_schedule_lookahead.max(1) as usize;

        for cctx in cctxs.iter().take(lookahead) {
            let nonce = cctx.current_outbound().outbound_tx_tss_nonce;

            // already landed: vote instead of re-signing
            if self.observer.is_tx_confirmed(nonce).await {
                match self.observer.is_send_outtx_processed(cctx).await {
                    Ok((_, true)) => {
                        self.broadcasts.lock().await.remove(&nonce);
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(chain = %self.chain, nonce, "outbound vote failed: {e}");
                        continue;
                    }
                }
            }

            let retry_interval =
                std::time::Duration::from_secs(flags.gas_price_increase_flags.retry_interval_seconds);
            let decision = {
                let broadcasts = self.broadcasts.lock().await;
                match broadcasts.get(&nonce) {
                    None => Some((cctx_gas_price(cctx)?, 0)),
                    Some(state) if state.last_broadcast.elapsed() >= retry_interval => {
                        let bumped = bump_gas_price(
                            state.gas_price,
                            flags.gas_price_increase_flags.gas_price_increase_percent as u64,
                            flags.gas_price_increase_flags.gas_price_increase_max as u64,
                        );
                        Some((bumped, state.attempts + 1))
                    }
                    Some(_) => None,
                }
            };
            let Some((gas_price, attempts)) = decision else {
                continue;
            };

            match self.sign_broadcast_and_track(cctx, gas_price).await {
                Ok(tx_hash) => {
                    if attempts > 0 {
                        self.observer
                            .metrics
                            .outbound_fee_bumps
                            .with_label_values(&[&self.chain.name])
                            .inc();
                    }
                    self.broadcasts.lock().await.insert(
                        nonce,
                        BroadcastState {
                            last_broadcast: Instant::now(),
                            gas_price,
                            attempts,
                        },
                    );
                    info!(chain = %self.chain, nonce, ?tx_hash, attempts, "outbound broadcast");
                }
                Err(e) => {
                    warn!(chain = %self.chain, nonce, "outbound broadcast failed: {e}");
                }
            }
        }
        Ok(())
    }

    async fn sign_broadcast_and_track(
        &self,
        cctx: &CrossChainTx,
        gas_price: U256,
    ) -> ClientResult<ethers::types::H256> {
        let params = self.observer.chain_params().await;
        let tx_hash = self.signer.sign_and_broadcast(cctx, gas_price, &params).await?;
        self.observer
            .metrics
            .outbound_broadcasts
            .with_label_values(&[&self.chain.name])
            .inc();

        let nonce = cctx.current_outbound().outbound_tx_tss_nonce;
        // the tracker is the primary channel through which confirmers learn
        // of candidate hashes
        let is_removed = self
            .core
            .add_to_out_tx_tracker(MsgAddToOutTxTracker {
                creator: self.core.operator_address(),
                chain_id: self.chain.id,
                nonce,
                tx_hash: format!("{tx_hash:?}"),
                proof: None,
                block_hash: String::new(),
                tx_index: 0,
            })
            .await?;
        if is_removed {
            self.observer.forget_nonce(nonce).await;
            self.broadcasts.lock().await.remove(&nonce);
        }
        self.observer.push_broadcast_hint(nonce, tx_hash).await;
        Ok(tx_hash)
    }
}

fn cctx_gas_price(cctx: &CrossChainTx) -> ClientResult<U256> {
    let raw = &cctx.current_outbound().outbound_tx_gas_price;
    U256::from_dec_str(raw)
        .map_err(|_| ClientError::InvalidResponse(format!("bad cctx gas price {raw:?}")))
}
