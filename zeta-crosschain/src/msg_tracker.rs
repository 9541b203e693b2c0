// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tracker ingestion: candidate outbound hashes per nonce and inbound scan
//! hints, with optional Merkle-proof authorization.

use crate::keeper::CrosschainKeeper;
use crate::observer::PolicyType;
use bitcoin::consensus::deserialize as btc_deserialize;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::Address as EthAddress;
use ethers::utils::keccak256;
use ethers::utils::rlp::Rlp;
use tracing::info;
use zeta_chain_types::{
    btc_net_params, is_bitcoin_chain, is_evm_chain, nonce_mark_amount, CoinType, CrosschainError,
    CrosschainResult, InTxTracker, MsgAddToInTxTracker, MsgAddToOutTxTracker,
    MsgAddToOutTxTrackerResponse, OutTxTracker, TxHashOnTracker,
};

/// Unproved tracker entries are capped; proved entries are unbounded.
pub const MAX_UNPROVED_TRACKER_HASHES: usize = 2;

impl CrosschainKeeper {
    /// Add a candidate hash to the outbound tracker for `(chain, nonce)`.
    ///
    /// Without a proof the caller must be the emergency-group admin or an
    /// observer; with a valid proof anyone may submit. When the nonce's CCTX
    /// is no longer pending the tracker is removed and `is_removed` returned
    /// so the caller discards its state.
    pub fn add_to_out_tx_tracker(
        &mut self,
        msg: &MsgAddToOutTxTracker,
    ) -> CrosschainResult<MsgAddToOutTxTrackerResponse> {
        msg.validate_basic()?;
        self.supported_chain_params(msg.chain_id)?;

        let cctx = self
            .get_cctx_by_nonce(msg.chain_id, msg.nonce)
            .or_else(|| {
                // fall back to a full scan: the nonce may already be finalized
                self.get_all_cross_chain_tx().into_iter().find(|c| {
                    let outbound = c.current_outbound();
                    outbound.receiver_chain_id == msg.chain_id
                        && outbound.outbound_tx_tss_nonce == msg.nonce
                })
            })
            .ok_or_else(|| {
                CrosschainError::CannotFindCctx(format!(
                    "no cctx for chain {} nonce {}",
                    msg.chain_id, msg.nonce
                ))
            })?;

        if !cctx.is_pending() {
            // a stale tracker only misleads the confirmers; drop it
            self.remove_out_tx_tracker(msg.chain_id, msg.nonce);
            return Ok(MsgAddToOutTxTrackerResponse { is_removed: true });
        }

        let is_proven = match &msg.proof {
            None => {
                let is_admin = self.is_authorized(&msg.creator, PolicyType::GroupEmergency);
                let is_observer = self.is_observer(&msg.creator);
                if !(is_admin || is_observer) {
                    return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
                }
                false
            }
            Some(proof) => {
                let tx_bytes = self
                    .verify_proof(proof, msg.chain_id, &msg.block_hash, msg.tx_index)
                    .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                self.verify_out_tx_body(msg, &tx_bytes)
                    .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
                true
            }
        };

        let entry = TxHashOnTracker {
            tx_hash: msg.tx_hash.clone(),
            tx_signer: msg.creator.clone(),
            proved: is_proven,
        };

        let mut tracker = match self.get_out_tx_tracker(msg.chain_id, msg.nonce) {
            None => {
                self.set_out_tx_tracker(&OutTxTracker {
                    chain_id: msg.chain_id,
                    nonce: msg.nonce,
                    hash_list: vec![entry],
                });
                info!(chain_id = msg.chain_id, nonce = msg.nonce, "tracker created");
                return Ok(MsgAddToOutTxTrackerResponse::default());
            }
            Some(tracker) => tracker,
        };

        // dedup by hash, case-insensitive; a proof upgrades the entry
        if let Some(existing) = tracker
            .hash_list
            .iter_mut()
            .find(|h| h.tx_hash.eq_ignore_ascii_case(&msg.tx_hash))
        {
            if is_proven && !existing.proved {
                existing.proved = true;
                self.set_out_tx_tracker(&tracker);
            }
            return Ok(MsgAddToOutTxTrackerResponse::default());
        }

        if is_proven {
            // proved submissions jump the queue and bypass the cap
            tracker.hash_list.insert(0, entry);
            self.set_out_tx_tracker(&tracker);
        } else if tracker.hash_list.len() < MAX_UNPROVED_TRACKER_HASHES {
            tracker.hash_list.push(entry);
            self.set_out_tx_tracker(&tracker);
        }
        Ok(MsgAddToOutTxTrackerResponse::default())
    }

    /// Add an inbound scan hint for a specific external transaction.
    pub fn add_to_in_tx_tracker(&mut self, msg: &MsgAddToInTxTracker) -> CrosschainResult<()> {
        msg.validate_basic()?;
        self.supported_chain_params(msg.chain_id)?;

        match &msg.proof {
            None => {
                let is_admin = self.is_authorized(&msg.creator, PolicyType::GroupEmergency);
                let is_observer = self.is_observer(&msg.creator);
                if !(is_admin || is_observer) {
                    return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
                }
            }
            Some(proof) => {
                let tx_bytes = self
                    .verify_proof(proof, msg.chain_id, &msg.block_hash, msg.tx_index)
                    .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                self.verify_in_tx_body(msg, &tx_bytes)
                    .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
            }
        }

        self.set_in_tx_tracker(&InTxTracker {
            chain_id: msg.chain_id,
            tx_hash: msg.tx_hash.clone(),
            coin_type: msg.coin_type,
        });
        Ok(())
    }

    /// Validate a proved outbound body: the sender must be the TSS key and
    /// the chain id, nonce and hash must match the tracker message.
    /// Note: the message may carry fabricated information.
    pub fn verify_out_tx_body(
        &self,
        msg: &MsgAddToOutTxTracker,
        tx_bytes: &[u8],
    ) -> CrosschainResult<()> {
        if is_evm_chain(msg.chain_id) {
            return self.verify_evm_out_tx_body(msg, tx_bytes);
        }
        if is_bitcoin_chain(msg.chain_id) {
            return self.verify_btc_out_tx_body(msg, tx_bytes);
        }
        Err(CrosschainError::TxBodyVerificationFail(format!(
            "cannot verify out tx body for chain {}",
            msg.chain_id
        )))
    }

    fn verify_evm_out_tx_body(
        &self,
        msg: &MsgAddToOutTxTracker,
        tx_bytes: &[u8],
    ) -> CrosschainResult<()> {
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(tx_bytes))
            .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
        let sender = signature
            .recover(tx.sighash())
            .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
        let tss: EthAddress = self
            .tss
            .eth_address
            .parse()
            .map_err(|_| CrosschainError::TxBodyVerificationFail("tss address not found".to_string()))?;
        if tss == EthAddress::zero() {
            return Err(CrosschainError::TxBodyVerificationFail(
                "tss address not found".to_string(),
            ));
        }
        if sender != tss {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "sender {sender:?} is not tss address"
            )));
        }
        match tx.chain_id() {
            Some(chain_id) if chain_id.as_u64() == msg.chain_id as u64 => {}
            other => {
                return Err(CrosschainError::TxBodyVerificationFail(format!(
                    "want evm chain id {}, got {:?}",
                    msg.chain_id, other
                )))
            }
        }
        match tx.nonce() {
            Some(nonce) if nonce.as_u64() == msg.nonce => {}
            other => {
                return Err(CrosschainError::TxBodyVerificationFail(format!(
                    "want nonce {}, got {:?}",
                    msg.nonce, other
                )))
            }
        }
        let hash = format!("0x{}", hex::encode(keccak256(tx_bytes)));
        if !hash.eq_ignore_ascii_case(&msg.tx_hash) {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "want tx hash {hash}, got {}",
                msg.tx_hash
            )));
        }
        Ok(())
    }

    fn verify_btc_out_tx_body(
        &self,
        msg: &MsgAddToOutTxTracker,
        tx_bytes: &[u8],
    ) -> CrosschainResult<()> {
        let tx: bitcoin::Transaction = btc_deserialize(tx_bytes)
            .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
        let network = btc_net_params(msg.chain_id)?;
        for vin in &tx.input {
            // outbounds are P2WPKH SegWit spends: witness = [sig, pubkey]
            if vin.witness.len() != 2 {
                return Err(CrosschainError::TxBodyVerificationFail(
                    "not a SegWit transaction".to_string(),
                ));
            }
            let pubkey_bytes = vin.witness.nth(1).ok_or_else(|| {
                CrosschainError::TxBodyVerificationFail("missing witness pubkey".to_string())
            })?;
            let pubkey = bitcoin::PublicKey::from_slice(pubkey_bytes).map_err(|_| {
                CrosschainError::TxBodyVerificationFail("failed to parse public key".to_string())
            })?;
            let address = bitcoin::Address::p2wpkh(&pubkey, network).map_err(|_| {
                CrosschainError::TxBodyVerificationFail(
                    "failed to create P2WPKH address".to_string(),
                )
            })?;
            if address.to_string() != self.tss.btc_address {
                return Err(CrosschainError::TxBodyVerificationFail(format!(
                    "sender {address} is not tss address"
                )));
            }
        }
        let first = tx.output.first().ok_or_else(|| {
            CrosschainError::TxBodyVerificationFail(
                "out tx should have at least one output".to_string(),
            )
        })?;
        if first.value != nonce_mark_amount(msg.nonce) {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "want nonce mark {}, got {}",
                nonce_mark_amount(msg.nonce),
                first.value
            )));
        }
        if !tx.txid().to_string().eq_ignore_ascii_case(&msg.tx_hash) {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "want tx hash {}, got {}",
                tx.txid(),
                msg.tx_hash
            )));
        }
        Ok(())
    }

    /// Validate a proved inbound body against the tracker message and the
    /// coin-type specific receiver.
    pub fn verify_in_tx_body(
        &self,
        msg: &MsgAddToInTxTracker,
        tx_bytes: &[u8],
    ) -> CrosschainResult<()> {
        if !is_evm_chain(msg.chain_id) {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "cannot verify in tx body for chain {}",
                msg.chain_id
            )));
        }
        let (tx, _signature) = TypedTransaction::decode_signed(&Rlp::new(tx_bytes))
            .map_err(|e| CrosschainError::TxBodyVerificationFail(e.to_string()))?;
        let hash = format!("0x{}", hex::encode(keccak256(tx_bytes)));
        if !hash.eq_ignore_ascii_case(&msg.tx_hash) {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "want tx hash {hash}, got {}",
                msg.tx_hash
            )));
        }
        match tx.chain_id() {
            Some(chain_id) if chain_id.as_u64() == msg.chain_id as u64 => {}
            other => {
                return Err(CrosschainError::TxBodyVerificationFail(format!(
                    "want evm chain id {}, got {:?}",
                    msg.chain_id, other
                )))
            }
        }
        let to = match tx.to() {
            Some(ethers::types::NameOrAddress::Address(addr)) => *addr,
            _ => {
                return Err(CrosschainError::TxBodyVerificationFail(
                    "missing receiver".to_string(),
                ))
            }
        };
        let params = self.supported_chain_params(msg.chain_id)?;
        let expected: EthAddress = match msg.coin_type {
            CoinType::Zeta => params.connector_contract_address.parse().map_err(|_| {
                CrosschainError::TxBodyVerificationFail("connector address unset".to_string())
            })?,
            CoinType::Erc20 => params.erc20_custody_contract_address.parse().map_err(|_| {
                CrosschainError::TxBodyVerificationFail("custody address unset".to_string())
            })?,
            CoinType::Gas => self.tss.eth_address.parse().map_err(|_| {
                CrosschainError::TxBodyVerificationFail("tss address not found".to_string())
            })?,
            CoinType::Cmd => {
                return Err(CrosschainError::TxBodyVerificationFail(
                    "coin type Cmd not supported".to_string(),
                ))
            }
        };
        if to != expected {
            return Err(CrosschainError::TxBodyVerificationFail(format!(
                "receiver {to:?} does not match coin type {}",
                msg.coin_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::test_utils::*;
    use zeta_chain_types::CctxStatus;

    fn tracker_msg(creator: &str, nonce: u64, tx_hash: &str) -> MsgAddToOutTxTracker {
        MsgAddToOutTxTracker {
            creator: creator.to_string(),
            chain_id: 97,
            nonce,
            tx_hash: tx_hash.to_string(),
            proof: None,
            block_hash: String::new(),
            tx_index: 0,
        }
    }

    #[test]
    fn test_tracker_requires_pending_cctx() {
        let mut keeper = test_keeper();
        let err = keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_0, 1, "0xaaa"))
            .unwrap_err();
        assert!(matches!(err, CrosschainError::CannotFindCctx(_)));
    }

    #[test]
    fn test_tracker_add_and_cap() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xc1", 1, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);

        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_0, 1, "0xaaa"))
            .unwrap();
        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_1, 1, "0xbbb"))
            .unwrap();
        // third unproved hash is silently dropped: cap is 2
        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_2, 1, "0xccc"))
            .unwrap();
        let tracker = keeper.get_out_tx_tracker(97, 1).unwrap();
        assert_eq!(tracker.hash_list.len(), 2);
    }

    #[test]
    fn test_tracker_dedup_case_insensitive() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xc2", 2, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);

        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_0, 2, "0xAbCd"))
            .unwrap();
        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_1, 2, "0xabcd"))
            .unwrap();
        let tracker = keeper.get_out_tx_tracker(97, 2).unwrap();
        assert_eq!(tracker.hash_list.len(), 1);
    }

    #[test]
    fn test_tracker_unauthorized_without_proof() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xc3", 3, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);

        let err = keeper
            .add_to_out_tx_tracker(&tracker_msg("zeta1stranger", 3, "0xaaa"))
            .unwrap_err();
        assert!(matches!(err, CrosschainError::NotAuthorized(_)));

        // the emergency-group account may submit without proof
        keeper
            .add_to_out_tx_tracker(&tracker_msg(EMERGENCY, 3, "0xaaa"))
            .unwrap();
    }

    #[test]
    fn test_tracker_removed_for_terminal_cctx() {
        let mut keeper = test_keeper();
        let pending = sample_cctx("0xc4", 4, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&pending);
        keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_0, 4, "0xaaa"))
            .unwrap();

        // the cctx finishes; a later submission removes the tracker
        let mut mined = pending.clone();
        mined.cctx_status.status = CctxStatus::OutboundMined;
        keeper.set_cross_chain_tx(&mined);
        keeper.remove_nonce_to_cctx("zetapub1tss", 97, 4);

        let response = keeper
            .add_to_out_tx_tracker(&tracker_msg(OBSERVER_0, 4, "0xbbb"))
            .unwrap();
        assert!(response.is_removed);
        assert!(keeper.get_out_tx_tracker(97, 4).is_none());
    }

    #[test]
    fn test_in_tx_tracker_roundtrip() {
        let mut keeper = test_keeper();
        keeper
            .add_to_in_tx_tracker(&MsgAddToInTxTracker {
                creator: OBSERVER_0.to_string(),
                chain_id: 5,
                tx_hash: "0xhint".to_string(),
                coin_type: CoinType::Gas,
                proof: None,
                block_hash: String::new(),
                tx_index: 0,
            })
            .unwrap();
        let tracker = keeper.get_in_tx_tracker(5, "0xhint").unwrap();
        assert_eq!(tracker.coin_type, CoinType::Gas);

        let err = keeper
            .add_to_in_tx_tracker(&MsgAddToInTxTracker {
                creator: "zeta1stranger".to_string(),
                chain_id: 5,
                tx_hash: "0xother".to_string(),
                coin_type: CoinType::Gas,
                proof: None,
                block_hash: String::new(),
                tx_index: 0,
            })
            .unwrap_err();
        assert!(matches!(err, CrosschainError::NotAuthorized(_)));
    }
}
