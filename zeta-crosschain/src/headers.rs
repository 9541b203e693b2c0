// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block-header voting and Merkle-proof verification (the header pipeline
//! behind proved tracker submissions).

use crate::ballot::{ObservationType, VoteType};
use crate::keeper::CrosschainKeeper;
use tracing::info;
use zeta_chain_types::{
    chain_from_id, is_bitcoin_chain, is_evm_chain, BlockHeader, BlockHeaderState, CrosschainError,
    CrosschainResult, MsgAddBlockHeader, Proof,
};

impl CrosschainKeeper {
    /// Vote an external block header into the store. One ballot per unique
    /// header; finalization persists the header and advances the per-chain
    /// header state.
    pub fn add_block_header(&mut self, msg: &MsgAddBlockHeader) -> CrosschainResult<()> {
        msg.validate_basic()?;
        self.supported_chain_params(msg.chain_id)?;
        if !self.is_observer(&msg.creator) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        self.check_header_verification_enabled(msg.chain_id)?;

        if self.get_block_header(&msg.block_hash).is_some() {
            return Err(CrosschainError::BlockAlreadyExist(hex::encode(
                &msg.block_hash,
            )));
        }

        // With an initialized header chain, only the next height with a known
        // parent may extend it. The first voted header seeds the state.
        let parent_hash = msg
            .header
            .parent_hash()
            .map_err(|e| CrosschainError::NoParentHash(e.to_string()))?;
        if let Some(state) = self.get_block_header_state(msg.chain_id) {
            if state.earliest_height > 0 && state.earliest_height < msg.height {
                if self.get_block_header(&parent_hash).is_none() {
                    return Err(CrosschainError::NoParentHash(
                        "parent block header not found".to_string(),
                    ));
                }
                if msg.height != state.latest_height + 1 {
                    return Err(CrosschainError::NoParentHash(format!(
                        "invalid block height: wanted {}, got {}",
                        state.latest_height + 1,
                        msg.height
                    )));
                }
            }
        }

        msg.header.validate_timestamp(self.block_time_unix())?;

        let digest = msg.digest();
        let ballot = self.find_or_create_ballot(&digest, ObservationType::BlockHeader);
        if ballot.is_finalized() {
            return Err(CrosschainError::ObservedTxAlreadyFinalized(digest));
        }
        let finalized_now = ballot.add_vote(&msg.creator, VoteType::SuccessObservation)?;
        if !finalized_now {
            return Ok(());
        }

        let state = match self.get_block_header_state(msg.chain_id) {
            None => BlockHeaderState {
                chain_id: msg.chain_id,
                earliest_height: msg.height,
                latest_height: msg.height,
                latest_block_hash: msg.block_hash.clone(),
            },
            Some(mut state) => {
                if msg.height > state.latest_height {
                    state.latest_height = msg.height;
                    state.latest_block_hash = msg.block_hash.clone();
                }
                if state.earliest_height == 0 {
                    state.earliest_height = msg.height;
                }
                state
            }
        };
        self.set_block_header_state(&state);
        self.set_block_header(&BlockHeader {
            chain_id: msg.chain_id,
            height: msg.height,
            hash: msg.block_hash.clone(),
            parent_hash,
            header: msg.header.clone(),
        });
        info!(
            chain_id = msg.chain_id,
            height = msg.height,
            "block header finalized"
        );
        Ok(())
    }

    /// Verify a transaction inclusion proof against a stored header and
    /// return the raw transaction bytes at `tx_index`.
    pub fn verify_proof(
        &self,
        proof: &Proof,
        chain_id: i64,
        block_hash: &str,
        tx_index: i64,
    ) -> CrosschainResult<Vec<u8>> {
        self.check_header_verification_enabled(chain_id)?;

        let chain = chain_from_id(chain_id).ok_or(CrosschainError::UnsupportedChain(chain_id))?;
        if !chain.supports_merkle_proof {
            return Err(CrosschainError::ProofVerificationFail(format!(
                "chain {chain_id} does not support block header-based verification"
            )));
        }

        let hash_bytes = hex::decode(block_hash.trim_start_matches("0x")).map_err(|e| {
            CrosschainError::ProofVerificationFail(format!(
                "block hash {block_hash} conversion failed: {e}"
            ))
        })?;
        let header = self
            .get_block_header(&hash_bytes)
            .ok_or_else(|| CrosschainError::BlockHeaderNotFound(block_hash.to_string()))?;

        proof.verify(&header.header, tx_index)
    }

    fn check_header_verification_enabled(&self, chain_id: i64) -> CrosschainResult<()> {
        let flags = &self.flags.block_header_verification_flags;
        if is_evm_chain(chain_id) && !flags.is_eth_type_chain_enabled {
            return Err(CrosschainError::BlockHeaderVerificationDisabled(chain_id));
        }
        if is_bitcoin_chain(chain_id) && !flags.is_btc_type_chain_enabled {
            return Err(CrosschainError::BlockHeaderVerificationDisabled(chain_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::keeper::test_utils::*;
    use crate::keeper::CrosschainKeeper;
    use zeta_chain_types::{encode_eth_header, CrosschainError, HeaderData, MsgAddBlockHeader};
    use ethers::utils::keccak256;

    fn header_chain(start_parent: [u8; 32], heights: &[u64], base_time: u64) -> Vec<(Vec<u8>, HeaderData)> {
        let mut parent = start_parent;
        let mut out = Vec::new();
        for (i, height) in heights.iter().enumerate() {
            let bytes = encode_eth_header(parent, [9u8; 32], *height, base_time + i as u64 * 12);
            let hash = keccak256(&bytes);
            out.push((hash.to_vec(), HeaderData::EthereumHeader(bytes)));
            parent = hash;
        }
        out
    }

    fn enabled_keeper() -> CrosschainKeeper {
        let mut keeper = test_keeper();
        keeper
            .flags
            .block_header_verification_flags
            .is_eth_type_chain_enabled = true;
        keeper
            .flags
            .block_header_verification_flags
            .is_btc_type_chain_enabled = true;
        keeper
    }

    fn vote_header(
        keeper: &mut CrosschainKeeper,
        hash: &[u8],
        header: &HeaderData,
        height: u64,
    ) -> Result<(), CrosschainError> {
        for observer in [OBSERVER_0, OBSERVER_1, OBSERVER_2] {
            keeper.add_block_header(&MsgAddBlockHeader {
                creator: observer.to_string(),
                chain_id: 5,
                block_hash: hash.to_vec(),
                height,
                header: header.clone(),
            })?;
        }
        Ok(())
    }

    #[test]
    fn test_header_voting_initializes_and_extends_state() {
        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100, 101, 102], now - 36);

        for (i, (hash, header)) in chain.iter().enumerate() {
            vote_header(&mut keeper, hash, header, 100 + i as u64).unwrap();
        }

        let state = keeper.get_block_header_state(5).unwrap();
        assert_eq!(state.earliest_height, 100);
        assert_eq!(state.latest_height, 102);
        assert_eq!(state.latest_block_hash, chain[2].0);
        assert!(keeper.get_block_header(&chain[1].0).is_some());
    }

    #[test]
    fn test_header_gap_rejected() {
        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100, 101, 103], now - 36);

        vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap();
        vote_header(&mut keeper, &chain[1].0, &chain[1].1, 101).unwrap();
        // height 103 skips 102
        let err = vote_header(&mut keeper, &chain[2].0, &chain[2].1, 103).unwrap_err();
        assert!(matches!(err, CrosschainError::NoParentHash(_)));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100], now - 36);
        vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap();

        // header at 101 with an unrelated parent
        let orphan = header_chain([0xeeu8; 32], &[101], now - 12);
        let err = vote_header(&mut keeper, &orphan[0].0, &orphan[0].1, 101).unwrap_err();
        assert!(matches!(err, CrosschainError::NoParentHash(_)));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100], now - 36);
        vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap();
        let err = vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap_err();
        assert!(matches!(err, CrosschainError::BlockAlreadyExist(_)));
    }

    #[test]
    fn test_disabled_flag_rejected() {
        let mut keeper = test_keeper(); // flags default off
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100], now - 36);
        let err = vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap_err();
        assert!(matches!(
            err,
            CrosschainError::BlockHeaderVerificationDisabled(5)
        ));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let chain = header_chain([0u8; 32], &[100], now + 3_600);
        let err = vote_header(&mut keeper, &chain[0].0, &chain[0].1, 100).unwrap_err();
        assert!(matches!(err, CrosschainError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_verify_proof_through_stored_header() {
        use ethers::utils::rlp;

        // single-tx block: root is the keccak of the leaf node
        let tx = vec![0xabu8; 64];
        let key = rlp::encode(&0u64).to_vec();
        let mut nibbles = Vec::new();
        for b in &key {
            nibbles.push(b >> 4);
            nibbles.push(b & 0x0f);
        }
        // leaf node [compact(path), value]
        let mut compact = vec![0x20u8];
        for pair in nibbles.chunks(2) {
            compact.push((pair[0] << 4) | pair[1]);
        }
        let mut stream = rlp::RlpStream::new_list(2);
        stream.append(&compact);
        stream.append(&tx);
        let node = stream.out().to_vec();
        let root: [u8; 32] = keccak256(&node);

        let mut keeper = enabled_keeper();
        let now = keeper.block_time_unix() as u64;
        let header_bytes = encode_eth_header([0u8; 32], root, 100, now - 12);
        let hash = keccak256(&header_bytes);
        let header = HeaderData::EthereumHeader(header_bytes);
        vote_header(&mut keeper, &hash, &header, 100).unwrap();

        let proof = zeta_chain_types::Proof::Ethereum(zeta_chain_types::EthereumProof {
            nodes: vec![node],
        });
        let leaf = keeper
            .verify_proof(&proof, 5, &hex::encode(hash), 0)
            .unwrap();
        assert_eq!(leaf, tx);

        // unknown header hash
        let err = keeper
            .verify_proof(&proof, 5, &hex::encode([1u8; 32]), 0)
            .unwrap_err();
        assert!(matches!(err, CrosschainError::BlockHeaderNotFound(_)));
    }
}
