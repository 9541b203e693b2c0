// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transaction inclusion proofs against voted-in block headers.
//!
//! Ethereum proofs walk the transaction Merkle-Patricia trie; Bitcoin proofs
//! fold a classic double-SHA256 merkle branch. Both return the raw leaf bytes
//! so the caller can decode and cross-check the transaction body.

use crate::error::{CrosschainError, CrosschainResult};
use crate::header::HeaderData;
use bitcoin::hashes::{sha256d, Hash};
use ethers::types::H256;
use ethers::utils::{keccak256, rlp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proof {
    Ethereum(EthereumProof),
    Bitcoin(BitcoinProof),
}

/// Nodes along the path from the transactions root to the leaf, each
/// rlp-encoded, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumProof {
    pub nodes: Vec<Vec<u8>>,
}

/// The raw transaction plus its double-SHA256 merkle branch, sibling-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinProof {
    pub tx_bytes: Vec<u8>,
    pub merkle_branch: Vec<Vec<u8>>,
}

impl Proof {
    /// Verify inclusion of the transaction at `tx_index` and return its raw
    /// bytes.
    pub fn verify(&self, header: &HeaderData, tx_index: i64) -> CrosschainResult<Vec<u8>> {
        if tx_index < 0 {
            return Err(CrosschainError::ProofVerificationFail(format!(
                "negative tx index {tx_index}"
            )));
        }
        let root = header.transactions_root()?;
        match (self, header) {
            (Proof::Ethereum(proof), HeaderData::EthereumHeader(_)) => {
                verify_trie_proof(root, tx_index as u64, &proof.nodes)
            }
            (Proof::Bitcoin(proof), HeaderData::BitcoinHeader(_)) => {
                verify_merkle_branch(root, tx_index as u64, proof)
            }
            _ => Err(CrosschainError::ProofVerificationFail(
                "proof family does not match header family".to_string(),
            )),
        }
    }
}

/// Walk a Merkle-Patricia proof for key `rlp(tx_index)` down from `root`.
fn verify_trie_proof(root: H256, tx_index: u64, nodes: &[Vec<u8>]) -> CrosschainResult<Vec<u8>> {
    let key = rlp::encode(&tx_index).to_vec();
    let mut nibbles = bytes_to_nibbles(&key);
    let mut expected = root;

    for node_bytes in nodes {
        if keccak256(node_bytes) != expected.0 {
            return Err(CrosschainError::ProofVerificationFail(format!(
                "node hash mismatch, expected {expected:?}"
            )));
        }
        let node = rlp::Rlp::new(node_bytes);
        let item_count = node
            .item_count()
            .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
        match item_count {
            17 => {
                if nibbles.is_empty() {
                    let value = node
                        .at(16)
                        .and_then(|v| v.data().map(|d| d.to_vec()))
                        .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                    if value.is_empty() {
                        return Err(CrosschainError::ProofVerificationFail(
                            "no value at branch terminator".to_string(),
                        ));
                    }
                    return Ok(value);
                }
                let branch = nibbles.remove(0) as usize;
                let child = node
                    .at(branch)
                    .and_then(|c| c.data().map(|d| d.to_vec()))
                    .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                if child.len() != 32 {
                    return Err(CrosschainError::ProofVerificationFail(format!(
                        "branch child at nibble {branch} is not a hash reference"
                    )));
                }
                expected = H256::from_slice(&child);
            }
            2 => {
                let path = node
                    .at(0)
                    .and_then(|p| p.data().map(|d| d.to_vec()))
                    .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                let (path_nibbles, is_leaf) = compact_to_nibbles(&path)?;
                if is_leaf {
                    if nibbles != path_nibbles {
                        return Err(CrosschainError::ProofVerificationFail(
                            "leaf path does not match remaining key".to_string(),
                        ));
                    }
                    let value = node
                        .at(1)
                        .and_then(|v| v.data().map(|d| d.to_vec()))
                        .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                    return Ok(value);
                }
                if nibbles.len() < path_nibbles.len() || nibbles[..path_nibbles.len()] != path_nibbles
                {
                    return Err(CrosschainError::ProofVerificationFail(
                        "extension path does not match key".to_string(),
                    ));
                }
                nibbles.drain(..path_nibbles.len());
                let child = node
                    .at(1)
                    .and_then(|c| c.data().map(|d| d.to_vec()))
                    .map_err(|e| CrosschainError::ProofVerificationFail(e.to_string()))?;
                if child.len() != 32 {
                    return Err(CrosschainError::ProofVerificationFail(
                        "extension child is not a hash reference".to_string(),
                    ));
                }
                expected = H256::from_slice(&child);
            }
            n => {
                return Err(CrosschainError::ProofVerificationFail(format!(
                    "unexpected node arity {n}"
                )))
            }
        }
    }

    Err(CrosschainError::ProofVerificationFail(
        "proof exhausted before reaching a leaf".to_string(),
    ))
}

fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    nibbles
}

/// Hex-prefix decoding; returns (nibbles, is_leaf).
fn compact_to_nibbles(data: &[u8]) -> CrosschainResult<(Vec<u8>, bool)> {
    let first = *data.first().ok_or_else(|| {
        CrosschainError::ProofVerificationFail("empty compact path".to_string())
    })?;
    let flag = first >> 4;
    let is_leaf = flag & 0x02 != 0;
    let is_odd = flag & 0x01 != 0;
    let mut nibbles = Vec::new();
    if is_odd {
        nibbles.push(first & 0x0f);
    }
    for b in &data[1..] {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    Ok((nibbles, is_leaf))
}

/// Fold the merkle branch over sha256d, taking sides from the index bits.
fn verify_merkle_branch(
    root: H256,
    tx_index: u64,
    proof: &BitcoinProof,
) -> CrosschainResult<Vec<u8>> {
    let mut current = sha256d::Hash::hash(&proof.tx_bytes).to_byte_array();
    for (depth, sibling) in proof.merkle_branch.iter().enumerate() {
        if sibling.len() != 32 {
            return Err(CrosschainError::ProofVerificationFail(format!(
                "merkle branch node at depth {depth} is not 32 bytes"
            )));
        }
        let mut concat = Vec::with_capacity(64);
        if (tx_index >> depth) & 1 == 1 {
            concat.extend_from_slice(sibling);
            concat.extend_from_slice(&current);
        } else {
            concat.extend_from_slice(&current);
            concat.extend_from_slice(sibling);
        }
        current = sha256d::Hash::hash(&concat).to_byte_array();
    }
    if current != root.0 {
        return Err(CrosschainError::ProofVerificationFail(
            "merkle branch does not fold to the header root".to_string(),
        ));
    }
    Ok(proof.tx_bytes.clone())
}
