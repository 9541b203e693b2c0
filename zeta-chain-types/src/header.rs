// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{CrosschainError, CrosschainResult};
use bitcoin::hashes::{sha256d, Hash};
use ethers::types::H256;
use ethers::utils::{keccak256, rlp};
use serde::{Deserialize, Serialize};

/// Maximum tolerated clock drift for a voted header, seconds.
pub const MAX_HEADER_FUTURE_DRIFT_SECS: i64 = 600;
/// Headers older than this relative to consensus time are rejected, seconds.
pub const MAX_HEADER_AGE_SECS: i64 = 86_400;

/// A raw external block header, tagged by chain family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderData {
    /// RLP-encoded Ethereum header.
    EthereumHeader(Vec<u8>),
    /// 80-byte Bitcoin header.
    BitcoinHeader(Vec<u8>),
}

impl HeaderData {
    pub fn parent_hash(&self) -> CrosschainResult<Vec<u8>> {
        match self {
            HeaderData::EthereumHeader(bytes) => {
                let header = rlp::Rlp::new(bytes);
                let parent: Vec<u8> = header
                    .at(0)
                    .and_then(|f| f.data().map(|d| d.to_vec()))
                    .map_err(|e| CrosschainError::NoParentHash(e.to_string()))?;
                if parent.len() != 32 {
                    return Err(CrosschainError::NoParentHash(format!(
                        "parent hash must be 32 bytes, got {}",
                        parent.len()
                    )));
                }
                Ok(parent)
            }
            HeaderData::BitcoinHeader(bytes) => {
                if bytes.len() != 80 {
                    return Err(CrosschainError::NoParentHash(format!(
                        "bitcoin header must be 80 bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(bytes[4..36].to_vec())
            }
        }
    }

    pub fn block_hash(&self) -> CrosschainResult<Vec<u8>> {
        match self {
            HeaderData::EthereumHeader(bytes) => Ok(keccak256(bytes).to_vec()),
            HeaderData::BitcoinHeader(bytes) => {
                if bytes.len() != 80 {
                    return Err(CrosschainError::InvalidMessage(format!(
                        "bitcoin header must be 80 bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(sha256d::Hash::hash(bytes).to_byte_array().to_vec())
            }
        }
    }

    /// Block height claimed by the header itself. Bitcoin headers do not
    /// carry a height; callers must rely on the voted height for them.
    pub fn height(&self) -> CrosschainResult<Option<u64>> {
        match self {
            HeaderData::EthereumHeader(bytes) => {
                let header = rlp::Rlp::new(bytes);
                let number: u64 = header
                    .at(8)
                    .and_then(|f| f.as_val())
                    .map_err(|e| CrosschainError::InvalidMessage(e.to_string()))?;
                Ok(Some(number))
            }
            HeaderData::BitcoinHeader(_) => Ok(None),
        }
    }

    pub fn timestamp(&self) -> CrosschainResult<i64> {
        match self {
            HeaderData::EthereumHeader(bytes) => {
                let header = rlp::Rlp::new(bytes);
                let ts: u64 = header
                    .at(11)
                    .and_then(|f| f.as_val())
                    .map_err(|e| CrosschainError::InvalidTimestamp(e.to_string()))?;
                Ok(ts as i64)
            }
            HeaderData::BitcoinHeader(bytes) => {
                if bytes.len() != 80 {
                    return Err(CrosschainError::InvalidTimestamp(
                        "bitcoin header must be 80 bytes".to_string(),
                    ));
                }
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[68..72]);
                Ok(u32::from_le_bytes(raw) as i64)
            }
        }
    }

    /// Bound the header timestamp against the consensus block time.
    pub fn validate_timestamp(&self, now_unix: i64) -> CrosschainResult<()> {
        let ts = self.timestamp()?;
        if ts <= 0 {
            return Err(CrosschainError::InvalidTimestamp(
                "zero header timestamp".to_string(),
            ));
        }
        if ts > now_unix + MAX_HEADER_FUTURE_DRIFT_SECS {
            return Err(CrosschainError::InvalidTimestamp(format!(
                "header timestamp {ts} is {}s in the future",
                ts - now_unix
            )));
        }
        if now_unix - ts > MAX_HEADER_AGE_SECS {
            return Err(CrosschainError::InvalidTimestamp(format!(
                "header timestamp {ts} is too old"
            )));
        }
        Ok(())
    }

    /// The root the family's inclusion proofs verify against:
    /// transactions root for Ethereum, merkle root for Bitcoin.
    pub fn transactions_root(&self) -> CrosschainResult<H256> {
        match self {
            HeaderData::EthereumHeader(bytes) => {
                let header = rlp::Rlp::new(bytes);
                let root: Vec<u8> = header
                    .at(4)
                    .and_then(|f| f.data().map(|d| d.to_vec()))
                    .map_err(|e| CrosschainError::InvalidMessage(e.to_string()))?;
                if root.len() != 32 {
                    return Err(CrosschainError::InvalidMessage(
                        "transactions root must be 32 bytes".to_string(),
                    ));
                }
                Ok(H256::from_slice(&root))
            }
            HeaderData::BitcoinHeader(bytes) => {
                if bytes.len() != 80 {
                    return Err(CrosschainError::InvalidMessage(
                        "bitcoin header must be 80 bytes".to_string(),
                    ));
                }
                Ok(H256::from_slice(&bytes[36..68]))
            }
        }
    }
}

/// A voted-in header, persisted keyed by block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: i64,
    pub height: u64,
    pub hash: Vec<u8>,
    pub parent_hash: Vec<u8>,
    pub header: HeaderData,
}

/// Per-chain header-chain bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderState {
    pub chain_id: i64,
    pub earliest_height: u64,
    pub latest_height: u64,
    pub latest_block_hash: Vec<u8>,
}

/// Build a minimal RLP Ethereum header for fixtures: only the fields the
/// pipeline reads (parent hash, transactions root, number, timestamp) carry
/// meaning; the rest are placeholders of the correct shape.
pub fn encode_eth_header(
    parent_hash: [u8; 32],
    transactions_root: [u8; 32],
    number: u64,
    timestamp: u64,
) -> Vec<u8> {
    let mut stream = rlp::RlpStream::new_list(15);
    stream.append(&parent_hash.to_vec()); // 0 parentHash
    stream.append(&vec![0u8; 32]); // 1 ommersHash
    stream.append(&vec![0u8; 20]); // 2 beneficiary
    stream.append(&vec![0u8; 32]); // 3 stateRoot
    stream.append(&transactions_root.to_vec()); // 4 transactionsRoot
    stream.append(&vec![0u8; 32]); // 5 receiptsRoot
    stream.append(&vec![0u8; 256]); // 6 logsBloom
    stream.append(&0u64); // 7 difficulty
    stream.append(&number); // 8 number
    stream.append(&30_000_000u64); // 9 gasLimit
    stream.append(&0u64); // 10 gasUsed
    stream.append(&timestamp); // 11 timestamp
    stream.append(&Vec::<u8>::new()); // 12 extraData
    stream.append(&vec![0u8; 32]); // 13 mixHash
    stream.append(&vec![0u8; 8]); // 14 nonce
    stream.out().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn sample_eth_header(number: u64, timestamp: u64) -> HeaderData {
        HeaderData::EthereumHeader(encode_eth_header([7u8; 32], [9u8; 32], number, timestamp))
    }

    #[test]
    fn test_eth_header_fields() {
        let header = sample_eth_header(1234, 1_700_000_000);
        assert_eq!(header.parent_hash().unwrap(), vec![7u8; 32]);
        assert_eq!(
            header.transactions_root().unwrap(),
            H256::from_slice(&[9u8; 32])
        );
        assert_eq!(header.height().unwrap(), Some(1234));
        assert_eq!(header.timestamp().unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_eth_header_hash_is_keccak_of_rlp() {
        let bytes = encode_eth_header([7u8; 32], [9u8; 32], 1, 1_700_000_000);
        let header = HeaderData::EthereumHeader(bytes.clone());
        assert_eq!(header.block_hash().unwrap(), keccak256(&bytes).to_vec());
    }

    #[test]
    fn test_btc_header_fields() {
        let mut bytes = vec![0u8; 80];
        bytes[4..36].copy_from_slice(&[3u8; 32]);
        bytes[36..68].copy_from_slice(&[5u8; 32]);
        bytes[68..72].copy_from_slice(&1_700_000_000u32.to_le_bytes());
        let header = HeaderData::BitcoinHeader(bytes);
        assert_eq!(header.parent_hash().unwrap(), vec![3u8; 32]);
        assert_eq!(
            header.transactions_root().unwrap(),
            H256::from_slice(&[5u8; 32])
        );
        assert_eq!(header.timestamp().unwrap(), 1_700_000_000);
        assert_eq!(header.height().unwrap(), None);
    }

    #[test]
    fn test_btc_header_wrong_length() {
        let header = HeaderData::BitcoinHeader(vec![0u8; 79]);
        assert!(header.parent_hash().is_err());
        assert!(header.block_hash().is_err());
    }

    #[test]
    fn test_validate_timestamp_bounds() {
        let now = now();
        let ok = sample_eth_header(1, now as u64);
        ok.validate_timestamp(now).unwrap();

        let future = sample_eth_header(1, (now + MAX_HEADER_FUTURE_DRIFT_SECS + 60) as u64);
        assert!(matches!(
            future.validate_timestamp(now),
            Err(CrosschainError::InvalidTimestamp(_))
        ));

        let stale = sample_eth_header(1, (now - MAX_HEADER_AGE_SECS - 60) as u64);
        assert!(matches!(
            stale.validate_timestamp(now),
            Err(CrosschainError::InvalidTimestamp(_))
        ));
    }
}
