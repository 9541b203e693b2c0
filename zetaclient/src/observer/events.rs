// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connector and custody event definitions: topic hashes, decoding and the
//! sanity checks applied to every log before it is acted on.

use crate::error::{ClientError, ClientResult};
use ethers::abi::{decode, ParamType};
use ethers::types::{Address as EthAddress, Log, H256, U256};
use ethers::utils::keccak256;

pub const ZETA_SENT_SIG: &str = "ZetaSent(address,address,uint256,bytes,uint256,uint256,bytes,bytes)";
pub const ZETA_RECEIVED_SIG: &str = "ZetaReceived(bytes,uint256,address,uint256,bytes,bytes32)";
pub const ZETA_REVERTED_SIG: &str =
    "ZetaReverted(address,uint256,uint256,bytes,uint256,bytes,bytes32)";
pub const DEPOSITED_SIG: &str = "Deposited(bytes,address,uint256,bytes)";
pub const WITHDRAWN_SIG: &str = "Withdrawn(address,address,uint256)";

pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Connector `ZetaSent`: a user initiated a message-pass transfer.
#[derive(Debug, Clone)]
pub struct ZetaSentEvent {
    pub tx_origin: EthAddress,
    pub sender: EthAddress,
    pub destination_chain_id: U256,
    pub destination_address: Vec<u8>,
    pub zeta_value_and_gas: U256,
    pub destination_gas_limit: U256,
    pub message: Vec<u8>,
    pub raw: Log,
}

/// Custody `Deposited`: an ERC20 entered escrow.
#[derive(Debug, Clone)]
pub struct DepositedEvent {
    pub asset: EthAddress,
    pub recipient: Vec<u8>,
    pub amount: U256,
    pub message: Vec<u8>,
    pub raw: Log,
}

/// Connector `ZetaReceived`: an outbound message-pass landed.
#[derive(Debug, Clone)]
pub struct ZetaReceivedEvent {
    pub send_hash: H256,
    pub zeta_value: U256,
}

/// Connector `ZetaReverted`: an outbound revert landed.
#[derive(Debug, Clone)]
pub struct ZetaRevertedEvent {
    pub send_hash: H256,
    pub remaining_zeta_value: U256,
}

/// Custody `Withdrawn`: an ERC20 left escrow.
#[derive(Debug, Clone)]
pub struct WithdrawnEvent {
    pub recipient: EthAddress,
    pub asset: EthAddress,
    pub amount: U256,
}

fn topic_address(log: &Log, index: usize) -> ClientResult<EthAddress> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing topic {index}")))?;
    Ok(EthAddress::from_slice(&topic.0[12..]))
}

fn topic_u256(log: &Log, index: usize) -> ClientResult<U256> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing topic {index}")))?;
    Ok(U256::from_big_endian(&topic.0))
}

fn topic_h256(log: &Log, index: usize) -> ClientResult<H256> {
    log.topics
        .get(index)
        .copied()
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing topic {index}")))
}

pub fn parse_zeta_sent(log: &Log) -> ClientResult<ZetaSentEvent> {
    let tokens = decode(
        &[
            ParamType::Bytes,      // destinationAddress
            ParamType::Uint(256),  // zetaValueAndGas
            ParamType::Uint(256),  // destinationGasLimit
            ParamType::Bytes,      // message
            ParamType::Bytes,      // zetaParams
        ],
        &log.data.0,
    )
    .map_err(|e| ClientError::InvalidResponse(format!("ZetaSent decode: {e}")))?;
    Ok(ZetaSentEvent {
        tx_origin: topic_address(log, 1)?,
        sender: topic_address(log, 2)?,
        destination_chain_id: topic_u256(log, 3)?,
        destination_address: tokens[0].clone().into_bytes().unwrap_or_default(),
        zeta_value_and_gas: tokens[1].clone().into_uint().unwrap_or_default(),
        destination_gas_limit: tokens[2].clone().into_uint().unwrap_or_default(),
        message: tokens[3].clone().into_bytes().unwrap_or_default(),
        raw: log.clone(),
    })
}

pub fn parse_deposited(log: &Log) -> ClientResult<DepositedEvent> {
    let tokens = decode(
        &[
            ParamType::Bytes,     // recipient
            ParamType::Uint(256), // amount
            ParamType::Bytes,     // message
        ],
        &log.data.0,
    )
    .map_err(|e| ClientError::InvalidResponse(format!("Deposited decode: {e}")))?;
    Ok(DepositedEvent {
        asset: topic_address(log, 1)?,
        recipient: tokens[0].clone().into_bytes().unwrap_or_default(),
        amount: tokens[1].clone().into_uint().unwrap_or_default(),
        message: tokens[2].clone().into_bytes().unwrap_or_default(),
        raw: log.clone(),
    })
}

pub fn parse_zeta_received(log: &Log) -> ClientResult<ZetaReceivedEvent> {
    let tokens = decode(
        &[
            ParamType::Bytes,     // zetaTxSenderAddress
            ParamType::Uint(256), // zetaValue
            ParamType::Bytes,     // message
        ],
        &log.data.0,
    )
    .map_err(|e| ClientError::InvalidResponse(format!("ZetaReceived decode: {e}")))?;
    Ok(ZetaReceivedEvent {
        send_hash: topic_h256(log, 3)?,
        zeta_value: tokens[1].clone().into_uint().unwrap_or_default(),
    })
}

pub fn parse_zeta_reverted(log: &Log) -> ClientResult<ZetaRevertedEvent> {
    let tokens = decode(
        &[
            ParamType::Address,   // zetaTxSenderAddress
            ParamType::Uint(256), // sourceChainId
            ParamType::Bytes,     // destinationAddress
            ParamType::Uint(256), // remainingZetaValue
            ParamType::Bytes,     // message
        ],
        &log.data.0,
    )
    .map_err(|e| ClientError::InvalidResponse(format!("ZetaReverted decode: {e}")))?;
    Ok(ZetaRevertedEvent {
        send_hash: topic_h256(log, 2)?,
        remaining_zeta_value: tokens[3].clone().into_uint().unwrap_or_default(),
    })
}

pub fn parse_withdrawn(log: &Log) -> ClientResult<WithdrawnEvent> {
    let tokens = decode(&[ParamType::Uint(256)], &log.data.0)
        .map_err(|e| ClientError::InvalidResponse(format!("Withdrawn decode: {e}")))?;
    Ok(WithdrawnEvent {
        recipient: topic_address(log, 1)?,
        asset: topic_address(log, 2)?,
        amount: tokens[0].clone().into_uint().unwrap_or_default(),
    })
}

/// Sanity checks on a log before acting on it: emitting contract, topic
/// zero and, when known, the transaction hash must all match.
pub fn validate_evm_tx_log(
    log: &Log,
    expected_address: EthAddress,
    expected_tx_hash: Option<H256>,
    expected_topic0: H256,
) -> ClientResult<()> {
    if log.address != expected_address {
        return Err(ClientError::InvalidResponse(format!(
            "log from {:?}, expected {:?}",
            log.address, expected_address
        )));
    }
    match log.topics.first() {
        Some(topic0) if *topic0 == expected_topic0 => {}
        other => {
            return Err(ClientError::InvalidResponse(format!(
                "unexpected topic0 {other:?}"
            )))
        }
    }
    if let (Some(expected), Some(actual)) = (expected_tx_hash, log.transaction_hash) {
        if expected != actual {
            return Err(ClientError::InvalidResponse(format!(
                "log tx hash {actual:?}, expected {expected:?}"
            )));
        }
    }
    if log.removed == Some(true) {
        return Err(ClientError::InvalidResponse("removed log".to_string()));
    }
    Ok(())
}

/// Sort key `(block, tx index, log index)`; stabilizes ballot creation
/// order across validators.
pub fn log_sort_key(log: &Log) -> (u64, u64, u64) {
    (
        log.block_number.map(|n| n.as_u64()).unwrap_or(0),
        log.transaction_index.map(|n| n.as_u64()).unwrap_or(0),
        log.log_index.map(|n| n.as_u64()).unwrap_or(0),
    )
}
