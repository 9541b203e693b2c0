// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the crosschain keeper and shared with the client.
///
/// Recoverable RPC/transport failures are handled locally by the caller and
/// never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrosschainError {
    // ChainId not in the registry
    UnsupportedChain(i64),
    // Policy/observer authorization failed
    NotAuthorized(String),
    // CCTX index or nonce unknown
    CannotFindCctx(String),
    // Admin operation attempted on a terminal CCTX
    StatusNotPending,
    // Replay of a finalized ballot or inbound event
    ObservedTxAlreadyFinalized(String),
    // Merkle/trie proof did not verify
    ProofVerificationFail(String),
    // Transaction body does not match the tracker message
    TxBodyVerificationFail(String),
    // Header verification feature flag is off for the chain family
    BlockHeaderVerificationDisabled(i64),
    // Header chain invariants
    NoParentHash(String),
    InvalidTimestamp(String),
    BlockAlreadyExist(String),
    BlockHeaderNotFound(String),
    // Refund preconditions
    ForeignCoinNotFound(String),
    Zrc20NotFound(String),
    NoRefundAmount,
    // A simulated on-chain contract call failed
    ContractCall(String),
    // Message validation
    InvalidChainId(i64),
    InvalidAddress(String),
    InvalidMessage(String),
    // Ballot bookkeeping
    DuplicateVote(String),
    BallotNotFound(String),
    // Inbound/outbound disabled by crosschain flags
    InboundDisabled,
    OutboundDisabled,
    // Outbound vote does not match the CCTX outbound params
    OutboundParamsMismatch(String),
    // Uncategorized
    Internal(String),
}

impl CrosschainError {
    /// A short stable label for metrics; values must stay valid prometheus
    /// label values (lowercase, underscores).
    pub fn error_type(&self) -> &'static str {
        match self {
            CrosschainError::UnsupportedChain(_) => "unsupported_chain",
            CrosschainError::NotAuthorized(_) => "not_authorized",
            CrosschainError::CannotFindCctx(_) => "cannot_find_cctx",
            CrosschainError::StatusNotPending => "status_not_pending",
            CrosschainError::ObservedTxAlreadyFinalized(_) => "observed_tx_already_finalized",
            CrosschainError::ProofVerificationFail(_) => "proof_verification_fail",
            CrosschainError::TxBodyVerificationFail(_) => "tx_body_verification_fail",
            CrosschainError::BlockHeaderVerificationDisabled(_) => {
                "block_header_verification_disabled"
            }
            CrosschainError::NoParentHash(_) => "no_parent_hash",
            CrosschainError::InvalidTimestamp(_) => "invalid_timestamp",
            CrosschainError::BlockAlreadyExist(_) => "block_already_exist",
            CrosschainError::BlockHeaderNotFound(_) => "block_header_not_found",
            CrosschainError::ForeignCoinNotFound(_) => "foreign_coin_not_found",
            CrosschainError::Zrc20NotFound(_) => "zrc20_not_found",
            CrosschainError::NoRefundAmount => "no_refund_amount",
            CrosschainError::ContractCall(_) => "contract_call",
            CrosschainError::InvalidChainId(_) => "invalid_chain_id",
            CrosschainError::InvalidAddress(_) => "invalid_address",
            CrosschainError::InvalidMessage(_) => "invalid_message",
            CrosschainError::DuplicateVote(_) => "duplicate_vote",
            CrosschainError::BallotNotFound(_) => "ballot_not_found",
            CrosschainError::InboundDisabled => "inbound_disabled",
            CrosschainError::OutboundDisabled => "outbound_disabled",
            CrosschainError::OutboundParamsMismatch(_) => "outbound_params_mismatch",
            CrosschainError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for CrosschainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrosschainError::UnsupportedChain(id) => write!(f, "unsupported chain {id}"),
            CrosschainError::NotAuthorized(who) => write!(f, "not authorized: {who}"),
            CrosschainError::CannotFindCctx(k) => write!(f, "cannot find cctx: {k}"),
            CrosschainError::StatusNotPending => write!(f, "cctx status is not pending"),
            CrosschainError::ObservedTxAlreadyFinalized(k) => {
                write!(f, "observed tx already finalized: {k}")
            }
            CrosschainError::ProofVerificationFail(m) => write!(f, "proof verification fail: {m}"),
            CrosschainError::TxBodyVerificationFail(m) => {
                write!(f, "tx body verification fail: {m}")
            }
            CrosschainError::BlockHeaderVerificationDisabled(id) => {
                write!(f, "block header verification disabled for chain {id}")
            }
            CrosschainError::NoParentHash(m) => write!(f, "no parent hash: {m}"),
            CrosschainError::InvalidTimestamp(m) => write!(f, "invalid timestamp: {m}"),
            CrosschainError::BlockAlreadyExist(h) => write!(f, "block already exists: {h}"),
            CrosschainError::BlockHeaderNotFound(h) => write!(f, "block header not found: {h}"),
            CrosschainError::ForeignCoinNotFound(m) => write!(f, "foreign coin not found: {m}"),
            CrosschainError::Zrc20NotFound(m) => write!(f, "zrc20 not found: {m}"),
            CrosschainError::NoRefundAmount => write!(f, "no amount to refund"),
            CrosschainError::ContractCall(m) => write!(f, "contract call error: {m}"),
            CrosschainError::InvalidChainId(id) => write!(f, "invalid chain id ({id})"),
            CrosschainError::InvalidAddress(a) => write!(f, "invalid address ({a})"),
            CrosschainError::InvalidMessage(m) => write!(f, "invalid message: {m}"),
            CrosschainError::DuplicateVote(v) => write!(f, "duplicate vote from {v}"),
            CrosschainError::BallotNotFound(b) => write!(f, "ballot not found: {b}"),
            CrosschainError::InboundDisabled => write!(f, "inbound observation is disabled"),
            CrosschainError::OutboundDisabled => write!(f, "outbound processing is disabled"),
            CrosschainError::OutboundParamsMismatch(m) => {
                write!(f, "outbound params mismatch: {m}")
            }
            CrosschainError::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for CrosschainError {}

pub type CrosschainResult<T> = Result<T, CrosschainError>;
