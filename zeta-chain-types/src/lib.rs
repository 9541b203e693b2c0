// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Base types shared by the zetaclient daemon and the crosschain keeper:
//! chain registry, chain parameters, CCTX records, vote messages, block
//! headers and inclusion proofs.

pub mod cctx;
pub mod chain_params;
pub mod chains;
pub mod error;
pub mod header;
pub mod messages;
pub mod proof;

pub use cctx::*;
pub use chain_params::*;
pub use chains::*;
pub use error::*;
pub use header::*;
pub use messages::*;
pub use proof::*;

use ethers::types::U256;

/// Maximum length of the relayed message carried by a CCTX.
/// Governance-parameterized; this is the protocol default.
pub const MAX_MESSAGE_LENGTH: usize = 10_240;

/// Flat protocol fee charged on message-passing CCTXs, in azeta (1e-18 ZETA).
pub fn protocol_fee() -> U256 {
    U256::exp10(18) * 2u64
}

/// Maximum number of blocks an observer scans in one tick.
pub const MAX_BLOCKS_PER_SCAN: u64 = 100;

/// Gas price multiplier applied to EVM TSS fund migrations so the sweep
/// does not get stuck behind the mempool.
pub const TSS_MIGRATION_GAS_MULTIPLIER_EVM: u64 = 25; // x2.5, in tenths

/// Offset added to an outbound nonce to form the Bitcoin nonce-mark output
/// value, in satoshis. Keeps the marker above the dust limit.
pub const BTC_NONCE_MARK_OFFSET: u64 = 2000;

/// The value of the first output of a Bitcoin outbound serving `nonce`.
pub fn nonce_mark_amount(nonce: u64) -> u64 {
    BTC_NONCE_MARK_OFFSET + nonce
}
