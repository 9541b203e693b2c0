// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-chain inbound observers. The cross-cutting loop (tick → window →
//! sort → vote) is chain-agnostic; event extraction and transaction shapes
//! differ per family.

pub mod btc;
pub mod events;
pub mod evm;

/// The next block window to scan: `[last_scanned+1, min(last_scanned+batch,
/// latest_confirmed)]`.
pub fn calc_block_range_to_scan(
    latest_confirmed: u64,
    last_scanned: u64,
    batch_size: u64,
) -> (u64, u64) {
    let start_block = last_scanned + 1;
    let to_block = (last_scanned + batch_size).min(latest_confirmed);
    (start_block, to_block)
}
