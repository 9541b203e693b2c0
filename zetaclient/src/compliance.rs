// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Restricted-address book. Loaded once at boot from config and treated as
//! an immutable snapshot; hot reloads swap the whole set atomically so
//! readers never see a torn mix.

use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::warn;
use zeta_chain_types::CrossChainTx;

static RESTRICTED_ADDRESS_BOOK: OnceLock<ArcSwap<HashSet<String>>> = OnceLock::new();

fn book() -> &'static ArcSwap<HashSet<String>> {
    RESTRICTED_ADDRESS_BOOK.get_or_init(|| ArcSwap::from_pointee(HashSet::new()))
}

/// Replace the snapshot. Addresses are compared lowercase.
pub fn load_restricted_addresses(addresses: &[String]) {
    let set: HashSet<String> = addresses
        .iter()
        .filter(|a| !a.is_empty())
        .map(|a| a.to_lowercase())
        .collect();
    book().store(Arc::new(set));
}

/// True if any of the given addresses is restricted. Accepts both EVM and
/// Bitcoin address strings; empty strings are ignored.
pub fn contains_restricted_address<S: AsRef<str>>(addresses: &[S]) -> bool {
    let snapshot = book().load();
    addresses
        .iter()
        .map(AsRef::as_ref)
        .filter(|a| !a.is_empty())
        .any(|a| snapshot.contains(&a.to_lowercase()))
}

/// A CCTX touching a restricted address on either leg must not move funds;
/// the confirmer votes it through as a `Cmd`-style cancellation instead.
pub fn is_cctx_restricted(cctx: &CrossChainTx) -> bool {
    let restricted = contains_restricted_address(&[
        cctx.inbound_tx_params.sender.as_str(),
        cctx.inbound_tx_params.tx_origin.as_str(),
        cctx.current_outbound().receiver.as_str(),
    ]);
    if restricted {
        warn!(index = %cctx.index, "cctx involves a restricted address");
    }
    restricted
}
