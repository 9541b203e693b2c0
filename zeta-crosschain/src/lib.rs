// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The crosschain module: owns CCTX records, inbound/outbound ballots,
//! tracker ingestion, block-header voting and refund accounting. This is the
//! ZetaCore-side counterpart of the zetaclient daemon; the consensus engine
//! itself stays behind the message-handler surface exposed here.

pub mod ballot;
pub mod fungible;
pub mod genesis;
pub mod headers;
pub mod keeper;
pub mod msg_admin;
pub mod msg_tracker;
pub mod msg_vote_inbound;
pub mod msg_vote_outbound;
pub mod observer;
pub mod refund;
pub mod store;

pub use ballot::*;
pub use fungible::*;
pub use genesis::GenesisState;
pub use keeper::CrosschainKeeper;
pub use observer::*;

/// Status message set by the admin abort command; operators grep for it.
pub const ABORT_MESSAGE: &str = "CCTX aborted with admin cmd";
