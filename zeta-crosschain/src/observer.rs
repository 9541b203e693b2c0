// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeta_chain_types::{BlockHeaderVerificationFlags, GasPriceIncreaseFlags};

/// Authorization groups for privileged messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PolicyType {
    /// May pause/unpause and submit trackers without proof.
    GroupEmergency,
    /// May abort CCTXs, migrate TSS funds, update flags and params.
    GroupAdmin,
}

/// Accounts holding each policy group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityKeeper {
    policies: BTreeMap<PolicyType, String>,
}

impl AuthorityKeeper {
    pub fn new(emergency: &str, admin: &str) -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(PolicyType::GroupEmergency, emergency.to_string());
        policies.insert(PolicyType::GroupAdmin, admin.to_string());
        Self { policies }
    }

    pub fn is_authorized(&self, creator: &str, policy: PolicyType) -> bool {
        self.policies.get(&policy).map(String::as_str) == Some(creator)
    }
}

/// Protocol-wide switches, mutable through the admin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosschainFlags {
    pub is_inbound_enabled: bool,
    pub is_outbound_enabled: bool,
    pub gas_price_increase_flags: GasPriceIncreaseFlags,
    pub block_header_verification_flags: BlockHeaderVerificationFlags,
}

impl Default for CrosschainFlags {
    fn default() -> Self {
        Self {
            is_inbound_enabled: true,
            is_outbound_enabled: true,
            gas_price_increase_flags: GasPriceIncreaseFlags::default(),
            block_header_verification_flags: BlockHeaderVerificationFlags::default(),
        }
    }
}

/// The active TSS key and its per-family addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssState {
    pub tss_pubkey: String,
    pub eth_address: String,
    pub btc_address: String,
}

/// Governance-parameterized knobs with protocol defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperParams {
    pub max_message_length: usize,
    /// Flat fee on message-passing CCTXs, azeta, as a decimal string.
    pub protocol_fee: String,
}

impl Default for KeeperParams {
    fn default() -> Self {
        Self {
            max_message_length: zeta_chain_types::MAX_MESSAGE_LENGTH,
            protocol_fee: zeta_chain_types::protocol_fee().to_string(),
        }
    }
}
