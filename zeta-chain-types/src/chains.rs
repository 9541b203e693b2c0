// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::CrosschainError;
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use strum::Display;

/// The family an external chain belongs to. Observer/signer pairs differ per
/// family but present one capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ChainFamily {
    Evm,
    Bitcoin,
    Zeta,
}

/// A chain descriptor. IDs are globally unique across families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: i64,
    pub name: String,
    pub family: ChainFamily,
    pub supports_merkle_proof: bool,
}

impl Chain {
    pub fn new(id: i64, name: &str, family: ChainFamily, supports_merkle_proof: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            family,
            supports_merkle_proof,
        }
    }

    pub fn is_evm(&self) -> bool {
        self.family == ChainFamily::Evm
    }

    pub fn is_bitcoin(&self) -> bool {
        self.family == ChainFamily::Bitcoin
    }

    pub fn is_zeta(&self) -> bool {
        self.family == ChainFamily::Zeta
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

pub const ZETA_MAINNET_CHAIN_ID: i64 = 7000;
pub const ZETA_TESTNET_CHAIN_ID: i64 = 7001;
pub const ETH_MAINNET_CHAIN_ID: i64 = 1;
pub const GOERLI_CHAIN_ID: i64 = 5;
pub const SEPOLIA_CHAIN_ID: i64 = 11155111;
pub const BSC_MAINNET_CHAIN_ID: i64 = 56;
pub const BSC_TESTNET_CHAIN_ID: i64 = 97;
pub const MUMBAI_CHAIN_ID: i64 = 80001;
pub const BTC_MAINNET_CHAIN_ID: i64 = 8332;
pub const BTC_TESTNET_CHAIN_ID: i64 = 18332;
pub const BTC_REGTEST_CHAIN_ID: i64 = 18444;

/// The set of chains this build knows about.
pub fn default_chains() -> Vec<Chain> {
    vec![
        Chain::new(ZETA_MAINNET_CHAIN_ID, "zeta_mainnet", ChainFamily::Zeta, false),
        Chain::new(ZETA_TESTNET_CHAIN_ID, "zeta_testnet", ChainFamily::Zeta, false),
        Chain::new(ETH_MAINNET_CHAIN_ID, "eth_mainnet", ChainFamily::Evm, true),
        Chain::new(GOERLI_CHAIN_ID, "goerli_testnet", ChainFamily::Evm, true),
        Chain::new(SEPOLIA_CHAIN_ID, "sepolia_testnet", ChainFamily::Evm, true),
        Chain::new(BSC_MAINNET_CHAIN_ID, "bsc_mainnet", ChainFamily::Evm, true),
        Chain::new(BSC_TESTNET_CHAIN_ID, "bsc_testnet", ChainFamily::Evm, true),
        Chain::new(MUMBAI_CHAIN_ID, "mumbai_testnet", ChainFamily::Evm, false),
        Chain::new(BTC_MAINNET_CHAIN_ID, "btc_mainnet", ChainFamily::Bitcoin, true),
        Chain::new(BTC_TESTNET_CHAIN_ID, "btc_testnet", ChainFamily::Bitcoin, true),
        Chain::new(BTC_REGTEST_CHAIN_ID, "btc_regtest", ChainFamily::Bitcoin, false),
    ]
}

pub fn chain_from_id(chain_id: i64) -> Option<Chain> {
    default_chains().into_iter().find(|c| c.id == chain_id)
}

pub fn is_evm_chain(chain_id: i64) -> bool {
    chain_from_id(chain_id).map(|c| c.is_evm()).unwrap_or(false)
}

pub fn is_bitcoin_chain(chain_id: i64) -> bool {
    chain_from_id(chain_id)
        .map(|c| c.is_bitcoin())
        .unwrap_or(false)
}

pub fn is_zeta_chain(chain_id: i64) -> bool {
    chain_from_id(chain_id).map(|c| c.is_zeta()).unwrap_or(false)
}

/// Chains for which block-header voting is supported.
pub fn is_header_supported_chain(chain_id: i64) -> bool {
    chain_from_id(chain_id)
        .map(|c| c.supports_merkle_proof)
        .unwrap_or(false)
}

/// Net params for a Bitcoin chain ID, needed to derive the TSS P2WPKH
/// address and to validate outbound transaction bodies.
pub fn btc_net_params(chain_id: i64) -> Result<Network, CrosschainError> {
    match chain_id {
        BTC_MAINNET_CHAIN_ID => Ok(Network::Bitcoin),
        BTC_TESTNET_CHAIN_ID => Ok(Network::Testnet),
        BTC_REGTEST_CHAIN_ID => Ok(Network::Regtest),
        _ => Err(CrosschainError::UnsupportedChain(chain_id)),
    }
}
