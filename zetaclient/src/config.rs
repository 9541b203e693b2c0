// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use zeta_config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyringBackend {
    #[default]
    Test,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    pub chain_id: i64,
    pub endpoint: String,
    /// Optional cursor override; scanning resumes from the persisted cursor
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_from: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BtcChainConfig {
    pub chain_id: i64,
    pub endpoint: String,
    pub rpc_user: String,
    pub rpc_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_from: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ComplianceConfig {
    #[serde(default)]
    pub restricted_addresses: Vec<String>,
}

/// Daemon configuration. Per-chain tickers and confirmation counts are NOT
/// here: they are chain params owned by ZetaCore and re-read each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZetaclientConfig {
    pub zeta_core_url: String,
    /// The ZetaChain network id this client serves.
    pub chain_id: i64,
    pub authz_granter: String,
    pub authz_hotkey: String,
    #[serde(default)]
    pub keyring_backend: KeyringBackend,
    #[serde(default)]
    pub hsm_mode: bool,
    #[serde(default)]
    pub hsm_hot_key: String,
    pub tss_path: String,
    pub pre_params_path: String,
    /// Local sled database directory (scan cursors, confirmed receipts).
    pub db_path: PathBuf,
    pub telemetry_port: u16,
    #[serde(default)]
    pub evm_chain_configs: BTreeMap<i64, EvmChainConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub btc_chain_config: Option<BtcChainConfig>,
    #[serde(default)]
    pub compliance_config: ComplianceConfig,
}

impl Config for ZetaclientConfig {}

impl Default for ZetaclientConfig {
    fn default() -> Self {
        Self {
            zeta_core_url: "127.0.0.1".to_string(),
            chain_id: zeta_chain_types::ZETA_TESTNET_CHAIN_ID,
            authz_granter: String::new(),
            authz_hotkey: "zetaclient".to_string(),
            keyring_backend: KeyringBackend::Test,
            hsm_mode: false,
            hsm_hot_key: "hsm-hotkey".to_string(),
            tss_path: "~/.tss".to_string(),
            pre_params_path: String::new(),
            db_path: PathBuf::from("zetaclient_db"),
            telemetry_port: 8886,
            evm_chain_configs: BTreeMap::new(),
            btc_chain_config: None,
            compliance_config: ComplianceConfig::default(),
        }
    }
}

impl ZetaclientConfig {
    pub fn validate(&self) -> ClientResult<()> {
        if self.chain_id < 0 {
            return Err(ClientError::Config(format!(
                "invalid zeta chain id {}",
                self.chain_id
            )));
        }
        for (chain_id, chain) in &self.evm_chain_configs {
            if *chain_id != chain.chain_id {
                return Err(ClientError::Config(format!(
                    "evm config key {chain_id} does not match chain id {}",
                    chain.chain_id
                )));
            }
            if chain.endpoint.is_empty() {
                return Err(ClientError::Config(format!(
                    "missing endpoint for chain {chain_id}"
                )));
            }
            if !zeta_chain_types::is_evm_chain(*chain_id) {
                return Err(ClientError::Config(format!(
                    "chain {chain_id} is not an evm chain"
                )));
            }
        }
        if let Some(btc) = &self.btc_chain_config {
            if !zeta_chain_types::is_bitcoin_chain(btc.chain_id) {
                return Err(ClientError::Config(format!(
                    "chain {} is not a bitcoin chain",
                    btc.chain_id
                )));
            }
        }
        Ok(())
    }
}
