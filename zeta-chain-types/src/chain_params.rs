// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{CrosschainError, CrosschainResult};
use serde::{Deserialize, Serialize};

/// Per-chain operational parameters, owned by ZetaCore and replicated into
/// every zetaclient. Tickers are re-read by the observers each cycle so
/// operators can retune a live chain without restarting the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: i64,
    /// Connector contract emitting ZetaSent/ZetaReceived/ZetaReverted.
    pub connector_contract_address: String,
    /// ERC20 custody escrow emitting Deposited/Withdrawn.
    pub erc20_custody_contract_address: String,
    /// The ZETA token contract on this chain.
    pub zeta_token_contract_address: String,
    /// Blocks below `tip - confirmation_count` are treated as safe.
    pub confirmation_count: u64,
    /// Inbound observation interval, seconds.
    pub in_tx_ticker: u64,
    /// Outbound confirmation interval, seconds.
    pub out_tx_ticker: u64,
    /// Gas price reporting interval, seconds.
    pub gas_price_ticker: u64,
    /// Outbound fee-bump schedule: percentage added per retry.
    pub gas_price_increase_percent: u64,
    /// Maximum multiple of the original gas price a bump may reach.
    pub gas_price_increase_max: u64,
    pub outbound_tx_schedule_interval: u64,
    pub outbound_tx_schedule_lookahead: u64,
    pub is_supported: bool,
}

impl ChainParams {
    pub fn validate(&self) -> CrosschainResult<()> {
        if self.chain_id < 0 {
            return Err(CrosschainError::InvalidChainId(self.chain_id));
        }
        if self.confirmation_count == 0 {
            return Err(CrosschainError::InvalidMessage(
                "confirmation count must be positive".to_string(),
            ));
        }
        for (name, ticker) in [
            ("in_tx_ticker", self.in_tx_ticker),
            ("out_tx_ticker", self.out_tx_ticker),
            ("gas_price_ticker", self.gas_price_ticker),
        ] {
            if ticker == 0 || ticker > 300 {
                return Err(CrosschainError::InvalidMessage(format!(
                    "{name} must be in (0, 300], got {ticker}"
                )));
            }
        }
        Ok(())
    }
}

pub fn default_chain_params(chain_id: i64) -> ChainParams {
    ChainParams {
        chain_id,
        connector_contract_address: String::new(),
        erc20_custody_contract_address: String::new(),
        zeta_token_contract_address: String::new(),
        confirmation_count: 14,
        in_tx_ticker: 12,
        out_tx_ticker: 15,
        gas_price_ticker: 30,
        gas_price_increase_percent: 100,
        gas_price_increase_max: 500,
        outbound_tx_schedule_interval: 30,
        outbound_tx_schedule_lookahead: 60,
        is_supported: true,
    }
}
