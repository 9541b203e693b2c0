// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Interface to the fungible module: ZRC20 registry, minting and deposits.
//! The fungible module is an external collaborator; the keeper only depends
//! on this trait. `MemFungibleKeeper` backs node-local runs and tests.

use ethers::types::U256;
use std::collections::{BTreeMap, BTreeSet};
use zeta_chain_types::{CrosschainError, CrosschainResult};

pub trait FungibleKeeper: Send + Sync {
    /// The gas ZRC20 registered for an external chain, if any.
    fn gas_coin_zrc20(&self, chain_id: i64) -> Option<String>;

    /// The ZRC20 registered for `(chain, asset)`, if any.
    fn zrc20_by_asset(&self, chain_id: i64, asset: &str) -> Option<String>;

    fn total_supply(&self, zrc20: &str) -> U256;

    /// Zero means uncapped.
    fn liquidity_cap(&self, zrc20: &str) -> U256;

    fn balance_of(&self, zrc20: &str, account: &str) -> U256;

    fn mint_zrc20(&mut self, zrc20: &str, to: &str, amount: U256) -> CrosschainResult<()>;

    /// Mint and invoke the receiver contract with the relayed message.
    /// Fails with `ContractCall` when the receiver reverts.
    fn deposit_zrc20_and_call(
        &mut self,
        zrc20: &str,
        to: &str,
        amount: U256,
        message: &str,
    ) -> CrosschainResult<()>;

    /// Credit native ZETA from the module account.
    fn deposit_zeta(&mut self, to: &str, amount: U256) -> CrosschainResult<()>;

    fn zeta_balance_of(&self, account: &str) -> U256;
}

#[derive(Debug, Default)]
pub struct MemFungibleKeeper {
    gas_coins: BTreeMap<i64, String>,
    assets: BTreeMap<(i64, String), String>,
    supplies: BTreeMap<String, U256>,
    caps: BTreeMap<String, U256>,
    balances: BTreeMap<(String, String), U256>,
    zeta_balances: BTreeMap<String, U256>,
    /// Receivers that revert on call, simulating a reverter contract.
    /// The value is the revert selector reported back.
    reverters: BTreeMap<String, String>,
    deployed: BTreeSet<String>,
}

impl MemFungibleKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy_gas_coin(&mut self, chain_id: i64, zrc20: &str) {
        self.gas_coins.insert(chain_id, zrc20.to_string());
        self.deployed.insert(zrc20.to_string());
    }

    pub fn deploy_asset(&mut self, chain_id: i64, asset: &str, zrc20: &str) {
        self.assets
            .insert((chain_id, asset.to_lowercase()), zrc20.to_string());
        self.deployed.insert(zrc20.to_string());
    }

    pub fn set_liquidity_cap(&mut self, zrc20: &str, cap: U256) {
        self.caps.insert(zrc20.to_string(), cap);
    }

    pub fn set_reverter(&mut self, receiver: &str, selector: &str) {
        self.reverters
            .insert(receiver.to_lowercase(), selector.to_string());
    }
}

impl FungibleKeeper for MemFungibleKeeper {
    fn gas_coin_zrc20(&self, chain_id: i64) -> Option<String> {
        self.gas_coins.get(&chain_id).cloned()
    }

    fn zrc20_by_asset(&self, chain_id: i64, asset: &str) -> Option<String> {
        self.assets.get(&(chain_id, asset.to_lowercase())).cloned()
    }

    fn total_supply(&self, zrc20: &str) -> U256 {
        self.supplies.get(zrc20).copied().unwrap_or_default()
    }

    fn liquidity_cap(&self, zrc20: &str) -> U256 {
        self.caps.get(zrc20).copied().unwrap_or_default()
    }

    fn balance_of(&self, zrc20: &str, account: &str) -> U256 {
        self.balances
            .get(&(zrc20.to_string(), account.to_lowercase()))
            .copied()
            .unwrap_or_default()
    }

    fn mint_zrc20(&mut self, zrc20: &str, to: &str, amount: U256) -> CrosschainResult<()> {
        if !self.deployed.contains(zrc20) {
            return Err(CrosschainError::Zrc20NotFound(zrc20.to_string()));
        }
        let supply = self.supplies.entry(zrc20.to_string()).or_default();
        *supply = supply
            .checked_add(amount)
            .ok_or_else(|| CrosschainError::ContractCall("supply overflow".to_string()))?;
        let balance = self
            .balances
            .entry((zrc20.to_string(), to.to_lowercase()))
            .or_default();
        *balance += amount;
        Ok(())
    }

    fn deposit_zrc20_and_call(
        &mut self,
        zrc20: &str,
        to: &str,
        amount: U256,
        _message: &str,
    ) -> CrosschainResult<()> {
        if let Some(selector) = self.reverters.get(&to.to_lowercase()).cloned() {
            return Err(CrosschainError::ContractCall(format!(
                "execution reverted: {selector}"
            )));
        }
        self.mint_zrc20(zrc20, to, amount)
    }

    fn deposit_zeta(&mut self, to: &str, amount: U256) -> CrosschainResult<()> {
        let balance = self.zeta_balances.entry(to.to_lowercase()).or_default();
        *balance += amount;
        Ok(())
    }

    fn zeta_balance_of(&self, account: &str) -> U256 {
        self.zeta_balances
            .get(&account.to_lowercase())
            .copied()
            .unwrap_or_default()
    }
}
