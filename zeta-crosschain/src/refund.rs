// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Refund primitives applied to aborted CCTXs on ZetaChain.

use crate::keeper::CrosschainKeeper;
use crate::observer::PolicyType;
use ethers::types::U256;
use tracing::info;
use zeta_chain_types::{
    is_evm_chain, CoinType, CrossChainTx, CrosschainError, CrosschainResult,
};

impl CrosschainKeeper {
    /// Refund the gas asset of an aborted CCTX by minting the source chain's
    /// gas ZRC20 to the refund address.
    pub fn refund_amount_on_zeta_chain_gas(
        &mut self,
        cctx: &CrossChainTx,
        refund_address: &str,
    ) -> CrosschainResult<()> {
        if cctx.inbound_tx_params.coin_type != CoinType::Gas {
            return Err(CrosschainError::Internal(
                "refund amount on zeta chain gas is only for gas coin type".to_string(),
            ));
        }
        let chain_id = cctx.inbound_tx_params.sender_chain_id;
        if !is_evm_chain(chain_id) {
            return Err(CrosschainError::Internal(format!(
                "refund not supported on chain {chain_id}"
            )));
        }
        let amount = refund_amount(cctx)?;
        let zrc20 = self
            .fungible
            .gas_coin_zrc20(chain_id)
            .ok_or_else(|| CrosschainError::ForeignCoinNotFound(format!("chain {chain_id}")))?;
        self.fungible.mint_zrc20(&zrc20, refund_address, amount)?;
        info!(index = %cctx.index, %amount, "gas refund minted");
        Ok(())
    }

    /// Refund an ERC20 deposit by minting the matching ZRC20, keyed by
    /// `(chain, asset)`.
    pub fn refund_amount_on_zeta_chain_erc20(
        &mut self,
        cctx: &CrossChainTx,
        refund_address: &str,
    ) -> CrosschainResult<()> {
        if cctx.inbound_tx_params.coin_type != CoinType::Erc20 {
            return Err(CrosschainError::Internal(
                "refund amount on zeta chain erc20 is only for erc20 coin type".to_string(),
            ));
        }
        let chain_id = cctx.inbound_tx_params.sender_chain_id;
        if !is_evm_chain(chain_id) {
            return Err(CrosschainError::Internal(format!(
                "refund not supported on chain {chain_id}"
            )));
        }
        let amount = refund_amount(cctx)?;
        let zrc20 = self
            .fungible
            .zrc20_by_asset(chain_id, &cctx.inbound_tx_params.asset)
            .ok_or_else(|| {
                CrosschainError::ForeignCoinNotFound(format!(
                    "chain {chain_id} asset {}",
                    cctx.inbound_tx_params.asset
                ))
            })?;
        self.fungible.mint_zrc20(&zrc20, refund_address, amount)?;
        info!(index = %cctx.index, %amount, "erc20 refund minted");
        Ok(())
    }

    /// Refund native ZETA from the module account.
    pub fn refund_amount_on_zeta_chain_zeta(
        &mut self,
        cctx: &CrossChainTx,
        refund_address: &str,
    ) -> CrosschainResult<()> {
        if cctx.inbound_tx_params.coin_type != CoinType::Zeta {
            return Err(CrosschainError::Internal(
                "refund amount on zeta chain zeta is only for zeta coin type".to_string(),
            ));
        }
        let amount = refund_amount(cctx)?;
        self.fungible.deposit_zeta(refund_address, amount)?;
        info!(index = %cctx.index, %amount, "zeta refund deposited");
        Ok(())
    }

    /// Admin: refund an aborted CCTX once. Dispatches on the inbound coin
    /// type and marks the CCTX refunded.
    pub fn refund_aborted_cctx(
        &mut self,
        creator: &str,
        cctx_index: &str,
        refund_address: Option<&str>,
    ) -> CrosschainResult<()> {
        if !self.is_authorized(creator, PolicyType::GroupAdmin) {
            return Err(CrosschainError::NotAuthorized(creator.to_string()));
        }
        let mut cctx = self
            .get_cross_chain_tx(cctx_index)
            .ok_or_else(|| CrosschainError::CannotFindCctx(cctx_index.to_string()))?;
        if cctx.cctx_status.status != zeta_chain_types::CctxStatus::Aborted {
            return Err(CrosschainError::Internal(
                "cctx is not aborted".to_string(),
            ));
        }
        if cctx.cctx_status.is_abort_refunded {
            return Err(CrosschainError::Internal(
                "cctx is already refunded".to_string(),
            ));
        }
        let refund_address = refund_address
            .map(str::to_string)
            .unwrap_or_else(|| cctx.inbound_tx_params.sender.clone());

        match cctx.inbound_tx_params.coin_type {
            CoinType::Gas => self.refund_amount_on_zeta_chain_gas(&cctx, &refund_address)?,
            CoinType::Erc20 => self.refund_amount_on_zeta_chain_erc20(&cctx, &refund_address)?,
            CoinType::Zeta => self.refund_amount_on_zeta_chain_zeta(&cctx, &refund_address)?,
            CoinType::Cmd => {
                return Err(CrosschainError::Internal(
                    "cmd cctx is not refundable".to_string(),
                ))
            }
        }
        cctx.cctx_status.is_abort_refunded = true;
        cctx.cctx_status.last_update_timestamp = self.block_time_unix();
        self.set_cross_chain_tx(&cctx);
        Ok(())
    }
}

/// Outbound amount when present, inbound amount otherwise; zero refunds are
/// rejected.
fn refund_amount(cctx: &CrossChainTx) -> CrosschainResult<U256> {
    let outbound = cctx.current_outbound();
    let amount = if !outbound.amount.is_zero() {
        outbound.amount
    } else {
        cctx.inbound_tx_params.amount
    };
    if amount.is_zero() {
        return Err(CrosschainError::NoRefundAmount);
    }
    Ok(amount)
}
