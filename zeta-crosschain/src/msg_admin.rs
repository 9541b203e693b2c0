// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Admin surface: stuck-CCTX abort, crosschain flag updates, TSS fund
//! migration, parameter updates, plus the observer gas-price voter.

use crate::keeper::CrosschainKeeper;
use crate::observer::{KeeperParams, PolicyType};
use crate::ABORT_MESSAGE;
use ethers::types::U256;
use ethers::utils::keccak256;
use tracing::{info, warn};
use zeta_chain_types::{
    CctxStatus, CoinType, CrossChainTx, CrosschainError, CrosschainResult, GasPrice,
    InboundTxParams, MsgAbortStuckCctx, MsgGasPriceVoter, MsgMigrateTssFunds,
    MsgUpdateCrosschainFlags, OutboundTxParams, Status, TxFinalizationStatus,
    TSS_MIGRATION_GAS_MULTIPLIER_EVM,
};

impl CrosschainKeeper {
    /// Abort a pending CCTX by admin command.
    pub fn abort_stuck_cctx(&mut self, msg: &MsgAbortStuckCctx) -> CrosschainResult<()> {
        if !self.is_authorized(&msg.creator, PolicyType::GroupAdmin) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        let mut cctx = self
            .get_cross_chain_tx(&msg.cctx_index)
            .ok_or_else(|| CrosschainError::CannotFindCctx(msg.cctx_index.clone()))?;
        if !cctx.is_pending() {
            return Err(CrosschainError::StatusNotPending);
        }

        let outbound = cctx.current_outbound().clone();
        cctx.cctx_status = Status {
            status: CctxStatus::Aborted,
            status_message: ABORT_MESSAGE.to_string(),
            last_update_timestamp: self.block_time_unix(),
            is_abort_refunded: false,
        };
        let tss = self.tss.tss_pubkey.clone();
        self.remove_nonce_to_cctx(
            &tss,
            outbound.receiver_chain_id,
            outbound.outbound_tx_tss_nonce,
        );
        self.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        warn!(index = %msg.cctx_index, "cctx aborted by admin");
        Ok(())
    }

    /// Update protocol-wide crosschain switches.
    pub fn update_crosschain_flags(
        &mut self,
        msg: &MsgUpdateCrosschainFlags,
    ) -> CrosschainResult<()> {
        if !self.is_authorized(&msg.creator, PolicyType::GroupAdmin) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        self.flags.is_inbound_enabled = msg.is_inbound_enabled;
        self.flags.is_outbound_enabled = msg.is_outbound_enabled;
        if let Some(gas_flags) = &msg.gas_price_increase_flags {
            self.flags.gas_price_increase_flags = gas_flags.clone();
        }
        if let Some(header_flags) = &msg.block_header_verification_flags {
            self.flags.block_header_verification_flags = header_flags.clone();
        }
        info!(
            inbound = msg.is_inbound_enabled,
            outbound = msg.is_outbound_enabled,
            "crosschain flags updated"
        );
        Ok(())
    }

    /// Replace the governance-parameterized knobs.
    pub fn update_params(&mut self, creator: &str, params: KeeperParams) -> CrosschainResult<()> {
        if !self.is_authorized(creator, PolicyType::GroupAdmin) {
            return Err(CrosschainError::NotAuthorized(creator.to_string()));
        }
        self.params = params;
        Ok(())
    }

    /// Sweep TSS funds on an external chain to the next TSS key. Creates a
    /// `Cmd` CCTX whose gas price carries the migration multiplier so the
    /// sweep does not get stuck behind the mempool.
    pub fn migrate_tss_funds(&mut self, msg: &MsgMigrateTssFunds) -> CrosschainResult<String> {
        if !self.is_authorized(&msg.creator, PolicyType::GroupAdmin) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        self.supported_chain_params(msg.chain_id)?;
        let median = self
            .median_gas_price(msg.chain_id)
            .ok_or_else(|| CrosschainError::Internal(format!(
                "gas price not found for chain {}",
                msg.chain_id
            )))?;
        // x2.5 on EVM chains
        let migration_gas_price = median * TSS_MIGRATION_GAS_MULTIPLIER_EVM / 10;

        let nonce = self.get_and_increment_nonce(msg.chain_id);
        let index_payload = format!(
            "{}-{}-{}-{}-{}",
            self.tss.tss_pubkey,
            msg.chain_id,
            msg.amount,
            nonce,
            self.zeta_block_height()
        );
        let index = format!("0x{}", hex::encode(keccak256(index_payload.as_bytes())));

        let cctx = CrossChainTx {
            creator: msg.creator.clone(),
            index: index.clone(),
            zeta_fees: U256::zero(),
            relayed_message: format!("MigrateTssFunds:{}", msg.amount),
            cctx_status: Status {
                status: CctxStatus::PendingOutbound,
                status_message: String::new(),
                last_update_timestamp: self.block_time_unix(),
                is_abort_refunded: false,
            },
            inbound_tx_params: InboundTxParams {
                sender: String::new(),
                sender_chain_id: msg.chain_id,
                tx_origin: msg.creator.clone(),
                asset: String::new(),
                amount: msg.amount,
                coin_type: CoinType::Cmd,
                inbound_tx_observed_hash: index.clone(),
                inbound_tx_observed_external_height: 0,
                inbound_tx_finalized_zeta_height: self.zeta_block_height(),
                inbound_tx_ballot_index: index.clone(),
                tx_finalization_status: TxFinalizationStatus::Finalized,
            },
            outbound_tx_params: vec![OutboundTxParams {
                receiver: self.tss.eth_address.clone(),
                receiver_chain_id: msg.chain_id,
                coin_type: CoinType::Cmd,
                amount: msg.amount,
                outbound_tx_tss_nonce: nonce,
                outbound_tx_gas_limit: 100_000,
                outbound_tx_gas_price: migration_gas_price.to_string(),
                outbound_tx_hash: String::new(),
                outbound_tx_ballot_index: String::new(),
                outbound_tx_observed_external_height: 0,
                outbound_tx_gas_used: 0,
                outbound_tx_effective_gas_price: U256::zero(),
                tss_pubkey: self.tss.tss_pubkey.clone(),
            }],
        };
        self.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);
        info!(%index, chain_id = msg.chain_id, "tss migration cctx created");
        Ok(index)
    }

    /// Record a gas-price sample; one slot per signer, median recomputed.
    pub fn gas_price_voter(&mut self, msg: &MsgGasPriceVoter) -> CrosschainResult<()> {
        if !self.is_observer(&msg.creator) {
            return Err(CrosschainError::NotAuthorized(msg.creator.clone()));
        }
        self.supported_chain_params(msg.chain_id)?;

        let mut record = self.get_gas_price(msg.chain_id).unwrap_or(GasPrice {
            chain_id: msg.chain_id,
            ..Default::default()
        });
        match record.signers.iter().position(|s| s == &msg.creator) {
            Some(slot) => {
                record.prices[slot] = msg.price;
                record.block_nums[slot] = msg.block_number;
            }
            None => {
                record.signers.push(msg.creator.clone());
                record.prices.push(msg.price);
                record.block_nums.push(msg.block_number);
            }
        }
        record.median_index = median_index(&record.prices);
        self.set_gas_price(&record);
        Ok(())
    }
}

/// Index into `prices` of the median value.
fn median_index(prices: &[u64]) -> u64 {
    if prices.is_empty() {
        return 0;
    }
    let mut sorted: Vec<(u64, usize)> = prices
        .iter()
        .enumerate()
        .map(|(index, price)| (*price, index))
        .collect();
    sorted.sort();
    sorted[sorted.len() / 2].1 as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keeper::test_utils::*;

    #[test]
    fn test_abort_stuck_cctx_sets_exact_message() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xstuck", 3, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);

        keeper
            .abort_stuck_cctx(&MsgAbortStuckCctx {
                creator: ADMIN.to_string(),
                cctx_index: "0xstuck".to_string(),
            })
            .unwrap();

        let aborted = keeper.get_cross_chain_tx("0xstuck").unwrap();
        assert_eq!(aborted.cctx_status.status, CctxStatus::Aborted);
        assert_eq!(aborted.cctx_status.status_message, "CCTX aborted with admin cmd");
        // the nonce slot is released
        assert!(keeper.get_cctx_by_nonce(97, 3).is_none());
    }

    #[test]
    fn test_abort_requires_admin() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xstuck2", 4, CctxStatus::PendingOutbound);
        keeper.set_cctx_and_nonce_to_cctx_and_in_tx_hash_to_cctx(&cctx);

        for creator in [OBSERVER_0, EMERGENCY, "zeta1stranger"] {
            let err = keeper
                .abort_stuck_cctx(&MsgAbortStuckCctx {
                    creator: creator.to_string(),
                    cctx_index: "0xstuck2".to_string(),
                })
                .unwrap_err();
            assert!(matches!(err, CrosschainError::NotAuthorized(_)));
        }
    }

    #[test]
    fn test_abort_terminal_cctx_rejected() {
        let mut keeper = test_keeper();
        let cctx = sample_cctx("0xdone", 5, CctxStatus::OutboundMined);
        keeper.set_cross_chain_tx(&cctx);

        let err = keeper
            .abort_stuck_cctx(&MsgAbortStuckCctx {
                creator: ADMIN.to_string(),
                cctx_index: "0xdone".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, CrosschainError::StatusNotPending));

        let err = keeper
            .abort_stuck_cctx(&MsgAbortStuckCctx {
                creator: ADMIN.to_string(),
                cctx_index: "0xmissing".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, CrosschainError::CannotFindCctx(_)));
    }

    #[test]
    fn test_update_crosschain_flags() {
        let mut keeper = test_keeper();
        keeper
            .update_crosschain_flags(&MsgUpdateCrosschainFlags {
                creator: ADMIN.to_string(),
                is_inbound_enabled: false,
                is_outbound_enabled: false,
                gas_price_increase_flags: None,
                block_header_verification_flags: Some(
                    zeta_chain_types::BlockHeaderVerificationFlags {
                        is_eth_type_chain_enabled: true,
                        is_btc_type_chain_enabled: false,
                    },
                ),
            })
            .unwrap();
        assert!(!keeper.flags.is_inbound_enabled);
        assert!(!keeper.flags.is_outbound_enabled);
        assert!(keeper.flags.block_header_verification_flags.is_eth_type_chain_enabled);

        let err = keeper
            .update_crosschain_flags(&MsgUpdateCrosschainFlags {
                creator: OBSERVER_0.to_string(),
                is_inbound_enabled: true,
                is_outbound_enabled: true,
                gas_price_increase_flags: None,
                block_header_verification_flags: None,
            })
            .unwrap_err();
        assert!(matches!(err, CrosschainError::NotAuthorized(_)));
    }

    #[test]
    fn test_migrate_tss_funds_applies_multiplier() {
        let mut keeper = test_keeper();
        keeper
            .gas_price_voter(&MsgGasPriceVoter {
                creator: OBSERVER_0.to_string(),
                chain_id: 97,
                price: 10_000_000_000,
                block_number: 1,
                supply: "100".to_string(),
            })
            .unwrap();

        let index = keeper
            .migrate_tss_funds(&MsgMigrateTssFunds {
                creator: ADMIN.to_string(),
                chain_id: 97,
                amount: U256::exp10(18),
            })
            .unwrap();

        let cctx = keeper.get_cross_chain_tx(&index).unwrap();
        assert_eq!(cctx.cctx_status.status, CctxStatus::PendingOutbound);
        let outbound = cctx.current_outbound();
        assert_eq!(outbound.coin_type, CoinType::Cmd);
        // 10 gwei x 2.5
        assert_eq!(outbound.outbound_tx_gas_price, "25000000000");
        assert_eq!(keeper.get_cctx_by_nonce(97, outbound.outbound_tx_tss_nonce).unwrap().index, index);
    }

    #[test]
    fn test_gas_price_voter_median() {
        let mut keeper = test_keeper();
        for (observer, price) in [(OBSERVER_0, 10u64), (OBSERVER_1, 30), (OBSERVER_2, 20)] {
            keeper
                .gas_price_voter(&MsgGasPriceVoter {
                    creator: observer.to_string(),
                    chain_id: 5,
                    price,
                    block_number: 1,
                    supply: "100".to_string(),
                })
                .unwrap();
        }
        assert_eq!(keeper.median_gas_price(5), Some(20));

        // a signer re-votes into its existing slot
        keeper
            .gas_price_voter(&MsgGasPriceVoter {
                creator: OBSERVER_0.to_string(),
                chain_id: 5,
                price: 50,
                block_number: 2,
                supply: "100".to_string(),
            })
            .unwrap();
        let record = keeper.get_gas_price(5).unwrap();
        assert_eq!(record.signers.len(), 3);
        assert_eq!(keeper.median_gas_price(5), Some(30));
    }

    #[test]
    fn test_median_index_helper() {
        assert_eq!(median_index(&[]), 0);
        assert_eq!(median_index(&[7]), 0);
        let prices = [10u64, 30, 20];
        // median of {10,20,30} is 20, at position 2
        assert_eq!(median_index(&prices), 2);
    }
}
