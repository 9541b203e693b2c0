// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! EVM outbound construction: chain-specific payload per coin type, TSS
//! signature assembly under London/EIP-155 rules, broadcast.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::{EvmRpc, TssSigner};
use ethers::abi::{encode, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address as EthAddress, Signature, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use std::sync::Arc;
use zeta_chain_types::{Chain, ChainParams, CoinType, CrossChainTx};

const CONNECTOR_ON_RECEIVE_SIG: &str = "onReceive(bytes,uint256,address,uint256,bytes,bytes32)";
const CONNECTOR_ON_REVERT_SIG: &str = "onRevert(address,uint256,bytes,uint256,bytes,bytes32)";
const CUSTODY_WITHDRAW_SIG: &str = "withdraw(address,address,uint256)";

/// Minimum gas limit applied to outbounds with unset/absurd limits.
const MIN_GAS_LIMIT: u64 = 100_000;
const MAX_GAS_LIMIT: u64 = 1_000_000;

pub struct EvmSigner {
    chain: Chain,
    evm: Arc<dyn EvmRpc>,
    tss: Arc<dyn TssSigner>,
}

impl EvmSigner {
    pub fn new(chain: Chain, evm: Arc<dyn EvmRpc>, tss: Arc<dyn TssSigner>) -> Self {
        Self { chain, evm, tss }
    }

    /// Build, TSS-sign and broadcast the current outbound of a CCTX.
    pub async fn sign_and_broadcast(
        &self,
        cctx: &CrossChainTx,
        gas_price: U256,
        params: &ChainParams,
    ) -> ClientResult<H256> {
        let outbound = cctx.current_outbound();
        let (to, value, data) = self.build_payload(cctx, params)?;
        let gas_limit = outbound
            .outbound_tx_gas_limit
            .clamp(MIN_GAS_LIMIT, MAX_GAS_LIMIT);

        let request = TransactionRequest::new()
            .from(self.tss.evm_address())
            .to(to)
            .nonce(outbound.outbound_tx_tss_nonce)
            .value(value)
            .gas(gas_limit)
            .gas_price(gas_price)
            .data(data)
            .chain_id(self.chain.id as u64);
        let typed: TypedTransaction = request.into();
        let sighash = typed.sighash();

        let tss_signature = self.tss.sign(sighash.0).await?;
        let signature = Signature {
            r: U256::from_big_endian(&tss_signature.r),
            s: U256::from_big_endian(&tss_signature.s),
            v: tss_signature.recovery_id as u64 + 35 + 2 * self.chain.id as u64,
        };
        // sanity: the quorum signature must recover to the TSS address
        let recovered = signature
            .recover(sighash)
            .map_err(|e| ClientError::Tss(format!("signature recovery: {e}")))?;
        if recovered != self.tss.evm_address() {
            return Err(ClientError::Tss(format!(
                "tss signature recovers to {recovered:?}, expected {:?}",
                self.tss.evm_address()
            )));
        }

        let raw = typed.rlp_signed(&signature);
        self.evm.send_raw_transaction(raw).await
    }

    /// `(to, value, calldata)` per coin type; the revert leg of a
    /// message-pass CCTX calls `onRevert` instead of `onReceive`.
    fn build_payload(
        &self,
        cctx: &CrossChainTx,
        params: &ChainParams,
    ) -> ClientResult<(EthAddress, U256, Vec<u8>)> {
        let outbound = cctx.current_outbound();
        let receiver: EthAddress = outbound.receiver.parse().map_err(|_| {
            ClientError::InvalidResponse(format!("bad receiver address {}", outbound.receiver))
        })?;
        let message = hex::decode(&cctx.relayed_message).unwrap_or_default();

        match outbound.coin_type {
            // bare native transfer, including TSS migration sweeps
            CoinType::Gas | CoinType::Cmd => Ok((receiver, outbound.amount, Vec::new())),
            CoinType::Zeta => {
                let send_hash = parse_index_hash(&cctx.index)?;
                let connector: EthAddress =
                    params.connector_contract_address.parse().map_err(|_| {
                        ClientError::InvalidResponse("connector address unset".to_string())
                    })?;
                let is_revert = cctx.outbound_tx_params.len() > 1;
                let data = if is_revert {
                    encode_with_selector(
                        CONNECTOR_ON_REVERT_SIG,
                        &[
                            Token::Address(receiver),
                            Token::Uint(U256::from(
                                cctx.inbound_tx_params.sender_chain_id as u64,
                            )),
                            Token::Bytes(receiver.as_bytes().to_vec()),
                            Token::Uint(outbound.amount),
                            Token::Bytes(message),
                            Token::FixedBytes(send_hash.as_bytes().to_vec()),
                        ],
                    )
                } else {
                    encode_with_selector(
                        CONNECTOR_ON_RECEIVE_SIG,
                        &[
                            Token::Bytes(
                                cctx.inbound_tx_params
                                    .sender
                                    .trim_start_matches("0x")
                                    .as_bytes()
                                    .to_vec(),
                            ),
                            Token::Uint(U256::from(
                                cctx.inbound_tx_params.sender_chain_id as u64,
                            )),
                            Token::Address(receiver),
                            Token::Uint(outbound.amount),
                            Token::Bytes(message),
                            Token::FixedBytes(send_hash.as_bytes().to_vec()),
                        ],
                    )
                };
                Ok((connector, U256::zero(), data))
            }
            CoinType::Erc20 => {
                let custody: EthAddress =
                    params.erc20_custody_contract_address.parse().map_err(|_| {
                        ClientError::InvalidResponse("custody address unset".to_string())
                    })?;
                let asset: EthAddress =
                    cctx.inbound_tx_params.asset.parse().map_err(|_| {
                        ClientError::InvalidResponse(format!(
                            "bad asset address {}",
                            cctx.inbound_tx_params.asset
                        ))
                    })?;
                let data = encode_with_selector(
                    CUSTODY_WITHDRAW_SIG,
                    &[
                        Token::Address(receiver),
                        Token::Address(asset),
                        Token::Uint(outbound.amount),
                    ],
                );
                Ok((custody, U256::zero(), data))
            }
        }
    }
}

fn encode_with_selector(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = keccak256(signature.as_bytes())[..4].to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

fn parse_index_hash(index: &str) -> ClientResult<H256> {
    index
        .parse()
        .map_err(|_| ClientError::InvalidResponse(format!("cctx index {index} is not a hash")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use ethers::utils::rlp::Rlp;
    use zeta_chain_types::{chain_from_id, default_chain_params};

    fn signer_fixture(harness: &ObserverHarness) -> (EvmSigner, ChainParams) {
        let chain = chain_from_id(TEST_CHAIN_ID).unwrap();
        let mut params = default_chain_params(TEST_CHAIN_ID);
        params.connector_contract_address = format!("{:?}", connector_address());
        params.erc20_custody_contract_address = format!("{:?}", custody_address());
        (
            EvmSigner::new(chain, harness.evm.clone(), harness.tss.clone()),
            params,
        )
    }

    fn index_hash() -> String {
        format!("{:?}", H256::repeat_byte(0x5e))
    }

    #[tokio::test]
    async fn test_gas_outbound_is_bare_transfer() {
        let harness = ObserverHarness::new().await;
        let (signer, params) = signer_fixture(&harness);
        let mut cctx = pending_gas_cctx(
            &index_hash(),
            TEST_CHAIN_ID,
            7,
            EthAddress::repeat_byte(0x77),
        );
        cctx.outbound_tx_params[0].amount = U256::exp10(15);

        signer
            .sign_and_broadcast(&cctx, U256::from(40_000_000_000u64), &params)
            .await
            .unwrap();

        let raw = harness.evm.last_broadcast().await.unwrap();
        let (typed, sig) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        assert_eq!(typed.to_addr(), Some(&EthAddress::repeat_byte(0x77)));
        assert_eq!(typed.value(), Some(&U256::exp10(15)));
        assert_eq!(typed.nonce(), Some(&U256::from(7u64)));
        assert_eq!(typed.gas_price(), Some(U256::from(40_000_000_000u64)));
        assert!(typed.data().map(|d| d.0.is_empty()).unwrap_or(true));
        // sender recovery must equal the TSS EVM address
        assert_eq!(
            sig.recover(typed.sighash()).unwrap(),
            harness.tss.evm_address()
        );
    }

    #[tokio::test]
    async fn test_zeta_outbound_calls_connector_on_receive() {
        let harness = ObserverHarness::new().await;
        let (signer, params) = signer_fixture(&harness);
        let mut cctx = pending_gas_cctx(
            &index_hash(),
            TEST_CHAIN_ID,
            8,
            EthAddress::repeat_byte(0x77),
        );
        cctx.outbound_tx_params[0].coin_type = zeta_chain_types::CoinType::Zeta;
        cctx.inbound_tx_params.coin_type = zeta_chain_types::CoinType::Zeta;

        signer
            .sign_and_broadcast(&cctx, U256::from(40_000_000_000u64), &params)
            .await
            .unwrap();
        let raw = harness.evm.last_broadcast().await.unwrap();
        let (typed, _sig) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        assert_eq!(typed.to_addr(), Some(&connector_address()));
        assert_eq!(typed.value(), Some(&U256::zero()));
        let data = typed.data().unwrap();
        let selector = &keccak256(CONNECTOR_ON_RECEIVE_SIG.as_bytes())[..4];
        assert_eq!(&data.0[..4], selector);
    }

    #[tokio::test]
    async fn test_zeta_revert_leg_calls_on_revert() {
        let harness = ObserverHarness::new().await;
        let (signer, params) = signer_fixture(&harness);
        let mut cctx = pending_gas_cctx(
            &index_hash(),
            TEST_CHAIN_ID,
            9,
            EthAddress::repeat_byte(0x77),
        );
        cctx.outbound_tx_params[0].coin_type = zeta_chain_types::CoinType::Zeta;
        // a second outbound attempt marks the revert leg
        let mut revert = cctx.outbound_tx_params[0].clone();
        revert.outbound_tx_tss_nonce = 10;
        cctx.outbound_tx_params.push(revert);

        signer
            .sign_and_broadcast(&cctx, U256::from(40_000_000_000u64), &params)
            .await
            .unwrap();
        let raw = harness.evm.last_broadcast().await.unwrap();
        let (typed, _sig) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        let data = typed.data().unwrap();
        let selector = &keccak256(CONNECTOR_ON_REVERT_SIG.as_bytes())[..4];
        assert_eq!(&data.0[..4], selector);
    }

    #[tokio::test]
    async fn test_erc20_outbound_calls_custody_withdraw() {
        let harness = ObserverHarness::new().await;
        let (signer, params) = signer_fixture(&harness);
        let mut cctx = pending_gas_cctx(
            &index_hash(),
            TEST_CHAIN_ID,
            11,
            EthAddress::repeat_byte(0x77),
        );
        cctx.outbound_tx_params[0].coin_type = zeta_chain_types::CoinType::Erc20;
        cctx.inbound_tx_params.asset = format!("{:?}", EthAddress::repeat_byte(0x05));

        signer
            .sign_and_broadcast(&cctx, U256::from(40_000_000_000u64), &params)
            .await
            .unwrap();
        let raw = harness.evm.last_broadcast().await.unwrap();
        let (typed, _sig) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        assert_eq!(typed.to_addr(), Some(&custody_address()));
        let data = typed.data().unwrap();
        let selector = &keccak256(CUSTODY_WITHDRAW_SIG.as_bytes())[..4];
        assert_eq!(&data.0[..4], selector);
    }

    #[test]
    fn test_parse_index_hash_rejects_garbage() {
        assert!(parse_index_hash("not-a-hash").is_err());
        parse_index_hash(&format!("{:?}", H256::repeat_byte(1))).unwrap();
    }
}
