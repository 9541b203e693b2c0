// Copyright (c) Zeta Chain, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bitcoin outbound construction: a SegWit P2WPKH spend whose first output
//! value is the deterministic nonce mark, so confirmers can identify which
//! nonce a broadcast transaction served.

use crate::error::{ClientError, ClientResult};
use crate::interfaces::TssSigner;
use bitcoin::absolute::LockTime;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use std::sync::Arc;
use zeta_chain_types::nonce_mark_amount;

/// Outputs below this are unspendable dust; change smaller than this is
/// folded into the fee.
const DUST_LIMIT_SATS: u64 = 546;

/// Rough vsize model for P2WPKH spends.
const TX_OVERHEAD_VBYTES: u64 = 10;
const INPUT_VBYTES: u64 = 68;
const OUTPUT_VBYTES: u64 = 31;

#[derive(Debug, Clone)]
pub struct BtcUtxo {
    pub outpoint: OutPoint,
    pub value_sats: u64,
}

pub struct BtcSigner {
    network: Network,
    tss: Arc<dyn TssSigner>,
}

impl BtcSigner {
    pub fn new(network: Network, tss: Arc<dyn TssSigner>) -> Self {
        Self { network, tss }
    }

    /// Build and TSS-sign a withdrawal:
    /// output 0 — `nonce_mark(nonce)` back to the TSS address,
    /// output 1 — the payment,
    /// output 2 — change to the TSS address (when above dust).
    pub async fn build_signed_tx(
        &self,
        utxos: &[BtcUtxo],
        to: &bitcoin::Address,
        amount_sats: u64,
        nonce: u64,
        fee_rate_sat_per_vb: u64,
    ) -> ClientResult<Transaction> {
        if utxos.is_empty() {
            return Err(ClientError::InvalidResponse("no utxos to spend".to_string()));
        }
        let tss_address = self.tss.btc_address(self.network)?;
        let tss_script = tss_address.script_pubkey();
        let nonce_mark = nonce_mark_amount(nonce);

        let total_in: u64 = utxos.iter().map(|u| u.value_sats).sum();
        let vsize = TX_OVERHEAD_VBYTES
            + INPUT_VBYTES * utxos.len() as u64
            + OUTPUT_VBYTES * 3;
        let fee = vsize * fee_rate_sat_per_vb.max(1);
        let needed = nonce_mark + amount_sats + fee;
        if total_in < needed {
            return Err(ClientError::InvalidResponse(format!(
                "insufficient utxo value: have {total_in}, need {needed}"
            )));
        }
        let change = total_in - needed;

        let input: Vec<TxIn> = utxos
            .iter()
            .map(|u| TxIn {
                previous_output: u.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();
        let mut output = vec![
            TxOut {
                value: nonce_mark,
                script_pubkey: tss_script.clone(),
            },
            TxOut {
                value: amount_sats,
                script_pubkey: to.script_pubkey(),
            },
        ];
        if change >= DUST_LIMIT_SATS {
            output.push(TxOut {
                value: change,
                script_pubkey: tss_script.clone(),
            });
        }

        let mut tx = Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        // BIP143 script code for P2WPKH is the classic P2PKH script
        let pubkey = bitcoin::PublicKey::from_slice(&self.tss.btc_pubkey())
            .map_err(|e| ClientError::Tss(e.to_string()))?;
        let script_code = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());

        let mut sighashes = Vec::with_capacity(utxos.len());
        {
            let mut cache = SighashCache::new(&tx);
            for (index, utxo) in utxos.iter().enumerate() {
                let sighash = cache
                    .segwit_signature_hash(
                        index,
                        &script_code,
                        utxo.value_sats,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                sighashes.push(sighash);
            }
        }

        for (index, sighash) in sighashes.into_iter().enumerate() {
            let mut digest = [0u8; 32];
            digest.copy_from_slice(sighash.as_ref());
            let tss_signature = self.tss.sign(digest).await?;
            let der = bitcoin::secp256k1::ecdsa::Signature::from_compact(&tss_signature.compact())
                .map_err(|e| ClientError::Tss(e.to_string()))?
                .serialize_der();
            let mut sig_with_type = der.to_vec();
            sig_with_type.push(EcdsaSighashType::All as u8);

            let mut witness = Witness::new();
            witness.push(&sig_with_type);
            witness.push(self.tss.btc_pubkey());
            tx.input[index].witness = witness;
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::TestTssSigner;
    use crate::test_utils::{test_keeper, OPERATOR};
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;
    use std::str::FromStr;
    use zeta_chain_types::{MsgAddToOutTxTracker, BTC_TESTNET_CHAIN_ID};

    fn utxo(vout: u32, sats: u64) -> BtcUtxo {
        BtcUtxo {
            outpoint: OutPoint {
                txid: Txid::all_zeros(),
                vout,
            },
            value_sats: sats,
        }
    }

    fn recipient() -> bitcoin::Address {
        bitcoin::Address::from_str("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx")
            .unwrap()
            .require_network(Network::Testnet)
            .unwrap()
    }

    #[tokio::test]
    async fn test_nonce_mark_is_first_output() {
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let signer = BtcSigner::new(Network::Testnet, tss.clone());
        let tx = signer
            .build_signed_tx(&[utxo(0, 1_000_000)], &recipient(), 500_000, 7, 5)
            .await
            .unwrap();
        assert_eq!(tx.output[0].value, nonce_mark_amount(7));
        assert_eq!(
            tx.output[0].script_pubkey,
            tss.btc_address(Network::Testnet).unwrap().script_pubkey()
        );
        assert_eq!(tx.output[1].value, 500_000);
        // change above dust goes back to the TSS address
        assert_eq!(tx.output.len(), 3);
        assert_eq!(
            tx.output[2].script_pubkey,
            tss.btc_address(Network::Testnet).unwrap().script_pubkey()
        );
    }

    #[tokio::test]
    async fn test_witness_carries_sig_and_pubkey() {
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let signer = BtcSigner::new(Network::Testnet, tss.clone());
        let tx = signer
            .build_signed_tx(
                &[utxo(0, 700_000), utxo(1, 400_000)],
                &recipient(),
                500_000,
                3,
                5,
            )
            .await
            .unwrap();
        for input in &tx.input {
            assert_eq!(input.witness.len(), 2);
            assert_eq!(input.witness.nth(1).unwrap(), tss.btc_pubkey());
            // DER signature + sighash byte
            let sig = input.witness.nth(0).unwrap();
            assert_eq!(*sig.last().unwrap(), EcdsaSighashType::All as u8);
        }
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected() {
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let signer = BtcSigner::new(Network::Testnet, tss);
        let err = signer
            .build_signed_tx(&[utxo(0, 10_000)], &recipient(), 500_000, 3, 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient utxo value"));
    }

    #[tokio::test]
    async fn test_keeper_accepts_signed_outbound_body() {
        // The keeper-side tracker verification and the signer must agree on
        // the wire format: witness pubkey derives the TSS P2WPKH address
        // and output 0 carries the nonce mark.
        let tss = Arc::new(TestTssSigner::new_deterministic());
        let signer = BtcSigner::new(Network::Testnet, tss.clone());
        let tx = signer
            .build_signed_tx(&[utxo(0, 1_000_000)], &recipient(), 500_000, 7, 5)
            .await
            .unwrap();

        let keeper = test_keeper(&tss);
        let msg = MsgAddToOutTxTracker {
            creator: OPERATOR.to_string(),
            chain_id: BTC_TESTNET_CHAIN_ID,
            nonce: 7,
            tx_hash: tx.txid().to_string(),
            proof: None,
            block_hash: String::new(),
            tx_index: 0,
        };
        let tx_bytes = bitcoin::consensus::serialize(&tx);
        keeper.verify_out_tx_body(&msg, &tx_bytes).unwrap();

        // wrong nonce mark is rejected
        let bad = MsgAddToOutTxTracker { nonce: 8, ..msg };
        let err = keeper.verify_out_tx_body(&bad, &tx_bytes).unwrap_err();
        assert!(err.to_string().contains("nonce mark"));
    }
}
