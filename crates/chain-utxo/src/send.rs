use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::Transaction;
use crypto_utils::SecretKeyBytes;

use crate::address::address_to_script;
use crate::error::UtxoError;
use crate::network::ChainParams;
use crate::provider::ChainDataProvider;
use crate::transaction::{draft_transaction, sign_draft, UnsignedTransactionDraft};
use crate::utxo::{select_first_fit, FeePolicy, Utxo};

/// Everything needed to move funds out of one address.
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    /// Source address. Change returns here.
    pub from_address: &'a str,
    pub to_address: &'a str,
    /// Amount in smallest units. Must be positive.
    pub amount_sat: u64,
    /// Hex-encoded 32-byte private key controlling `from_address`.
    pub private_key_hex: &'a str,
    pub fee_policy: FeePolicy,
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    /// Transaction id as reported by the provider.
    pub txid: String,
    pub raw_tx_hex: String,
    pub draft: UnsignedTransactionDraft,
}

impl BroadcastReceipt {
    pub fn fee_sat(&self) -> u64 {
        self.draft.fee_sat
    }
}

/// Select inputs, sign and broadcast a payment.
///
/// Validation happens before any provider call. The provider's `broadcast`
/// is called at most once, and only after signing succeeded; a failed
/// broadcast is reported as [`UtxoError::BroadcastFailed`] and not retried.
pub async fn build_and_sign<P>(
    provider: &P,
    params: &ChainParams,
    request: &SendRequest<'_>,
) -> Result<BroadcastReceipt, UtxoError>
where
    P: ChainDataProvider + ?Sized,
{
    let key = parse_private_key(request.private_key_hex)?;
    if request.amount_sat == 0 {
        return Err(UtxoError::InvalidAmount(
            "amount must be greater than zero".into(),
        ));
    }
    address_to_script(request.from_address, params)?;
    address_to_script(request.to_address, params)?;

    let utxos = provider.utxos(request.from_address).await?;
    let mut selection =
        select_first_fit(&utxos, request.amount_sat, request.fee_policy, params)?;
    for utxo in selection.selected.iter_mut() {
        if utxo.script_pubkey.is_empty() {
            utxo.script_pubkey = resolve_script(provider, utxo).await?;
        }
    }

    let draft = draft_transaction(
        selection,
        request.to_address,
        request.amount_sat,
        request.from_address,
    );
    let signed = sign_draft(&draft, &key, params)?;
    let raw_tx_hex = serialize_hex(&signed);
    let computed_txid = signed.compute_txid().to_string();

    tracing::info!(
        chain = %params,
        inputs = draft.inputs.len(),
        outputs = draft.outputs.len(),
        fee_sat = draft.fee_sat,
        txid = %computed_txid,
        "broadcasting transaction"
    );

    let txid = provider
        .broadcast(&raw_tx_hex)
        .await
        .map_err(|e| UtxoError::BroadcastFailed(e.to_string()))?;

    if txid != computed_txid {
        tracing::warn!(
            chain = %params,
            reported = %txid,
            computed = %computed_txid,
            "provider reported a different txid"
        );
    }

    Ok(BroadcastReceipt {
        txid,
        raw_tx_hex,
        draft,
    })
}

/// Parse and range-check a hex private key.
pub fn parse_private_key(private_key_hex: &str) -> Result<SecretKeyBytes, UtxoError> {
    let key = SecretKeyBytes::from_hex(private_key_hex)
        .map_err(|e| UtxoError::InvalidPrivateKey(e.to_string()))?;
    bitcoin::secp256k1::SecretKey::from_slice(key.as_bytes())
        .map_err(|e| UtxoError::InvalidPrivateKey(e.to_string()))?;
    Ok(key)
}

async fn resolve_script<P>(provider: &P, utxo: &Utxo) -> Result<Vec<u8>, UtxoError>
where
    P: ChainDataProvider + ?Sized,
{
    let raw = provider.raw_tx(&utxo.txid).await?;
    let tx: Transaction = deserialize(&raw).map_err(|e| {
        UtxoError::TransactionBuildError(format!("funding tx {} does not decode: {e}", utxo.txid))
    })?;
    let output = tx.output.get(utxo.vout as usize).ok_or_else(|| {
        UtxoError::TransactionBuildError(format!(
            "funding tx {} has no output {}",
            utxo.txid, utxo.vout
        ))
    })?;
    Ok(output.script_pubkey.to_bytes())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, ScriptBuf, TxOut};

    use super::*;
    use crate::address::pubkey_to_p2wpkh_address;
    use crate::network::{Network, UtxoChain};
    use crate::provider::ProviderError;

    const PARAMS: ChainParams = ChainParams::new(UtxoChain::Bitcoin, Network::Testnet);
    const KEY_HEX: &str = "4242424242424242424242424242424242424242424242424242424242424242";
    const RECIPIENT: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    #[derive(Default)]
    struct MockProvider {
        utxos: Vec<Utxo>,
        raw_txs: HashMap<String, Vec<u8>>,
        fail_broadcast: bool,
        broadcasts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChainDataProvider for MockProvider {
        async fn utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
            Ok(self.utxos.clone())
        }

        async fn raw_tx(&self, txid: &str) -> Result<Vec<u8>, ProviderError> {
            self.raw_txs
                .get(txid)
                .cloned()
                .ok_or_else(|| ProviderError::Rejected {
                    status: 404,
                    body: "not found".into(),
                })
        }

        async fn balance(&self, _address: &str) -> Result<u64, ProviderError> {
            Ok(self.utxos.iter().map(|u| u.amount_sat).sum())
        }

        async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, ProviderError> {
            self.broadcasts.lock().unwrap().push(raw_tx_hex.to_string());
            if self.fail_broadcast {
                return Err(ProviderError::Rejected {
                    status: 400,
                    body: "min relay fee not met".into(),
                });
            }
            let tx: Transaction = deserialize(&hex::decode(raw_tx_hex).unwrap()).unwrap();
            Ok(tx.compute_txid().to_string())
        }
    }

    impl MockProvider {
        fn broadcast_count(&self) -> usize {
            self.broadcasts.lock().unwrap().len()
        }
    }

    fn own() -> (String, Vec<u8>) {
        let key = parse_private_key(KEY_HEX).unwrap();
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let sk = bitcoin::secp256k1::SecretKey::from_slice(key.as_bytes()).unwrap();
        let pk = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let script = ScriptBuf::new_p2wpkh(&bitcoin::CompressedPublicKey(pk).wpubkey_hash());
        (
            pubkey_to_p2wpkh_address(&pk.serialize(), &PARAMS).unwrap(),
            script.to_bytes(),
        )
    }

    fn utxo(tag: &str, amount_sat: u64, script: &[u8]) -> Utxo {
        Utxo {
            txid: tag.repeat(64),
            vout: 0,
            amount_sat,
            script_pubkey: script.to_vec(),
        }
    }

    fn request<'a>(from: &'a str, amount_sat: u64, key: &'a str) -> SendRequest<'a> {
        SendRequest {
            from_address: from,
            to_address: RECIPIENT,
            amount_sat,
            private_key_hex: key,
            fee_policy: FeePolicy::ChainDefault,
        }
    }

    #[tokio::test]
    async fn sends_with_change_and_broadcasts_once() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 30_000, &script), utxo("b", 80_000, &script)],
            ..Default::default()
        };

        let receipt = build_and_sign(&provider, &PARAMS, &request(&from, 100_000, KEY_HEX))
            .await
            .unwrap();

        assert_eq!(provider.broadcast_count(), 1);
        assert_eq!(receipt.draft.inputs.len(), 2);
        assert_eq!(receipt.draft.outputs[0].address, RECIPIENT);
        assert_eq!(receipt.draft.outputs[1].address, from);
        assert_eq!(receipt.draft.outputs[1].amount_sat, 9_000);
        assert_eq!(receipt.fee_sat(), 1_000);
        assert!(receipt.draft.is_balanced());
    }

    #[tokio::test]
    async fn exact_amount_has_no_change_output() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 51_000, &script)],
            ..Default::default()
        };
        let receipt = build_and_sign(&provider, &PARAMS, &request(&from, 50_000, KEY_HEX))
            .await
            .unwrap();
        assert_eq!(receipt.draft.outputs.len(), 1);
    }

    #[tokio::test]
    async fn insufficient_funds_never_broadcasts() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 10_000, &script)],
            ..Default::default()
        };
        let err = build_and_sign(&provider, &PARAMS, &request(&from, 50_000, KEY_HEX))
            .await
            .unwrap_err();
        assert!(matches!(err, UtxoError::InsufficientFunds { .. }));
        assert_eq!(provider.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn bad_key_fails_before_any_network_call() {
        let (from, _) = own();
        let provider = MockProvider::default();
        let err = build_and_sign(&provider, &PARAMS, &request(&from, 1_000, "not-hex"))
            .await
            .unwrap_err();
        assert!(matches!(err, UtxoError::InvalidPrivateKey(_)));

        let zero = "00".repeat(32);
        let err = build_and_sign(&provider, &PARAMS, &request(&from, 1_000, &zero))
            .await
            .unwrap_err();
        assert!(matches!(err, UtxoError::InvalidPrivateKey(_)));
        assert_eq!(provider.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let (from, _) = own();
        let provider = MockProvider::default();
        let err = build_and_sign(&provider, &PARAMS, &request(&from, 0, KEY_HEX))
            .await
            .unwrap_err();
        assert!(matches!(err, UtxoError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn broadcast_rejection_is_broadcast_failed() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 100_000, &script)],
            fail_broadcast: true,
            ..Default::default()
        };
        let err = build_and_sign(&provider, &PARAMS, &request(&from, 50_000, KEY_HEX))
            .await
            .unwrap_err();
        assert!(matches!(err, UtxoError::BroadcastFailed(_)));
        assert_eq!(provider.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn same_inputs_produce_same_transaction() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 70_000, &script), utxo("b", 70_000, &script)],
            ..Default::default()
        };
        let first = build_and_sign(&provider, &PARAMS, &request(&from, 90_000, KEY_HEX))
            .await
            .unwrap();
        let second = build_and_sign(&provider, &PARAMS, &request(&from, 90_000, KEY_HEX))
            .await
            .unwrap();
        assert_eq!(first.raw_tx_hex, second.raw_tx_hex);
        assert_eq!(first.txid, second.txid);
    }

    #[tokio::test]
    async fn unresolved_scripts_are_fetched_from_funding_tx() {
        let (from, script) = own();
        let funding = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![bitcoin::TxIn::default()],
            output: vec![
                TxOut {
                    value: Amount::from_sat(1),
                    script_pubkey: ScriptBuf::new(),
                },
                TxOut {
                    value: Amount::from_sat(60_000),
                    script_pubkey: ScriptBuf::from_bytes(script.clone()),
                },
            ],
        };
        let txid = "c".repeat(64);
        let mut raw_txs = HashMap::new();
        raw_txs.insert(txid.clone(), bitcoin::consensus::serialize(&funding));

        let provider = MockProvider {
            utxos: vec![Utxo {
                txid,
                vout: 1,
                amount_sat: 60_000,
                script_pubkey: Vec::new(),
            }],
            raw_txs,
            ..Default::default()
        };

        let receipt = build_and_sign(&provider, &PARAMS, &request(&from, 20_000, KEY_HEX))
            .await
            .unwrap();
        assert_eq!(receipt.draft.inputs[0].script_pubkey, script);
    }

    #[tokio::test]
    async fn recipient_on_wrong_chain_is_rejected() {
        let (from, script) = own();
        let provider = MockProvider {
            utxos: vec![utxo("a", 100_000, &script)],
            ..Default::default()
        };
        let mut req = request(&from, 10_000, KEY_HEX);
        req.to_address = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let err = build_and_sign(&provider, &PARAMS, &req).await.unwrap_err();
        assert!(matches!(err, UtxoError::InvalidAddress { .. }));
        assert_eq!(provider.broadcast_count(), 0);
    }
}
