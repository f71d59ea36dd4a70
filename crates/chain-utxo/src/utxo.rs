use serde::{Deserialize, Serialize};

use crate::error::UtxoError;
use crate::network::{ChainParams, DEFAULT_FIXED_FEE_SAT};

/// A single unspent transaction output (UTXO).
///
/// Fetched fresh from the chain data provider for every send and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in the chain's smallest unit.
    pub amount_sat: u64,
    /// The locking script (scriptPubKey). Empty until resolved from the
    /// funding transaction.
    #[serde(default, with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

/// How the fee of a send is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeePolicy {
    /// The chain's fixed default fee ([`DEFAULT_FIXED_FEE_SAT`]).
    #[default]
    ChainDefault,
    /// A fixed fee in smallest units, independent of transaction size.
    Fixed(u64),
    /// Size-based fee, re-estimated as each input is added.
    PerVbyte(u64),
}

impl FeePolicy {
    /// Fee for a transaction spending `num_inputs` inputs. Size-based
    /// estimates always assume two outputs (recipient + change).
    pub fn fee_for(&self, num_inputs: usize) -> u64 {
        match *self {
            FeePolicy::ChainDefault => DEFAULT_FIXED_FEE_SAT,
            FeePolicy::Fixed(fee) => fee,
            FeePolicy::PerVbyte(rate) => crate::transaction::estimate_fee(num_inputs, 2, rate),
        }
    }
}

/// Result of UTXO selection: the chosen UTXOs, their aggregate value and the
/// fee the selection was sized for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    /// The selected UTXOs, in provider order.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs.
    pub total_sat: u64,
    /// Fee to pay for this selection.
    pub fee_sat: u64,
}

impl UtxoSelection {
    /// `total - amount - fee`; zero means an exact spend with no change.
    pub fn change_sat(&self, amount_sat: u64) -> u64 {
        self.total_sat
            .saturating_sub(amount_sat)
            .saturating_sub(self.fee_sat)
    }
}

/// Select UTXOs to cover `amount_sat` plus fee.
///
/// First-fit accumulation: UTXOs are taken in the order the provider returned
/// them and selection stops at the first prefix whose total reaches
/// `amount + fee`. The result is therefore the shortest sufficient prefix and
/// is fully determined by the input order.
pub fn select_first_fit(
    utxos: &[Utxo],
    amount_sat: u64,
    fee_policy: FeePolicy,
    params: &ChainParams,
) -> Result<UtxoSelection, UtxoError> {
    let mut selected: Vec<Utxo> = Vec::new();
    let mut total_sat: u64 = 0;

    for utxo in utxos {
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.amount_sat);

        let fee_sat = fee_policy.fee_for(selected.len());
        if total_sat >= amount_sat.saturating_add(fee_sat) {
            tracing::debug!(
                chain = %params,
                inputs = selected.len(),
                total_sat,
                fee_sat,
                "selected utxos"
            );
            return Ok(UtxoSelection {
                selected,
                total_sat,
                fee_sat,
            });
        }
    }

    let fee_sat = fee_policy.fee_for(selected.len().max(1));
    Err(UtxoError::InsufficientFunds {
        available: total_sat,
        required: amount_sat.saturating_add(fee_sat),
    })
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
