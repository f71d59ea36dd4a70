use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, CompressedPublicKey, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use crypto_utils::SecretKeyBytes;

use crate::address::address_to_script;
use crate::error::UtxoError;
use crate::network::ChainParams;
use crate::utxo::{Utxo, UtxoSelection};

/// Estimated virtual size of a P2WPKH input (in vbytes).
/// Breakdown: 41 bytes non-witness + ~27 witness bytes / 4 = ~68 vbytes per input.
const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Estimated virtual size of any output (in vbytes).
const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (in vbytes): version + locktime + segwit marker/flag + counts.
const TX_OVERHEAD_VBYTES: u64 = 11;

/// Estimate the fee for a P2WPKH transaction at `fee_rate_sat_vbyte`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate_sat_vbyte: u64) -> u64 {
    let vsize = TX_OVERHEAD_VBYTES
        + (num_inputs as u64 * P2WPKH_INPUT_VBYTES)
        + (num_outputs as u64 * OUTPUT_VBYTES);
    vsize * fee_rate_sat_vbyte
}

/// One payment output of a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutput {
    pub address: String,
    pub amount_sat: u64,
}

/// A transaction whose inputs and outputs are fixed but which is not signed
/// yet.
///
/// Outputs are ordered: the recipient first, then at most one change output
/// back to the sender, present only when the selection has a surplus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransactionDraft {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<DraftOutput>,
    pub fee_sat: u64,
}

impl UnsignedTransactionDraft {
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().map(|u| u.amount_sat).sum()
    }

    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount_sat).sum()
    }

    pub fn has_change(&self) -> bool {
        self.outputs.len() > 1
    }

    /// `inputs == outputs + fee`.
    pub fn is_balanced(&self) -> bool {
        self.input_total() == self.output_total() + self.fee_sat
    }
}

/// Lay out the outputs for a selection: recipient first, change to
/// `change_address` last and only when the surplus is non-zero. No dust floor
/// is applied, so a one-sat surplus still produces a change output.
pub fn draft_transaction(
    selection: UtxoSelection,
    to_address: &str,
    amount_sat: u64,
    change_address: &str,
) -> UnsignedTransactionDraft {
    let change_sat = selection.change_sat(amount_sat);

    let mut outputs = vec![DraftOutput {
        address: to_address.to_string(),
        amount_sat,
    }];
    if change_sat > 0 {
        outputs.push(DraftOutput {
            address: change_address.to_string(),
            amount_sat: change_sat,
        });
    }

    UnsignedTransactionDraft {
        inputs: selection.selected,
        outputs,
        fee_sat: selection.fee_sat,
    }
}

/// Sign a draft whose inputs are all P2WPKH outputs of `private_key`.
///
/// Returns the fully witnessed transaction ready for broadcast. An input whose
/// script is known and does not pay to the signing key is rejected rather than
/// producing an invalid signature.
pub fn sign_draft(
    draft: &UnsignedTransactionDraft,
    private_key: &SecretKeyBytes,
    params: &ChainParams,
) -> Result<Transaction, UtxoError> {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(private_key.as_bytes())
        .map_err(|e| UtxoError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
    let public_key = bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
    let compressed_pk = CompressedPublicKey(public_key);
    let own_script = ScriptBuf::new_p2wpkh(&compressed_pk.wpubkey_hash());

    let mut inputs = Vec::with_capacity(draft.inputs.len());
    let mut prevouts = Vec::with_capacity(draft.inputs.len());
    for (index, utxo) in draft.inputs.iter().enumerate() {
        let txid: Txid = utxo
            .txid
            .parse()
            .map_err(|e| UtxoError::TransactionBuildError(format!("invalid txid: {e}")))?;

        if !utxo.script_pubkey.is_empty() && utxo.script_pubkey != own_script.as_bytes() {
            return Err(UtxoError::SigningError(format!(
                "input {index} ({}:{}) is not locked to the signing key",
                utxo.txid, utxo.vout
            )));
        }

        inputs.push(TxIn {
            previous_output: OutPoint::new(txid, utxo.vout),
            script_sig: ScriptBuf::new(), // Empty for segwit.
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
        prevouts.push(TxOut {
            value: Amount::from_sat(utxo.amount_sat),
            script_pubkey: own_script.clone(),
        });
    }

    let outputs = draft
        .outputs
        .iter()
        .map(|out| {
            Ok(TxOut {
                value: Amount::from_sat(out.amount_sat),
                script_pubkey: address_to_script(&out.address, params)?,
            })
        })
        .collect::<Result<Vec<_>, UtxoError>>()?;

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let mut witnesses = Vec::with_capacity(unsigned_tx.input.len());
    let mut sighash_cache = SighashCache::new(&unsigned_tx);
    for (input_index, prevout) in prevouts.iter().enumerate() {
        let sighash = sighash_cache
            .p2wpkh_signature_hash(
                input_index,
                &prevout.script_pubkey,
                prevout.value,
                EcdsaSighashType::All,
            )
            .map_err(|e| UtxoError::SigningError(format!("sighash computation failed: {e}")))?;

        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = secp.sign_ecdsa(&msg, &secret_key);

        // Serialize signature in DER + sighash type byte.
        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(EcdsaSighashType::All as u8);

        // Build witness: [signature, pubkey].
        let mut witness = Witness::new();
        witness.push(&sig_bytes);
        witness.push(public_key.serialize());
        witnesses.push(witness);
    }

    let mut signed_tx = unsigned_tx.clone();
    for (input, witness) in signed_tx.input.iter_mut().zip(witnesses) {
        input.witness = witness;
    }

    Ok(signed_tx)
}
