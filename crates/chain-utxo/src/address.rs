use bitcoin::bech32::{segwit, Hrp};
use bitcoin::hashes::Hash;
use bitcoin::{
    CompressedPublicKey, PubkeyHash, ScriptBuf, ScriptHash, WitnessProgram, WitnessVersion,
};

use crate::error::UtxoError;
use crate::network::ChainParams;

/// An address decoded without reference to any particular chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodedAddress {
    Segwit {
        hrp: String,
        version: WitnessVersion,
        program: Vec<u8>,
    },
    Base58 {
        version: u8,
        hash: [u8; 20],
    },
}

impl DecodedAddress {
    fn parse(address: &str) -> Result<Self, UtxoError> {
        // bech32 strings always contain the '1' separator and are single-case;
        // base58 alphabets never contain '0', 'O', 'I' or 'l' so the two
        // attempts cannot both succeed.
        if let Ok((hrp, version, program)) = segwit::decode(address) {
            let version = WitnessVersion::try_from(version)
                .map_err(|e| UtxoError::invalid_address(address, e.to_string()))?;
            return Ok(DecodedAddress::Segwit {
                hrp: hrp.to_lowercase(),
                version,
                program,
            });
        }

        let payload = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|e| UtxoError::invalid_address(address, e.to_string()))?;
        if payload.len() != 21 {
            return Err(UtxoError::invalid_address(
                address,
                format!("base58 payload is {} bytes, expected 21", payload.len()),
            ));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(DecodedAddress::Base58 {
            version: payload[0],
            hash,
        })
    }

    fn belongs_to(&self, params: &ChainParams) -> bool {
        match self {
            DecodedAddress::Segwit { hrp, .. } => hrp == params.bech32_hrp(),
            DecodedAddress::Base58 { version, .. } => {
                *version == params.p2pkh_version() || params.p2sh_versions().contains(version)
            }
        }
    }
}

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// Takes a 33-byte compressed secp256k1 public key and returns `bc1...` /
/// `tb1...` for Bitcoin or `ltc1...` / `tltc1...` for Litecoin.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    params: &ChainParams,
) -> Result<String, UtxoError> {
    let compressed_pk = CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        UtxoError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;
    let program = compressed_pk.wpubkey_hash().to_byte_array();

    let hrp = Hrp::parse(params.bech32_hrp())
        .map_err(|e| UtxoError::InvalidPublicKey(format!("bad hrp for {params}: {e}")))?;
    segwit::encode_v0(hrp, &program)
        .map_err(|e| UtxoError::InvalidPublicKey(format!("bech32 encoding failed: {e}")))
}

/// Resolve an address string to the locking script it pays to, rejecting
/// addresses that belong to another chain or network.
///
/// Supports P2PKH, P2SH, P2WPKH, P2WSH and P2TR encodings.
pub fn address_to_script(address: &str, params: &ChainParams) -> Result<ScriptBuf, UtxoError> {
    let decoded = DecodedAddress::parse(address)?;
    if !decoded.belongs_to(params) {
        return Err(UtxoError::invalid_address(
            address,
            format!("address is not valid for {params}"),
        ));
    }

    match decoded {
        DecodedAddress::Segwit {
            version, program, ..
        } => {
            let program = WitnessProgram::new(version, &program)
                .map_err(|e| UtxoError::invalid_address(address, e.to_string()))?;
            Ok(ScriptBuf::new_witness_program(&program))
        }
        DecodedAddress::Base58 { version, hash } if version == params.p2pkh_version() => {
            Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
        }
        DecodedAddress::Base58 { hash, .. } => {
            Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
        }
    }
}

/// Validate an address string for the given chain and network.
///
/// Returns `true` if the address is valid for `params`, `false` if it decodes
/// but belongs to a different chain or network, and an error if it does not
/// decode at all.
pub fn validate_address(address: &str, params: &ChainParams) -> Result<bool, UtxoError> {
    let decoded = DecodedAddress::parse(address)?;
    Ok(decoded.belongs_to(params))
}
