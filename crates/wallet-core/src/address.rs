use chain_utxo::address::pubkey_to_p2wpkh_address;
use chain_utxo::{ChainParams, Network};
use crypto_utils::SecretKeyBytes;

use crate::error::WalletError;
use crate::hd_derivation::{self, DerivedKey};
use crate::mnemonic;
use crate::types::AssetType;

/// Key material for a new or imported wallet.
pub struct KeyMaterial {
    pub asset: AssetType,
    pub key: DerivedKey,
    /// Normalized phrase, when the wallet was created from one.
    pub mnemonic: Option<String>,
    /// Chain address for UTXO assets. Lightning wallets get their identifier
    /// from the node API when registered.
    pub address: Option<String>,
}

impl KeyMaterial {
    pub fn private_key_hex(&self) -> String {
        self.key.private_key.to_hex().to_string()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.public_key_compressed)
    }
}

/// Chain parameters of a UTXO asset, `None` for Lightning.
pub fn chain_params(asset: AssetType, network: Network) -> Option<ChainParams> {
    asset
        .utxo_chain()
        .map(|chain| ChainParams::new(chain, network))
}

/// Derive wallet keys from a BIP-39 phrase along the asset's path.
pub fn from_mnemonic(
    phrase: &str,
    asset: AssetType,
    network: Network,
) -> Result<KeyMaterial, WalletError> {
    let phrase = mnemonic::normalize_phrase(phrase);
    let seed = mnemonic::mnemonic_to_seed(&phrase)?;
    let path = hd_derivation::derivation_path(asset, network);
    let key = hd_derivation::derive_secp256k1_key(&seed[..], &path)?;
    finish(asset, network, key, Some(phrase))
}

/// Wallet keys for a raw hex private key.
pub fn from_private_key(
    private_key_hex: &str,
    asset: AssetType,
    network: Network,
) -> Result<KeyMaterial, WalletError> {
    let secret = SecretKeyBytes::from_hex(private_key_hex)?;
    let key = hd_derivation::key_from_secret(&secret)?;
    finish(asset, network, key, None)
}

/// Accept either a phrase or a hex key.
pub fn from_import_secret(
    secret: &str,
    asset: AssetType,
    network: Network,
) -> Result<KeyMaterial, WalletError> {
    if mnemonic::looks_like_mnemonic(secret) {
        let phrase = mnemonic::normalize_phrase(secret);
        if !mnemonic::validate_mnemonic(&phrase) {
            let words = phrase.split_whitespace().count();
            return Err(WalletError::InvalidMnemonic(format!(
                "{words}-word phrase is not a valid BIP-39 English mnemonic"
            )));
        }
        from_mnemonic(&phrase, asset, network)
    } else {
        from_private_key(secret, asset, network)
    }
}

fn finish(
    asset: AssetType,
    network: Network,
    key: DerivedKey,
    mnemonic: Option<String>,
) -> Result<KeyMaterial, WalletError> {
    let address = match chain_params(asset, network) {
        Some(params) => Some(pubkey_to_p2wpkh_address(&key.public_key_compressed, &params)?),
        None => None,
    };
    Ok(KeyMaterial {
        asset,
        key,
        mnemonic,
        address,
    })
}

/// Validate an address for a UTXO asset. Lightning has no addresses and
/// always reports `false`.
pub fn validate_address(
    address: &str,
    asset: AssetType,
    network: Network,
) -> Result<bool, WalletError> {
    match chain_params(asset, network) {
        Some(params) => chain_utxo::address::validate_address(address, &params)
            .map_err(|e| WalletError::InvalidAddress(e.to_string())),
        None => Ok(false),
    }
}
