use bip32::{DerivationPath, XPrv};
use chain_utxo::{ChainParams, Network};
use crypto_utils::SecretKeyBytes;
use k256::ecdsa::SigningKey;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::types::AssetType;

/// Key path of the Lightning node identity key.
pub const LIGHTNING_KEY_PATH: &str = "m/0'/0'/0'";

/// Derivation path for an asset:
///
/// - BTC: m/84'/0'/0'/0/0 (BIP-84, native SegWit P2WPKH)
/// - LTC: m/84'/2'/0'/0/0
/// - testnets use coin type 1
/// - Lightning: m/0'/0'/0'
pub fn derivation_path(asset: AssetType, network: Network) -> String {
    match asset.utxo_chain() {
        Some(chain) => {
            let coin_type = ChainParams::new(chain, network).coin_type();
            format!("m/84'/{coin_type}'/0'/0/0")
        }
        None => LIGHTNING_KEY_PATH.to_string(),
    }
}

/// Derive a secp256k1 private key from seed using BIP-32
pub fn derive_secp256k1_key(seed: &[u8], path_str: &str) -> Result<DerivedKey, WalletError> {
    let path: DerivationPath = path_str
        .parse()
        .map_err(|e: bip32::Error| WalletError::DerivationFailed(e.to_string()))?;

    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;

    let mut private_key: [u8; 32] = xprv.to_bytes().into();
    let derived = key_from_bytes(&private_key, Some(path_str.to_string()));
    private_key.zeroize();
    derived
}

/// Public key material for an existing raw private key.
pub fn key_from_secret(secret: &SecretKeyBytes) -> Result<DerivedKey, WalletError> {
    key_from_bytes(secret.as_bytes(), None)
}

fn key_from_bytes(
    private_key: &[u8; 32],
    derivation_path: Option<String>,
) -> Result<DerivedKey, WalletError> {
    let signing_key = SigningKey::from_bytes(&(*private_key).into())
        .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;

    let public_key_compressed: [u8; 33] = signing_key
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .try_into()
        .map_err(|_| WalletError::DerivationFailed("Invalid public key length".into()))?;

    Ok(DerivedKey {
        private_key: SecretKeyBytes::from_bytes(*private_key),
        public_key_compressed,
        derivation_path,
    })
}

/// Derived secp256k1 key. The private half is zeroed on drop.
pub struct DerivedKey {
    pub private_key: SecretKeyBytes,
    pub public_key_compressed: [u8; 33],
    /// `None` when the key was imported rather than derived.
    pub derivation_path: Option<String>,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("public_key_compressed", &hex::encode(self.public_key_compressed))
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::mnemonic_to_seed;

    // BIP-39 test vector: "abandon" x11 + "about"
    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_paths_per_asset() {
        assert_eq!(derivation_path(AssetType::Bitcoin, Network::Mainnet), "m/84'/0'/0'/0/0");
        assert_eq!(derivation_path(AssetType::Litecoin, Network::Mainnet), "m/84'/2'/0'/0/0");
        assert_eq!(derivation_path(AssetType::Bitcoin, Network::Testnet), "m/84'/1'/0'/0/0");
        assert_eq!(derivation_path(AssetType::Lightning, Network::Mainnet), "m/0'/0'/0'");
    }

    #[test]
    fn test_derive_btc_key_bip84_vector() {
        // BIP-84 test vector, first receive key of account 0.
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        let key = derive_secp256k1_key(&seed[..], "m/84'/0'/0'/0/0").unwrap();
        assert_eq!(
            hex::encode(key.public_key_compressed),
            "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
        );
    }

    #[test]
    fn test_derivation_deterministic() {
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        let key1 = derive_secp256k1_key(&seed[..], LIGHTNING_KEY_PATH).unwrap();
        let key2 = derive_secp256k1_key(&seed[..], LIGHTNING_KEY_PATH).unwrap();
        assert_eq!(key1.private_key.as_bytes(), key2.private_key.as_bytes());
        assert_eq!(key1.derivation_path.as_deref(), Some(LIGHTNING_KEY_PATH));
    }

    #[test]
    fn test_different_assets_different_keys() {
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        let btc = derive_secp256k1_key(&seed[..], &derivation_path(AssetType::Bitcoin, Network::Mainnet)).unwrap();
        let ltc = derive_secp256k1_key(&seed[..], &derivation_path(AssetType::Litecoin, Network::Mainnet)).unwrap();
        assert_ne!(btc.private_key.as_bytes(), ltc.private_key.as_bytes());
    }

    #[test]
    fn test_key_from_secret_matches_derivation() {
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        let derived = derive_secp256k1_key(&seed[..], "m/84'/0'/0'/0/0").unwrap();
        let imported = key_from_secret(&derived.private_key).unwrap();
        assert_eq!(imported.public_key_compressed, derived.public_key_compressed);
        assert!(imported.derivation_path.is_none());
    }

    #[test]
    fn test_zero_key_is_rejected() {
        let err = key_from_secret(&SecretKeyBytes::from_bytes([0u8; 32])).unwrap_err();
        assert!(matches!(err, WalletError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_bad_path_is_derivation_failure() {
        let seed = mnemonic_to_seed(TEST_MNEMONIC).unwrap();
        let err = derive_secp256k1_key(&seed[..], "not/a/path").unwrap_err();
        assert!(matches!(err, WalletError::DerivationFailed(_)));
    }
}
