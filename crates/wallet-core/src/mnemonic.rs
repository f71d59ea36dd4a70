use bip39::{Language, Mnemonic};
use crypto_utils::entropy::mnemonic_entropy;
use zeroize::{Zeroize, Zeroizing};

use crate::error::WalletError;

/// Generate a new 12-word BIP-39 mnemonic (128 bits of entropy)
pub fn generate_mnemonic() -> Result<String, WalletError> {
    let entropy = mnemonic_entropy();
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Validate a mnemonic phrase
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Whether an import secret looks like a phrase rather than a hex key.
pub fn looks_like_mnemonic(secret: &str) -> bool {
    secret.split_whitespace().count() > 1
}

/// Derive the 64-byte BIP-39 seed (empty passphrase). Zeroed on drop.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Zeroizing<[u8; 64]>, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

    let mut seed = mnemonic.to_seed("");
    let out = Zeroizing::new(seed);
    seed.zeroize();
    Ok(out)
}

/// Normalize whitespace and case so stored phrases compare equal.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
