use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Length of a secp256k1 private key in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// A raw 32-byte private key, zeroed when dropped.
///
/// Wallet records carry private keys as lowercase hex strings. Every signing
/// path goes through [`SecretKeyBytes::from_hex`] first so that a malformed
/// key is rejected before any network call is made.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyBytes([u8; SECRET_KEY_LEN]);

impl SecretKeyBytes {
    /// Parse a hex-encoded private key. The string must decode to exactly
    /// 32 bytes; surrounding whitespace is ignored.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let trimmed = hex_key.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::InvalidInput("private key is empty".into()));
        }

        let decoded = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidHex(e.to_string()))?,
        );
        if decoded.len() != SECRET_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_LEN,
                actual: decoded.len(),
            });
        }

        let mut bytes = [0u8; SECRET_KEY_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Wrap key bytes that were produced by HD derivation.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex encoding, wrapped so the copy is zeroed on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }
}

impl fmt::Debug for SecretKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyBytes(<redacted>)")
    }
}
