use thiserror::Error;

/// Key material errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_hex() {
        let err = CryptoError::InvalidHex("odd number of digits".into());
        assert_eq!(err.to_string(), "invalid hex: odd number of digits");
    }

    #[test]
    fn display_invalid_key_length() {
        let err = CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 31,
        };
        assert_eq!(
            err.to_string(),
            "invalid key length: expected 32 bytes, got 31"
        );
    }

    #[test]
    fn display_invalid_input() {
        let err = CryptoError::InvalidInput("empty key".into());
        assert_eq!(err.to_string(), "invalid input: empty key");
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> = Box::new(CryptoError::InvalidHex("zz".into()));
        assert!(err.to_string().contains("zz"));
    }
}
