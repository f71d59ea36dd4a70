use thiserror::Error;

use crate::provider::ProviderError;

/// UTXO chain operation errors.
#[derive(Debug, Error)]
pub enum UtxoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("chain data provider: {0}")]
    Provider(#[from] ProviderError),
}

impl UtxoError {
    pub(crate) fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        UtxoError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}
