use chain_ln::LightningError;
use chain_utxo::{ProviderError, UtxoError};
use crypto_utils::CryptoError;
use thiserror::Error;

use crate::types::AssetType;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: have {available}, need {required} (smallest units)")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Account already has a {0} wallet")]
    DuplicateWalletType(AssetType),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Channel creation failed after {attempts} attempt(s): {last_error}")]
    ChannelCreationFailed { attempts: usize, last_error: String },

    /// The node opened the channel but the account could not be updated.
    #[error("Channel {channel_id} was opened but could not be recorded: {reason}")]
    ChannelNotRecorded { channel_id: String, reason: String },

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered but refused or garbled the request.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Channel configuration not found: {0}")]
    ConfigurationNotFound(String),

    #[error("Channel creation already in progress for account {0}")]
    ChannelCreationInProgress(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Transaction build failed: {0}")]
    TransactionFailed(String),

    #[error("Account store: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CryptoError> for WalletError {
    fn from(e: CryptoError) -> Self {
        WalletError::InvalidPrivateKey(e.to_string())
    }
}

impl From<ProviderError> for WalletError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(msg) => WalletError::UpstreamUnavailable(msg),
            other => WalletError::Upstream(other.to_string()),
        }
    }
}

impl From<UtxoError> for WalletError {
    fn from(e: UtxoError) -> Self {
        match e {
            UtxoError::InvalidPrivateKey(msg) => WalletError::InvalidPrivateKey(msg),
            UtxoError::InvalidAmount(msg) => WalletError::InvalidAmount(msg),
            UtxoError::InvalidAddress { address, reason } => {
                WalletError::InvalidAddress(format!("{address}: {reason}"))
            }
            UtxoError::InsufficientFunds {
                available,
                required,
            } => WalletError::InsufficientFunds {
                available,
                required,
            },
            UtxoError::BroadcastFailed(msg) => WalletError::BroadcastFailed(msg),
            UtxoError::Provider(p) => p.into(),
            UtxoError::InvalidPublicKey(msg) => WalletError::DerivationFailed(msg),
            UtxoError::TransactionBuildError(msg) | UtxoError::SigningError(msg) => {
                WalletError::TransactionFailed(msg)
            }
        }
    }
}

impl From<LightningError> for WalletError {
    fn from(e: LightningError) -> Self {
        match e {
            LightningError::Unavailable(msg) => WalletError::UpstreamUnavailable(msg),
            LightningError::InvalidAmount(msg) => WalletError::InvalidAmount(msg),
            other => WalletError::Upstream(other.to_string()),
        }
    }
}
