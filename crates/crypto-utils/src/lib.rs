//! # crypto-utils
//!
//! Private key parsing, secret memory hygiene, and secure entropy for the
//! custodial wallet engine.

pub mod entropy;
pub mod error;
pub mod secret_key;

pub use error::CryptoError;
pub use secret_key::SecretKeyBytes;
