//! UTXO chain support (Bitcoin and Litecoin) for the custodial wallet engine.
//!
//! Provides P2WPKH address derivation, first-fit coin selection, transaction
//! drafting and signing, the chain data provider seam with an Esplora HTTP
//! client, and the `build_and_sign` send pipeline.

pub mod address;
pub mod error;
pub mod network;
pub mod provider;
pub mod send;
pub mod transaction;
pub mod utxo;

pub use error::UtxoError;
pub use network::{ChainParams, Network, UtxoChain};
pub use provider::{ChainDataProvider, EsploraClient, ProviderError};
pub use send::{build_and_sign, BroadcastReceipt, SendRequest};
pub use transaction::{DraftOutput, UnsignedTransactionDraft};
pub use utxo::{FeePolicy, Utxo, UtxoSelection};
