use bitcoin::Amount;
use chain_ln::{ChannelState, OpenedChannel};
use chain_utxo::UtxoChain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WalletError;

/// Smallest units per display unit. 1 BTC = 1 LTC = 1e8; Lightning amounts
/// are satoshis and display in BTC.
pub const SMALLEST_UNITS_PER_COIN: u64 = 100_000_000;

/// Assets a wallet can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Bitcoin,
    Litecoin,
    Lightning,
}

impl AssetType {
    pub const ALL: [AssetType; 3] = [AssetType::Bitcoin, AssetType::Litecoin, AssetType::Lightning];

    /// The UTXO chain backing this asset, if it is one.
    pub fn utxo_chain(&self) -> Option<UtxoChain> {
        match self {
            AssetType::Bitcoin => Some(UtxoChain::Bitcoin),
            AssetType::Litecoin => Some(UtxoChain::Litecoin),
            AssetType::Lightning => None,
        }
    }

    /// Symbol of the display unit.
    pub fn display_symbol(&self) -> &'static str {
        match self {
            AssetType::Bitcoin | AssetType::Lightning => "BTC",
            AssetType::Litecoin => "LTC",
        }
    }

    /// Convert smallest units into the display unit.
    pub fn to_display(&self, smallest: u64) -> f64 {
        Amount::from_sat(smallest).to_btc()
    }

    /// Convert a display amount back into smallest units.
    ///
    /// Rejects negative, non-finite and sub-unit-precision values.
    pub fn from_display(&self, display: f64) -> Result<u64, WalletError> {
        if !display.is_finite() {
            return Err(WalletError::InvalidAmount(format!(
                "{display} is not a finite amount"
            )));
        }
        Amount::from_btc(display)
            .map(|a| a.to_sat())
            .map_err(|e| WalletError::InvalidAmount(format!("{display} {}: {e}", self.display_symbol())))
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Bitcoin => write!(f, "bitcoin"),
            AssetType::Litecoin => write!(f, "litecoin"),
            AssetType::Lightning => write!(f, "lightning"),
        }
    }
}

/// A custodial wallet owned by one account.
#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub asset: AssetType,
    /// Chain address for UTXO assets; node wallet id for Lightning.
    pub address: String,
    /// Compressed secp256k1 public key, hex.
    pub public_key: String,
    /// 32-byte private key, hex.
    pub private_key: String,
    pub mnemonic: Option<String>,
    /// Last fetched balance in smallest units.
    pub balance: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "[REDACTED]"))
            .field("balance", &self.balance)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Saved channel parameters, independent of any creation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    pub id: Uuid,
    pub name: String,
    pub node_uri: String,
    pub amount_sat: u64,
    pub is_favorite: bool,
}

/// Partial update of a [`ChannelConfiguration`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfigurationUpdate {
    pub name: Option<String>,
    pub node_uri: Option<String>,
    pub amount_sat: Option<u64>,
    pub is_favorite: Option<bool>,
}

/// The latest channel-open run of an account, persisted after every step so
/// callers can poll it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreationRun {
    pub state: ChannelState,
    /// One of 0, 33, 66, 100 or -1.
    pub progress: i8,
    pub attempted_nodes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ChannelCreationRun {
    pub fn new() -> Self {
        let state = ChannelState::Idle;
        Self {
            progress: state.progress(),
            state,
            attempted_nodes: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn result_channel(&self) -> Option<&OpenedChannel> {
        match &self.state {
            ChannelState::Active { channel, .. } => Some(channel),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for ChannelCreationRun {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

/// One append-only ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub direction: Direction,
    /// Amount in the asset's display unit.
    pub amount: f64,
    pub counterparty: String,
    pub timestamp: DateTime<Utc>,
    pub status: EntryStatus,
    pub asset: AssetType,
    /// Transaction id (UTXO assets) or payment hash (Lightning).
    pub reference: String,
}

/// Everything stored for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub wallets: Vec<Wallet>,
    pub channel_configurations: Vec<ChannelConfiguration>,
    pub channel_run: Option<ChannelCreationRun>,
    /// Channels opened through this account and not closed since.
    pub open_channels: Vec<OpenedChannel>,
    pub ledger: Vec<LedgerEntry>,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            wallets: Vec::new(),
            channel_configurations: Vec::new(),
            channel_run: None,
            open_channels: Vec::new(),
            ledger: Vec::new(),
        }
    }

    pub fn wallet(&self, wallet_id: Uuid) -> Result<&Wallet, WalletError> {
        self.wallets
            .iter()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))
    }

    pub fn wallet_mut(&mut self, wallet_id: Uuid) -> Result<&mut Wallet, WalletError> {
        self.wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))
    }

    pub fn active_wallet(&self, asset: AssetType) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.asset == asset && w.is_active)
    }

    pub fn has_wallet_of(&self, asset: AssetType) -> bool {
        self.wallets.iter().any(|w| w.asset == asset)
    }
}
