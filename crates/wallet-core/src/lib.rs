//! Custodial multi-asset wallet engine.
//!
//! [`WalletEngine`] ties together the account store, the wallet adapter for
//! Bitcoin, Litecoin and Lightning wallets, the Lightning channel manager and
//! the transaction ledger. Chain data providers and the Lightning API are
//! injected as trait objects and wrapped with timeouts and retries.

pub mod address;
pub mod channels;
pub mod config;
pub mod error;
pub mod hd_derivation;
pub mod ledger;
pub mod logging;
pub mod mnemonic;
pub mod retry;
pub mod store;
pub mod types;
pub mod wallets;

use std::sync::Arc;

use chain_ln::{ClosedChannel, HttpLightningClient, Invoice, LightningApi};
use chain_utxo::{ChainDataProvider, EsploraClient};
use uuid::Uuid;

pub use channels::ChannelRequest;
pub use config::EngineConfig;
pub use error::WalletError;
pub use types::{
    AssetType, ChannelConfiguration, ChannelConfigurationUpdate, ChannelCreationRun, LedgerEntry,
    Wallet,
};
pub use wallets::{Balance, WalletBackup, WalletInfo};

use channels::ChannelManager;
use ledger::Ledger;
use retry::{RetryingChainProvider, RetryingLightningApi};
use store::{AccountStore, Accounts, InMemoryAccountStore};
use wallets::{AdapterParts, WalletAdapter};

/// External systems the engine talks to.
pub struct Collaborators {
    pub store: Arc<dyn AccountStore>,
    pub bitcoin: Arc<dyn ChainDataProvider>,
    pub litecoin: Arc<dyn ChainDataProvider>,
    pub lightning: Arc<dyn LightningApi>,
}

impl Collaborators {
    /// Esplora and HTTP Lightning clients from configuration, with an
    /// in-memory account store.
    pub fn from_config(config: &EngineConfig) -> Result<Self, WalletError> {
        let bitcoin = EsploraClient::new(&config.bitcoin_esplora_url, config.request_timeout)?;
        let litecoin = EsploraClient::new(&config.litecoin_esplora_url, config.request_timeout)?;
        let lightning = HttpLightningClient::new(
            &config.lightning_api_url,
            config.lightning_api_key.as_deref(),
            config.request_timeout,
        )?;
        Ok(Self {
            store: Arc::new(InMemoryAccountStore::new()),
            bitcoin: Arc::new(bitcoin),
            litecoin: Arc::new(litecoin),
            lightning: Arc::new(lightning),
        })
    }
}

pub struct WalletEngine {
    accounts: Arc<Accounts>,
    ledger: Arc<Ledger>,
    wallets: WalletAdapter,
    channels: ChannelManager,
}

impl WalletEngine {
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let policy = config.retry_policy();
        let bitcoin: Arc<dyn ChainDataProvider> =
            Arc::new(RetryingChainProvider::new(collaborators.bitcoin, policy));
        let litecoin: Arc<dyn ChainDataProvider> =
            Arc::new(RetryingChainProvider::new(collaborators.litecoin, policy));
        let lightning: Arc<dyn LightningApi> =
            Arc::new(RetryingLightningApi::new(collaborators.lightning, policy));

        let accounts = Arc::new(Accounts::new(collaborators.store));
        let ledger = Arc::new(Ledger::new(accounts.clone()));
        let wallets = WalletAdapter::new(
            accounts.clone(),
            ledger.clone(),
            AdapterParts {
                bitcoin,
                litecoin,
                lightning: lightning.clone(),
                network: config.network,
                bitcoin_fee: config.fee_policy(AssetType::Bitcoin),
                litecoin_fee: config.fee_policy(AssetType::Litecoin),
            },
        );
        let channels = ChannelManager::new(accounts.clone(), lightning, config.candidate_nodes.clone());

        tracing::info!(network = %config.network, candidates = config.candidate_nodes.len(), "wallet engine ready");
        Self {
            accounts,
            ledger,
            wallets,
            channels,
        }
    }

    /// Engine with real HTTP collaborators, configured from the environment.
    pub fn from_env() -> Result<Self, WalletError> {
        let config = EngineConfig::from_env();
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(&config, collaborators))
    }

    pub async fn open_account(&self, account_id: &str) -> Result<(), WalletError> {
        self.accounts.open(account_id).await.map(|_| ())
    }

    // ─── Wallets ─────────────────────────────────────────────────────

    pub async fn create_wallet(&self, account_id: &str, asset: AssetType) -> Result<Wallet, WalletError> {
        self.wallets.create_wallet(account_id, asset).await
    }

    pub async fn import_wallet(
        &self,
        account_id: &str,
        asset: AssetType,
        mnemonic_or_key: &str,
    ) -> Result<Wallet, WalletError> {
        self.wallets.import_wallet(account_id, asset, mnemonic_or_key).await
    }

    pub async fn get_balance(&self, account_id: &str, wallet_id: Uuid) -> Result<Balance, WalletError> {
        self.wallets.balance(account_id, wallet_id).await
    }

    pub async fn wallet_info(&self, account_id: &str) -> Result<WalletInfo, WalletError> {
        self.wallets.wallet_info(account_id).await
    }

    /// Send `amount_sat` smallest units to an address (UTXO wallets) or pay a
    /// payment request (Lightning).
    pub async fn send(
        &self,
        account_id: &str,
        wallet_id: Uuid,
        destination: &str,
        amount_sat: u64,
    ) -> Result<LedgerEntry, WalletError> {
        self.wallets.send(account_id, wallet_id, destination, amount_sat).await
    }

    pub async fn remove_wallet(&self, account_id: &str, wallet_id: Uuid) -> Result<(), WalletError> {
        self.wallets.remove_wallet(account_id, wallet_id).await
    }

    pub async fn set_active_wallet(&self, account_id: &str, wallet_id: Uuid) -> Result<(), WalletError> {
        self.wallets.set_active_wallet(account_id, wallet_id).await
    }

    pub async fn backup(&self, account_id: &str) -> Result<WalletBackup, WalletError> {
        self.wallets.backup(account_id).await
    }

    pub async fn restore(&self, account_id: &str, backup: WalletBackup) -> Result<usize, WalletError> {
        self.wallets.restore(account_id, backup).await
    }

    pub fn validate_address(&self, asset: AssetType, address: &str) -> Result<bool, WalletError> {
        self.wallets.validate_address(asset, address)
    }

    // ─── Lightning ───────────────────────────────────────────────────

    pub async fn create_invoice(
        &self,
        account_id: &str,
        amount_sat: u64,
        memo: &str,
    ) -> Result<Invoice, WalletError> {
        self.wallets.create_invoice(account_id, amount_sat, memo).await
    }

    pub async fn create_channel(
        &self,
        account_id: &str,
        request: ChannelRequest,
    ) -> Result<ChannelConfiguration, WalletError> {
        self.channels.create_channel(account_id, request).await
    }

    pub async fn channel_progress(&self, account_id: &str) -> Result<i8, WalletError> {
        self.channels.progress(account_id).await
    }

    pub async fn channel_run(&self, account_id: &str) -> Result<Option<ChannelCreationRun>, WalletError> {
        self.channels.run(account_id).await
    }

    pub async fn close_channel(
        &self,
        account_id: &str,
        channel_id: &str,
    ) -> Result<ClosedChannel, WalletError> {
        self.channels.close_channel(account_id, channel_id).await
    }

    pub async fn channel_configurations(
        &self,
        account_id: &str,
    ) -> Result<Vec<ChannelConfiguration>, WalletError> {
        self.channels.configurations(account_id).await
    }

    pub async fn update_channel_configuration(
        &self,
        account_id: &str,
        config_id: Uuid,
        update: ChannelConfigurationUpdate,
    ) -> Result<ChannelConfiguration, WalletError> {
        self.channels.update_configuration(account_id, config_id, update).await
    }

    pub async fn delete_channel_configuration(
        &self,
        account_id: &str,
        config_id: Uuid,
    ) -> Result<(), WalletError> {
        self.channels.delete_configuration(account_id, config_id).await
    }

    // ─── Ledger ──────────────────────────────────────────────────────

    /// Ledger entries newest first, optionally for one asset.
    pub async fn history(
        &self,
        account_id: &str,
        asset: Option<AssetType>,
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        self.ledger.history(account_id, asset).await
    }

    /// Record a transfer observed outside the engine (e.g. an incoming
    /// payment).
    pub async fn record(
        &self,
        account_id: &str,
        transfer: ledger::Transfer,
    ) -> Result<LedgerEntry, WalletError> {
        self.ledger.record(account_id, transfer).await
    }
}
