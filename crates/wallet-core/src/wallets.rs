//! Uniform wallet operations across Bitcoin, Litecoin and Lightning.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chain_ln::{Invoice, LightningApi};
use chain_utxo::{build_and_sign, ChainDataProvider, ChainParams, FeePolicy, Network, SendRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{self, KeyMaterial};
use crate::error::WalletError;
use crate::ledger::{Ledger, Transfer};
use crate::mnemonic;
use crate::store::{Accounts, KeyedLocks};
use crate::types::{AssetType, Direction, LedgerEntry, Wallet};

/// Result of a successful send, before it is written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Transaction id or payment hash.
    pub reference: String,
    pub amount_sat: u64,
    pub fee_sat: u64,
    pub counterparty: String,
}

/// What every wallet variant can do.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    fn address(&self) -> &str;

    /// Live balance in smallest units.
    async fn balance(&self) -> Result<u64, WalletError>;

    /// Pay `amount_sat` to `destination`: a chain address for UTXO wallets,
    /// a payment request for Lightning.
    async fn send(&self, destination: &str, amount_sat: u64) -> Result<SendOutcome, WalletError>;
}

pub struct UtxoWallet {
    wallet: Wallet,
    params: ChainParams,
    provider: Arc<dyn ChainDataProvider>,
    fee_policy: FeePolicy,
}

#[async_trait]
impl WalletCapability for UtxoWallet {
    fn address(&self) -> &str {
        &self.wallet.address
    }

    async fn balance(&self) -> Result<u64, WalletError> {
        Ok(self.provider.balance(&self.wallet.address).await?)
    }

    async fn send(&self, destination: &str, amount_sat: u64) -> Result<SendOutcome, WalletError> {
        let request = SendRequest {
            from_address: &self.wallet.address,
            to_address: destination,
            amount_sat,
            private_key_hex: &self.wallet.private_key,
            fee_policy: self.fee_policy,
        };
        let receipt = build_and_sign(self.provider.as_ref(), &self.params, &request).await?;
        Ok(SendOutcome {
            fee_sat: receipt.fee_sat(),
            reference: receipt.txid,
            amount_sat,
            counterparty: destination.to_string(),
        })
    }
}

pub struct LightningWallet {
    wallet: Wallet,
    api: Arc<dyn LightningApi>,
}

#[async_trait]
impl WalletCapability for LightningWallet {
    fn address(&self) -> &str {
        &self.wallet.address
    }

    async fn balance(&self) -> Result<u64, WalletError> {
        Ok(self.api.channel_balance(&self.wallet.address).await?)
    }

    async fn send(&self, destination: &str, amount_sat: u64) -> Result<SendOutcome, WalletError> {
        crypto_utils::SecretKeyBytes::from_hex(&self.wallet.private_key)?;
        if amount_sat == 0 {
            return Err(WalletError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        let payment = self.api.pay_invoice(&self.wallet.address, destination).await?;
        if payment.status.eq_ignore_ascii_case("failed") {
            return Err(WalletError::Upstream(format!("payment {} failed", payment.id)));
        }
        Ok(SendOutcome {
            reference: payment.payment_hash.unwrap_or(payment.id),
            amount_sat: if payment.amount_sat > 0 {
                payment.amount_sat
            } else {
                amount_sat
            },
            fee_sat: 0,
            counterparty: destination.to_string(),
        })
    }
}

/// A stored wallet bound to the collaborator that serves its asset.
pub enum AssetWallet {
    Bitcoin(UtxoWallet),
    Litecoin(UtxoWallet),
    Lightning(LightningWallet),
}

impl AssetWallet {
    fn inner(&self) -> &dyn WalletCapability {
        match self {
            AssetWallet::Bitcoin(w) | AssetWallet::Litecoin(w) => w,
            AssetWallet::Lightning(w) => w,
        }
    }
}

#[async_trait]
impl WalletCapability for AssetWallet {
    fn address(&self) -> &str {
        self.inner().address()
    }

    async fn balance(&self) -> Result<u64, WalletError> {
        self.inner().balance().await
    }

    async fn send(&self, destination: &str, amount_sat: u64) -> Result<SendOutcome, WalletError> {
        self.inner().send(destination, amount_sat).await
    }
}

/// Balance of one wallet in both units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub smallest: u64,
    pub display: f64,
}

/// A wallet as shown to its owner, without secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub id: Uuid,
    pub asset: AssetType,
    pub address: String,
    pub public_key: String,
    pub is_active: bool,
    /// Display units; zero when the upstream could not be reached.
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub wallets: Vec<WalletSummary>,
    pub recent_transactions: Vec<LedgerEntry>,
}

/// Secrets of every wallet of an account.
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletBackup {
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub wallets: Vec<BackupEntry>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub asset: AssetType,
    pub address: String,
    pub public_key: String,
    pub private_key: String,
    pub mnemonic: Option<String>,
    pub is_active: bool,
}

pub struct WalletAdapter {
    accounts: Arc<Accounts>,
    ledger: Arc<Ledger>,
    bitcoin: Arc<dyn ChainDataProvider>,
    litecoin: Arc<dyn ChainDataProvider>,
    lightning: Arc<dyn LightningApi>,
    network: Network,
    bitcoin_fee: FeePolicy,
    litecoin_fee: FeePolicy,
    send_locks: KeyedLocks,
}

pub struct AdapterParts {
    pub bitcoin: Arc<dyn ChainDataProvider>,
    pub litecoin: Arc<dyn ChainDataProvider>,
    pub lightning: Arc<dyn LightningApi>,
    pub network: Network,
    pub bitcoin_fee: FeePolicy,
    pub litecoin_fee: FeePolicy,
}

impl WalletAdapter {
    pub fn new(accounts: Arc<Accounts>, ledger: Arc<Ledger>, parts: AdapterParts) -> Self {
        Self {
            accounts,
            ledger,
            bitcoin: parts.bitcoin,
            litecoin: parts.litecoin,
            lightning: parts.lightning,
            network: parts.network,
            bitcoin_fee: parts.bitcoin_fee,
            litecoin_fee: parts.litecoin_fee,
            send_locks: KeyedLocks::new(),
        }
    }

    pub fn bind(&self, wallet: Wallet) -> AssetWallet {
        match wallet.asset {
            AssetType::Bitcoin => AssetWallet::Bitcoin(UtxoWallet {
                params: ChainParams::new(chain_utxo::UtxoChain::Bitcoin, self.network),
                provider: self.bitcoin.clone(),
                fee_policy: self.bitcoin_fee,
                wallet,
            }),
            AssetType::Litecoin => AssetWallet::Litecoin(UtxoWallet {
                params: ChainParams::new(chain_utxo::UtxoChain::Litecoin, self.network),
                provider: self.litecoin.clone(),
                fee_policy: self.litecoin_fee,
                wallet,
            }),
            AssetType::Lightning => AssetWallet::Lightning(LightningWallet {
                api: self.lightning.clone(),
                wallet,
            }),
        }
    }

    /// Address for UTXO wallets; Lightning wallets are registered with the
    /// node API, which assigns the identifier.
    async fn resolve_address(&self, km: &KeyMaterial) -> Result<String, WalletError> {
        match &km.address {
            Some(address) => Ok(address.clone()),
            None => Ok(self.lightning.register_wallet(&km.private_key_hex()).await?),
        }
    }

    /// Create a fresh wallet from a new 12-word mnemonic. Fails with
    /// `DuplicateWalletType` if the account already has a wallet of `asset`.
    pub async fn create_wallet(
        &self,
        account_id: &str,
        asset: AssetType,
    ) -> Result<Wallet, WalletError> {
        if self.accounts.load(account_id).await?.has_wallet_of(asset) {
            return Err(WalletError::DuplicateWalletType(asset));
        }

        let phrase = mnemonic::generate_mnemonic()?;
        let km = address::from_mnemonic(&phrase, asset, self.network)?;
        let wallet = new_wallet(&km, self.resolve_address(&km).await?, true);

        let saved = wallet.clone();
        self.accounts
            .modify(account_id, move |account| {
                if account.has_wallet_of(asset) {
                    return Err(WalletError::DuplicateWalletType(asset));
                }
                account.wallets.push(saved);
                Ok(())
            })
            .await?;
        tracing::info!(account_id, %asset, wallet_id = %wallet.id, "wallet created");
        Ok(wallet)
    }

    /// Import from a mnemonic or a hex private key. The wallet becomes active
    /// only if it is the first of its asset; re-importing a known wallet
    /// returns it unchanged.
    pub async fn import_wallet(
        &self,
        account_id: &str,
        asset: AssetType,
        secret: &str,
    ) -> Result<Wallet, WalletError> {
        let km = address::from_import_secret(secret, asset, self.network)?;
        let mut wallet = new_wallet(&km, self.resolve_address(&km).await?, false);

        let wallet = self
            .accounts
            .modify(account_id, move |account| {
                if let Some(existing) = account
                    .wallets
                    .iter()
                    .find(|w| w.asset == asset && w.address == wallet.address)
                {
                    return Ok(existing.clone());
                }
                wallet.is_active = !account.has_wallet_of(asset);
                account.wallets.push(wallet.clone());
                Ok(wallet)
            })
            .await?;
        tracing::info!(account_id, %asset, wallet_id = %wallet.id, active = wallet.is_active, "wallet imported");
        Ok(wallet)
    }

    /// Live balance; the cached value on the wallet is refreshed.
    pub async fn balance(&self, account_id: &str, wallet_id: Uuid) -> Result<Balance, WalletError> {
        let wallet = self.accounts.load(account_id).await?.wallet(wallet_id)?.clone();
        let asset = wallet.asset;
        let smallest = self.bind(wallet).balance().await?;

        self.accounts
            .modify(account_id, move |account| {
                account.wallet_mut(wallet_id)?.balance = smallest;
                Ok(())
            })
            .await?;
        Ok(Balance {
            smallest,
            display: asset.to_display(smallest),
        })
    }

    /// Every wallet with its live balance, plus the latest ledger entries.
    /// A balance that cannot be fetched is reported as zero.
    pub async fn wallet_info(&self, account_id: &str) -> Result<WalletInfo, WalletError> {
        let account = self.accounts.load(account_id).await?;

        let mut wallets = Vec::with_capacity(account.wallets.len());
        for wallet in &account.wallets {
            let smallest = match self.bind(wallet.clone()).balance().await {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(account_id, wallet_id = %wallet.id, asset = %wallet.asset, error = %e, "balance unavailable, reporting zero");
                    0
                }
            };
            wallets.push(WalletSummary {
                id: wallet.id,
                asset: wallet.asset,
                address: wallet.address.clone(),
                public_key: wallet.public_key.clone(),
                is_active: wallet.is_active,
                balance: wallet.asset.to_display(smallest),
            });
        }

        Ok(WalletInfo {
            wallets,
            recent_transactions: self.ledger.recent(account_id).await?,
        })
    }

    /// Send from one wallet. Sends spending from the same address run one at
    /// a time, even when several accounts hold that address.
    /// A completed ledger entry is written only after the send succeeded.
    pub async fn send(
        &self,
        account_id: &str,
        wallet_id: Uuid,
        destination: &str,
        amount_sat: u64,
    ) -> Result<LedgerEntry, WalletError> {
        let wallet = self.accounts.load(account_id).await?.wallet(wallet_id)?.clone();
        let asset = wallet.asset;
        let _lock = self.send_locks.lock(&format!("{asset}:{}", wallet.address)).await;

        let outcome = match self.bind(wallet).send(destination, amount_sat).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(account_id, %wallet_id, %asset, error = %e, "send failed");
                return Err(e);
            }
        };
        tracing::info!(account_id, %wallet_id, %asset, reference = %outcome.reference, fee_sat = outcome.fee_sat, "send completed");

        self.ledger
            .record(
                account_id,
                Transfer {
                    asset,
                    direction: Direction::Send,
                    amount_smallest: outcome.amount_sat,
                    counterparty: outcome.counterparty,
                    reference: outcome.reference,
                },
            )
            .await
    }

    /// Remove a wallet. If it was active, the oldest remaining wallet of the
    /// same asset takes over.
    pub async fn remove_wallet(&self, account_id: &str, wallet_id: Uuid) -> Result<(), WalletError> {
        self.accounts
            .modify(account_id, move |account| {
                let position = account
                    .wallets
                    .iter()
                    .position(|w| w.id == wallet_id)
                    .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))?;
                let removed = account.wallets.remove(position);
                if removed.is_active {
                    if let Some(next) = account.wallets.iter_mut().find(|w| w.asset == removed.asset) {
                        next.is_active = true;
                    }
                }
                Ok(())
            })
            .await?;
        tracing::info!(account_id, %wallet_id, "wallet removed");
        Ok(())
    }

    /// Make a wallet the active one of its asset.
    pub async fn set_active_wallet(
        &self,
        account_id: &str,
        wallet_id: Uuid,
    ) -> Result<(), WalletError> {
        self.accounts
            .modify(account_id, move |account| {
                let asset = account.wallet(wallet_id)?.asset;
                for wallet in account.wallets.iter_mut().filter(|w| w.asset == asset) {
                    wallet.is_active = wallet.id == wallet_id;
                }
                Ok(())
            })
            .await
    }

    pub async fn backup(&self, account_id: &str) -> Result<WalletBackup, WalletError> {
        let account = self.accounts.load(account_id).await?;
        Ok(WalletBackup {
            account_id: account.id,
            created_at: Utc::now(),
            wallets: account
                .wallets
                .into_iter()
                .map(|w| BackupEntry {
                    asset: w.asset,
                    address: w.address,
                    public_key: w.public_key,
                    private_key: w.private_key,
                    mnemonic: w.mnemonic,
                    is_active: w.is_active,
                })
                .collect(),
        })
    }

    /// Restore wallets from a backup, skipping ones the account already has.
    /// Every entry is checked against its key before anything is written.
    /// Returns the number of wallets added.
    pub async fn restore(&self, account_id: &str, backup: WalletBackup) -> Result<usize, WalletError> {
        let mut restored = Vec::with_capacity(backup.wallets.len());
        for entry in backup.wallets {
            let km = address::from_private_key(&entry.private_key, entry.asset, self.network)?;
            if let Some(derived) = &km.address {
                if *derived != entry.address {
                    return Err(WalletError::InvalidPrivateKey(format!(
                        "backup key does not control {}",
                        entry.address
                    )));
                }
            }
            let mut wallet = new_wallet(&km, entry.address, false);
            wallet.mnemonic = entry.mnemonic;
            restored.push((wallet, entry.is_active));
        }

        let added = self
            .accounts
            .modify(account_id, move |account| {
                let mut added = 0;
                let mut touched = HashSet::new();
                for (mut wallet, was_active) in restored {
                    if account
                        .wallets
                        .iter()
                        .any(|w| w.asset == wallet.asset && w.address == wallet.address)
                    {
                        continue;
                    }
                    touched.insert(wallet.asset);
                    wallet.is_active = was_active && account.active_wallet(wallet.asset).is_none();
                    account.wallets.push(wallet);
                    added += 1;
                }
                for asset in touched {
                    if account.active_wallet(asset).is_none() {
                        if let Some(first) = account.wallets.iter_mut().find(|w| w.asset == asset) {
                            first.is_active = true;
                        }
                    }
                }
                Ok(added)
            })
            .await?;
        tracing::info!(account_id, added, "wallets restored from backup");
        Ok(added)
    }

    pub async fn create_invoice(
        &self,
        account_id: &str,
        amount_sat: u64,
        memo: &str,
    ) -> Result<Invoice, WalletError> {
        if amount_sat == 0 {
            return Err(WalletError::InvalidAmount(
                "invoice amount must be greater than zero".into(),
            ));
        }
        let account = self.accounts.load(account_id).await?;
        let wallet = account
            .active_wallet(AssetType::Lightning)
            .ok_or_else(|| WalletError::WalletNotFound(format!("no active lightning wallet for {account_id}")))?;
        Ok(self
            .lightning
            .create_invoice(&wallet.address, amount_sat, memo)
            .await?)
    }

    pub fn validate_address(&self, asset: AssetType, address: &str) -> Result<bool, WalletError> {
        address::validate_address(address, asset, self.network)
    }
}

fn new_wallet(km: &KeyMaterial, address: String, is_active: bool) -> Wallet {
    Wallet {
        id: Uuid::new_v4(),
        asset: km.asset,
        address,
        public_key: km.public_key_hex(),
        private_key: km.private_key_hex(),
        mnemonic: km.mnemonic.clone(),
        balance: 0,
        is_active,
        created_at: Utc::now(),
    }
}
