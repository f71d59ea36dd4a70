use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::WalletError;
use crate::types::Account;

/// Document store for accounts, keyed by account id.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, account_id: &str) -> Result<Option<Account>, WalletError>;
    async fn save(&self, account: &Account) -> Result<(), WalletError>;
}

/// Process-local store, for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn load(&self, account_id: &str) -> Result<Option<Account>, WalletError> {
        Ok(self.accounts.read().await.get(account_id).cloned())
    }

    async fn save(&self, account: &Account) -> Result<(), WalletError> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Ok(())
    }
}

type LockMap = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// One async mutex per key, created on first use and dropped again once
/// nobody holds or waits for it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: LockMap,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            guard: Some(lock.lock_owned().await),
            key: key.to_string(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held lock on one key of a [`KeyedLocks`].
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: LockMap,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters hold a clone of the Arc, so a count of one means only the
        // map still refers to it.
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Serialized read-modify-write access to accounts.
pub struct Accounts {
    store: Arc<dyn AccountStore>,
    locks: KeyedLocks,
}

impl Accounts {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Create the account if it does not exist yet.
    pub async fn open(&self, account_id: &str) -> Result<Account, WalletError> {
        let _guard = self.locks.lock(account_id).await;
        if let Some(account) = self.store.load(account_id).await? {
            return Ok(account);
        }
        let account = Account::new(account_id);
        self.store.save(&account).await?;
        tracing::info!(account_id, "opened account");
        Ok(account)
    }

    pub async fn load(&self, account_id: &str) -> Result<Account, WalletError> {
        self.store
            .load(account_id)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(account_id.to_string()))
    }

    /// Apply `change` under the account's lock and save the result. Nothing
    /// is saved when `change` fails.
    pub async fn modify<T, F>(&self, account_id: &str, change: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut Account) -> Result<T, WalletError> + Send,
    {
        let _guard = self.locks.lock(account_id).await;
        let mut account = self.load(account_id).await?;
        let out = change(&mut account)?;
        self.store.save(&account).await?;
        Ok(out)
    }
}
