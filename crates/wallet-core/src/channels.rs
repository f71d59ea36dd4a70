//! Lightning channel creation runs, channel closing and saved channel
//! configurations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chain_ln::{
    candidate_nodes, ChannelState, ClosedChannel, LightningApi, LightningError, OpenedChannel,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::WalletError;
use crate::store::Accounts;
use crate::types::{
    Account, AssetType, ChannelConfiguration, ChannelConfigurationUpdate, ChannelCreationRun,
};

/// A request to open a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub name: String,
    pub amount_sat: u64,
    /// Try only this node instead of the configured candidates.
    pub node_uri: Option<String>,
}

/// Held for the duration of a run; at most one per account.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    account_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, account_id: &str) -> Result<Self, WalletError> {
        let mut set = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(account_id.to_string()) {
            return Err(WalletError::ChannelCreationInProgress(account_id.to_string()));
        }
        Ok(Self {
            in_flight: in_flight.clone(),
            account_id: account_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.account_id);
    }
}

pub struct ChannelManager {
    accounts: Arc<Accounts>,
    lightning: Arc<dyn LightningApi>,
    candidates: Vec<String>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ChannelManager {
    pub fn new(
        accounts: Arc<Accounts>,
        lightning: Arc<dyn LightningApi>,
        candidates: Vec<String>,
    ) -> Self {
        Self {
            accounts,
            lightning,
            candidates,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Open a channel, falling back through the candidate nodes in order.
    ///
    /// Progress is persisted before every attempt. On success the resolved
    /// node is saved as a new channel configuration and returned; after the
    /// last failure the run ends at -1 with `ChannelCreationFailed`.
    pub async fn create_channel(
        &self,
        account_id: &str,
        request: ChannelRequest,
    ) -> Result<ChannelConfiguration, WalletError> {
        if request.amount_sat == 0 {
            return Err(WalletError::InvalidAmount(
                "channel amount must be greater than zero".into(),
            ));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, account_id)?;

        let wallet_id = lightning_wallet_id(&self.accounts.load(account_id).await?)?;
        let nodes = candidate_nodes(request.node_uri.as_deref(), &self.candidates);

        let mut run = ChannelCreationRun::new();
        self.persist_run(account_id, &run).await?;

        let mut state = ChannelState::Idle.start(nodes.len());
        let mut last_error: Option<LightningError> = None;

        while let ChannelState::Attempting { index } = state {
            let node = &nodes[index];
            run.state = state.clone();
            run.progress = state.progress();
            run.attempted_nodes.push(node.clone());
            self.persist_run(account_id, &run).await?;

            tracing::info!(account_id, node = %node, attempt = index + 1, of = nodes.len(), "opening channel");
            state = match self
                .lightning
                .open_channel(&wallet_id, node, request.amount_sat)
                .await
            {
                Ok(channel) => {
                    tracing::info!(account_id, channel_id = %channel.channel_id, node = %node, "channel opened");
                    state.on_success(channel)
                }
                Err(e) => {
                    tracing::warn!(account_id, node = %node, error = %e, "channel open failed");
                    last_error = Some(e);
                    state.on_failure(nodes.len())
                }
            };
        }

        run.progress = state.progress();
        run.state = state;
        run.finished_at = Some(Utc::now());

        match run.state.clone() {
            ChannelState::Active { index, channel } => {
                let config = ChannelConfiguration {
                    id: Uuid::new_v4(),
                    name: request.name,
                    node_uri: nodes[index].clone(),
                    amount_sat: request.amount_sat,
                    is_favorite: false,
                };
                let mut recorded = self.record_opened(account_id, &run, &channel, &config).await;
                if let Err(e) = &recorded {
                    tracing::warn!(account_id, channel_id = %channel.channel_id, error = %e, "recording opened channel failed, retrying");
                    recorded = self.record_opened(account_id, &run, &channel, &config).await;
                }
                match recorded {
                    Ok(()) => Ok(config),
                    Err(e) => {
                        tracing::error!(
                            account_id,
                            channel_id = %channel.channel_id,
                            node = %config.node_uri,
                            error = %e,
                            "channel opened but not recorded"
                        );
                        Err(WalletError::ChannelNotRecorded {
                            channel_id: channel.channel_id,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            _ => {
                self.persist_run(account_id, &run).await?;
                let last_error = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no candidate nodes configured".to_string());
                tracing::error!(account_id, attempts = nodes.len(), error = %last_error, "channel creation exhausted");
                Err(WalletError::ChannelCreationFailed {
                    attempts: nodes.len(),
                    last_error,
                })
            }
        }
    }

    /// Terminal write of a successful run.
    async fn record_opened(
        &self,
        account_id: &str,
        run: &ChannelCreationRun,
        channel: &OpenedChannel,
        config: &ChannelConfiguration,
    ) -> Result<(), WalletError> {
        let (run, channel, config) = (run.clone(), channel.clone(), config.clone());
        self.accounts
            .modify(account_id, move |account| {
                account.channel_run = Some(run);
                account.open_channels.push(channel);
                account.channel_configurations.push(config);
                Ok(())
            })
            .await
    }

    async fn persist_run(&self, account_id: &str, run: &ChannelCreationRun) -> Result<(), WalletError> {
        let run = run.clone();
        self.accounts
            .modify(account_id, move |account| {
                account.channel_run = Some(run);
                Ok(())
            })
            .await
    }

    /// The latest run, if any channel creation was ever started.
    pub async fn run(&self, account_id: &str) -> Result<Option<ChannelCreationRun>, WalletError> {
        Ok(self.accounts.load(account_id).await?.channel_run)
    }

    /// Progress of the latest run; 0 when none was started.
    pub async fn progress(&self, account_id: &str) -> Result<i8, WalletError> {
        Ok(self.run(account_id).await?.map_or(0, |run| run.progress))
    }

    pub async fn close_channel(
        &self,
        account_id: &str,
        channel_id: &str,
    ) -> Result<ClosedChannel, WalletError> {
        let account = self.accounts.load(account_id).await?;
        if !account.open_channels.iter().any(|c| c.channel_id == channel_id) {
            return Err(WalletError::ChannelNotFound(channel_id.to_string()));
        }
        let wallet_id = lightning_wallet_id(&account)?;

        let closed = self
            .lightning
            .close_channel(&wallet_id, channel_id)
            .await
            .map_err(|e| match e {
                LightningError::NotFound(_) => WalletError::ChannelNotFound(channel_id.to_string()),
                other => other.into(),
            })?;

        let removed = channel_id.to_string();
        self.accounts
            .modify(account_id, move |account| {
                account.open_channels.retain(|c| c.channel_id != removed);
                Ok(())
            })
            .await?;
        tracing::info!(account_id, channel_id, closing_txid = %closed.closing_txid, "channel closed");
        Ok(closed)
    }

    pub async fn configurations(
        &self,
        account_id: &str,
    ) -> Result<Vec<ChannelConfiguration>, WalletError> {
        Ok(self.accounts.load(account_id).await?.channel_configurations)
    }

    pub async fn update_configuration(
        &self,
        account_id: &str,
        config_id: Uuid,
        update: ChannelConfigurationUpdate,
    ) -> Result<ChannelConfiguration, WalletError> {
        if update.amount_sat == Some(0) {
            return Err(WalletError::InvalidAmount(
                "channel amount must be greater than zero".into(),
            ));
        }
        self.accounts
            .modify(account_id, move |account| {
                let config = account
                    .channel_configurations
                    .iter_mut()
                    .find(|c| c.id == config_id)
                    .ok_or_else(|| WalletError::ConfigurationNotFound(config_id.to_string()))?;
                if let Some(name) = update.name {
                    config.name = name;
                }
                if let Some(node_uri) = update.node_uri {
                    config.node_uri = node_uri;
                }
                if let Some(amount_sat) = update.amount_sat {
                    config.amount_sat = amount_sat;
                }
                if let Some(is_favorite) = update.is_favorite {
                    config.is_favorite = is_favorite;
                }
                Ok(config.clone())
            })
            .await
    }

    pub async fn delete_configuration(
        &self,
        account_id: &str,
        config_id: Uuid,
    ) -> Result<(), WalletError> {
        self.accounts
            .modify(account_id, move |account| {
                let before = account.channel_configurations.len();
                account.channel_configurations.retain(|c| c.id != config_id);
                if account.channel_configurations.len() == before {
                    return Err(WalletError::ConfigurationNotFound(config_id.to_string()));
                }
                Ok(())
            })
            .await
    }
}

fn lightning_wallet_id(account: &Account) -> Result<String, WalletError> {
    account
        .active_wallet(AssetType::Lightning)
        .map(|w| w.address.clone())
        .ok_or_else(|| WalletError::WalletNotFound(format!("no active lightning wallet for {}", account.id)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chain_ln::{Invoice, Payment};

    use super::*;
    use crate::store::{AccountStore, InMemoryAccountStore};
    use crate::types::Wallet;

    /// Nodes listed in `failing` reject the open; others succeed.
    #[derive(Default)]
    struct ScriptedNode {
        failing: Vec<String>,
        opened: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LightningApi for ScriptedNode {
        async fn register_wallet(&self, _key: &str) -> Result<String, LightningError> {
            Ok("ln-wallet".into())
        }

        async fn channel_balance(&self, _wallet_id: &str) -> Result<u64, LightningError> {
            Ok(0)
        }

        async fn open_channel(
            &self,
            _wallet_id: &str,
            node_uri: &str,
            amount_sat: u64,
        ) -> Result<OpenedChannel, LightningError> {
            self.opened.lock().unwrap().push(node_uri.to_string());
            if self.failing.iter().any(|n| n == node_uri) {
                return Err(LightningError::Rejected {
                    status: 400,
                    body: format!("{node_uri} refused"),
                });
            }
            Ok(OpenedChannel {
                channel_id: format!("chan-{node_uri}"),
                funding_txid: "ab".repeat(32),
                capacity_sat: amount_sat,
                active: false,
            })
        }

        async fn close_channel(
            &self,
            _wallet_id: &str,
            _channel_id: &str,
        ) -> Result<ClosedChannel, LightningError> {
            Ok(ClosedChannel {
                closing_txid: "cd".repeat(32),
                settled_balance_sat: 90_000,
            })
        }

        async fn create_invoice(
            &self,
            _wallet_id: &str,
            _amount_sat: u64,
            _memo: &str,
        ) -> Result<Invoice, LightningError> {
            unimplemented!()
        }

        async fn pay_invoice(
            &self,
            _wallet_id: &str,
            _payment_request: &str,
        ) -> Result<Payment, LightningError> {
            unimplemented!()
        }
    }

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Fails the next `failures` saves that carry an opened channel.
    #[derive(Default)]
    struct FailingRecordStore {
        inner: InMemoryAccountStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl AccountStore for FailingRecordStore {
        async fn load(&self, account_id: &str) -> Result<Option<Account>, WalletError> {
            self.inner.load(account_id).await
        }

        async fn save(&self, account: &Account) -> Result<(), WalletError> {
            if !account.open_channels.is_empty()
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(WalletError::Store("disk full".into()));
            }
            self.inner.save(account).await
        }
    }

    async fn setup(node: ScriptedNode, candidates: &[&str]) -> (ChannelManager, Arc<ScriptedNode>) {
        setup_on(Arc::new(InMemoryAccountStore::new()), node, candidates).await
    }

    async fn setup_on(
        store: Arc<dyn AccountStore>,
        node: ScriptedNode,
        candidates: &[&str],
    ) -> (ChannelManager, Arc<ScriptedNode>) {
        let accounts = Arc::new(Accounts::new(store));
        accounts.open("acct").await.unwrap();
        accounts
            .modify("acct", |a| {
                a.wallets.push(Wallet {
                    id: Uuid::new_v4(),
                    asset: AssetType::Lightning,
                    address: "ln-wallet".into(),
                    public_key: String::new(),
                    private_key: String::new(),
                    mnemonic: None,
                    balance: 0,
                    is_active: true,
                    created_at: Utc::now(),
                });
                Ok(())
            })
            .await
            .unwrap();
        let node = Arc::new(node);
        (
            ChannelManager::new(accounts, node.clone(), nodes(candidates)),
            node,
        )
    }

    fn request(node_uri: Option<&str>) -> ChannelRequest {
        ChannelRequest {
            name: "main".into(),
            amount_sat: 100_000,
            node_uri: node_uri.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn falls_back_to_third_node() {
        let (manager, node) = setup(
            ScriptedNode {
                failing: nodes(&["A", "B"]),
                ..Default::default()
            },
            &["A", "B", "C"],
        )
        .await;

        let config = manager.create_channel("acct", request(None)).await.unwrap();
        assert_eq!(config.node_uri, "C");
        assert!(!config.is_favorite);
        assert_eq!(*node.opened.lock().unwrap(), nodes(&["A", "B", "C"]));

        let run = manager.run("acct").await.unwrap().unwrap();
        assert_eq!(run.progress, 100);
        assert_eq!(run.attempted_nodes, nodes(&["A", "B", "C"]));
        assert_eq!(run.result_channel().unwrap().channel_id, "chan-C");
        assert_eq!(manager.configurations("acct").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_leaves_progress_at_minus_one() {
        let (manager, _) = setup(
            ScriptedNode {
                failing: nodes(&["A", "B"]),
                ..Default::default()
            },
            &["A", "B"],
        )
        .await;

        let err = manager.create_channel("acct", request(None)).await.unwrap_err();
        assert!(matches!(err, WalletError::ChannelCreationFailed { attempts: 2, .. }));
        assert_eq!(manager.progress("acct").await.unwrap(), -1);
        assert!(manager.configurations("acct").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_node_is_the_only_attempt() {
        let (manager, node) = setup(
            ScriptedNode {
                failing: nodes(&["X"]),
                ..Default::default()
            },
            &["A", "B"],
        )
        .await;

        let err = manager.create_channel("acct", request(Some("X"))).await.unwrap_err();
        assert!(matches!(err, WalletError::ChannelCreationFailed { attempts: 1, .. }));
        assert_eq!(*node.opened.lock().unwrap(), nodes(&["X"]));
    }

    #[tokio::test]
    async fn opened_channel_is_recorded_on_retry() {
        let store = Arc::new(FailingRecordStore {
            failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let (manager, _) = setup_on(store, ScriptedNode::default(), &["A"]).await;

        let config = manager.create_channel("acct", request(None)).await.unwrap();
        assert_eq!(config.node_uri, "A");
        assert_eq!(manager.progress("acct").await.unwrap(), 100);
        let account = manager.accounts.load("acct").await.unwrap();
        assert_eq!(account.open_channels.len(), 1);
        assert_eq!(account.channel_configurations.len(), 1);
    }

    #[tokio::test]
    async fn unrecorded_channel_error_carries_the_channel_id() {
        let store = Arc::new(FailingRecordStore {
            failures: AtomicUsize::new(2),
            ..Default::default()
        });
        let (manager, _) = setup_on(store, ScriptedNode::default(), &["A"]).await;

        let err = manager.create_channel("acct", request(None)).await.unwrap_err();
        match err {
            WalletError::ChannelNotRecorded { channel_id, .. } => assert_eq!(channel_id, "chan-A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let (manager, _) = setup(ScriptedNode::default(), &["A"]).await;
        let _held = InFlightGuard::acquire(&manager.in_flight, "acct").unwrap();
        let err = manager.create_channel("acct", request(None)).await.unwrap_err();
        assert!(matches!(err, WalletError::ChannelCreationInProgress(_)));
    }

    #[tokio::test]
    async fn guard_is_released_after_failure() {
        let (manager, _) = setup(
            ScriptedNode {
                failing: nodes(&["A"]),
                ..Default::default()
            },
            &["A"],
        )
        .await;
        assert!(manager.create_channel("acct", request(None)).await.is_err());
        assert!(InFlightGuard::acquire(&manager.in_flight, "acct").is_ok());
    }

    #[tokio::test]
    async fn close_unknown_channel_is_not_found() {
        let (manager, _) = setup(ScriptedNode::default(), &["A"]).await;
        let err = manager.close_channel("acct", "nope").await.unwrap_err();
        assert!(matches!(err, WalletError::ChannelNotFound(_)));
    }

    #[tokio::test]
    async fn close_opened_channel() {
        let (manager, _) = setup(ScriptedNode::default(), &["A"]).await;
        manager.create_channel("acct", request(None)).await.unwrap();
        let closed = manager.close_channel("acct", "chan-A").await.unwrap();
        assert_eq!(closed.settled_balance_sat, 90_000);
        // A second close no longer finds it.
        assert!(matches!(
            manager.close_channel("acct", "chan-A").await,
            Err(WalletError::ChannelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn configuration_crud() {
        let (manager, _) = setup(ScriptedNode::default(), &["A"]).await;
        let config = manager.create_channel("acct", request(None)).await.unwrap();

        let updated = manager
            .update_configuration(
                "acct",
                config.id,
                ChannelConfigurationUpdate {
                    is_favorite: Some(true),
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_favorite);
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.node_uri, "A");

        manager.delete_configuration("acct", config.id).await.unwrap();
        assert!(matches!(
            manager.delete_configuration("acct", config.id).await,
            Err(WalletError::ConfigurationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn no_lightning_wallet_is_wallet_not_found() {
        let accounts = Arc::new(Accounts::new(Arc::new(InMemoryAccountStore::new())));
        accounts.open("bare").await.unwrap();
        let manager = ChannelManager::new(accounts, Arc::new(ScriptedNode::default()), nodes(&["A"]));
        let err = manager.create_channel("bare", request(None)).await.unwrap_err();
        assert!(matches!(err, WalletError::WalletNotFound(_)));
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_before_any_attempt() {
        let (manager, node) = setup(ScriptedNode::default(), &["A"]).await;
        let mut req = request(None);
        req.amount_sat = 0;
        assert!(matches!(
            manager.create_channel("acct", req).await,
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(node.opened.lock().unwrap().is_empty());
        assert_eq!(manager.progress("acct").await.unwrap(), 0);
    }
}
