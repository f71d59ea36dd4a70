use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::WalletError;
use crate::store::Accounts;
use crate::types::{Account, AssetType, Direction, EntryStatus, LedgerEntry};

/// Number of entries shown by wallet-info.
pub const RECENT_ENTRIES: usize = 10;

/// A finished transfer, in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub asset: AssetType,
    pub direction: Direction,
    pub amount_smallest: u64,
    pub counterparty: String,
    /// Transaction id or payment hash.
    pub reference: String,
}

/// Append a completed entry to the account's ledger.
pub fn append(account: &mut Account, transfer: Transfer) -> LedgerEntry {
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        direction: transfer.direction,
        amount: transfer.asset.to_display(transfer.amount_smallest),
        counterparty: transfer.counterparty,
        timestamp: Utc::now(),
        status: EntryStatus::Completed,
        asset: transfer.asset,
        reference: transfer.reference,
    };
    account.ledger.push(entry.clone());
    entry
}

/// Entries newest first, optionally restricted to one asset. Entries with
/// equal timestamps keep reverse insertion order.
pub fn entries(account: &Account, asset: Option<AssetType>) -> Vec<LedgerEntry> {
    let mut out: Vec<LedgerEntry> = account
        .ledger
        .iter()
        .rev()
        .filter(|e| asset.map_or(true, |a| e.asset == a))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

pub struct Ledger {
    accounts: Arc<Accounts>,
}

impl Ledger {
    pub fn new(accounts: Arc<Accounts>) -> Self {
        Self { accounts }
    }

    pub async fn record(
        &self,
        account_id: &str,
        transfer: Transfer,
    ) -> Result<LedgerEntry, WalletError> {
        let entry = self
            .accounts
            .modify(account_id, move |account| Ok(append(account, transfer)))
            .await?;
        tracing::info!(
            account_id,
            asset = %entry.asset,
            amount = entry.amount,
            reference = %entry.reference,
            "ledger entry recorded"
        );
        Ok(entry)
    }

    pub async fn history(
        &self,
        account_id: &str,
        asset: Option<AssetType>,
    ) -> Result<Vec<LedgerEntry>, WalletError> {
        let account = self.accounts.load(account_id).await?;
        Ok(entries(&account, asset))
    }

    pub async fn recent(&self, account_id: &str) -> Result<Vec<LedgerEntry>, WalletError> {
        let mut all = self.history(account_id, None).await?;
        all.truncate(RECENT_ENTRIES);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::InMemoryAccountStore;

    fn transfer(asset: AssetType, amount_smallest: u64, reference: &str) -> Transfer {
        Transfer {
            asset,
            direction: Direction::Send,
            amount_smallest,
            counterparty: "dest".into(),
            reference: reference.into(),
        }
    }

    #[test]
    fn append_normalizes_to_display_units() {
        let mut account = Account::new("a");
        let entry = append(&mut account, transfer(AssetType::Bitcoin, 150_000_000, "tx1"));
        assert_eq!(entry.amount, 1.5);
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(account.ledger.len(), 1);
    }

    #[test]
    fn lightning_sats_display_in_btc() {
        let mut account = Account::new("a");
        let entry = append(&mut account, transfer(AssetType::Lightning, 2_500, "hash"));
        assert_eq!(entry.amount, 0.000025);
    }

    #[test]
    fn entries_are_newest_first_and_filtered() {
        let mut account = Account::new("a");
        append(&mut account, transfer(AssetType::Bitcoin, 1, "old"));
        append(&mut account, transfer(AssetType::Litecoin, 2, "ltc"));
        append(&mut account, transfer(AssetType::Bitcoin, 3, "new"));
        let now = Utc::now();
        account.ledger[0].timestamp = now - Duration::seconds(30);
        account.ledger[1].timestamp = now - Duration::seconds(20);
        account.ledger[2].timestamp = now - Duration::seconds(10);

        let all: Vec<_> = entries(&account, None).into_iter().map(|e| e.reference).collect();
        assert_eq!(all, vec!["new", "ltc", "old"]);

        let btc: Vec<_> = entries(&account, Some(AssetType::Bitcoin))
            .into_iter()
            .map(|e| e.reference)
            .collect();
        assert_eq!(btc, vec!["new", "old"]);
    }

    #[test]
    fn equal_timestamps_list_latest_insert_first() {
        let mut account = Account::new("a");
        append(&mut account, transfer(AssetType::Bitcoin, 1, "first"));
        append(&mut account, transfer(AssetType::Bitcoin, 1, "second"));
        let ts = account.ledger[0].timestamp;
        account.ledger[1].timestamp = ts;
        let refs: Vec<_> = entries(&account, None).into_iter().map(|e| e.reference).collect();
        assert_eq!(refs, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn recent_is_capped() {
        let accounts = Arc::new(Accounts::new(Arc::new(InMemoryAccountStore::new())));
        accounts.open("acct").await.unwrap();
        let ledger = Ledger::new(accounts);
        for i in 0..15 {
            ledger
                .record("acct", transfer(AssetType::Bitcoin, i, &format!("tx{i}")))
                .await
                .unwrap();
        }
        assert_eq!(ledger.recent("acct").await.unwrap().len(), RECENT_ENTRIES);
        assert_eq!(ledger.history("acct", None).await.unwrap().len(), 15);
    }
}
