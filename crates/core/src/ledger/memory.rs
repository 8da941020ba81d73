//! In-memory balance store.
//!
//! Each account owns a cell holding its committed balances and a writer
//! mutex. A session keeps the mutex guard and a staged copy of the cell's
//! balances; commit swaps the staged copy in, drop throws it away.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tally_shared::types::LedgerAccountId;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::warn;

use super::balance::RunningBalance;
use super::closing::ClosingBalanceSlice;
use super::error::BalanceError;
use super::reports::{ClosingBalanceQuery, ClosingBalanceReports, sort_newest_first};
use super::store::{
    AccountSession, BalanceReader, BalanceStore, SliceFilter, ensure_account, ensure_version,
};

/// Balances of one account.
#[derive(Debug, Clone, Default)]
struct AccountLedger {
    running: Option<RunningBalance>,
    slices: BTreeMap<NaiveDate, ClosingBalanceSlice>,
}

impl AccountLedger {
    fn slices_in(&self, filter: &SliceFilter) -> Vec<ClosingBalanceSlice> {
        let lower = filter.from.map_or(Bound::Unbounded, Bound::Included);
        let upper = filter.to.map_or(Bound::Unbounded, Bound::Included);
        let limit = filter
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);

        self.slices
            .range((lower, upper))
            .map(|(_, slice)| slice.clone())
            .take(limit)
            .collect()
    }

    fn at_or_before(&self, date: NaiveDate) -> Option<ClosingBalanceSlice> {
        self.slices
            .range(..=date)
            .next_back()
            .map(|(_, slice)| slice.clone())
    }

    fn after(&self, date: NaiveDate) -> Vec<ClosingBalanceSlice> {
        self.slices
            .range((Bound::Excluded(date), Bound::Unbounded))
            .map(|(_, slice)| slice.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct AccountCell {
    writer: Arc<Mutex<()>>,
    committed: RwLock<AccountLedger>,
}

/// Balance store kept in process memory.
#[derive(Debug)]
pub struct InMemoryBalanceStore {
    accounts: DashMap<LedgerAccountId, Arc<AccountCell>>,
    lock_timeout: Duration,
}

impl InMemoryBalanceStore {
    /// Creates an empty store whose writers wait at most `lock_timeout`.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            lock_timeout,
        }
    }

    fn cell(&self, account_id: LedgerAccountId) -> Option<Arc<AccountCell>> {
        self.accounts.get(&account_id).map(|cell| Arc::clone(cell.value()))
    }

    async fn committed(&self, account_id: LedgerAccountId) -> Option<AccountLedger> {
        let cell = self.cell(account_id)?;
        let ledger = cell.committed.read().await;
        Some(ledger.clone())
    }
}

impl Default for InMemoryBalanceStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl BalanceReader for InMemoryBalanceStore {
    async fn find_running_balance(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<RunningBalance>, BalanceError> {
        Ok(self.committed(account_id).await.and_then(|l| l.running))
    }

    async fn find_closing_balance_slices(
        &self,
        account_id: LedgerAccountId,
        filter: &SliceFilter,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        Ok(self
            .committed(account_id)
            .await
            .map(|l| l.slices_in(filter))
            .unwrap_or_default())
    }

    async fn find_closing_balance_slice_at_or_before(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        Ok(self
            .committed(account_id)
            .await
            .and_then(|l| l.at_or_before(date)))
    }

    async fn find_closing_balance_slices_after(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        Ok(self
            .committed(account_id)
            .await
            .map(|l| l.after(date))
            .unwrap_or_default())
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn begin(&self, account_id: LedgerAccountId) -> Result<Box<dyn AccountSession>, BalanceError> {
        let cell = Arc::clone(self.accounts.entry(account_id).or_default().value());

        let guard = tokio::time::timeout(self.lock_timeout, Arc::clone(&cell.writer).lock_owned())
            .await
            .map_err(|_| {
                warn!(%account_id, timeout = ?self.lock_timeout, "Timed out waiting for account lock");
                BalanceError::ConcurrentModification(account_id)
            })?;

        let staged = cell.committed.read().await.clone();

        Ok(Box::new(InMemorySession {
            account_id,
            cell,
            staged,
            _guard: guard,
        }))
    }
}

#[async_trait]
impl ClosingBalanceReports for InMemoryBalanceStore {
    async fn list_closing_balances(
        &self,
        query: &ClosingBalanceQuery,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        query.validate()?;

        let cells: Vec<Arc<AccountCell>> = self
            .accounts
            .iter()
            .filter(|entry| query.account_ids.is_empty() || query.account_ids.contains(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut slices = Vec::new();
        for cell in cells {
            let ledger = cell.committed.read().await;
            slices.extend(ledger.slices.values().filter(|s| query.matches(s)).cloned());
        }

        sort_newest_first(&mut slices);
        Ok(slices)
    }
}

/// Write session over one account of an [`InMemoryBalanceStore`].
struct InMemorySession {
    account_id: LedgerAccountId,
    cell: Arc<AccountCell>,
    staged: AccountLedger,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl BalanceReader for InMemorySession {
    async fn find_running_balance(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<RunningBalance>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        Ok(self.staged.running.clone())
    }

    async fn find_closing_balance_slices(
        &self,
        account_id: LedgerAccountId,
        filter: &SliceFilter,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        Ok(self.staged.slices_in(filter))
    }

    async fn find_closing_balance_slice_at_or_before(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        Ok(self.staged.at_or_before(date))
    }

    async fn find_closing_balance_slices_after(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        Ok(self.staged.after(date))
    }
}

#[async_trait]
impl AccountSession for InMemorySession {
    fn account_id(&self) -> LedgerAccountId {
        self.account_id
    }

    async fn save_running_balance(
        &mut self,
        mut balance: RunningBalance,
    ) -> Result<RunningBalance, BalanceError> {
        ensure_account(self.account_id, balance.account_id)?;
        let stored = self.staged.running.as_ref().map_or(0, |r| r.version);
        ensure_version(self.account_id, balance.version, stored)?;

        balance.version += 1;
        self.staged.running = Some(balance.clone());
        Ok(balance)
    }

    async fn save_closing_balance_slices(
        &mut self,
        slices: Vec<ClosingBalanceSlice>,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        for slice in &slices {
            ensure_account(self.account_id, slice.account_id)?;
            let stored = self
                .staged
                .slices
                .get(&slice.closing_date)
                .map_or(0, |s| s.version);
            ensure_version(self.account_id, slice.version, stored)?;
        }

        let saved: Vec<ClosingBalanceSlice> = slices
            .into_iter()
            .map(|mut slice| {
                slice.version += 1;
                slice
            })
            .collect();

        for slice in &saved {
            self.staged.slices.insert(slice.closing_date, slice.clone());
        }
        Ok(saved)
    }

    async fn commit(self: Box<Self>) -> Result<(), BalanceError> {
        let Self { cell, staged, .. } = *self;
        *cell.committed.write().await = staged;
        Ok(())
    }
}
