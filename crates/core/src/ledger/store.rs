//! Balance store contracts.
//!
//! Reads go through [`BalanceReader`]. Writes happen inside an
//! [`AccountSession`] obtained from [`BalanceStore::begin`], which holds the
//! per-account write lock until the session is committed or dropped. A
//! dropped session discards everything it staged.

use async_trait::async_trait;
use chrono::NaiveDate;
use tally_shared::types::LedgerAccountId;

use super::balance::RunningBalance;
use super::closing::ClosingBalanceSlice;
use super::error::BalanceError;

/// Date window for slice lookups. Results are ordered by closing date,
/// oldest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceFilter {
    /// Inclusive lower bound.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound.
    pub to: Option<NaiveDate>,
    /// Maximum number of slices returned.
    pub limit: Option<u64>,
}

impl SliceFilter {
    /// Every slice of the account.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            from: None,
            to: None,
            limit: None,
        }
    }

    /// Slices closing within `from..=to`.
    #[must_use]
    pub const fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            limit: None,
        }
    }

    /// Only the earliest slice.
    #[must_use]
    pub const fn earliest() -> Self {
        Self {
            from: None,
            to: None,
            limit: Some(1),
        }
    }

    /// Whether `date` falls inside the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Read access to balances.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Running balance row of an account.
    async fn find_running_balance(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<RunningBalance>, BalanceError>;

    /// Slices of an account inside `filter`, oldest first.
    async fn find_closing_balance_slices(
        &self,
        account_id: LedgerAccountId,
        filter: &SliceFilter,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError>;

    /// Latest slice closing on or before `date`.
    async fn find_closing_balance_slice_at_or_before(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError>;

    /// Slices closing strictly after `date`, oldest first.
    async fn find_closing_balance_slices_after(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError>;
}

/// A unit of work holding the write lock of one account.
///
/// Reads through the session see its own staged writes.
#[async_trait]
pub trait AccountSession: BalanceReader {
    /// The locked account.
    fn account_id(&self) -> LedgerAccountId;

    /// Inserts (version 0) or updates the running balance row.
    ///
    /// Returns the row with its new version.
    async fn save_running_balance(
        &mut self,
        balance: RunningBalance,
    ) -> Result<RunningBalance, BalanceError>;

    /// Inserts or updates a batch of slices. Either every slice is staged
    /// or, on error, the session must be discarded.
    async fn save_closing_balance_slices(
        &mut self,
        slices: Vec<ClosingBalanceSlice>,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError>;

    /// Makes every staged write visible and releases the lock.
    async fn commit(self: Box<Self>) -> Result<(), BalanceError>;
}

/// A balance store that can serialize writers per account.
#[async_trait]
pub trait BalanceStore: BalanceReader {
    /// Acquires the write lock of `account_id` and opens a session.
    ///
    /// Fails with [`BalanceError::ConcurrentModification`] when the lock
    /// cannot be acquired within the configured timeout.
    async fn begin(&self, account_id: LedgerAccountId) -> Result<Box<dyn AccountSession>, BalanceError>;
}

/// Rejects rows that belong to another account than the locked one.
pub fn ensure_account(
    locked: LedgerAccountId,
    requested: LedgerAccountId,
) -> Result<(), BalanceError> {
    if locked == requested {
        Ok(())
    } else {
        Err(BalanceError::AccountMismatch { locked, requested })
    }
}

/// Compares the version a writer read with the stored one.
pub fn ensure_version(
    account_id: LedgerAccountId,
    expected: i64,
    actual: i64,
) -> Result<(), BalanceError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BalanceError::VersionMismatch {
            account_id,
            expected,
            actual,
        })
    }
}
