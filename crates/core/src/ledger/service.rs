//! Balance service.
//!
//! Applies postings to the running balance and the closing balance series
//! of their ledger account. Every write happens inside one
//! [`AccountSession`], so a posting is applied under the account's write
//! lock and either all of its effects are committed or none are.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::BalanceConfig;
use tally_shared::types::LedgerAccountId;
use tracing::{debug, info, instrument, warn};

use super::balance::RunningBalance;
use super::closing::{ClosingBalanceSeries, ClosingBalanceSlice, SeriesChange, SliceOrigin};
use super::delta::SliceDelta;
use super::entry::{BankTransaction, LedgerAccount, Posting};
use super::error::BalanceError;
use super::store::{AccountSession, BalanceStore, SliceFilter};

/// Balances of an account after a posting was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    /// New running balance.
    pub running_balance: Decimal,
    /// Closing balance at the posting's effective date.
    pub closing_balance: Decimal,
}

/// Service maintaining running and closing balances.
pub struct BalanceService<S> {
    store: Arc<S>,
    config: BalanceConfig,
}

impl<S> Clone for BalanceService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: BalanceStore> BalanceService<S> {
    /// Creates a new balance service.
    #[must_use]
    pub const fn new(store: Arc<S>, config: BalanceConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // ========== Writes ==========

    /// Applies a posting to its account's running balance and closing
    /// balance series. Returns the new running balance.
    ///
    /// `None` is accepted and ignored: the result is `Ok(None)`.
    #[instrument(skip_all, fields(posting_id = ?posting.map(|p| p.id)))]
    pub async fn update_running_balance(
        &self,
        posting: Option<&Posting>,
    ) -> Result<Option<Decimal>, BalanceError> {
        let update = self.post(posting, false).await?;
        Ok(update.map(|u| u.running_balance))
    }

    /// Same as [`Self::update_running_balance`], additionally resetting the
    /// opening balance to the new running balance when `reset_opening` is
    /// set. A negative running balance is recorded as its absolute value.
    ///
    /// A posting without amount writes nothing, so `reset_opening` has no
    /// effect on it and the stored opening balance stays as it is.
    #[instrument(skip_all, fields(posting_id = ?posting.map(|p| p.id), reset_opening = reset_opening))]
    pub async fn update_running_balance_and_opening_balance(
        &self,
        posting: Option<&Posting>,
        reset_opening: bool,
    ) -> Result<Option<Decimal>, BalanceError> {
        let update = self.post(posting, reset_opening).await?;
        Ok(update.map(|u| u.running_balance))
    }

    /// Applies a posting to both balances and returns both results.
    ///
    /// A posting without amount is not applied, whatever its exchange rate
    /// or `reset_opening`; the current balances are returned.
    pub async fn post(
        &self,
        posting: Option<&Posting>,
        reset_opening: bool,
    ) -> Result<Option<BalanceUpdate>, BalanceError> {
        let Some(posting) = posting else {
            debug!("No posting supplied, nothing to apply");
            return Ok(None);
        };

        let account_id = posting.account_id();
        let date = posting.effective_date();
        let delta = SliceDelta::for_posting(posting, &self.config)?;

        if delta.is_zero() {
            debug!(%account_id, posting_id = %posting.id, "Posting carries no amount, balances unchanged");
            return Ok(Some(BalanceUpdate {
                running_balance: self.current_running_balance(account_id).await?,
                closing_balance: self.closing_balance_at(account_id, date).await?,
            }));
        }

        let result = async {
            let mut session = self.store.begin(account_id).await?;
            let running = apply_running(session.as_mut(), posting, delta.ledger, reset_opening).await?;
            let change = apply_closing(session.as_mut(), posting, &delta).await?;
            session.commit().await?;

            Ok::<_, BalanceError>(BalanceUpdate {
                running_balance: running.running_balance,
                closing_balance: change.closing_balance,
            })
        }
        .await
        .inspect_err(|err| log_conflict(account_id, err))?;

        debug!(
            %account_id,
            posting_id = %posting.id,
            delta = %delta.ledger,
            running_balance = %result.running_balance,
            "Posting applied"
        );
        Ok(Some(result))
    }

    /// Applies a posting to the closing balance series only. Returns the
    /// closing balance at the posting's effective date.
    #[instrument(skip_all, fields(posting_id = ?posting.map(|p| p.id)))]
    pub async fn update_closing_balance(
        &self,
        posting: Option<&Posting>,
    ) -> Result<Option<Decimal>, BalanceError> {
        let Some(posting) = posting else {
            debug!("No posting supplied, nothing to apply");
            return Ok(None);
        };

        let account_id = posting.account_id();
        let delta = SliceDelta::for_posting(posting, &self.config)?;

        if delta.is_zero() {
            debug!(%account_id, posting_id = %posting.id, "Posting carries no amount, closing balances unchanged");
            return self
                .closing_balance_at(account_id, posting.effective_date())
                .await
                .map(Some);
        }

        let change = async {
            let mut session = self.store.begin(account_id).await?;
            let change = apply_closing(session.as_mut(), posting, &delta).await?;
            session.commit().await?;
            Ok::<_, BalanceError>(change)
        }
        .await
        .inspect_err(|err| log_conflict(account_id, err))?;

        Ok(Some(change.closing_balance))
    }

    /// Applies a bank transaction to the closing balance series of
    /// `account`. Returns the resulting closing balance, or `None` when no
    /// transaction is supplied.
    #[instrument(skip_all, fields(account_id = %account.id, transaction_id = ?transaction.map(|t| t.id)))]
    pub async fn update_closing_balance_for_transaction(
        &self,
        transaction: Option<&BankTransaction>,
        account: &LedgerAccount,
    ) -> Result<Option<Decimal>, BalanceError> {
        let Some(transaction) = transaction else {
            debug!("No bank transaction supplied, nothing to apply");
            return Ok(None);
        };

        let posting = transaction.to_posting(account)?;
        self.update_closing_balance(Some(&posting)).await
    }

    // ========== Reads ==========

    /// Most recent closing balance slice of an account.
    pub async fn get_last_closing_balance_by_date(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        self.store
            .find_closing_balance_slice_at_or_before(account_id, NaiveDate::MAX)
            .await
    }

    /// Earliest closing balance slice of an account.
    pub async fn get_first_closing_balance_by_date(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        let slices = self
            .store
            .find_closing_balance_slices(account_id, &SliceFilter::earliest())
            .await?;
        Ok(slices.into_iter().next())
    }

    /// Closing balance effective at `date`; zero without history.
    pub async fn closing_balance_at(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Decimal, BalanceError> {
        let slice = self
            .store
            .find_closing_balance_slice_at_or_before(account_id, date)
            .await?;
        Ok(slice.map_or(Decimal::ZERO, |s| s.closing_balance))
    }

    /// Bank-side closing balance effective at `date`, for reconciliation.
    ///
    /// Zero when the account has no slices at all. `None` when a slice
    /// exists but carries no bank closing balance.
    #[instrument(skip(self))]
    pub async fn match_closing_balance_for_reconcile(
        &self,
        date: NaiveDate,
        account_id: LedgerAccountId,
    ) -> Result<Option<Decimal>, BalanceError> {
        let slice = self
            .store
            .find_closing_balance_slice_at_or_before(account_id, date)
            .await?;

        match slice {
            None => Ok(Some(Decimal::ZERO)),
            Some(slice) => {
                if slice.bank_account_closing_balance.is_none() {
                    warn!(%account_id, closing_date = %slice.closing_date, "Closing balance has no bank balance to reconcile against");
                }
                Ok(slice.bank_account_closing_balance)
            }
        }
    }

    async fn current_running_balance(&self, account_id: LedgerAccountId) -> Result<Decimal, BalanceError> {
        let balance = self.store.find_running_balance(account_id).await?;
        Ok(balance.map_or(Decimal::ZERO, |b| b.running_balance))
    }
}

async fn apply_running(
    session: &mut dyn AccountSession,
    posting: &Posting,
    delta: Decimal,
    reset_opening: bool,
) -> Result<RunningBalance, BalanceError> {
    let account_id = session.account_id();

    let mut balance = match session.find_running_balance(account_id).await? {
        Some(existing) => existing.next_entry(delta),
        None => {
            info!(%account_id, opening_balance = %delta, "Opening running balance");
            RunningBalance::first_entry(account_id, delta, posting.created_by, Utc::now())
        }
    };

    if reset_opening {
        balance.reset_opening();
    }

    session.save_running_balance(balance).await
}

async fn apply_closing(
    session: &mut dyn AccountSession,
    posting: &Posting,
    delta: &SliceDelta,
) -> Result<SeriesChange, BalanceError> {
    let account_id = session.account_id();
    let date = posting.effective_date();

    let baseline = session
        .find_closing_balance_slice_at_or_before(account_id, date)
        .await?;
    let later = session.find_closing_balance_slices_after(account_id, date).await?;

    let mut series = ClosingBalanceSeries::new(baseline.into_iter().chain(later).collect());
    let origin = SliceOrigin {
        account_id,
        chart_of_account_code: posting.account.chart_of_account_code.clone(),
        created_by: posting.created_by,
        now: Utc::now(),
    };
    let change = series.apply(date, delta, &origin);

    session
        .save_closing_balance_slices(change.touched.clone())
        .await?;

    if change.propagated() > 0 {
        info!(
            %account_id,
            %date,
            slices = change.propagated(),
            "Backdated posting carried into later closing balances"
        );
    }

    Ok(change)
}

fn log_conflict(account_id: LedgerAccountId, err: &BalanceError) {
    if err.is_retryable() {
        warn!(%account_id, code = err.error_code(), error = %err, "Balance update conflict");
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
