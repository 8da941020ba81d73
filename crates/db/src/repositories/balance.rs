//! Postgres-backed balance store.
//!
//! A session wraps one database transaction. Opening it sets a
//! transaction-scoped `lock_timeout` and takes a transaction-scoped
//! advisory lock keyed by the account id, so writers of the same account
//! queue up while writers of other accounts proceed. Updates are
//! additionally guarded by the row `version`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, RuntimeErr,
    Set, SqlErr, Statement, TransactionTrait,
};
use tally_core::ledger::store::ensure_account;
use tally_core::ledger::{
    AccountSession, BalanceError, BalanceReader, BalanceStore, ClosingBalanceSlice, RunningBalance,
    SliceFilter,
};
use tally_shared::types::LedgerAccountId;
use tracing::{debug, warn};

use crate::entities::{closing_balance_slices, running_balances};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps a database error onto the balance error taxonomy.
///
/// Lock timeouts, serialization failures, deadlocks and unique violations
/// mean another writer got there first and are reported as retryable
/// conflicts. Everything else passes through as a database error.
pub fn map_db_err(account_id: LedgerAccountId, err: &DbErr) -> BalanceError {
    if is_conflict(err) {
        warn!(%account_id, error = %err, "Concurrent writer detected");
        BalanceError::ConcurrentModification(account_id)
    } else {
        BalanceError::Database(err.to_string())
    }
}

fn is_conflict(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }

    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db_err))) => matches!(
            db_err.code().as_deref(),
            Some(LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// The guarded update matched no row: the stored version moved on, or the
/// row was replaced under a different id.
fn version_mismatch(account_id: LedgerAccountId, expected: i64, actual: i64) -> BalanceError {
    warn!(%account_id, expected, actual, "Stale balance row");
    BalanceError::VersionMismatch {
        account_id,
        expected,
        actual,
    }
}

// ========== Queries shared by store and session ==========

async fn find_running<C: ConnectionTrait>(
    conn: &C,
    account_id: LedgerAccountId,
) -> Result<Option<RunningBalance>, BalanceError> {
    let model = running_balances::Entity::find()
        .filter(running_balances::Column::AccountId.eq(account_id.into_inner()))
        .one(conn)
        .await
        .map_err(|e| map_db_err(account_id, &e))?;

    Ok(model.map(RunningBalance::from))
}

async fn find_slices<C: ConnectionTrait>(
    conn: &C,
    account_id: LedgerAccountId,
    filter: &SliceFilter,
) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
    let models = closing_balance_slices::Entity::find()
        .filter(closing_balance_slices::Column::AccountId.eq(account_id.into_inner()))
        .apply_if(filter.from, |q, from| {
            q.filter(closing_balance_slices::Column::ClosingDate.gte(from))
        })
        .apply_if(filter.to, |q, to| {
            q.filter(closing_balance_slices::Column::ClosingDate.lte(to))
        })
        .order_by_asc(closing_balance_slices::Column::ClosingDate)
        .limit(filter.limit)
        .all(conn)
        .await
        .map_err(|e| map_db_err(account_id, &e))?;

    Ok(models.into_iter().map(ClosingBalanceSlice::from).collect())
}

async fn find_at_or_before<C: ConnectionTrait>(
    conn: &C,
    account_id: LedgerAccountId,
    date: NaiveDate,
) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
    let model = closing_balance_slices::Entity::find()
        .filter(closing_balance_slices::Column::AccountId.eq(account_id.into_inner()))
        .filter(closing_balance_slices::Column::ClosingDate.lte(date))
        .order_by_desc(closing_balance_slices::Column::ClosingDate)
        .one(conn)
        .await
        .map_err(|e| map_db_err(account_id, &e))?;

    Ok(model.map(ClosingBalanceSlice::from))
}

async fn find_after<C: ConnectionTrait>(
    conn: &C,
    account_id: LedgerAccountId,
    date: NaiveDate,
) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
    let models = closing_balance_slices::Entity::find()
        .filter(closing_balance_slices::Column::AccountId.eq(account_id.into_inner()))
        .filter(closing_balance_slices::Column::ClosingDate.gt(date))
        .order_by_asc(closing_balance_slices::Column::ClosingDate)
        .all(conn)
        .await
        .map_err(|e| map_db_err(account_id, &e))?;

    Ok(models.into_iter().map(ClosingBalanceSlice::from).collect())
}

// ========== Store ==========

/// Balance store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgBalanceStore {
    /// Creates a new store. Writers wait at most `lock_timeout` for the
    /// account lock.
    #[must_use]
    pub const fn new(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }
}

#[async_trait]
impl BalanceReader for PgBalanceStore {
    async fn find_running_balance(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<RunningBalance>, BalanceError> {
        find_running(&self.db, account_id).await
    }

    async fn find_closing_balance_slices(
        &self,
        account_id: LedgerAccountId,
        filter: &SliceFilter,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        find_slices(&self.db, account_id, filter).await
    }

    async fn find_closing_balance_slice_at_or_before(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        find_at_or_before(&self.db, account_id, date).await
    }

    async fn find_closing_balance_slices_after(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        find_after(&self.db, account_id, date).await
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    async fn begin(&self, account_id: LedgerAccountId) -> Result<Box<dyn AccountSession>, BalanceError> {
        let session = PgAccountSession::open(&self.db, account_id, self.lock_timeout).await?;
        Ok(Box::new(session))
    }
}

// ========== Session ==========

/// Write session holding the advisory lock of one account.
///
/// Dropping the session without committing rolls the transaction back and
/// releases the lock.
pub struct PgAccountSession {
    account_id: LedgerAccountId,
    txn: DatabaseTransaction,
}

impl PgAccountSession {
    /// Begins a transaction and takes the account's advisory lock.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::ConcurrentModification`] if the lock is not
    /// granted within `lock_timeout`.
    pub async fn open(
        db: &DatabaseConnection,
        account_id: LedgerAccountId,
        lock_timeout: Duration,
    ) -> Result<Self, BalanceError> {
        let map = |e: DbErr| map_db_err(account_id, &e);
        let txn = db.begin().await.map_err(map)?;

        // SET LOCAL does not accept bind parameters; the value is numeric.
        let sql = format!("SET LOCAL lock_timeout = '{}ms'", lock_timeout.as_millis());
        txn.execute_unprepared(&sql).await.map_err(map)?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
            [account_id.to_string().into()],
        ))
        .await
        .map_err(map)?;

        debug!(%account_id, "Account lock acquired");
        Ok(Self { account_id, txn })
    }

    async fn insert_running(&self, balance: &RunningBalance) -> Result<(), DbErr> {
        running_balances::ActiveModel {
            id: Set(balance.id.into_inner()),
            account_id: Set(balance.account_id.into_inner()),
            running_balance: Set(Some(balance.running_balance)),
            opening_balance: Set(balance.opening_balance),
            effective_date: Set(balance.effective_date.into()),
            created_by: Set(balance.created_by.into_inner()),
            version: Set(1),
            updated_at: Set(Utc::now().into()),
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }

    async fn update_running(&self, balance: &RunningBalance) -> Result<u64, DbErr> {
        let result = running_balances::Entity::update_many()
            .set(running_balances::ActiveModel {
                running_balance: Set(Some(balance.running_balance)),
                opening_balance: Set(balance.opening_balance),
                version: Set(balance.version + 1),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            })
            .filter(running_balances::Column::Id.eq(balance.id.into_inner()))
            .filter(running_balances::Column::Version.eq(balance.version))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert_slice(&self, slice: &ClosingBalanceSlice) -> Result<(), DbErr> {
        closing_balance_slices::ActiveModel {
            id: Set(slice.id.into_inner()),
            account_id: Set(slice.account_id.into_inner()),
            chart_of_account_code: Set(slice.chart_of_account_code.clone()),
            closing_date: Set(slice.closing_date),
            opening_balance: Set(slice.opening_balance),
            closing_balance: Set(slice.closing_balance),
            bank_account_opening_balance: Set(slice.bank_account_opening_balance),
            bank_account_closing_balance: Set(slice.bank_account_closing_balance),
            orientation: Set(slice.orientation.into()),
            effective_date: Set(slice.effective_date.into()),
            created_by: Set(slice.created_by.into_inner()),
            version: Set(1),
            updated_at: Set(Utc::now().into()),
        }
        .insert(&self.txn)
        .await?;
        Ok(())
    }

    async fn update_slice(&self, slice: &ClosingBalanceSlice) -> Result<u64, DbErr> {
        let result = closing_balance_slices::Entity::update_many()
            .set(closing_balance_slices::ActiveModel {
                opening_balance: Set(slice.opening_balance),
                closing_balance: Set(slice.closing_balance),
                bank_account_opening_balance: Set(slice.bank_account_opening_balance),
                bank_account_closing_balance: Set(slice.bank_account_closing_balance),
                orientation: Set(slice.orientation.into()),
                version: Set(slice.version + 1),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            })
            .filter(closing_balance_slices::Column::Id.eq(slice.id.into_inner()))
            .filter(closing_balance_slices::Column::Version.eq(slice.version))
            .exec(&self.txn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn stored_running_version(&self) -> Result<i64, BalanceError> {
        let row = find_running(&self.txn, self.account_id).await?;
        Ok(row.map_or(0, |r| r.version))
    }

    async fn stored_slice_version(&self, closing_date: NaiveDate) -> Result<i64, BalanceError> {
        let row = find_at_or_before(&self.txn, self.account_id, closing_date).await?;
        Ok(row
            .filter(|s| s.closing_date == closing_date)
            .map_or(0, |s| s.version))
    }
}

#[async_trait]
impl BalanceReader for PgAccountSession {
    async fn find_running_balance(
        &self,
        account_id: LedgerAccountId,
    ) -> Result<Option<RunningBalance>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        find_running(&self.txn, account_id).await
    }

    async fn find_closing_balance_slices(
        &self,
        account_id: LedgerAccountId,
        filter: &SliceFilter,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        find_slices(&self.txn, account_id, filter).await
    }

    async fn find_closing_balance_slice_at_or_before(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Option<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        find_at_or_before(&self.txn, account_id, date).await
    }

    async fn find_closing_balance_slices_after(
        &self,
        account_id: LedgerAccountId,
        date: NaiveDate,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        ensure_account(self.account_id, account_id)?;
        find_after(&self.txn, account_id, date).await
    }
}

#[async_trait]
impl AccountSession for PgAccountSession {
    fn account_id(&self) -> LedgerAccountId {
        self.account_id
    }

    async fn save_running_balance(
        &mut self,
        mut balance: RunningBalance,
    ) -> Result<RunningBalance, BalanceError> {
        ensure_account(self.account_id, balance.account_id)?;
        let map = |e: DbErr| map_db_err(self.account_id, &e);

        if balance.version == 0 {
            self.insert_running(&balance).await.map_err(map)?;
        } else if self.update_running(&balance).await.map_err(map)? == 0 {
            let actual = self.stored_running_version().await?;
            return Err(version_mismatch(self.account_id, balance.version, actual));
        }

        balance.version += 1;
        Ok(balance)
    }

    async fn save_closing_balance_slices(
        &mut self,
        slices: Vec<ClosingBalanceSlice>,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        let map = |e: DbErr| map_db_err(self.account_id, &e);
        let mut saved = Vec::with_capacity(slices.len());

        for mut slice in slices {
            ensure_account(self.account_id, slice.account_id)?;

            if slice.version == 0 {
                self.insert_slice(&slice).await.map_err(map)?;
            } else if self.update_slice(&slice).await.map_err(map)? == 0 {
                let actual = self.stored_slice_version(slice.closing_date).await?;
                return Err(version_mismatch(self.account_id, slice.version, actual));
            }

            slice.version += 1;
            saved.push(slice);
        }

        Ok(saved)
    }

    async fn commit(self: Box<Self>) -> Result<(), BalanceError> {
        let account_id = self.account_id;
        self.txn
            .commit()
            .await
            .map_err(|e| map_db_err(account_id, &e))
    }
}
