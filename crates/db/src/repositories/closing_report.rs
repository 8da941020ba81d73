//! Reporting queries over closing balance slices.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QueryTrait};
use tally_core::ledger::{BalanceError, ClosingBalanceQuery, ClosingBalanceReports, ClosingBalanceSlice};
use tracing::{debug, instrument};

use crate::entities::closing_balance_slices;

/// Read-only closing balance reports backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgClosingBalanceReports {
    db: DatabaseConnection,
}

impl PgClosingBalanceReports {
    /// Creates a new report repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClosingBalanceReports for PgClosingBalanceReports {
    #[instrument(skip_all, fields(query = %query.describe()))]
    async fn list_closing_balances(
        &self,
        query: &ClosingBalanceQuery,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError> {
        query.validate()?;

        let account_ids = (!query.account_ids.is_empty()).then(|| {
            query
                .account_ids
                .iter()
                .map(|id| id.into_inner())
                .collect::<Vec<_>>()
        });
        let codes = (!query.chart_of_account_codes.is_empty())
            .then(|| query.chart_of_account_codes.clone());

        let models = closing_balance_slices::Entity::find()
            .apply_if(query.from, |q, from| {
                q.filter(closing_balance_slices::Column::ClosingDate.gte(from))
            })
            .apply_if(query.to, |q, to| {
                q.filter(closing_balance_slices::Column::ClosingDate.lte(to))
            })
            .apply_if(account_ids, |q, ids| {
                q.filter(closing_balance_slices::Column::AccountId.is_in(ids))
            })
            .apply_if(codes, |q, codes| {
                q.filter(closing_balance_slices::Column::ChartOfAccountCode.is_in(codes))
            })
            .order_by_desc(closing_balance_slices::Column::ClosingDate)
            .order_by_asc(closing_balance_slices::Column::AccountId)
            .all(&self.db)
            .await
            .map_err(|e| BalanceError::Database(e.to_string()))?;

        debug!(rows = models.len(), "Closing balances listed");
        Ok(models.into_iter().map(ClosingBalanceSlice::from).collect())
    }
}
