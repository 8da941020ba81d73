//! Read-only reporting queries over closing balance slices.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use tally_shared::types::LedgerAccountId;

use super::closing::ClosingBalanceSlice;
use super::error::BalanceError;

/// Filter for reporting queries. Empty sets mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosingBalanceQuery {
    /// Inclusive lower bound on the closing date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the closing date.
    pub to: Option<NaiveDate>,
    /// Restrict to these accounts.
    pub account_ids: Vec<LedgerAccountId>,
    /// Restrict to these chart-of-account codes.
    pub chart_of_account_codes: Vec<String>,
}

impl ClosingBalanceQuery {
    /// Query bounded by a date range.
    #[must_use]
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    /// Query covering one calendar month. `None` for an invalid month.
    #[must_use]
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self::between(from, next.pred_opt()?))
    }

    /// Restricts the query to the given accounts.
    #[must_use]
    pub fn with_accounts(mut self, account_ids: impl IntoIterator<Item = LedgerAccountId>) -> Self {
        self.account_ids.extend(account_ids);
        self
    }

    /// Restricts the query to the given chart-of-account codes.
    #[must_use]
    pub fn with_chart_of_account_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chart_of_account_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Rejects inverted date ranges.
    pub fn validate(&self) -> Result<(), BalanceError> {
        match (self.from, self.to) {
            (Some(start), Some(end)) if start > end => {
                Err(BalanceError::InvalidDateRange { start, end })
            }
            _ => Ok(()),
        }
    }

    /// Whether a slice satisfies every filter of the query.
    #[must_use]
    pub fn matches(&self, slice: &ClosingBalanceSlice) -> bool {
        self.from.is_none_or(|from| slice.closing_date >= from)
            && self.to.is_none_or(|to| slice.closing_date <= to)
            && (self.account_ids.is_empty() || self.account_ids.contains(&slice.account_id))
            && (self.chart_of_account_codes.is_empty()
                || slice
                    .chart_of_account_code
                    .as_ref()
                    .is_some_and(|code| self.chart_of_account_codes.contains(code)))
    }

    /// Label used in logs.
    #[must_use]
    pub fn describe(&self) -> String {
        let bound = |date: Option<NaiveDate>| date.map_or_else(|| "..".to_string(), |d| d.to_string());
        format!(
            "{}..={} accounts={} codes={}",
            bound(self.from),
            bound(self.to),
            self.account_ids.len(),
            self.chart_of_account_codes.len()
        )
    }
}

/// Combined closing balance of the latest slice per account.
#[must_use]
pub fn sum_latest_per_account<'a, I>(slices: I) -> Decimal
where
    I: IntoIterator<Item = &'a ClosingBalanceSlice>,
{
    let mut latest: HashMap<LedgerAccountId, &ClosingBalanceSlice> = HashMap::new();
    for slice in slices {
        latest
            .entry(slice.account_id)
            .and_modify(|current| {
                if slice.closing_date > current.closing_date {
                    *current = slice;
                }
            })
            .or_insert(slice);
    }
    latest.values().map(|slice| slice.closing_balance).sum()
}

/// Orders slices newest first, then by account for a stable listing.
pub fn sort_newest_first(slices: &mut [ClosingBalanceSlice]) {
    slices.sort_by(|a, b| {
        b.closing_date
            .cmp(&a.closing_date)
            .then_with(|| a.account_id.cmp(&b.account_id))
    });
}

/// Month label `YYYY-MM` of a date, used by monthly report output.
#[must_use]
pub fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Read-only queries consumed by reporting.
#[async_trait]
pub trait ClosingBalanceReports: Send + Sync {
    /// Matching slices, newest first.
    async fn list_closing_balances(
        &self,
        query: &ClosingBalanceQuery,
    ) -> Result<Vec<ClosingBalanceSlice>, BalanceError>;

    /// Sum over matching accounts of their latest matching closing balance.
    ///
    /// This is the combined balance at the end of the range, not a plain
    /// `SUM` over every matching slice: an account with several slices in
    /// the range contributes only its latest one.
    async fn sum_closing_balances(&self, query: &ClosingBalanceQuery) -> Result<Decimal, BalanceError> {
        let slices = self.list_closing_balances(query).await?;
        Ok(sum_latest_per_account(&slices))
    }
}
