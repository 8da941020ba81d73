//! Closing balance slices and the per-account series.
//!
//! A series is the ordered set of slices of one ledger account keyed by
//! closing date. Applying a posting finds the insertion point with a
//! binary search, creates or updates the slice at the posting's date, and
//! carries the same delta into every later slice. Each slice's opening
//! balance stays equal to its predecessor's closing balance.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{ClosingBalanceId, LedgerAccountId, UserId};

use super::delta::SliceDelta;
use super::entry::Orientation;

/// Balance snapshot of one ledger account as of one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingBalanceSlice {
    /// Row ID.
    pub id: ClosingBalanceId,
    /// The account ID.
    pub account_id: LedgerAccountId,
    /// Chart-of-account code of the account when the slice was created.
    pub chart_of_account_code: Option<String>,
    /// Date the slice closes.
    pub closing_date: NaiveDate,
    /// Closing balance of the previous slice.
    pub opening_balance: Decimal,
    /// Cumulative balance as of `closing_date`.
    pub closing_balance: Decimal,
    /// Bank-side opening balance, bank-backed accounts only.
    pub bank_account_opening_balance: Option<Decimal>,
    /// Bank-side closing balance, used for reconciliation matching.
    pub bank_account_closing_balance: Option<Decimal>,
    /// Side of `closing_balance`.
    pub orientation: Orientation,
    /// Creation time of the row.
    pub effective_date: DateTime<Utc>,
    /// Actor of the posting that created the row.
    pub created_by: UserId,
    /// Store version; 0 until first persisted.
    pub version: i64,
}

impl ClosingBalanceSlice {
    fn add(&mut self, delta: &SliceDelta, include_opening: bool) {
        self.closing_balance += delta.ledger;
        if include_opening {
            self.opening_balance += delta.ledger;
        }

        if let Some(bank) = delta.bank {
            self.bank_account_closing_balance =
                Some(self.bank_account_closing_balance.unwrap_or_default() + bank);
            if include_opening {
                self.bank_account_opening_balance =
                    Some(self.bank_account_opening_balance.unwrap_or_default() + bank);
            }
        }

        self.orientation = Orientation::of_balance(self.closing_balance);
    }
}

/// Attributes stamped on slices a posting creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceOrigin {
    /// Owning account.
    pub account_id: LedgerAccountId,
    /// Chart-of-account code of the account.
    pub chart_of_account_code: Option<String>,
    /// Actor of the posting.
    pub created_by: UserId,
    /// Creation time for new rows.
    pub now: DateTime<Utc>,
}

/// Outcome of applying one delta to a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesChange {
    /// Every slice whose values changed, in date order, starting with the
    /// slice at the posting's date.
    pub touched: Vec<ClosingBalanceSlice>,
    /// Closing balance at the posting's date after the change.
    pub closing_balance: Decimal,
    /// True when the slice at the posting's date was created.
    pub created: bool,
}

impl SeriesChange {
    /// Number of slices after the posting's date that were carried forward.
    #[must_use]
    pub fn propagated(&self) -> usize {
        self.touched.len().saturating_sub(1)
    }
}

/// Ordered closing balance slices of one ledger account.
///
/// The series may hold only a window of the account's history, as long
/// as it starts at or before the date being changed and runs to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosingBalanceSeries {
    slices: Vec<ClosingBalanceSlice>,
}

impl ClosingBalanceSeries {
    /// Builds a series, ordering the slices by closing date.
    #[must_use]
    pub fn new(mut slices: Vec<ClosingBalanceSlice>) -> Self {
        slices.sort_by_key(|slice| slice.closing_date);
        Self { slices }
    }

    /// Slices in date order.
    #[must_use]
    pub fn slices(&self) -> &[ClosingBalanceSlice] {
        &self.slices
    }

    /// Consumes the series, returning the slices in date order.
    #[must_use]
    pub fn into_slices(self) -> Vec<ClosingBalanceSlice> {
        self.slices
    }

    /// Number of slices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// True when the series has no slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Earliest slice.
    #[must_use]
    pub fn first(&self) -> Option<&ClosingBalanceSlice> {
        self.slices.first()
    }

    /// Most recent slice.
    #[must_use]
    pub fn last(&self) -> Option<&ClosingBalanceSlice> {
        self.slices.last()
    }

    /// Slice effective at `date`: the latest one closing on or before it.
    #[must_use]
    pub fn at_or_before(&self, date: NaiveDate) -> Option<&ClosingBalanceSlice> {
        let idx = self.slices.partition_point(|slice| slice.closing_date <= date);
        idx.checked_sub(1).map(|i| &self.slices[i])
    }

    /// Slices closing strictly after `date`.
    #[must_use]
    pub fn after(&self, date: NaiveDate) -> &[ClosingBalanceSlice] {
        let idx = self.slices.partition_point(|slice| slice.closing_date <= date);
        &self.slices[idx..]
    }

    /// Applies a delta effective on `date`.
    ///
    /// The slice at `date` is updated, or created from the latest earlier
    /// slice (zero when there is none). Every later slice has the delta
    /// added to both its opening and closing balance.
    pub fn apply(&mut self, date: NaiveDate, delta: &SliceDelta, origin: &SliceOrigin) -> SeriesChange {
        let idx = self.slices.partition_point(|slice| slice.closing_date < date);
        let exists = self
            .slices
            .get(idx)
            .is_some_and(|slice| slice.closing_date == date);

        if !exists {
            let baseline = idx.checked_sub(1).map(|i| &self.slices[i]);
            let opening = baseline.map_or(Decimal::ZERO, |slice| slice.closing_balance);
            let bank_opening = match baseline.and_then(|slice| slice.bank_account_closing_balance) {
                Some(bank) => Some(bank),
                None if delta.bank.is_some() => Some(Decimal::ZERO),
                None => None,
            };

            let slice = ClosingBalanceSlice {
                id: ClosingBalanceId::new(),
                account_id: origin.account_id,
                chart_of_account_code: origin.chart_of_account_code.clone(),
                closing_date: date,
                opening_balance: opening,
                closing_balance: opening,
                bank_account_opening_balance: bank_opening,
                bank_account_closing_balance: bank_opening,
                orientation: Orientation::of_balance(opening),
                effective_date: origin.now,
                created_by: origin.created_by,
                version: 0,
            };
            self.slices.insert(idx, slice);
        }

        self.slices[idx].add(delta, false);
        for slice in &mut self.slices[idx + 1..] {
            slice.add(delta, true);
        }

        SeriesChange {
            touched: self.slices[idx..].to_vec(),
            closing_balance: self.slices[idx].closing_balance,
            created: !exists,
        }
    }
}
