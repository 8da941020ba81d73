//! Property-based tests for the closing balance series.
//!
//! - Series equals the brute-force cumulative sum for any posting order
//! - Opening balance of each slice equals the previous slice's closing
//! - Reversing every posting returns every slice to zero

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{LedgerAccountId, UserId};

use super::closing::{ClosingBalanceSeries, SliceOrigin};
use super::delta::SliceDelta;

/// Strategy to generate a signed delta (-1,000.00 to 1,000.00).
fn delta() -> impl Strategy<Value = Decimal> {
    (-100_000i64..100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate postings as (day offset, delta) pairs.
fn postings(max_len: usize) -> impl Strategy<Value = Vec<(u32, Decimal)>> {
    prop::collection::vec((0u32..60, delta()), 1..=max_len)
}

fn date(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Days::new(u64::from(offset))
}

fn origin() -> SliceOrigin {
    SliceOrigin {
        account_id: LedgerAccountId::new(),
        chart_of_account_code: None,
        created_by: UserId::new(),
        now: Utc::now(),
    }
}

fn apply_all(postings: &[(u32, Decimal)]) -> ClosingBalanceSeries {
    let origin = origin();
    let mut series = ClosingBalanceSeries::default();
    for (offset, delta) in postings {
        series.apply(date(*offset), &SliceDelta::ledger(*delta), &origin);
    }
    series
}

/// Cumulative sum of every delta dated on or before `day`.
fn brute_force(postings: &[(u32, Decimal)], day: u32) -> Decimal {
    postings
        .iter()
        .filter(|(offset, _)| *offset <= day)
        .map(|(_, delta)| *delta)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property 1: Slice balance equals cumulative sum.
    ///
    /// *For any* postings applied in any order, the closing balance of each
    /// slice SHALL equal the sum of all deltas dated on or before it.
    #[test]
    fn prop_series_matches_cumulative_sum(postings in postings(30)) {
        let series = apply_all(&postings);

        for slice in series.slices() {
            let offset = u32::try_from((slice.closing_date - date(0)).num_days()).unwrap();
            prop_assert_eq!(slice.closing_balance, brute_force(&postings, offset));
        }
    }

    /// Property 2: Posting order does not matter.
    ///
    /// *For any* set of postings, applying them in reverse order SHALL
    /// produce the same closing balances.
    #[test]
    fn prop_order_independent(postings in postings(30)) {
        let forward = apply_all(&postings);
        let reversed: Vec<_> = postings.iter().rev().copied().collect();
        let backward = apply_all(&reversed);

        let balances = |series: &ClosingBalanceSeries| -> Vec<(NaiveDate, Decimal)> {
            series.slices().iter().map(|s| (s.closing_date, s.closing_balance)).collect()
        };
        prop_assert_eq!(balances(&forward), balances(&backward));
    }

    /// Property 3: Slices chain.
    ///
    /// *For any* series, each slice's opening balance SHALL equal the
    /// previous slice's closing balance, and the first opens at zero.
    #[test]
    fn prop_opening_equals_previous_closing(postings in postings(30)) {
        let series = apply_all(&postings);
        let slices = series.slices();

        prop_assert_eq!(slices[0].opening_balance, Decimal::ZERO);
        for pair in slices.windows(2) {
            prop_assert_eq!(pair[1].opening_balance, pair[0].closing_balance);
        }
    }

    /// Property 4: Reversal round trip.
    ///
    /// *For any* postings, applying the negation of each SHALL return every
    /// slice to zero.
    #[test]
    fn prop_reversal_returns_to_zero(postings in postings(20)) {
        let mut all = postings.clone();
        all.extend(postings.iter().map(|(offset, delta)| (*offset, -*delta)));
        let series = apply_all(&all);

        for slice in series.slices() {
            prop_assert_eq!(slice.closing_balance, Decimal::ZERO);
        }
    }

    /// Property 5: Dates stay strictly ordered and unique.
    #[test]
    fn prop_dates_strictly_increasing(postings in postings(30)) {
        let series = apply_all(&postings);
        for pair in series.slices().windows(2) {
            prop_assert!(pair[0].closing_date < pair[1].closing_date);
        }
    }
}
