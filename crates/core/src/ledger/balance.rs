//! Running balance per ledger account.
//!
//! One row per account, created lazily by the first posting and mutated in
//! place by every later posting or reversal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{LedgerAccountId, RunningBalanceId, UserId};

/// Current cumulative balance of one ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningBalance {
    /// Row ID.
    pub id: RunningBalanceId,
    /// The account ID.
    pub account_id: LedgerAccountId,
    /// Signed cumulative balance.
    pub running_balance: Decimal,
    /// Baseline recorded at creation or at the last opening reset.
    pub opening_balance: Decimal,
    /// Creation time of the row.
    pub effective_date: DateTime<Utc>,
    /// Actor of the posting that created the row.
    pub created_by: UserId,
    /// Store version; 0 until first persisted.
    pub version: i64,
}

impl RunningBalance {
    /// Creates the row for the first posting on an account.
    ///
    /// Opening and running balance both start at the posting's delta.
    #[must_use]
    pub fn first_entry(
        account_id: LedgerAccountId,
        delta: Decimal,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunningBalanceId::new(),
            account_id,
            running_balance: delta,
            opening_balance: delta,
            effective_date: now,
            created_by,
            version: 0,
        }
    }

    /// Applies the next delta to an existing row.
    #[must_use]
    pub fn next_entry(&self, delta: Decimal) -> Self {
        Self {
            running_balance: self.running_balance + delta,
            ..self.clone()
        }
    }

    /// Resets the opening balance to the current running balance.
    ///
    /// Opening balances are recorded non-negative: a negative running
    /// balance stores its absolute value.
    pub fn reset_opening(&mut self) {
        self.opening_balance = self.running_balance.abs();
    }

    /// Returns true once the row has been written to a store.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.version > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn opened(delta: Decimal) -> RunningBalance {
        RunningBalance::first_entry(LedgerAccountId::new(), delta, UserId::new(), Utc::now())
    }

    // ========================================================================
    // Running balance chain properties
    // ========================================================================

    /// Strategy for generating signed deltas (can be positive or negative)
    fn delta_strategy() -> impl Strategy<Value = Decimal> {
        (-100_000i64..100_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// Strategy for generating a sequence of deltas
    fn deltas_strategy(max_len: usize) -> impl Strategy<Value = Vec<Decimal>> {
        prop::collection::vec(delta_strategy(), 1..=max_len)
    }

    fn build_chain(deltas: &[Decimal]) -> RunningBalance {
        let mut current = opened(deltas[0]);
        for delta in deltas.iter().skip(1) {
            current = current.next_entry(*delta);
        }
        current
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// **Final balance equals sum of deltas**
        ///
        /// *For any* sequence of deltas applied to a fresh account, the
        /// running balance SHALL equal their sum.
        #[test]
        fn prop_final_balance_equals_sum_of_deltas(
            deltas in deltas_strategy(20),
        ) {
            let current = build_chain(&deltas);
            let expected: Decimal = deltas.iter().copied().sum();

            prop_assert_eq!(current.running_balance, expected);
        }

        /// **Opening balance is fixed by the first delta**
        ///
        /// *For any* chain without a reset, the opening balance SHALL stay
        /// equal to the first delta.
        #[test]
        fn prop_opening_balance_is_first_delta(
            deltas in deltas_strategy(20),
        ) {
            let current = build_chain(&deltas);
            prop_assert_eq!(current.opening_balance, deltas[0]);
        }

        /// **Reset opening is never negative**
        ///
        /// *For any* chain, resetting the opening SHALL record the absolute
        /// value of the running balance.
        #[test]
        fn prop_reset_opening_is_non_negative(
            deltas in deltas_strategy(20),
        ) {
            let mut current = build_chain(&deltas);
            current.reset_opening();

            prop_assert!(current.opening_balance >= Decimal::ZERO);
            prop_assert_eq!(current.opening_balance, current.running_balance.abs());
        }

        /// **Zero delta preserves balance**
        #[test]
        fn prop_zero_delta_preserves_balance(
            initial in delta_strategy(),
        ) {
            let first = opened(initial);
            let next = first.next_entry(Decimal::ZERO);

            prop_assert_eq!(next.running_balance, first.running_balance);
        }
    }

    // ========================================================================
    // Unit tests for specific examples
    // ========================================================================

    #[test]
    fn test_first_entry_sets_opening_and_running() {
        let rb = opened(dec!(500.00));

        assert_eq!(rb.running_balance, dec!(500.00));
        assert_eq!(rb.opening_balance, dec!(500.00));
        assert_eq!(rb.version, 0);
        assert!(!rb.is_persisted());
    }

    #[rstest]
    #[case::credit(dec!(100.00), dec!(1100.00))]
    #[case::debit(dec!(-200.00), dec!(800.00))]
    #[case::reversed_debit(dec!(100.00), dec!(1100.00))]
    #[case::reversed_credit(dec!(-100.00), dec!(900.00))]
    fn test_next_entry_from_thousand(#[case] delta: Decimal, #[case] expected: Decimal) {
        let rb = opened(dec!(1000.00));
        assert_eq!(rb.next_entry(delta).running_balance, expected);
    }

    #[test]
    fn test_next_entry_keeps_identity() {
        let rb = opened(dec!(10));
        let next = rb.next_entry(dec!(5));

        assert_eq!(next.id, rb.id);
        assert_eq!(next.version, rb.version);
        assert_eq!(next.opening_balance, rb.opening_balance);
    }

    #[test]
    fn test_reset_opening_records_absolute_value() {
        let mut rb = opened(dec!(0)).next_entry(dec!(-1500));
        rb.reset_opening();

        assert_eq!(rb.running_balance, dec!(-1500));
        assert_eq!(rb.opening_balance, dec!(1500));
    }

    #[test]
    fn test_reset_opening_positive() {
        let mut rb = opened(dec!(200)).next_entry(dec!(300));
        rb.reset_opening();

        assert_eq!(rb.opening_balance, dec!(500));
    }
}
