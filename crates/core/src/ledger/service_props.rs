//! Property-based tests for BalanceService.
//!
//! - Running balance equals the sum of signed deltas
//! - Reversal round trip restores the running balance
//! - First posting sets opening and running balance

use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::BalanceConfig;
use tally_shared::types::{LedgerAccountId, PostingId, UserId};

use super::delta::signed_delta;
use super::entry::{Amount, LedgerAccount, Posting, PostingSource};
use super::memory::InMemoryBalanceStore;
use super::service::BalanceService;
use super::store::BalanceReader;

/// Strategy to generate positive amounts (0.01 to 10,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate a credit or debit amount.
fn amount() -> impl Strategy<Value = Amount> {
    (any::<bool>(), positive_amount()).prop_map(|(is_credit, magnitude)| {
        if is_credit {
            Amount::credit(magnitude)
        } else {
            Amount::debit(magnitude)
        }
    })
}

fn posting(account: &LedgerAccount, amount: Amount, day: u32) -> Posting {
    let date = NaiveDate::from_ymd_opt(2026, 1, day).unwrap();
    Posting {
        id: PostingId::new(),
        account: account.clone(),
        amount: Some(amount),
        exchange_rate: Decimal::ONE,
        deleted: false,
        transaction_date: None,
        journal_date: date,
        created_by: UserId::new(),
        source: PostingSource::JournalLine,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn service() -> BalanceService<InMemoryBalanceStore> {
    BalanceService::new(Arc::new(InMemoryBalanceStore::default()), BalanceConfig::default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property 1: Running balance equals sum of deltas.
    ///
    /// *For any* sequence of credits and debits on a fresh account, the
    /// final running balance SHALL equal the sum of their signed deltas.
    #[test]
    fn prop_running_balance_is_sum_of_deltas(
        amounts in prop::collection::vec((amount(), 1u32..=28), 1..20),
    ) {
        let account = LedgerAccount::new(LedgerAccountId::new(), "1100", "Cash");
        let postings: Vec<Posting> = amounts
            .iter()
            .map(|(amount, day)| posting(&account, *amount, *day))
            .collect();
        let expected: Decimal = postings.iter().map(signed_delta).sum();

        let service = service();
        let last = runtime().block_on(async {
            let mut last = None;
            for p in &postings {
                last = service.update_running_balance(Some(p)).await.unwrap();
            }
            last
        });

        prop_assert_eq!(last, Some(expected));

        let closing = runtime().block_on(service.get_last_closing_balance_by_date(account.id)).unwrap();
        prop_assert_eq!(closing.map(|s| s.closing_balance), Some(expected));
    }

    /// Property 2: Reversal round trip.
    ///
    /// *For any* starting balance and posting, applying the posting and
    /// then its deleted copy SHALL restore the running balance exactly.
    #[test]
    fn prop_reversal_restores_balance(
        opening in amount(),
        movement in amount(),
        day in 1u32..=28,
    ) {
        let account = LedgerAccount::new(LedgerAccountId::new(), "1100", "Cash");
        let service = service();

        let (before, after) = runtime().block_on(async {
            let before = service
                .update_running_balance(Some(&posting(&account, opening, 1)))
                .await
                .unwrap();
            let line = posting(&account, movement, day);
            service.update_running_balance(Some(&line)).await.unwrap();
            let after = service
                .update_running_balance(Some(&line.as_deleted()))
                .await
                .unwrap();
            (before, after)
        });

        prop_assert_eq!(before, after);
    }

    /// Property 3: First posting opens the balance.
    ///
    /// *For any* first posting, opening and running balance SHALL both
    /// equal its signed delta.
    #[test]
    fn prop_first_posting_sets_opening(first in amount()) {
        let account = LedgerAccount::new(LedgerAccountId::new(), "1100", "Cash");
        let line = posting(&account, first, 1);
        let service = service();

        let row = runtime().block_on(async {
            service.update_running_balance(Some(&line)).await.unwrap();
            service.store().find_running_balance(account.id).await.unwrap()
        });

        let row = row.unwrap();
        prop_assert_eq!(row.running_balance, signed_delta(&line));
        prop_assert_eq!(row.opening_balance, signed_delta(&line));
    }
}
