//! Ledger balance maintenance.
//!
//! This module implements the balance side of double-entry bookkeeping:
//! - Posting types (journal lines, bank transactions, tagged amounts)
//! - Signed delta and reversal rules
//! - Running balance per ledger account
//! - Closing balance slices with forward propagation of backdated postings
//! - Store contracts with per-account write sessions
//! - In-memory store
//! - Balance service
//! - Read-only reporting queries

pub mod balance;
pub mod closing;
pub mod delta;
pub mod entry;
pub mod error;
pub mod memory;
pub mod reports;
pub mod service;
pub mod store;

#[cfg(test)]
mod closing_props;
#[cfg(test)]
mod service_props;

pub use balance::RunningBalance;
pub use closing::{ClosingBalanceSeries, ClosingBalanceSlice, SeriesChange, SliceOrigin};
pub use delta::{SliceDelta, signed_delta};
pub use entry::{
    AMOUNT_SCALE, Amount, BankTransaction, JournalLine, LedgerAccount, Orientation, Posting, PostingSource,
};
pub use error::BalanceError;
pub use memory::InMemoryBalanceStore;
pub use reports::{
    ClosingBalanceQuery, ClosingBalanceReports, month_label, sort_newest_first, sum_latest_per_account,
};
pub use service::{BalanceService, BalanceUpdate};
pub use store::{AccountSession, BalanceReader, BalanceStore, SliceFilter};
