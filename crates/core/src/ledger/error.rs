//! Ledger balance error types.
//!
//! This module defines all errors that can occur while applying postings
//! to running balances and closing balance series: input errors raised
//! before any state is touched, concurrency conflicts raised by the
//! per-account write lock, and storage errors passed through unchanged.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::AppError;
use tally_shared::types::{LedgerAccountId, PostingId};
use thiserror::Error;

/// Errors that can occur during balance maintenance.
#[derive(Debug, Error)]
pub enum BalanceError {
    // ========== Input Errors ==========
    /// Both the credit and the debit column carry a non-zero amount.
    #[error("Posting {posting_id} carries both a credit ({credit}) and a debit ({debit})")]
    AmbiguousAmount {
        /// The offending posting.
        posting_id: PostingId,
        /// Credit column value.
        credit: Decimal,
        /// Debit column value.
        debit: Decimal,
    },

    /// Amount columns hold magnitudes; the sign comes from the side.
    #[error("Posting {0} has a negative amount")]
    NegativeAmount(PostingId),

    /// Amount has more decimal places than a stored balance keeps.
    #[error("Posting {posting_id} amount {amount} exceeds {scale} decimal places")]
    ExcessivePrecision {
        /// The offending posting.
        posting_id: PostingId,
        /// Amount as supplied.
        amount: Decimal,
        /// Decimal places allowed.
        scale: u32,
    },

    /// A bank amount cannot be derived with this exchange rate.
    #[error("Posting {posting_id} has unusable exchange rate {rate}")]
    InvalidExchangeRate {
        /// The offending posting.
        posting_id: PostingId,
        /// The exchange rate supplied.
        rate: Decimal,
    },

    /// Report range is inverted.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date.
        start: NaiveDate,
        /// End date.
        end: NaiveDate,
    },

    /// A session was asked to write rows of another account.
    #[error("Session for account {locked} cannot write rows of account {requested}")]
    AccountMismatch {
        /// Account the session holds the lock for.
        locked: LedgerAccountId,
        /// Account of the rejected row.
        requested: LedgerAccountId,
    },

    // ========== Concurrency Errors ==========
    /// The per-account lock could not be acquired, or a concurrent writer
    /// created the same row first.
    #[error("Concurrent modification detected for account {0}, please retry")]
    ConcurrentModification(LedgerAccountId),

    /// Optimistic version check failed.
    #[error("Balance version mismatch for account {account_id}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The account ID.
        account_id: LedgerAccountId,
        /// The version the writer read.
        expected: i64,
        /// The version found in the store.
        actual: i64,
    },

    // ========== Storage Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BalanceError {
    /// Returns the error code for logs and API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AmbiguousAmount { .. } => "AMBIGUOUS_AMOUNT",
            Self::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            Self::ExcessivePrecision { .. } => "EXCESSIVE_PRECISION",
            Self::InvalidExchangeRate { .. } => "INVALID_EXCHANGE_RATE",
            Self::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            Self::AccountMismatch { .. } => "ACCOUNT_MISMATCH",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::VersionMismatch { .. } => "BALANCE_VERSION_MISMATCH",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification(_) | Self::VersionMismatch { .. }
        )
    }
}

impl From<BalanceError> for AppError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::AmbiguousAmount { .. }
            | BalanceError::NegativeAmount(_)
            | BalanceError::ExcessivePrecision { .. }
            | BalanceError::InvalidExchangeRate { .. }
            | BalanceError::InvalidDateRange { .. } => Self::Validation(err.to_string()),
            BalanceError::ConcurrentModification(_) | BalanceError::VersionMismatch { .. } => {
                Self::Conflict(err.to_string())
            }
            BalanceError::Database(msg) => Self::Database(msg),
            BalanceError::AccountMismatch { .. } => Self::Internal(err.to_string()),
            BalanceError::Internal(msg) => Self::Internal(msg),
        }
    }
}
