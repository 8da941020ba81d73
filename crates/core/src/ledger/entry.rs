//! Posting domain types.
//!
//! Producers hand over journal lines with two nullable amount columns or
//! bank transactions with an explicit debit/credit flag. Both are
//! normalised into a [`Posting`] whose amount is a single tagged value,
//! so "both sides filled" can no longer reach the balance updaters.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{LedgerAccountId, PostingId, UserId};

use super::error::BalanceError;

/// Side of a movement or of a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Debit side; decreases the signed balance.
    Debit,
    /// Credit side; increases the signed balance.
    Credit,
}

impl Orientation {
    /// Side a signed balance sits on. Zero counts as credit.
    #[must_use]
    pub fn of_balance(balance: Decimal) -> Self {
        if balance.is_sign_negative() && !balance.is_zero() {
            Self::Debit
        } else {
            Self::Credit
        }
    }

    /// Parses the single-letter `D`/`C` flag used by bank feeds.
    #[must_use]
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag.to_ascii_uppercase() {
            'D' => Some(Self::Debit),
            'C' => Some(Self::Credit),
            _ => None,
        }
    }

    /// Single-letter flag for this side.
    #[must_use]
    pub const fn flag(self) -> char {
        match self {
            Self::Debit => 'D',
            Self::Credit => 'C',
        }
    }
}

/// Decimal places kept by stored balances (`NUMERIC(19, 4)`).
pub const AMOUNT_SCALE: u32 = 4;

/// A posting amount: one side and a non-negative magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Which side the amount is posted to.
    pub orientation: Orientation,
    /// Unsigned amount.
    pub magnitude: Decimal,
}

impl Amount {
    /// Credit amount.
    #[must_use]
    pub const fn credit(magnitude: Decimal) -> Self {
        Self {
            orientation: Orientation::Credit,
            magnitude,
        }
    }

    /// Debit amount.
    #[must_use]
    pub const fn debit(magnitude: Decimal) -> Self {
        Self {
            orientation: Orientation::Debit,
            magnitude,
        }
    }

    /// Validates a single-sided amount. Zero is a no-op and yields `None`.
    pub fn new(
        posting_id: PostingId,
        orientation: Orientation,
        magnitude: Decimal,
    ) -> Result<Option<Self>, BalanceError> {
        if magnitude.is_sign_negative() && !magnitude.is_zero() {
            return Err(BalanceError::NegativeAmount(posting_id));
        }
        if magnitude.is_zero() {
            return Ok(None);
        }
        Self {
            orientation,
            magnitude,
        }
        .check_scale(posting_id)
        .map(Some)
    }

    /// Rejects magnitudes with more than [`AMOUNT_SCALE`] significant
    /// decimal places. Trailing zeros do not count.
    pub fn check_scale(self, posting_id: PostingId) -> Result<Self, BalanceError> {
        if self.magnitude.normalize().scale() > AMOUNT_SCALE {
            return Err(BalanceError::ExcessivePrecision {
                posting_id,
                amount: self.magnitude,
                scale: AMOUNT_SCALE,
            });
        }
        Ok(self)
    }

    /// Converts the two nullable amount columns of a journal line.
    ///
    /// A null or zero column is treated as absent. Both absent yields
    /// `None`; both present is rejected.
    pub fn from_columns(
        posting_id: PostingId,
        credit: Option<Decimal>,
        debit: Option<Decimal>,
    ) -> Result<Option<Self>, BalanceError> {
        let credit = credit.filter(|c| !c.is_zero());
        let debit = debit.filter(|d| !d.is_zero());

        match (credit, debit) {
            (Some(credit), Some(debit)) => Err(BalanceError::AmbiguousAmount {
                posting_id,
                credit,
                debit,
            }),
            (Some(credit), None) => Self::new(posting_id, Orientation::Credit, credit),
            (None, Some(debit)) => Self::new(posting_id, Orientation::Debit, debit),
            (None, None) => Ok(None),
        }
    }

    /// Signed contribution: credits positive, debits negative.
    #[must_use]
    pub fn signed(self) -> Decimal {
        match self.orientation {
            Orientation::Credit => self.magnitude,
            Orientation::Debit => -self.magnitude,
        }
    }
}

/// Where a posting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingSource {
    /// A journal line item.
    JournalLine,
    /// A bank statement transaction.
    BankTransaction,
}

/// Ledger account reference data, as far as balance maintenance needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// The account ID.
    pub id: LedgerAccountId,
    /// Account code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Code of the parent chart-of-account entry, if linked.
    pub chart_of_account_code: Option<String>,
    /// Currency of the bank account this ledger account backs, if any.
    pub bank_currency: Option<String>,
}

impl LedgerAccount {
    /// Creates a plain ledger account with no chart link and no bank.
    #[must_use]
    pub fn new(id: LedgerAccountId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            chart_of_account_code: None,
            bank_currency: None,
        }
    }

    /// Links the account to a chart-of-account entry.
    #[must_use]
    pub fn with_chart_of_account(mut self, code: impl Into<String>) -> Self {
        self.chart_of_account_code = Some(code.into());
        self
    }

    /// Marks the account as backing a bank account held in `currency`.
    #[must_use]
    pub fn with_bank_currency(mut self, currency: impl Into<String>) -> Self {
        self.bank_currency = Some(currency.into());
        self
    }

    /// Whether closing balances also track the bank-side balance.
    #[must_use]
    pub fn is_bank_account(&self) -> bool {
        self.bank_currency.is_some()
    }
}

/// A journal line item as the producer stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Line ID.
    pub id: PostingId,
    /// Credit column.
    pub credit_amount: Option<Decimal>,
    /// Debit column.
    pub debit_amount: Option<Decimal>,
    /// Exchange rate multiplier; absent means 1.
    pub exchange_rate: Option<Decimal>,
    /// Logical delete flag.
    pub delete_flag: bool,
    /// Date of the underlying transaction, when known.
    pub transaction_date: Option<NaiveDate>,
    /// Date of the containing journal.
    pub journal_date: NaiveDate,
    /// Actor who created the line.
    pub created_by: UserId,
}

/// A bank statement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Transaction ID.
    pub id: PostingId,
    /// Debit/credit flag of the statement line.
    pub orientation: Orientation,
    /// Amount; absent is treated as zero.
    pub amount: Option<Decimal>,
    /// Exchange rate multiplier; absent means 1.
    pub exchange_rate: Option<Decimal>,
    /// Value date.
    pub transaction_date: NaiveDate,
    /// Logical delete flag.
    pub deleted: bool,
    /// Actor who recorded the transaction.
    pub created_by: UserId,
}

impl BankTransaction {
    /// Normalises the transaction into a posting against `account`.
    pub fn to_posting(&self, account: &LedgerAccount) -> Result<Posting, BalanceError> {
        let amount = Amount::new(
            self.id,
            self.orientation,
            self.amount.unwrap_or(Decimal::ZERO),
        )?;

        Ok(Posting {
            id: self.id,
            account: account.clone(),
            amount,
            exchange_rate: self.exchange_rate.unwrap_or(Decimal::ONE),
            deleted: self.deleted,
            transaction_date: Some(self.transaction_date),
            journal_date: self.transaction_date,
            created_by: self.created_by,
            source: PostingSource::BankTransaction,
        })
    }
}

/// A single movement against one ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Posting ID.
    pub id: PostingId,
    /// Owning ledger account.
    pub account: LedgerAccount,
    /// Amount, `None` when both sides are empty.
    pub amount: Option<Amount>,
    /// Exchange rate multiplier carried through unchanged.
    pub exchange_rate: Decimal,
    /// Logical delete flag; a deleted posting reverses its own effect.
    pub deleted: bool,
    /// Transaction-specific date.
    pub transaction_date: Option<NaiveDate>,
    /// Date of the containing journal.
    pub journal_date: NaiveDate,
    /// Actor recorded on rows this posting creates.
    pub created_by: UserId,
    /// Producer kind.
    pub source: PostingSource,
}

impl Posting {
    /// Normalises a journal line into a posting against `account`.
    pub fn from_journal_line(line: &JournalLine, account: &LedgerAccount) -> Result<Self, BalanceError> {
        let amount = Amount::from_columns(line.id, line.credit_amount, line.debit_amount)?;

        Ok(Self {
            id: line.id,
            account: account.clone(),
            amount,
            exchange_rate: line.exchange_rate.unwrap_or(Decimal::ONE),
            deleted: line.delete_flag,
            transaction_date: line.transaction_date,
            journal_date: line.journal_date,
            created_by: line.created_by,
            source: PostingSource::JournalLine,
        })
    }

    /// Date the posting takes effect: transaction date, else journal date.
    #[must_use]
    pub fn effective_date(&self) -> NaiveDate {
        self.transaction_date.unwrap_or(self.journal_date)
    }

    /// Owning account ID.
    #[must_use]
    pub fn account_id(&self) -> LedgerAccountId {
        self.account.id
    }

    /// True when applying the posting cannot change any balance.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.amount.is_none_or(|amount| amount.magnitude.is_zero())
    }

    /// Copy of this posting with the delete flag set, used to undo it.
    #[must_use]
    pub fn as_deleted(&self) -> Self {
        Self {
            deleted: true,
            ..self.clone()
        }
    }
}
