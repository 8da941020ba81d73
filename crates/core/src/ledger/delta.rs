//! Signed delta and reversal rules.
//!
//! Credits add to a balance, debits subtract, and a deleted posting
//! contributes the exact negation of what it contributed when live.

use rust_decimal::{Decimal, RoundingStrategy};
use tally_shared::BalanceConfig;

use super::entry::{AMOUNT_SCALE, Amount, Posting};
use super::error::BalanceError;

/// Signed contribution of a posting to a balance.
///
/// Credit is positive, debit negative, no amount is zero. The result is
/// negated when the posting carries the delete flag.
#[must_use]
pub fn signed_delta(posting: &Posting) -> Decimal {
    let delta = posting.amount.map_or(Decimal::ZERO, Amount::signed);
    if posting.deleted { -delta } else { delta }
}

/// Delta applied to one closing balance slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceDelta {
    /// Change to the ledger-side balances.
    pub ledger: Decimal,
    /// Change to the bank-side balances, set only for bank-backed accounts.
    pub bank: Option<Decimal>,
}

impl SliceDelta {
    /// Ledger-only delta.
    #[must_use]
    pub const fn ledger(ledger: Decimal) -> Self {
        Self { ledger, bank: None }
    }

    /// Computes the ledger delta and, for bank-backed accounts, the delta in
    /// the bank account's currency.
    ///
    /// Bank accounts held in the base currency move by the ledger delta.
    /// Others move by `delta / exchange_rate`, rounded half away from zero
    /// to the configured scale, capped at [`AMOUNT_SCALE`].
    ///
    /// A posting without amount yields a zero delta whatever its exchange
    /// rate.
    pub fn for_posting(posting: &Posting, config: &BalanceConfig) -> Result<Self, BalanceError> {
        if let Some(amount) = posting.amount {
            amount.check_scale(posting.id)?;
        }

        let ledger = signed_delta(posting);
        if ledger.is_zero() {
            return Ok(Self::ledger(ledger));
        }

        let Some(bank_currency) = posting.account.bank_currency.as_deref() else {
            return Ok(Self::ledger(ledger));
        };

        if bank_currency.eq_ignore_ascii_case(&config.base_currency) {
            return Ok(Self {
                ledger,
                bank: Some(ledger),
            });
        }

        let invalid_rate = || BalanceError::InvalidExchangeRate {
            posting_id: posting.id,
            rate: posting.exchange_rate,
        };

        if posting.exchange_rate <= Decimal::ZERO {
            return Err(invalid_rate());
        }

        let bank = ledger
            .checked_div(posting.exchange_rate)
            .ok_or_else(invalid_rate)?
            .round_dp_with_strategy(
                config.bank_amount_scale.min(AMOUNT_SCALE),
                RoundingStrategy::MidpointAwayFromZero,
            );

        Ok(Self {
            ledger,
            bank: Some(bank),
        })
    }

    /// True when applying this delta changes nothing.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.ledger.is_zero() && self.bank.is_none_or(|bank| bank.is_zero())
    }
}
