//! `SeaORM` active enums.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tally_core::ledger::Orientation;

/// Side of a closing balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "balance_orientation")]
pub enum BalanceOrientation {
    /// Debit balance.
    #[sea_orm(string_value = "debit")]
    Debit,
    /// Credit balance.
    #[sea_orm(string_value = "credit")]
    Credit,
}

impl From<Orientation> for BalanceOrientation {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Debit => Self::Debit,
            Orientation::Credit => Self::Credit,
        }
    }
}

impl From<BalanceOrientation> for Orientation {
    fn from(orientation: BalanceOrientation) -> Self {
        match orientation {
            BalanceOrientation::Debit => Self::Debit,
            BalanceOrientation::Credit => Self::Credit,
        }
    }
}
