//! `SeaORM` Entity for running_balances table.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tally_core::ledger::RunningBalance;
use tally_shared::types::{LedgerAccountId, RunningBalanceId, UserId};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "running_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub account_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub running_balance: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub opening_balance: Decimal,
    pub effective_date: DateTimeWithTimeZone,
    pub created_by: Uuid,
    pub version: i64,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for RunningBalance {
    fn from(model: Model) -> Self {
        Self {
            id: RunningBalanceId::from_uuid(model.id),
            account_id: LedgerAccountId::from_uuid(model.account_id),
            // Rows written by older producers may carry a null balance.
            running_balance: model.running_balance.unwrap_or_default(),
            opening_balance: model.opening_balance,
            effective_date: model.effective_date.with_timezone(&Utc),
            created_by: UserId::from_uuid(model.created_by),
            version: model.version,
        }
    }
}
