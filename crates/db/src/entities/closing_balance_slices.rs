//! `SeaORM` Entity for closing_balance_slices table.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tally_core::ledger::ClosingBalanceSlice;
use tally_shared::types::{ClosingBalanceId, LedgerAccountId, UserId};

use super::sea_orm_active_enums::BalanceOrientation;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "closing_balance_slices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub chart_of_account_code: Option<String>,
    pub closing_date: Date,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub opening_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub closing_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub bank_account_opening_balance: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub bank_account_closing_balance: Option<Decimal>,
    pub orientation: BalanceOrientation,
    pub effective_date: DateTimeWithTimeZone,
    pub created_by: Uuid,
    pub version: i64,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ClosingBalanceSlice {
    fn from(model: Model) -> Self {
        Self {
            id: ClosingBalanceId::from_uuid(model.id),
            account_id: LedgerAccountId::from_uuid(model.account_id),
            chart_of_account_code: model.chart_of_account_code,
            closing_date: model.closing_date,
            opening_balance: model.opening_balance,
            closing_balance: model.closing_balance,
            bank_account_opening_balance: model.bank_account_opening_balance,
            bank_account_closing_balance: model.bank_account_closing_balance,
            orientation: model.orientation.into(),
            effective_date: model.effective_date.with_timezone(&Utc),
            created_by: UserId::from_uuid(model.created_by),
            version: model.version,
        }
    }
}
