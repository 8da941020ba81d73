//! `SeaORM` entity definitions.

pub mod closing_balance_slices;
pub mod running_balances;
pub mod sea_orm_active_enums;
