//! Balance tables migration.
//!
//! Creates the running balance table and the closing balance slice table
//! with its per-account date index.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(BALANCES_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r"
DROP TABLE IF EXISTS closing_balance_slices CASCADE;
DROP TABLE IF EXISTS running_balances CASCADE;
DROP TYPE IF EXISTS balance_orientation;
",
        )
        .await?;
        Ok(())
    }
}

const BALANCES_SQL: &str = r"
CREATE TYPE balance_orientation AS ENUM ('debit', 'credit');

-- One row per ledger account, mutated in place by every posting
CREATE TABLE running_balances (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL,
    running_balance NUMERIC(19, 4),
    opening_balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    effective_date TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by UUID NOT NULL,
    version BIGINT NOT NULL DEFAULT 1,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_running_balances_account UNIQUE (account_id),
    CONSTRAINT chk_running_balances_version CHECK (version > 0)
);

-- Closing balance series: one slice per account and date
CREATE TABLE closing_balance_slices (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL,
    chart_of_account_code VARCHAR(64),
    closing_date DATE NOT NULL,
    opening_balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    closing_balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    bank_account_opening_balance NUMERIC(19, 4),
    bank_account_closing_balance NUMERIC(19, 4),
    orientation balance_orientation NOT NULL,
    effective_date TIMESTAMPTZ NOT NULL DEFAULT now(),
    created_by UUID NOT NULL,
    version BIGINT NOT NULL DEFAULT 1,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_closing_balance_slices_account_date UNIQUE (account_id, closing_date),
    CONSTRAINT chk_closing_balance_slices_version CHECK (version > 0)
);

-- Point and range lookups walk an account's series newest first
CREATE INDEX idx_closing_balance_slices_account_date
    ON closing_balance_slices(account_id, closing_date DESC);

-- Reporting by chart-of-account code
CREATE INDEX idx_closing_balance_slices_coa
    ON closing_balance_slices(chart_of_account_code, closing_date DESC)
    WHERE chart_of_account_code IS NOT NULL;
";
