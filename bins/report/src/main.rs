//! Read-only closing balance reports for Tally.
//!
//! Usage:
//!   tally-report last <ACCOUNT>                  - Latest closing balance slice
//!   tally-report first <ACCOUNT>                 - Earliest closing balance slice
//!   tally-report at <ACCOUNT> <DATE>             - Closing balance effective at a date
//!   tally-report reconcile <ACCOUNT> <DATE>      - Bank closing balance for reconciliation
//!   tally-report list [--from] [--to] [--month] [--account]... [--coa]...
//!   tally-report sum  [--from] [--to] [--month] [--account]... [--coa]...
//!
//! Output is JSON on stdout. Exit codes follow `AppError::exit_code`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tally_core::ledger::{BalanceService, ClosingBalanceQuery, ClosingBalanceReports, month_label};
use tally_db::{PgBalanceStore, PgClosingBalanceReports};
use tally_shared::types::LedgerAccountId;
use tally_shared::{AppConfig, AppError, telemetry};
use tracing::{error, info};

/// Closing balance reports.
#[derive(Parser)]
#[command(name = "tally-report", version)]
#[command(about = "Read-only closing balance reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Most recent closing balance slice of an account.
    Last {
        /// Ledger account id
        account: LedgerAccountId,
    },

    /// Earliest closing balance slice of an account.
    First {
        /// Ledger account id
        account: LedgerAccountId,
    },

    /// Closing balance effective at a date; zero without history.
    At {
        /// Ledger account id
        account: LedgerAccountId,
        /// Date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Bank-side closing balance effective at a date.
    ///
    /// Prints `null` when the slice carries no bank balance.
    Reconcile {
        /// Ledger account id
        account: LedgerAccountId,
        /// Date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Matching closing balance slices, newest first.
    List(QueryArgs),

    /// Combined closing balance of the matching accounts.
    Sum(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// First closing date included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last closing date included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Calendar month (YYYY-MM); overrides --from and --to
    #[arg(long, conflicts_with_all = ["from", "to"])]
    month: Option<String>,

    /// Restrict to these ledger accounts
    #[arg(long = "account")]
    accounts: Vec<LedgerAccountId>,

    /// Restrict to these chart-of-account codes
    #[arg(long = "coa")]
    codes: Vec<String>,
}

impl QueryArgs {
    fn into_query(self) -> Result<ClosingBalanceQuery, AppError> {
        let query = match self.month.as_deref() {
            Some(month) => parse_month(month)?,
            None => ClosingBalanceQuery {
                from: self.from,
                to: self.to,
                ..Default::default()
            },
        };

        let query = query
            .with_accounts(self.accounts)
            .with_chart_of_account_codes(self.codes);
        query.validate()?;
        Ok(query)
    }
}

fn parse_month(value: &str) -> Result<ClosingBalanceQuery, AppError> {
    let invalid = || AppError::Validation(format!("invalid month {value:?}, expected YYYY-MM"));

    let (year, month) = value.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;

    ClosingBalanceQuery::for_month(year, month).ok_or_else(invalid)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let app = err.downcast_ref::<AppError>();
            error!(code = app.map(AppError::error_code), error = %err, "Report failed");
            eprintln!("error: {err:#}");

            let code = app.map_or(1, AppError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load().map_err(AppError::from)?;
    telemetry::init_tracing(&config.logging).context("Failed to initialise tracing")?;

    let db = tally_db::connect(&config.database)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    info!("Connected to database");

    let store = PgBalanceStore::new(db.clone(), config.balance.lock_timeout());
    let service = BalanceService::new(Arc::new(store), config.balance.clone());
    let reports = PgClosingBalanceReports::new(db);

    let output = match cli.command {
        Command::Last { account } => {
            let slice = service
                .get_last_closing_balance_by_date(account)
                .await
                .map_err(AppError::from)?;
            serde_json::to_value(slice)?
        }
        Command::First { account } => {
            let slice = service
                .get_first_closing_balance_by_date(account)
                .await
                .map_err(AppError::from)?;
            serde_json::to_value(slice)?
        }
        Command::At { account, date } => {
            let balance = service
                .closing_balance_at(account, date)
                .await
                .map_err(AppError::from)?;
            json!({ "account_id": account, "date": date, "closing_balance": balance })
        }
        Command::Reconcile { account, date } => {
            let balance = service
                .match_closing_balance_for_reconcile(date, account)
                .await
                .map_err(AppError::from)?;
            json!({ "account_id": account, "date": date, "bank_account_closing_balance": balance })
        }
        Command::List(args) => {
            let query = args.into_query()?;
            let slices = reports
                .list_closing_balances(&query)
                .await
                .map_err(AppError::from)?;
            serde_json::to_value(slices)?
        }
        Command::Sum(args) => {
            let query = args.into_query()?;
            let total = reports
                .sum_closing_balances(&query)
                .await
                .map_err(AppError::from)?;
            let period = query.to.map(month_label);
            json!({ "query": query.describe(), "period": period, "total": total })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_month() {
        let query = parse_month("2026-02").unwrap();
        assert_eq!(query.from, NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(query.to, NaiveDate::from_ymd_opt(2026, 2, 28));
    }

    #[test]
    fn test_parse_month_rejects_garbage() {
        for value in ["2026", "2026-13", "march", "2026-xx"] {
            let err = parse_month(value).unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR", "{value}");
        }
    }

    #[test]
    fn test_query_args_reject_inverted_range() {
        let cli = Cli::try_parse_from([
            "tally-report",
            "sum",
            "--from",
            "2026-03-10",
            "--to",
            "2026-03-01",
        ])
        .unwrap();
        let Command::Sum(args) = cli.command else {
            panic!("expected sum");
        };
        let err = args.into_query().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_month_conflicts_with_range() {
        let result = Cli::try_parse_from([
            "tally-report",
            "list",
            "--month",
            "2026-03",
            "--from",
            "2026-03-01",
        ]);
        assert!(result.is_err());
    }
}
