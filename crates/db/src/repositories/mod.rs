//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod balance;
pub mod closing_report;

pub use balance::{PgAccountSession, PgBalanceStore, map_db_err};
pub use closing_report::PgClosingBalanceReports;
