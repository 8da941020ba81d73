//! Core business logic for Tally.
//!
//! This crate contains the balance maintenance logic with ZERO web or
//! database dependencies. Domain types, the signed-delta rules, the
//! closing balance series and the store contracts live here; the Postgres
//! store lives in `tally-db`.
//!
//! # Modules
//!
//! - `ledger` - Running balances, closing balance slices and reporting

pub mod ledger;
