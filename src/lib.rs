//! Solar Ledger Library
//!
//! Incremental reconciliation engine for daily solar-plant energy reports.
//! An upstream scraper drops one cumulative snapshot per day (plus optional
//! per-hour rows); this crate folds each snapshot into persistent monthly
//! and lifetime ledgers exactly once, no matter how often the scheduled run
//! repeats within a day.
//!
//! ## Architecture Overview
//!
//! - [`schema`] - the metric field table: names, additive-vs-peak merge
//!   semantics, and typed accessors
//! - [`models`] - period totals with merge, subtraction and derivation rules
//! - [`ingest`] - reads the snapshot and hourly-row files the scraper writes
//! - [`ledger`] - the three-phase idempotent merge into the current month
//! - [`lifetime`] - top-down recomputation of year and all-time totals
//! - [`state`] - the persisted state blob, atomic save, day rollover
//! - [`hourly`] - 24-slot generation/load profiles with rolling retention
//! - [`tariff`] - time-of-use savings priced against a tariff schedule
//! - [`report`] - the published output view and terminal summary
//! - [`pipeline`] - orchestrates a full scheduled run
//! - [`config`] - configuration with file and environment overrides
//! - [`logging`] - structured logging setup
//!
//! ## Main Entry Point
//!
//! A scheduled run goes through [`pipeline::run`]:
//!
//! ```rust,no_run
//! use solar_ledger::config::Config;
//! use solar_ledger::pipeline::{self, DataPaths, RunOptions};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let paths = DataPaths::from_config(&config);
//! let opts = RunOptions::from_config(&config);
//! let outcome = pipeline::run(&paths, &opts)?;
//! println!("merged as {:?}", outcome.phase);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod hourly;
pub mod ingest;
pub mod ledger;
pub mod lifetime;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod state;
pub mod tariff;

pub use ledger::RunPhase;
pub use models::PeriodTotals;
pub use report::Report;
pub use state::LedgerState;
