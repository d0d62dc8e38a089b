//! Snapshot Ingestion
//!
//! Boundary with the acquisition layer: the scraper drops today's report as
//! a flat field→value JSON mapping (column headers exactly as exported from
//! the plant portal), and optionally a file of per-hour rows. This module
//! only reads those files into typed records; fetching and spreadsheet
//! parsing live outside this crate.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::hourly::HourlyRow;
use crate::models::PeriodTotals;

/// Read today's daily snapshot. Missing or unparsable input is fatal: with
/// no snapshot there is nothing to reconcile.
///
/// Consumption figures the report omits are derived from yield, export and
/// import on the way in.
pub fn read_snapshot(path: &Path) -> Result<PeriodTotals> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("daily snapshot not found: {}", path.display()))?;
    let mut snapshot: PeriodTotals = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse daily snapshot: {}", path.display()))?;

    if snapshot.is_empty() {
        bail!("daily snapshot {} contains no data", path.display());
    }

    snapshot.derive_consumption();
    info!(
        pv_yield = snapshot.pv_yield,
        export = snapshot.export,
        import = snapshot.import,
        consumption = snapshot.consumption,
        "Loaded daily snapshot"
    );
    Ok(snapshot)
}

/// Read the optional per-hour rows file. Returns `None` when the file does
/// not exist; the hourly engine then falls back to snapshot differencing.
pub fn read_hourly_rows(path: &Path) -> Result<Option<Vec<HourlyRow>>> {
    if !path.exists() {
        debug!(path = %path.display(), "No per-hour rows, using snapshot differencing");
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read hourly rows: {}", path.display()))?;
    let rows: Vec<HourlyRow> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse hourly rows: {}", path.display()))?;
    info!(rows = rows.len(), "Loaded per-hour rows");
    Ok(Some(rows))
}
