//! Persisted Reconciliation State
//!
//! Durable record owned exclusively by the reconciliation engine: the full
//! period ledger store (months and years), the most recently applied daily
//! snapshot, the previous day's finalised snapshot, and the seed flag.
//!
//! Lifecycle is strict read-modify-write: loaded once at the start of a run,
//! mutated in memory, written back once at the end. The write goes through a
//! temp file and an atomic rename so an interrupted run can never leave a
//! half-written state file; the re-invoked run then reconciles idempotently
//! against the previous state.
//!
//! Day rollover also lives here: when the persisted `previous_today_date`
//! differs from the computed today, the previous day's snapshot rotates into
//! `yesterday` before today's running snapshot overwrites it. States written
//! before the `yesterday` field existed are migrated on first use.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::models::PeriodTotals;

/// The complete persisted state blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    /// Month key ("YYYY-MM") → metric totals.
    #[serde(default)]
    pub monthly: BTreeMap<String, PeriodTotals>,

    /// Year key ("YYYY") → metric totals. Derived view: always recomputed
    /// from `monthly`, never independently mutated.
    #[serde(default)]
    pub lifetime: BTreeMap<String, PeriodTotals>,

    /// Date of the last reconciliation run.
    #[serde(
        default,
        deserialize_with = "de_opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_run_date: Option<NaiveDate>,

    /// Additive subset of the snapshot applied on `last_run_date`; what a
    /// same-day re-run subtracts before re-applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_daily: Option<PeriodTotals>,

    /// Month key whose ledger was seeded from an authoritative bulk import
    /// that already included the current day. Cleared once consumed or
    /// stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_seeded: Option<String>,

    /// Running snapshot for the current day, rotated into `yesterday` at the
    /// day boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_today: Option<PeriodTotals>,

    #[serde(
        default,
        deserialize_with = "de_opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_today_date: Option<NaiveDate>,

    /// Finalised snapshot of the previous day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yesterday: Option<PeriodTotals>,

    #[serde(
        default,
        deserialize_with = "de_opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub yesterday_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Legacy states stored missing dates as empty strings; treat those as
/// absent rather than failing the parse.
fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl LedgerState {
    /// Load the state file. Missing state on a reconciliation run is fatal;
    /// the ledger baselines must exist before increments can be applied.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read state file: {}", path.display()))?;
        let state: LedgerState = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state file: {}", path.display()))?;
        debug!(
            months = state.monthly.len(),
            years = state.lifetime.len(),
            "Loaded ledger state"
        );
        Ok(state)
    }

    /// Load the state file, or start from an empty state when it does not
    /// exist yet. Only the `seed` path uses this; a plain run treats a
    /// missing file as fatal.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No state file yet, starting empty");
            Ok(Self::default())
        }
    }

    /// Write the state back atomically: serialise to a sibling temp file,
    /// then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory: {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize ledger state")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("failed to write temp state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace state file: {}", path.display()))?;
        debug!(path = %path.display(), "Ledger state saved");
        Ok(())
    }

    /// One-time migration for states that predate the `yesterday` field: a
    /// `previous_today` from an earlier date than today is in fact
    /// yesterday's finalised snapshot.
    pub fn migrate_legacy_yesterday(&mut self, today: NaiveDate) {
        if self.yesterday.is_none() {
            if let (Some(prev), Some(prev_date)) =
                (self.previous_today.as_ref(), self.previous_today_date)
            {
                if prev_date != today {
                    info!(date = %prev_date, "Migrated yesterday from previous_today");
                    self.yesterday = Some(prev.clone());
                    self.yesterday_date = Some(prev_date);
                }
            }
        }
    }

    /// Day rollover: rotate the previous day's running snapshot into
    /// `yesterday` when the date has changed, then record today's snapshot
    /// as the new running value.
    pub fn rotate_today(&mut self, snapshot: &PeriodTotals, today: NaiveDate) {
        if let Some(prev_date) = self.previous_today_date {
            if prev_date != today {
                info!(date = %prev_date, "Rotated yesterday");
                self.yesterday = self.previous_today.take();
                self.yesterday_date = Some(prev_date);
            }
        }
        self.previous_today = Some(snapshot.clone());
        self.previous_today_date = Some(today);
    }
}
