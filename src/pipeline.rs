//! Run Orchestration
//!
//! Wires the engines into the scheduled reconciliation run:
//!
//! 1. read today's snapshot and the persisted state (both fatal if missing)
//! 2. reconcile the snapshot into the month ledger
//! 3. recompute year and all-time totals top-down
//! 4. update the hourly history (best effort)
//! 5. price TOU savings (best effort)
//! 6. rotate the day boundary, save state, publish the output view
//!
//! The two best-effort stages log a warning and leave their output section
//! absent on failure; the ledger itself still merges and persists.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Timelike};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::hourly::{HourlyHistory, ProfileKind, HOURS_PER_DAY};
use crate::ingest;
use crate::ledger::{self, month_key, year_key, RunPhase};
use crate::lifetime;
use crate::models::{DatedTotals, PeriodEntry, PeriodTotals};
use crate::report::{HourlyAverages, HourlySection, Report};
use crate::state::LedgerState;
use crate::tariff::{self, ReferenceShape, SavingsReport, TariffSchedule};

/// Every file a run touches, resolved up front.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub state: PathBuf,
    pub snapshot: PathBuf,
    pub hourly_rows: PathBuf,
    pub hourly_history: PathBuf,
    pub tariff: PathBuf,
    pub shape: PathBuf,
    pub output: PathBuf,
}

impl DataPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            state: config.state_file(),
            snapshot: config.snapshot_file(),
            hourly_rows: config.hourly_rows_file(),
            hourly_history: config.hourly_history_file(),
            tariff: config.tariff_file(),
            shape: config.shape_file(),
            output: config.output_file(),
        }
    }
}

/// Knobs for one run, split from [`DataPaths`] so tests can pin the clock.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub plant_name: String,
    pub today: NaiveDate,
    pub hour: u32,
    pub retention_days: i64,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        let now = Local::now();
        Self {
            plant_name: config.plant.name.clone(),
            today: now.date_naive(),
            hour: now.hour(),
            retention_days: config.hourly.retention_days,
        }
    }
}

/// What a completed run produced.
pub struct RunOutcome {
    pub report: Report,
    pub phase: RunPhase,
}

/// Execute a full reconciliation run.
pub fn run(paths: &DataPaths, opts: &RunOptions) -> Result<RunOutcome> {
    let today = opts.today;
    let current_month = month_key(today);
    let current_year = year_key(today);

    let snapshot = ingest::read_snapshot(&paths.snapshot)?;
    let mut state = LedgerState::load(&paths.state).context(
        "no reconciliation state; seed the ledger first (`solar-ledger seed`)",
    )?;
    state.migrate_legacy_yesterday(today);

    let phase = ledger::reconcile(&mut state, &snapshot, today);

    if let Some(year_totals) = lifetime::recompute_year(
        &state.monthly,
        &current_year,
        state.lifetime.get(&current_year),
    ) {
        state.lifetime.insert(current_year.clone(), year_totals);
    }
    let all_time = lifetime::recompute_all_time(&state.lifetime, None);

    let hourly = match update_hourly(paths, opts, &snapshot, &current_month) {
        Ok(section) => Some(section),
        Err(err) => {
            warn!(error = %err, "Hourly profile update failed, section omitted");
            None
        }
    };

    let month_ledger = state.monthly.get(&current_month).cloned().unwrap_or_default();
    let savings = match calc_savings(paths, today, &snapshot, &month_ledger, &all_time) {
        Ok(section) => section,
        Err(err) => {
            warn!(error = %err, "Savings calculation failed, section omitted");
            None
        }
    };

    state.rotate_today(&snapshot, today);
    state.last_updated = Some(today.to_string());
    state.save(&paths.state)?;

    let report = build_report(&state, &snapshot, &all_time, opts, savings, hourly);
    report.save(&paths.output)?;
    info!(phase = ?phase, month = %current_month, "Reconciliation run complete");

    Ok(RunOutcome { report, phase })
}

fn update_hourly(
    paths: &DataPaths,
    opts: &RunOptions,
    snapshot: &PeriodTotals,
    current_month: &str,
) -> Result<HourlySection> {
    let mut history = load_hourly_history(&paths.hourly_history)?;

    match ingest::read_hourly_rows(&paths.hourly_rows)? {
        Some(rows) => {
            history.record_rows(opts.today, &rows);
            history.current_hour = Some(opts.hour);
        }
        None => history.record_cumulative(opts.today, opts.hour, snapshot.pv_yield),
    }

    history.refresh_monthly_average(current_month, Some(opts.today));
    history.prune(opts.today, opts.retention_days);
    save_hourly_history(&paths.hourly_history, &history)?;

    let today_profile = history
        .days
        .get(&opts.today.to_string())
        .cloned()
        .unwrap_or_default();
    let monthly_averages = HourlyAverages {
        generation: history
            .monthly_averages
            .get(current_month)
            .copied()
            .unwrap_or([0.0; HOURS_PER_DAY]),
        load: history.monthly_average(current_month, ProfileKind::Load, Some(opts.today)),
        grid_import: history.monthly_average(
            current_month,
            ProfileKind::GridImport,
            Some(opts.today),
        ),
    };

    Ok(HourlySection {
        today: today_profile,
        current_hour: opts.hour,
        monthly_averages,
    })
}

fn load_hourly_history(path: &Path) -> Result<HourlyHistory> {
    if !path.exists() {
        debug!(path = %path.display(), "No hourly history yet, starting empty");
        return Ok(HourlyHistory::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read hourly history: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse hourly history: {}", path.display()))
}

fn save_hourly_history(path: &Path, history: &HourlyHistory) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory: {}", parent.display()))?;
    }
    let content =
        serde_json::to_string_pretty(history).context("failed to serialize hourly history")?;
    fs::write(path, content)
        .with_context(|| format!("failed to write hourly history: {}", path.display()))?;
    Ok(())
}

fn calc_savings(
    paths: &DataPaths,
    today: NaiveDate,
    snapshot: &PeriodTotals,
    month_ledger: &PeriodTotals,
    all_time: &PeriodTotals,
) -> Result<Option<SavingsReport>> {
    if !paths.tariff.exists() || !paths.shape.exists() {
        debug!("No tariff schedule or reference shape, skipping savings");
        return Ok(None);
    }
    let tariff_schedule = TariffSchedule::load(&paths.tariff)?;
    let shapes = ReferenceShape::load(&paths.shape)?;

    let today_savings = tariff::calc_day_savings(
        &tariff_schedule,
        &shapes,
        today,
        snapshot.self_consumption,
        snapshot.export,
    )?;
    let month_savings = tariff::calc_month_savings(
        &tariff_schedule,
        &shapes,
        today,
        month_ledger.self_consumption,
        month_ledger.export,
    )?;
    let lifetime_savings = tariff::calc_lifetime_savings(
        &month_savings,
        month_ledger.self_consumption,
        month_ledger.export,
        all_time.self_consumption,
        all_time.export,
    );

    Ok(Some(SavingsReport {
        today: today_savings.rounded(),
        month: month_savings.rounded(),
        lifetime: lifetime_savings.rounded(),
    }))
}

fn build_report(
    state: &LedgerState,
    snapshot: &PeriodTotals,
    all_time: &PeriodTotals,
    opts: &RunOptions,
    savings: Option<SavingsReport>,
    hourly: Option<HourlySection>,
) -> Report {
    let current_month = month_key(opts.today);

    let yesterday = state.yesterday.as_ref().and_then(|data| {
        state.yesterday_date.map(|date| DatedTotals {
            date: date.to_string(),
            data: data.rounded_for_output(),
        })
    });

    Report {
        plant: opts.plant_name.clone(),
        last_updated: Local::now().format("%Y-%m-%d %H:%M").to_string(),
        yesterday,
        today: DatedTotals {
            date: opts.today.to_string(),
            data: snapshot.rounded_for_output(),
        },
        current_month: PeriodEntry {
            period: current_month.clone(),
            data: state
                .monthly
                .get(&current_month)
                .map(PeriodTotals::rounded_for_output)
                .unwrap_or_default(),
        },
        monthly: state
            .monthly
            .iter()
            .map(|(key, totals)| (key.clone(), totals.rounded_for_output()))
            .collect(),
        lifetime: state
            .lifetime
            .iter()
            .map(|(key, totals)| (key.clone(), totals.rounded_for_output()))
            .collect(),
        all_time_totals: all_time.rounded_for_output(),
        savings,
        hourly,
    }
}

/// Seed one month's ledger from an authoritative bulk export.
///
/// When the seeded month is the current month the import is assumed to
/// already include today, so the next run of the day skips its merge and
/// only records the snapshot for later same-day reconciliation. Seeding a
/// historical month just replaces that month and recomputes its year.
pub fn seed(paths: &DataPaths, month: &str, totals_file: &Path, today: NaiveDate) -> Result<()> {
    let content = fs::read_to_string(totals_file)
        .with_context(|| format!("failed to read seed file: {}", totals_file.display()))?;
    let mut totals: PeriodTotals = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse seed file: {}", totals_file.display()))?;
    totals.round_fields();
    totals.recompute_rate();

    let mut state = LedgerState::load_or_default(&paths.state)?;
    state.monthly.insert(month.to_string(), totals);

    if month == month_key(today) {
        state.month_seeded = Some(month.to_string());
        state.last_run_date = Some(today);
        state.last_daily = None;
    }

    let year = year_key_of_month(month);
    if let Some(year_totals) =
        lifetime::recompute_year(&state.monthly, &year, state.lifetime.get(&year))
    {
        state.lifetime.insert(year, year_totals);
    }

    state.save(&paths.state)?;
    info!(month, "Seeded month ledger");
    Ok(())
}

fn year_key_of_month(month: &str) -> String {
    month.split('-').next().unwrap_or(month).to_string()
}
