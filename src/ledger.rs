//! Reconciliation Engine
//!
//! The idempotent merge at the core of the system: given today's daily
//! snapshot and the persisted ledger state, apply the snapshot to the
//! current month exactly once, no matter how many times the run repeats
//! within the same day.
//!
//! ## Run Phases
//!
//! Each run is in exactly one of three mutually exclusive phases, computed
//! up front from `(month_seeded, last_run_date, last_daily, today)`:
//!
//! - [`RunPhase::Seeded`] - the month was just seeded from an authoritative
//!   bulk import that already included today; record the snapshot as applied
//!   without merging, and consume the seed flag
//! - [`RunPhase::SameDay`] - a run already happened today; subtract the
//!   previously applied additive values, then apply the fresh snapshot
//! - [`RunPhase::NewDay`] - first run of the day; merge normally (and drop
//!   any stale seed flag)
//!
//! Peak fields are never subtracted on a same-day re-run: `max` is not
//! invertible, and a cumulative daily peak can only grow within a day, so
//! re-applying via `max` is already correct.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::models::PeriodTotals;
use crate::state::LedgerState;

/// Month key ("YYYY-MM") for a date.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Year key ("YYYY") for a date.
pub fn year_key(date: NaiveDate) -> String {
    format!("{:04}", date.year())
}

/// The three idempotence cases, mutually exclusive and exhaustive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// Month ledger already contains today via a bulk seed; skip the merge.
    Seeded,
    /// Re-run within the same day; invert the previous application first.
    SameDay,
    /// First run of a new day (or the very first run ever).
    NewDay,
}

/// Classify the current run from the persisted state.
pub fn classify_run(state: &LedgerState, current_month: &str, today: NaiveDate) -> RunPhase {
    let ran_today = state.last_run_date == Some(today);
    if state.month_seeded.as_deref() == Some(current_month) && ran_today && state.last_daily.is_none()
    {
        RunPhase::Seeded
    } else if ran_today && state.last_daily.is_some() {
        RunPhase::SameDay
    } else {
        RunPhase::NewDay
    }
}

/// Merge today's snapshot into the current month ledger, exactly once.
///
/// Mutates `state` in place: the month ledger, the last-applied record, and
/// the seed flag. Rollover and lifetime recomputation are separate steps.
/// Returns the phase the run was classified as, mostly for logging and
/// tests.
pub fn reconcile(state: &mut LedgerState, snapshot: &PeriodTotals, today: NaiveDate) -> RunPhase {
    let current_month = month_key(today);
    let phase = classify_run(state, &current_month, today);
    debug!(month = %current_month, ?phase, "Classified reconciliation run");

    let month = state.monthly.entry(current_month.clone()).or_default();

    match phase {
        RunPhase::Seeded => {
            // The seed already contains today; adding the snapshot would
            // double-count it. Record it as applied so the next same-day
            // run reconciles against it.
            info!(month = %current_month, "Seed includes today, skipping merge");
            state.month_seeded = None;
        }
        RunPhase::SameDay => {
            if let Some(previous) = state.last_daily.take() {
                month.subtract_additive(&previous);
            }
            month.accumulate(snapshot);
            info!(month = %current_month, pv_yield = month.pv_yield, "Re-applied today's snapshot");
        }
        RunPhase::NewDay => {
            if state.month_seeded.is_some() {
                debug!("Dropping stale seed flag");
                state.month_seeded = None;
            }
            month.accumulate(snapshot);
            info!(month = %current_month, pv_yield = month.pv_yield, "Merged daily snapshot");
        }
    }

    state.last_run_date = Some(today);
    state.last_daily = Some(snapshot.additive_subset());
    phase
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn day(pv: f64, export: f64, import: f64) -> PeriodTotals {
        let mut totals = PeriodTotals {
            pv_yield: pv,
            export,
            import,
            ..Default::default()
        };
        totals.derive_consumption();
        totals
    }

    #[test]
    fn test_first_merge_into_empty_month() {
        let mut state = LedgerState::default();
        let phase = reconcile(&mut state, &day(100.0, 20.0, 5.0), date("2025-06-01"));

        assert_eq!(phase, RunPhase::NewDay);
        let month = &state.monthly["2025-06"];
        assert_eq!(month.pv_yield, 100.0);
        assert_eq!(month.export, 20.0);
        assert_eq!(month.import, 5.0);
        assert_eq!(month.consumption, 85.0);
        assert_eq!(month.self_consumption, 80.0);
        assert_eq!(month.self_consumption_rate, Some(80.0));
    }

    #[test]
    fn test_same_day_rerun_is_idempotent() {
        let snapshot = day(100.0, 20.0, 5.0);
        let today = date("2025-06-01");

        let mut state = LedgerState::default();
        reconcile(&mut state, &snapshot, today);
        let once = state.monthly["2025-06"].clone();

        let phase = reconcile(&mut state, &snapshot, today);
        assert_eq!(phase, RunPhase::SameDay);
        assert_eq!(state.monthly["2025-06"], once);
    }

    #[test]
    fn test_same_day_rerun_applies_corrected_values() {
        let today = date("2025-06-01");
        let mut state = LedgerState::default();
        reconcile(&mut state, &day(100.0, 20.0, 5.0), today);
        // The portal revises the figures later in the day.
        reconcile(&mut state, &day(110.0, 25.0, 5.0), today);

        let month = &state.monthly["2025-06"];
        assert_eq!(month.pv_yield, 110.0);
        assert_eq!(month.export, 25.0);
    }

    #[test]
    fn test_second_day_accumulates() {
        let mut state = LedgerState::default();
        reconcile(&mut state, &day(100.0, 20.0, 5.0), date("2025-06-01"));
        let phase = reconcile(&mut state, &day(50.0, 0.0, 10.0), date("2025-06-02"));

        assert_eq!(phase, RunPhase::NewDay);
        let month = &state.monthly["2025-06"];
        assert_eq!(month.pv_yield, 150.0);
        assert_eq!(month.consumption, 145.0);
        assert_eq!(month.self_consumption, 130.0);
    }

    #[test]
    fn test_peak_power_grows_monotonically_within_a_day() {
        let today = date("2025-06-01");
        let mut state = LedgerState::default();

        let mut morning = day(40.0, 5.0, 1.0);
        morning.peak_power = 30.0;
        reconcile(&mut state, &morning, today);

        // Afternoon re-run reports a lower instantaneous peak reading; the
        // recorded daily peak must not shrink.
        let mut afternoon = day(90.0, 12.0, 2.0);
        afternoon.peak_power = 28.0;
        reconcile(&mut state, &afternoon, today);

        assert_eq!(state.monthly["2025-06"].peak_power, 30.0);
    }

    #[test]
    fn test_seed_consumption_skips_merge() {
        let today = date("2025-06-15");
        let mut seeded_month = PeriodTotals::default();
        seeded_month.accumulate(&day(1000.0, 200.0, 50.0));

        let mut state = LedgerState {
            month_seeded: Some("2025-06".to_string()),
            last_run_date: Some(today),
            ..Default::default()
        };
        state.monthly.insert("2025-06".to_string(), seeded_month.clone());

        let snapshot = day(40.0, 5.0, 1.0);
        let phase = reconcile(&mut state, &snapshot, today);

        assert_eq!(phase, RunPhase::Seeded);
        // Month untouched: the seed already includes today.
        assert_eq!(state.monthly["2025-06"], seeded_month);
        assert!(state.month_seeded.is_none());
        // But the snapshot is recorded, so the next same-day run subtracts it.
        assert_eq!(state.last_daily.as_ref().unwrap().pv_yield, 40.0);
    }

    #[test]
    fn test_rerun_after_seed_consumption_reconciles() {
        let today = date("2025-06-15");
        let mut seeded_month = PeriodTotals::default();
        seeded_month.accumulate(&day(1000.0, 200.0, 50.0));

        let mut state = LedgerState {
            month_seeded: Some("2025-06".to_string()),
            last_run_date: Some(today),
            ..Default::default()
        };
        state.monthly.insert("2025-06".to_string(), seeded_month);

        reconcile(&mut state, &day(40.0, 5.0, 1.0), today);
        // Later the same day the figures have grown; only the delta lands.
        reconcile(&mut state, &day(55.0, 8.0, 1.0), today);

        let month = &state.monthly["2025-06"];
        assert_eq!(month.pv_yield, 1015.0); // 1000 seeded - 40 undone + 55
    }

    #[test]
    fn test_stale_seed_flag_cleared_on_new_day() {
        let mut state = LedgerState {
            month_seeded: Some("2025-06".to_string()),
            last_run_date: Some(date("2025-06-14")),
            ..Default::default()
        };
        let phase = reconcile(&mut state, &day(40.0, 5.0, 1.0), date("2025-06-15"));

        assert_eq!(phase, RunPhase::NewDay);
        assert!(state.month_seeded.is_none());
        assert_eq!(state.monthly["2025-06"].pv_yield, 40.0);
    }

    #[test]
    fn test_new_month_starts_fresh() {
        let mut state = LedgerState::default();
        reconcile(&mut state, &day(100.0, 20.0, 5.0), date("2025-06-30"));
        reconcile(&mut state, &day(70.0, 10.0, 3.0), date("2025-07-01"));

        assert_eq!(state.monthly["2025-06"].pv_yield, 100.0);
        assert_eq!(state.monthly["2025-07"].pv_yield, 70.0);
    }

    #[test]
    fn test_last_daily_holds_additive_subset_only() {
        let mut state = LedgerState::default();
        let mut snapshot = day(100.0, 20.0, 5.0);
        snapshot.peak_power = 45.0;
        snapshot.extra.insert("Total String Capacity (kWp)".to_string(), 86.58);
        reconcile(&mut state, &snapshot, date("2025-06-01"));

        let last = state.last_daily.as_ref().unwrap();
        assert_eq!(last.pv_yield, 100.0);
        assert_eq!(last.peak_power, 0.0);
        assert!(last.extra.is_empty());
        assert!(last.self_consumption_rate.is_none());
    }
}
