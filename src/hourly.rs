//! Hourly Profile Engine
//!
//! Maintains per-day 24-slot generation, load and grid-import profiles with
//! rolling history, and computes monthly per-hour averages.
//!
//! Two input forms exist:
//!
//! - **Per-hour rows** from the plant report: each row's hour indexes
//!   straight into the 24-slot arrays.
//! - **Cumulative snapshot differencing** when only the day's running PV
//!   total is known: the positive difference against the last recorded
//!   cumulative value for the same date is attributed entirely to the
//!   current hour. On the first observation of a day the whole cumulative
//!   value lands in the current hour. This is an approximation; it also
//!   assumes the cumulative reading never decreases within a day, so a
//!   mid-day meter reset will misattribute one hour's bucket.
//!
//! History is pruned to a retention window after each update, a plain
//! FIFO-by-age eviction over date-string keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::schema::round2;

pub const HOURS_PER_DAY: usize = 24;

/// Which of the three tracked profiles to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Generation,
    Load,
    GridImport,
}

/// One day's 24-slot profiles. Missing data is zero, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayProfile {
    #[serde(default = "zeroed_day")]
    pub generation: [f64; HOURS_PER_DAY],

    #[serde(default = "zeroed_day")]
    pub load: [f64; HOURS_PER_DAY],

    #[serde(default = "zeroed_day")]
    pub grid_import: [f64; HOURS_PER_DAY],
}

fn zeroed_day() -> [f64; HOURS_PER_DAY] {
    [0.0; HOURS_PER_DAY]
}

impl Default for DayProfile {
    fn default() -> Self {
        Self {
            generation: zeroed_day(),
            load: zeroed_day(),
            grid_import: zeroed_day(),
        }
    }
}

impl DayProfile {
    pub fn slots(&self, kind: ProfileKind) -> &[f64; HOURS_PER_DAY] {
        match kind {
            ProfileKind::Generation => &self.generation,
            ProfileKind::Load => &self.load,
            ProfileKind::GridImport => &self.grid_import,
        }
    }
}

/// One per-hour row from the richer report form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyRow {
    pub hour: u32,
    #[serde(default)]
    pub generation: f64,
    #[serde(default, rename = "import")]
    pub grid_import: f64,
    #[serde(default)]
    pub export: f64,
}

/// The last cumulative PV reading, for snapshot differencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CumulativeSnapshot {
    pub date: String,
    pub hour: u32,
    pub pv_kwh: f64,
}

/// Rolling hourly history, persisted as its own file next to the ledger
/// state. Day keys are "YYYY-MM-DD" strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyHistory {
    #[serde(default)]
    pub days: BTreeMap<String, DayProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<CumulativeSnapshot>,

    /// Cached month → per-hour generation averages.
    #[serde(default)]
    pub monthly_averages: BTreeMap<String, [f64; HOURS_PER_DAY]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hour: Option<u32>,
}

impl HourlyHistory {
    /// Record a day from per-hour rows. Rows for the same hour add up;
    /// load is derived per hour as generation − export + import, clamped at
    /// zero.
    pub fn record_rows(&mut self, date: NaiveDate, rows: &[HourlyRow]) {
        let day = self.days.entry(date.to_string()).or_default();
        for row in rows {
            let hour = row.hour as usize;
            if hour >= HOURS_PER_DAY {
                debug!(hour = row.hour, "Skipping out-of-range hourly row");
                continue;
            }
            day.generation[hour] = round2(day.generation[hour] + row.generation);
            day.grid_import[hour] = round2(day.grid_import[hour] + row.grid_import);
            let load = (row.generation - row.export + row.grid_import).max(0.0);
            day.load[hour] = round2(day.load[hour] + load);
        }
    }

    /// Record the day's cumulative PV total by differencing against the
    /// last snapshot; the positive increment goes to `hour`.
    pub fn record_cumulative(&mut self, date: NaiveDate, hour: u32, pv_kwh: f64) {
        let date_key = date.to_string();
        let increment = match &self.last_snapshot {
            Some(last) if last.date == date_key => (pv_kwh - last.pv_kwh).max(0.0),
            // First observation of the day: everything generated so far.
            _ => pv_kwh,
        };

        let day = self.days.entry(date_key.clone()).or_default();
        if let Some(slot) = day.generation.get_mut(hour as usize) {
            *slot = round2(increment);
        }

        self.last_snapshot = Some(CumulativeSnapshot {
            date: date_key,
            hour,
            pv_kwh: round2(pv_kwh),
        });
        self.current_hour = Some(hour);
    }

    /// Per-hour average across the month's recorded days, skipping
    /// `exclude_date` (the still-accumulating current day). Hours with no
    /// qualifying (non-zero) day average to zero.
    pub fn monthly_average(
        &self,
        month: &str,
        kind: ProfileKind,
        exclude_date: Option<NaiveDate>,
    ) -> [f64; HOURS_PER_DAY] {
        let exclude = exclude_date.map(|d| d.to_string());
        let month_days: Vec<&DayProfile> = self
            .days
            .iter()
            .filter(|(date, _)| {
                date.starts_with(month) && exclude.as_deref() != Some(date.as_str())
            })
            .map(|(_, profile)| profile)
            .collect();

        let mut averages = zeroed_day();
        if month_days.is_empty() {
            return averages;
        }
        for (hour, slot) in averages.iter_mut().enumerate() {
            let values: Vec<f64> = month_days
                .iter()
                .map(|profile| profile.slots(kind)[hour])
                .filter(|value| *value > 0.0)
                .collect();
            if !values.is_empty() {
                *slot = round2(values.iter().sum::<f64>() / values.len() as f64);
            }
        }
        averages
    }

    /// Refresh the cached generation averages for a month.
    pub fn refresh_monthly_average(&mut self, month: &str, exclude_date: Option<NaiveDate>) {
        let averages = self.monthly_average(month, ProfileKind::Generation, exclude_date);
        self.monthly_averages.insert(month.to_string(), averages);
    }

    /// Evict entries older than `retention_days` before `today`.
    pub fn prune(&mut self, today: NaiveDate, retention_days: i64) {
        let cutoff = (today - chrono::Duration::days(retention_days)).to_string();
        let before = self.days.len();
        self.days.retain(|date, _| date.as_str() >= cutoff.as_str());
        let evicted = before - self.days.len();
        if evicted > 0 {
            debug!(evicted, cutoff = %cutoff, "Pruned hourly history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_rows_index_directly_into_slots() {
        let mut history = HourlyHistory::default();
        let rows = vec![
            HourlyRow { hour: 8, generation: 12.5, grid_import: 1.0, export: 2.0 },
            HourlyRow { hour: 9, generation: 20.0, grid_import: 0.5, export: 6.0 },
        ];
        history.record_rows(date("2025-06-02"), &rows);

        let day = &history.days["2025-06-02"];
        assert_eq!(day.generation[8], 12.5);
        assert_eq!(day.generation[9], 20.0);
        assert_eq!(day.grid_import[8], 1.0);
        assert_eq!(day.load[8], 11.5); // 12.5 - 2.0 + 1.0
        assert_eq!(day.load[9], 14.5);
        assert_eq!(day.generation[7], 0.0);
    }

    #[test]
    fn test_out_of_range_row_is_ignored() {
        let mut history = HourlyHistory::default();
        history.record_rows(
            date("2025-06-02"),
            &[HourlyRow { hour: 24, generation: 5.0, grid_import: 0.0, export: 0.0 }],
        );
        assert!(history.days["2025-06-02"].generation.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cumulative_differencing_within_day() {
        let mut history = HourlyHistory::default();
        let day = date("2025-06-02");

        // First observation: everything attributed to the current hour.
        history.record_cumulative(day, 9, 30.0);
        assert_eq!(history.days["2025-06-02"].generation[9], 30.0);

        // Next hour: only the increment.
        history.record_cumulative(day, 10, 42.5);
        assert_eq!(history.days["2025-06-02"].generation[10], 12.5);
        assert_eq!(history.days["2025-06-02"].generation[9], 30.0);
    }

    #[test]
    fn test_cumulative_decrease_clamps_to_zero() {
        let mut history = HourlyHistory::default();
        let day = date("2025-06-02");
        history.record_cumulative(day, 9, 30.0);
        // Meter correction mid-day; never attribute a negative hour.
        history.record_cumulative(day, 10, 25.0);
        assert_eq!(history.days["2025-06-02"].generation[10], 0.0);
    }

    #[test]
    fn test_new_date_resets_differencing() {
        let mut history = HourlyHistory::default();
        history.record_cumulative(date("2025-06-02"), 23, 80.0);
        history.record_cumulative(date("2025-06-03"), 7, 5.5);
        assert_eq!(history.days["2025-06-03"].generation[7], 5.5);
    }

    #[test]
    fn test_monthly_average_skips_zero_hours_and_excluded_day() {
        let mut history = HourlyHistory::default();
        let mut d1 = DayProfile::default();
        d1.generation[10] = 10.0;
        let mut d2 = DayProfile::default();
        d2.generation[10] = 20.0;
        let mut d3 = DayProfile::default();
        d3.generation[10] = 99.0; // today, still accumulating
        history.days.insert("2025-06-01".to_string(), d1);
        history.days.insert("2025-06-02".to_string(), d2);
        history.days.insert("2025-06-03".to_string(), d3);

        let averages =
            history.monthly_average("2025-06", ProfileKind::Generation, Some(date("2025-06-03")));
        assert_eq!(averages[10], 15.0);
        assert_eq!(averages[9], 0.0);
    }

    #[test]
    fn test_monthly_average_empty_month_is_zero() {
        let history = HourlyHistory::default();
        let averages = history.monthly_average("2025-06", ProfileKind::Generation, None);
        assert!(averages.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_prune_evicts_by_age() {
        let mut history = HourlyHistory::default();
        history.days.insert("2025-01-01".to_string(), DayProfile::default());
        history.days.insert("2025-05-01".to_string(), DayProfile::default());
        history.days.insert("2025-06-02".to_string(), DayProfile::default());

        history.prune(date("2025-06-02"), 90);
        assert!(!history.days.contains_key("2025-01-01"));
        assert!(history.days.contains_key("2025-05-01"));
        assert!(history.days.contains_key("2025-06-02"));
    }

    #[test]
    fn test_history_serde_round_trip() {
        let mut history = HourlyHistory::default();
        history.record_cumulative(date("2025-06-02"), 9, 30.0);
        history.refresh_monthly_average("2025-06", None);

        let json = serde_json::to_string(&history).unwrap();
        let back: HourlyHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.days["2025-06-02"].generation[9], 30.0);
        assert_eq!(back.last_snapshot.as_ref().unwrap().pv_kwh, 30.0);
    }
}
