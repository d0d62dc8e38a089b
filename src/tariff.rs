//! TOU Savings Calculator
//!
//! Prices a day's self-consumption and export against a time-of-use tariff:
//! a season (selected by calendar month) picks a day-type schedule (weekday,
//! Saturday, Sunday) of 24 period labels, and each period label carries a
//! rate. Because the meter only reports daily totals, the day's energy is
//! distributed across hours proportionally to a reference generation shape
//! for that calendar day; only the shape's proportions matter, never its
//! absolute scale.
//!
//! Two documented approximations, inherited from the way the plant data is
//! retained:
//!
//! - **Month savings** assume a uniform daily average (month total divided
//!   by elapsed days) and re-run the day calculation once per elapsed day.
//! - **Lifetime savings** scale the all-time totals by the effective rate
//!   observed for the current month and reuse the month's period mix. This
//!   is an estimate, not a ledger; it will drift when tariff rates change
//!   across years.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::hourly::HOURS_PER_DAY;
use crate::schema::round2;

/// Tariff period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TouPeriod {
    #[serde(rename = "peak")]
    Peak,
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "off-peak")]
    OffPeak,
}

/// Day type selecting a schedule row within a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayType {
    #[serde(rename = "weekday")]
    Weekday,
    #[serde(rename = "saturday")]
    Saturday,
    #[serde(rename = "sunday")]
    Sunday,
}

impl DayType {
    pub fn for_date(date: NaiveDate) -> Self {
        match date.weekday().num_days_from_monday() {
            0..=4 => Self::Weekday,
            5 => Self::Saturday,
            _ => Self::Sunday,
        }
    }
}

/// External tariff configuration, read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffSchedule {
    /// Season → period label → rate per kWh.
    pub rates: BTreeMap<String, BTreeMap<TouPeriod, f64>>,

    /// Calendar month number ("1"-"12") → season name.
    pub seasons: BTreeMap<String, String>,

    /// Season → day type → 24 period labels, one per hour of day.
    pub tou_schedule: BTreeMap<String, BTreeMap<DayType, Vec<TouPeriod>>>,

    /// Export credit per kWh, by period. Periods without a credit earn
    /// nothing for export.
    #[serde(default)]
    pub export_credits: BTreeMap<TouPeriod, f64>,
}

impl TariffSchedule {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read tariff schedule: {}", path.display()))?;
        let schedule: TariffSchedule = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse tariff schedule: {}", path.display()))?;
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        for (season, day_types) in &self.tou_schedule {
            if !self.rates.contains_key(season) {
                bail!("tou_schedule season {season:?} has no rates entry");
            }
            for (day_type, hours) in day_types {
                if hours.len() != HOURS_PER_DAY {
                    bail!(
                        "schedule for {season:?}/{day_type:?} has {} hours, expected {}",
                        hours.len(),
                        HOURS_PER_DAY
                    );
                }
            }
        }
        for season in self.seasons.values() {
            if !self.tou_schedule.contains_key(season) {
                bail!("season {season:?} is mapped from a month but has no tou_schedule entry");
            }
        }
        Ok(())
    }

    pub fn season_for(&self, month: u32) -> Result<&str> {
        self.seasons
            .get(&month.to_string())
            .map(String::as_str)
            .with_context(|| format!("no season configured for month {month}"))
    }

    fn schedule_for(&self, season: &str, day_type: DayType) -> Result<&[TouPeriod]> {
        self.tou_schedule
            .get(season)
            .and_then(|day_types| day_types.get(&day_type))
            .map(Vec::as_slice)
            .with_context(|| format!("no TOU schedule for season {season:?} / {day_type:?}"))
    }

    fn rate_for(&self, season: &str, period: TouPeriod) -> Result<f64> {
        self.rates
            .get(season)
            .and_then(|rates| rates.get(&period))
            .copied()
            .with_context(|| format!("no rate for season {season:?} / {period:?}"))
    }
}

/// Savings split by tariff period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsBreakdown {
    pub peak: f64,
    pub standard: f64,
    pub off_peak: f64,
    pub total: f64,
}

impl SavingsBreakdown {
    fn add(&mut self, period: TouPeriod, amount: f64) {
        match period {
            TouPeriod::Peak => self.peak += amount,
            TouPeriod::Standard => self.standard += amount,
            TouPeriod::OffPeak => self.off_peak += amount,
        }
        self.total += amount;
    }

    fn merge(&mut self, other: &SavingsBreakdown) {
        self.peak += other.peak;
        self.standard += other.standard;
        self.off_peak += other.off_peak;
        self.total += other.total;
    }

    fn rounded(&self) -> Self {
        Self {
            peak: round2(self.peak),
            standard: round2(self.standard),
            off_peak: round2(self.off_peak),
            total: round2(self.total),
        }
    }
}

/// PV (self-consumption) and export-credit savings for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouSavings {
    pub pv: SavingsBreakdown,
    pub export: SavingsBreakdown,
}

impl TouSavings {
    fn merge(&mut self, other: &TouSavings) {
        self.pv.merge(&other.pv);
        self.export.merge(&other.export);
    }

    pub fn rounded(&self) -> Self {
        Self {
            pv: self.pv.rounded(),
            export: self.export.rounded(),
        }
    }
}

/// The savings section of the output view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SavingsReport {
    pub today: TouSavings,
    pub month: TouSavings,
    pub lifetime: TouSavings,
}

/// Reference generation shape per calendar day ("MM-DD" → 24 non-negative
/// weights).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceShape(pub BTreeMap<String, [f64; HOURS_PER_DAY]>);

impl ReferenceShape {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read reference shape: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse reference shape: {}", path.display()))
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<&[f64; HOURS_PER_DAY]> {
        self.0.get(&format!("{:02}-{:02}", date.month(), date.day()))
    }
}

/// Distribute one day's self-consumption and export across the tariff
/// periods and price each hour.
///
/// A missing or non-positive reference shape yields all-zero savings; a
/// flat zero divide is never attempted.
pub fn calc_day_savings(
    tariff: &TariffSchedule,
    shapes: &ReferenceShape,
    date: NaiveDate,
    self_consumption_kwh: f64,
    export_kwh: f64,
) -> Result<TouSavings> {
    let Some(shape) = shapes.for_date(date) else {
        return Ok(TouSavings::default());
    };
    let shape_total: f64 = shape.iter().sum();
    if shape_total <= 0.0 {
        return Ok(TouSavings::default());
    }

    let season = tariff.season_for(date.month())?;
    let schedule = tariff.schedule_for(season, DayType::for_date(date))?;

    let mut savings = TouSavings::default();
    for (hour, weight) in shape.iter().enumerate() {
        let fraction = weight / shape_total;
        if fraction <= 0.0 {
            continue;
        }
        let period = schedule[hour];
        let rate = tariff.rate_for(season, period)?;
        savings.pv.add(period, self_consumption_kwh * fraction * rate);
        if let Some(credit) = tariff.export_credits.get(&period) {
            savings.export.add(period, export_kwh * fraction * credit);
        }
    }
    Ok(savings)
}

/// Month-to-date savings: only the month totals are known, so assume a
/// uniform daily average and run the day calculation once per elapsed day.
pub fn calc_month_savings(
    tariff: &TariffSchedule,
    shapes: &ReferenceShape,
    today: NaiveDate,
    month_self_consumption_kwh: f64,
    month_export_kwh: f64,
) -> Result<TouSavings> {
    let days_elapsed = today.day();
    if days_elapsed == 0 || (month_self_consumption_kwh <= 0.0 && month_export_kwh <= 0.0) {
        return Ok(TouSavings::default());
    }
    let daily_self = month_self_consumption_kwh / f64::from(days_elapsed);
    let daily_export = month_export_kwh / f64::from(days_elapsed);

    let mut savings = TouSavings::default();
    for day in 1..=days_elapsed {
        let date = today
            .with_day(day)
            .with_context(|| format!("invalid day {day} in month of {today}"))?;
        let daily = calc_day_savings(tariff, shapes, date, daily_self, daily_export)?;
        savings.merge(&daily);
    }
    Ok(savings)
}

/// Lifetime savings estimate: scale the all-time totals by the effective
/// rate observed this month and distribute across periods using the
/// month's period mix.
pub fn calc_lifetime_savings(
    month: &TouSavings,
    month_self_consumption_kwh: f64,
    month_export_kwh: f64,
    all_time_self_consumption_kwh: f64,
    all_time_export_kwh: f64,
) -> TouSavings {
    TouSavings {
        pv: scale_breakdown(&month.pv, month_self_consumption_kwh, all_time_self_consumption_kwh),
        export: scale_breakdown(&month.export, month_export_kwh, all_time_export_kwh),
    }
}

fn scale_breakdown(month: &SavingsBreakdown, month_kwh: f64, all_time_kwh: f64) -> SavingsBreakdown {
    if month_kwh <= 0.0 || month.total <= 0.0 {
        return SavingsBreakdown::default();
    }
    let effective_rate = month.total / month_kwh;
    let lifetime_total = all_time_kwh * effective_rate;
    let mut scaled = SavingsBreakdown {
        peak: lifetime_total * (month.peak / month.total),
        standard: lifetime_total * (month.standard / month.total),
        off_peak: lifetime_total * (month.off_peak / month.total),
        total: 0.0,
    };
    scaled.total = scaled.peak + scaled.standard + scaled.off_peak;
    scaled
}
