//! Core Data Models
//!
//! This module defines the period record at the heart of the ledger and the
//! small wrapper types the output view is built from.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: a flat field→value mapping parsed from the daily report
//!    deserialises straight into a [`PeriodTotals`]
//! 2. **Aggregation**: the reconciliation engine merges daily records into
//!    monthly [`PeriodTotals`], the lifetime aggregator recomputes yearly and
//!    all-time records from them
//! 3. **Output**: [`DatedTotals`] and [`PeriodEntry`] wrap records for the
//!    published report
//!
//! ## Design
//!
//! [`PeriodTotals`] is a tagged record with a named field for every
//! recognised metric plus a residual open map (`extra`) for unknown or
//! future fields. The residual map is what makes the "preserve unknown
//! fields on recompute" contract possible without an untyped catch-all
//! everywhere: manually curated values like "Equivalent Trees Planted" on a
//! year ledger survive every recompute verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::{self, round2, round3, MetricKind, METRIC_SCHEMA};

/// Metric totals for one period: a day, a month, a year, or all time.
///
/// Serialises under the original report column headers, with unrecognised
/// numeric fields captured in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotals {
    #[serde(rename = "PV Yield (kWh)", default)]
    pub pv_yield: f64,

    #[serde(rename = "Inverter Yield (kWh)", default)]
    pub inverter_yield: f64,

    #[serde(rename = "Export (kWh)", default)]
    pub export: f64,

    #[serde(rename = "Import (kWh)", default)]
    pub import: f64,

    #[serde(rename = "Consumption (kWh)", default)]
    pub consumption: f64,

    #[serde(rename = "Self-consumption (kWh)", default)]
    pub self_consumption: f64,

    /// Derived: recomputed from PV yield and self-consumption after every
    /// merge, omitted while PV yield is zero.
    #[serde(
        rename = "Self-consumption Rate (%)",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub self_consumption_rate: Option<f64>,

    #[serde(rename = "CO₂ Avoided (t)", default)]
    pub co2_avoided: f64,

    #[serde(rename = "Standard Coal Saved (t)", default)]
    pub coal_saved: f64,

    #[serde(rename = "Revenue (R.)", default)]
    pub revenue: f64,

    #[serde(rename = "Charge (kWh)", default)]
    pub charge: f64,

    #[serde(rename = "Discharge (kWh)", default)]
    pub discharge: f64,

    #[serde(rename = "Theoretical Yield (kWh)", default)]
    pub theoretical_yield: f64,

    #[serde(rename = "Loss Due to Export Limitation (kWh)", default)]
    pub export_limit_loss: f64,

    #[serde(rename = "Loss Due to Export Limitation(R.)", default)]
    pub export_limit_loss_revenue: f64,

    #[serde(rename = "Peak Power (kW)", default)]
    pub peak_power: f64,

    /// Residual open map: pass-through and manually curated fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl PeriodTotals {
    /// Merge a daily record into this period: additive fields are summed,
    /// peak fields combined via `max`, results rounded to 3 decimals.
    /// Pass-through fields keep the most recent value. The derived
    /// self-consumption rate is recomputed afterwards.
    pub fn accumulate(&mut self, day: &PeriodTotals) {
        for field in METRIC_SCHEMA {
            let merged = match field.kind {
                MetricKind::Additive => (field.get)(self) + (field.get)(day),
                MetricKind::Peak => (field.get)(self).max((field.get)(day)),
            };
            (field.set)(self, round3(merged));
        }
        for (key, value) in &day.extra {
            self.extra.insert(key.clone(), *value);
        }
        self.recompute_rate();
    }

    /// Undo a previous daily application: subtract every additive field.
    /// Peak fields stay put; `max` is not invertible, and within one day a
    /// peak can only grow.
    pub fn subtract_additive(&mut self, day: &PeriodTotals) {
        for field in schema::additive_fields() {
            (field.set)(self, round3((field.get)(self) - (field.get)(day)));
        }
    }

    /// Sum into this record without rounding; used by the lifetime
    /// aggregator which rounds once at the end.
    pub fn combine(&mut self, other: &PeriodTotals) {
        for field in METRIC_SCHEMA {
            let merged = match field.kind {
                MetricKind::Additive => (field.get)(self) + (field.get)(other),
                MetricKind::Peak => (field.get)(self).max((field.get)(other)),
            };
            (field.set)(self, merged);
        }
    }

    /// Round every schema field to 3 decimals.
    pub fn round_fields(&mut self) {
        for field in METRIC_SCHEMA {
            (field.set)(self, round3((field.get)(self)));
        }
    }

    /// Self-consumption rate = self-consumption / PV yield * 100, only
    /// meaningful while some PV yield exists.
    pub fn recompute_rate(&mut self) {
        self.self_consumption_rate = if self.pv_yield > 0.0 {
            Some(round3(self.self_consumption / self.pv_yield * 100.0))
        } else {
            None
        };
    }

    /// Fill in consumption figures when the report omits them.
    ///
    /// With no PV yield the site ran on grid import alone. With yield and
    /// export, consumption is yield minus export plus import; with yield and
    /// no export everything generated was consumed on site. Self-consumption
    /// is clamped at zero so a metering glitch can never produce a negative
    /// value.
    pub fn derive_consumption(&mut self) {
        if self.consumption == 0.0 {
            self.consumption = if self.pv_yield <= 0.0 {
                self.import
            } else if self.export > 0.0 {
                self.pv_yield - self.export + self.import
            } else {
                self.pv_yield + self.import
            };
            self.consumption = round3(self.consumption);
        }
        if self.self_consumption == 0.0 {
            self.self_consumption = round3((self.pv_yield - self.export).max(0.0));
        }
    }

    /// The additive-field subset of this record, exactly what a same-day
    /// re-run needs to invert the previous application.
    pub fn additive_subset(&self) -> PeriodTotals {
        let mut subset = PeriodTotals::default();
        for field in schema::additive_fields() {
            (field.set)(&mut subset, (field.get)(self));
        }
        subset
    }

    /// Copy with every value rounded to 2 decimals, for the output view.
    pub fn rounded_for_output(&self) -> PeriodTotals {
        let mut out = self.clone();
        for field in METRIC_SCHEMA {
            (field.set)(&mut out, round2((field.get)(self)));
        }
        out.self_consumption_rate = self.self_consumption_rate.map(round2);
        for value in out.extra.values_mut() {
            *value = round2(*value);
        }
        out
    }

    /// True when every schema field is zero and no residual fields exist.
    pub fn is_empty(&self) -> bool {
        METRIC_SCHEMA.iter().all(|field| (field.get)(self) == 0.0) && self.extra.is_empty()
    }
}

/// A period record tagged with its calendar date, as published in the
/// output view (`today` / `yesterday` sections).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatedTotals {
    pub date: String,
    pub data: PeriodTotals,
}

/// A period record tagged with its period key (`current_month` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodEntry {
    pub period: String,
    pub data: PeriodTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_derive_consumption_with_export() {
        let totals = day(100.0, 20.0, 5.0);
        assert_eq!(totals.consumption, 85.0);
        assert_eq!(totals.self_consumption, 80.0);
    }

    #[test]
    fn test_derive_consumption_without_export() {
        let totals = day(50.0, 0.0, 10.0);
        assert_eq!(totals.consumption, 60.0);
        assert_eq!(totals.self_consumption, 50.0);
    }

    #[test]
    fn test_derive_consumption_no_yield() {
        let totals = day(0.0, 0.0, 12.5);
        assert_eq!(totals.consumption, 12.5);
        assert_eq!(totals.self_consumption, 0.0);
    }

    #[test]
    fn test_self_consumption_never_negative() {
        // Export exceeding yield is a metering artefact, not negative usage.
        let totals = day(10.0, 15.0, 0.0);
        assert_eq!(totals.self_consumption, 0.0);
    }

    #[test]
    fn test_accumulate_sums_additive_and_maxes_peak() {
        let mut month = PeriodTotals::default();
        let mut d1 = day(100.0, 20.0, 5.0);
        d1.peak_power = 45.0;
        let mut d2 = day(50.0, 0.0, 10.0);
        d2.peak_power = 38.5;

        month.accumulate(&d1);
        month.accumulate(&d2);

        assert_eq!(month.pv_yield, 150.0);
        assert_eq!(month.consumption, 145.0);
        assert_eq!(month.self_consumption, 130.0);
        assert_eq!(month.peak_power, 45.0);
        assert_eq!(month.self_consumption_rate, Some(86.667));
    }

    #[test]
    fn test_subtract_then_accumulate_is_idempotent() {
        let snapshot = day(100.0, 20.0, 5.0);
        let mut once = PeriodTotals::default();
        once.accumulate(&snapshot);

        let mut twice = once.clone();
        twice.subtract_additive(&snapshot.additive_subset());
        twice.accumulate(&snapshot);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_rate_omitted_without_yield() {
        let mut month = PeriodTotals::default();
        month.accumulate(&day(0.0, 0.0, 8.0));
        assert_eq!(month.self_consumption_rate, None);
    }

    #[test]
    fn test_extra_fields_survive_serde_round_trip() {
        let mut totals = day(100.0, 20.0, 5.0);
        totals
            .extra
            .insert("Equivalent Trees Planted".to_string(), 321.0);

        let json = serde_json::to_string(&totals).unwrap();
        let back: PeriodTotals = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra.get("Equivalent Trees Planted"), Some(&321.0));
        assert_eq!(back.pv_yield, 100.0);
    }

    #[test]
    fn test_deserialize_from_report_headers() {
        let json = r#"{
            "PV Yield (kWh)": 412.3,
            "Peak Power (kW)": 51.2,
            "Total String Capacity (kWp)": 86.58
        }"#;
        let totals: PeriodTotals = serde_json::from_str(json).unwrap();
        assert_eq!(totals.pv_yield, 412.3);
        assert_eq!(totals.peak_power, 51.2);
        assert_eq!(totals.extra.get("Total String Capacity (kWp)"), Some(&86.58));
    }
}
