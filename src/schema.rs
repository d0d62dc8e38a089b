//! Metric Schema
//!
//! Static description of every metric the ledger recognises and how it
//! combines across merges. The reconciliation and aggregation engines never
//! hard-code field names; they iterate this table, so the whole pipeline is
//! parametrised by the schema rather than by scattered string lists.
//!
//! Metric names are the exact column headers of the FusionSolar daily report
//! ("PV Yield (kWh)", "Peak Power (kW)", ...) so persisted state files stay
//! interoperable with reports exported from the plant portal.
//!
//! ## Combination Rules
//!
//! - [`MetricKind::Additive`] - period totals, summed across merges
//! - [`MetricKind::Peak`] - instantaneous maxima, combined via `max`
//!
//! Derived values (the self-consumption rate) are not in this table: they are
//! recomputed from other fields after every merge and never accumulated.

use crate::models::PeriodTotals;

pub const PV_YIELD: &str = "PV Yield (kWh)";
pub const INVERTER_YIELD: &str = "Inverter Yield (kWh)";
pub const EXPORT: &str = "Export (kWh)";
pub const IMPORT: &str = "Import (kWh)";
pub const CONSUMPTION: &str = "Consumption (kWh)";
pub const SELF_CONSUMPTION: &str = "Self-consumption (kWh)";
pub const SELF_CONSUMPTION_RATE: &str = "Self-consumption Rate (%)";
pub const CO2_AVOIDED: &str = "CO₂ Avoided (t)";
pub const COAL_SAVED: &str = "Standard Coal Saved (t)";
pub const REVENUE: &str = "Revenue (R.)";
pub const CHARGE: &str = "Charge (kWh)";
pub const DISCHARGE: &str = "Discharge (kWh)";
pub const THEORETICAL_YIELD: &str = "Theoretical Yield (kWh)";
pub const EXPORT_LIMIT_LOSS: &str = "Loss Due to Export Limitation (kWh)";
pub const EXPORT_LIMIT_LOSS_REVENUE: &str = "Loss Due to Export Limitation(R.)";
pub const PEAK_POWER: &str = "Peak Power (kW)";

/// How a metric combines when a new period of data is merged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Summed across merges (energy, revenue, avoided emissions).
    Additive,
    /// Combined via `max` across merges (peak power).
    Peak,
}

/// One recognised metric: its wire name, combination rule, and accessors
/// into the typed [`PeriodTotals`] record.
pub struct MetricField {
    pub name: &'static str,
    pub kind: MetricKind,
    pub get: fn(&PeriodTotals) -> f64,
    pub set: fn(&mut PeriodTotals, f64),
}

macro_rules! metric {
    ($name:expr, $kind:expr, $field:ident) => {
        MetricField {
            name: $name,
            kind: $kind,
            get: |totals| totals.$field,
            set: |totals, value| totals.$field = value,
        }
    };
}

/// The full metric table, in report column order.
pub static METRIC_SCHEMA: &[MetricField] = &[
    metric!(PV_YIELD, MetricKind::Additive, pv_yield),
    metric!(INVERTER_YIELD, MetricKind::Additive, inverter_yield),
    metric!(EXPORT, MetricKind::Additive, export),
    metric!(IMPORT, MetricKind::Additive, import),
    metric!(CONSUMPTION, MetricKind::Additive, consumption),
    metric!(SELF_CONSUMPTION, MetricKind::Additive, self_consumption),
    metric!(CO2_AVOIDED, MetricKind::Additive, co2_avoided),
    metric!(COAL_SAVED, MetricKind::Additive, coal_saved),
    metric!(REVENUE, MetricKind::Additive, revenue),
    metric!(CHARGE, MetricKind::Additive, charge),
    metric!(DISCHARGE, MetricKind::Additive, discharge),
    metric!(THEORETICAL_YIELD, MetricKind::Additive, theoretical_yield),
    metric!(EXPORT_LIMIT_LOSS, MetricKind::Additive, export_limit_loss),
    metric!(EXPORT_LIMIT_LOSS_REVENUE, MetricKind::Additive, export_limit_loss_revenue),
    metric!(PEAK_POWER, MetricKind::Peak, peak_power),
];

/// Iterate the additive subset of the schema.
pub fn additive_fields() -> impl Iterator<Item = &'static MetricField> {
    METRIC_SCHEMA
        .iter()
        .filter(|field| field.kind == MetricKind::Additive)
}

/// Ledger values are kept at millesimal precision; repeated merges must not
/// accumulate float dust.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Output views round to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
