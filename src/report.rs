//! Output Formatting and Report Assembly
//!
//! Builds the combined output view published after every run: today's and
//! yesterday's snapshots, the current month, the full monthly and lifetime
//! tables, all-time totals, and the best-effort savings and hourly
//! sections. Every value in the published view is rounded to 2 decimals;
//! the persisted ledger keeps 3.
//!
//! Also renders the human-readable run summary for the terminal, and the
//! `--json` machine form.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::hourly::{DayProfile, HOURS_PER_DAY};
use crate::models::{DatedTotals, PeriodEntry, PeriodTotals};
use crate::tariff::SavingsReport;

/// Per-hour monthly averages for each tracked profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyAverages {
    pub generation: [f64; HOURS_PER_DAY],
    pub load: [f64; HOURS_PER_DAY],
    pub grid_import: [f64; HOURS_PER_DAY],
}

impl Default for HourlyAverages {
    fn default() -> Self {
        Self {
            generation: [0.0; HOURS_PER_DAY],
            load: [0.0; HOURS_PER_DAY],
            grid_import: [0.0; HOURS_PER_DAY],
        }
    }
}

/// The `hourly` section of the output view: today's generation, load and
/// grid-import arrays plus the month's per-hour averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlySection {
    pub today: DayProfile,
    pub current_hour: u32,
    pub monthly_averages: HourlyAverages,
}

impl HourlySection {
    /// Generation recorded for an hour; zero when the hour is out of range,
    /// which an externally edited report file may carry.
    pub fn generation_at(&self, hour: u32) -> f64 {
        self.today
            .generation
            .get(hour as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

/// The combined output view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub plant: String,
    pub last_updated: String,

    /// `null` until a second day of data exists.
    pub yesterday: Option<DatedTotals>,
    pub today: DatedTotals,
    pub current_month: PeriodEntry,

    pub monthly: BTreeMap<String, PeriodTotals>,
    pub lifetime: BTreeMap<String, PeriodTotals>,
    pub all_time_totals: PeriodTotals,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<SavingsReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<HourlySection>,
}

impl Report {
    /// Write the report file. Plain overwrite; the report is a derived
    /// view, fully rebuilt on the next run.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        fs::write(path, content)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read report: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse report: {}", path.display()))
    }
}

/// Terminal rendering of a report.
pub struct ReportDisplay;

impl Default for ReportDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDisplay {
    pub fn new() -> Self {
        Self
    }

    pub fn display(&self, report: &Report, json_output: bool) -> Result<()> {
        if json_output {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        self.print_summary(report);
        Ok(())
    }

    fn print_summary(&self, report: &Report) {
        println!("\n{} {}", "☀️".bold(), report.plant.bold());
        println!("   {}", format!("updated {}", report.last_updated).dimmed());

        let today = &report.today.data;
        println!("\n{}", format!("Today ({})", report.today.date).bold());
        println!("  ⚡ PV Yield:      {}", format_kwh(today.pv_yield).green());
        println!("  📤 Export:        {}", format_kwh(today.export).cyan());
        println!("  📥 Import:        {}", format_kwh(today.import).yellow());
        println!("  🏠 Consumption:   {}", format_kwh(today.consumption));
        println!("  💰 Revenue:       R {:.2}", today.revenue);

        println!("\n{}", "Running totals".bold());
        println!(
            "  📅 Month-to-date PV ({}): {}",
            report.current_month.period,
            format_kwh(report.current_month.data.pv_yield).green()
        );
        if let Some((year, totals)) = report.lifetime.iter().next_back() {
            println!("  📅 Year-to-date PV ({}):   {}", year, format_kwh(totals.pv_yield).green());
        }
        println!(
            "  🌍 All-time PV:            {}",
            format_kwh(report.all_time_totals.pv_yield).green().bold()
        );

        if let Some(savings) = &report.savings {
            println!("\n{}", "TOU savings".bold());
            println!(
                "  💡 Today:    R {:.2} (peak {:.2} / standard {:.2} / off-peak {:.2})",
                savings.today.pv.total,
                savings.today.pv.peak,
                savings.today.pv.standard,
                savings.today.pv.off_peak,
            );
            println!("  💡 Month:    R {:.2}", savings.month.pv.total);
            println!("  💡 Lifetime: R {:.2} (estimated)", savings.lifetime.pv.total);
            if savings.today.export.total > 0.0 {
                println!("  📤 Export credit today: R {:.2}", savings.today.export.total);
            }
        }

        if let Some(hourly) = &report.hourly {
            println!(
                "\n  🕐 Hour {:02}:00 generation: {}",
                hourly.current_hour,
                format_kwh(hourly.generation_at(hourly.current_hour))
            );
        }
        println!();
    }
}

fn format_kwh(value: f64) -> String {
    format!("{value:.2} kWh")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_report() -> Report {
        let data = PeriodTotals {
            pv_yield: 100.0,
            export: 20.0,
            import: 5.0,
            consumption: 85.0,
            self_consumption: 80.0,
            ..Default::default()
        };
        Report {
            plant: "Nautica Shopping Centre".to_string(),
            last_updated: "2025-06-02 14:00".to_string(),
            yesterday: None,
            today: DatedTotals { date: "2025-06-02".to_string(), data: data.clone() },
            current_month: PeriodEntry { period: "2025-06".to_string(), data: data.clone() },
            monthly: BTreeMap::from([("2025-06".to_string(), data.clone())]),
            lifetime: BTreeMap::from([("2025".to_string(), data.clone())]),
            all_time_totals: data,
            savings: None,
            hourly: None,
        }
    }

    #[test]
    fn test_report_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.json");
        sample_report().save(&path).unwrap();

        let loaded = Report::load(&path).unwrap();
        assert_eq!(loaded.plant, "Nautica Shopping Centre");
        assert_eq!(loaded.today.data.pv_yield, 100.0);
        assert!(loaded.yesterday.is_none());
    }

    #[test]
    fn test_generation_lookup_tolerates_out_of_range_hour() {
        let mut section = HourlySection {
            today: DayProfile::default(),
            current_hour: 99,
            monthly_averages: HourlyAverages::default(),
        };
        section.today.generation[9] = 12.5;

        assert_eq!(section.generation_at(9), 12.5);
        assert_eq!(section.generation_at(99), 0.0);
    }

    #[test]
    fn test_hourly_section_carries_all_three_profiles() {
        let mut section = HourlySection {
            today: DayProfile::default(),
            current_hour: 10,
            monthly_averages: HourlyAverages::default(),
        };
        section.today.generation[10] = 20.0;
        section.today.load[10] = 15.0;
        section.today.grid_import[10] = 2.5;
        section.monthly_averages.load[10] = 14.0;

        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["today"]["generation"][10], 20.0);
        assert_eq!(json["today"]["load"][10], 15.0);
        assert_eq!(json["today"]["grid_import"][10], 2.5);
        assert_eq!(json["monthly_averages"]["load"][10], 14.0);
    }

    #[test]
    fn test_yesterday_serializes_as_null() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert!(json.get("yesterday").unwrap().is_null());
        // Best-effort sections are absent, not null.
        assert!(json.get("savings").is_none());
        assert!(json.get("hourly").is_none());
    }
}
