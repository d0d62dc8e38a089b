use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use solar_ledger::pipeline::{DataPaths, RunOptions};

pub fn data_paths(dir: &Path) -> DataPaths {
    DataPaths {
        state: dir.join("starting_values.json"),
        snapshot: dir.join("daily_snapshot.json"),
        hourly_rows: dir.join("hourly_rows.json"),
        hourly_history: dir.join("hourly_generation.json"),
        tariff: dir.join("tariff_schedule.json"),
        shape: dir.join("reference_shape.json"),
        output: dir.join("processed.json"),
    }
}

pub fn run_options(day: &str, hour: u32) -> RunOptions {
    RunOptions {
        plant_name: "Nautica Shopping Centre".to_string(),
        today: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
        hour,
        retention_days: 90,
    }
}

pub fn write_snapshot(paths: &DataPaths, pv: f64, export: f64, import: f64, revenue: f64) {
    let json = format!(
        r#"{{
            "PV Yield (kWh)": {pv},
            "Inverter Yield (kWh)": {pv},
            "Export (kWh)": {export},
            "Import (kWh)": {import},
            "Revenue (R.)": {revenue},
            "Peak Power (kW)": 42.5
        }}"#
    );
    fs::write(&paths.snapshot, json).unwrap();
}

/// One season, one flat weekday schedule: peak 07-10 and 18-20, standard
/// 10-18, off-peak elsewhere; weekends entirely standard/off-peak.
pub fn write_test_tariff(paths: &DataPaths) {
    let mut weekday = vec!["off-peak"; 24];
    for slot in weekday.iter_mut().take(10).skip(7) {
        *slot = "peak";
    }
    for slot in weekday.iter_mut().take(18).skip(10) {
        *slot = "standard";
    }
    for slot in weekday.iter_mut().take(20).skip(18) {
        *slot = "peak";
    }
    let weekday_json = serde_json::to_string(&weekday).unwrap();

    let seasons: Vec<String> = (1..=12).map(|m| format!(r#""{m}": "all""#)).collect();
    let json = format!(
        r#"{{
            "rates": {{"all": {{"peak": 3.0, "standard": 2.0, "off-peak": 1.0}}}},
            "seasons": {{{seasons}}},
            "tou_schedule": {{
                "all": {{
                    "weekday": {weekday_json},
                    "saturday": {standard},
                    "sunday": {off_peak}
                }}
            }},
            "export_credits": {{"standard": 0.5}}
        }}"#,
        seasons = seasons.join(", "),
        standard = serde_json::to_string(&vec!["standard"; 24]).unwrap(),
        off_peak = serde_json::to_string(&vec!["off-peak"; 24]).unwrap(),
    );
    fs::write(&paths.tariff, json).unwrap();
}

/// A flat midday generation shape for every day of June.
pub fn write_test_shape(paths: &DataPaths) {
    let mut shape = [0.0f64; 24];
    for slot in shape.iter_mut().take(16).skip(8) {
        *slot = 1.0;
    }
    let shape_json = serde_json::to_string(&shape.to_vec()).unwrap();
    let days: Vec<String> = (1..=30).map(|d| format!(r#""06-{d:02}": {shape_json}"#)).collect();
    fs::write(&paths.shape, format!("{{{}}}", days.join(", "))).unwrap();
}
