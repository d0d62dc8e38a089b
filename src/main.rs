use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use solar_ledger::config::get_config;
use solar_ledger::logging::init_logging;
use solar_ledger::pipeline::{self, DataPaths, RunOptions};
use solar_ledger::report::{Report, ReportDisplay};

#[derive(Parser)]
#[command(name = "solar-ledger")]
#[command(about = "Incremental reconciliation of daily solar plant reports into monthly and lifetime ledgers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge today's snapshot into the ledgers and publish the output view
    Run {
        /// Output the resulting report as JSON
        #[arg(long)]
        json: bool,
        /// Reconcile as this date instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Attribute snapshot differencing to this hour (0-23)
        #[arg(long)]
        hour: Option<u32>,
    },
    /// Seed a month's ledger from an authoritative bulk export
    Seed {
        /// Month to seed (YYYY-MM)
        #[arg(long)]
        month: String,
        /// JSON file with the month's totals
        #[arg(long)]
        file: PathBuf,
    },
    /// Display the last published report
    Report {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = get_config();
    let paths = DataPaths::from_config(config);

    match cli.command.unwrap_or(Commands::Run {
        json: false,
        date: None,
        hour: None,
    }) {
        Commands::Run { json, date, hour } => {
            let mut opts = RunOptions::from_config(config);
            if let Some(date_str) = date {
                opts.today = parse_date_arg(&date_str, json);
            }
            if let Some(hour) = hour {
                if hour > 23 {
                    eprintln!("Error: --hour must be between 0 and 23");
                    process::exit(1);
                }
                opts.hour = hour;
            }
            match pipeline::run(&paths, &opts) {
                Ok(outcome) => ReportDisplay::new().display(&outcome.report, json),
                Err(e) => handle_error(e, json),
            }
        }
        Commands::Seed { month, file } => {
            if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
                eprintln!("Error: invalid month format: {month}. Use YYYY-MM");
                process::exit(1);
            }
            let today = chrono::Local::now().date_naive();
            match pipeline::seed(&paths, &month, &file, today) {
                Ok(()) => {
                    println!("Seeded {month} from {}", file.display());
                    Ok(())
                }
                Err(e) => handle_error(e, false),
            }
        }
        Commands::Report { json } => match Report::load(&paths.output) {
            Ok(report) => ReportDisplay::new().display(&report, json),
            Err(e) => handle_error(e, json),
        },
    }
}

fn parse_date_arg(text: &str, json: bool) -> NaiveDate {
    match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            if !json {
                eprintln!("❌ Invalid date format: {}. Use YYYY-MM-DD", text);
            }
            process::exit(1);
        }
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
