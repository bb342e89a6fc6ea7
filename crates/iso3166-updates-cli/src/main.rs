use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use iso3166_updates::countries::parse_country_codes;
use iso3166_updates::export::{
    DEFAULT_EXPORT_NAME, export_filename, load_aggregate, write_csv, write_json,
};
use iso3166_updates::iso::RenderConfig;
use iso3166_updates::iso::scraper::DEFAULT_RENDER_ENDPOINT;
use iso3166_updates::types::{Aggregate, CountryCode};
use iso3166_updates::utils::{UpdateStats, UpdatesFilter, YearExpression};
use iso3166_updates::{HarvestOptions, Harvester};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "iso3166-updates")]
#[command(about = "ISO 3166-2 subdivision change record harvester", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape change records from the wiki and the ISO catalogue and export them
    Fetch {
        #[arg(
            short = 'c',
            long,
            help = "Comma separated alpha-2, alpha-3 or numeric codes (default: all countries)"
        )]
        countries: Option<String>,

        #[arg(
            short = 'y',
            long,
            value_parser = parse_year,
            help = "Year filter: 2010, 2010,2015, 2010-2015, >2010 or <2010"
        )]
        year: Option<YearExpression>,

        #[arg(long, help = "Directory the JSON export is written to")]
        export_dir: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_EXPORT_NAME, help = "Base name of the export file")]
        export_name: String,

        #[arg(long, requires = "export_dir", help = "Also export a CSV file")]
        csv: bool,

        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..=32),
            help = "Number of countries fetched at once"
        )]
        concurrency: u16,

        #[arg(
            long,
            env = "ISO3166_RENDER_ENDPOINT",
            default_value = DEFAULT_RENDER_ENDPOINT,
            help = "Rendering service endpoint used for the ISO catalogue pages"
        )]
        render_endpoint: String,

        #[arg(long, default_value_t = 5.0, help = "Seconds the renderer waits for page scripts")]
        render_wait: f64,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Filter a previously exported JSON file by country and year
    Query {
        #[arg(help = "Path of the exported JSON file")]
        file: PathBuf,

        #[arg(short = 'c', long, help = "Comma separated country codes")]
        countries: Option<String>,

        #[arg(short = 'y', long, help = "Year filter, same syntax as fetch")]
        year: Option<String>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn parse_year(s: &str) -> Result<YearExpression, String> {
    s.parse::<YearExpression>().map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn print_text(aggregate: &Aggregate) {
    if aggregate.values().all(Vec::is_empty) {
        println!("No entries to display.");
        return;
    }
    for (code, records) in aggregate {
        let name = code.parse::<CountryCode>().map(|c| c.name()).unwrap_or_default();
        println!("{} {} ({} change(s))", code, name, records.len());
        for record in records {
            println!("{}", record);
        }
        println!();
    }
    print!("{}", UpdateStats::from_aggregate(aggregate));
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Fetch {
            countries,
            year,
            export_dir,
            export_name,
            csv,
            concurrency,
            render_endpoint,
            render_wait,
            format,
        } => {
            let countries = parse_country_codes(countries.as_deref().unwrap_or_default())
                .unwrap_or_else(|e| {
                    log::error!("Invalid args: {e}");
                    process::exit(1);
                });
            let year = year.unwrap_or_default();

            let render = RenderConfig {
                endpoint: render_endpoint,
                wait_secs: render_wait,
                max_attempts: 3,
                retry_delay: Duration::from_secs(2),
            };
            let options = HarvestOptions {
                year: year.clone(),
                concurrency: concurrency.into(),
            };

            let harvester = Harvester::new(render, options).unwrap_or_else(|e| {
                log::error!("Error creating harvester: {}", e);
                process::exit(1);
            });

            let report = harvester.harvest(&countries).await.unwrap_or_else(|e| {
                log::error!("Error harvesting change records: {}", e);
                process::exit(1);
            });

            if let Some(dir) = export_dir {
                let filename = export_filename(&export_name, &countries, &year);
                if let Err(e) = write_json(&report.updates, &dir, &filename) {
                    log::error!("Error exporting JSON: {}", e);
                    process::exit(1);
                }
                if csv && let Err(e) = write_csv(&report.updates, &dir, &filename) {
                    log::error!("Error exporting CSV: {}", e);
                    process::exit(1);
                }
            }

            match format {
                OutputFormat::Json => serialize_json(&report.updates),
                OutputFormat::Text => {
                    print_text(&report.updates);
                    print!("{}", report);
                }
            }
        }

        Commands::Query {
            file,
            countries,
            year,
            format,
        } => {
            let filter = UpdatesFilter::parse(countries.as_deref(), year.as_deref())
                .unwrap_or_else(|e| {
                    log::error!("Invalid args: {e}");
                    process::exit(1);
                });

            let aggregate = load_aggregate(&file).unwrap_or_else(|e| {
                log::error!("Error loading {}: {}", file.display(), e);
                process::exit(1);
            });

            let updates = filter.apply(&aggregate);
            match format {
                OutputFormat::Json => serialize_json(&updates),
                OutputFormat::Text => print_text(&updates),
            }
        }
    }
}
