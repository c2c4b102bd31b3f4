//! Actibin CLI - command-line interface for the binning engine
//!
//! Commands:
//! - bin: Bin a merged long-format CSV into fixed intervals
//! - validate: Check a merged CSV for undecodable rows
//! - inspect: Print a table's datasets and value columns

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use actibin::table;
use actibin::{
    AllocationPolicy, BinConfig, BinError, BinInterval, BinProcessor, BinReport, TimeRange,
    ACTIBIN_VERSION,
};

/// Actibin - bin animal-activity telemetry into fixed time intervals
#[derive(Parser)]
#[command(name = "actibin")]
#[command(author = "Fauna Telemetry Lab")]
#[command(version = ACTIBIN_VERSION)]
#[command(about = "Bin merged activity telemetry into fixed intervals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin a merged long-format CSV into fixed intervals
    Bin {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Bucket width, e.g. "15 minutes", "1 hour", "1 day"
        #[arg(long)]
        interval: String,

        /// How scalar whole-window counts are spread across minutes
        #[arg(long, value_enum)]
        allocation: AllocationPolicy,

        /// Keep only records at or after this timestamp (requires --end)
        #[arg(long)]
        start: Option<String>,

        /// Keep only records at or before this timestamp (requires --start)
        #[arg(long)]
        end: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a merged CSV for undecodable rows without writing output
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output the validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a table's datasets and value columns (for chart selection)
    Inspect {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output the inspection report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ActibinCliError> {
    match cli.command {
        Commands::Bin {
            input,
            output,
            interval,
            allocation,
            start,
            end,
            json,
        } => cmd_bin(&input, &output, &interval, allocation, start, end, json),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Inspect { input, json } => cmd_inspect(&input, json),
    }
}

fn cmd_bin(
    input: &Path,
    output: &Path,
    interval_text: &str,
    allocation: AllocationPolicy,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<(), ActibinCliError> {
    let interval = BinInterval::parse(interval_text)?;
    let mut config = BinConfig::new(interval, allocation);

    match (start, end) {
        (None, None) => {}
        (Some(start), Some(end)) => {
            let start = parse_bound(&start)?;
            let end = parse_bound(&end)?;
            if end < start {
                return Err(ActibinCliError::BadBound(
                    "--end is before --start".to_string(),
                ));
            }
            config = config.with_trim(TimeRange { start, end });
        }
        _ => {
            return Err(ActibinCliError::BadBound(
                "--start and --end must be given together".to_string(),
            ));
        }
    }

    let input_data = read_input(input)?;
    let processor = BinProcessor::new(config);

    // progress goes to stderr, and only when someone is watching
    let show_progress = atty::is(atty::Stream::Stderr);
    let mut rendered: Vec<u8> = Vec::new();
    let report = processor.process_csv_with_status(input_data.as_slice(), &mut rendered, |msg| {
        if show_progress {
            eprintln!("{msg}");
        }
    })?;

    // the table is fully rendered before anything is written
    if output.to_string_lossy() == "-" {
        io::stdout().write_all(&rendered)?;
        print_report(&report, json, &mut io::stderr())?;
    } else {
        fs::write(output, &rendered)?;
        print_report(&report, json, &mut io::stdout())?;
    }

    Ok(())
}

fn print_report(
    report: &BinReport,
    json: bool,
    out: &mut impl Write,
) -> Result<(), ActibinCliError> {
    if json {
        let view = RunReportView {
            summary: &report.summary,
            skipped: &report.skipped,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&view)?)?;
        return Ok(());
    }

    let summary = &report.summary;
    writeln!(
        out,
        "Binned {} records into {} buckets ({} minute intervals).",
        summary.records_in, summary.buckets, summary.interval_minutes
    )?;
    writeln!(out, "Expanded minutes: {}", summary.minutes_expanded)?;
    writeln!(out, "Skipped rows:     {}", summary.records_skipped)?;

    const SAMPLE: usize = 5;
    for diag in report.skipped.iter().take(SAMPLE) {
        writeln!(out, "  - row {} ({}): {}", diag.row, diag.dataset, diag.reason)?;
    }
    if report.skipped.len() > SAMPLE {
        writeln!(out, "  … and {} more", report.skipped.len() - SAMPLE)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), ActibinCliError> {
    let input_data = read_input(input)?;
    let raw = table::read_records(input_data.as_slice())?;

    let mut errors: Vec<ValidationErrorDetail> = raw
        .skipped
        .iter()
        .map(|diag| ValidationErrorDetail {
            row: diag.row,
            dataset: diag.dataset.clone(),
            error: diag.reason.clone(),
        })
        .collect();

    // dry-run the expander; decoding does not depend on the policy
    for record in &raw.records {
        if let Err(err) =
            actibin::expander::ChannelExpander::expand(record, AllocationPolicy::UniformSpread)
        {
            errors.push(ValidationErrorDetail {
                row: err.row,
                dataset: err.dataset.clone(),
                error: err.reason.clone(),
            });
        }
    }
    errors.sort_by_key(|e| e.row);

    let report = ValidationReport {
        total_rows: raw.records.len() + raw.skipped.len(),
        valid_rows: raw.records.len() + raw.skipped.len() - errors.len(),
        invalid_rows: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:   {}", report.total_rows);
        println!("Valid rows:   {}", report.valid_rows);
        println!("Invalid rows: {}", report.invalid_rows);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - row {} ({}): {}", err.row, err.dataset, err.error);
            }
        }
    }

    if report.invalid_rows > 0 {
        Err(ActibinCliError::ValidationFailed(report.invalid_rows))
    } else {
        Ok(())
    }
}

fn cmd_inspect(input: &Path, json: bool) -> Result<(), ActibinCliError> {
    let input_data = read_input(input)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input_data.as_slice());

    let headers = reader.headers()?.clone();
    let dataset_idx = headers
        .iter()
        .position(|h| h.trim() == "Dataset")
        .ok_or(BinError::MissingColumn("Dataset".to_string()))?;

    const KEY_COLUMNS: [&str; 4] = ["Dataset", "Timestamp", "Time", "BucketStart"];
    let columns: Vec<String> = headers
        .iter()
        .map(str::trim)
        .filter(|h| !KEY_COLUMNS.contains(h))
        .map(str::to_string)
        .collect();

    let mut datasets: Vec<String> = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(dataset) = row.get(dataset_idx) {
            let dataset = dataset.trim();
            if !dataset.is_empty() && !datasets.iter().any(|d| d == dataset) {
                datasets.push(dataset.to_string());
            }
        }
    }
    datasets.sort();

    let report = InspectReport { datasets, columns };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Datasets:");
        for dataset in &report.datasets {
            println!("  - {dataset}");
        }
        println!("Columns:");
        for column in &report.columns {
            println!("  - {column}");
        }
    }

    Ok(())
}

// Helper functions

fn read_input(path: &Path) -> Result<Vec<u8>, ActibinCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read(path)?)
    }
}

fn parse_bound(text: &str) -> Result<chrono::DateTime<chrono::Utc>, ActibinCliError> {
    table::parse_timestamp(text)
        .ok_or_else(|| ActibinCliError::BadBound(format!("unparsable timestamp '{text}'")))
}

// Error types

#[derive(Debug)]
enum ActibinCliError {
    Io(io::Error),
    Bin(BinError),
    Json(serde_json::Error),
    BadBound(String),
    ValidationFailed(usize),
}

impl From<io::Error> for ActibinCliError {
    fn from(e: io::Error) -> Self {
        ActibinCliError::Io(e)
    }
}

impl From<BinError> for ActibinCliError {
    fn from(e: BinError) -> Self {
        ActibinCliError::Bin(e)
    }
}

impl From<csv::Error> for ActibinCliError {
    fn from(e: csv::Error) -> Self {
        ActibinCliError::Bin(BinError::Csv(e))
    }
}

impl From<serde_json::Error> for ActibinCliError {
    fn from(e: serde_json::Error) -> Self {
        ActibinCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ActibinCliError> for CliError {
    fn from(e: ActibinCliError) -> Self {
        match e {
            ActibinCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ActibinCliError::Bin(e) => {
                let code = match &e {
                    BinError::MissingColumn(_) => "MISSING_COLUMN",
                    BinError::InvalidInterval(_) => "INVALID_INTERVAL",
                    BinError::Csv(_) => "CSV_ERROR",
                    BinError::Io(_) => "IO_ERROR",
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(
                        "Input needs Dataset, Timestamp, Act[0..5], T, Light, Vbat columns"
                            .to_string(),
                    ),
                }
            }
            ActibinCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            ActibinCliError::BadBound(msg) => CliError {
                code: "BAD_TIME_BOUND".to_string(),
                message: msg,
                hint: Some("Use ISO-8601 timestamps, e.g. 2024-03-10T00:00:00Z".to_string()),
            },
            ActibinCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{count} rows failed validation"),
                hint: Some("Fix or remove the offending rows and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct RunReportView<'a> {
    summary: &'a actibin::RunSummary,
    skipped: &'a [actibin::SkipDiagnostic],
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rows: usize,
    valid_rows: usize,
    invalid_rows: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    row: usize,
    dataset: String,
    error: String,
}

#[derive(serde::Serialize)]
struct InspectReport {
    datasets: Vec<String>,
    columns: Vec<String>,
}
