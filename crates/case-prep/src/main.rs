//! CLI entry point for loading and preprocessing case tables.

use anyhow::{Result, anyhow};
use case_prep::reporting::{OutputWriter, ResultTree};
use case_prep::{LoadSummary, Loader, LoaderConfig, VariableRegistry};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Case-table loader and preprocessor",
    long_about = "Loads a delimited case table, coerces every declared variable to its type,\n\
                  drops cases missing mandatory variables and publishes per-case warnings.\n\n\
                  EXAMPLES:\n  \
                  # Load with a JSON variable registry\n  \
                  case-prep -i cases.csv -v variables.json\n\n  \
                  # Identify cases by hospital and case number\n  \
                  case-prep -i cases.csv -v variables.json --case-id HOSPITAL --case-id NUM\n\n  \
                  # Semicolon-separated input, JSON summary on stdout\n  \
                  case-prep -i cases.csv -v variables.json --separator ';' --json"
)]
struct Args {
    /// Path to the case file to load
    #[arg(short, long)]
    input: String,

    /// Path to the JSON variable registry
    #[arg(short, long)]
    variables: String,

    /// Output directory for the cleaned table and results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Output file name (without extension)
    ///
    /// If not specified, uses the input file name
    #[arg(long)]
    output_name: Option<String>,

    /// Variable identifying a case in warnings (repeatable)
    ///
    /// If not specified, cases are identified by row number
    #[arg(long = "case-id")]
    case_id: Vec<String>,

    /// Token read as a missing value (repeatable)
    ///
    /// Replaces the default of a single space
    #[arg(long = "na-value")]
    na_value: Vec<String>,

    /// Do not read the standard tokens (NA, NULL, NaN, ...) as missing
    #[arg(long)]
    no_default_na: bool,

    /// Field separator of the input file
    #[arg(long, default_value = ",")]
    separator: char,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output the load summary as JSON to stdout
    ///
    /// Disables all logs; only the JSON summary is printed.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, no subscriber is installed so stdout only
/// carries the JSON summary.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let registry = VariableRegistry::from_path(&args.variables)
        .map_err(|e| anyhow!("Failed to read variables from {}: {}", args.variables, e))?;
    info!("{} variables declared", registry.len());

    let config = build_config(&args)?;
    let loader = build_loader(&args, registry, config)?;

    run_load(loader, &args)
}

fn build_config(args: &Args) -> Result<LoaderConfig> {
    let separator = u8::try_from(args.separator)
        .map_err(|_| anyhow!("Separator must be a single-byte character: {:?}", args.separator))?;

    let mut builder = LoaderConfig::builder()
        .separator(separator)
        .keep_default_na(!args.no_default_na);
    if !args.na_value.is_empty() {
        builder = builder.na_values(args.na_value.iter().cloned());
    }

    Ok(builder.build()?)
}

fn build_loader(args: &Args, registry: VariableRegistry, config: LoaderConfig) -> Result<Loader> {
    let mut builder = Loader::builder().registry(registry).config(config);

    if !args.case_id.is_empty() {
        builder = builder.case_id_columns(args.case_id.iter().cloned());
    }

    if !args.quiet {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Load the input, write the outputs and print the summary.
fn run_load(mut loader: Loader, args: &Args) -> Result<()> {
    let mut results = ResultTree::new();

    let outcome = match loader.load_detailed(&args.input, &mut results) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Load failed: {}", e);
            return Err(anyhow!("Load failed: {}", e));
        }
    };
    let mut df = outcome.data;
    let summary = outcome.summary;

    let warnings_id = format!(
        "{}.{}",
        loader.config().warnings_container,
        loader.config().warnings_table_id
    );
    let color = if summary.warnings_published == 0 { "green" } else { "orange" };
    results.add_label(
        &warnings_id,
        color,
        &format!("{} warnings", summary.warnings_published),
    )?;

    let output_name = args
        .output_name
        .clone()
        .unwrap_or_else(|| extract_file_stem(&args.input));
    let writer = OutputWriter::new(&args.output, output_name);
    let written = writer.write_all(&mut df, &results, Some(&summary))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_human_readable_summary(&summary, &written.table, loader.warnings().len());
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the load.
fn print_human_readable_summary(summary: &LoadSummary, output_path: &Path, warnings: usize) {
    let report = &summary.report;

    println!();
    println!("{}", "=".repeat(80));
    println!("LOAD COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        summary.source, summary.rows_read, summary.columns_read
    );
    println!(
        "Output: {} ({} rows x {} columns)",
        output_path.display(),
        summary.rows_kept(),
        summary.columns_after
    );
    println!();

    println!("Load Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Cases: {} -> {} ({} dropped, {:.1}%)",
        summary.rows_read,
        summary.rows_kept(),
        summary.rows_dropped(),
        summary.rows_dropped_percentage()
    );
    println!(
        "  Derived variables: {} before coercion, {} after",
        report.derived_pre.len(),
        report.derived_post.len()
    );
    println!("  Warnings: {}", warnings);
    println!();

    let touched: Vec<_> = report
        .variables
        .iter()
        .filter(|v| v.values_invalidated > 0 || v.rows_dropped > 0)
        .collect();
    if !touched.is_empty() {
        println!(
            "{:<20} {:<10} {:<12} {:<12} {:<10}",
            "Variable", "Type", "Missing", "Invalidated", "Dropped"
        );
        println!("{}", "-".repeat(66));
        for variable in touched {
            println!(
                "{:<20} {:<10} {:<12} {:<12} {:<10}",
                truncate_str(&variable.name, 19),
                variable.declared_type,
                variable.missing_after_coercion,
                variable.values_invalidated,
                variable.rows_dropped
            );
        }
        println!();
    }

    println!("{}", "=".repeat(80));
}

/// Truncate a string to max length with ellipsis.
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
