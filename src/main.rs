//! CLI entry point for `pst2mbox`.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use pst2mbox::config::{self, Config};
use pst2mbox::convert;
use pst2mbox::error::ConvertError;
use pst2mbox::model::stats::ConversionStats;

/// Convert an archived mail dump into a single mbox file.
#[derive(Parser)]
#[command(name = "pst2mbox", version, about)]
struct Cli {
    /// Source archive (JSON Lines message dump)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Destination mbox file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Overwrite an existing output file without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Append to an existing output file instead of replacing it
    #[arg(long, conflicts_with = "yes")]
    append: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Alternative configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref());

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    exit_on_interrupt();

    convert::validate_input(&cli.input)?;

    if cli.output.exists() && !cli.append && !(cli.yes || config.output.assume_yes) {
        confirm_overwrite(&cli.output)?;
    }

    let driver = config.conversion.driver();
    let pb = spinner(cli.json);

    let stats = convert::convert_file(
        &cli.input,
        &cli.output,
        &driver,
        cli.append,
        Some(&|stats: &ConversionStats| {
            pb.set_message(format!(
                "{} converted, {} failed",
                stats.processed, stats.failed
            ));
            pb.tick();
        }),
    );
    pb.finish_and_clear();
    let stats = stats?;

    if cli.json {
        print_summary_json(&cli.input, &cli.output, &stats)?;
    } else {
        print_summary_table(&cli.input, &cli.output, &stats);
    }

    Ok(())
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, config::LOG_FILE_NAME);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Exit with status 1 on Ctrl+C.
///
/// The process exit closes the output file, which releases its lock.
fn exit_on_interrupt() {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "Could not install Ctrl+C handler");
            return;
        }
    };
    std::thread::spawn(move || {
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            eprintln!("\nInterrupted");
            std::process::exit(1);
        }
    });
}

/// Ask before replacing `output`. Anything but `y`/`yes` cancels.
fn confirm_overwrite(output: &Path) -> anyhow::Result<()> {
    print!("Output file {} exists. Overwrite? (y/N) ", output.display());
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(ConvertError::Cancelled.into()),
    }
}

/// A spinner on an interactive stderr, hidden otherwise.
fn spinner(quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Converting {msg} [{elapsed_precise}]")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_summary_table(input: &Path, output: &Path, stats: &ConversionStats) {
    println!();
    println!("  {:<24} {}", "Input", input.display());
    println!("  {:<24} {}", "Output", output.display());
    println!("  {:<24} {}", "Messages converted", stats.processed);
    println!("  {:<24} {}", "Messages failed", stats.failed);
    println!("  {:<24} {}", "Attachments found", stats.attachments_found);
    println!(
        "  {:<24} {} ({})",
        "Attachments extracted",
        stats.attachments_extracted,
        format_size(stats.attachment_bytes, BINARY)
    );
    println!(
        "  {:<24} {}",
        "Output size",
        format_size(stats.total_output_size, BINARY)
    );
    println!("  {:<24} {:.2?}", "Elapsed", stats.elapsed);
    if let Some(rate) = stats.throughput() {
        println!("  {:<24} {:.1} msg/s", "Throughput", rate);
    }
    println!();
}

fn print_summary_json(input: &Path, output: &Path, stats: &ConversionStats) -> anyhow::Result<()> {
    let summary = serde_json::json!({
        "input": input.to_string_lossy(),
        "output": output.to_string_lossy(),
        "processed": stats.processed,
        "failed": stats.failed,
        "attachments_found": stats.attachments_found,
        "attachments_extracted": stats.attachments_extracted,
        "attachment_bytes": stats.attachment_bytes,
        "output_size": stats.total_output_size,
        "elapsed_ms": stats.elapsed.as_millis(),
        "messages_per_second": stats.throughput(),
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
