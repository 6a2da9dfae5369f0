use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use crossbeam::channel::RecvTimeoutError;
use image_dedup_core::config::LogLevel;
use image_dedup_core::{
    logging, report, Config, ProgressTracker, ScanOutcome, ScanReport, Scanner, SkippedFile,
    UndoLedger,
};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How often the event loop wakes up to check the deadline
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "image-dedup")]
#[command(about = "Find near-duplicate images and remove them safely")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory for duplicate images
    Scan {
        /// Directory to scan
        directory: PathBuf,

        /// Minimum similarity percentage (70-100)
        #[arg(short, long)]
        threshold: Option<u8>,

        /// Only look at the top level of the directory
        #[arg(long)]
        no_recursive: bool,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a text report of the duplicate groups
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the duplicate groups as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Delete every duplicate (originals are kept); undo data goes to the backup directory
        #[arg(long)]
        delete_duplicates: bool,

        /// Where deleted files are backed up
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Stop the scan after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Write logs to rotating files in this directory instead of stderr
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Verbosity level
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "image-dedup.json")]
        path: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            directory,
            threshold,
            no_recursive,
            config,
            report: report_path,
            json: json_path,
            delete_duplicates,
            backup_dir,
            timeout,
            no_progress,
            log_dir,
            verbose,
        } => {
            // Set up configuration
            let mut config = match config {
                Some(config_path) => Config::from_file(&config_path)?,
                None => Config::default(),
            };

            // Override config with command line arguments
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            if no_recursive {
                config.recursive_search = false;
            }
            if let Some(backup_dir) = backup_dir {
                config.backup_dir = backup_dir;
            }
            match verbose {
                0 => {}
                1 => config.log_level = LogLevel::Debug,
                _ => config.log_level = LogLevel::Trace,
            }

            init_logging(&config, log_dir.as_deref())?;
            config.validate()?;

            let Some(scan) = run_scan(&config, directory, timeout, !no_progress)? else {
                return Ok(());
            };

            if let Some(path) = report_path {
                report::write_text_report(&scan.result, &path)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            if let Some(path) = json_path {
                report::write_json_report(&scan.result, &path)
                    .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
                println!("JSON written to {}", path.display());
            }

            if delete_duplicates && !scan.result.is_empty() {
                delete_all_duplicates(&config, &scan);
            }

            Ok(())
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(config: &Config, log_dir: Option<&Path>) -> anyhow::Result<()> {
    match log_dir {
        Some(dir) => logging::init_logger(dir).map_err(|e| anyhow!("{}", e)),
        None => {
            env_logger::Builder::new()
                .filter_level(config.log_level.to_level_filter())
                .parse_env(logging::LOG_ENV_VAR)
                .init();
            Ok(())
        }
    }
}

/// Run the scan on a worker thread, drive the progress bar, and print the
/// groups. Returns `None` when there is nothing to act on.
fn run_scan(
    config: &Config,
    directory: PathBuf,
    timeout: Option<u64>,
    show_progress: bool,
) -> anyhow::Result<Option<ScanReport>> {
    let scanner = Scanner::new(config.clone())?;
    let handle = scanner.spawn(directory)?;

    let token = handle.cancellation_token();
    ctrlc::set_handler(move || token.cancel()).context("Failed to install Ctrl-C handler")?;

    let tracker = show_progress.then(ProgressTracker::new);
    let deadline = timeout.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        match handle.events().recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if let Some(tracker) = &tracker {
                    tracker.handle(event);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let expired = deadline.is_some_and(|d| Instant::now() >= d);
        if expired && !handle.cancellation_token().is_cancelled() {
            warn!("Time budget exhausted, cancelling scan");
            handle.cancel();
        }
    }

    let outcome = handle.join()?;
    match &tracker {
        Some(tracker) => tracker.finish(&outcome.summary()),
        None => println!("{}", outcome.summary()),
    }

    let report = match outcome {
        ScanOutcome::Completed(report) => report,
        ScanOutcome::NotEnoughImages { skipped, .. } => {
            print_skipped(&skipped);
            return Ok(None);
        }
        ScanOutcome::Cancelled => return Ok(None),
    };

    for group in &report.result {
        println!("\n{}", group.original.display());
        for duplicate in &group.duplicates {
            println!("  = {}", duplicate.display());
        }
    }
    print_skipped(&report.skipped);

    info!(
        "{} images processed in {:.2}s",
        report.processed,
        report.elapsed.as_secs_f64()
    );
    Ok(Some(report))
}

fn print_skipped(skipped: &[SkippedFile]) {
    if skipped.is_empty() {
        return;
    }
    println!("\nSkipped {} files:", skipped.len());
    for skip in skipped {
        println!("  {} ({})", skip.path.display(), skip.reason);
    }
}

fn delete_all_duplicates(config: &Config, scan: &ScanReport) {
    let ledger = UndoLedger::from_config(config);
    let outcome = ledger.delete_all(scan.result.all_duplicates());

    println!(
        "\nDeleted {} duplicates (backups in {})",
        outcome.success_count(),
        ledger.backup_dir().display()
    );
    for failure in &outcome.failures {
        error!("{}", failure.error);
        eprintln!("  failed: {} ({})", failure.path.display(), failure.error);
    }
}
