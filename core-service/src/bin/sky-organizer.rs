//! Command-line entry point.
//!
//! ```bash
//! sky-organizer -s ~/Downloads/models -d ~/Library --workers 5 --mode copy
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use core_runtime::config::{OrganizerConfig, TransferMode};
use core_runtime::events::{CoreEvent, OrganizeEvent, RecvError};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_service::OrganizerService;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "sky-organizer")]
#[command(about = "Sort 3dsky model archives into a category tree", long_about = None)]
struct Cli {
    /// Folder holding the downloaded archives
    #[arg(short, long)]
    source: PathBuf,

    /// Folder that receives the organized tree
    #[arg(short, long)]
    destination: PathBuf,

    /// Parallel workers
    #[arg(short, long, default_value_t = 5)]
    workers: usize,

    /// Move archives or leave the originals in place
    #[arg(short, long, value_enum, default_value_t = Mode::Move)]
    mode: Mode,

    /// Pause after each archive, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// Give up on a lookup or preview download after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Leave suffixed duplicates where they are
    #[arg(long)]
    keep_duplicates: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Show debug logs
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Move,
    Copy,
}

impl From<Mode> for TransferMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Move => TransferMode::Move,
            Mode::Copy => TransferMode::Copy,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig::default()
        .with_format(if cli.json_logs { LogFormat::Json } else { LogFormat::Compact })
        .with_level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn });
    if let Err(e) = init_logging(logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let config = match OrganizerConfig::builder()
        .source_dir(&cli.source)
        .destination_dir(&cli.destination)
        .worker_count(cli.workers)
        .transfer_mode(cli.mode.into())
        .task_delay(Duration::from_millis(cli.delay_ms))
        .lookup_timeout(Duration::from_secs(cli.timeout_secs))
        .resolve_duplicates(!cli.keep_duplicates)
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = OrganizerService::new(config);
    let mut events = service.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CoreEvent::Organize(event)) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = service.organize().await;
    // Let the printer catch up before the summary lines.
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    match outcome {
        Ok(report) => {
            println!();
            println!("Processed: {}/{}", report.processed, report.total);
            println!("Placed:    {}", report.succeeded);
            println!("Failed:    {} ({} name collisions)", report.failed, report.collisions);
            if let Some(path) = &report.ledger_path {
                println!("Failures:  {}", path.display());
            }
            if let Some(e) = &report.ledger_error {
                eprintln!("Failure ledger not written: {}", e);
            }
            if let Some(e) = &report.summary_error {
                eprintln!("Root summary not written: {}", e);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_event(event: &OrganizeEvent) {
    match event {
        OrganizeEvent::RunStarted { total, .. } => println!("Organizing {} archives", total),
        OrganizeEvent::Progress {
            completed,
            total,
            percent,
            label,
            ..
        } => println!("[{:>3}%] {}/{} {}", percent, completed, total, label),
        OrganizeEvent::TaskFailed {
            file_name, reason, ..
        } => println!("       {}: {}", file_name, reason),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags_and_defaults() {
        let cli = Cli::try_parse_from(["sky-organizer", "-s", "/in", "-d", "/out"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("/in"));
        assert_eq!(cli.destination, PathBuf::from("/out"));
        assert_eq!(cli.workers, 5);
        assert!(matches!(TransferMode::from(cli.mode), TransferMode::Move));
        assert!(!cli.keep_duplicates);
    }

    #[test]
    fn test_copy_mode_and_worker_count() {
        let cli = Cli::try_parse_from([
            "sky-organizer",
            "--source",
            "/in",
            "--destination",
            "/out",
            "--workers",
            "8",
            "--mode",
            "copy",
        ])
        .unwrap();
        assert_eq!(cli.workers, 8);
        assert!(matches!(TransferMode::from(cli.mode), TransferMode::Copy));
    }

    #[test]
    fn test_destination_is_required() {
        assert!(Cli::try_parse_from(["sky-organizer", "-s", "/in"]).is_err());
    }
}
