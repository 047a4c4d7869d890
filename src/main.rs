//! PostureCheck: endpoint security posture checker.
//!
//! Thin binary entry point. All logic lives in the `posturecheck-core`
//! crate; this file wires logging, parses arguments and prints results.

mod cli;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands, ConfigCommands, OutputFormat, ProbeKind};
use posturecheck_core::config::{self, ConfigStore, StoreOptions};
use posturecheck_core::exec::{Executor, ExecutorOptions};
use posturecheck_core::probes;
use posturecheck_core::report::{self, SecurityReport};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    // Logs go to stderr so report output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("PostureCheck {} starting", env!("CARGO_PKG_VERSION"));

    let exec_options = ExecutorOptions {
        command_timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Scan { format, no_record } => {
            let exec = Executor::system(exec_options);
            let report = report::scan(&exec, Utc::now());
            print_report(&report, format)?;
            if !no_record {
                let store = open_store(cli.config)?;
                let handle = store.record_report(report.last_check());
                store.flush().context("failed to save report date")?;
                handle.wait().context("failed to save report date")?;
            }
        }
        Commands::Check { probe } => {
            let exec = Executor::system(exec_options);
            let line = match probe {
                ProbeKind::Antivirus => probes::detect_antivirus(&exec),
                ProbeKind::Encryption => {
                    probes::detect_disk_encryption(&exec).map(|kind| kind.label().to_owned())
                }
                ProbeKind::ScreenLock => probes::detect_screen_lock_minutes(&exec)
                    .map(|minutes| format!("{minutes} min")),
            };
            println!("{}", line.as_deref().unwrap_or("not detected"));
        }
        Commands::Config { command } => {
            let store = open_store(cli.config)?;
            match command {
                ConfigCommands::Show => {}
                ConfigCommands::Set { keep_in_background } => {
                    let Some(keep) = keep_in_background else {
                        bail!("nothing to set; pass --keep-in-background <true|false>");
                    };
                    let handle = store.set_keep_in_background(keep);
                    store.flush().context("failed to save config")?;
                    handle.wait().context("failed to save config")?;
                }
            }
            println!("{}", serde_json::to_string_pretty(&store.get())?);
        }
        Commands::Status => {
            let store = open_store(cli.config)?;
            let current = store.get();
            match current.last_report_date {
                Some(date) => println!("Last report: {}", date.to_rfc3339()),
                None => println!("Last report: never"),
            }
            if config::is_report_due(&current, Utc::now()) {
                println!("{}", config::REMINDER_MESSAGE);
            } else {
                println!("No scan due.");
            }
        }
    }

    Ok(())
}

fn open_store(path: Option<PathBuf>) -> anyhow::Result<ConfigStore> {
    let path = match path {
        Some(path) => path,
        None => config::default_config_path().context("no local data directory on this system")?,
    };
    ConfigStore::open(&path, StoreOptions::default())
        .with_context(|| format!("failed to open config at {}", path.display()))
}

fn print_report(report: &SecurityReport, format: OutputFormat) -> anyhow::Result<()> {
    let stdout = io::stdout();
    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Csv => report.write_csv(stdout.lock())?,
        OutputFormat::Text => {
            let mut out = stdout.lock();
            let or_missing = |value: Option<&str>| value.unwrap_or("not detected").to_owned();
            writeln!(
                out,
                "Operating system : {} {}",
                report.operating_system(),
                report.os_version()
            )?;
            writeln!(out, "Antivirus        : {}", or_missing(report.antivirus_name()))?;
            writeln!(out, "Disk encryption  : {}", or_missing(report.encryption_type()))?;
            writeln!(
                out,
                "Screen lock      : {}",
                report
                    .screen_lock_time()
                    .map(|minutes| format!("{minutes} min"))
                    .unwrap_or_else(|| "not detected".to_owned())
            )?;
            writeln!(out, "Checked at       : {}", report.last_check().to_rfc3339())?;
        }
    }
    Ok(())
}
