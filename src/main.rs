mod cli;
mod config;
mod device;
mod error;
mod filter;
mod sync;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use colored::Colorize;
use config::Config;
use device::{BootInfo, MountedVolumeResolver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync::output::{HumanReporter, JsonReporter, Reporter};
use sync::SyncEngine;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    // Validate arguments
    cli.validate()?;

    // Load config file
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let options = cli.deploy_options(&config, &cwd);
    let show_text = !cli.quiet && !cli.json;

    // Everything fatal happens here, before the device is touched
    let (source, destination) = options.resolve_roots(&MountedVolumeResolver::for_current_platform())?;

    if show_text {
        println!("circdeploy v{}", env!("CARGO_PKG_VERSION"));
        if let Some(info) = BootInfo::read(&destination) {
            println!(
                "Found device ({}) at {}, running CircuitPython {}\n",
                info.board_id.as_deref().unwrap_or("unknown board"),
                destination.display(),
                info.version
            );
        }
    }

    // First Ctrl-C lets the current file finish, a second one exits at once
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("Interrupt received, stopping after the current file (Ctrl-C again to abort)");
            cancel.store(true, Ordering::SeqCst);

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Aborted".red());
                std::process::exit(130);
            }
        });
    }

    let mut reporter: Box<dyn Reporter + Send> = if cli.json {
        Box::new(JsonReporter)
    } else {
        Box::new(HumanReporter::new(cli.quiet, cli.verbose > 0))
    };

    let engine = SyncEngine::new(&options, cancel);
    let report = tokio::task::spawn_blocking(move || {
        engine.sync(&source, &destination, reporter.as_mut())
    })
    .await
    .context("Deploy task panicked")?;

    if report.has_failures() {
        if show_text {
            eprintln!(
                "{}",
                format!(
                    "{} file operation(s) failed; files already written were kept",
                    report.failures().count()
                )
                .red()
            );
        }
        std::process::exit(1);
    }

    if report.was_interrupted() && show_text {
        eprintln!("{}", "Interrupted; remaining files were left as they were".yellow());
    }

    Ok(())
}
