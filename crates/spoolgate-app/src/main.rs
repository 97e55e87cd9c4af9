// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate — held-print gateway
//
// Entry point.  Initialises logging, loads configuration, and runs one
// subcommand: the engine in console mode, the spool-port hook that enqueues
// a job, or one of the inspection helpers.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use spoolgate_core::error::Result;
use spoolgate_core::types::JobId;
use spoolgate_document::DocumentInspector;
use spoolgate_print::{ChannelGateway, EngineService, PrintQueue};

use services::app_services::{AppServices, default_config_path};
use services::console;

#[derive(Parser)]
#[command(name = "spoolgate")]
#[command(version)]
#[command(about = "Hold print jobs for operator approval, then forward or discard them", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, value_name = "FILE", env = "SPOOLGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the spool directory and ask on this terminal for each held job
    Run,

    /// Add a job to the virtual queue (called by the spool-port hook)
    Enqueue {
        /// Document name as the submitting application reported it
        #[arg(value_name = "NAME")]
        document_name: String,

        /// Declared page count (0 = unknown)
        #[arg(long, default_value = "0")]
        pages: u32,

        /// Paper width in tenths of a millimetre (0 = unknown)
        #[arg(long, default_value = "0")]
        width: u32,

        /// Paper height in tenths of a millimetre (0 = unknown)
        #[arg(long, default_value = "0")]
        height: u32,
    },

    /// List jobs held on the virtual queue
    Jobs {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Report page count and paper size of a job container
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent audit entries
    Audit {
        /// Number of entries
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,

        /// Show every entry for one document fingerprint instead
        #[arg(long, value_name = "SHA256")]
        hash: Option<String>,
    },
}

#[derive(Serialize)]
struct InspectReport {
    file: PathBuf,
    page_count: u32,
    paper_size: String,
    degraded: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match dispatch(cli.command, config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = ?e.kind(), "spoolgate failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands, config_path: PathBuf) -> Result<()> {
    match command {
        Commands::Run => run(AppServices::init(&config_path)?).await,
        Commands::Enqueue {
            document_name,
            pages,
            width,
            height,
        } => {
            let services = AppServices::init(&config_path)?;
            let JobId(id) = services
                .queue()
                .submit(&document_name, pages, width, height)?;
            println!("{id}");
            Ok(())
        }
        Commands::Jobs { json } => {
            let services = AppServices::init(&config_path)?;
            let jobs = services.queue().enumerate_jobs()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("No held jobs.");
            } else {
                for job in jobs {
                    let paper = job
                        .declared_paper()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{:>6}  {:>5}p  {:<10}  {}",
                        job.id.0, job.declared_total_pages, paper, job.document_name
                    );
                }
            }
            Ok(())
        }
        Commands::Inspect { file, json } => {
            let config = spoolgate_core::EngineConfig::load(&config_path)?;
            let inspection = DocumentInspector::new(config.paper_fallback).inspect(&file);
            let report = InspectReport {
                file,
                page_count: inspection.page_count,
                paper_size: inspection.paper_size.to_string(),
                degraded: inspection.degraded,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("File:    {}", report.file.display());
                println!("Pages:   {}", report.page_count);
                println!("Paper:   {}", report.paper_size);
                if report.degraded {
                    println!("(container unreadable; defaults shown)");
                }
            }
            Ok(())
        }
        Commands::Audit { limit, hash } => {
            let services = AppServices::init(&config_path)?;
            let Some(audit) = services.audit_log()? else {
                println!("Auditing is disabled.");
                return Ok(());
            };
            let entries = match hash {
                Some(hash) => audit.entries_for_hash(&hash)?,
                None => audit.recent_entries(limit)?,
            };
            println!("{} of {} audit entries", entries.len(), audit.count()?);
            for entry in entries {
                println!(
                    "{}  {:<9}  job {:>6}  {}  {}",
                    entry.timestamp,
                    entry.action,
                    entry.job_id.0,
                    if entry.success { "ok  " } else { "FAIL" },
                    entry.details.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}

/// Console mode: run the engine until Ctrl-C.
async fn run(services: AppServices) -> Result<()> {
    let (gateway, rx) = ChannelGateway::new();
    let mut service = EngineService::new(services.engine(Arc::new(gateway))?);
    console::spawn(rx)?;

    service.start()?;
    tracing::info!(
        watch_dir = %services.config().watch_dir.display(),
        printer = %services.config().real_printer,
        "Spoolgate running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    service.stop().await
}
