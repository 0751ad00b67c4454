// ABOUTME: Entry point for the haul CLI application.
// ABOUTME: Parses arguments, wires the real collaborators, and maps errors to exit codes.

mod cli;

use clap::Parser;
use cli::Cli;
use haul::config::Config;
use haul::error::{Error, Result};
use haul::output::{Output, OutputMode};
use haul::registry::HttpProbe;
use haul::runtime::connect_local;
use haul::transfer::{Transfer, TransferReport, TransferSettings};
use haul::tunnel::executor_for;
use haul::types::TransferRequest;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = cli::exit_code_for(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // RUST_LOG wins over the verbose flag when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output_mode());

    match run(cli, &output).await {
        Ok(report) => print_report(&output, &report),
        Err(e) => {
            output.error(&e.to_string());
            if e.is_usage() {
                eprintln!("Usage: haul [OPTIONS] [USER@]HOST[:PORT] IMAGE...");
            }
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<TransferReport> {
    let request = TransferRequest::parse(&cli.target, &cli.images, cli.ssh_opts)?;

    let cwd = env::current_dir()
        .map_err(|e| Error::Config(format!("cannot determine working directory: {}", e)))?;
    let mut config = Config::resolve(cli.config.as_deref(), &cwd)?;
    if let Some(port) = cli.port {
        config.registry.port = port;
    }

    let executor = executor_for(&config.ssh, request.ssh_opts())?;
    let runtime = connect_local(&config.local).await?;
    let probe = HttpProbe::default();

    let settings = TransferSettings {
        registry: config.registry,
        remote_runtime: config.remote.runtime,
    };
    let transfer = Transfer::new(&runtime, &probe, executor.as_ref(), settings, output);
    transfer.run_until(&request, shutdown_signal()).await
}

fn print_report(output: &Output, report: &TransferReport) {
    let message = format!(
        "Transferred {} image(s) to {}",
        report.images.len(),
        report.target
    );
    if output.mode() == OutputMode::Normal {
        for image in &report.images {
            output.progress(image);
        }
    }
    output.success(&message);
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
