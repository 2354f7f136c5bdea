//! sigscan
//!
//! Command-line front end for the sigprobe library: lists serial ports and
//! finds the ones whose device answers a JSON probe spec.

mod cli;
mod output;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sigprobe::{DeviceProbe, PortScanner, ProbeConfig, ProbeSpec, SystemTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.probe_config();
    match cli.command {
        Command::List { spec, json } => list(spec.as_deref(), json),
        Command::Scan { spec, json } => scan(&spec, config, json).await,
        Command::Open { path, spec } => open(&path, &spec, config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "sigscan=debug,sigprobe=debug"
    } else {
        "sigscan=info,sigprobe=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_spec(path: &Path) -> Result<ProbeSpec> {
    ProbeSpec::from_json_file(path)
        .with_context(|| format!("loading probe spec {}", path.display()))
}

fn list(spec: Option<&Path>, json: bool) -> Result<ExitCode> {
    let scanner = PortScanner::new(SystemTransport::new());

    let ports = match spec {
        Some(path) => scanner.candidates(&load_spec(path)?)?,
        None => scanner.list_ports()?,
    };

    output::print_ports(&ports, json)?;
    Ok(ExitCode::SUCCESS)
}

async fn scan(spec: &Path, config: ProbeConfig, json: bool) -> Result<ExitCode> {
    let spec = load_spec(spec)?;
    let scanner = PortScanner::with_config(SystemTransport::new(), config);

    let results = scanner.probe_all(&spec).await?;
    output::print_results(&results, json)?;

    if results.is_empty() {
        tracing::warn!("No {} found", spec.name);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn open(path: &str, spec: &Path, config: ProbeConfig) -> Result<ExitCode> {
    let spec = load_spec(spec)?;
    let mut probe = DeviceProbe::with_config(SystemTransport::new(), spec, config)?;

    probe
        .open(path)
        .await
        .with_context(|| format!("probing {path}"))?;

    println!(
        "{} answered on {}",
        probe.spec().name,
        probe.path().unwrap_or(path)
    );
    probe.close();
    Ok(ExitCode::SUCCESS)
}
