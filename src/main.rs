//! cni-noop - CNI plugin that configures nothing

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use cni_skel::noop::{Noop, SUPPORTED_VERSIONS};
use cni_skel::version::ProtocolVersion;
use cni_skel::{logging, plugin_main, PluginSupports};

const ABOUT: &str = concat!("CNI noop plugin v", env!("CARGO_PKG_VERSION"));

/// Runtimes invoke plugins without arguments, so every option has an
/// environment fallback.
#[derive(Parser)]
#[command(name = "cni-noop")]
#[command(version, about = "CNI plugin that records invocations and configures nothing")]
struct Cli {
    /// Log filter directive (logs go to stderr)
    #[arg(long, env = "CNI_NOOP_LOG_LEVEL", default_value = logging::DEFAULT_FILTER)]
    log_level: String,

    /// Protocol versions to advertise, in preference order
    #[arg(
        long,
        env = "CNI_NOOP_SUPPORTED_VERSIONS",
        value_delimiter = ',',
        default_values = SUPPORTED_VERSIONS
    )]
    supported_versions: Vec<String>,
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    for version in &cli.supported_versions {
        version
            .parse::<ProtocolVersion>()
            .with_context(|| format!("Invalid supported version: {}", version))?;
    }

    let info = PluginSupports::new(cli.supported_versions);
    plugin_main(&Noop, &info, ABOUT);
    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
