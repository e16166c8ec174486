//! # Hexgarden
//!
//! Headless runner for the Hexgarden simulation.
//!
//! Loads a configuration (the first argument, if given), plants a small demo
//! garden and runs it for a simulated day, logging what happened.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use hexgarden_sim::SimConfig;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("hexgarden=info".parse()?))
        .init();

    info!("Hexgarden starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            SimConfig::load(&path).with_context(|| format!("loading config from {}", path.display()))?
        },
        None => SimConfig::default(),
    };
    config.validate().context("validating config")?;

    let report = demo::run(config, demo::DemoOptions::default());
    report.log();

    info!("Hexgarden shutdown complete");
    Ok(())
}
