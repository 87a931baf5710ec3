// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CLI Parser
//!
//! Command-line interface parsing using clap.
//!
//! This module defines the CLI structure and handles argument parsing.
//! Security validation happens in the validator module after parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser, Debug, Clone)]
#[command(name = "runner-orchestrator")]
#[command(about = concat!("Adaptive resource-management control plane for a self-hosted CI runner fleet v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Component configuration file path (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the SQLite state file (profiles, baselines, execution history)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Override the Rayon worker-pool thread count
    ///
    /// Controls how many threads the Analyzer's deep tick and the
    /// Forecaster's model refit may use concurrently. Default: sized from
    /// available cores, see `rayon_config`.
    #[arg(long)]
    pub cpu_threads: Option<usize>,

    /// Override the Prometheus metrics listener port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Event broadcast channel capacity
    ///
    /// Controls how many `OrchestratorEvent`s a lagging subscriber may fall
    /// behind before it starts missing events.
    #[arg(long, default_value = "256")]
    pub channel_depth: usize,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the control plane: sampling, enforcement, analysis, forecasting,
    /// optimization, and orchestration loops, until a shutdown signal
    /// arrives.
    Run {
        /// Build and validate optimization plans but never execute their
        /// actions against the runtime.
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a component configuration file and exit.
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },

    /// Print the fully-resolved configuration (defaults, file, and
    /// environment overlay merged) as JSON and exit.
    PrintConfig,
}

/// Parse CLI arguments
///
/// # Panics
///
/// Clap will exit the process with an appropriate error message if parsing
/// fails, or for `--help`/`--version`.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
