// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parser::parse()                 │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validator::validate()           │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedConfig                 │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `parser` - CLI structure and clap parsing
//! - `validator` - Security validation layer
//! - `commands` - Validated command parameters

pub mod parser;
pub mod validator;

pub use parser::{parse_cli, Cli, Commands};
pub use validator::{ParseError, SecureArgParser};

use std::path::PathBuf;

/// Validated CLI configuration
///
/// This structure holds all CLI arguments after security validation.
/// All paths are canonicalized and all values are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub cpu_threads: Option<usize>,
    pub metrics_port: Option<u16>,
    pub channel_depth: usize,
}

/// Validated command variants
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Run { dry_run: bool },
    ValidateConfig { config: PathBuf },
    PrintConfig,
}

/// Parse and validate CLI arguments
///
/// This function combines parsing and validation:
/// 1. Parse CLI with clap
/// 2. Validate all paths with SecureArgParser
/// 3. Validate all numeric values
/// 4. Return ValidatedCli on success
///
/// # Returns
///
/// `ValidatedCli` with all arguments security-checked
///
/// # Errors
///
/// Returns `ParseError` if any validation fails
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

/// Validate parsed CLI arguments
///
/// Applies security validation to all CLI arguments:
/// - Path canonicalization and security checks
/// - Numeric range validation
/// - String pattern validation
///
/// # Errors
///
/// Returns `ParseError` if any validation fails
fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    // Validate global config path if provided
    let config = if let Some(ref path) = cli.config {
        // For output paths that don't exist yet, just validate the string
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
        Some(path.clone())
    } else {
        None
    };

    let state_dir = if let Some(ref path) = cli.state_dir {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
        Some(path.clone())
    } else {
        None
    };

    // Validate channel depth
    if cli.channel_depth == 0 {
        return Err(ParseError::InvalidValue {
            arg: "channel-depth".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    // Validate CPU threads if specified
    if let Some(threads) = cli.cpu_threads {
        if threads == 0 || threads > 128 {
            return Err(ParseError::InvalidValue {
                arg: "cpu-threads".to_string(),
                reason: "must be between 1 and 128".to_string(),
            });
        }
    }

    // Validate command-specific arguments
    let command = match cli.command {
        Commands::Run { dry_run } => ValidatedCommand::Run { dry_run },
        Commands::ValidateConfig { config } => {
            let validated_config = SecureArgParser::validate_path(&config.to_string_lossy())?;
            ValidatedCommand::ValidateConfig { config: validated_config }
        }
        Commands::PrintConfig => ValidatedCommand::PrintConfig,
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config,
        state_dir,
        cpu_threads: cli.cpu_threads,
        metrics_port: cli.metrics_port,
        channel_depth: cli.channel_depth,
    })
}
