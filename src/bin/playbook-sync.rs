//! playbook-sync CLI Binary

use clap::Parser;
use playbook_sync::cli::{exit_code, map_error, Cli, RunContext};
use playbook_sync::config::{ConfigLoader, SyncConfig};
use playbook_sync::error::ApiError;
use playbook_sync::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    let logging_config = match build_logging_config(&cli, &config.logging) {
        Ok(logging) => logging,
        Err(e) => fail(&e),
    };
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let context = match RunContext::with_config(cli.workspace.clone(), config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            fail(&e)
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!(command = cli.command.name(), "Command completed");
            println!("{}", output);
        }
        Err(e) => {
            error!(command = cli.command.name(), "Command failed: {}", e);
            fail(&e)
        }
    }
}

fn fail(e: &ApiError) -> ! {
    eprintln!("{}", map_error(e));
    process::exit(exit_code(e));
}

fn load_config(cli: &Cli) -> Result<SyncConfig, ApiError> {
    let mut config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(&cli.workspace)?,
    };
    config.resolve_paths(&cli.workspace);
    Ok(config)
}

/// Precedence: CLI flags override the config file, which overrides defaults.
fn build_logging_config(cli: &Cli, base: &LoggingConfig) -> Result<LoggingConfig, ApiError> {
    let mut config = base.clone();

    if cli.quiet {
        config.level = "error".to_string();
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.parse()?;
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.parse()?;
    }
    if let Some(ref file) = cli.log_file {
        config.file = if file.is_relative() {
            cli.workspace.join(file)
        } else {
            file.clone()
        };
    }

    Ok(config)
}
