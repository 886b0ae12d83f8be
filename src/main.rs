use clap::Parser;
use deluge_sync::core::cli::Cli;
use deluge_sync::core::config::Config;
use deluge_sync::core::error::CliError;
use deluge_sync::core::runner;
use deluge_sync::core::tracing_init::init_tracing;
use std::process;
use tracing::{debug, error};

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(err.exit_code());
        }
    };

    // Initialize tracing/logging
    init_tracing(&config.logging);

    let exit_code = match run(cli, config) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            err.exit_code()
        }
    };

    if exit_code != 0 {
        process::exit(exit_code);
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref()).map_err(CliError::config)?;
    cli.apply(&mut config)?;
    config.validate_logging().map_err(CliError::config)?;
    Ok(config)
}

fn run(cli: Cli, config: Config) -> Result<i32, CliError> {
    debug!(
        command = cli.command.name(),
        config_path = ?cli.config,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "deluge-sync starting"
    );

    // Daemon calls are sequential; one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::config(anyhow::anyhow!("Failed to build Tokio runtime: {err}")))?;

    runtime.block_on(runner::run(cli.command, config, cli.rules))
}
