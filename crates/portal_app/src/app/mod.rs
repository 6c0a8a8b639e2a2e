pub(crate) mod cli;
mod commands;
pub(crate) mod config;
mod logging;
mod persistence;

use std::process::ExitCode;

use engine_logging::engine_error;

use cli::{Cli, Commands};
use config::AppConfig;

pub(crate) fn run(cli: Cli) -> ExitCode {
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let worker = matches!(cli.command, Commands::Worker);
    logging::initialize(&config, cli.log_level.as_deref(), worker, cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: cannot start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(commands::execute(cli.command, &config)) {
        Ok(code) => code,
        Err(err) => {
            engine_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
