//! Logger setup for the `portal` binary.
//!
//! Workers log to stderr, which the parent forwards as progress; every other
//! command logs to the configured file, mirrored to the terminal with `--verbose`.

use engine_logging::{parse_level, LogDestination};

use super::config::AppConfig;

pub(crate) fn initialize(config: &AppConfig, level_override: Option<&str>, worker: bool, verbose: bool) {
    let level = parse_level(level_override.unwrap_or(&config.log_level));
    engine_logging::initialize(destination(config, worker, verbose), level);
}

fn destination(config: &AppConfig, worker: bool, verbose: bool) -> LogDestination {
    match (worker, verbose) {
        (true, _) => LogDestination::Stderr,
        (false, true) => LogDestination::Both(config.log_file.clone()),
        (false, false) => LogDestination::File(config.log_file.clone()),
    }
}
