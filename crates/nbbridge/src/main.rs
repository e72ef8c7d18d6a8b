//! Binary entry point for the notebook bridge.

use std::process::ExitCode;

use nbbridge_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Arguments(error)) => error.exit(),
    };

    match nbbridge::run(&config) {
        Ok(outcome) => ExitCode::from(nbbridge::outcome_status(&outcome)),
        Err(error) => {
            eprintln!("nbbridge: {error}");
            ExitCode::from(error.exit_status())
        }
    }
}
