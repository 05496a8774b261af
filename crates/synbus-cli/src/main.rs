//! # synbus CLI
//!
//! Runs synthetic spiking networks on the synbus backend and lists the
//! models it supports.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use synbus_cli::config::CliConfig;
use synbus_cli::SynbusCli;

fn main() {
    let cli = SynbusCli::parse();

    let config = match CliConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    // RUST_LOG wins over --verbose and the config file
    let default_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = cli.execute(&config) {
        error!("Command failed: {}", err);
        std::process::exit(1);
    }
}
