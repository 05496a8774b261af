//! CLI command implementations for synbus

use clap::{Parser, Subcommand};

use crate::config::CliConfig;
use crate::error::CliResult;

pub mod models;
pub mod run;

/// synbus - event-driven spiking network simulator
#[derive(Parser, Debug)]
#[command(
    name = "synbus",
    version,
    about = "Event-driven spiking network simulator",
    long_about = "synbus wires BLIFAT populations and delta projections through a \
                  message bus and advances them tick by tick. Run synthetic networks \
                  with static or plastic synapses and inspect the supported models."
)]
pub struct SynbusCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SYNBUS_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a synthetic network driven by random input
    #[command(alias = "sim")]
    Run(run::RunCommand),

    /// List supported neuron, synapse and handler models
    Models(models::ModelsCommand),
}

impl SynbusCli {
    /// Execute the CLI command
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute(config),
            Commands::Models(cmd) => cmd.execute(),
        }
    }
}
