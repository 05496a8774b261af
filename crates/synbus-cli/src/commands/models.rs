//! Model listing

use clap::Args;
use serde::Serialize;

use synbus_runtime::{
    AdditiveStdpDeltaSynapse, BlifatNeuron, DeltaSynapse, GroupWtaRandomHandler,
    KWtaPerGroupHandler, KWtaRandomHandler, NeuronModel, ResourceStdpBlifatNeuron,
    ResourceStdpDeltaSynapse, SpikeUnionHandler, SynapseModel,
};

use crate::error::CliResult;

/// List supported models
#[derive(Args, Debug)]
pub struct ModelsCommand {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Supported models by category
#[derive(Debug, Serialize, PartialEq)]
pub struct ModelCatalog {
    /// Neuron models
    pub neurons: Vec<&'static str>,
    /// Synapse models
    pub synapses: Vec<&'static str>,
    /// Spike handlers
    pub handlers: Vec<&'static str>,
}

impl ModelCatalog {
    /// Everything the runtime provides
    pub fn current() -> Self {
        Self {
            neurons: vec![BlifatNeuron::NAME, ResourceStdpBlifatNeuron::NAME],
            synapses: vec![
                DeltaSynapse::NAME,
                AdditiveStdpDeltaSynapse::NAME,
                ResourceStdpDeltaSynapse::NAME,
            ],
            handlers: vec![
                SpikeUnionHandler::NAME,
                KWtaRandomHandler::NAME,
                GroupWtaRandomHandler::NAME,
                KWtaPerGroupHandler::NAME,
            ],
        }
    }
}

impl ModelsCommand {
    pub fn execute(self) -> CliResult<()> {
        let catalog = ModelCatalog::current();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&catalog)?);
            return Ok(());
        }

        println!("Neuron models:");
        for name in &catalog.neurons {
            println!("  {}", name);
        }
        println!("Synapse models:");
        for name in &catalog.synapses {
            println!("  {}", name);
        }
        println!("Spike handlers:");
        for name in &catalog.handlers {
            println!("  {}", name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synbus_runtime::SpikeHandler;

    #[test]
    fn test_catalog_matches_runtime_names() {
        let catalog = ModelCatalog::current();
        assert_eq!(catalog.neurons.len(), 2);
        assert_eq!(catalog.synapses.len(), 3);
        assert!(catalog.handlers.contains(&SpikeUnionHandler.name()));
        assert!(catalog.handlers.contains(&KWtaRandomHandler::new(1, 0).name()));
        assert_eq!(catalog.handlers.len(), 4);
        assert_eq!(KWtaPerGroupHandler::NAME, "KWtaPerGroup");
    }
}
