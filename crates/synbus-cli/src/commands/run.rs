//! Synthetic network run
//!
//! Builds `input channel -> projection -> population` for the chosen synapse
//! model and drives the channel with seeded Bernoulli input.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use synbus_core::BusStats;
use synbus_runtime::{
    AdditiveStdpParams, Backend, BackendConfig, BlifatParams, DeltaSynapseParams, PerfReport,
    Population, Projection, ProjectionEnds, ProjectionVariant, ResourceStdpBlifatNeuron,
    ResourceStdpParams, SpikeMessage, SynapticResourceParams,
};

use crate::config::{CliConfig, RunDefaults};
use crate::error::{CliError, CliResult};

/// Run a synthetic network
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Synapse model of the input projection
    #[arg(long, value_enum, default_value = "delta")]
    pub model: SynapseKind,

    /// Number of input channel neurons
    #[arg(long, default_value = "32")]
    pub inputs: u32,

    /// Number of population neurons
    #[arg(long, default_value = "8")]
    pub neurons: usize,

    /// Number of ticks
    #[arg(long, default_value = "1000")]
    pub steps: u64,

    /// Probability that an input neuron fires on a tick
    #[arg(long, default_value = "0.1")]
    pub input_rate: f64,

    /// Random seed for weights and input
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Worker threads, overrides the config file
    #[arg(long)]
    pub threads: Option<usize>,

    /// Record per-tick timing
    #[arg(long)]
    pub perf: bool,

    /// Write the JSON summary to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynapseKind {
    /// Static delta synapses
    Delta,
    /// Delta synapses with additive STDP
    AdditiveStdp,
    /// Delta synapses with synaptic resource STDP
    ResourceStdp,
}

/// Min, max and mean of a weight vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl WeightStats {
    fn of(weights: &[f32]) -> Self {
        if weights.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let min = weights.iter().copied().fold(f32::INFINITY, f32::min);
        let max = weights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = weights.iter().sum::<f32>() / weights.len() as f32;
        Self { min, max, mean }
    }
}

/// Result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub model: String,
    pub steps: u64,
    pub inputs: u32,
    pub neurons: usize,
    pub seed: u64,
    pub input_spikes: u64,
    pub output_spikes: u64,
    /// Spikes per population neuron
    pub spike_counts: Vec<u64>,
    pub initial_weights: WeightStats,
    pub final_weights: WeightStats,
    pub bus: BusStats,
    pub perf: Option<PerfReport>,
}

impl RunCommand {
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        let summary = self.simulate(config)?;
        let json = serde_json::to_string_pretty(&summary)?;
        match &self.output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)?;
                info!("Summary written to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    fn validate(&self, defaults: &RunDefaults) -> CliResult<()> {
        if self.inputs == 0 || self.neurons == 0 {
            return Err(CliError::invalid_args("--inputs and --neurons must be positive"));
        }
        if !(0.0..=1.0).contains(&self.input_rate) {
            return Err(CliError::invalid_args(format!(
                "--input-rate must lie in [0, 1], got {}",
                self.input_rate
            )));
        }
        if !defaults.max_weight.is_finite() || defaults.max_weight <= 0.0 {
            return Err(CliError::config(format!(
                "run.max_weight must be positive, got {}",
                defaults.max_weight
            )));
        }
        Ok(())
    }

    /// Build the network, run it and collect the summary
    pub fn simulate(&self, config: &CliConfig) -> CliResult<RunSummary> {
        let defaults = &config.run;
        self.validate(defaults)?;

        let mut backend_config = BackendConfig::default()
            .with_uid_strategy(config.uid_strategy)
            .with_perf(self.perf);
        if let Some(threads) = self.threads.or(config.threads) {
            backend_config = backend_config.with_threads(threads);
        }
        if let Some(interval) = config.progress_interval {
            backend_config = backend_config.with_progress_interval(interval);
        }
        let mut backend = Backend::with_config(backend_config)?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let blifat = BlifatParams::new(
            defaults.activation_threshold,
            defaults.potential_decay,
            defaults.refractory_period,
        )?;
        let channel = backend.add_input_channel(Some(self.inputs as usize))?;

        let mut synapses = Vec::with_capacity(self.inputs as usize * self.neurons);
        for post in 0..self.neurons as u32 {
            for pre in 0..self.inputs {
                let weight = rng.gen_range(0.0..defaults.max_weight);
                synapses.push((pre, post, DeltaSynapseParams::excitatory(weight, defaults.delay)?));
            }
        }

        let projection: ProjectionVariant = match self.model {
            SynapseKind::Delta | SynapseKind::AdditiveStdp => {
                let population = Population::blifat(self.neurons, blifat)?;
                let ends = ProjectionEnds::from_source(channel, Some(self.inputs as usize), &population);
                backend.add_population(population)?;
                if self.model == SynapseKind::Delta {
                    Projection::delta(ends, synapses)?.into()
                } else {
                    Projection::additive_stdp(ends, AdditiveStdpParams::default(), synapses)?.into()
                }
            }
            SynapseKind::ResourceStdp => {
                let resource = SynapticResourceParams::new(defaults.resource_max, 0.0, defaults.d_h)?;
                let neuron = ResourceStdpBlifatNeuron::new(blifat, resource)?;
                let population = Population::uniform(self.neurons, neuron)?;
                let ends = ProjectionEnds::from_source(channel, Some(self.inputs as usize), &population);
                backend.add_population(population)?;
                Projection::resource_stdp(ends, ResourceStdpParams::default(), synapses)?.into()
            }
        };
        let model = projection.model_name().to_string();
        let population_uid = projection.ends().postsynaptic_uid;
        let projection_uid = backend.add_projection(projection)?;
        let observer = backend.create_observer(&[population_uid])?;
        let initial_weights = WeightStats::of(&backend.weights(&projection_uid)?);

        info!(
            "Running {} network: {} inputs, {} neurons, {} steps",
            model, self.inputs, self.neurons, self.steps
        );
        let mut input_spikes = 0u64;
        let mut spike_counts = vec![0u64; self.neurons];
        for _ in 0..self.steps {
            let spikes: Vec<u32> = (0..self.inputs)
                .filter(|_| rng.gen_bool(self.input_rate))
                .collect();
            input_spikes += spikes.len() as u64;
            backend.send_spikes(channel, spikes)?;
            if backend.step(1)? == 0 {
                break;
            }
            for message in observer.unload_messages::<SpikeMessage>() {
                for index in message.neuron_indexes {
                    spike_counts[index as usize] += 1;
                }
            }
        }

        let summary = RunSummary {
            model,
            steps: backend.current_step(),
            inputs: self.inputs,
            neurons: self.neurons,
            seed: self.seed,
            input_spikes,
            output_spikes: backend.spike_count(&population_uid),
            spike_counts,
            initial_weights,
            final_weights: WeightStats::of(&backend.weights(&projection_uid)?),
            bus: backend.bus().stats(),
            perf: backend.perf_report(),
        };
        debug!("Run finished: {:?}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(model: SynapseKind) -> RunCommand {
        RunCommand {
            model,
            inputs: 16,
            neurons: 4,
            steps: 200,
            input_rate: 0.2,
            seed: 7,
            threads: Some(2),
            perf: false,
            output: None,
        }
    }

    #[test]
    fn test_weight_stats() {
        let stats = WeightStats::of(&[0.5, 0.1, 0.3]);
        assert_eq!(stats.min, 0.1);
        assert_eq!(stats.max, 0.5);
        assert!((stats.mean - 0.3).abs() < 1e-6);
        assert_eq!(WeightStats::of(&[]).mean, 0.0);
    }

    #[test]
    fn test_delta_run_is_static_and_seeded() {
        let config = CliConfig::default();
        let summary = command(SynapseKind::Delta).simulate(&config).unwrap();
        assert_eq!(summary.model, "Delta");
        assert_eq!(summary.steps, 200);
        assert_eq!(summary.initial_weights, summary.final_weights);
        assert_eq!(summary.spike_counts.iter().sum::<u64>(), summary.output_spikes);
        assert!(summary.output_spikes > 0);

        let again = command(SynapseKind::Delta).simulate(&config).unwrap();
        assert_eq!(summary, again);
    }

    #[test]
    fn test_plastic_runs_change_weights() {
        let config = CliConfig::default();
        for model in [SynapseKind::AdditiveStdp, SynapseKind::ResourceStdp] {
            let summary = command(model).simulate(&config).unwrap();
            assert!(summary.output_spikes > 0);
            assert_ne!(summary.initial_weights, summary.final_weights);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let config = CliConfig::default();
        let mut cmd = command(SynapseKind::Delta);
        cmd.input_rate = 1.5;
        assert!(matches!(cmd.simulate(&config), Err(CliError::InvalidArgs(_))));

        let mut cmd = command(SynapseKind::Delta);
        cmd.neurons = 0;
        assert!(matches!(cmd.simulate(&config), Err(CliError::InvalidArgs(_))));
    }
}
