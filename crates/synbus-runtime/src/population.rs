//! Neuron populations

use synbus_core::{BaseData, SpikeMessage, Step, SynapticImpactMessage, TagMap, Uid};

use crate::error::*;
use crate::neuron::{BlifatNeuron, BlifatParams, NeuronModel, ResourceStdpBlifatNeuron};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Anything with a UID and a fixed number of neurons
pub trait NeuronGroup {
    /// Group UID
    fn uid(&self) -> Uid;
    /// Number of neurons
    fn size(&self) -> usize;
}

/// A homogeneous group of neurons of one model
#[derive(Debug, Clone)]
pub struct Population<N: NeuronModel> {
    base: BaseData,
    neurons: Vec<N>,
}

impl<N: NeuronModel> Population<N> {
    /// Create a population from individual neurons
    pub fn from_neurons(neurons: Vec<N>) -> Result<Self> {
        if neurons.is_empty() {
            return Err(RuntimeError::invalid_config("population must have at least one neuron"));
        }
        Ok(Self {
            base: BaseData::new(),
            neurons,
        })
    }

    /// Create `size` neurons with a generator called once per index
    pub fn generate(size: usize, generator: impl FnMut(usize) -> Result<N>) -> Result<Self> {
        let neurons = (0..size).map(generator).collect::<Result<Vec<_>>>()?;
        Self::from_neurons(neurons)
    }

    /// Create `size` copies of `neuron`
    pub fn uniform(size: usize, neuron: N) -> Result<Self> {
        Self::from_neurons(vec![neuron; size])
    }

    /// Replace the generated UID
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.base.uid = uid;
        self
    }

    /// Population UID
    pub fn uid(&self) -> Uid {
        self.base.uid
    }

    /// Number of neurons
    pub fn size(&self) -> usize {
        self.neurons.len()
    }

    /// Metadata
    pub fn tags(&self) -> &TagMap {
        &self.base.tags
    }

    /// Mutable metadata
    pub fn tags_mut(&mut self) -> &mut TagMap {
        &mut self.base.tags
    }

    /// Neuron by index
    pub fn neuron(&self, index: usize) -> Option<&N> {
        self.neurons.get(index)
    }

    /// Mutable neuron by index
    pub fn neuron_mut(&mut self, index: usize) -> Option<&mut N> {
        self.neurons.get_mut(index)
    }

    /// All neurons
    pub fn neurons(&self) -> &[N] {
        &self.neurons
    }

    /// Membrane potentials in index order
    pub fn potentials(&self) -> Vec<f32> {
        self.neurons.iter().map(N::potential).collect()
    }

    /// Advance all neurons one tick.
    ///
    /// Impacts addressed to another population are skipped, and so are
    /// impacts naming a neuron index outside this population.
    pub fn calculate(&mut self, impacts: &[SynapticImpactMessage], step: Step) -> SpikeMessage {
        let uid = self.base.uid;

        #[cfg(feature = "parallel")]
        self.neurons.par_iter_mut().for_each(N::pre_impact);
        #[cfg(not(feature = "parallel"))]
        self.neurons.iter_mut().for_each(N::pre_impact);

        let size = self.neurons.len();
        for message in impacts {
            if message.postsynaptic_population_uid != uid {
                log::warn!(
                    "Population {} received impacts for {}",
                    uid,
                    message.postsynaptic_population_uid
                );
                continue;
            }
            for impact in &message.impacts {
                match self.neurons.get_mut(impact.postsynaptic_neuron_index as usize) {
                    Some(neuron) => neuron.impact(impact, message.is_forcing),
                    None => log::warn!(
                        "Impact for neuron {} of {} ignored (size {})",
                        impact.postsynaptic_neuron_index,
                        uid,
                        size
                    ),
                }
            }
        }

        #[cfg(feature = "parallel")]
        let fired: Vec<u32> = self
            .neurons
            .par_iter_mut()
            .enumerate()
            .filter_map(|(i, n)| n.post_impact().then_some(i as u32))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let fired: Vec<u32> = self
            .neurons
            .iter_mut()
            .enumerate()
            .filter_map(|(i, n)| n.post_impact().then_some(i as u32))
            .collect();

        if !fired.is_empty() {
            log::trace!("Population {} step {}: {} spikes", uid, step, fired.len());
        }
        SpikeMessage::new(uid, step, fired)
    }
}

impl Population<BlifatNeuron> {
    /// BLIFAT population with shared parameters
    pub fn blifat(size: usize, params: BlifatParams) -> Result<Self> {
        Self::uniform(size, BlifatNeuron::new(params)?)
    }
}

impl<N: NeuronModel> NeuronGroup for Population<N> {
    fn uid(&self) -> Uid {
        self.base.uid
    }

    fn size(&self) -> usize {
        self.neurons.len()
    }
}

/// Closed set of population types the backend can hold
#[derive(Debug, Clone)]
pub enum PopulationVariant {
    /// Plain BLIFAT neurons
    Blifat(Population<BlifatNeuron>),
    /// BLIFAT neurons trained by resource STDP
    ResourceStdpBlifat(Population<ResourceStdpBlifatNeuron>),
}

macro_rules! dispatch_population {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            PopulationVariant::Blifat($p) => $body,
            PopulationVariant::ResourceStdpBlifat($p) => $body,
        }
    };
}

impl PopulationVariant {
    /// Population UID
    pub fn uid(&self) -> Uid {
        dispatch_population!(self, p => p.uid())
    }

    /// Number of neurons
    pub fn size(&self) -> usize {
        dispatch_population!(self, p => p.size())
    }

    /// Neuron model name
    pub fn model_name(&self) -> &'static str {
        match self {
            PopulationVariant::Blifat(_) => BlifatNeuron::NAME,
            PopulationVariant::ResourceStdpBlifat(_) => ResourceStdpBlifatNeuron::NAME,
        }
    }

    /// Metadata
    pub fn tags(&self) -> &TagMap {
        dispatch_population!(self, p => p.tags())
    }

    /// Mutable metadata
    pub fn tags_mut(&mut self) -> &mut TagMap {
        dispatch_population!(self, p => p.tags_mut())
    }

    /// Membrane potentials in index order
    pub fn potentials(&self) -> Vec<f32> {
        dispatch_population!(self, p => p.potentials())
    }

    /// Advance all neurons one tick
    pub fn calculate(&mut self, impacts: &[SynapticImpactMessage], step: Step) -> SpikeMessage {
        dispatch_population!(self, p => p.calculate(impacts, step))
    }

    /// Free synaptic resource per neuron, for resource STDP populations
    pub fn free_resources(&self) -> Option<Vec<f32>> {
        match self {
            PopulationVariant::ResourceStdpBlifat(p) => Some(
                p.neurons()
                    .iter()
                    .map(|n| n.resource.free_synaptic_resource)
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl NeuronGroup for PopulationVariant {
    fn uid(&self) -> Uid {
        PopulationVariant::uid(self)
    }

    fn size(&self) -> usize {
        PopulationVariant::size(self)
    }
}

impl From<Population<BlifatNeuron>> for PopulationVariant {
    fn from(p: Population<BlifatNeuron>) -> Self {
        PopulationVariant::Blifat(p)
    }
}

impl From<Population<ResourceStdpBlifatNeuron>> for PopulationVariant {
    fn from(p: Population<ResourceStdpBlifatNeuron>) -> Self {
        PopulationVariant::ResourceStdpBlifat(p)
    }
}
