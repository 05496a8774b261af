//! Simulation runtime for the synbus spiking simulator
//!
//! This crate builds on the messaging core with BLIFAT neuron populations,
//! delayed delta projections with additive and resource-based STDP, spike
//! handlers, and the tick-driven [`Backend`] that wires them to the bus.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod backend;
pub mod error;
pub mod handlers;
pub mod neuron;
pub mod plasticity;
pub mod population;
pub mod projection;
pub mod synapse;

// Re-export the messaging layer
pub use synbus_core::{
    MessageBus, MessageEndpoint, OutputType, SpikeMessage, Step, SynapticImpact,
    SynapticImpactMessage, TagMap, TagValue, Uid, UidStrategy,
};

// Re-export essential types
pub use backend::{Backend, BackendConfig, BackendStats, PerfReport, StopHandle};
pub use error::{Result, RuntimeError};
pub use handlers::{
    GroupWtaRandomHandler, KWtaPerGroupHandler, KWtaRandomHandler, SpikeHandler,
    SpikeUnionHandler,
};
pub use neuron::{
    BlifatNeuron, BlifatParams, BlifatState, NeuronModel, ResourceStdpBlifatNeuron,
    IsiPeriod, SynapticResourceParams, SynapticResourceState,
};
pub use plasticity::{
    resource_from_weight, train_synaptic_resource, weight_from_resource, AdditiveStdpParams,
    AdditiveStdpState, ExpTrace, ResourceStdpParams, ResourceStdpState,
};
pub use population::{NeuronGroup, Population, PopulationVariant};
pub use projection::{
    AdditiveStdpProjection, DeltaProjection, Projection, ProjectionEnds, ProjectionVariant,
    ResourceStdpProjection,
};
pub use synapse::{
    AdditiveStdpDeltaSynapse, DeltaSynapse, DeltaSynapseParams, ResourceStdpDeltaSynapse,
    Synapse, SynapseModel, MAX_DELAY,
};
