//! Delta synapse models
//!
//! A delta synapse delivers its weight as a single impact `delay` ticks after
//! the presynaptic spike. The learning variants differ only in the per-synapse
//! rule state and in the hooks a [`crate::Projection`] calls while it processes
//! spikes.

use std::fmt;

use synbus_core::{OutputType, Step};

use crate::error::*;
use crate::plasticity::{
    resource_from_weight, AdditiveStdpParams, AdditiveStdpState, ResourceStdpParams,
    ResourceStdpState,
};

/// Largest accepted synapse delay in ticks. Projections allocate one delay
/// buffer slot per tick up to their longest delay.
pub const MAX_DELAY: u32 = 65_536;

/// Parameters every delta synapse carries
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaSynapseParams {
    /// Impact value
    pub weight: f32,
    /// Ticks between the presynaptic spike and the impact, in `[1, MAX_DELAY]`
    pub delay: u32,
    /// How the impact acts on the postsynaptic neuron
    pub output_type: OutputType,
}

impl Default for DeltaSynapseParams {
    fn default() -> Self {
        Self {
            weight: 0.0,
            delay: 1,
            output_type: OutputType::Excitatory,
        }
    }
}

impl DeltaSynapseParams {
    /// Create parameters with validation
    pub fn new(weight: f32, delay: u32, output_type: OutputType) -> Result<Self> {
        let params = Self {
            weight,
            delay,
            output_type,
        };
        params.validate()?;
        Ok(params)
    }

    /// Excitatory synapse
    pub fn excitatory(weight: f32, delay: u32) -> Result<Self> {
        Self::new(weight, delay, OutputType::Excitatory)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_finite("weight", self.weight)?;
        if self.delay == 0 || self.delay > MAX_DELAY {
            return Err(RuntimeError::invalid_parameter(
                "delay",
                self.delay.to_string(),
                format!("in [1, {}]", MAX_DELAY),
            ));
        }
        Ok(())
    }
}

/// One connection between a presynaptic and a postsynaptic neuron
#[derive(Debug, Clone)]
pub struct Synapse<M: SynapseModel> {
    presynaptic: u32,
    postsynaptic: u32,
    /// Weight, delay and output type
    pub params: DeltaSynapseParams,
    /// Learning rule state
    pub rule: M::Rule,
}

impl<M: SynapseModel> Synapse<M> {
    pub(crate) fn new(
        presynaptic: u32,
        postsynaptic: u32,
        params: DeltaSynapseParams,
        rule: M::Rule,
    ) -> Self {
        Self {
            presynaptic,
            postsynaptic,
            params,
            rule,
        }
    }

    /// Presynaptic neuron index
    pub fn presynaptic(&self) -> u32 {
        self.presynaptic
    }

    /// Postsynaptic neuron index
    pub fn postsynaptic(&self) -> u32 {
        self.postsynaptic
    }
}

/// Behaviour of a synapse type inside a [`crate::Projection`]
pub trait SynapseModel: Sized + fmt::Debug + Send + Sync + 'static {
    /// Per-synapse learning state
    type Rule: Clone + fmt::Debug + Send + Sync;
    /// Learning parameters shared by every synapse of a projection
    type Shared: Clone + fmt::Debug + Default + Send + Sync;

    /// Human readable model name
    const NAME: &'static str;

    /// Whether the projection must also see spikes of its postsynaptic population
    const LEARNS_FROM_POSTSYNAPTIC: bool = false;

    /// Validate shared parameters
    fn validate_shared(shared: &Self::Shared) -> Result<()>;

    /// Build the initial rule state of a synapse
    fn init_rule(params: &DeltaSynapseParams, shared: &Self::Shared) -> Result<Self::Rule>;

    /// A presynaptic spike sent at `spike_step` reached this synapse and will
    /// arrive at the postsynaptic neuron at `arrival_step`
    fn on_presynaptic_spike(
        _synapse: &mut Synapse<Self>,
        _shared: &Self::Shared,
        _spike_step: Step,
        _arrival_step: Step,
    ) {
    }

    /// The postsynaptic neuron fired at `spike_step`
    fn on_postsynaptic_spike(_synapse: &mut Synapse<Self>, _shared: &Self::Shared, _spike_step: Step) {}

    /// All events of the current tick were processed
    fn end_tick(_synapse: &mut Synapse<Self>, _shared: &Self::Shared) {}
}

/// Static delta synapse
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaSynapse;

impl SynapseModel for DeltaSynapse {
    type Rule = ();
    type Shared = ();

    const NAME: &'static str = "Delta";

    fn validate_shared(_shared: &()) -> Result<()> {
        Ok(())
    }

    fn init_rule(_params: &DeltaSynapseParams, _shared: &()) -> Result<()> {
        Ok(())
    }
}

/// Delta synapse trained by additive pair-based STDP
#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveStdpDeltaSynapse;

impl SynapseModel for AdditiveStdpDeltaSynapse {
    type Rule = AdditiveStdpState;
    type Shared = AdditiveStdpParams;

    const NAME: &'static str = "AdditiveSTDPDelta";
    const LEARNS_FROM_POSTSYNAPTIC: bool = true;

    fn validate_shared(shared: &AdditiveStdpParams) -> Result<()> {
        shared.validate()
    }

    fn init_rule(params: &DeltaSynapseParams, shared: &AdditiveStdpParams) -> Result<AdditiveStdpState> {
        if params.weight < shared.w_min || params.weight > shared.w_max {
            return Err(RuntimeError::invalid_parameter(
                "weight",
                params.weight.to_string(),
                format!("in [{}, {}]", shared.w_min, shared.w_max),
            ));
        }
        Ok(AdditiveStdpState::default())
    }

    fn on_presynaptic_spike(
        synapse: &mut Synapse<Self>,
        shared: &AdditiveStdpParams,
        spike_step: Step,
        _arrival_step: Step,
    ) {
        synapse.rule.on_presynaptic(spike_step, shared);
    }

    fn on_postsynaptic_spike(synapse: &mut Synapse<Self>, shared: &AdditiveStdpParams, spike_step: Step) {
        synapse.rule.on_postsynaptic(spike_step, shared);
    }

    fn end_tick(synapse: &mut Synapse<Self>, shared: &AdditiveStdpParams) {
        synapse.rule.apply(&mut synapse.params.weight, shared);
    }
}

/// Delta synapse whose weight follows its synaptic resource
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceStdpDeltaSynapse;

impl SynapseModel for ResourceStdpDeltaSynapse {
    type Rule = ResourceStdpState;
    type Shared = ResourceStdpParams;

    const NAME: &'static str = "SynapticResourceSTDPDelta";

    fn validate_shared(shared: &ResourceStdpParams) -> Result<()> {
        shared.validate()
    }

    fn init_rule(params: &DeltaSynapseParams, shared: &ResourceStdpParams) -> Result<ResourceStdpState> {
        let synaptic_resource = resource_from_weight(params.weight, shared.w_min, shared.w_max)?;
        Ok(ResourceStdpState::new(synaptic_resource))
    }

    fn on_presynaptic_spike(
        synapse: &mut Synapse<Self>,
        _shared: &ResourceStdpParams,
        _spike_step: Step,
        arrival_step: Step,
    ) {
        synapse.rule.last_spike_step = Some(arrival_step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_must_be_positive() {
        assert!(DeltaSynapseParams::excitatory(1.0, 1).is_ok());
        let err = DeltaSynapseParams::excitatory(1.0, 0).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
        assert!(DeltaSynapseParams::excitatory(f32::NAN, 1).is_err());
    }

    #[test]
    fn test_delay_is_bounded() {
        assert!(DeltaSynapseParams::excitatory(1.0, MAX_DELAY).is_ok());
        for delay in [MAX_DELAY + 1, u32::MAX] {
            let err = DeltaSynapseParams::excitatory(1.0, delay).unwrap_err();
            assert!(matches!(err, RuntimeError::InvalidParameter { .. }));
        }

        let unchecked = DeltaSynapseParams {
            weight: 1.0,
            delay: u32::MAX,
            output_type: OutputType::Excitatory,
        };
        assert!(unchecked.validate().is_err());
    }

    #[test]
    fn test_additive_rule_requires_weight_in_bounds() {
        let shared = AdditiveStdpParams::default();
        let inside = DeltaSynapseParams::excitatory(0.5, 1).unwrap();
        let outside = DeltaSynapseParams::excitatory(2.0, 1).unwrap();
        assert!(AdditiveStdpDeltaSynapse::init_rule(&inside, &shared).is_ok());
        assert!(AdditiveStdpDeltaSynapse::init_rule(&outside, &shared).is_err());
    }

    #[test]
    fn test_resource_rule_starts_from_weight() {
        let shared = ResourceStdpParams::default();
        let params = DeltaSynapseParams::excitatory(0.5, 1).unwrap();
        let rule = ResourceStdpDeltaSynapse::init_rule(&params, &shared).unwrap();
        assert!((rule.synaptic_resource - 1.0).abs() < 1e-6);

        let mut synapse = Synapse::<ResourceStdpDeltaSynapse>::new(0, 2, params, rule);
        assert_eq!((synapse.presynaptic(), synapse.postsynaptic()), (0, 2));
        synapse.rule.had_hebbian_update = true;
        ResourceStdpDeltaSynapse::on_presynaptic_spike(&mut synapse, &shared, 3, 5);
        assert_eq!(synapse.rule.last_spike_step, Some(5));
        // Cleared only when the postsynaptic neuron starts a new spike period
        assert!(synapse.rule.had_hebbian_update);
    }
}
