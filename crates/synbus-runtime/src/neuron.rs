//! BLIFAT neuron models
//!
//! BLIFAT is a leaky integrate-and-fire neuron with a dynamic threshold,
//! inhibitory conductance, bursting and blocking. Each tick is split in three
//! parts so that a population can interleave its message handling:
//! [`NeuronModel::pre_impact`] decays the state, [`NeuronModel::impact`]
//! applies one synaptic impact, and [`NeuronModel::post_impact`] decides
//! whether the neuron fires.

use std::fmt;

use synbus_core::{OutputType, Step, SynapticImpact};

use crate::error::*;

/// Behaviour shared by all neuron models a [`crate::Population`] can hold
pub trait NeuronModel: Clone + fmt::Debug + Send + Sync + 'static {
    /// Human readable model name
    const NAME: &'static str;

    /// Decay state before impacts of the current tick are applied
    fn pre_impact(&mut self);

    /// Apply one synaptic impact. `is_forcing` marks supervised input.
    fn impact(&mut self, impact: &SynapticImpact, is_forcing: bool);

    /// Finish the tick. Returns true if the neuron fired.
    fn post_impact(&mut self) -> bool;

    /// Current membrane potential
    fn potential(&self) -> f32;

    /// BLIFAT state of the neuron
    fn blifat(&self) -> &BlifatState;
}

/// Parameters of a BLIFAT neuron
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlifatParams {
    /// Potential retained per tick, 1.0 means no leak
    pub potential_decay: f32,
    /// Dynamic threshold retained per tick
    pub threshold_decay: f32,
    /// Dynamic threshold increase after a spike
    pub threshold_increment: f32,
    /// Postsynaptic trace retained per tick
    pub postsynaptic_trace_decay: f32,
    /// Postsynaptic trace increase after a spike
    pub postsynaptic_trace_increment: f32,
    /// Inhibitory conductance retained per tick
    pub inhibitory_conductance_decay: f32,
    /// Potential the inhibitory conductance pulls towards
    pub reversal_inhibitory_potential: f32,
    /// Base firing threshold
    pub activation_threshold: f32,
    /// Potential after a spike
    pub potential_reset_value: f32,
    /// Lower bound of the potential
    pub min_potential: f32,
    /// Ticks after a spike during which the neuron cannot fire
    pub absolute_refractory_period: u64,
    /// Length of a burst in ticks, 0 disables bursting
    pub bursting_period: u64,
    /// Potential added when a burst ends
    pub reflexive_weight: f32,
}

impl Default for BlifatParams {
    fn default() -> Self {
        Self {
            potential_decay: 1.0,
            threshold_decay: 0.0,
            threshold_increment: 0.0,
            postsynaptic_trace_decay: 0.0,
            postsynaptic_trace_increment: 0.0,
            inhibitory_conductance_decay: 0.0,
            reversal_inhibitory_potential: -0.3,
            activation_threshold: 1.0,
            potential_reset_value: 0.0,
            min_potential: -1.0e9,
            absolute_refractory_period: 0,
            bursting_period: 0,
            reflexive_weight: 0.0,
        }
    }
}

impl BlifatParams {
    /// Create BLIFAT parameters with the most commonly tuned values
    pub fn new(
        activation_threshold: f32,
        potential_decay: f32,
        absolute_refractory_period: u64,
    ) -> Result<Self> {
        let params = Self {
            activation_threshold,
            potential_decay,
            absolute_refractory_period,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_range("potential_decay", self.potential_decay, 0.0, 1.0)?;
        check_range("threshold_decay", self.threshold_decay, 0.0, 1.0)?;
        check_range(
            "postsynaptic_trace_decay",
            self.postsynaptic_trace_decay,
            0.0,
            1.0,
        )?;
        check_range(
            "inhibitory_conductance_decay",
            self.inhibitory_conductance_decay,
            0.0,
            1.0,
        )?;
        check_finite("threshold_increment", self.threshold_increment)?;
        check_finite(
            "postsynaptic_trace_increment",
            self.postsynaptic_trace_increment,
        )?;
        check_finite(
            "reversal_inhibitory_potential",
            self.reversal_inhibitory_potential,
        )?;
        check_finite("activation_threshold", self.activation_threshold)?;
        check_finite("potential_reset_value", self.potential_reset_value)?;
        check_finite("min_potential", self.min_potential)?;
        check_finite("reflexive_weight", self.reflexive_weight)?;
        if self.min_potential > self.potential_reset_value {
            return Err(RuntimeError::invalid_parameter(
                "min_potential",
                format!(
                    "{} (with potential_reset_value={})",
                    self.min_potential, self.potential_reset_value
                ),
                "<= potential_reset_value",
            ));
        }
        Ok(())
    }

    /// Set the dynamic threshold behaviour
    pub fn with_dynamic_threshold(mut self, increment: f32, decay: f32) -> Self {
        self.threshold_increment = increment;
        self.threshold_decay = decay;
        self
    }

    /// Set bursting behaviour
    pub fn with_bursting(mut self, period: u64, reflexive_weight: f32) -> Self {
        self.bursting_period = period;
        self.reflexive_weight = reflexive_weight;
        self
    }

    /// Set inhibitory conductance behaviour
    pub fn with_inhibitory_conductance(mut self, decay: f32, reversal_potential: f32) -> Self {
        self.inhibitory_conductance_decay = decay;
        self.reversal_inhibitory_potential = reversal_potential;
        self
    }
}

/// Mutable state of a BLIFAT neuron
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlifatState {
    /// Membrane potential
    pub potential: f32,
    /// Potential before this tick's impacts
    pub pre_impact_potential: f32,
    /// Threshold raised by recent spikes
    pub dynamic_threshold: f32,
    /// Threshold set externally, e.g. by resource training
    pub additional_threshold: f32,
    /// Postsynaptic trace
    pub postsynaptic_trace: f32,
    /// Inhibitory conductance
    pub inhibitory_conductance: f32,
    /// Ticks since the last spike
    pub ticks_since_firing: u64,
    /// Remaining burst ticks
    pub bursting_phase: u64,
    /// Blocking counter. A value `-n` blocks input for `n` ticks, a positive
    /// value counts down to a one-tick block, `i64::MAX` means unblocked.
    pub blocking_period: i64,
    /// Dopamine received this tick, cleared by `pre_impact`
    pub dopamine_value: f32,
    /// Forcing input received this tick, cleared by `pre_impact`
    pub is_being_forced: bool,
}

impl BlifatState {
    /// Resting state for the given parameters
    pub fn new(params: &BlifatParams) -> Self {
        Self {
            potential: 0.0,
            pre_impact_potential: 0.0,
            dynamic_threshold: 0.0,
            additional_threshold: 0.0,
            postsynaptic_trace: 0.0,
            inhibitory_conductance: 0.0,
            // The first tick leaves the neuron out of refractoriness.
            ticks_since_firing: params.absolute_refractory_period,
            bursting_phase: 0,
            blocking_period: i64::MAX,
            dopamine_value: 0.0,
            is_being_forced: false,
        }
    }

    /// Effective threshold for the firing test
    pub fn threshold(&self, params: &BlifatParams) -> f32 {
        params.activation_threshold + self.dynamic_threshold + self.additional_threshold
    }
}

/// BLIFAT neuron: parameters plus state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlifatNeuron {
    /// Model parameters
    pub params: BlifatParams,
    /// Dynamic state
    pub state: BlifatState,
}

impl BlifatNeuron {
    /// Create a neuron with validated parameters
    pub fn new(params: BlifatParams) -> Result<Self> {
        params.validate()?;
        let state = BlifatState::new(&params);
        Ok(Self { params, state })
    }

    /// Reset state to rest without changing parameters
    pub fn reset(&mut self) {
        self.state = BlifatState::new(&self.params);
    }
}

impl Default for BlifatNeuron {
    fn default() -> Self {
        let params = BlifatParams::default();
        let state = BlifatState::new(&params);
        Self { params, state }
    }
}

impl NeuronModel for BlifatNeuron {
    const NAME: &'static str = "BLIFAT";

    fn pre_impact(&mut self) {
        let p = &self.params;
        let s = &mut self.state;

        s.dopamine_value = 0.0;
        s.is_being_forced = false;
        s.ticks_since_firing = s.ticks_since_firing.saturating_add(1);
        s.dynamic_threshold *= p.threshold_decay;
        s.postsynaptic_trace *= p.postsynaptic_trace_decay;
        s.inhibitory_conductance *= p.inhibitory_conductance_decay;

        if s.bursting_phase > 0 {
            s.bursting_phase -= 1;
            if s.bursting_phase == 0 {
                s.potential = s.potential * p.potential_decay + p.reflexive_weight;
            } else {
                s.potential *= p.potential_decay;
            }
        } else {
            s.potential *= p.potential_decay;
        }
        s.pre_impact_potential = s.potential;
    }

    fn impact(&mut self, impact: &SynapticImpact, is_forcing: bool) {
        let s = &mut self.state;
        match impact.synapse_type {
            OutputType::Excitatory => {
                s.potential += impact.impact_value;
                if is_forcing {
                    s.is_being_forced = true;
                }
            }
            OutputType::InhibitoryCurrent => s.potential -= impact.impact_value,
            OutputType::InhibitoryConductance => s.inhibitory_conductance += impact.impact_value,
            OutputType::Dopamine => s.dopamine_value += impact.impact_value,
            OutputType::Blocking => s.blocking_period = impact.impact_value as i64,
        }
    }

    fn post_impact(&mut self) -> bool {
        let p = &self.params;
        let s = &mut self.state;

        if s.blocking_period <= 0 {
            // Blocked ticks discard this tick's input.
            s.potential = s.pre_impact_potential;
            s.blocking_period += 1;
            if s.blocking_period >= 0 {
                s.blocking_period = i64::MAX;
            }
        } else if s.blocking_period != i64::MAX {
            s.blocking_period -= 1;
        }

        if s.inhibitory_conductance < 1.0 {
            s.potential -= (s.potential - p.reversal_inhibitory_potential) * s.inhibitory_conductance;
        } else {
            s.potential = p.reversal_inhibitory_potential;
        }

        let mut fired = false;
        if s.ticks_since_firing > p.absolute_refractory_period && s.potential >= s.threshold(p) {
            fired = true;
            s.potential = p.potential_reset_value;
            s.dynamic_threshold += p.threshold_increment;
            s.postsynaptic_trace += p.postsynaptic_trace_increment;
            s.bursting_phase = p.bursting_period;
            s.ticks_since_firing = 0;
        }

        if s.potential < p.min_potential {
            s.potential = p.min_potential;
        }
        fired
    }

    fn potential(&self) -> f32 {
        self.state.potential
    }

    fn blifat(&self) -> &BlifatState {
        &self.state
    }
}

/// Parameters of the synaptic resource part of a resource STDP neuron
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapticResourceParams {
    /// Upper bound of the free resource pool
    pub resource_max: f32,
    /// Free resource recovered per tick
    pub resource_recovery: f32,
    /// Hebbian resource increment per contributing synapse
    pub d_h: f32,
    /// Stability change per unit of dopamine
    pub stability_change_parameter: f32,
    /// Ticks after a spike during which dopamine still trains
    pub dopamine_plasticity_time: Step,
    /// Additional threshold per unit of summed incoming weight
    pub synapse_sum_threshold_coefficient: f32,
    /// Longest gap between two spikes of one spike period, at least 1
    pub isi_max: Step,
    /// Stability removed when a new spike period starts
    pub stability_change_at_isi: f32,
    /// Free resource magnitude from which an idle neuron hands its pool to its
    /// synapses. `f32::MAX` keeps the pool with the neuron.
    pub synaptic_resource_threshold: f32,
    /// Extra share of the free pool that is drained instead of distributed
    pub resource_drain_coefficient: f32,
}

impl Default for SynapticResourceParams {
    fn default() -> Self {
        Self {
            resource_max: 1.0,
            resource_recovery: 0.0,
            d_h: 0.1,
            stability_change_parameter: 0.0,
            dopamine_plasticity_time: 10,
            synapse_sum_threshold_coefficient: 0.0,
            isi_max: 10,
            stability_change_at_isi: 0.0,
            synaptic_resource_threshold: f32::MAX,
            resource_drain_coefficient: 0.0,
        }
    }
}

impl SynapticResourceParams {
    /// Create resource parameters with validation
    pub fn new(resource_max: f32, resource_recovery: f32, d_h: f32) -> Result<Self> {
        let params = Self {
            resource_max,
            resource_recovery,
            d_h,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if !self.resource_max.is_finite() || self.resource_max <= 0.0 {
            return Err(RuntimeError::invalid_parameter(
                "resource_max",
                self.resource_max.to_string(),
                "> 0.0",
            ));
        }
        check_range("resource_recovery", self.resource_recovery, 0.0, f32::MAX)?;
        check_range("d_h", self.d_h, 0.0, f32::MAX)?;
        check_range(
            "stability_change_parameter",
            self.stability_change_parameter,
            0.0,
            f32::MAX,
        )?;
        check_finite(
            "synapse_sum_threshold_coefficient",
            self.synapse_sum_threshold_coefficient,
        )?;
        if self.isi_max == 0 {
            return Err(RuntimeError::invalid_parameter("isi_max", "0", ">= 1"));
        }
        check_range("stability_change_at_isi", self.stability_change_at_isi, 0.0, f32::MAX)?;
        check_range(
            "synaptic_resource_threshold",
            self.synaptic_resource_threshold,
            0.0,
            f32::MAX,
        )?;
        check_range(
            "resource_drain_coefficient",
            self.resource_drain_coefficient,
            0.0,
            f32::MAX,
        )?;
        Ok(())
    }
}

/// Where a neuron stands in its current spike period.
///
/// A spike period is a run of spikes no further than `isi_max` ticks apart.
/// Synapses get at most one Hebbian update per period and keep their
/// contribution mark until the next period starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IsiPeriod {
    /// No spike yet
    #[default]
    NotInPeriod,
    /// The last spike opened a new period
    PeriodStarted,
    /// The last spike extended the current period
    PeriodContinued,
    /// The last spike was forced
    Forced,
}

/// Resource state of a resource STDP neuron
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapticResourceState {
    /// Free resource available for potentiation
    pub free_synaptic_resource: f32,
    /// Learning stability, higher means slower Hebbian updates
    pub stability: f32,
    /// Tick of the last spike
    pub last_spike_step: Option<Step>,
    /// Spike period status after the last spike
    pub isi_status: IsiPeriod,
    /// Tick of the last unforced spike
    pub last_isi_step: Option<Step>,
    /// Tick of the first spike of the current period
    pub first_isi_spike: Option<Step>,
}

impl SynapticResourceState {
    /// Full pool, zero stability
    pub fn new(params: &SynapticResourceParams) -> Self {
        Self {
            free_synaptic_resource: params.resource_max,
            stability: 0.0,
            last_spike_step: None,
            isi_status: IsiPeriod::NotInPeriod,
            last_isi_step: None,
            first_isi_spike: None,
        }
    }

    /// Advance the spike period on a spike at `step` and return the new status.
    /// Dopamine received with the spike closes a continued period.
    pub fn update_isi(&mut self, step: Step, forced: bool, dopamine: f32, isi_max: Step) -> IsiPeriod {
        if forced {
            self.isi_status = IsiPeriod::Forced;
            return self.isi_status;
        }
        let gap = self.last_isi_step.map(|last| step.saturating_sub(last));
        let within = gap.map(|g| g < isi_max).unwrap_or(false);
        let starts = match self.isi_status {
            IsiPeriod::NotInPeriod | IsiPeriod::Forced => true,
            IsiPeriod::PeriodStarted => !within,
            IsiPeriod::PeriodContinued => !within || dopamine != 0.0,
        };
        if starts {
            self.isi_status = IsiPeriod::PeriodStarted;
            self.first_isi_spike = Some(step);
        } else {
            self.isi_status = IsiPeriod::PeriodContinued;
        }
        self.last_isi_step = Some(step);
        self.isi_status
    }

    /// Whether the current spike period may still continue at `step`
    pub fn in_isi_period(&self, step: Step, isi_max: Step) -> bool {
        self.isi_status != IsiPeriod::Forced
            && self
                .last_isi_step
                .map(|last| step.saturating_sub(last) <= isi_max)
                .unwrap_or(false)
    }

    /// Factor applied to Hebbian increments, in `(0, 1]`
    pub fn stability_factor(&self) -> f32 {
        (-self.stability).exp2().min(1.0)
    }

    /// Take up to `amount` from the pool, returning what was taken
    pub fn take(&mut self, amount: f32) -> f32 {
        let taken = amount.max(0.0).min(self.free_synaptic_resource);
        self.free_synaptic_resource -= taken;
        taken
    }

    /// Return resource to the pool, clamped to `resource_max`
    pub fn give_back(&mut self, amount: f32, resource_max: f32) {
        self.free_synaptic_resource =
            (self.free_synaptic_resource + amount.max(0.0)).clamp(0.0, resource_max);
    }
}

/// BLIFAT neuron with a synaptic resource pool for resource STDP
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceStdpBlifatNeuron {
    /// BLIFAT part
    pub blifat: BlifatNeuron,
    /// Resource parameters
    pub resource_params: SynapticResourceParams,
    /// Resource state
    pub resource: SynapticResourceState,
}

impl ResourceStdpBlifatNeuron {
    /// Create a neuron with validated parameters
    pub fn new(params: BlifatParams, resource_params: SynapticResourceParams) -> Result<Self> {
        let blifat = BlifatNeuron::new(params)?;
        resource_params.validate()?;
        let resource = SynapticResourceState::new(&resource_params);
        Ok(Self {
            blifat,
            resource_params,
            resource,
        })
    }

    /// Whether dopamine arriving at `step` may still train this neuron
    pub fn in_dopamine_window(&self, step: Step) -> bool {
        self.resource
            .last_spike_step
            .map(|last| step.saturating_sub(last) <= self.resource_params.dopamine_plasticity_time)
            .unwrap_or(false)
    }
}

impl Default for ResourceStdpBlifatNeuron {
    fn default() -> Self {
        let resource_params = SynapticResourceParams::default();
        let resource = SynapticResourceState::new(&resource_params);
        Self {
            blifat: BlifatNeuron::default(),
            resource_params,
            resource,
        }
    }
}

impl NeuronModel for ResourceStdpBlifatNeuron {
    const NAME: &'static str = "SynapticResourceSTDPBLIFAT";

    fn pre_impact(&mut self) {
        let recovery = self.resource_params.resource_recovery;
        self.resource
            .give_back(recovery, self.resource_params.resource_max);
        self.blifat.pre_impact();
    }

    fn impact(&mut self, impact: &SynapticImpact, is_forcing: bool) {
        self.blifat.impact(impact, is_forcing);
    }

    fn post_impact(&mut self) -> bool {
        self.blifat.post_impact()
    }

    fn potential(&self) -> f32 {
        self.blifat.state.potential
    }

    fn blifat(&self) -> &BlifatState {
        &self.blifat.state
    }
}
