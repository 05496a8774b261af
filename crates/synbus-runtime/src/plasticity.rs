//! Plasticity rules for synaptic learning
//!
//! Two rules are provided. Additive STDP keeps exponentially decaying pre and
//! postsynaptic traces per synapse and changes the weight directly. Resource
//! STDP moves synaptic resource between a neuron's free pool and its incoming
//! synapses and derives each weight from the synapse's resource. The former
//! runs inside the projection, the latter is driven by the postsynaptic
//! population after it fires.

use synbus_core::Step;

use crate::error::*;
use crate::neuron::{IsiPeriod, ResourceStdpBlifatNeuron};
use crate::population::Population;
use crate::projection::Projection;
use crate::synapse::ResourceStdpDeltaSynapse;

/// Parameters for additive STDP
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdditiveStdpParams {
    /// Learning rate for potentiation (weight increase)
    pub a_plus: f32,
    /// Learning rate for depression (weight decrease)
    pub a_minus: f32,
    /// Presynaptic trace time constant (ticks)
    pub tau_plus: f32,
    /// Postsynaptic trace time constant (ticks)
    pub tau_minus: f32,
    /// Minimum weight value
    pub w_min: f32,
    /// Maximum weight value
    pub w_max: f32,
}

impl Default for AdditiveStdpParams {
    fn default() -> Self {
        Self {
            a_plus: 0.01,    // 1% potentiation rate
            a_minus: 0.012,  // 1.2% depression rate (slightly stronger)
            tau_plus: 20.0,  // 20 tick potentiation window
            tau_minus: 20.0, // 20 tick depression window
            w_min: 0.0,
            w_max: 1.0,
        }
    }
}

impl AdditiveStdpParams {
    /// Create new STDP parameters with validation
    pub fn new(
        a_plus: f32,
        a_minus: f32,
        tau_plus: f32,
        tau_minus: f32,
        w_min: f32,
        w_max: f32,
    ) -> Result<Self> {
        let params = Self {
            a_plus,
            a_minus,
            tau_plus,
            tau_minus,
            w_min,
            w_max,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_range("a_plus", self.a_plus, 0.0, f32::MAX)?;
        check_range("a_minus", self.a_minus, 0.0, f32::MAX)?;
        if self.tau_plus <= 0.0 || !self.tau_plus.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "tau_plus",
                self.tau_plus.to_string(),
                "> 0.0",
            ));
        }
        if self.tau_minus <= 0.0 || !self.tau_minus.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "tau_minus",
                self.tau_minus.to_string(),
                "> 0.0",
            ));
        }
        check_weight_bounds(self.w_min, self.w_max)
    }
}

fn check_weight_bounds(w_min: f32, w_max: f32) -> Result<()> {
    check_finite("w_min", w_min)?;
    check_finite("w_max", w_max)?;
    if w_max <= w_min {
        return Err(RuntimeError::invalid_parameter(
            "w_max",
            format!("{} (with w_min={})", w_max, w_min),
            "> w_min",
        ));
    }
    Ok(())
}

/// Exponentially decaying spike trace, decayed lazily when read
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExpTrace {
    /// Trace value at `last_step`
    pub value: f32,
    /// Tick of the last bump
    pub last_step: Step,
}

impl ExpTrace {
    /// Trace value at `step`
    pub fn value_at(&self, step: Step, tau: f32) -> f32 {
        let dt = step.saturating_sub(self.last_step) as f32;
        self.value * (-dt / tau).exp()
    }

    /// Register a spike at `step`
    pub fn bump(&mut self, step: Step, tau: f32) {
        let step = step.max(self.last_step);
        self.value = self.value_at(step, tau) + 1.0;
        self.last_step = step;
    }
}

/// Per-synapse state of additive STDP
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdditiveStdpState {
    /// Presynaptic trace
    pub presynaptic_trace: ExpTrace,
    /// Postsynaptic trace
    pub postsynaptic_trace: ExpTrace,
    /// Weight change accumulated during the current tick
    pub pending_delta: f32,
}

impl AdditiveStdpState {
    /// Presynaptic spike: depress by the postsynaptic trace
    pub fn on_presynaptic(&mut self, step: Step, params: &AdditiveStdpParams) {
        self.pending_delta -= params.a_minus * self.postsynaptic_trace.value_at(step, params.tau_minus);
        self.presynaptic_trace.bump(step, params.tau_plus);
    }

    /// Postsynaptic spike: potentiate by the presynaptic trace
    pub fn on_postsynaptic(&mut self, step: Step, params: &AdditiveStdpParams) {
        self.pending_delta += params.a_plus * self.presynaptic_trace.value_at(step, params.tau_plus);
        self.postsynaptic_trace.bump(step, params.tau_minus);
    }

    /// Apply the accumulated change once and clamp. Returns true if the weight moved.
    pub fn apply(&mut self, weight: &mut f32, params: &AdditiveStdpParams) -> bool {
        if self.pending_delta == 0.0 {
            return false;
        }
        let old = *weight;
        *weight = (old + self.pending_delta).clamp(params.w_min, params.w_max);
        self.pending_delta = 0.0;
        *weight != old
    }
}

/// Projection-wide parameters of resource STDP
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceStdpParams {
    /// Weight at zero resource
    pub w_min: f32,
    /// Weight approached as resource grows
    pub w_max: f32,
    /// Resource removed from a non-contributing synapse when its neuron fires
    pub d_u: f32,
    /// Ticks before a postsynaptic spike in which an arrival counts as contribution
    pub dopamine_plasticity_period: Step,
}

impl Default for ResourceStdpParams {
    fn default() -> Self {
        Self {
            w_min: 0.0,
            w_max: 1.0,
            d_u: 0.0,
            dopamine_plasticity_period: 10,
        }
    }
}

impl ResourceStdpParams {
    /// Create parameters with validation
    pub fn new(w_min: f32, w_max: f32, d_u: f32, dopamine_plasticity_period: Step) -> Result<Self> {
        let params = Self {
            w_min,
            w_max,
            d_u,
            dopamine_plasticity_period,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        check_weight_bounds(self.w_min, self.w_max)?;
        check_range("d_u", self.d_u, 0.0, f32::MAX)
    }
}

/// Per-synapse state of resource STDP
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceStdpState {
    /// Resource held by the synapse, never negative
    pub synaptic_resource: f32,
    /// Tick the last presynaptic spike reached the postsynaptic neuron
    pub last_spike_step: Option<Step>,
    /// Hebbian update already applied for the last presynaptic spike
    pub had_hebbian_update: bool,
    /// Contributed to the last postsynaptic spike
    pub has_contributed: bool,
}

impl ResourceStdpState {
    /// Fresh state holding `synaptic_resource`
    pub fn new(synaptic_resource: f32) -> Self {
        Self {
            synaptic_resource: synaptic_resource.max(0.0),
            last_spike_step: None,
            had_hebbian_update: false,
            has_contributed: false,
        }
    }

    fn arrived_within(&self, step: Step, period: Step) -> bool {
        self.last_spike_step
            .map(|arrival| arrival <= step && step - arrival <= period)
            .unwrap_or(false)
    }
}

/// Weight of a synapse holding `resource`
pub fn weight_from_resource(resource: f32, w_min: f32, w_max: f32) -> f32 {
    let resource = resource.max(0.0);
    let range = w_max - w_min;
    w_min + range * resource / (range + resource)
}

/// Resource a synapse needs to have `weight`. The weight must lie in `[w_min, w_max)`.
pub fn resource_from_weight(weight: f32, w_min: f32, w_max: f32) -> Result<f32> {
    if !weight.is_finite() || weight < w_min || weight >= w_max {
        return Err(RuntimeError::invalid_parameter(
            "weight",
            weight.to_string(),
            format!("in [{}, {})", w_min, w_max),
        ));
    }
    Ok((weight - w_min) * (w_max - w_min) / (w_max - weight))
}

/// Run resource STDP for one tick of `population`.
///
/// `fired` are the neurons that spiked on `step`. Every fired neuron advances
/// its spike period; unless forced it potentiates contributing synapses out
/// of its free pool and depresses the others back into it. Dopamine received
/// on this tick then moves resource of synapses that contributed to a recent
/// spike, and idle neurons whose pool reached `synaptic_resource_threshold`
/// hand it to their synapses. Weights of every touched neuron's synapses are
/// recomputed from their resource once, at the end.
pub fn train_synaptic_resource(
    population: &mut Population<ResourceStdpBlifatNeuron>,
    projections: &mut [&mut Projection<ResourceStdpDeltaSynapse>],
    fired: &[u32],
    step: Step,
) {
    let mut touched = vec![false; population.size()];
    for &index in fired {
        let Some(neuron) = population.neuron_mut(index as usize) else {
            continue;
        };
        process_spiking_neuron(neuron, index, projections, step);
        touched[index as usize] = true;
    }

    for (index, dirty) in touched.iter_mut().enumerate() {
        let Some(neuron) = population.neuron_mut(index) else {
            continue;
        };
        let dopamine = neuron.blifat.state.dopamine_value;
        let forced = neuron.resource.isi_status == IsiPeriod::Forced;
        if dopamine > 0.0 || (dopamine < 0.0 && !forced) {
            apply_dopamine(neuron, index as u32, projections, step);
            *dirty = true;
        }
        if renormalize_resource(neuron, index as u32, projections, step) {
            *dirty = true;
        }
    }

    for index in touched
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| t.then_some(i as u32))
    {
        recalculate_weights(index, projections);
    }
}

fn recalculate_weights(index: u32, projections: &mut [&mut Projection<ResourceStdpDeltaSynapse>]) {
    for projection in projections.iter_mut() {
        let shared = projection.shared_params().clone();
        projection.for_each_synapse_into(index, |synapse| {
            synapse.params.weight =
                weight_from_resource(synapse.rule.synaptic_resource, shared.w_min, shared.w_max);
        });
    }
}

fn process_spiking_neuron(
    neuron: &mut ResourceStdpBlifatNeuron,
    index: u32,
    projections: &mut [&mut Projection<ResourceStdpDeltaSynapse>],
    step: Step,
) {
    let params = &neuron.resource_params;
    let resource = &mut neuron.resource;
    resource.last_spike_step = Some(step);
    let status = resource.update_isi(
        step,
        neuron.blifat.state.is_being_forced,
        neuron.blifat.state.dopamine_value,
        params.isi_max,
    );
    if status == IsiPeriod::PeriodStarted {
        resource.stability = (resource.stability - params.stability_change_at_isi).max(0.0);
    }
    let d_h = params.d_h * resource.stability_factor();
    let resource_max = params.resource_max;

    let mut weight_sum = 0.0;
    let mut updated = 0usize;
    for projection in projections.iter_mut() {
        let shared = projection.shared_params().clone();
        projection.for_each_synapse_into(index, |synapse| {
            weight_sum += synapse.params.weight.max(0.0);
            let rule = &mut synapse.rule;
            let arrived = rule.arrived_within(step, shared.dopamine_plasticity_period);
            // A continued period keeps earlier contributions
            if status != IsiPeriod::PeriodContinued || arrived {
                rule.has_contributed = arrived;
            }
            if status != IsiPeriod::PeriodContinued {
                rule.had_hebbian_update = false;
            }
            if status == IsiPeriod::Forced {
                return;
            }
            if rule.has_contributed {
                if !rule.had_hebbian_update {
                    rule.synaptic_resource += resource.take(d_h);
                    rule.had_hebbian_update = true;
                }
            } else {
                let released = shared.d_u.min(rule.synaptic_resource);
                rule.synaptic_resource -= released;
                resource.give_back(released, resource_max);
            }
            updated += 1;
        });
    }
    neuron.blifat.state.additional_threshold = weight_sum * params.synapse_sum_threshold_coefficient;
    log::trace!(
        "Resource STDP: neuron {} fired at {} ({:?}), {} synapses updated",
        index,
        step,
        status,
        updated
    );
}

fn apply_dopamine(
    neuron: &mut ResourceStdpBlifatNeuron,
    index: u32,
    projections: &mut [&mut Projection<ResourceStdpDeltaSynapse>],
    step: Step,
) {
    let dopamine = neuron.blifat.state.dopamine_value;
    let params = &neuron.resource_params;
    if neuron.in_dopamine_window(step) {
        let resource = &mut neuron.resource;
        let change = dopamine * resource.stability_factor();
        for projection in projections.iter_mut() {
            projection.for_each_synapse_into(index, |synapse| {
                let rule = &mut synapse.rule;
                if !rule.has_contributed {
                    return;
                }
                if change > 0.0 {
                    rule.synaptic_resource += resource.take(change);
                } else {
                    let released = (-change).min(rule.synaptic_resource);
                    rule.synaptic_resource -= released;
                    resource.give_back(released, params.resource_max);
                }
            });
        }
    }

    let resource = &mut neuron.resource;
    let rate = params.stability_change_parameter;
    if neuron.blifat.state.is_being_forced || dopamine < 0.0 {
        resource.stability = (resource.stability - dopamine * rate).max(0.0);
    } else {
        // Rewards landing about one isi_max after the period began stabilize the most
        let timing = resource
            .first_isi_spike
            .map(|first| {
                let isi_max = params.isi_max as f32;
                let offset = (step.saturating_sub(first) as f32 - isi_max).abs();
                (2.0 - offset / isi_max).max(-1.0)
            })
            .unwrap_or(1.0);
        resource.stability = (resource.stability + dopamine * rate * timing).max(0.0);
    }
}

/// Hand the free pool of an idle neuron to its synapses.
///
/// Each synapse receives `free / (synapses + resource_drain_coefficient)`, the
/// remainder is drained and the pool is emptied. Returns whether any resource
/// moved.
fn renormalize_resource(
    neuron: &mut ResourceStdpBlifatNeuron,
    index: u32,
    projections: &mut [&mut Projection<ResourceStdpDeltaSynapse>],
    step: Step,
) -> bool {
    let params = &neuron.resource_params;
    let resource = &mut neuron.resource;
    if resource.in_isi_period(step, params.isi_max) {
        return false;
    }
    let free = resource.free_synaptic_resource;
    if free <= 0.0 || free < params.synaptic_resource_threshold {
        return false;
    }

    let synapses: usize = projections.iter().map(|p| p.synapses_into(index)).sum();
    let shares = synapses as f32 + params.resource_drain_coefficient;
    if shares <= 0.0 {
        return false;
    }
    let share = free / shares;
    for projection in projections.iter_mut() {
        projection.for_each_synapse_into(index, |synapse| {
            synapse.rule.synaptic_resource += share;
        });
    }
    resource.free_synaptic_resource = 0.0;
    log::trace!(
        "Resource STDP: neuron {} spread {} free resource over {} synapses",
        index,
        free,
        synapses
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_params_validation() {
        assert!(AdditiveStdpParams::default().validate().is_ok());
        assert!(AdditiveStdpParams::new(0.01, 0.01, 0.0, 20.0, 0.0, 1.0).is_err());
        assert!(AdditiveStdpParams::new(0.01, 0.01, 20.0, 20.0, 1.0, 1.0).is_err());
        assert!(AdditiveStdpParams::new(-0.01, 0.01, 20.0, 20.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_trace_decay() {
        let mut trace = ExpTrace::default();
        trace.bump(10, 10.0);
        assert_eq!(trace.value_at(10, 10.0), 1.0);
        let later = trace.value_at(20, 10.0);
        assert!((later - (-1.0f32).exp()).abs() < 1e-6);
        // Reading the past never amplifies.
        assert_eq!(trace.value_at(5, 10.0), 1.0);
    }

    #[test]
    fn test_causal_pair_potentiates() {
        let params = AdditiveStdpParams::default();
        let mut state = AdditiveStdpState::default();
        let mut weight = 0.5;
        state.on_presynaptic(10, &params);
        state.on_postsynaptic(15, &params);
        assert!(state.apply(&mut weight, &params));
        assert!(weight > 0.5);
    }

    #[test]
    fn test_anticausal_pair_depresses() {
        let params = AdditiveStdpParams::default();
        let mut state = AdditiveStdpState::default();
        let mut weight = 0.5;
        state.on_postsynaptic(10, &params);
        state.on_presynaptic(15, &params);
        state.apply(&mut weight, &params);
        assert!(weight < 0.5);
    }

    #[test]
    fn test_apply_clamps() {
        let params = AdditiveStdpParams::default();
        let mut state = AdditiveStdpState {
            pending_delta: 10.0,
            ..AdditiveStdpState::default()
        };
        let mut weight = 0.9;
        state.apply(&mut weight, &params);
        assert_eq!(weight, params.w_max);
        assert_eq!(state.pending_delta, 0.0);

        state.pending_delta = -10.0;
        state.apply(&mut weight, &params);
        assert_eq!(weight, params.w_min);
    }

    #[test]
    fn test_weight_resource_conversion() {
        assert_eq!(weight_from_resource(0.0, 0.0, 1.0), 0.0);
        assert_eq!(weight_from_resource(-3.0, 0.0, 1.0), 0.0);
        assert!((weight_from_resource(1.0, 0.0, 1.0) - 0.5).abs() < 1e-6);
        assert!(weight_from_resource(1.0e6, 0.0, 1.0) < 1.0);

        let r = resource_from_weight(0.75, 0.0, 1.0).unwrap();
        assert!((weight_from_resource(r, 0.0, 1.0) - 0.75).abs() < 1e-5);
        assert!(resource_from_weight(1.0, 0.0, 1.0).is_err());
        assert!(resource_from_weight(-0.1, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_contribution_window() {
        let mut state = ResourceStdpState::new(0.0);
        assert!(!state.arrived_within(5, 10));
        state.last_spike_step = Some(3);
        assert!(state.arrived_within(5, 10));
        assert!(state.arrived_within(13, 10));
        assert!(!state.arrived_within(14, 10));
        assert!(!state.arrived_within(2, 10));
    }

    use crate::neuron::{BlifatParams, SynapticResourceParams};
    use crate::projection::ProjectionEnds;
    use crate::synapse::DeltaSynapseParams;
    use synbus_core::Uid;

    type ResourceProjection = Projection<ResourceStdpDeltaSynapse>;

    fn resource_pair(
        neuron_params: SynapticResourceParams,
        period: Step,
    ) -> (Population<ResourceStdpBlifatNeuron>, ResourceProjection) {
        let neuron = ResourceStdpBlifatNeuron::new(BlifatParams::default(), neuron_params).unwrap();
        let population = Population::uniform(1, neuron).unwrap();
        let shared = ResourceStdpParams {
            dopamine_plasticity_period: period,
            ..ResourceStdpParams::default()
        };
        let synapse = DeltaSynapseParams::excitatory(0.5, 1).unwrap();
        let projection = Projection::resource_stdp(
            ProjectionEnds::from_source(Uid::new(), Some(2), &population),
            shared,
            vec![(0, 0, synapse), (1, 0, synapse)],
        )
        .unwrap();
        (population, projection)
    }

    fn train(
        population: &mut Population<ResourceStdpBlifatNeuron>,
        projection: &mut ResourceProjection,
        fired: &[u32],
        step: Step,
    ) {
        train_synaptic_resource(population, &mut [projection], fired, step);
    }

    fn arrive(projection: &mut ResourceProjection, presynaptic: u32, step: Step) {
        projection.for_each_synapse_into(0, |s| {
            if s.presynaptic() == presynaptic {
                s.rule.last_spike_step = Some(step);
            }
        });
    }

    fn rules(projection: &ResourceProjection) -> Vec<ResourceStdpState> {
        projection.synapses().iter().map(|s| s.rule).collect()
    }

    fn free(population: &Population<ResourceStdpBlifatNeuron>) -> f32 {
        population.neurons()[0].resource.free_synaptic_resource
    }

    #[test]
    fn test_hebbian_update_once_per_spike_period() {
        let (mut population, mut projection) = resource_pair(SynapticResourceParams::default(), 1);

        arrive(&mut projection, 0, 1);
        train(&mut population, &mut projection, &[0], 2);
        let state = rules(&projection);
        assert!((state[0].synaptic_resource - 1.1).abs() < 1e-6);
        assert!(state[0].has_contributed && !state[1].has_contributed);

        // Same period: synapse 0 keeps its mark but is not potentiated again
        arrive(&mut projection, 1, 3);
        train(&mut population, &mut projection, &[0], 4);
        let state = rules(&projection);
        assert_eq!(population.neurons()[0].resource.isi_status, IsiPeriod::PeriodContinued);
        assert!(state[0].has_contributed && state[1].has_contributed);
        assert!((state[0].synaptic_resource - 1.1).abs() < 1e-6);
        assert!((state[1].synaptic_resource - 1.1).abs() < 1e-6);
        assert!((free(&population) - 0.8).abs() < 1e-6);

        // A new period clears old marks and allows another update
        arrive(&mut projection, 0, 29);
        train(&mut population, &mut projection, &[0], 30);
        let state = rules(&projection);
        assert_eq!(population.neurons()[0].resource.isi_status, IsiPeriod::PeriodStarted);
        assert!(state[0].has_contributed && !state[1].has_contributed);
        assert!((state[0].synaptic_resource - 1.2).abs() < 1e-5);
        assert!((free(&population) - 0.7).abs() < 1e-5);

        let weights = projection.weights();
        assert!((weights[0] - weight_from_resource(1.2, 0.0, 1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_new_period_lowers_stability() {
        let params = SynapticResourceParams {
            stability_change_at_isi: 0.5,
            ..SynapticResourceParams::default()
        };
        let (mut population, mut projection) = resource_pair(params, 10);
        if let Some(neuron) = population.neuron_mut(0) {
            neuron.resource.stability = 1.0;
        }
        train(&mut population, &mut projection, &[0], 1);
        assert_eq!(population.neurons()[0].resource.stability, 0.5);
        train(&mut population, &mut projection, &[0], 2);
        assert_eq!(population.neurons()[0].resource.stability, 0.5);
        train(&mut population, &mut projection, &[0], 40);
        assert_eq!(population.neurons()[0].resource.stability, 0.0);
    }

    #[test]
    fn test_forced_spike_marks_without_learning() {
        let (mut population, mut projection) = resource_pair(SynapticResourceParams::default(), 10);
        arrive(&mut projection, 0, 1);
        if let Some(neuron) = population.neuron_mut(0) {
            neuron.blifat.state.is_being_forced = true;
            neuron.blifat.state.dopamine_value = -0.5;
        }
        train(&mut population, &mut projection, &[0], 2);

        let state = rules(&projection);
        assert_eq!(population.neurons()[0].resource.isi_status, IsiPeriod::Forced);
        assert!(state[0].has_contributed);
        assert_eq!(state[0].synaptic_resource, 1.0);
        assert_eq!(free(&population), 1.0);
        assert_eq!(projection.weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_spike_and_dopamine_share_one_weight_update() {
        let (mut population, mut projection) = resource_pair(SynapticResourceParams::default(), 10);
        arrive(&mut projection, 0, 1);
        if let Some(neuron) = population.neuron_mut(0) {
            neuron.blifat.state.dopamine_value = 0.5;
        }
        train(&mut population, &mut projection, &[0], 2);

        let state = rules(&projection);
        assert!((state[0].synaptic_resource - 1.6).abs() < 1e-5);
        assert_eq!(state[1].synaptic_resource, 1.0);
        assert!((free(&population) - 0.4).abs() < 1e-5);
        let weights = projection.weights();
        assert!((weights[0] - weight_from_resource(state[0].synaptic_resource, 0.0, 1.0)).abs() < 1e-6);
        assert_eq!(weights[1], 0.5);
    }

    #[test]
    fn test_idle_neuron_spreads_free_pool() {
        let params = SynapticResourceParams {
            synaptic_resource_threshold: 0.5,
            resource_drain_coefficient: 2.0,
            ..SynapticResourceParams::default()
        };
        let (mut population, mut projection) = resource_pair(params, 10);

        // Still inside the spike period
        train(&mut population, &mut projection, &[0], 1);
        train(&mut population, &mut projection, &[], 11);
        assert_eq!(free(&population), 1.0);
        assert_eq!(projection.weights(), vec![0.5, 0.5]);

        train(&mut population, &mut projection, &[], 12);
        assert_eq!(free(&population), 0.0);
        for rule in rules(&projection) {
            assert!((rule.synaptic_resource - 1.25).abs() < 1e-6);
        }
        let expected = weight_from_resource(1.25, 0.0, 1.0);
        assert!(projection.weights().iter().all(|w| (w - expected).abs() < 1e-6));

        // An empty pool stays put
        train(&mut population, &mut projection, &[], 13);
        assert!((rules(&projection)[0].synaptic_resource - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_pool_below_threshold_is_kept() {
        let params = SynapticResourceParams {
            synaptic_resource_threshold: 0.5,
            ..SynapticResourceParams::default()
        };
        let (mut population, mut projection) = resource_pair(params, 10);
        if let Some(neuron) = population.neuron_mut(0) {
            neuron.resource.free_synaptic_resource = 0.4;
        }
        train(&mut population, &mut projection, &[], 50);
        assert_eq!(free(&population), 0.4);
        assert_eq!(projection.weights(), vec![0.5, 0.5]);
    }
}
