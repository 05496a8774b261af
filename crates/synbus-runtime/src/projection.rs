//! Synapse projections between spike sources and populations

use std::collections::HashMap;

use synbus_core::{
    BaseData, MessageHeader, SpikeMessage, Step, SynapticImpact, SynapticImpactMessage, TagMap,
    Uid,
};

use crate::error::*;
use crate::plasticity::{AdditiveStdpParams, ResourceStdpParams};
use crate::population::NeuronGroup;
use crate::synapse::{
    AdditiveStdpDeltaSynapse, DeltaSynapse, DeltaSynapseParams, ResourceStdpDeltaSynapse, Synapse,
    SynapseModel,
};

/// The two ends of a projection.
///
/// A presynaptic size of `None` marks a source without a fixed size, such as
/// an unsized input channel. Presynaptic indexes are then not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionEnds {
    /// Spike source UID
    pub presynaptic_uid: Uid,
    /// Spike source size, if known
    pub presynaptic_size: Option<usize>,
    /// Target population UID
    pub postsynaptic_uid: Uid,
    /// Target population size
    pub postsynaptic_size: usize,
}

impl ProjectionEnds {
    /// Ends from explicit UIDs and sizes
    pub fn new(
        presynaptic_uid: Uid,
        presynaptic_size: Option<usize>,
        postsynaptic_uid: Uid,
        postsynaptic_size: usize,
    ) -> Self {
        Self {
            presynaptic_uid,
            presynaptic_size,
            postsynaptic_uid,
            postsynaptic_size,
        }
    }

    /// Ends connecting two neuron groups
    pub fn between(pre: &impl NeuronGroup, post: &impl NeuronGroup) -> Self {
        Self::new(pre.uid(), Some(pre.size()), post.uid(), post.size())
    }

    /// Ends connecting an arbitrary spike source to a neuron group
    pub fn from_source(source: Uid, source_size: Option<usize>, post: &impl NeuronGroup) -> Self {
        Self::new(source, source_size, post.uid(), post.size())
    }
}

/// Ring buffer of impacts keyed by due tick
#[derive(Debug, Clone)]
struct DelayBuffer {
    slots: Vec<Vec<SynapticImpact>>,
    next_step: Step,
}

impl DelayBuffer {
    fn new(max_delay: u32) -> Self {
        Self {
            slots: vec![Vec::new(); max_delay as usize + 1],
            next_step: 0,
        }
    }

    fn slot(&self, step: Step) -> usize {
        (step % self.slots.len() as u64) as usize
    }

    /// Drain slots of ticks that were skipped since the last call
    fn catch_up(&mut self, step: Step) -> Vec<SynapticImpact> {
        let mut overdue = Vec::new();
        if self.next_step < step {
            let missed = (step - self.next_step).min(self.slots.len() as u64);
            for s in (step - missed)..step {
                let slot = self.slot(s);
                overdue.append(&mut self.slots[slot]);
            }
        }
        overdue
    }

    /// Queue an impact for tick `due`. Overdue impacts go to `step`.
    fn schedule(&mut self, step: Step, due: Step, impact: SynapticImpact) {
        let due = due.max(step);
        debug_assert!(due - step < self.slots.len() as u64);
        let slot = self.slot(due);
        self.slots[slot].push(impact);
    }

    fn take(&mut self, step: Step) -> Vec<SynapticImpact> {
        let slot = self.slot(step);
        self.next_step = step + 1;
        std::mem::take(&mut self.slots[slot])
    }

    fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}

/// Synapses of one model from a spike source to a population
#[derive(Debug, Clone)]
pub struct Projection<M: SynapseModel> {
    base: BaseData,
    ends: ProjectionEnds,
    shared: M::Shared,
    synapses: Vec<Synapse<M>>,
    by_presynaptic: HashMap<u32, Vec<usize>>,
    by_postsynaptic: HashMap<u32, Vec<usize>>,
    buffer: DelayBuffer,
    locked: bool,
    forcing: bool,
}

impl<M: SynapseModel> Projection<M> {
    /// Create a projection, validating every synapse against `ends`
    pub fn new(
        ends: ProjectionEnds,
        shared: M::Shared,
        synapses: impl IntoIterator<Item = (u32, u32, DeltaSynapseParams)>,
    ) -> Result<Self> {
        M::validate_shared(&shared)?;

        let mut built = Vec::new();
        for (presynaptic, postsynaptic, params) in synapses {
            params.validate()?;
            if let Some(size) = ends.presynaptic_size {
                if presynaptic as usize >= size {
                    return Err(RuntimeError::index_out_of_range(
                        "presynaptic neuron",
                        presynaptic as usize,
                        size,
                    ));
                }
            }
            if postsynaptic as usize >= ends.postsynaptic_size {
                return Err(RuntimeError::index_out_of_range(
                    "postsynaptic neuron",
                    postsynaptic as usize,
                    ends.postsynaptic_size,
                ));
            }
            let rule = M::init_rule(&params, &shared)?;
            built.push(Synapse::new(presynaptic, postsynaptic, params, rule));
        }

        let mut by_presynaptic: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut by_postsynaptic: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, s) in built.iter().enumerate() {
            by_presynaptic.entry(s.presynaptic()).or_default().push(i);
            by_postsynaptic.entry(s.postsynaptic()).or_default().push(i);
        }
        let max_delay = built.iter().map(|s| s.params.delay).max().unwrap_or(1);

        log::debug!(
            "Created {} projection with {} synapses (max delay {})",
            M::NAME,
            built.len(),
            max_delay
        );
        Ok(Self {
            base: BaseData::new(),
            ends,
            shared,
            synapses: built,
            by_presynaptic,
            by_postsynaptic,
            buffer: DelayBuffer::new(max_delay),
            locked: false,
            forcing: false,
        })
    }

    /// Replace the generated UID
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.base.uid = uid;
        self
    }

    /// Mark emitted impacts as forcing
    pub fn with_forcing(mut self, forcing: bool) -> Self {
        self.forcing = forcing;
        self
    }

    /// Projection UID
    pub fn uid(&self) -> Uid {
        self.base.uid
    }

    /// Metadata
    pub fn tags(&self) -> &TagMap {
        &self.base.tags
    }

    /// Mutable metadata
    pub fn tags_mut(&mut self) -> &mut TagMap {
        &mut self.base.tags
    }

    /// Connected ends
    pub fn ends(&self) -> &ProjectionEnds {
        &self.ends
    }

    /// Spike source UID
    pub fn presynaptic_uid(&self) -> Uid {
        self.ends.presynaptic_uid
    }

    /// Target population UID
    pub fn postsynaptic_uid(&self) -> Uid {
        self.ends.postsynaptic_uid
    }

    /// Learning parameters shared by all synapses
    pub fn shared_params(&self) -> &M::Shared {
        &self.shared
    }

    /// All synapses
    pub fn synapses(&self) -> &[Synapse<M>] {
        &self.synapses
    }

    /// Number of synapses
    pub fn len(&self) -> usize {
        self.synapses.len()
    }

    /// True if the projection has no synapses
    pub fn is_empty(&self) -> bool {
        self.synapses.is_empty()
    }

    /// Weights in synapse order
    pub fn weights(&self) -> Vec<f32> {
        self.synapses.iter().map(|s| s.params.weight).collect()
    }

    /// Largest presynaptic index used by any synapse
    pub fn max_presynaptic_index(&self) -> Option<u32> {
        self.synapses.iter().map(|s| s.presynaptic()).max()
    }

    /// Largest postsynaptic index used by any synapse
    pub fn max_postsynaptic_index(&self) -> Option<u32> {
        self.synapses.iter().map(|s| s.postsynaptic()).max()
    }

    /// Impacts scheduled but not yet delivered
    pub fn pending_impacts(&self) -> usize {
        self.buffer.len()
    }

    /// Stop learning. Spikes are still transmitted.
    pub fn lock_weights(&mut self) {
        self.locked = true;
    }

    /// Resume learning
    pub fn unlock_weights(&mut self) {
        self.locked = false;
    }

    /// Whether learning is disabled
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether emitted impacts are forcing
    pub fn is_forcing(&self) -> bool {
        self.forcing
    }

    /// Number of synapses ending at `postsynaptic`
    pub fn synapses_into(&self, postsynaptic: u32) -> usize {
        self.by_postsynaptic.get(&postsynaptic).map(Vec::len).unwrap_or(0)
    }

    /// Run `f` on every synapse ending at `postsynaptic`
    pub(crate) fn for_each_synapse_into(&mut self, postsynaptic: u32, mut f: impl FnMut(&mut Synapse<M>)) {
        if let Some(indexes) = self.by_postsynaptic.get(&postsynaptic) {
            for &i in indexes {
                f(&mut self.synapses[i]);
            }
        }
    }

    /// Process the spikes received this tick and emit the impacts due now.
    ///
    /// `messages` may contain spikes of the presynaptic source and, for
    /// learning models, of the postsynaptic population. A presynaptic spike
    /// sent at tick `t` reaches the target at `t + delay`.
    pub fn calculate(&mut self, messages: &[SpikeMessage], step: Step) -> Option<SynapticImpactMessage> {
        let mut due_now = self.buffer.catch_up(step);

        let learning = !self.locked;
        let mut events: Vec<(Step, bool, u32)> = Vec::new();
        for message in messages {
            let sender = message.header.sender_uid;
            let sent = message.header.send_time.min(step);
            if sender == self.ends.presynaptic_uid {
                events.extend(message.neuron_indexes.iter().map(|&i| (sent, false, i)));
            }
            if learning && M::LEARNS_FROM_POSTSYNAPTIC && sender == self.ends.postsynaptic_uid {
                events.extend(message.neuron_indexes.iter().map(|&i| (sent, true, i)));
            }
        }
        // Presynaptic events go first when times are equal.
        events.sort_by_key(|&(time, is_post, _)| (time, is_post));

        let mut touched = Vec::new();
        for (time, is_post, index) in events {
            let lookup = if is_post {
                &self.by_postsynaptic
            } else {
                &self.by_presynaptic
            };
            let Some(indexes) = lookup.get(&index) else {
                continue;
            };
            for &i in indexes {
                let synapse = &mut self.synapses[i];
                if is_post {
                    M::on_postsynaptic_spike(synapse, &self.shared, time);
                } else {
                    let arrival = time + u64::from(synapse.params.delay);
                    self.buffer.schedule(
                        step,
                        arrival,
                        SynapticImpact {
                            connection_index: i as u64,
                            impact_value: synapse.params.weight,
                            synapse_type: synapse.params.output_type,
                            presynaptic_neuron_index: synapse.presynaptic(),
                            postsynaptic_neuron_index: synapse.postsynaptic(),
                        },
                    );
                    if learning {
                        M::on_presynaptic_spike(synapse, &self.shared, time, arrival);
                    }
                }
                if learning {
                    touched.push(i);
                }
            }
        }

        touched.sort_unstable();
        touched.dedup();
        for i in touched {
            M::end_tick(&mut self.synapses[i], &self.shared);
        }

        due_now.append(&mut self.buffer.take(step));
        if due_now.is_empty() {
            return None;
        }
        log::trace!("Projection {} step {}: {} impacts", self.base.uid, step, due_now.len());
        Some(SynapticImpactMessage {
            header: MessageHeader::new(self.base.uid, step),
            presynaptic_population_uid: self.ends.presynaptic_uid,
            postsynaptic_population_uid: self.ends.postsynaptic_uid,
            is_forcing: self.forcing,
            impacts: due_now,
        })
    }
}

/// Closed set of projection types the backend can hold
#[derive(Debug, Clone)]
pub enum ProjectionVariant {
    /// Static delta synapses
    Delta(Projection<DeltaSynapse>),
    /// Delta synapses with additive STDP
    AdditiveStdpDelta(Projection<AdditiveStdpDeltaSynapse>),
    /// Delta synapses with resource STDP
    ResourceStdpDelta(Projection<ResourceStdpDeltaSynapse>),
}

macro_rules! dispatch_projection {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            ProjectionVariant::Delta($p) => $body,
            ProjectionVariant::AdditiveStdpDelta($p) => $body,
            ProjectionVariant::ResourceStdpDelta($p) => $body,
        }
    };
}

impl ProjectionVariant {
    /// Projection UID
    pub fn uid(&self) -> Uid {
        dispatch_projection!(self, p => p.uid())
    }

    /// Connected ends
    pub fn ends(&self) -> &ProjectionEnds {
        dispatch_projection!(self, p => p.ends())
    }

    /// Synapse model name
    pub fn model_name(&self) -> &'static str {
        match self {
            ProjectionVariant::Delta(_) => DeltaSynapse::NAME,
            ProjectionVariant::AdditiveStdpDelta(_) => AdditiveStdpDeltaSynapse::NAME,
            ProjectionVariant::ResourceStdpDelta(_) => ResourceStdpDeltaSynapse::NAME,
        }
    }

    /// Whether the projection needs postsynaptic spikes
    pub fn learns_from_postsynaptic(&self) -> bool {
        match self {
            ProjectionVariant::Delta(_) => DeltaSynapse::LEARNS_FROM_POSTSYNAPTIC,
            ProjectionVariant::AdditiveStdpDelta(_) => {
                AdditiveStdpDeltaSynapse::LEARNS_FROM_POSTSYNAPTIC
            }
            ProjectionVariant::ResourceStdpDelta(_) => {
                ResourceStdpDeltaSynapse::LEARNS_FROM_POSTSYNAPTIC
            }
        }
    }

    /// Number of synapses
    pub fn len(&self) -> usize {
        dispatch_projection!(self, p => p.len())
    }

    /// True if the projection has no synapses
    pub fn is_empty(&self) -> bool {
        dispatch_projection!(self, p => p.is_empty())
    }

    /// Weights in synapse order
    pub fn weights(&self) -> Vec<f32> {
        dispatch_projection!(self, p => p.weights())
    }

    /// Largest presynaptic index used by any synapse
    pub fn max_presynaptic_index(&self) -> Option<u32> {
        dispatch_projection!(self, p => p.max_presynaptic_index())
    }

    /// Largest postsynaptic index used by any synapse
    pub fn max_postsynaptic_index(&self) -> Option<u32> {
        dispatch_projection!(self, p => p.max_postsynaptic_index())
    }

    /// Impacts scheduled but not yet delivered
    pub fn pending_impacts(&self) -> usize {
        dispatch_projection!(self, p => p.pending_impacts())
    }

    /// Metadata
    pub fn tags(&self) -> &TagMap {
        dispatch_projection!(self, p => p.tags())
    }

    /// Mutable metadata
    pub fn tags_mut(&mut self) -> &mut TagMap {
        dispatch_projection!(self, p => p.tags_mut())
    }

    /// Stop learning
    pub fn lock_weights(&mut self) {
        dispatch_projection!(self, p => p.lock_weights())
    }

    /// Resume learning
    pub fn unlock_weights(&mut self) {
        dispatch_projection!(self, p => p.unlock_weights())
    }

    /// Whether learning is disabled
    pub fn is_locked(&self) -> bool {
        dispatch_projection!(self, p => p.is_locked())
    }

    /// Process one tick of spikes
    pub fn calculate(&mut self, messages: &[SpikeMessage], step: Step) -> Option<SynapticImpactMessage> {
        dispatch_projection!(self, p => p.calculate(messages, step))
    }
}

impl From<Projection<DeltaSynapse>> for ProjectionVariant {
    fn from(p: Projection<DeltaSynapse>) -> Self {
        ProjectionVariant::Delta(p)
    }
}

impl From<Projection<AdditiveStdpDeltaSynapse>> for ProjectionVariant {
    fn from(p: Projection<AdditiveStdpDeltaSynapse>) -> Self {
        ProjectionVariant::AdditiveStdpDelta(p)
    }
}

impl From<Projection<ResourceStdpDeltaSynapse>> for ProjectionVariant {
    fn from(p: Projection<ResourceStdpDeltaSynapse>) -> Self {
        ProjectionVariant::ResourceStdpDelta(p)
    }
}

/// Static projection
pub type DeltaProjection = Projection<DeltaSynapse>;
/// Additive STDP projection
pub type AdditiveStdpProjection = Projection<AdditiveStdpDeltaSynapse>;
/// Resource STDP projection
pub type ResourceStdpProjection = Projection<ResourceStdpDeltaSynapse>;

impl Projection<DeltaSynapse> {
    /// Static projection
    pub fn delta(
        ends: ProjectionEnds,
        synapses: impl IntoIterator<Item = (u32, u32, DeltaSynapseParams)>,
    ) -> Result<Self> {
        Self::new(ends, (), synapses)
    }
}

impl Projection<AdditiveStdpDeltaSynapse> {
    /// Additive STDP projection
    pub fn additive_stdp(
        ends: ProjectionEnds,
        params: AdditiveStdpParams,
        synapses: impl IntoIterator<Item = (u32, u32, DeltaSynapseParams)>,
    ) -> Result<Self> {
        Self::new(ends, params, synapses)
    }
}

impl Projection<ResourceStdpDeltaSynapse> {
    /// Resource STDP projection
    pub fn resource_stdp(
        ends: ProjectionEnds,
        params: ResourceStdpParams,
        synapses: impl IntoIterator<Item = (u32, u32, DeltaSynapseParams)>,
    ) -> Result<Self> {
        Self::new(ends, params, synapses)
    }
}
