//! Tick-driven simulation backend
//!
//! The backend owns the message bus and every registered component. One tick
//! runs four phases in a fixed order:
//!
//! 1. every projection turns the spikes it received into impacts due now,
//! 2. the bus routes those impacts,
//! 3. every population integrates its impacts and publishes its spikes, spike
//!    handlers rewrite the spikes they received, and resource STDP trains the
//!    synapses of populations that fired,
//! 4. the bus routes the spikes.
//!
//! Components inside one phase never see each other's output, so with the
//! `parallel` feature they run concurrently and the result does not depend on
//! the number of threads.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use synbus_core::{
    generator_for, BusStats, MessageBus, MessageEndpoint, SenderPattern, SpikeMessage, Step,
    SynapticImpactMessage, TagMap, Uid, UidGenerator, UidStrategy,
};

use crate::error::*;
use crate::handlers::SpikeHandler;
use crate::plasticity::train_synaptic_resource;
use crate::population::PopulationVariant;
use crate::projection::{Projection, ProjectionVariant};
use crate::synapse::ResourceStdpDeltaSynapse;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Backend construction settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackendConfig {
    /// Worker threads for the parallel phases. `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Strategy for UIDs the backend generates itself
    pub uid_strategy: UidStrategy,
    /// Log progress every this many ticks
    pub progress_interval: Option<u64>,
    /// Sample per-tick wall time
    pub perf_enabled: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            threads: None,
            uid_strategy: UidStrategy::Random,
            progress_interval: None,
            perf_enabled: false,
        }
    }
}

impl BackendConfig {
    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(RuntimeError::invalid_parameter("threads", "0", "> 0"));
        }
        if self.progress_interval == Some(0) {
            return Err(RuntimeError::invalid_parameter(
                "progress_interval",
                "0",
                "> 0",
            ));
        }
        Ok(())
    }

    /// Use a dedicated pool with `threads` workers
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the UID strategy
    pub fn with_uid_strategy(mut self, strategy: UidStrategy) -> Self {
        self.uid_strategy = strategy;
        self
    }

    /// Log progress every `interval` ticks
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Enable or disable per-tick timing
    pub fn with_perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }
}

/// Tick timing collected when `perf_enabled` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerfReport {
    /// Average tick time in nanoseconds
    pub avg_step_ns: u64,
    /// Max tick time in nanoseconds
    pub max_step_ns: u64,
    /// Ticks sampled
    pub steps: usize,
}

/// Counters describing the backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendStats {
    /// Next tick to run
    pub step: Step,
    /// Registered populations
    pub populations: usize,
    /// Registered projections
    pub projections: usize,
    /// Registered input channels
    pub input_channels: usize,
    /// Registered spike handlers
    pub spike_handlers: usize,
    /// Spikes emitted by populations so far
    pub total_spikes: u64,
    /// Bus traffic
    pub bus: BusStats,
    /// Tick timing, if enabled
    pub perf: Option<PerfReport>,
}

/// Cloneable handle that requests a stop from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop before the next tick. Returns false if one was already pending.
    pub fn stop(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Whether a stop is pending
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct PopulationSlot {
    population: PopulationVariant,
    endpoint: MessageEndpoint,
}

impl PopulationSlot {
    fn calculate(&mut self, step: Step) -> Vec<u32> {
        let impacts = self.endpoint.unload_messages::<SynapticImpactMessage>();
        let spikes = self.population.calculate(&impacts, step);
        let fired = spikes.neuron_indexes.clone();
        self.endpoint.send(spikes);
        fired
    }
}

#[derive(Debug)]
struct ProjectionSlot {
    projection: ProjectionVariant,
    endpoint: MessageEndpoint,
}

impl ProjectionSlot {
    fn calculate(&mut self, step: Step) {
        let spikes = self.endpoint.unload_messages::<SpikeMessage>();
        if let Some(impacts) = self.projection.calculate(&spikes, step) {
            self.endpoint.send(impacts);
        }
    }
}

#[derive(Debug)]
struct HandlerSlot {
    uid: Uid,
    size: Option<usize>,
    handler: Box<dyn SpikeHandler>,
    endpoint: MessageEndpoint,
}

impl HandlerSlot {
    fn calculate(&mut self, step: Step) {
        let spikes = self.endpoint.unload_messages::<SpikeMessage>();
        let out = self.handler.handle(&spikes);
        self.endpoint.send(SpikeMessage::new(self.uid, step, out));
    }
}

/// Owns the bus and all components of one simulation
pub struct Backend {
    config: BackendConfig,
    bus: MessageBus,
    uids: Box<dyn UidGenerator>,
    populations: Vec<PopulationSlot>,
    population_index: HashMap<Uid, usize>,
    projections: Vec<ProjectionSlot>,
    projection_index: HashMap<Uid, usize>,
    input_channels: HashMap<Uid, Option<usize>>,
    handlers: Vec<HandlerSlot>,
    spike_counts: HashMap<Uid, u64>,
    step: Step,
    started: bool,
    stop: Arc<AtomicBool>,
    perf_samples: Vec<u64>,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .field("step", &self.step)
            .field("populations", &self.populations.len())
            .field("projections", &self.projections.len())
            .field("input_channels", &self.input_channels.len())
            .field("handlers", &self.handlers.len())
            .field("started", &self.started)
            .finish()
    }
}

impl Backend {
    /// Backend with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(BackendConfig::default())
    }

    /// Backend with the given settings
    pub fn with_config(config: BackendConfig) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "parallel")]
        let pool = match config.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| RuntimeError::invalid_config(format!("thread pool: {}", e)))?,
            ),
            None => None,
        };
        #[cfg(not(feature = "parallel"))]
        if config.threads.map_or(false, |t| t > 1) {
            log::warn!("Built without the parallel feature, running single-threaded");
        }

        log::debug!("Created backend with {:?}", config);
        Ok(Self {
            uids: generator_for(config.uid_strategy),
            config,
            bus: MessageBus::new(),
            populations: Vec::new(),
            population_index: HashMap::new(),
            projections: Vec::new(),
            projection_index: HashMap::new(),
            input_channels: HashMap::new(),
            handlers: Vec::new(),
            spike_counts: HashMap::new(),
            step: 0,
            started: false,
            stop: Arc::new(AtomicBool::new(false)),
            perf_samples: Vec::new(),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Settings the backend was built with
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// The message bus, e.g. to attach observers before the first tick
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Next tick to run
    pub fn current_step(&self) -> Step {
        self.step
    }

    /// Whether the first tick has run
    pub fn is_started(&self) -> bool {
        self.started
    }

    fn ensure_not_started(&self, operation: &str) -> Result<()> {
        if self.started {
            return Err(RuntimeError::concurrent_modification(operation));
        }
        Ok(())
    }

    fn is_registered(&self, uid: &Uid) -> bool {
        self.population_index.contains_key(uid)
            || self.projection_index.contains_key(uid)
            || self.input_channels.contains_key(uid)
            || self.handlers.iter().any(|h| h.uid == *uid)
    }

    fn ensure_unique(&self, uid: Uid) -> Result<()> {
        if self.is_registered(&uid) {
            return Err(RuntimeError::DuplicateUid { uid });
        }
        Ok(())
    }

    /// Size of a registered spike source. `Some(None)` is an unsized source.
    fn source_size(&self, uid: &Uid) -> Option<Option<usize>> {
        if let Some(&i) = self.population_index.get(uid) {
            return Some(Some(self.populations[i].population.size()));
        }
        if let Some(&size) = self.input_channels.get(uid) {
            return Some(size);
        }
        self.handlers.iter().find(|h| h.uid == *uid).map(|h| h.size)
    }

    /// Register a population
    pub fn add_population(&mut self, population: impl Into<PopulationVariant>) -> Result<Uid> {
        self.ensure_not_started("add population")?;
        let population = population.into();
        let uid = population.uid();
        self.ensure_unique(uid)?;

        let endpoint = self.bus.create_endpoint(uid)?;
        log::debug!(
            "Added {} population {} with {} neurons",
            population.model_name(),
            uid,
            population.size()
        );
        self.population_index.insert(uid, self.populations.len());
        self.populations.push(PopulationSlot {
            population,
            endpoint,
        });
        Ok(uid)
    }

    /// Register an external spike source. A size enables index checks.
    pub fn add_input_channel(&mut self, size: Option<usize>) -> Result<Uid> {
        self.ensure_not_started("add input channel")?;
        let uid = self.uids.generate();
        self.ensure_unique(uid)?;
        self.input_channels.insert(uid, size);
        log::debug!("Added input channel {} (size {:?})", uid, size);
        Ok(uid)
    }

    /// Register a spike handler fed by `sources`. It acts as a spike source
    /// itself, one tick behind its inputs.
    pub fn add_spike_handler(
        &mut self,
        handler: impl SpikeHandler + 'static,
        sources: &[Uid],
    ) -> Result<Uid> {
        self.ensure_not_started("add spike handler")?;
        let mut size = Some(0usize);
        for source in sources {
            let source_size = self
                .source_size(source)
                .ok_or(RuntimeError::UnknownPopulation { uid: *source })?;
            size = match (size, source_size) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
        }

        let uid = self.uids.generate();
        self.ensure_unique(uid)?;
        let endpoint = self.bus.create_endpoint(uid)?;
        endpoint.subscribe_to::<SpikeMessage>(SenderPattern::senders(sources.iter().copied()))?;
        log::debug!("Added {} handler {} over {} sources", handler.name(), uid, sources.len());
        self.handlers.push(HandlerSlot {
            uid,
            size,
            handler: Box::new(handler),
            endpoint,
        });
        Ok(uid)
    }

    /// Register a projection.
    ///
    /// The postsynaptic end must be a registered population and the
    /// presynaptic end a registered population, input channel or spike
    /// handler. Synapse indexes are checked against the registered sizes.
    pub fn add_projection(&mut self, projection: impl Into<ProjectionVariant>) -> Result<Uid> {
        self.ensure_not_started("add projection")?;
        let projection = projection.into();
        let uid = projection.uid();
        self.ensure_unique(uid)?;

        let ends = *projection.ends();
        let post_index = *self
            .population_index
            .get(&ends.postsynaptic_uid)
            .ok_or(RuntimeError::UnknownPopulation {
                uid: ends.postsynaptic_uid,
            })?;
        let post_size = self.populations[post_index].population.size();
        if let Some(max) = projection.max_postsynaptic_index() {
            if max as usize >= post_size {
                return Err(RuntimeError::index_out_of_range(
                    "postsynaptic neuron",
                    max as usize,
                    post_size,
                ));
            }
        }

        let pre_size = self
            .source_size(&ends.presynaptic_uid)
            .ok_or(RuntimeError::UnknownPopulation {
                uid: ends.presynaptic_uid,
            })?;
        if let (Some(size), Some(max)) = (pre_size, projection.max_presynaptic_index()) {
            if max as usize >= size {
                return Err(RuntimeError::index_out_of_range(
                    "presynaptic neuron",
                    max as usize,
                    size,
                ));
            }
        }

        let endpoint = self.bus.create_endpoint(uid)?;
        endpoint.subscribe_to::<SpikeMessage>(ends.presynaptic_uid)?;
        if projection.learns_from_postsynaptic() {
            endpoint.subscribe_to::<SpikeMessage>(ends.postsynaptic_uid)?;
        }
        self.populations[post_index]
            .endpoint
            .subscribe_to::<SynapticImpactMessage>(uid)?;

        log::debug!(
            "Added {} projection {}: {} -> {} ({} synapses)",
            projection.model_name(),
            uid,
            ends.presynaptic_uid,
            ends.postsynaptic_uid,
            projection.len()
        );
        self.projection_index.insert(uid, self.projections.len());
        self.projections.push(ProjectionSlot {
            projection,
            endpoint,
        });
        Ok(uid)
    }

    /// Create an endpoint that receives the spikes of `sources`.
    ///
    /// Must be called before the first tick. Read it between ticks with
    /// [`MessageEndpoint::unload_messages`].
    pub fn create_observer(&mut self, sources: &[Uid]) -> Result<MessageEndpoint> {
        self.ensure_not_started("create observer")?;
        for source in sources {
            if self.source_size(source).is_none() {
                return Err(RuntimeError::UnknownPopulation { uid: *source });
            }
        }
        let endpoint = self.bus.create_endpoint(self.uids.generate())?;
        endpoint.subscribe_to::<SpikeMessage>(SenderPattern::senders(sources.iter().copied()))?;
        Ok(endpoint)
    }

    /// Publish external spikes on `channel`. They reach projections on the
    /// next tick. Returns the number of receivers.
    pub fn send_spikes(&self, channel: Uid, mut indexes: Vec<u32>) -> Result<usize> {
        let size = *self
            .input_channels
            .get(&channel)
            .ok_or(RuntimeError::UnknownPopulation { uid: channel })?;
        indexes.sort_unstable();
        indexes.dedup();
        if let (Some(size), Some(&max)) = (size, indexes.last()) {
            if max as usize >= size {
                return Err(RuntimeError::index_out_of_range(
                    "input channel neuron",
                    max as usize,
                    size,
                ));
            }
        }
        Ok(self
            .bus
            .publish(SpikeMessage::new(channel, self.step, indexes)))
    }

    /// Run up to `n` ticks. Stops early when a stop was requested and returns
    /// the number of ticks executed.
    pub fn step(&mut self, n: u64) -> Result<u64> {
        let mut executed = 0;
        while executed < n {
            if self.stop.load(Ordering::Acquire) {
                log::info!("Stop requested at step {}", self.step);
                break;
            }
            self.tick()?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Request a stop before the next tick. Returns false if already requested.
    pub fn stop(&self) -> bool {
        let requested = !self.stop.swap(true, Ordering::AcqRel);
        if requested {
            log::debug!("Stop requested");
        }
        requested
    }

    /// Clear a pending stop. Returns whether one was pending.
    pub fn resume(&self) -> bool {
        self.stop.swap(false, Ordering::AcqRel)
    }

    /// Whether a stop is pending
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Handle for requesting a stop from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    fn tick(&mut self) -> Result<()> {
        if !self.started {
            self.bus.seal();
            self.started = true;
            log::info!(
                "Starting simulation: {} populations, {} projections",
                self.populations.len(),
                self.projections.len()
            );
        }
        let started = self.config.perf_enabled.then(Instant::now);
        let step = self.step;

        self.run_projections(step);
        self.bus.route_step();
        self.run_populations(step);
        self.bus.route_step();

        if let Some(started) = started {
            self.perf_samples.push(started.elapsed().as_nanos() as u64);
        }
        self.step += 1;
        if let Some(interval) = self.config.progress_interval {
            if self.step % interval == 0 {
                log::info!(
                    "Simulation progress: step {}, {} spikes",
                    self.step,
                    self.total_spikes()
                );
            }
        }
        Ok(())
    }

    fn run_projections(&mut self, step: Step) {
        let run = |slot: &mut ProjectionSlot| slot.calculate(step);

        #[cfg(feature = "parallel")]
        {
            let projections = &mut self.projections;
            match &self.pool {
                Some(pool) => pool.install(|| projections.par_iter_mut().for_each(run)),
                None => projections.par_iter_mut().for_each(run),
            }
        }
        #[cfg(not(feature = "parallel"))]
        self.projections.iter_mut().for_each(run);
    }

    fn run_populations(&mut self, step: Step) {
        let run = |slot: &mut PopulationSlot| slot.calculate(step);

        #[cfg(feature = "parallel")]
        let fired: Vec<Vec<u32>> = {
            let populations = &mut self.populations;
            match &self.pool {
                Some(pool) => pool.install(|| populations.par_iter_mut().map(run).collect()),
                None => populations.par_iter_mut().map(run).collect(),
            }
        };
        #[cfg(not(feature = "parallel"))]
        let fired: Vec<Vec<u32>> = self.populations.iter_mut().map(run).collect();

        for handler in &mut self.handlers {
            handler.calculate(step);
        }

        for (slot, fired) in self.populations.iter_mut().zip(&fired) {
            let uid = slot.population.uid();
            *self.spike_counts.entry(uid).or_insert(0) += fired.len() as u64;

            if let PopulationVariant::ResourceStdpBlifat(population) = &mut slot.population {
                let mut working: Vec<&mut Projection<ResourceStdpDeltaSynapse>> = self
                    .projections
                    .iter_mut()
                    .filter_map(|s| match &mut s.projection {
                        ProjectionVariant::ResourceStdpDelta(p)
                            if p.postsynaptic_uid() == uid && !p.is_locked() =>
                        {
                            Some(p)
                        }
                        _ => None,
                    })
                    .collect();
                train_synaptic_resource(population, &mut working, fired, step);
            }
        }
    }

    /// Population by UID
    pub fn population(&self, uid: &Uid) -> Option<&PopulationVariant> {
        self.population_index
            .get(uid)
            .map(|&i| &self.populations[i].population)
    }

    /// Mutable population by UID, for changes between ticks
    pub fn population_mut(&mut self, uid: &Uid) -> Option<&mut PopulationVariant> {
        self.population_index
            .get(uid)
            .map(|&i| &mut self.populations[i].population)
    }

    /// Projection by UID
    pub fn projection(&self, uid: &Uid) -> Option<&ProjectionVariant> {
        self.projection_index
            .get(uid)
            .map(|&i| &self.projections[i].projection)
    }

    /// Mutable projection by UID, for changes between ticks
    pub fn projection_mut(&mut self, uid: &Uid) -> Option<&mut ProjectionVariant> {
        self.projection_index
            .get(uid)
            .map(|&i| &mut self.projections[i].projection)
    }

    /// UIDs of all populations in registration order
    pub fn population_uids(&self) -> Vec<Uid> {
        self.populations.iter().map(|s| s.population.uid()).collect()
    }

    /// UIDs of all projections in registration order
    pub fn projection_uids(&self) -> Vec<Uid> {
        self.projections.iter().map(|s| s.projection.uid()).collect()
    }

    /// Membrane potentials of a population
    pub fn potentials(&self, uid: &Uid) -> Result<Vec<f32>> {
        self.population(uid)
            .map(PopulationVariant::potentials)
            .ok_or(RuntimeError::UnknownPopulation { uid: *uid })
    }

    /// Weights of a projection in synapse order
    pub fn weights(&self, uid: &Uid) -> Result<Vec<f32>> {
        self.projection(uid)
            .map(ProjectionVariant::weights)
            .ok_or(RuntimeError::UnknownProjection { uid: *uid })
    }

    /// Tags of a population or projection
    pub fn tags(&self, uid: &Uid) -> Option<&TagMap> {
        self.population(uid)
            .map(PopulationVariant::tags)
            .or_else(|| self.projection(uid).map(ProjectionVariant::tags))
    }

    /// Disable learning on a projection
    pub fn lock_weights(&mut self, uid: &Uid) -> Result<()> {
        self.projection_mut(uid)
            .ok_or(RuntimeError::UnknownProjection { uid: *uid })?
            .lock_weights();
        Ok(())
    }

    /// Re-enable learning on a projection
    pub fn unlock_weights(&mut self, uid: &Uid) -> Result<()> {
        self.projection_mut(uid)
            .ok_or(RuntimeError::UnknownProjection { uid: *uid })?
            .unlock_weights();
        Ok(())
    }

    /// Spikes emitted by a population so far
    pub fn spike_count(&self, uid: &Uid) -> u64 {
        self.spike_counts.get(uid).copied().unwrap_or(0)
    }

    /// Spikes emitted by all populations so far
    pub fn total_spikes(&self) -> u64 {
        self.spike_counts.values().sum()
    }

    /// Tick timing summary, if sampling is enabled and a tick has run
    pub fn perf_report(&self) -> Option<PerfReport> {
        if self.perf_samples.is_empty() {
            return None;
        }
        let steps = self.perf_samples.len();
        let sum: u128 = self.perf_samples.iter().map(|v| *v as u128).sum();
        Some(PerfReport {
            avg_step_ns: (sum / steps as u128) as u64,
            max_step_ns: self.perf_samples.iter().copied().max().unwrap_or(0),
            steps,
        })
    }

    /// Counters describing the backend
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            step: self.step,
            populations: self.populations.len(),
            projections: self.projections.len(),
            input_channels: self.input_channels.len(),
            spike_handlers: self.handlers.len(),
            total_spikes: self.total_spikes(),
            bus: self.bus.stats(),
            perf: self.perf_report(),
        }
    }
}
