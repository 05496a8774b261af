//! Spike handlers: virtual spike sources derived from other sources
//!
//! A handler reads the spike messages of its sources each tick and emits one
//! spike message of its own. Handlers are typically placed between a
//! population and the projections that should only see a filtered subset of
//! its spikes, e.g. the k winners of a layer.

use std::collections::BTreeSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use synbus_core::SpikeMessage;

use crate::error::*;

/// Rewrites the spikes of one tick
pub trait SpikeHandler: fmt::Debug + Send {
    /// Handler name used in logs
    fn name(&self) -> &'static str;

    /// Produce output indexes, ascending and unique, from the incoming messages
    fn handle(&mut self, messages: &[SpikeMessage]) -> Vec<u32>;
}

fn union(messages: &[SpikeMessage]) -> Vec<u32> {
    messages
        .iter()
        .flat_map(|m| m.neuron_indexes.iter().copied())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

/// Union of all incoming spike sets
#[derive(Debug, Clone, Copy, Default)]
pub struct SpikeUnionHandler;

impl SpikeUnionHandler {
    /// Handler name
    pub const NAME: &'static str = "SpikeUnion";
}

impl SpikeHandler for SpikeUnionHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn handle(&mut self, messages: &[SpikeMessage]) -> Vec<u32> {
        union(messages)
    }
}

/// Passes at most `winners` spikes, chosen at random
#[derive(Debug, Clone)]
pub struct KWtaRandomHandler {
    winners: usize,
    rng: StdRng,
}

impl KWtaRandomHandler {
    /// Handler name
    pub const NAME: &'static str = "KWtaRandom";

    /// Create a handler with a fixed seed
    pub fn new(winners: usize, seed: u64) -> Self {
        Self {
            winners,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SpikeHandler for KWtaRandomHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn handle(&mut self, messages: &[SpikeMessage]) -> Vec<u32> {
        let spikes = union(messages);
        if spikes.len() <= self.winners {
            return spikes;
        }
        let mut chosen: Vec<u32> = spikes
            .choose_multiple(&mut self.rng, self.winners)
            .copied()
            .collect();
        chosen.sort_unstable();
        chosen
    }
}

fn validate_borders(borders: &mut Vec<u32>) -> Result<()> {
    borders.sort_unstable();
    borders.dedup();
    if borders.first() == Some(&0) {
        return Err(RuntimeError::invalid_parameter(
            "group_borders",
            "0",
            "borders > 0",
        ));
    }
    Ok(())
}

/// Group index of a neuron given sorted right borders (exclusive)
fn group_of(borders: &[u32], index: u32) -> usize {
    borders.partition_point(|&b| b <= index)
}

/// Passes all spikes of at most `winning_groups` groups, most active first.
///
/// Groups are index intervals closed by `group_borders`. Ties between
/// equally active groups are broken at random.
#[derive(Debug, Clone)]
pub struct GroupWtaRandomHandler {
    group_borders: Vec<u32>,
    winning_groups: usize,
    rng: StdRng,
}

impl GroupWtaRandomHandler {
    /// Handler name
    pub const NAME: &'static str = "GroupWtaRandom";

    /// Create a handler with a fixed seed
    pub fn new(mut group_borders: Vec<u32>, winning_groups: usize, seed: u64) -> Result<Self> {
        validate_borders(&mut group_borders)?;
        Ok(Self {
            group_borders,
            winning_groups,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl SpikeHandler for GroupWtaRandomHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn handle(&mut self, messages: &[SpikeMessage]) -> Vec<u32> {
        let spikes = union(messages);
        let mut groups: Vec<Vec<u32>> = vec![Vec::new(); self.group_borders.len() + 1];
        for index in spikes {
            groups[group_of(&self.group_borders, index)].push(index);
        }
        let mut active: Vec<Vec<u32>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        if active.len() > self.winning_groups {
            // Shuffle first so that the stable sort breaks ties randomly.
            active.shuffle(&mut self.rng);
            active.sort_by(|a, b| b.len().cmp(&a.len()));
            active.truncate(self.winning_groups);
        }
        let mut out: Vec<u32> = active.into_iter().flatten().collect();
        out.sort_unstable();
        out
    }
}

/// Passes at most `winners_per_group` random spikes from every group
#[derive(Debug, Clone)]
pub struct KWtaPerGroupHandler {
    group_borders: Vec<u32>,
    winners_per_group: usize,
    rng: StdRng,
}

impl KWtaPerGroupHandler {
    /// Handler name
    pub const NAME: &'static str = "KWtaPerGroup";

    /// Create a handler with a fixed seed
    pub fn new(mut group_borders: Vec<u32>, winners_per_group: usize, seed: u64) -> Result<Self> {
        validate_borders(&mut group_borders)?;
        Ok(Self {
            group_borders,
            winners_per_group,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl SpikeHandler for KWtaPerGroupHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn handle(&mut self, messages: &[SpikeMessage]) -> Vec<u32> {
        let spikes = union(messages);
        let mut groups: Vec<Vec<u32>> = vec![Vec::new(); self.group_borders.len() + 1];
        for index in spikes {
            groups[group_of(&self.group_borders, index)].push(index);
        }
        let mut out = Vec::new();
        for group in groups {
            if group.len() <= self.winners_per_group {
                out.extend(group);
            } else {
                out.extend(group.choose_multiple(&mut self.rng, self.winners_per_group));
            }
        }
        out.sort_unstable();
        out
    }
}
