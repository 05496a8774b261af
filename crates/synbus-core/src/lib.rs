//! Messaging core for the synbus spiking simulator
//!
//! This crate holds everything the simulation components share: unique
//! identifiers, the spike and synaptic impact messages, subscription filters,
//! the publish/subscribe [`MessageBus`] with its endpoints, and tag maps for
//! bookkeeping metadata.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod error;
pub mod message;
pub mod subscription;
pub mod tags;
pub mod uid;

pub use bus::{BusStats, EndpointHandle, MessageBus, MessageEndpoint};
pub use error::{BusError, Result};
pub use message::{
    BusMessage, Message, MessageHeader, MessageKind, OutputType, SpikeMessage, Step,
    SynapticImpact, SynapticImpactMessage,
};
pub use subscription::{impact_subscription, spike_subscription, SenderPattern, Subscription};
pub use tags::{BaseData, TagMap, TagValue};
pub use uid::{
    generator_for, uid_hash, ContinuousUidGenerator, RandomUidGenerator, TimeOrderedUidGenerator,
    Uid, UidGenerator, UidStrategy,
};

/// Messaging crate version for compatibility checking
pub const CORE_VERSION: u32 = 1;
