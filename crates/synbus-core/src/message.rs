//! Message types carried by the bus

use crate::uid::Uid;

/// Discrete simulation tick
pub type Step = u64;

/// Common header of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageHeader {
    /// Entity that published the message
    pub sender_uid: Uid,
    /// Tick on which the message was produced
    pub send_time: Step,
}

impl MessageHeader {
    /// Create a new header
    pub fn new(sender_uid: Uid, send_time: Step) -> Self {
        Self {
            sender_uid,
            send_time,
        }
    }
}

/// Indexes of the neurons that fired on one tick
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpikeMessage {
    /// Message header
    pub header: MessageHeader,
    /// Fired neuron indexes
    pub neuron_indexes: Vec<u32>,
}

impl SpikeMessage {
    /// Create a new spike message
    pub fn new(sender_uid: Uid, send_time: Step, neuron_indexes: Vec<u32>) -> Self {
        Self {
            header: MessageHeader::new(sender_uid, send_time),
            neuron_indexes,
        }
    }

    /// True when no neuron fired
    pub fn is_empty(&self) -> bool {
        self.neuron_indexes.is_empty()
    }
}

/// How a synaptic impact acts on the receiving neuron
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputType {
    /// Adds to membrane potential
    #[default]
    Excitatory,
    /// Subtracts from membrane potential
    InhibitoryCurrent,
    /// Adds inhibitory conductance
    InhibitoryConductance,
    /// Reinforcement signal for plasticity
    Dopamine,
    /// Sets the neuron blocking period
    Blocking,
}

/// A single weighted pulse delivered to one postsynaptic neuron
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapticImpact {
    /// Synapse index inside the sending projection
    pub connection_index: u64,
    /// Weighted value
    pub impact_value: f32,
    /// Effect kind
    pub synapse_type: OutputType,
    /// Presynaptic neuron index
    pub presynaptic_neuron_index: u32,
    /// Postsynaptic neuron index
    pub postsynaptic_neuron_index: u32,
}

/// All impacts one projection delivers on one tick
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapticImpactMessage {
    /// Message header (sender is the projection)
    pub header: MessageHeader,
    /// Source of the spikes that caused the impacts
    pub presynaptic_population_uid: Uid,
    /// Population receiving the impacts
    pub postsynaptic_population_uid: Uid,
    /// Impacts force the target to fire regardless of learning state
    pub is_forcing: bool,
    /// Batched impacts
    pub impacts: Vec<SynapticImpact>,
}

/// Kind tag used by subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    /// [`SpikeMessage`]
    Spike,
    /// [`SynapticImpactMessage`]
    SynapticImpact,
}

/// Any message the bus can carry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// Spikes
    Spike(SpikeMessage),
    /// Synaptic impacts
    SynapticImpact(SynapticImpactMessage),
}

impl Message {
    /// Header of the wrapped message
    pub fn header(&self) -> &MessageHeader {
        match self {
            Message::Spike(m) => &m.header,
            Message::SynapticImpact(m) => &m.header,
        }
    }

    /// Kind of the wrapped message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Spike(_) => MessageKind::Spike,
            Message::SynapticImpact(_) => MessageKind::SynapticImpact,
        }
    }
}

impl From<SpikeMessage> for Message {
    fn from(m: SpikeMessage) -> Self {
        Message::Spike(m)
    }
}

impl From<SynapticImpactMessage> for Message {
    fn from(m: SynapticImpactMessage) -> Self {
        Message::SynapticImpact(m)
    }
}

/// Typed access to one message kind, used by endpoint unloading
pub trait BusMessage: Sized + Into<Message> {
    /// Kind tag of this message type
    const KIND: MessageKind;

    /// Extract this type from a generic message
    fn from_message(message: Message) -> Option<Self>;

    /// Header of the message
    fn header(&self) -> &MessageHeader;
}

impl BusMessage for SpikeMessage {
    const KIND: MessageKind = MessageKind::Spike;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Spike(m) => Some(m),
            _ => None,
        }
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

impl BusMessage for SynapticImpactMessage {
    const KIND: MessageKind = MessageKind::SynapticImpact;

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::SynapticImpact(m) => Some(m),
            _ => None,
        }
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_and_header() {
        let uid = Uid::new();
        let msg: Message = SpikeMessage::new(uid, 3, vec![1, 2]).into();
        assert_eq!(msg.kind(), MessageKind::Spike);
        assert_eq!(msg.header().sender_uid, uid);
        assert_eq!(msg.header().send_time, 3);
    }

    #[test]
    fn test_typed_extraction() {
        let uid = Uid::new();
        let msg: Message = SpikeMessage::new(uid, 0, vec![]).into();
        assert!(SynapticImpactMessage::from_message(msg.clone()).is_none());
        let spikes = SpikeMessage::from_message(msg).unwrap();
        assert!(spikes.is_empty());
    }
}
