//! Subscription filters held by endpoints

use std::collections::BTreeSet;

use crate::message::MessageKind;
use crate::uid::Uid;

/// Which senders a subscription accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderPattern {
    /// Every sender
    Any,
    /// Only the listed senders
    Senders(BTreeSet<Uid>),
}

impl SenderPattern {
    /// Pattern accepting the given senders
    pub fn senders<I: IntoIterator<Item = Uid>>(senders: I) -> Self {
        SenderPattern::Senders(senders.into_iter().collect())
    }

    /// Check whether a sender matches
    pub fn matches(&self, sender: &Uid) -> bool {
        match self {
            SenderPattern::Any => true,
            SenderPattern::Senders(set) => set.contains(sender),
        }
    }

    /// Widen this pattern with another one. Merging is idempotent.
    pub fn merge(&mut self, other: &SenderPattern) {
        match (&mut *self, other) {
            (SenderPattern::Any, _) => {}
            (this, SenderPattern::Any) => *this = SenderPattern::Any,
            (SenderPattern::Senders(a), SenderPattern::Senders(b)) => {
                a.extend(b.iter().copied());
            }
        }
    }
}

impl From<Uid> for SenderPattern {
    fn from(uid: Uid) -> Self {
        SenderPattern::senders([uid])
    }
}

impl From<Vec<Uid>> for SenderPattern {
    fn from(uids: Vec<Uid>) -> Self {
        SenderPattern::senders(uids)
    }
}

/// Interest of one endpoint in one message kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Owner of the receiving endpoint
    pub receiver: Uid,
    /// Accepted message kind
    pub kind: MessageKind,
    /// Accepted senders
    pub senders: SenderPattern,
}

impl Subscription {
    /// Create a new subscription
    pub fn new(receiver: Uid, kind: MessageKind, senders: SenderPattern) -> Self {
        Self {
            receiver,
            kind,
            senders,
        }
    }

    /// Check whether a message of `kind` from `sender` is accepted
    pub fn accepts(&self, kind: MessageKind, sender: &Uid) -> bool {
        self.kind == kind && self.senders.matches(sender)
    }
}

/// Subscription to spike messages
pub fn spike_subscription(receiver: Uid, senders: impl Into<SenderPattern>) -> Subscription {
    Subscription::new(receiver, MessageKind::Spike, senders.into())
}

/// Subscription to synaptic impact messages
pub fn impact_subscription(receiver: Uid, senders: impl Into<SenderPattern>) -> Subscription {
    Subscription::new(receiver, MessageKind::SynapticImpact, senders.into())
}
