//! Publish/subscribe message bus
//!
//! Endpoints live in an arena owned by the bus and are addressed by index, so
//! the routing table never holds owning pointers to its subscribers. Delivery
//! is two-phase: [`MessageBus::publish`] appends to a per-endpoint pending
//! queue, and [`MessageBus::route_step`] moves everything pending into the
//! inboxes. A message is therefore never visible in the same phase it was
//! published in.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{BusError, Result};
use crate::message::{BusMessage, Message, MessageKind};
use crate::subscription::{SenderPattern, Subscription};
use crate::uid::Uid;

/// Index of an endpoint slot inside the bus arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointHandle(usize);

impl EndpointHandle {
    /// Raw arena index
    pub const fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct EndpointSlot {
    owner: Uid,
    pending: Mutex<Vec<Message>>,
    inbox: Mutex<Vec<Message>>,
}

impl EndpointSlot {
    fn new(owner: Uid) -> Self {
        Self {
            owner,
            pending: Mutex::new(Vec::new()),
            inbox: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Debug, Default)]
struct RoutingTable {
    /// Merged pattern per (endpoint, kind)
    subscriptions: HashMap<(usize, MessageKind), SenderPattern>,
    /// Exact-sender index
    by_sender: HashMap<(MessageKind, Uid), BTreeSet<usize>>,
    /// Endpoints accepting any sender
    wildcard: HashMap<MessageKind, BTreeSet<usize>>,
}

impl RoutingTable {
    fn insert(&mut self, endpoint: usize, kind: MessageKind, pattern: &SenderPattern) {
        let merged = self
            .subscriptions
            .entry((endpoint, kind))
            .and_modify(|p| p.merge(pattern))
            .or_insert_with(|| pattern.clone())
            .clone();
        self.index(endpoint, kind, &merged);
    }

    fn remove(&mut self, endpoint: usize, kind: MessageKind) -> bool {
        let Some(pattern) = self.subscriptions.remove(&(endpoint, kind)) else {
            return false;
        };
        match pattern {
            SenderPattern::Any => {
                if let Some(set) = self.wildcard.get_mut(&kind) {
                    set.remove(&endpoint);
                }
            }
            SenderPattern::Senders(senders) => {
                for sender in senders {
                    if let Some(set) = self.by_sender.get_mut(&(kind, sender)) {
                        set.remove(&endpoint);
                        if set.is_empty() {
                            self.by_sender.remove(&(kind, sender));
                        }
                    }
                }
            }
        }
        true
    }

    fn index(&mut self, endpoint: usize, kind: MessageKind, pattern: &SenderPattern) {
        match pattern {
            SenderPattern::Any => {
                self.wildcard.entry(kind).or_default().insert(endpoint);
                // The wildcard supersedes exact entries for this endpoint.
                for set in self
                    .by_sender
                    .iter_mut()
                    .filter(|((k, _), _)| *k == kind)
                    .map(|(_, set)| set)
                {
                    set.remove(&endpoint);
                }
                self.by_sender.retain(|_, set| !set.is_empty());
            }
            SenderPattern::Senders(senders) => {
                for sender in senders {
                    self.by_sender
                        .entry((kind, *sender))
                        .or_default()
                        .insert(endpoint);
                }
            }
        }
    }

    fn receivers(&self, kind: MessageKind, sender: &Uid) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        if let Some(set) = self.by_sender.get(&(kind, *sender)) {
            out.extend(set.iter().copied());
        }
        if let Some(set) = self.wildcard.get(&kind) {
            out.extend(set.iter().copied());
        }
        out
    }
}

#[derive(Debug, Default)]
struct Registry {
    slots: Vec<Arc<EndpointSlot>>,
    owners: HashMap<Uid, usize>,
    routing: RoutingTable,
}

/// Counters describing bus traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStats {
    /// Registered endpoints
    pub endpoints: usize,
    /// Messages accepted by `publish`
    pub published: u64,
    /// Per-receiver deliveries moved to inboxes by `route_step`
    pub routed: u64,
    /// Messages published with no matching subscriber
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct BusShared {
    registry: RwLock<Registry>,
    sealed: AtomicBool,
    published: AtomicU64,
    routed: AtomicU64,
    dropped: AtomicU64,
}

/// Message bus connecting all endpoints of one simulation.
///
/// Cloning is cheap and yields another handle onto the same bus.
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    shared: Arc<BusShared>,
}

impl MessageBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mailbox for `owner`
    pub fn create_endpoint(&self, owner: Uid) -> Result<MessageEndpoint> {
        self.ensure_open("create endpoint")?;
        let mut registry = self.shared.registry.write();
        if registry.owners.contains_key(&owner) {
            return Err(BusError::DuplicateUid { uid: owner });
        }
        let index = registry.slots.len();
        let slot = Arc::new(EndpointSlot::new(owner));
        registry.slots.push(Arc::clone(&slot));
        registry.owners.insert(owner, index);
        log::debug!("Created endpoint #{} for {}", index, owner);

        Ok(MessageEndpoint {
            owner,
            handle: EndpointHandle(index),
            slot,
            bus: self.clone(),
        })
    }

    /// Register interest of `owner`'s endpoint in `kind` messages from `senders`.
    ///
    /// Subscribing twice with the same pattern changes nothing; different
    /// patterns for the same kind are merged.
    pub fn subscribe(
        &self,
        owner: Uid,
        kind: MessageKind,
        senders: impl Into<SenderPattern>,
    ) -> Result<()> {
        self.ensure_open("subscribe")?;
        let senders = senders.into();
        let mut registry = self.shared.registry.write();
        let index = *registry
            .owners
            .get(&owner)
            .ok_or(BusError::UnknownEndpoint { uid: owner })?;
        registry.routing.insert(index, kind, &senders);
        log::trace!("{} subscribed to {:?} from {:?}", owner, kind, senders);
        Ok(())
    }

    /// Register a prepared subscription
    pub fn add_subscription(&self, subscription: Subscription) -> Result<()> {
        self.subscribe(subscription.receiver, subscription.kind, subscription.senders)
    }

    /// Drop `owner`'s interest in `kind`. Returns whether a subscription existed.
    pub fn unsubscribe(&self, owner: Uid, kind: MessageKind) -> Result<bool> {
        self.ensure_open("unsubscribe")?;
        let mut registry = self.shared.registry.write();
        let index = *registry
            .owners
            .get(&owner)
            .ok_or(BusError::UnknownEndpoint { uid: owner })?;
        Ok(registry.routing.remove(index, kind))
    }

    /// Current subscription of `owner` for `kind`, if any
    pub fn subscription(&self, owner: Uid, kind: MessageKind) -> Option<Subscription> {
        let registry = self.shared.registry.read();
        let index = *registry.owners.get(&owner)?;
        registry
            .routing
            .subscriptions
            .get(&(index, kind))
            .map(|senders| Subscription::new(owner, kind, senders.clone()))
    }

    /// Queue a message for every matching endpoint.
    ///
    /// Returns the number of receivers. A message nobody subscribed to is
    /// dropped silently.
    pub fn publish(&self, message: impl Into<Message>) -> usize {
        let message = message.into();
        let kind = message.kind();
        let sender = message.header().sender_uid;
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        let registry = self.shared.registry.read();
        let receivers = registry.routing.receivers(kind, &sender);
        if receivers.is_empty() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("Dropped {:?} from {}: no subscribers", kind, sender);
            return 0;
        }

        let count = receivers.len();
        let mut iter = receivers.into_iter().peekable();
        while let Some(index) = iter.next() {
            let slot = &registry.slots[index];
            if iter.peek().is_some() {
                slot.pending.lock().push(message.clone());
            } else {
                slot.pending.lock().push(message);
                break;
            }
        }
        log::trace!("Published {:?} from {} to {} endpoints", kind, sender, count);
        count
    }

    /// Make everything published so far visible in the receivers' inboxes.
    ///
    /// Each batch is ordered by (kind, sender, send time) before delivery so
    /// that inbox contents never depend on the order concurrent publishers
    /// won their locks in. Returns the number of deliveries.
    pub fn route_step(&self) -> usize {
        let registry = self.shared.registry.read();
        let mut routed = 0;
        for slot in &registry.slots {
            let mut batch = std::mem::take(&mut *slot.pending.lock());
            if batch.is_empty() {
                continue;
            }
            batch.sort_by(|a, b| {
                let (ha, hb) = (a.header(), b.header());
                (a.kind(), ha.sender_uid, ha.send_time).cmp(&(b.kind(), hb.sender_uid, hb.send_time))
            });
            routed += batch.len();
            slot.inbox.lock().extend(batch);
        }
        self.shared.routed.fetch_add(routed as u64, Ordering::Relaxed);
        log::debug!("Routed {} messages", routed);
        routed
    }

    /// Freeze the routing table. Registration calls fail afterwards.
    pub fn seal(&self) {
        if !self.shared.sealed.swap(true, Ordering::AcqRel) {
            log::debug!("Message bus sealed");
        }
    }

    /// Whether the routing table is frozen
    pub fn is_sealed(&self) -> bool {
        self.shared.sealed.load(Ordering::Acquire)
    }

    /// Handle of the endpoint owned by `owner`
    pub fn endpoint_handle(&self, owner: &Uid) -> Option<EndpointHandle> {
        self.shared
            .registry
            .read()
            .owners
            .get(owner)
            .copied()
            .map(EndpointHandle)
    }

    /// Owner UID of an endpoint handle
    pub fn endpoint_owner(&self, handle: EndpointHandle) -> Option<Uid> {
        self.shared
            .registry
            .read()
            .slots
            .get(handle.0)
            .map(|slot| slot.owner)
    }

    /// Traffic counters
    pub fn stats(&self) -> BusStats {
        BusStats {
            endpoints: self.shared.registry.read().slots.len(),
            published: self.shared.published.load(Ordering::Relaxed),
            routed: self.shared.routed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.is_sealed() {
            return Err(BusError::concurrent_modification(operation));
        }
        Ok(())
    }
}

/// Mailbox of one component on the bus
#[derive(Debug)]
pub struct MessageEndpoint {
    owner: Uid,
    handle: EndpointHandle,
    slot: Arc<EndpointSlot>,
    bus: MessageBus,
}

impl MessageEndpoint {
    /// Owner UID
    pub fn uid(&self) -> Uid {
        self.owner
    }

    /// Arena handle
    pub fn handle(&self) -> EndpointHandle {
        self.handle
    }

    /// Bus this endpoint is registered on
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Subscribe this endpoint to `kind` messages from `senders`
    pub fn subscribe(&self, kind: MessageKind, senders: impl Into<SenderPattern>) -> Result<()> {
        self.bus.subscribe(self.owner, kind, senders)
    }

    /// Subscribe this endpoint to messages of type `M`
    pub fn subscribe_to<M: BusMessage>(&self, senders: impl Into<SenderPattern>) -> Result<()> {
        self.bus.subscribe(self.owner, M::KIND, senders)
    }

    /// Publish a message on the bus
    pub fn send(&self, message: impl Into<Message>) -> usize {
        self.bus.publish(message)
    }

    /// Take every routed message of type `M` out of the inbox
    pub fn unload_messages<M: BusMessage>(&self) -> Vec<M> {
        self.unload_where(|m| m.kind() == M::KIND)
            .into_iter()
            .filter_map(M::from_message)
            .collect()
    }

    /// Take routed messages of type `M` sent by `sender`
    pub fn unload_messages_from<M: BusMessage>(&self, sender: &Uid) -> Vec<M> {
        self.unload_where(|m| m.kind() == M::KIND && m.header().sender_uid == *sender)
            .into_iter()
            .filter_map(M::from_message)
            .collect()
    }

    /// Take every routed message out of the inbox
    pub fn unload_all(&self) -> Vec<Message> {
        std::mem::take(&mut *self.slot.inbox.lock())
    }

    /// Routed messages waiting in the inbox
    pub fn inbox_len(&self) -> usize {
        self.slot.inbox.lock().len()
    }

    /// Published messages waiting for the next `route_step`
    pub fn pending_len(&self) -> usize {
        self.slot.pending.lock().len()
    }

    fn unload_where(&self, pred: impl Fn(&Message) -> bool) -> Vec<Message> {
        let mut inbox = self.slot.inbox.lock();
        let (taken, kept): (Vec<Message>, Vec<Message>) =
            std::mem::take(&mut *inbox).into_iter().partition(|m| pred(m));
        *inbox = kept;
        taken
    }
}
