//! Unique identifiers for populations, projections and endpoints

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::BusError;

/// 128-bit unique identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Uid(Uuid);

impl Uid {
    /// Generate a new random UID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil UID (all bits zero). Generators never produce it.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Wrap an existing UUID
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Build a UID from its raw 128-bit value
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Raw 128-bit value
    pub const fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// Underlying UUID
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Check for the nil UID
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uid {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BusError::invalid_uid(s, e.to_string()))
    }
}

impl From<Uuid> for Uid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Stable 64-bit hash of a UID.
///
/// Unlike `std::hash::Hash` with a randomized hasher, the result is identical
/// across runs and processes.
pub fn uid_hash(uid: &Uid) -> u64 {
    let (hi, lo) = uid.0.as_u64_pair();
    let mut x = hi ^ lo.rotate_left(32);
    // splitmix64 finalizer
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// UID generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UidStrategy {
    /// Random UUID v4
    #[default]
    Random,
    /// Time-ordered UUID v7
    TimeOrdered,
    /// Counter-based, strictly increasing within one generator
    Continuous,
}

/// Source of fresh UIDs.
///
/// Collisions are only as unlikely as the chosen strategy makes them; they are
/// never detected here.
pub trait UidGenerator: Send + Sync {
    /// Produce a new UID
    fn generate(&self) -> Uid;
}

/// Generator backed by random UUID v4 values
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUidGenerator;

impl UidGenerator for RandomUidGenerator {
    fn generate(&self) -> Uid {
        Uid(Uuid::new_v4())
    }
}

/// Generator backed by time-ordered UUID v7 values
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeOrderedUidGenerator;

impl UidGenerator for TimeOrderedUidGenerator {
    fn generate(&self) -> Uid {
        Uid(Uuid::now_v7())
    }
}

/// Counter-based generator.
///
/// The high 64 bits are a prefix fixed at construction, the low 64 bits a
/// counter starting at 1, so successive UIDs compare strictly greater.
#[derive(Debug)]
pub struct ContinuousUidGenerator {
    prefix: u64,
    counter: AtomicU64,
}

impl ContinuousUidGenerator {
    /// Create a generator with a random prefix
    pub fn new() -> Self {
        let (prefix, _) = Uuid::new_v4().as_u64_pair();
        Self::with_prefix(prefix)
    }

    /// Create a generator with a fixed prefix, for reproducible UIDs
    pub fn with_prefix(prefix: u64) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(1),
        }
    }

    /// Number of UIDs produced so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed) - 1
    }
}

impl Default for ContinuousUidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UidGenerator for ContinuousUidGenerator {
    fn generate(&self) -> Uid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Uid(Uuid::from_u64_pair(self.prefix, n))
    }
}

/// Build a boxed generator for the given strategy
pub fn generator_for(strategy: UidStrategy) -> Box<dyn UidGenerator> {
    match strategy {
        UidStrategy::Random => Box::new(RandomUidGenerator),
        UidStrategy::TimeOrdered => Box::new(TimeOrderedUidGenerator),
        UidStrategy::Continuous => Box::new(ContinuousUidGenerator::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nil_uid() {
        assert!(Uid::nil().is_nil());
        assert!(!Uid::new().is_nil());
        assert_eq!(Uid::nil().as_u128(), 0);
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let uid = Uid::new();
        let parsed: Uid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);

        let bad = "not-a-uid".parse::<Uid>();
        assert!(matches!(bad, Err(BusError::InvalidUid { .. })));
    }

    #[test]
    fn test_continuous_generator_is_monotonic() {
        let gen = ContinuousUidGenerator::with_prefix(7);
        let a = gen.generate();
        let b = gen.generate();
        let c = gen.generate();
        assert!(a < b && b < c);
        assert_eq!(gen.issued(), 3);
        assert_eq!(a.as_u128(), (7u128 << 64) | 1);
    }

    #[test]
    fn test_generators_produce_distinct_uids() {
        for strategy in [UidStrategy::Random, UidStrategy::TimeOrdered, UidStrategy::Continuous] {
            let gen = generator_for(strategy);
            let uids: HashSet<Uid> = (0..256).map(|_| gen.generate()).collect();
            assert_eq!(uids.len(), 256, "{:?}", strategy);
        }
    }

    #[test]
    fn test_uid_hash_is_deterministic() {
        let uid = Uid::from_u128(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210);
        assert_eq!(uid_hash(&uid), uid_hash(&uid));
        assert_ne!(uid_hash(&uid), uid_hash(&Uid::from_u128(1)));
    }
}
