//! Bookkeeping metadata attached to entities

use std::collections::BTreeMap;

use crate::uid::Uid;

/// A single metadata value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Free text
    Text(String),
    /// Reference to another entity
    Uid(Uid),
}

macro_rules! tag_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for TagValue {
                fn from(v: $ty) -> Self {
                    TagValue::$variant(v.into())
                }
            }
        )*
    };
}

tag_value_from! {
    bool => Bool,
    i32 => Integer,
    i64 => Integer,
    u32 => Integer,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Uid => Uid,
}

impl TagValue {
    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric content, integers widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Float(f) => Some(*f),
            TagValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// UID content
    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            TagValue::Uid(u) => Some(*u),
            _ => None,
        }
    }
}

/// String-keyed metadata map. Not read by the simulation itself.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagMap {
    tags: BTreeMap<String, TagValue>,
}

impl TagMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tag, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Option<TagValue> {
        self.tags.insert(key.into(), value.into())
    }

    /// Builder-style `set`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a tag
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Remove a tag
    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.tags.remove(key)
    }

    /// Check presence of a tag
    pub fn contains(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True if no tags are set
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Identity and metadata shared by populations and projections
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseData {
    /// Entity UID
    pub uid: Uid,
    /// Entity tags
    pub tags: TagMap,
}

impl BaseData {
    /// Base data with a fresh random UID
    pub fn new() -> Self {
        Self::with_uid(Uid::new())
    }

    /// Base data with a given UID
    pub fn with_uid(uid: Uid) -> Self {
        Self {
            uid,
            tags: TagMap::new(),
        }
    }
}

impl Default for BaseData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut tags = TagMap::new();
        assert!(tags.is_empty());
        assert_eq!(tags.set("name", "input"), None);
        assert_eq!(tags.set("name", "hidden"), Some(TagValue::from("input")));
        tags.set("layer", 2);
        tags.set("learning", true);

        assert_eq!(tags.get("name").and_then(TagValue::as_str), Some("hidden"));
        assert_eq!(tags.get("layer").and_then(TagValue::as_i64), Some(2));
        assert_eq!(tags.get("layer").and_then(TagValue::as_f64), Some(2.0));
        assert_eq!(tags.get("learning").and_then(TagValue::as_bool), Some(true));
        assert_eq!(tags.len(), 3);

        assert!(tags.remove("layer").is_some());
        assert!(!tags.contains("layer"));
    }

    #[test]
    fn test_iteration_is_ordered() {
        let owner = Uid::new();
        let tags = TagMap::new().with("b", 1.5).with("a", owner);
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(tags.get("a").and_then(TagValue::as_uid), Some(owner));
    }
}
