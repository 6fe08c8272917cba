//! Ordered key-value lists for stream tags and custom payloads.
//!
//! A [`TagList`] carries stream metadata in a Tags event, and doubles as the
//! payload of custom events and application bus messages.

use std::time::Duration;

/// Value stored in a [`TagList`].
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// String value.
    String(String),
    /// Unsigned integer (durations in nanoseconds, bitrates, counts).
    UInt(u64),
    /// Signed integer.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// Boolean value.
    Bool(bool),
    /// Opaque bytes.
    Binary(Vec<u8>),
}

impl TagValue {
    /// Get as string if this is a String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as u64 if this is a UInt value.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            TagValue::UInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as bool if this is a Bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::String(s.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::String(s)
    }
}

impl From<u64> for TagValue {
    fn from(n: u64) -> Self {
        TagValue::UInt(n)
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        TagValue::Int(n)
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Double(n)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(b: Vec<u8>) -> Self {
        TagValue::Binary(b)
    }
}

/// How [`TagList::merge`] combines two lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMergeMode {
    /// Drop existing entries and take the new list.
    Replace,
    /// Add new entries; new values win on a shared key.
    #[default]
    Append,
    /// Add new entries; existing values win on a shared key.
    Keep,
}

/// Ordered list of named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagList {
    entries: Vec<(String, TagValue)>,
}

/// Tag holding the stream title.
pub const TAG_TITLE: &str = "title";
/// Tag holding the stream duration in nanoseconds.
pub const TAG_DURATION: &str = "duration";

impl TagList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a value, replacing any previous value for `key` in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(TagValue::as_str)
    }

    /// Get an unsigned value.
    pub fn get_uint(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(TagValue::as_uint)
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into this list.
    pub fn merge(&mut self, other: &TagList, mode: TagMergeMode) {
        match mode {
            TagMergeMode::Replace => self.entries = other.entries.clone(),
            TagMergeMode::Append => {
                for (k, v) in &other.entries {
                    self.set(k.clone(), v.clone());
                }
            }
            TagMergeMode::Keep => {
                for (k, v) in &other.entries {
                    if self.get(k).is_none() {
                        self.entries.push((k.clone(), v.clone()));
                    }
                }
            }
        }
    }

    /// Stream title.
    pub fn title(&self) -> Option<&str> {
        self.get_str(TAG_TITLE)
    }

    /// Stream duration.
    pub fn duration(&self) -> Option<Duration> {
        self.get_uint(TAG_DURATION).map(Duration::from_nanos)
    }

    /// Set the stream duration.
    pub fn set_duration(&mut self, duration: Duration) {
        self.set(TAG_DURATION, duration.as_nanos() as u64);
    }
}
