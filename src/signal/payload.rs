//! Ordered string payloads and their `key:value` wire form.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Separator between key and value in a flattened entry.
pub const ENTRY_SEPARATOR: char = ':';

/// Ordered map of payload parameters.
///
/// Keys are unique. Insertion order is preserved and becomes the order of
/// the flattened wire entries. A `:` in a key is stored as `_`, so `a:b` and
/// `a_b` name the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    entries: Vec<(String, String)>,
}

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builder-style insert that overwrites an existing key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite `key`. An overwritten key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = escape_key(key.into());
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert `key` only if it is not present yet. Returns whether it was added.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = escape_key(key.into());
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    /// Add every entry of `other` whose key is not present yet.
    pub fn extend_missing(&mut self, other: Payload) {
        for (key, value) in other.entries {
            self.insert_if_absent(key, value);
        }
    }

    /// Overlay `other` on top of this payload; `other` wins on collisions.
    pub fn merge(mut self, other: Payload) -> Self {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
        self
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = lookup_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        let key = lookup_key(key);
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = lookup_key(key);
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Split into (entries matching `pred`, the rest), both keeping order.
    pub fn partition(self, mut pred: impl FnMut(&str) -> bool) -> (Payload, Payload) {
        let (matching, rest): (Vec<_>, Vec<_>) =
            self.entries.into_iter().partition(|(k, _)| pred(k.as_str()));
        (Payload { entries: matching }, Payload { entries: rest })
    }

    /// Rewrite every key with `f`. Later duplicates produced by the rewrite
    /// are dropped so keys stay unique.
    pub fn map_keys(self, mut f: impl FnMut(String) -> String) -> Self {
        let mut out = Payload::new();
        for (key, value) in self.entries {
            out.insert_if_absent(f(key), value);
        }
        out
    }

    /// Flatten into `key:value` strings.
    ///
    /// Keys never contain `:`, so the first separator in each entry always
    /// splits key from value.
    pub fn flatten(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}{ENTRY_SEPARATOR}{v}", lookup_key(k)))
            .collect()
    }

    /// Rebuild a payload from flattened entries. Malformed entries are skipped.
    pub fn from_flattened<S: AsRef<str>>(entries: &[S]) -> Self {
        entries
            .iter()
            .filter_map(|e| parse_entry(e.as_ref()))
            .collect()
    }
}

fn escape_key(key: String) -> String {
    if key.contains(ENTRY_SEPARATOR) {
        key.replace(ENTRY_SEPARATOR, "_")
    } else {
        key
    }
}

fn lookup_key(key: &str) -> Cow<'_, str> {
    if key.contains(ENTRY_SEPARATOR) {
        Cow::Owned(key.replace(ENTRY_SEPARATOR, "_"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Split a flattened entry into key and value at the first `:`.
pub fn parse_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once(ENTRY_SEPARATOR)
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

impl From<BTreeMap<String, String>> for Payload {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HashMap<String, String>> for Payload {
    /// Keys are sorted since a `HashMap` has no meaningful order.
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

impl IntoIterator for Payload {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
