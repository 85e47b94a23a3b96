//! Reaction map: emoji → set of reactor peer ids.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reactions on one message
///
/// Serialized as `{"👍": ["peerA", "peerB"]}`. An emoji key exists only
/// while at least one reactor is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(BTreeMap<String, BTreeSet<String>>);

impl Reactions {
    /// Empty reaction map
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle `reactor`'s membership in `emoji`'s set.
    ///
    /// Returns `true` if the reaction was added, `false` if it was removed.
    pub fn toggle(&mut self, emoji: &str, reactor: &str) -> bool {
        let reactors = self.0.entry(emoji.to_string()).or_default();
        if reactors.remove(reactor) {
            if reactors.is_empty() {
                self.0.remove(emoji);
            }
            false
        } else {
            reactors.insert(reactor.to_string());
            true
        }
    }

    /// Reactors for an emoji, in sorted order
    pub fn reactors(&self, emoji: &str) -> Vec<&str> {
        self.0
            .get(emoji)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `reactor` reacted with `emoji`
    pub fn contains(&self, emoji: &str, reactor: &str) -> bool {
        self.0.get(emoji).is_some_and(|set| set.contains(reactor))
    }

    /// Number of distinct emoji
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No reactions at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(emoji, reactor count)` pairs
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(emoji, set)| (emoji.as_str(), set.len()))
    }

    /// Encode for the store
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored column, degrading corrupt data to an empty map
    pub fn from_json_lossy(json: &str) -> Self {
        serde_json::from_str::<Self>(json)
            .map(|mut reactions| {
                reactions.0.retain(|_, set| !set.is_empty());
                reactions
            })
            .unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable reactions column: {}", e);
                Self::default()
            })
    }
}
