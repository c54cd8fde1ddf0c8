//! Versioned Store
//!
//! Holds every event seen so far, grouped by version, and tracks which
//! versions are implied by a higher one but have not arrived yet.

use crate::replication::types::Event;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Append-only event store keyed by version.
///
/// A version maps to a *set* of events: peers mint versions from their own
/// counters, so different events may legitimately share a version.
#[derive(Debug, Clone, Default)]
pub struct VersionedStore {
    highest_version: u64,
    by_version: BTreeMap<u64, HashSet<Event>>,
    missing: BTreeSet<u64>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event.
    ///
    /// Returns `false` if a structurally identical event was already stored,
    /// in which case the store is left unchanged.
    pub fn save(&mut self, event: Event) -> bool {
        let version = event.version;

        if self
            .by_version
            .get(&version)
            .is_some_and(|events| events.contains(&event))
        {
            return false;
        }

        self.highest_version = self.highest_version.max(version);
        self.missing.remove(&version);

        let last_key = self.by_version.keys().next_back().copied().unwrap_or(0);
        if version > last_key.saturating_add(1) {
            self.missing.extend(last_key + 1..version);
        }

        self.by_version.entry(version).or_default().insert(event)
    }

    /// Version an originator should stamp on its next event.
    pub fn next_version(&self) -> u64 {
        self.highest_version.saturating_add(1)
    }

    /// Number of versions `save` would newly mark missing for `version`.
    pub fn gap_before(&self, version: u64) -> u64 {
        let last_key = self.by_version.keys().next_back().copied().unwrap_or(0);
        version.saturating_sub(last_key.saturating_add(1))
    }

    /// Raise the highest observed version without storing anything.
    pub fn observe_version(&mut self, version: u64) {
        self.highest_version = self.highest_version.max(version);
    }

    pub fn highest_version(&self) -> u64 {
        self.highest_version
    }

    /// Versions known to exist but not stored yet, ascending.
    pub fn missing_versions(&self) -> Vec<u64> {
        self.missing.iter().copied().collect()
    }

    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn contains_version(&self, version: u64) -> bool {
        self.by_version.contains_key(&version)
    }

    /// Stored versions, ascending.
    pub fn versions(&self) -> Vec<u64> {
        self.by_version.keys().copied().collect()
    }

    /// Every event stored at `version`.
    pub fn events_at(&self, version: u64) -> Vec<Event> {
        self.by_version
            .get(&version)
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every stored event in ascending version order.
    pub fn events(&self) -> Vec<Event> {
        self.by_version.values().flatten().cloned().collect()
    }

    /// Total number of stored events.
    pub fn len(&self) -> usize {
        self.by_version.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }
}
