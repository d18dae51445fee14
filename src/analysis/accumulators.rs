//! Dimensional accumulators.
//!
//! Counting and grouping structures fed one event at a time. Every update
//! is commutative, and every structure can absorb another of the same kind
//! so partial results from separate shards can be combined before
//! finalization.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Key → number of events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMap {
    counts: HashMap<String, usize>,
}

impl CountMap {
    pub fn increment(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_default() += 1;
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Adds every count of `other` into this map.
    pub fn merge(&mut self, other: CountMap) {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_default() += count;
        }
    }

    pub fn into_sorted(self) -> BTreeMap<String, usize> {
        self.counts.into_iter().collect()
    }
}

/// Key → distinct visitor tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorSets {
    sets: HashMap<String, HashSet<String>>,
}

impl VisitorSets {
    pub fn insert(&mut self, key: &str, visitor_token: &str) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(visitor_token.to_string());
    }

    #[cfg(test)]
    pub fn cardinality(&self, key: &str) -> usize {
        self.sets.get(key).map_or(0, HashSet::len)
    }

    /// Unions every set of `other` into this map.
    pub fn merge(&mut self, other: VisitorSets) {
        for (key, tokens) in other.sets {
            self.sets.entry(key).or_default().extend(tokens);
        }
    }

    /// Replaces each set by its size.
    pub fn cardinalities(&self) -> BTreeMap<String, usize> {
        self.sets
            .iter()
            .map(|(key, tokens)| (key.clone(), tokens.len()))
            .collect()
    }
}

/// Day → key → distinct visitor tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayPartitioned {
    days: HashMap<String, VisitorSets>,
}

impl DayPartitioned {
    pub fn insert(&mut self, day: &str, key: &str, visitor_token: &str) {
        self.days
            .entry(day.to_string())
            .or_default()
            .insert(key, visitor_token);
    }

    pub fn merge(&mut self, other: DayPartitioned) {
        for (day, sets) in other.days {
            self.days.entry(day).or_default().merge(sets);
        }
    }

    pub fn cardinalities(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.days
            .iter()
            .map(|(day, sets)| (day.clone(), sets.cardinalities()))
            .collect()
    }
}

/// Running state for one visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorState {
    /// Events seen for this visitor.
    pub actions: usize,
    /// Set once any event qualifies as non-bot evidence; never cleared.
    pub non_bot: bool,
    /// Guided-flow checkpoints in arrival order.
    pub checkpoints: Vec<String>,
}

impl VisitorState {
    pub fn merge(&mut self, other: VisitorState) {
        self.actions += other.actions;
        self.non_bot |= other.non_bot;
        self.checkpoints.extend(other.checkpoints);
    }

    pub fn is_multi_page(&self) -> bool {
        self.actions > 1
    }
}
