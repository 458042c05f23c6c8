//! Weighted relation tables between collections.
//!
//! A [`RelationTable`] stores edges from an index in one collection to
//! weighted indices in a target collection. The target kind is carried in
//! the type parameter, so a digit-to-MC-particle table cannot be mixed up
//! with a digit-to-true-hit table. Lookup and weight accumulation work the
//! same way for every target kind.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of collection a relation points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Generated Monte-Carlo particles.
    McParticle,
    /// Simulated true hits.
    TrueHit,
    /// Strip digits.
    Digit,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::McParticle => "mcparticle",
            RelationKind::TrueHit => "truehit",
            RelationKind::Digit => "digit",
        })
    }
}

/// Marker trait for relation targets.
pub trait RelationTarget {
    /// Kind tag of the target collection.
    const KIND: RelationKind;
}

/// Relation target markers.
pub mod target {
    use super::{RelationKind, RelationTarget};

    /// Monte-Carlo particle collection.
    #[derive(Debug, Clone, Copy)]
    pub struct McParticle;

    /// True-hit collection.
    #[derive(Debug, Clone, Copy)]
    pub struct TrueHit;

    /// Strip digit collection.
    #[derive(Debug, Clone, Copy)]
    pub struct Digit;

    impl RelationTarget for McParticle {
        const KIND: RelationKind = RelationKind::McParticle;
    }

    impl RelationTarget for TrueHit {
        const KIND: RelationKind = RelationKind::TrueHit;
    }

    impl RelationTarget for Digit {
        const KIND: RelationKind = RelationKind::Digit;
    }
}

/// All edges leaving one source index.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelationElement {
    /// Source index.
    pub from: usize,
    /// Target indices.
    pub to: Vec<usize>,
    /// Edge weights, parallel to `to`.
    pub weights: Vec<f64>,
}

impl RelationElement {
    /// Creates an element from parallel target and weight lists.
    #[must_use]
    pub fn new(from: usize, to: Vec<usize>, weights: Vec<f64>) -> Self {
        Self { from, to, weights }
    }

    /// Iterates over `(target, weight)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.to.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Relation table from a source collection to targets of kind `T`.
#[derive(Debug, Clone)]
pub struct RelationTable<T> {
    elements: Vec<RelationElement>,
    _target: PhantomData<fn() -> T>,
}

impl<T> Default for RelationTable<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            _target: PhantomData,
        }
    }
}

impl<T: RelationTarget> RelationTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing elements.
    #[must_use]
    pub fn from_elements(elements: Vec<RelationElement>) -> Self {
        Self {
            elements,
            _target: PhantomData,
        }
    }

    /// Kind of the target collection.
    #[must_use]
    pub fn kind(&self) -> RelationKind {
        T::KIND
    }

    /// Appends an element.
    pub fn push(&mut self, element: RelationElement) {
        self.elements.push(element);
    }

    /// Appends one element built from `(target, weight)` pairs.
    pub fn add<I>(&mut self, from: usize, edges: I)
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let (to, weights) = edges.into_iter().unzip();
        self.elements.push(RelationElement { from, to, weights });
    }

    /// Stored elements.
    #[must_use]
    pub fn elements(&self) -> &[RelationElement] {
        &self.elements
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Clears all elements.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Iterates over all `(from, to, weight)` edges.
    pub fn iter_edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.elements
            .iter()
            .flat_map(|e| e.edges().map(move |(to, w)| (e.from, to, w)))
    }

    /// Builds an index from source position to element.
    ///
    /// Sources at or beyond `source_count` are dropped with a warning. If
    /// several elements share a source, the last one wins.
    #[must_use]
    pub fn build_lookup(&self, source_count: usize) -> RelationLookup<'_, T> {
        let mut entries = vec![None; source_count];
        for element in &self.elements {
            match entries.get_mut(element.from) {
                Some(slot) => *slot = Some(element),
                None => log::warn!(
                    "{} relation from index {} outside source collection of {}",
                    T::KIND,
                    element.from,
                    source_count
                ),
            }
        }
        RelationLookup {
            entries,
            _target: PhantomData,
        }
    }
}

/// O(1) index from a source position to its relation element.
#[derive(Debug)]
pub struct RelationLookup<'a, T> {
    entries: Vec<Option<&'a RelationElement>>,
    _target: PhantomData<fn() -> T>,
}

impl<'a, T: RelationTarget> RelationLookup<'a, T> {
    /// Element for a source index, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a RelationElement> {
        self.entries.get(index).copied().flatten()
    }

    /// Sums the weights of all edges leaving `index` per target.
    ///
    /// Negative weights mark deliberately ignored targets and are skipped.
    #[must_use]
    pub fn accumulate(&self, index: usize) -> BTreeMap<usize, f64> {
        let mut sums = BTreeMap::new();
        self.accumulate_into(index, &mut sums);
        sums
    }

    /// Like [`RelationLookup::accumulate`], adding into an existing map.
    pub fn accumulate_into(&self, index: usize, sums: &mut BTreeMap<usize, f64>) {
        let Some(element) = self.get(index) else {
            return;
        };
        for (target, weight) in element.edges() {
            if weight < 0.0 {
                continue;
            }
            *sums.entry(target).or_insert(0.0) += weight;
        }
    }

    /// Number of source slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no source slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::target::{McParticle, TrueHit};
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lookup_and_accumulate() {
        let mut table = RelationTable::<McParticle>::new();
        table.add(0, [(4, 1.0), (4, 2.5), (7, 0.5)]);
        table.add(2, [(7, 3.0)]);

        let lookup = table.build_lookup(3);
        assert!(lookup.get(1).is_none());

        let sums = lookup.accumulate(0);
        assert_eq!(sums.len(), 2);
        assert_relative_eq!(sums[&4], 3.5);
        assert_relative_eq!(sums[&7], 0.5);
    }

    #[test]
    fn test_negative_weights_are_ignored() {
        let mut table = RelationTable::<McParticle>::new();
        table.add(0, [(1, -1.0), (2, 4.0)]);

        let lookup = table.build_lookup(1);
        let sums = lookup.accumulate(0);
        assert!(!sums.contains_key(&1));
        assert_relative_eq!(sums[&2], 4.0);
    }

    #[test]
    fn test_accumulate_into_sums_over_sources() {
        let mut table = RelationTable::<TrueHit>::new();
        table.add(0, [(9, 1.0)]);
        table.add(1, [(9, 2.0), (3, 1.0)]);

        let lookup = table.build_lookup(2);
        let mut sums = BTreeMap::new();
        lookup.accumulate_into(0, &mut sums);
        lookup.accumulate_into(1, &mut sums);
        assert_relative_eq!(sums[&9], 3.0);
        assert_relative_eq!(sums[&3], 1.0);
        assert_eq!(table.kind(), RelationKind::TrueHit);
    }

    #[test]
    fn test_out_of_range_source_is_dropped() {
        let mut table = RelationTable::<McParticle>::new();
        table.add(5, [(1, 1.0)]);
        let lookup = table.build_lookup(2);
        assert_eq!(lookup.len(), 2);
        assert!(lookup.accumulate(5).is_empty());
    }

    #[test]
    fn test_iter_edges() {
        let mut table = RelationTable::<McParticle>::new();
        table.add(0, [(1, 1.0), (2, 2.0)]);
        table.add(3, [(4, 0.5)]);
        let edges: Vec<_> = table.iter_edges().collect();
        assert_eq!(edges, vec![(0, 1, 1.0), (0, 2, 2.0), (3, 4, 0.5)]);
    }
}
