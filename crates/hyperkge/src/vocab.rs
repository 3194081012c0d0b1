//! Adjacency vocabularies over index-space triples.
//!
//! | Map | Key | Values | Used for |
//! |-----|-----|--------|----------|
//! | [`ErVocab`] | (head, relation) | tails | K-vs-all targets, filtered ranking |
//! | [`ReVocab`] | (relation, tail) | heads | head-side filtering |
//! | [`HeadTailVocab`] | (head, tail) | relations | relation-level inspection |
//!
//! Each map is built once by a fold and is read-only afterwards. Keys keep
//! first-seen order and values keep insertion order; duplicates are kept, so
//! a value list is a multiset. Consumers only test membership.

use std::collections::HashMap;

use crate::index::IndexedTriple;

/// Insertion-ordered multimap from a pair key to entity/relation indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairVocab {
    keys: Vec<(usize, usize)>,
    values: HashMap<(usize, usize), Vec<usize>>,
}

impl PairVocab {
    fn from_entries(entries: impl IntoIterator<Item = ((usize, usize), usize)>) -> Self {
        entries
            .into_iter()
            .fold(Self::default(), |mut vocab, (key, value)| {
                vocab
                    .values
                    .entry(key)
                    .or_insert_with(|| {
                        vocab.keys.push(key);
                        Vec::new()
                    })
                    .push(value);
                vocab
            })
    }

    /// Values for `key`; empty when the key was never seen.
    pub fn get(&self, key: (usize, usize)) -> &[usize] {
        self.values.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: (usize, usize)) -> bool {
        self.values.contains_key(&key)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> &[(usize, usize)] {
        &self.keys
    }

    /// `(key, values)` in first-seen key order.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &[usize])> {
        self.keys.iter().map(move |&k| (k, self.get(k)))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `(head, relation) -> [tail]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErVocab(PairVocab);

impl ErVocab {
    pub fn build<'a>(triples: impl IntoIterator<Item = &'a IndexedTriple>) -> Self {
        Self(PairVocab::from_entries(
            triples.into_iter().map(|t| ((t.head, t.relation), t.tail)),
        ))
    }

    pub fn tails(&self, head: usize, relation: usize) -> &[usize] {
        self.0.get((head, relation))
    }
}

impl std::ops::Deref for ErVocab {
    type Target = PairVocab;

    fn deref(&self) -> &PairVocab {
        &self.0
    }
}

/// `(relation, tail) -> [head]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReVocab(PairVocab);

impl ReVocab {
    pub fn build<'a>(triples: impl IntoIterator<Item = &'a IndexedTriple>) -> Self {
        Self(PairVocab::from_entries(
            triples.into_iter().map(|t| ((t.relation, t.tail), t.head)),
        ))
    }

    pub fn heads(&self, relation: usize, tail: usize) -> &[usize] {
        self.0.get((relation, tail))
    }
}

impl std::ops::Deref for ReVocab {
    type Target = PairVocab;

    fn deref(&self) -> &PairVocab {
        &self.0
    }
}

/// `(head, tail) -> [relation]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadTailVocab(PairVocab);

impl HeadTailVocab {
    pub fn build<'a>(triples: impl IntoIterator<Item = &'a IndexedTriple>) -> Self {
        Self(PairVocab::from_entries(
            triples.into_iter().map(|t| ((t.head, t.tail), t.relation)),
        ))
    }

    pub fn relations(&self, head: usize, tail: usize) -> &[usize] {
        self.0.get((head, tail))
    }
}

impl std::ops::Deref for HeadTailVocab {
    type Target = PairVocab;

    fn deref(&self) -> &PairVocab {
        &self.0
    }
}
