//! Entity and relation index assignment.
//!
//! Indices are positions in the vocabulary slices handed to
//! [`IndexMapper::new`]. Only the vocabulary *sizes* are persisted with a
//! trained model, so evaluation must rebuild the mapper from the same
//! dataset files through the same [`Dataset`](crate::dataset::Dataset)
//! construction; otherwise index meanings drift silently.

use std::collections::HashMap;

use crate::dataset::Triple;
use crate::error::{Error, Result};

/// A triple in index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexedTriple {
    pub head: usize,
    pub relation: usize,
    pub tail: usize,
}

impl IndexedTriple {
    pub fn new(head: usize, relation: usize, tail: usize) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }
}

/// Bidirectional name <-> index maps for entities and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapper {
    entities: Vec<String>,
    relations: Vec<String>,
    entity_idxs: HashMap<String, usize>,
    relation_idxs: HashMap<String, usize>,
}

impl IndexMapper {
    /// Assign index `i` to the `i`-th entity and relation.
    pub fn new(entities: &[String], relations: &[String]) -> Self {
        Self {
            entities: entities.to_vec(),
            relations: relations.to_vec(),
            entity_idxs: positions(entities),
            relation_idxs: positions(relations),
        }
    }

    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn entity_index(&self, entity: &str) -> Result<usize> {
        self.entity_idxs
            .get(entity)
            .copied()
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    pub fn relation_index(&self, relation: &str) -> Result<usize> {
        self.relation_idxs
            .get(relation)
            .copied()
            .ok_or_else(|| Error::UnknownRelation(relation.to_string()))
    }

    pub fn entity_name(&self, idx: usize) -> Option<&str> {
        self.entities.get(idx).map(String::as_str)
    }

    pub fn relation_name(&self, idx: usize) -> Option<&str> {
        self.relations.get(idx).map(String::as_str)
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn index_triple(&self, triple: &Triple) -> Result<IndexedTriple> {
        Ok(IndexedTriple {
            head: self.entity_index(&triple.head)?,
            relation: self.relation_index(&triple.relation)?,
            tail: self.entity_index(&triple.tail)?,
        })
    }

    /// Map every triple into index space, failing on the first unknown name.
    pub fn index_triples<'a>(
        &self,
        triples: impl IntoIterator<Item = &'a Triple>,
    ) -> Result<Vec<IndexedTriple>> {
        triples
            .into_iter()
            .map(|t| self.index_triple(t))
            .collect()
    }
}

fn positions(names: &[String]) -> HashMap<String, usize> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
