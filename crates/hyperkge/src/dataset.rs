//! Triple store: split loading, reciprocal augmentation, vocabularies.
//!
//! A dataset directory holds three whitespace-separated files:
//!
//! ```text
//! <dir>/train.txt
//! <dir>/valid.txt
//! <dir>/test.txt
//! ```
//!
//! each line being `head relation tail`.
//!
//! # Reciprocal relations
//!
//! With `reverse` enabled every split is doubled: for `(h, r, t)` the triple
//! `(t, r_reverse, h)` is appended. Head prediction for `r` then becomes tail
//! prediction for `r_reverse`, so a model only ever scores tails
//! (Lacroix et al. 2018, "Canonical Tensor Decomposition for Knowledge Base
//! Completion").
//!
//! With `tail_pred_constraint` enabled the test split is loaded without
//! reciprocals, so test MRR is computed over tail rankings only.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Suffix appended to a relation name to form its reciprocal.
pub const REVERSE_SUFFIX: &str = "_reverse";

/// A (head, relation, tail) fact with raw string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub head: String,
    pub relation: String,
    pub tail: String,
}

impl Triple {
    pub fn new(
        head: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
    ) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
        }
    }

    /// The reciprocal fact `(tail, relation_reverse, head)`.
    pub fn reciprocal(&self) -> Self {
        Self {
            head: self.tail.clone(),
            relation: reverse_relation(&self.relation),
            tail: self.head.clone(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.relation, self.tail)
    }
}

/// Name of the reciprocal of `relation`.
pub fn reverse_relation(relation: &str) -> String {
    format!("{relation}{REVERSE_SUFFIX}")
}

/// Whether `relation` names a reciprocal relation.
pub fn is_reverse_relation(relation: &str) -> bool {
    relation.ends_with(REVERSE_SUFFIX)
}

/// Dataset split identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Train => "train.txt",
            Self::Valid => "valid.txt",
            Self::Test => "test.txt",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Valid => write!(f, "valid"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Loading options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Add reciprocal relations to every split (default: true).
    pub reverse: bool,
    /// Keep the test split free of reciprocals (default: false).
    pub tail_pred_constraint: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            reverse: true,
            tail_pred_constraint: false,
        }
    }
}

impl DatasetOptions {
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn with_tail_pred_constraint(mut self, constraint: bool) -> Self {
        self.tail_pred_constraint = constraint;
        self
    }

    /// Whether the test split receives reciprocal triples.
    pub fn reverse_test(&self) -> bool {
        self.reverse && !self.tail_pred_constraint
    }
}

/// Dataset provenance, persisted alongside the hyperparameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset: String,
    pub dataset_augmentation: bool,
    pub tail_pred_constraint: bool,
}

/// Summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub num_entities: usize,
    pub num_relations: usize,
    pub num_train: usize,
    pub num_valid: usize,
    pub num_test: usize,
}

/// Train/valid/test triples plus the derived vocabularies.
#[derive(Debug, Clone)]
pub struct Dataset {
    info: DatasetInfo,
    train: Vec<Triple>,
    valid: Vec<Triple>,
    test: Vec<Triple>,
    entities: Vec<String>,
    relations: Vec<String>,
}

impl Dataset {
    /// Load `train.txt`, `valid.txt` and `test.txt` from `dir`.
    pub fn load(dir: impl AsRef<Path>, options: DatasetOptions) -> Result<Self> {
        let dir = dir.as_ref();
        let train = load_split(dir, Split::Train, options.reverse)?;
        let valid = load_split(dir, Split::Valid, options.reverse)?;
        let test = load_split(dir, Split::Test, options.reverse_test())?;

        let mut dataset = Self::assemble(train, valid, test, options);
        dataset.info.dataset = dir.display().to_string();
        Ok(dataset)
    }

    /// Build from in-memory splits of original (non-augmented) triples.
    pub fn from_splits(
        train: Vec<Triple>,
        valid: Vec<Triple>,
        test: Vec<Triple>,
        options: DatasetOptions,
    ) -> Self {
        let train = maybe_augment(train, options.reverse);
        let valid = maybe_augment(valid, options.reverse);
        let test = maybe_augment(test, options.reverse_test());
        Self::assemble(train, valid, test, options)
    }

    fn assemble(
        train: Vec<Triple>,
        valid: Vec<Triple>,
        test: Vec<Triple>,
        options: DatasetOptions,
    ) -> Self {
        let entities = extract_entities(train.iter().chain(&valid).chain(&test));
        let relations = ordered_relations(&train, &valid, &test);

        Self {
            info: DatasetInfo {
                dataset: String::new(),
                dataset_augmentation: options.reverse,
                tail_pred_constraint: options.tail_pred_constraint,
            },
            train,
            valid,
            test,
            entities,
            relations,
        }
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn train(&self) -> &[Triple] {
        &self.train
    }

    pub fn valid(&self) -> &[Triple] {
        &self.valid
    }

    pub fn test(&self) -> &[Triple] {
        &self.test
    }

    pub fn split(&self, split: Split) -> &[Triple] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
            Split::Test => &self.test,
        }
    }

    /// Train, valid and test concatenated in that order.
    pub fn all_triples(&self) -> impl Iterator<Item = &Triple> {
        self.train.iter().chain(&self.valid).chain(&self.test)
    }

    /// Sorted entity vocabulary over all splits.
    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Relation vocabulary: train relations, then unseen valid and test ones.
    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            num_entities: self.entities.len(),
            num_relations: self.relations.len(),
            num_train: self.train.len(),
            num_valid: self.valid.len(),
            num_test: self.test.len(),
        }
    }
}

/// Read one split file, optionally appending reciprocal triples.
pub fn load_split(dir: &Path, split: Split, add_reciprocal: bool) -> Result<Vec<Triple>> {
    let path = dir.join(split.file_name());
    if !path.is_file() {
        return Err(Error::DataFileMissing {
            dir: dir.to_path_buf(),
            path,
        });
    }
    let content = fs::read_to_string(&path)?;
    let triples = parse_triples(&content, &path)?;
    Ok(maybe_augment(triples, add_reciprocal))
}

fn parse_triples(content: &str, path: &Path) -> Result<Vec<Triple>> {
    let mut triples = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(head) = fields.next() else {
            continue;
        };
        match (fields.next(), fields.next(), fields.next()) {
            (Some(relation), Some(tail), None) => {
                triples.push(Triple::new(head, relation, tail));
            }
            _ => {
                return Err(Error::MalformedLine {
                    path: PathBuf::from(path),
                    line: line_no + 1,
                })
            }
        }
    }
    Ok(triples)
}

fn maybe_augment(triples: Vec<Triple>, add_reciprocal: bool) -> Vec<Triple> {
    if add_reciprocal {
        augment_with_inverse(triples)
    } else {
        triples
    }
}

/// Append `(t, r_reverse, h)` for each `(h, r, t)`, originals first.
pub fn augment_with_inverse(mut triples: Vec<Triple>) -> Vec<Triple> {
    let inverses: Vec<Triple> = triples.iter().map(Triple::reciprocal).collect();
    triples.extend(inverses);
    triples
}

/// Sorted, deduplicated heads and tails.
pub fn extract_entities<'a>(triples: impl IntoIterator<Item = &'a Triple>) -> Vec<String> {
    let set: BTreeSet<&str> = triples
        .into_iter()
        .flat_map(|t| [t.head.as_str(), t.tail.as_str()])
        .collect();
    set.into_iter().map(str::to_string).collect()
}

/// Sorted, deduplicated relations.
pub fn extract_relations<'a>(triples: impl IntoIterator<Item = &'a Triple>) -> Vec<String> {
    let set: BTreeSet<&str> = triples.into_iter().map(|t| t.relation.as_str()).collect();
    set.into_iter().map(str::to_string).collect()
}

fn ordered_relations(train: &[Triple], valid: &[Triple], test: &[Triple]) -> Vec<String> {
    let mut relations = extract_relations(train);
    let mut seen: BTreeSet<String> = relations.iter().cloned().collect();
    for split in [valid, test] {
        for relation in extract_relations(split) {
            if seen.insert(relation.clone()) {
                relations.push(relation);
            }
        }
    }
    relations
}
