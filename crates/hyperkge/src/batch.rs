//! K-vs-all multi-label examples.
//!
//! One example per distinct `(head, relation)` key of an [`ErVocab`]: the
//! label vector has one slot per entity, `positive` at every known tail and
//! `negative` elsewhere. The example count is therefore the number of keys,
//! not the number of triples.
//!
//! The loader never shuffles. Iteration order is the vocab's key order and
//! the training loop owns the shuffling policy.

use candle_core::{Device, Tensor};
use rayon::prelude::*;

use crate::error::Result;
use crate::vocab::ErVocab;

/// Label values for known and unknown tails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelValues {
    pub positive: f32,
    pub negative: f32,
}

impl Default for LabelValues {
    fn default() -> Self {
        Self {
            positive: 1.0,
            negative: 0.0,
        }
    }
}

/// A single training example.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub head: usize,
    pub relation: usize,
    pub targets: Vec<f32>,
}

/// A collated minibatch; `targets` is row-major `[len, num_entities]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub heads: Vec<usize>,
    pub relations: Vec<usize>,
    pub targets: Vec<f32>,
    pub num_entities: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Row `i` of the target matrix.
    pub fn target_row(&self, i: usize) -> &[f32] {
        &self.targets[i * self.num_entities..(i + 1) * self.num_entities]
    }

    /// `(heads, relations, targets)` as `u32`, `u32` and `f32` tensors.
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
        let n = self.len();
        let heads = index_tensor(&self.heads, device)?;
        let relations = index_tensor(&self.relations, device)?;
        let targets = Tensor::from_slice(&self.targets, (n, self.num_entities), device)?;
        Ok((heads, relations, targets))
    }
}

/// Build a `u32` index tensor.
pub fn index_tensor(idxs: &[usize], device: &Device) -> Result<Tensor> {
    let idxs: Vec<u32> = idxs.iter().map(|&i| i as u32).collect();
    let n = idxs.len();
    Ok(Tensor::from_vec(idxs, (n,), device)?)
}

/// Indexable K-vs-all dataset over the keys of an [`ErVocab`].
#[derive(Debug, Clone)]
pub struct HeadRelationBatchLoader {
    head_idx: Vec<usize>,
    rel_idx: Vec<usize>,
    tail_idx: Vec<Vec<usize>>,
    num_entities: usize,
    labels: LabelValues,
}

impl HeadRelationBatchLoader {
    pub fn new(er_vocab: &ErVocab, num_entities: usize) -> Self {
        Self::with_labels(er_vocab, num_entities, LabelValues::default())
    }

    pub fn with_labels(er_vocab: &ErVocab, num_entities: usize, labels: LabelValues) -> Self {
        let mut head_idx = Vec::with_capacity(er_vocab.len());
        let mut rel_idx = Vec::with_capacity(er_vocab.len());
        let mut tail_idx = Vec::with_capacity(er_vocab.len());
        for ((head, relation), tails) in er_vocab.iter() {
            head_idx.push(head);
            rel_idx.push(relation);
            tail_idx.push(tails.to_vec());
        }
        debug_assert!(head_idx.len() == rel_idx.len() && rel_idx.len() == tail_idx.len());

        Self {
            head_idx,
            rel_idx,
            tail_idx,
            num_entities,
            labels,
        }
    }

    /// Number of distinct `(head, relation)` keys.
    pub fn len(&self) -> usize {
        self.tail_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tail_idx.is_empty()
    }

    pub fn num_entities(&self) -> usize {
        self.num_entities
    }

    /// Example `idx`, or `None` past the end.
    pub fn get(&self, idx: usize) -> Option<Example> {
        let tails = self.tail_idx.get(idx)?;
        let mut targets = vec![self.labels.negative; self.num_entities];
        fill_row(&mut targets, tails, self.labels.positive);
        Some(Example {
            head: self.head_idx[idx],
            relation: self.rel_idx[idx],
            targets,
        })
    }

    /// Collate the examples at `idxs`; label rows are filled in parallel.
    ///
    /// Panics if any index is out of range.
    pub fn collate(&self, idxs: &[usize]) -> Batch {
        let heads = idxs.iter().map(|&i| self.head_idx[i]).collect();
        let relations = idxs.iter().map(|&i| self.rel_idx[i]).collect();

        let mut targets = vec![self.labels.negative; idxs.len() * self.num_entities];
        if self.num_entities > 0 {
            targets
                .par_chunks_mut(self.num_entities)
                .zip(idxs.par_iter())
                .for_each(|(row, &i)| fill_row(row, &self.tail_idx[i], self.labels.positive));
        }

        Batch {
            heads,
            relations,
            targets,
            num_entities: self.num_entities,
        }
    }
}

fn fill_row(row: &mut [f32], positions: &[usize], value: f32) {
    for &p in positions {
        row[p] = value;
    }
}
