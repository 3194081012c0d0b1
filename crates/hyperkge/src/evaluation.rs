//! Filtered tail-ranking evaluation.
//!
//! For each test triple (h, r, t) every entity is scored as a tail. All
//! known completions of (h, r), taken from an [`ErVocab`] built over every
//! split, are masked to zero except `t` itself, which keeps its original
//! score. The rank of `t` is its 1-indexed position in a stable descending
//! sort of the filtered row.
//!
//! # Metrics
//!
//! | Metric | Range | Description |
//! |--------|-------|-------------|
//! | MRR | (0, 1] | mean of 1/rank |
//! | MR | [1, n] | mean rank |
//! | H@k | [0, 1] | fraction with rank <= k |
//!
//! # Per-relation MRR
//!
//! With reciprocal augmentation, head prediction for `r` is tail prediction
//! for `r_reverse`, so both rank lists describe the same test triples and
//! must have the same length. See [`per_relation_mrr`].
//!
//! # References
//!
//! - Bordes et al. (2013): filtered setting
//! - Lacroix et al. (2018): reciprocal relations for link prediction

use std::collections::BTreeMap;

use tracing::info;

use crate::batch::index_tensor;
use crate::dataset::{is_reverse_relation, reverse_relation};
use crate::error::{Error, Result};
use crate::index::IndexedTriple;
use crate::models::TailScorer;
use crate::vocab::ErVocab;

/// Largest `k` tracked for Hits@k.
pub const MAX_HITS: usize = 10;

/// Rank-based evaluation results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankMetrics {
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    pub hits_at_1: f64,
    pub hits_at_3: f64,
    pub hits_at_10: f64,
    /// Number of test triples evaluated
    pub num_triples: usize,
}

impl RankMetrics {
    /// Aggregate 1-indexed ranks and Hits@k counters.
    ///
    /// `hits[k]` counts triples whose 0-indexed rank is `<= k`.
    pub fn from_ranks_and_hits(ranks: &[usize], hits: &[usize; MAX_HITS]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }

        let n = ranks.len() as f64;
        Self {
            mrr: ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n,
            mr: ranks.iter().map(|&r| r as f64).sum::<f64>() / n,
            hits_at_1: hits[0] as f64 / n,
            hits_at_3: hits[2] as f64 / n,
            hits_at_10: hits[9] as f64 / n,
            num_triples: ranks.len(),
        }
    }

    /// Compute metrics from a list of ranks.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        let mut hits = [0; MAX_HITS];
        for &rank in ranks {
            record_hits(&mut hits, rank);
        }
        Self::from_ranks_and_hits(ranks, &hits)
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        format!(
            "MRR: {:.4} | MR: {:.1} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mrr, self.mr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.num_triples
        )
    }
}

fn record_hits(hits: &mut [usize; MAX_HITS], rank: usize) {
    let rank0 = rank.saturating_sub(1);
    for (k, hit) in hits.iter_mut().enumerate() {
        if rank0 <= k {
            *hit += 1;
        }
    }
}

/// Zero every known-true tail, then restore the target's own score.
pub fn filter_scores(row: &mut [f32], known: &[usize], target: usize) {
    let target_score = row[target];
    for &tail in known {
        row[tail] = 0.0;
    }
    row[target] = target_score;
}

/// 1-indexed position of `target` in a stable descending sort of `row`.
///
/// Equal scores keep index order, so a tie ranks `target` behind every
/// equal-scored entity with a smaller index.
pub fn rank_of(row: &[f32], target: usize) -> usize {
    let score = row[target];
    let ahead = row
        .iter()
        .enumerate()
        .filter(|&(i, s)| *s > score || (*s == score && i < target))
        .count();
    ahead + 1
}

/// How per-relation MRR treats reciprocal relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMode {
    /// Average `r` together with `r_reverse`.
    Reciprocal,
    /// Mean of `1/rank` over each relation's own list.
    TailOnly,
}

impl PairingMode {
    /// Reciprocal pairing applies only to augmented test data.
    pub fn for_dataset(augmented: bool, tail_pred_constraint: bool) -> Self {
        if augmented && !tail_pred_constraint {
            Self::Reciprocal
        } else {
            Self::TailOnly
        }
    }
}

/// MRR per base relation; keys ending in `_reverse` are skipped.
pub fn per_relation_mrr(
    ranks: &BTreeMap<String, Vec<usize>>,
    mode: PairingMode,
) -> Result<BTreeMap<String, f64>> {
    let mut out = BTreeMap::new();
    for (relation, forward) in ranks {
        if is_reverse_relation(relation) || forward.is_empty() {
            continue;
        }
        let mrr = match mode {
            PairingMode::TailOnly => reciprocal_sum(forward) / forward.len() as f64,
            PairingMode::Reciprocal => {
                let reverse = ranks
                    .get(&reverse_relation(relation))
                    .ok_or_else(|| Error::MissingReverseRelation(relation.clone()))?;
                if reverse.len() != forward.len() {
                    return Err(Error::VocabularyMismatch {
                        relation: relation.clone(),
                        forward: forward.len(),
                        reverse: reverse.len(),
                    });
                }
                (reciprocal_sum(forward) + reciprocal_sum(reverse)) / (2 * forward.len()) as f64
            }
        };
        out.insert(relation.clone(), mrr);
    }
    Ok(out)
}

fn reciprocal_sum(ranks: &[usize]) -> f64 {
    ranks.iter().map(|&r| 1.0 / r as f64).sum()
}

/// Output of one evaluation run.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub metrics: RankMetrics,
    /// 1-indexed ranks in input order.
    pub ranks: Vec<usize>,
    pub ranks_per_relation: BTreeMap<String, Vec<usize>>,
}

impl EvaluationReport {
    pub fn per_relation_mrr(&self, mode: PairingMode) -> Result<BTreeMap<String, f64>> {
        per_relation_mrr(&self.ranks_per_relation, mode)
    }
}

/// Filtered-ranking evaluator.
///
/// # Example
///
/// ```rust,ignore
/// use hyperkge::evaluation::Evaluator;
///
/// let all = ErVocab::build(&all_indexed);
/// let evaluator = Evaluator::new(&all, 1024);
/// let report = evaluator.evaluate(&model, &test, mapper.relations())?;
/// println!("{}", report.metrics.summary());
/// ```
pub struct Evaluator<'a> {
    er_vocab: &'a ErVocab,
    batch_size: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(er_vocab: &'a ErVocab, batch_size: usize) -> Self {
        Self {
            er_vocab,
            batch_size: batch_size.max(1),
        }
    }

    /// Rank the tail of every triple.
    ///
    /// `relation_names[i]` names relation index `i` in the per-relation
    /// accumulator.
    pub fn evaluate(
        &self,
        scorer: &dyn TailScorer,
        triples: &[IndexedTriple],
        relation_names: &[String],
    ) -> Result<EvaluationReport> {
        let mut hits = [0usize; MAX_HITS];
        let mut ranks = Vec::with_capacity(triples.len());
        let mut ranks_per_relation: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for chunk in triples.chunks(self.batch_size) {
            let heads: Vec<usize> = chunk.iter().map(|t| t.head).collect();
            let relations: Vec<usize> = chunk.iter().map(|t| t.relation).collect();
            let scores = scorer.forward_head_batch(
                &index_tensor(&heads, scorer.device())?,
                &index_tensor(&relations, scorer.device())?,
            )?;

            for (triple, mut row) in chunk.iter().zip(scores.to_vec2::<f32>()?) {
                filter_scores(&mut row, self.er_vocab.tails(triple.head, triple.relation), triple.tail);
                let rank = rank_of(&row, triple.tail);

                record_hits(&mut hits, rank);
                ranks.push(rank);
                let name = relation_names
                    .get(triple.relation)
                    .ok_or_else(|| Error::UnknownRelation(format!("index {}", triple.relation)))?;
                ranks_per_relation.entry(name.clone()).or_default().push(rank);
            }
        }

        let metrics = RankMetrics::from_ranks_and_hits(&ranks, &hits);
        info!(hits_at_10 = metrics.hits_at_10, "Hits @10");
        info!(hits_at_3 = metrics.hits_at_3, "Hits @3");
        info!(hits_at_1 = metrics.hits_at_1, "Hits @1");
        info!(mr = metrics.mr, "Mean rank");
        info!(mrr = metrics.mrr, "Mean reciprocal rank");

        Ok(EvaluationReport {
            metrics,
            ranks,
            ranks_per_relation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    /// Returns the same fixed score row for every query.
    struct FixedScorer {
        row: Vec<f32>,
        device: Device,
    }

    impl TailScorer for FixedScorer {
        fn forward_head_batch(&self, heads: &Tensor, _: &Tensor) -> Result<Tensor> {
            let n = heads.dim(0)?;
            let data: Vec<f32> = (0..n).flat_map(|_| self.row.iter().copied()).collect();
            Ok(Tensor::from_vec(data, (n, self.row.len()), &self.device)?)
        }

        fn device(&self) -> &Device {
            &self.device
        }
    }

    #[test]
    fn test_rank_metrics_from_ranks() {
        let m = RankMetrics::from_ranks(&[1, 2, 5, 20]);
        assert_eq!(m.num_triples, 4);
        assert!((m.mrr - (1.0 + 0.5 + 0.2 + 0.05) / 4.0).abs() < 1e-12);
        assert!((m.mr - 7.0).abs() < 1e-12);
        assert_eq!(m.hits_at_1, 0.25);
        assert_eq!(m.hits_at_3, 0.5);
        assert_eq!(m.hits_at_10, 0.75);
    }

    #[test]
    fn test_rank_metrics_empty() {
        assert_eq!(RankMetrics::from_ranks(&[]), RankMetrics::default());
    }

    #[test]
    fn test_filter_then_rank() {
        // (A, knows, B): scores over [A, B, C]
        let mut row = vec![0.9, 0.2, 0.5];
        filter_scores(&mut row, &[1], 1);
        assert_eq!(row, vec![0.9, 0.2, 0.5]);
        // sorted descending: A, C, B
        assert_eq!(rank_of(&row, 1), 3);
        assert_eq!(rank_of(&row, 2), 2);
    }

    #[test]
    fn test_filter_removes_other_known_tails() {
        let mut row = vec![0.9, 0.2, 0.5, 0.7];
        filter_scores(&mut row, &[0, 2, 1], 2);
        assert_eq!(row, vec![0.0, 0.0, 0.5, 0.7]);
        assert_eq!(rank_of(&row, 2), 2);
    }

    #[test]
    fn test_ties_keep_index_order() {
        let row = [0.5, 0.5, 0.5];
        assert_eq!(rank_of(&row, 0), 1);
        assert_eq!(rank_of(&row, 2), 3);
    }

    #[test]
    fn test_evaluate_end_to_end() {
        let scorer = FixedScorer {
            row: vec![0.9, 0.2, 0.5],
            device: Device::Cpu,
        };
        let test = vec![IndexedTriple::new(0, 0, 1)];
        let all = ErVocab::build(&test);
        let names = vec!["knows".to_string()];

        let report = Evaluator::new(&all, 8).evaluate(&scorer, &test, &names).unwrap();
        assert_eq!(report.ranks, vec![3]);
        assert_eq!(report.metrics.hits_at_1, 0.0);
        assert_eq!(report.metrics.hits_at_3, 1.0);
        assert_eq!(report.metrics.hits_at_10, 1.0);
        assert_eq!(report.ranks_per_relation["knows"], vec![3]);
        assert!((report.metrics.mrr - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_chunks_match_single_batch() {
        let scorer = FixedScorer {
            row: vec![0.1, 0.4, 0.3, 0.8],
            device: Device::Cpu,
        };
        let test = vec![
            IndexedTriple::new(0, 0, 1),
            IndexedTriple::new(1, 0, 2),
            IndexedTriple::new(2, 1, 0),
        ];
        let all = ErVocab::build(&test);
        let names = vec!["a".to_string(), "b".to_string()];

        let one = Evaluator::new(&all, 1).evaluate(&scorer, &test, &names).unwrap();
        let many = Evaluator::new(&all, 64).evaluate(&scorer, &test, &names).unwrap();
        assert_eq!(one.ranks, many.ranks);
        assert_eq!(one.metrics, many.metrics);
    }

    #[test]
    fn test_per_relation_reciprocal() {
        let mut ranks = BTreeMap::new();
        ranks.insert("likes".to_string(), vec![1, 2]);
        ranks.insert("likes_reverse".to_string(), vec![4, 1]);

        let mrr = per_relation_mrr(&ranks, PairingMode::Reciprocal).unwrap();
        assert_eq!(mrr.len(), 1);
        assert!((mrr["likes"] - (1.0 + 0.5 + 0.25 + 1.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_per_relation_tail_only() {
        let mut ranks = BTreeMap::new();
        ranks.insert("likes".to_string(), vec![1, 4]);

        let mrr = per_relation_mrr(&ranks, PairingMode::TailOnly).unwrap();
        assert!((mrr["likes"] - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_per_relation_length_mismatch_fails() {
        let mut ranks = BTreeMap::new();
        ranks.insert("likes".to_string(), vec![1, 2]);
        ranks.insert("likes_reverse".to_string(), vec![1]);

        let err = per_relation_mrr(&ranks, PairingMode::Reciprocal).unwrap_err();
        assert!(matches!(
            err,
            Error::VocabularyMismatch { forward: 2, reverse: 1, .. }
        ));
    }

    #[test]
    fn test_per_relation_missing_reverse_fails() {
        let mut ranks = BTreeMap::new();
        ranks.insert("likes".to_string(), vec![1]);

        let err = per_relation_mrr(&ranks, PairingMode::Reciprocal).unwrap_err();
        assert!(matches!(err, Error::MissingReverseRelation(r) if r == "likes"));
    }

    #[test]
    fn test_pairing_mode_for_dataset() {
        assert_eq!(PairingMode::for_dataset(true, false), PairingMode::Reciprocal);
        assert_eq!(PairingMode::for_dataset(true, true), PairingMode::TailOnly);
        assert_eq!(PairingMode::for_dataset(false, false), PairingMode::TailOnly);
    }
}
