//! Property-based tests for the data pipeline and ranking.
//!
//! These tests verify invariants that should hold for any input:
//! - Reciprocal augmentation doubles splits without reordering
//! - Index construction is deterministic and total
//! - Loader length equals the number of distinct (head, relation) keys
//! - Filtered ranks stay within [1, num_entities]

use hyperkge::dataset::{augment_with_inverse, extract_entities, is_reverse_relation};
use hyperkge::evaluation::{filter_scores, rank_of, RankMetrics};
use hyperkge::{Dataset, DatasetOptions, ErVocab, HeadRelationBatchLoader, IndexMapper, IndexedTriple, Triple};
use proptest::prelude::*;

fn arb_name() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn arb_triples(max: usize) -> impl Strategy<Value = Vec<Triple>> {
    prop::collection::vec(
        (arb_name(), "[p-s]", arb_name()).prop_map(|(h, r, t)| Triple::new(h, r, t)),
        0..max,
    )
}

fn arb_indexed(num_entities: usize, num_relations: usize) -> impl Strategy<Value = Vec<IndexedTriple>> {
    prop::collection::vec(
        (0..num_entities, 0..num_relations, 0..num_entities)
            .prop_map(|(h, r, t)| IndexedTriple::new(h, r, t)),
        1..40,
    )
}

mod augmentation_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn augmentation_doubles_and_keeps_prefix(triples in arb_triples(30)) {
            let augmented = augment_with_inverse(triples.clone());
            prop_assert_eq!(augmented.len(), 2 * triples.len());
            prop_assert_eq!(&augmented[..triples.len()], triples.as_slice());

            for (original, inverse) in triples.iter().zip(&augmented[triples.len()..]) {
                prop_assert_eq!(&inverse.head, &original.tail);
                prop_assert_eq!(&inverse.tail, &original.head);
                prop_assert!(is_reverse_relation(&inverse.relation));
            }
        }

        #[test]
        fn entities_sorted_and_unique(triples in arb_triples(30)) {
            let entities = extract_entities(&triples);
            prop_assert!(entities.windows(2).all(|w| w[0] < w[1]));
            for t in &triples {
                prop_assert!(entities.binary_search(&t.head).is_ok());
                prop_assert!(entities.binary_search(&t.tail).is_ok());
            }
        }
    }
}

mod index_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn every_triple_resolves_and_rebuild_is_identical(
            train in arb_triples(20),
            valid in arb_triples(5),
            test in arb_triples(5),
        ) {
            let ds = Dataset::from_splits(train, valid, test, DatasetOptions::default());

            let a = IndexMapper::new(ds.entities(), ds.relations());
            let b = IndexMapper::new(ds.entities(), ds.relations());
            let ia = a.index_triples(ds.all_triples()).unwrap();
            let ib = b.index_triples(ds.all_triples()).unwrap();
            prop_assert_eq!(&ia, &ib);

            for t in &ia {
                prop_assert!(t.head < a.num_entities() && t.tail < a.num_entities());
                prop_assert!(t.relation < a.num_relations());
            }
        }

        #[test]
        fn loader_len_is_distinct_keys(triples in arb_indexed(6, 3)) {
            let vocab = ErVocab::build(&triples);
            let loader = HeadRelationBatchLoader::new(&vocab, 6);

            let mut keys: Vec<(usize, usize)> = triples.iter().map(|t| (t.head, t.relation)).collect();
            keys.sort_unstable();
            keys.dedup();
            prop_assert_eq!(loader.len(), keys.len());

            for i in 0..loader.len() {
                let example = loader.get(i).unwrap();
                for tail in vocab.tails(example.head, example.relation) {
                    prop_assert_eq!(example.targets[*tail], 1.0);
                }
                let positives = example.targets.iter().filter(|&&y| y == 1.0).count();
                let mut tails = vocab.tails(example.head, example.relation).to_vec();
                tails.sort_unstable();
                tails.dedup();
                prop_assert_eq!(positives, tails.len());
            }
        }
    }
}

mod ranking_props {
    use super::*;

    fn arb_row() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(prop_oneof![Just(0.5f32), 0.0f32..1.0f32], 1..30)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn rank_within_bounds(row in arb_row(), seed in any::<prop::sample::Index>()) {
            let target = seed.index(row.len());
            let rank = rank_of(&row, target);
            prop_assert!(rank >= 1 && rank <= row.len());
        }

        #[test]
        fn rank_matches_stable_sort(row in arb_row(), seed in any::<prop::sample::Index>()) {
            let target = seed.index(row.len());
            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|&a, &b| row[b].partial_cmp(&row[a]).unwrap());
            let position = order.iter().position(|&i| i == target).unwrap();
            prop_assert_eq!(rank_of(&row, target), position + 1);
        }

        #[test]
        fn filtering_never_worsens_rank(
            row in arb_row(),
            seed in any::<prop::sample::Index>(),
            known in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let target = seed.index(row.len());
            let known: Vec<usize> = known.iter().map(|k| k.index(row.len())).collect();

            let mut filtered = row.clone();
            filter_scores(&mut filtered, &known, target);
            prop_assert_eq!(filtered[target], row[target]);
            prop_assert!(rank_of(&filtered, target) <= rank_of(&row, target));
        }

        #[test]
        fn metrics_are_well_formed(ranks in prop::collection::vec(1usize..50, 1..100)) {
            let m = RankMetrics::from_ranks(&ranks);
            prop_assert!(m.mrr > 0.0 && m.mrr <= 1.0);
            prop_assert!(m.mr >= 1.0);
            prop_assert!(m.hits_at_1 <= m.hits_at_3 && m.hits_at_3 <= m.hits_at_10);
            prop_assert!(m.hits_at_10 <= 1.0);
        }
    }
}
