//! Hypercomplex knowledge graph embeddings.
//!
//! Knowledge graphs store facts as (head, relation, tail) triples:
//! `(aspirin, treats, headache)`. Link prediction asks for the missing
//! tail of `(h, r, ?)`. This crate learns entity and relation embeddings
//! whose components are quaternions or octonions and scores every
//! candidate tail at once.
//!
//! ## Why hypercomplex numbers?
//!
//! Quaternion multiplication is a rotation in 4D and is not commutative, so
//! `h ⊗ r` and `r ⊗ h` differ and asymmetric relations come for free.
//! Octonions extend this to 8D through Cayley–Dickson doubling and drop
//! associativity as well.
//!
//! | Model | Algebra | Interaction |
//! |-------|---------|-------------|
//! | QMult | ℍ | h ⊗ r |
//! | OMult | 𝕆 | h ⊗ r |
//! | ConvQ | ℍ | conv(h, r) ∘ (h ⊗ r) |
//! | ConvO | 𝕆 | conv(h, r) ∘ (h ⊗ r) |
//!
//! ## Pipeline
//!
//! ```text
//! train/valid/test.txt -> Dataset -> IndexMapper -> ErVocab
//!     -> HeadRelationBatchLoader -> Trainer -> Model -> Evaluator
//! ```
//!
//! Training is K-vs-all: each distinct `(head, relation)` pair is one
//! example labelled against every entity. Evaluation is filtered tail
//! ranking; with reciprocal augmentation every head query is a tail query
//! on `r_reverse`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hyperkge::{Dataset, DatasetOptions, Experiment, ExperimentConfig, ModelKind};
//!
//! let dataset = Dataset::load("KGs/UMLS", DatasetOptions::default())?;
//! let config = ExperimentConfig::new(ModelKind::QMult);
//! let outcome = Experiment::new(dataset, config).train_and_eval()?;
//! if let Some(report) = outcome.evaluation {
//!     println!("{}", report.metrics.summary());
//! }
//! ```
//!
//! ## References
//!
//! - Zhang et al. (2019). "Quaternion Knowledge Graph Embeddings." NeurIPS.
//! - Demir et al. (2021). "Convolutional Hypercomplex Embeddings for Link
//!   Prediction." ACML.
//! - Lacroix et al. (2018). "Canonical Tensor Decomposition for Knowledge
//!   Base Completion." ICML.

pub mod algebra;
pub mod batch;
pub mod dataset;
mod error;
pub mod evaluation;
pub mod experiment;
pub mod index;
pub mod models;
pub mod settings;
pub mod training;
pub mod vocab;

pub use batch::{Batch, Example, HeadRelationBatchLoader, LabelValues};
pub use dataset::{Dataset, DatasetInfo, DatasetOptions, DatasetStats, Split, Triple};
pub use error::{Error, Result};
pub use evaluation::{EvaluationReport, Evaluator, PairingMode, RankMetrics};
pub use experiment::{Experiment, ExperimentConfig, ExperimentOutcome, Reproduction};
pub use index::{IndexMapper, IndexedTriple};
pub use models::{KgeModel, Model, ModelConfig, ModelKind, TailScorer, VocabSizes};
pub use settings::{Results, Settings};
pub use training::{Trainer, TrainingConfig, TrainingReport};
pub use vocab::{ErVocab, HeadTailVocab, ReVocab};
