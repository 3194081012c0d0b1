//! K-vs-all training loop.
//!
//! Every `(head, relation)` key of the training [`ErVocab`](crate::vocab::ErVocab)
//! is one example whose label vector covers all entities. Per epoch the
//! trainer shuffles the example indices, slices them into minibatches,
//! materialises dense targets on a rayon pool, optionally smooths them and
//! takes one Adam step per minibatch on the mean binary cross-entropy.
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperkge::training::{Trainer, TrainingConfig};
//!
//! let config = TrainingConfig::default()
//!     .with_epochs(50)
//!     .with_batch_size(256)
//!     .with_label_smoothing(Some(0.1));
//!
//! let mut trainer = Trainer::new(config)?;
//! let report = trainer.train(&mut model, &loader)?;
//! println!("final loss {}", report.final_loss);
//! ```

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::HeadRelationBatchLoader;
use crate::error::{Error, Result};
use crate::models::KgeModel;

/// Optimisation hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of passes over all examples (default: 10).
    pub num_of_epochs: usize,
    /// Examples per minibatch; also sizes evaluation chunks (default: 1024).
    pub batch_size: usize,
    /// Adam step size (default: 0.001).
    pub learning_rate: f64,
    /// Smoothing factor in `[0, 1)`; `None` disables smoothing.
    pub label_smoothing: Option<f32>,
    /// Threads used to build target rows (default: 1).
    pub num_workers: usize,
    /// Seed for shuffling and initialisation (default: 1).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_of_epochs: 10,
            batch_size: 1024,
            learning_rate: 0.001,
            label_smoothing: None,
            num_workers: 1,
            seed: 1,
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.num_of_epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_label_smoothing(mut self, s: Option<f32>) -> Self {
        self.label_smoothing = s;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if let Some(s) = self.label_smoothing {
            check_smoothing(s)?;
        }
        Ok(())
    }
}

fn check_smoothing(s: f32) -> Result<()> {
    if (0.0..1.0).contains(&s) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "label_smoothing must lie in [0, 1), got {s}"
        )))
    }
}

/// `(1 - s) * targets + s / num_entities`, where `num_entities` is the
/// last dimension of `targets`.
pub fn smooth_labels(targets: &Tensor, s: f32) -> Result<Tensor> {
    check_smoothing(s)?;
    let num_entities = targets.dim(candle_core::D::Minus1)?;
    if num_entities == 0 {
        return Ok(targets.clone());
    }
    Ok(targets.affine(1.0 - s as f64, s as f64 / num_entities as f64)?)
}

/// Loss history of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Sum of minibatch losses, one entry per epoch.
    pub loss_per_epoch: Vec<f64>,
    /// Last epoch's loss, or `-1.0` when no epoch ran.
    pub final_loss: f64,
}

impl TrainingReport {
    pub fn epochs(&self) -> usize {
        self.loss_per_epoch.len()
    }
}

/// Drives K-vs-all optimisation of a [`KgeModel`].
pub struct Trainer {
    config: TrainingConfig,
    rng: StdRng,
    pool: ThreadPool,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("worker pool: {e}")))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run `num_of_epochs` epochs over `loader`.
    ///
    /// The model is left in evaluation mode afterwards.
    pub fn train<M>(&mut self, model: &mut M, loader: &HeadRelationBatchLoader) -> Result<TrainingReport>
    where
        M: KgeModel + ?Sized,
    {
        let epochs = self.config.num_of_epochs;
        info!(
            model = model.name(),
            examples = loader.len(),
            epochs,
            batch_size = self.config.batch_size,
            "starting training"
        );
        info!(num_params = model.num_params(), "free parameters");

        let mut report = TrainingReport {
            loss_per_epoch: Vec::with_capacity(epochs),
            final_loss: -1.0,
        };
        if epochs == 0 {
            model.set_training(false);
            return Ok(report);
        }

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.vars(), params)?;
        let device = model.device().clone();
        let mut order: Vec<usize> = (0..loader.len()).collect();

        model.set_training(true);
        for epoch in 1..=epochs {
            order.shuffle(&mut self.rng);
            let mut epoch_loss = 0.0f64;

            for idxs in order.chunks(self.config.batch_size) {
                let batch = self.pool.install(|| loader.collate(idxs));
                let (heads, relations, mut targets) = batch.to_tensors(&device)?;
                if let Some(s) = self.config.label_smoothing {
                    targets = smooth_labels(&targets, s)?;
                }

                let loss = model.forward_head_and_loss(&heads, &relations, &targets)?;
                optimizer.backward_step(&loss)?;
                epoch_loss += f64::from(loss.to_scalar::<f32>()?);
            }

            debug!(epoch, loss = epoch_loss, "epoch finished");
            report.loss_per_epoch.push(epoch_loss);
            report.final_loss = epoch_loss;
        }
        model.set_training(false);

        info!(epochs, final_loss = report.final_loss, "training finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexedTriple;
    use crate::models::{Model, ModelConfig, ModelKind, TailScorer, VocabSizes};
    use crate::vocab::ErVocab;
    use candle_core::Device;

    fn loader() -> HeadRelationBatchLoader {
        let triples = vec![
            IndexedTriple::new(0, 0, 1),
            IndexedTriple::new(1, 0, 2),
            IndexedTriple::new(2, 1, 0),
            IndexedTriple::new(3, 1, 1),
        ];
        HeadRelationBatchLoader::new(&ErVocab::build(&triples), 4)
    }

    fn model(seed: u64) -> Model {
        let config = ModelConfig::default().with_embedding_dim(4).with_dropouts(0.0, 0.0, 0.0);
        let sizes = VocabSizes {
            num_entities: 4,
            num_relations: 2,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        Model::new(ModelKind::QMult, &config, sizes, &Device::Cpu, &mut rng).unwrap()
    }

    #[test]
    fn test_smooth_labels() {
        let y = Tensor::new(&[[1.0f32, 0.0, 0.0, 0.0]], &Device::Cpu).unwrap();
        let smoothed = smooth_labels(&y, 0.2).unwrap().to_vec2::<f32>().unwrap();
        let expected = [0.8 + 0.05, 0.05, 0.05, 0.05];
        for (a, b) in smoothed[0].iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_smooth_labels_three_entities() {
        let y = Tensor::new(&[[1.0f32, 0.0, 0.0]], &Device::Cpu).unwrap();
        let smoothed = smooth_labels(&y, 0.1).unwrap().to_vec2::<f32>().unwrap();
        let expected = [0.9 + 0.1 / 3.0, 0.1 / 3.0, 0.1 / 3.0];
        for (a, b) in smoothed[0].iter().zip(expected) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_smoothing_out_of_range_rejected() {
        let y = Tensor::new(&[[1.0f32, 0.0]], &Device::Cpu).unwrap();
        assert!(matches!(smooth_labels(&y, 1.0), Err(Error::InvalidConfig(_))));
        assert!(matches!(smooth_labels(&y, -0.1), Err(Error::InvalidConfig(_))));

        let config = TrainingConfig::default().with_label_smoothing(Some(1.5));
        assert!(Trainer::new(config).is_err());
    }

    #[test]
    fn test_zero_epochs_leaves_model_unchanged() {
        let mut m = model(4);
        let before = m.entity_embeddings().unwrap().to_vec2::<f32>().unwrap();

        let mut trainer = Trainer::new(TrainingConfig::default().with_epochs(0)).unwrap();
        let report = trainer.train(&mut m, &loader()).unwrap();

        assert!(report.loss_per_epoch.is_empty());
        assert_eq!(report.final_loss, -1.0);
        assert_eq!(m.entity_embeddings().unwrap().to_vec2::<f32>().unwrap(), before);
    }

    #[test]
    fn test_empty_loader_sums_to_zero() {
        let mut m = model(4);
        let before = m.entity_embeddings().unwrap().to_vec2::<f32>().unwrap();
        let empty = HeadRelationBatchLoader::new(&ErVocab::build(&Vec::<IndexedTriple>::new()), 4);

        let mut trainer = Trainer::new(TrainingConfig::default().with_epochs(2)).unwrap();
        let report = trainer.train(&mut m, &empty).unwrap();

        assert_eq!(report.loss_per_epoch, vec![0.0, 0.0]);
        assert_eq!(report.final_loss, 0.0);
        assert_eq!(m.entity_embeddings().unwrap().to_vec2::<f32>().unwrap(), before);
    }

    #[test]
    fn test_loss_history_per_epoch() {
        let mut m = model(4);
        let config = TrainingConfig::default()
            .with_epochs(3)
            .with_batch_size(3)
            .with_learning_rate(0.05)
            .with_num_workers(2);
        let report = Trainer::new(config).unwrap().train(&mut m, &loader()).unwrap();

        assert_eq!(report.epochs(), 3);
        assert_eq!(report.final_loss, report.loss_per_epoch[2]);
        assert!(report.loss_per_epoch.iter().all(|l| l.is_finite() && *l > 0.0));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut m = model(8);
        let config = TrainingConfig::default()
            .with_epochs(60)
            .with_batch_size(4)
            .with_learning_rate(0.05);
        let report = Trainer::new(config).unwrap().train(&mut m, &loader()).unwrap();

        assert!(report.final_loss < report.loss_per_epoch[0]);
        let probs = m
            .forward_head_batch(
                &Tensor::new(&[0u32], &Device::Cpu).unwrap(),
                &Tensor::new(&[0u32], &Device::Cpu).unwrap(),
            )
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert!(probs[0][1] > probs[0][3]);
    }

    #[test]
    fn test_same_seed_same_history() {
        let run = || {
            let mut m = model(2);
            let config = TrainingConfig::default().with_epochs(2).with_batch_size(2).with_seed(9);
            Trainer::new(config).unwrap().train(&mut m, &loader()).unwrap()
        };
        assert_eq!(run(), run());
    }
}
