//! End-to-end runs: train, persist, evaluate, and reproduce.
//!
//! A run writes its artifacts into a fresh timestamped folder:
//!
//! ```text
//! <storage_root>/<YYYY-mm-dd_HH-MM-SS>/
//!     settings.json
//!     model.safetensors
//!     loss_per_epoch.csv
//!     <Model>_entity_embeddings.csv      (optional)
//!     <Model>_relation_embeddings.csv    (optional)
//!     results.json                       (when the test split is non-empty)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::batch::HeadRelationBatchLoader;
use crate::dataset::{Dataset, DatasetOptions};
use crate::error::{Error, Result};
use crate::evaluation::{EvaluationReport, Evaluator, PairingMode};
use crate::index::IndexMapper;
use crate::models::{KgeModel, Model, ModelConfig, ModelKind, VocabSizes};
use crate::settings::{Results, Settings, RESULTS_FILE, SETTINGS_FILE};
use crate::training::{Trainer, TrainingConfig, TrainingReport};
use crate::vocab::ErVocab;

pub const MODEL_FILE: &str = "model.safetensors";
pub const LOSS_FILE: &str = "loss_per_epoch.csv";

/// What to train and where to put it.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub model: ModelKind,
    pub model_config: ModelConfig,
    pub training: TrainingConfig,
    /// Parent of the per-run folders (default: `Experiments`).
    pub storage_root: PathBuf,
    /// Export embeddings as CSV next to the checkpoint (default: false).
    pub store_embeddings: bool,
    pub device: Device,
}

impl ExperimentConfig {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            model_config: ModelConfig::default(),
            training: TrainingConfig::default(),
            storage_root: PathBuf::from("Experiments"),
            store_embeddings: false,
            device: Device::Cpu,
        }
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }

    pub fn with_training(mut self, config: TrainingConfig) -> Self {
        self.training = config;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_store_embeddings(mut self, store: bool) -> Self {
        self.store_embeddings = store;
        self
    }
}

/// Artifacts and reports of a finished run.
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub storage_path: PathBuf,
    pub settings: Settings,
    pub training: TrainingReport,
    pub num_params: usize,
    /// `None` when the test split is empty.
    pub evaluation: Option<EvaluationReport>,
}

/// Result of re-evaluating a stored run.
#[derive(Debug)]
pub struct Reproduction {
    pub settings: Settings,
    pub num_params: usize,
    pub report: EvaluationReport,
    pub per_relation_mrr: Option<BTreeMap<String, f64>>,
}

/// One training-and-evaluation run over a dataset.
pub struct Experiment {
    dataset: Dataset,
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(dataset: Dataset, config: ExperimentConfig) -> Self {
        Self { dataset, config }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn train_and_eval(&self) -> Result<ExperimentOutcome> {
        let mapper = IndexMapper::new(self.dataset.entities(), self.dataset.relations());
        let settings = Settings {
            model: self.config.model,
            model_config: self.config.model_config.clone(),
            training: self.config.training.clone(),
            dataset: self.dataset.info().clone(),
            num_entities: mapper.num_entities(),
            num_relations: mapper.num_relations(),
        };

        let storage_path = create_experiment_folder(&self.config.storage_root)?;
        info!(path = %storage_path.display(), "experiment folder created");
        settings.write(&storage_path.join(SETTINGS_FILE))?;

        let mut rng = StdRng::seed_from_u64(settings.training.seed);
        let mut model = Model::new(
            settings.model,
            &settings.model_config,
            vocab_sizes(&mapper),
            &self.config.device,
            &mut rng,
        )?;

        let train = mapper.index_triples(self.dataset.train())?;
        let loader = HeadRelationBatchLoader::new(&ErVocab::build(&train), mapper.num_entities());
        let mut trainer = Trainer::new(settings.training.clone())?;
        let training = trainer.train(&mut model, &loader)?;

        model.save(&storage_path.join(MODEL_FILE))?;
        write_loss_csv(&storage_path.join(LOSS_FILE), &training.loss_per_epoch)?;
        if self.config.store_embeddings {
            export_embeddings(&storage_path, &model, &mapper)?;
        }

        let num_params = model.num_params();
        let evaluation = if self.dataset.test().is_empty() {
            None
        } else {
            info!("Standard Link Prediction evaluation on Testing Data");
            let all = mapper.index_triples(self.dataset.all_triples())?;
            let test = mapper.index_triples(self.dataset.test())?;
            let er_vocab = ErVocab::build(&all);
            let report = Evaluator::new(&er_vocab, settings.training.batch_size).evaluate(
                &model,
                &test,
                mapper.relations(),
            )?;
            Results::new(&report.metrics, num_params, settings.clone())
                .write(&storage_path.join(RESULTS_FILE))?;
            Some(report)
        };

        Ok(ExperimentOutcome {
            storage_path,
            settings,
            training,
            num_params,
            evaluation,
        })
    }

    /// Re-evaluate the run stored in `model_dir` on the test split of
    /// `data_dir`.
    ///
    /// Vocabularies are re-derived from the data files; their sizes must
    /// match the stored settings.
    pub fn reproduce(
        model_dir: &Path,
        data_dir: &Path,
        per_relation: bool,
        tail_pred_constraint: bool,
    ) -> Result<Reproduction> {
        let settings = Settings::read(&model_dir.join(SETTINGS_FILE))?;
        let options = DatasetOptions::default()
            .with_reverse(settings.dataset.dataset_augmentation)
            .with_tail_pred_constraint(tail_pred_constraint);
        let dataset = Dataset::load(data_dir, options)?;

        let mapper = IndexMapper::new(dataset.entities(), dataset.relations());
        check_count("num_entities", settings.num_entities, mapper.num_entities())?;
        check_count("num_relations", settings.num_relations, mapper.num_relations())?;

        let device = Device::Cpu;
        let mut rng = StdRng::seed_from_u64(settings.training.seed);
        let mut model = Model::new(
            settings.model,
            &settings.model_config,
            vocab_sizes(&mapper),
            &device,
            &mut rng,
        )?;
        model.load(&model_dir.join(MODEL_FILE))?;
        model.set_training(false);

        let num_params = model.num_params();
        info!(model = %settings.model, num_params, "Evaluate");

        let all = mapper.index_triples(dataset.all_triples())?;
        let test = mapper.index_triples(dataset.test())?;
        let er_vocab = ErVocab::build(&all);
        let report = Evaluator::new(&er_vocab, settings.training.batch_size).evaluate(
            &model,
            &test,
            mapper.relations(),
        )?;

        let per_relation_mrr = if per_relation {
            let mode = PairingMode::for_dataset(
                settings.dataset.dataset_augmentation,
                tail_pred_constraint,
            );
            let mrr = report.per_relation_mrr(mode)?;
            for (relation, value) in &mrr {
                info!(relation = %relation, mrr = value, "MRR per relation");
            }
            Some(mrr)
        } else {
            None
        };

        Ok(Reproduction {
            settings,
            num_params,
            report,
            per_relation_mrr,
        })
    }
}

fn vocab_sizes(mapper: &IndexMapper) -> VocabSizes {
    VocabSizes {
        num_entities: mapper.num_entities(),
        num_relations: mapper.num_relations(),
    }
}

fn check_count(field: &'static str, stored: usize, derived: usize) -> Result<()> {
    if stored == derived {
        Ok(())
    } else {
        Err(Error::SettingsMismatch {
            field,
            stored,
            derived,
        })
    }
}

/// Create `<root>/<timestamp>`, suffixing `_<n>` if that folder exists.
pub fn create_experiment_folder(root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    let mut path = root.join(&stamp);
    let mut n = 1;
    loop {
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                path = root.join(format!("{stamp}_{n}"));
                n += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// One loss value per line.
pub fn write_loss_csv(path: &Path, losses: &[f64]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for loss in losses {
        writer.write_record([loss.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn export_embeddings(dir: &Path, model: &Model, mapper: &IndexMapper) -> Result<()> {
    let name = model.name();
    write_embedding_csv(
        &dir.join(format!("{name}_entity_embeddings.csv")),
        mapper.entities(),
        &model.entity_embeddings()?,
    )?;
    write_embedding_csv(
        &dir.join(format!("{name}_relation_embeddings.csv")),
        mapper.relations(),
        &model.relation_embeddings()?,
    )
}

/// Header `,0,1,..`; one row per name followed by its embedding.
pub fn write_embedding_csv(path: &Path, names: &[String], embeddings: &Tensor) -> Result<()> {
    let rows = embeddings.to_vec2::<f32>()?;
    let width = rows.first().map_or(0, Vec::len);

    let mut writer = csv::Writer::from_path(path)?;
    let header = std::iter::once(String::new()).chain((0..width).map(|i| i.to_string()));
    writer.write_record(header)?;
    for (name, row) in names.iter().zip(&rows) {
        let record = std::iter::once(name.clone()).chain(row.iter().map(f32::to_string));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}
