//! `settings.json` and `results.json`.
//!
//! Settings carry every hyperparameter plus the vocabulary sizes and dataset
//! provenance, so a stored run can be rebuilt from its directory and the
//! original data files. Results repeat the settings next to the metrics.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetInfo;
use crate::error::Result;
use crate::evaluation::RankMetrics;
use crate::models::{ModelConfig, ModelKind};
use crate::training::TrainingConfig;

pub const SETTINGS_FILE: &str = "settings.json";
pub const RESULTS_FILE: &str = "results.json";

/// Everything needed to rebuild a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model: ModelKind,
    #[serde(flatten)]
    pub model_config: ModelConfig,
    #[serde(flatten)]
    pub training: TrainingConfig,
    #[serde(flatten)]
    pub dataset: DatasetInfo,
    pub num_entities: usize,
    pub num_relations: usize,
}

impl Settings {
    pub fn read(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Final metrics of a run, flattened together with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    #[serde(rename = "H@1")]
    pub hits_at_1: f64,
    #[serde(rename = "H@3")]
    pub hits_at_3: f64,
    #[serde(rename = "H@10")]
    pub hits_at_10: f64,
    #[serde(rename = "MR")]
    pub mr: f64,
    #[serde(rename = "MRR")]
    pub mrr: f64,
    #[serde(rename = "Number_param")]
    pub num_params: usize,
    #[serde(flatten)]
    pub settings: Settings,
}

impl Results {
    pub fn new(metrics: &RankMetrics, num_params: usize, settings: Settings) -> Self {
        Self {
            hits_at_1: metrics.hits_at_1,
            hits_at_3: metrics.hits_at_3,
            hits_at_10: metrics.hits_at_10,
            mr: metrics.mr,
            mrr: metrics.mrr,
            num_params,
            settings,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
