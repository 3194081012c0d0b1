//! QMult / OMult: score = σ(⟨h ⊗ r, t⟩).

use std::path::Path;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;
use rand::rngs::StdRng;

use super::hypercomplex::{Algebra, ComponentEmbeddings};
use super::{binary_cross_entropy, dropout, KgeModel, ModelConfig, TailScorer, VocabSizes};
use crate::error::Result;

/// Multiplicative hypercomplex model.
pub struct MultModel {
    varmap: VarMap,
    embeddings: ComponentEmbeddings,
    config: ModelConfig,
    device: Device,
    training: bool,
}

impl MultModel {
    pub fn new(
        algebra: Algebra,
        config: &ModelConfig,
        sizes: VocabSizes,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let mut varmap = VarMap::new();
        let embeddings =
            ComponentEmbeddings::new(algebra, &mut varmap, sizes, config.embedding_dim, device, rng)?;
        Ok(Self {
            varmap,
            embeddings,
            config: config.clone(),
            device: device.clone(),
            training: true,
        })
    }

    /// Components of `h ⊗ r` after input and hidden dropout.
    fn hidden(&self, heads: &Tensor, relations: &Tensor) -> Result<Vec<Tensor>> {
        let algebra = self.embeddings.algebra();
        let h = self.input_dropout(self.embeddings.lookup_entities(heads)?)?;
        let mut r = self.input_dropout(self.embeddings.lookup_relations(relations)?)?;
        if self.config.norm_flag {
            r = algebra.normalize(&r)?;
        }
        algebra
            .product(&h, &r)?
            .iter()
            .map(|c| dropout(c, self.config.hidden_dropout, self.training))
            .collect()
    }

    fn input_dropout(&self, xs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        xs.iter()
            .map(|x| dropout(x, self.config.input_dropout, self.training))
            .collect()
    }
}

impl TailScorer for MultModel {
    fn forward_head_batch(&self, heads: &Tensor, relations: &Tensor) -> Result<Tensor> {
        let hr = self.hidden(heads, relations)?;
        Ok(candle_nn::ops::sigmoid(&self.embeddings.score_all_tails(&hr)?)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl KgeModel for MultModel {
    fn forward_head_and_loss(
        &self,
        heads: &Tensor,
        relations: &Tensor,
        targets: &Tensor,
    ) -> Result<Tensor> {
        binary_cross_entropy(&self.forward_head_batch(heads, relations)?, targets)
    }

    fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    fn name(&self) -> &'static str {
        match self.embeddings.algebra() {
            Algebra::Quaternion => "QMult",
            Algebra::Octonion => "OMult",
        }
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn entity_embeddings(&self) -> Result<Tensor> {
        self.embeddings.entity_matrix()
    }

    fn relation_embeddings(&self) -> Result<Tensor> {
        self.embeddings.relation_matrix()
    }

    fn save(&self, path: &Path) -> Result<()> {
        Ok(self.varmap.save(path)?)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        Ok(self.varmap.load(path)?)
    }
}
