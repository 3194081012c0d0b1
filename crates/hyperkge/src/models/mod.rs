//! Hypercomplex KGE models.
//!
//! Every model scores all candidate tails of a `(head, relation)` query at
//! once, which is what K-vs-all training and filtered ranking need.
//!
//! # Available Models
//!
//! | Model | Algebra | Score |
//! |-------|---------|-------|
//! | [`ModelKind::QMult`] | quaternions | σ(⟨h ⊗ r, t⟩) |
//! | [`ModelKind::OMult`] | octonions | σ(⟨h ⊗ r, t⟩) |
//! | [`ModelKind::ConvQ`] | quaternions | σ(⟨conv(h, r) ∘ (h ⊗ r), t⟩) |
//! | [`ModelKind::ConvO`] | octonions | σ(⟨conv(h, r) ∘ (h ⊗ r), t⟩) |
//!
//! Inner products run over every component, so a `d`-dimensional quaternion
//! model holds `4d` floats per entity and an octonion model `8d`.
//!
//! # Capability traits
//!
//! [`TailScorer`] is the only thing evaluation needs; [`KgeModel`] adds the
//! training surface. [`Model`] is the closed set of variants, selected by
//! [`ModelKind`].
//!
//! # References
//!
//! - Zhang et al. (2019). "Quaternion Knowledge Graph Embeddings." NeurIPS.
//! - Demir et al. (2021). "Convolutional Hypercomplex Embeddings for Link
//!   Prediction." ACML.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod conv;
mod hypercomplex;
mod mult;

pub use conv::ConvModel;
pub use hypercomplex::Algebra;
pub use mult::MultModel;

/// The supported model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    QMult,
    OMult,
    ConvQ,
    ConvO,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [Self::QMult, Self::OMult, Self::ConvQ, Self::ConvO];

    pub fn name(self) -> &'static str {
        match self {
            Self::QMult => "QMult",
            Self::OMult => "OMult",
            Self::ConvQ => "ConvQ",
            Self::ConvO => "ConvO",
        }
    }

    pub fn algebra(self) -> Algebra {
        match self {
            Self::QMult | Self::ConvQ => Algebra::Quaternion,
            Self::OMult | Self::ConvO => Algebra::Octonion,
        }
    }

    pub fn is_convolutional(self) -> bool {
        matches!(self, Self::ConvQ | Self::ConvO)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    /// Accepts the model name or its `…Batch` alias, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        let base = lower.strip_suffix("batch").unwrap_or(&lower);
        match base {
            "qmult" => Ok(Self::QMult),
            "omult" => Ok(Self::OMult),
            "convq" => Ok(Self::ConvQ),
            "convo" => Ok(Self::ConvO),
            _ => Err(Error::UnknownModelName(s.to_string())),
        }
    }
}

/// Architecture hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Size of each hypercomplex component (default: 32).
    pub embedding_dim: usize,
    /// Dropout on head and relation embeddings (default: 0.1).
    pub input_dropout: f32,
    /// Dropout on the hypercomplex product (default: 0.1).
    pub hidden_dropout: f32,
    /// Dropout on convolution feature maps (default: 0.1).
    pub feature_map_dropout: f32,
    /// Convolution output channels (default: 16).
    pub num_of_output_channels: usize,
    /// Square convolution kernel size (default: 3).
    pub kernel_size: usize,
    /// Normalize relations to unit norm before the product (default: false).
    pub norm_flag: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 32,
            input_dropout: 0.1,
            hidden_dropout: 0.1,
            feature_map_dropout: 0.1,
            num_of_output_channels: 16,
            kernel_size: 3,
            norm_flag: false,
        }
    }
}

impl ModelConfig {
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_dropouts(mut self, input: f32, hidden: f32, feature_map: f32) -> Self {
        self.input_dropout = input;
        self.hidden_dropout = hidden;
        self.feature_map_dropout = feature_map;
        self
    }

    pub fn with_conv(mut self, channels: usize, kernel_size: usize) -> Self {
        self.num_of_output_channels = channels;
        self.kernel_size = kernel_size;
        self
    }

    pub fn with_norm_flag(mut self, norm_flag: bool) -> Self {
        self.norm_flag = norm_flag;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig("embedding_dim must be > 0".into()));
        }
        for (name, p) in [
            ("input_dropout", self.input_dropout),
            ("hidden_dropout", self.hidden_dropout),
            ("feature_map_dropout", self.feature_map_dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("{name} must lie in [0, 1), got {p}")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Scores every tail entity for a batch of `(head, relation)` queries.
pub trait TailScorer {
    /// Probabilities of shape `[batch, num_entities]`.
    ///
    /// `heads` and `relations` are `u32` index tensors of shape `[batch]`.
    fn forward_head_batch(&self, heads: &Tensor, relations: &Tensor) -> Result<Tensor>;

    /// Device the scorer expects its index tensors on.
    fn device(&self) -> &Device;
}

/// Trainable model surface used by the K-vs-all loop and the orchestrator.
pub trait KgeModel: TailScorer {
    /// Mean binary cross-entropy of [`TailScorer::forward_head_batch`] against
    /// dense `[batch, num_entities]` targets.
    fn forward_head_and_loss(
        &self,
        heads: &Tensor,
        relations: &Tensor,
        targets: &Tensor,
    ) -> Result<Tensor>;

    /// All trainable variables.
    fn vars(&self) -> Vec<Var>;

    /// Total number of scalar parameters.
    fn num_params(&self) -> usize {
        self.vars().iter().map(|v| v.as_tensor().elem_count()).sum()
    }

    fn name(&self) -> &'static str;

    /// Toggle dropout and batch-norm statistics updates.
    fn set_training(&mut self, training: bool);

    /// Entity embeddings, components concatenated: `[num_entities, k * dim]`.
    fn entity_embeddings(&self) -> Result<Tensor>;

    /// Relation embeddings, components concatenated: `[num_relations, k * dim]`.
    fn relation_embeddings(&self) -> Result<Tensor>;

    /// Write parameters as safetensors.
    fn save(&self, path: &Path) -> Result<()>;

    /// Overwrite parameters from a safetensors checkpoint.
    fn load(&mut self, path: &Path) -> Result<()>;
}

// ============================================================================
// Model
// ============================================================================

/// Closed set of trainable models.
pub enum Model {
    QMult(MultModel),
    OMult(MultModel),
    ConvQ(ConvModel),
    ConvO(ConvModel),
}

/// Sizes of the vocabularies a model is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabSizes {
    pub num_entities: usize,
    pub num_relations: usize,
}

impl Model {
    /// Build and initialize a model; embeddings are drawn from `rng`.
    pub fn new(
        kind: ModelKind,
        config: &ModelConfig,
        sizes: VocabSizes,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<Self> {
        config.validate()?;
        let algebra = kind.algebra();
        Ok(match kind {
            ModelKind::QMult => Self::QMult(MultModel::new(algebra, config, sizes, device, rng)?),
            ModelKind::OMult => Self::OMult(MultModel::new(algebra, config, sizes, device, rng)?),
            ModelKind::ConvQ => Self::ConvQ(ConvModel::new(algebra, config, sizes, device, rng)?),
            ModelKind::ConvO => Self::ConvO(ConvModel::new(algebra, config, sizes, device, rng)?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::QMult(_) => ModelKind::QMult,
            Self::OMult(_) => ModelKind::OMult,
            Self::ConvQ(_) => ModelKind::ConvQ,
            Self::ConvO(_) => ModelKind::ConvO,
        }
    }

    fn inner(&self) -> &dyn KgeModel {
        match self {
            Self::QMult(m) | Self::OMult(m) => m as &dyn KgeModel,
            Self::ConvQ(m) | Self::ConvO(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn KgeModel {
        match self {
            Self::QMult(m) | Self::OMult(m) => m as &mut dyn KgeModel,
            Self::ConvQ(m) | Self::ConvO(m) => m,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.kind())
            .field("num_params", &self.num_params())
            .finish()
    }
}

impl TailScorer for Model {
    fn forward_head_batch(&self, heads: &Tensor, relations: &Tensor) -> Result<Tensor> {
        self.inner().forward_head_batch(heads, relations)
    }

    fn device(&self) -> &Device {
        self.inner().device()
    }
}

impl KgeModel for Model {
    fn forward_head_and_loss(
        &self,
        heads: &Tensor,
        relations: &Tensor,
        targets: &Tensor,
    ) -> Result<Tensor> {
        self.inner().forward_head_and_loss(heads, relations, targets)
    }

    fn vars(&self) -> Vec<Var> {
        self.inner().vars()
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn set_training(&mut self, training: bool) {
        self.inner_mut().set_training(training)
    }

    fn entity_embeddings(&self) -> Result<Tensor> {
        self.inner().entity_embeddings()
    }

    fn relation_embeddings(&self) -> Result<Tensor> {
        self.inner().relation_embeddings()
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.inner().save(path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.inner_mut().load(path)
    }
}

/// Mean binary cross-entropy between probabilities and targets.
pub fn binary_cross_entropy(probs: &Tensor, targets: &Tensor) -> Result<Tensor> {
    const EPS: f32 = 1e-7;
    let probs = probs.clamp(EPS, 1.0 - EPS)?;
    let positive = targets.mul(&probs.log()?)?;
    let negative = targets
        .affine(-1.0, 1.0)?
        .mul(&probs.affine(-1.0, 1.0)?.log()?)?;
    Ok(positive.add(&negative)?.neg()?.mean_all()?)
}

/// Dropout that is the identity outside training or for `p == 0`.
pub(crate) fn dropout(xs: &Tensor, p: f32, training: bool) -> Result<Tensor> {
    if !training || p <= 0.0 {
        return Ok(xs.clone());
    }
    Ok(candle_nn::ops::dropout(xs, p)?)
}
