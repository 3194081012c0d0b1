//! ConvQ / ConvO: a convolution over the stacked head and relation
//! components gates the hypercomplex product before scoring.
//!
//! ```text
//! [h_0..h_k, r_0..r_k]  --stack-->  [b, 1, 2k, d]
//!   --conv2d--> bn --relu--> dropout --flatten--> linear --> bn --relu
//!   --chunk k-->  c_0..c_k
//! score = σ(Σ_i ⟨c_i ∘ (h ⊗ r)_i, t_i⟩)
//! ```

use std::path::Path;

use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder, VarMap,
};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};

use super::hypercomplex::{Algebra, ComponentEmbeddings};
use super::{binary_cross_entropy, dropout, KgeModel, ModelConfig, TailScorer, VocabSizes};
use crate::error::{Error, Result};

const PADDING: usize = 1;

/// Convolutional hypercomplex model.
pub struct ConvModel {
    varmap: VarMap,
    embeddings: ComponentEmbeddings,
    conv: Conv2d,
    bn_conv: BatchNorm,
    fc: Linear,
    bn_fc: BatchNorm,
    config: ModelConfig,
    device: Device,
    training: bool,
}

impl ConvModel {
    pub fn new(
        algebra: Algebra,
        config: &ModelConfig,
        sizes: VocabSizes,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let k = algebra.components();
        let dim = config.embedding_dim;
        let (out_h, out_w) = conv_output_size(2 * k, dim, config.kernel_size)?;
        if config.num_of_output_channels == 0 {
            return Err(Error::InvalidConfig("num_of_output_channels must be > 0".into()));
        }

        let mut varmap = VarMap::new();
        let embeddings = ComponentEmbeddings::new(algebra, &mut varmap, sizes, dim, device, rng)?;

        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let channels = config.num_of_output_channels;
        let conv_cfg = Conv2dConfig {
            padding: PADDING,
            ..Default::default()
        };
        let conv = candle_nn::conv2d(1, channels, config.kernel_size, conv_cfg, vb.pp("conv"))?;
        let bn_conv = candle_nn::batch_norm(channels, BatchNormConfig::default(), vb.pp("bn_conv"))?;
        let flat = channels * out_h * out_w;
        let fc = candle_nn::linear(flat, k * dim, vb.pp("fc"))?;
        let bn_fc = candle_nn::batch_norm(k * dim, BatchNormConfig::default(), vb.pp("bn_fc"))?;

        let fan_in_conv = config.kernel_size * config.kernel_size;
        let conv_shape = (channels, 1, config.kernel_size, config.kernel_size);
        seed_uniform(&mut varmap, "conv.weight", conv_shape, fan_in_conv, device, rng)?;
        seed_uniform(&mut varmap, "conv.bias", channels, fan_in_conv, device, rng)?;
        seed_uniform(&mut varmap, "fc.weight", (k * dim, flat), flat, device, rng)?;
        seed_uniform(&mut varmap, "fc.bias", k * dim, flat, device, rng)?;

        Ok(Self {
            varmap,
            embeddings,
            conv,
            bn_conv,
            fc,
            bn_fc,
            config: config.clone(),
            device: device.clone(),
            training: true,
        })
    }

    /// Gating components `c_0..c_k`, each `[batch, dim]`.
    fn residual_convolution(&self, h: &[Tensor], r: &[Tensor]) -> Result<Vec<Tensor>> {
        let stacked: Vec<Tensor> = h.iter().chain(r).cloned().collect();
        let x = Tensor::stack(&stacked, 1)?.unsqueeze(1)?;

        let x = self.conv.forward(&x)?;
        let x = self.bn_conv.forward_t(&x, self.training)?.relu()?;
        let x = dropout(&x, self.config.feature_map_dropout, self.training)?;
        let x = x.flatten_from(1)?;

        let x = self.fc.forward(&x)?;
        let x = self.bn_fc.forward_t(&x, self.training)?.relu()?;
        Ok(x.chunk(h.len(), 1)?)
    }
}

fn conv_output_size(height: usize, width: usize, kernel: usize) -> Result<(usize, usize)> {
    let out = |n: usize| (n + 2 * PADDING + 1).checked_sub(kernel).filter(|&o| o > 0);
    match (kernel, out(height), out(width)) {
        (k, Some(h), Some(w)) if k > 0 => Ok((h, w)),
        _ => Err(Error::InvalidConfig(format!(
            "kernel_size {kernel} does not fit a {height}x{width} input"
        ))),
    }
}

fn is_running_stat(name: &str) -> bool {
    name.ends_with(".running_mean") || name.ends_with(".running_var")
}

/// PyTorch-style `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` drawn from `rng`.
fn seed_uniform<S: Into<Shape>>(
    varmap: &mut VarMap,
    name: &str,
    shape: S,
    fan_in: usize,
    device: &Device,
    rng: &mut StdRng,
) -> Result<()> {
    let shape = shape.into();
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let uniform = Uniform::new_inclusive(-bound, bound)
        .map_err(|e| Error::InvalidConfig(format!("{name} init: {e}")))?;
    let values: Vec<f32> = (0..shape.elem_count()).map(|_| uniform.sample(rng)).collect();
    varmap.set_one(name, Tensor::from_vec(values, shape, device)?)?;
    Ok(())
}

impl TailScorer for ConvModel {
    fn forward_head_batch(&self, heads: &Tensor, relations: &Tensor) -> Result<Tensor> {
        let algebra = self.embeddings.algebra();
        let p = self.config.input_dropout;
        let h: Vec<Tensor> = self
            .embeddings
            .lookup_entities(heads)?
            .iter()
            .map(|x| dropout(x, p, self.training))
            .collect::<Result<_>>()?;
        let mut r: Vec<Tensor> = self
            .embeddings
            .lookup_relations(relations)?
            .iter()
            .map(|x| dropout(x, p, self.training))
            .collect::<Result<_>>()?;
        if self.config.norm_flag {
            r = algebra.normalize(&r)?;
        }

        let gates = self.residual_convolution(&h, &r)?;
        let gated: Vec<Tensor> = algebra
            .product(&h, &r)?
            .iter()
            .zip(&gates)
            .map(|(x, g)| {
                let x = x.mul(g)?;
                dropout(&x, self.config.hidden_dropout, self.training)
            })
            .collect::<Result<_>>()?;

        Ok(candle_nn::ops::sigmoid(&self.embeddings.score_all_tails(&gated)?)?)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl KgeModel for ConvModel {
    fn forward_head_and_loss(
        &self,
        heads: &Tensor,
        relations: &Tensor,
        targets: &Tensor,
    ) -> Result<Tensor> {
        binary_cross_entropy(&self.forward_head_batch(heads, relations)?, targets)
    }

    /// Trainable variables; batch-norm running statistics are excluded.
    fn vars(&self) -> Vec<Var> {
        let data = self.varmap.data().lock().unwrap_or_else(|e| e.into_inner());
        data.iter()
            .filter(|(name, _)| !is_running_stat(name))
            .map(|(_, var)| var.clone())
            .collect()
    }

    fn name(&self) -> &'static str {
        match self.embeddings.algebra() {
            Algebra::Quaternion => "ConvQ",
            Algebra::Octonion => "ConvO",
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

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sizes() -> VocabSizes {
        VocabSizes {
            num_entities: 6,
            num_relations: 2,
        }
    }

    #[test]
    fn test_conv_output_size() {
        assert_eq!(conv_output_size(8, 4, 3).unwrap(), (8, 4));
        assert_eq!(conv_output_size(8, 4, 1).unwrap(), (10, 6));
        assert!(conv_output_size(8, 1, 4).is_err());
        assert!(conv_output_size(8, 4, 0).is_err());
    }

    #[test]
    fn test_param_count_excludes_running_stats() {
        let config = ModelConfig::default().with_embedding_dim(4).with_conv(2, 3);
        let sizes = VocabSizes {
            num_entities: 5,
            num_relations: 2,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let m = ConvModel::new(Algebra::Quaternion, &config, sizes, &Device::Cpu, &mut rng).unwrap();

        // embeddings 7*4*4, conv 2*9+2, bn 2*2, fc 64*16+16, bn 2*16
        assert_eq!(m.num_params(), 112 + 20 + 4 + 1040 + 32);
        assert_eq!(m.vars().len() + 4, m.varmap.all_vars().len());
        assert!(is_running_stat("bn_fc.running_var"));
        assert!(!is_running_stat("bn_fc.weight"));
    }

    #[test]
    fn test_oversized_kernel_rejected() {
        let config = ModelConfig::default().with_embedding_dim(1).with_conv(2, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let res = ConvModel::new(Algebra::Quaternion, &config, sizes(), &Device::Cpu, &mut rng);
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_same_seed_same_scores() {
        let config = ModelConfig::default().with_embedding_dim(3).with_conv(2, 3);
        let heads = Tensor::new(&[0u32, 4], &Device::Cpu).unwrap();
        let rels = Tensor::new(&[1u32, 0], &Device::Cpu).unwrap();
        let score = || {
            let mut rng = StdRng::seed_from_u64(5);
            let mut m =
                ConvModel::new(Algebra::Octonion, &config, sizes(), &Device::Cpu, &mut rng).unwrap();
            m.set_training(false);
            m.forward_head_batch(&heads, &rels).unwrap().to_vec2::<f32>().unwrap()
        };
        assert_eq!(score(), score());
    }

    #[test]
    fn test_training_mode_loss_is_finite() {
        let config = ModelConfig::default().with_embedding_dim(2).with_conv(3, 3);
        let mut rng = StdRng::seed_from_u64(9);
        let m = ConvModel::new(Algebra::Quaternion, &config, sizes(), &Device::Cpu, &mut rng).unwrap();
        let heads = Tensor::new(&[0u32, 1, 2], &Device::Cpu).unwrap();
        let rels = Tensor::new(&[0u32, 1, 1], &Device::Cpu).unwrap();
        let targets = Tensor::zeros((3, 6), DType::F32, &Device::Cpu).unwrap();
        let loss = m
            .forward_head_and_loss(&heads, &rels, &targets)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.is_finite());
    }
}
