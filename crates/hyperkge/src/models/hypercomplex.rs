//! Component-wise embedding tables shared by all hypercomplex models.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::algebra::{self, Octonion, Quaternion};
use crate::error::{Error, Result};

use super::VocabSizes;

/// Number system an embedding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algebra {
    Quaternion,
    Octonion,
}

impl Algebra {
    /// Number of real components per number.
    pub fn components(self) -> usize {
        match self {
            Self::Quaternion => 4,
            Self::Octonion => 8,
        }
    }

    /// Hypercomplex product `a ⊗ b`.
    pub fn product(self, a: &[Tensor], b: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(match self {
            Self::Quaternion => algebra::quaternion_mul(as_array(a)?, as_array(b)?)?.to_vec(),
            Self::Octonion => algebra::octonion_mul(as_array(a)?, as_array(b)?)?.to_vec(),
        })
    }

    /// Scale every number to unit norm.
    pub fn normalize(self, a: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(match self {
            Self::Quaternion => {
                let q: &Quaternion = as_array(a)?;
                algebra::quaternion_normalize(q)?.to_vec()
            }
            Self::Octonion => {
                let o: &Octonion = as_array(a)?;
                algebra::octonion_normalize(o)?.to_vec()
            }
        })
    }
}

fn as_array<const N: usize>(components: &[Tensor]) -> Result<&[Tensor; N]> {
    components.try_into().map_err(|_| {
        Error::InvalidConfig(format!(
            "expected {N} components, got {}",
            components.len()
        ))
    })
}

/// Per-component entity and relation tables, backed by variables of a
/// [`VarMap`].
pub(crate) struct ComponentEmbeddings {
    algebra: Algebra,
    entities: Vec<Tensor>,
    relations: Vec<Tensor>,
}

impl ComponentEmbeddings {
    /// Register `ent_<c>` / `rel_<c>` variables and fill them with
    /// Xavier-normal samples drawn from `rng`.
    pub(crate) fn new(
        algebra: Algebra,
        varmap: &mut VarMap,
        sizes: VocabSizes,
        dim: usize,
        device: &Device,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let mut entities = Vec::with_capacity(algebra.components());
        let mut relations = Vec::with_capacity(algebra.components());
        for c in 0..algebra.components() {
            entities.push(seeded_table(varmap, &format!("ent_{c}"), sizes.num_entities, dim, device, rng)?);
            relations.push(seeded_table(varmap, &format!("rel_{c}"), sizes.num_relations, dim, device, rng)?);
        }
        Ok(Self {
            algebra,
            entities,
            relations,
        })
    }

    pub(crate) fn algebra(&self) -> Algebra {
        self.algebra
    }

    /// Head embeddings for a `[batch]` index tensor, one `[batch, dim]` per component.
    pub(crate) fn lookup_entities(&self, idx: &Tensor) -> Result<Vec<Tensor>> {
        lookup(&self.entities, idx)
    }

    pub(crate) fn lookup_relations(&self, idx: &Tensor) -> Result<Vec<Tensor>> {
        lookup(&self.relations, idx)
    }

    /// `Σ_c x_c · E_cᵀ`: raw scores of shape `[batch, num_entities]`.
    pub(crate) fn score_all_tails(&self, x: &[Tensor]) -> Result<Tensor> {
        let mut acc: Option<Tensor> = None;
        for (xc, ec) in x.iter().zip(&self.entities) {
            let s = xc.matmul(&ec.t()?)?;
            acc = Some(match acc {
                Some(a) => a.add(&s)?,
                None => s,
            });
        }
        acc.ok_or_else(|| Error::InvalidConfig("no embedding components".into()))
    }

    pub(crate) fn entity_matrix(&self) -> Result<Tensor> {
        Ok(Tensor::cat(&self.entities, 1)?)
    }

    pub(crate) fn relation_matrix(&self) -> Result<Tensor> {
        Ok(Tensor::cat(&self.relations, 1)?)
    }
}

fn lookup(table: &[Tensor], idx: &Tensor) -> Result<Vec<Tensor>> {
    table
        .iter()
        .map(|t| t.index_select(idx, 0).map_err(Error::from))
        .collect()
}

fn seeded_table(
    varmap: &mut VarMap,
    name: &str,
    rows: usize,
    dim: usize,
    device: &Device,
    rng: &mut StdRng,
) -> Result<Tensor> {
    let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
    let table = vb.get_with_hints((rows, dim), name, Init::Const(0.0))?;

    let std = (2.0 / (rows + dim) as f64).sqrt() as f32;
    let normal = Normal::new(0.0f32, std)
        .map_err(|e| Error::InvalidConfig(format!("embedding init: {e}")))?;
    let values: Vec<f32> = (0..rows * dim).map(|_| normal.sample(rng)).collect();
    varmap.set_one(name, Tensor::from_vec(values, (rows, dim), device)?)?;

    Ok(table)
}
