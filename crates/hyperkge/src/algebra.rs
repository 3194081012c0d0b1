//! Hypercomplex arithmetic on component tensors.
//!
//! A batch of `d`-dimensional quaternion embeddings is four `[n, d]` tensors
//! (real, i, j, k); an octonion batch is eight. All operations act
//! elementwise across the embedding dimension, so position `p` of the
//! components forms one hypercomplex number.
//!
//! # Quaternions
//!
//! The Hamilton product is associative but not commutative:
//!
//! ```text
//! (a0 + a1 i + a2 j + a3 k)(b0 + b1 i + b2 j + b3 k)
//!   = (a0b0 - a1b1 - a2b2 - a3b3)
//!   + (a0b1 + a1b0 + a2b3 - a3b2) i
//!   + (a0b2 - a1b3 + a2b0 + a3b1) j
//!   + (a0b3 + a1b2 - a2b1 + a3b0) k
//! ```
//!
//! # Octonions
//!
//! Octonions are pairs of quaternions under the Cayley–Dickson product
//!
//! ```text
//! (a, b)(c, d) = (ac - conj(d) b, d a + b conj(c))
//! ```
//!
//! which is neither commutative nor associative, but keeps the norm
//! multiplicative: `|xy| = |x||y|`.

use candle_core::{Result, Tensor};

/// Four component tensors: real, i, j, k.
pub type Quaternion = [Tensor; 4];

/// Eight component tensors: real, e1..e7.
pub type Octonion = [Tensor; 8];

const NORM_EPS: f64 = 1e-12;

/// `±x0·y0 ± x1·y1 ± ...`; `true` is `+`.
fn signed_products(terms: &[(bool, &Tensor, &Tensor)]) -> Result<Tensor> {
    let (first_sign, x, y) = terms[0];
    let mut acc = x.mul(y)?;
    if !first_sign {
        acc = acc.neg()?;
    }
    for &(positive, x, y) in &terms[1..] {
        let p = x.mul(y)?;
        acc = if positive { acc.add(&p)? } else { acc.sub(&p)? };
    }
    Ok(acc)
}

/// Hamilton product `a ⊗ b`.
pub fn quaternion_mul(a: &Quaternion, b: &Quaternion) -> Result<Quaternion> {
    let [a0, a1, a2, a3] = a;
    let [b0, b1, b2, b3] = b;
    Ok([
        signed_products(&[(true, a0, b0), (false, a1, b1), (false, a2, b2), (false, a3, b3)])?,
        signed_products(&[(true, a0, b1), (true, a1, b0), (true, a2, b3), (false, a3, b2)])?,
        signed_products(&[(true, a0, b2), (false, a1, b3), (true, a2, b0), (true, a3, b1)])?,
        signed_products(&[(true, a0, b3), (true, a1, b2), (false, a2, b1), (true, a3, b0)])?,
    ])
}

/// Quaternion conjugate: negated imaginary parts.
pub fn quaternion_conj(q: &Quaternion) -> Result<Quaternion> {
    Ok([q[0].clone(), q[1].neg()?, q[2].neg()?, q[3].neg()?])
}

fn quaternion_add(a: &Quaternion, b: &Quaternion) -> Result<Quaternion> {
    Ok([
        a[0].add(&b[0])?,
        a[1].add(&b[1])?,
        a[2].add(&b[2])?,
        a[3].add(&b[3])?,
    ])
}

fn quaternion_sub(a: &Quaternion, b: &Quaternion) -> Result<Quaternion> {
    Ok([
        a[0].sub(&b[0])?,
        a[1].sub(&b[1])?,
        a[2].sub(&b[2])?,
        a[3].sub(&b[3])?,
    ])
}

fn split_octonion(o: &Octonion) -> (Quaternion, Quaternion) {
    let [x0, x1, x2, x3, x4, x5, x6, x7] = o.clone();
    ([x0, x1, x2, x3], [x4, x5, x6, x7])
}

/// Cayley–Dickson product `x ⊗ y` of two octonions.
pub fn octonion_mul(x: &Octonion, y: &Octonion) -> Result<Octonion> {
    let (a, b) = split_octonion(x);
    let (c, d) = split_octonion(y);

    let left = quaternion_sub(&quaternion_mul(&a, &c)?, &quaternion_mul(&quaternion_conj(&d)?, &b)?)?;
    let right = quaternion_add(&quaternion_mul(&d, &a)?, &quaternion_mul(&b, &quaternion_conj(&c)?)?)?;

    let [l0, l1, l2, l3] = left;
    let [r0, r1, r2, r3] = right;
    Ok([l0, l1, l2, l3, r0, r1, r2, r3])
}

/// Squared norm per embedding position.
pub fn squared_norm(components: &[Tensor]) -> Result<Tensor> {
    let mut acc = components[0].sqr()?;
    for c in &components[1..] {
        acc = acc.add(&c.sqr()?)?;
    }
    Ok(acc)
}

fn normalize<const N: usize>(components: &[Tensor; N]) -> Result<[Tensor; N]> {
    let denom = (squared_norm(components)? + NORM_EPS)?.sqrt()?;
    let mut out = components.clone();
    for c in out.iter_mut() {
        *c = c.div(&denom)?;
    }
    Ok(out)
}

/// Scale every quaternion to unit norm.
pub fn quaternion_normalize(q: &Quaternion) -> Result<Quaternion> {
    normalize(q)
}

/// Scale every octonion to unit norm.
pub fn octonion_normalize(o: &Octonion) -> Result<Octonion> {
    normalize(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn comps<const N: usize>(values: [[f32; 3]; N]) -> [Tensor; N] {
        values.map(|v| Tensor::from_slice(&v, (1, 3), &Device::Cpu).unwrap())
    }

    fn rows<const N: usize>(t: &[Tensor; N]) -> Vec<Vec<f32>> {
        t.iter().map(|c| c.flatten_all().unwrap().to_vec1::<f32>().unwrap()).collect()
    }

    fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>]) {
        for (x, y) in a.iter().flatten().zip(b.iter().flatten()) {
            assert!((x - y).abs() < 1e-4, "{x} != {y}");
        }
    }

    #[test]
    fn test_quaternion_basis_products() {
        // i * j = k, j * i = -k
        let i = comps([[0.0; 3], [1.0; 3], [0.0; 3], [0.0; 3]]);
        let j = comps([[0.0; 3], [0.0; 3], [1.0; 3], [0.0; 3]]);

        let ij = rows(&quaternion_mul(&i, &j).unwrap());
        assert_close(&ij, &[vec![0.0; 3], vec![0.0; 3], vec![0.0; 3], vec![1.0; 3]]);

        let ji = rows(&quaternion_mul(&j, &i).unwrap());
        assert_close(&ji, &[vec![0.0; 3], vec![0.0; 3], vec![0.0; 3], vec![-1.0; 3]]);
    }

    #[test]
    fn test_quaternion_identity() {
        let one = comps([[1.0; 3], [0.0; 3], [0.0; 3], [0.0; 3]]);
        let q = comps([[0.5, -1.0, 2.0], [1.5, 0.0, -0.5], [0.2, 0.3, 0.4], [-2.0, 1.0, 0.0]]);

        assert_close(&rows(&quaternion_mul(&one, &q).unwrap()), &rows(&q));
        assert_close(&rows(&quaternion_mul(&q, &one).unwrap()), &rows(&q));
    }

    #[test]
    fn test_octonion_norm_is_multiplicative() {
        let x = comps([
            [0.3, -1.0, 0.5],
            [1.2, 0.1, -0.4],
            [-0.7, 0.9, 0.2],
            [0.0, 0.3, 1.1],
            [0.5, -0.2, 0.6],
            [-1.3, 0.4, 0.0],
            [0.8, 0.8, -0.9],
            [0.1, -0.5, 0.3],
        ]);
        let y = comps([
            [1.0, 0.2, -0.3],
            [-0.4, 0.7, 0.9],
            [0.6, -1.1, 0.4],
            [0.2, 0.0, -0.8],
            [-0.9, 0.5, 0.1],
            [0.3, 1.4, -0.2],
            [0.0, -0.6, 0.7],
            [1.1, 0.3, 0.5],
        ]);

        let xy = octonion_mul(&x, &y).unwrap();
        let lhs = squared_norm(&xy).unwrap();
        let rhs = squared_norm(&x).unwrap().mul(&squared_norm(&y).unwrap()).unwrap();

        let lhs = lhs.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let rhs = rhs.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for (a, b) in lhs.iter().zip(&rhs) {
            assert!((a - b).abs() < 1e-3 * b.max(1.0), "{a} != {b}");
        }
    }

    #[test]
    fn test_octonion_restricts_to_quaternions() {
        // Octonions with zero upper half multiply like quaternions.
        let zero = [0.0f32; 3];
        let a = [[0.5, 1.0, -1.0], [0.2, 0.0, 1.0], [-0.3, 0.4, 0.0], [1.0, -0.5, 0.7]];
        let b = [[1.0, -0.2, 0.3], [0.0, 0.9, -0.4], [0.6, 0.1, 0.2], [-0.8, 0.0, 0.5]];

        let qa = comps(a);
        let qb = comps(b);
        let oa = comps([a[0], a[1], a[2], a[3], zero, zero, zero, zero]);
        let ob = comps([b[0], b[1], b[2], b[3], zero, zero, zero, zero]);

        let q = rows(&quaternion_mul(&qa, &qb).unwrap());
        let o = rows(&octonion_mul(&oa, &ob).unwrap());
        assert_close(&o[..4], &q);
        assert_close(&o[4..], &vec![vec![0.0; 3]; 4]);
    }

    #[test]
    fn test_normalize_gives_unit_norm() {
        let q = comps([[3.0, 1.0, 0.0], [4.0, 1.0, 2.0], [0.0, 1.0, 0.0], [0.0, 1.0, 0.0]]);
        let unit = quaternion_normalize(&q).unwrap();
        let norms = squared_norm(&unit).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for n in norms {
            assert!((n - 1.0).abs() < 1e-5);
        }
    }
}
