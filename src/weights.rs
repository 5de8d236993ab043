//! Weight matrices sharing a mask's sparsity pattern.
//!
//! Weights are drawn separately from topology, so the same mask can be
//! re-weighted any number of times ("same topology, new weights").

use rand::distributions::Uniform;
use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};

use crate::config::{WeightDistribution, WeightParams};
use crate::error::{LayoutError, Result};
use crate::mask::Mask;
use crate::population::{Block, Population};

/// Real-valued sparse matrix. `values[i]` belongs to the mask's i-th stored
/// entry; every position off the pattern is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightMatrix {
    mask: Mask,
    values: Vec<f32>,
}

impl WeightMatrix {
    /// Pair a mask with one value per stored entry.
    pub fn from_parts(mask: Mask, values: Vec<f32>) -> std::result::Result<Self, String> {
        if values.len() != mask.nnz() {
            return Err(format!("{} values for {} mask entries", values.len(), mask.nnz()));
        }
        Ok(Self { mask, values })
    }

    /// Keep only the entries of a dense row-major `rows × cols` matrix that
    /// lie on `mask`. Used to bring trained weights back onto a known pattern.
    pub fn from_dense_masked(block: Block, mask: &Mask, dense: &[Vec<f32>]) -> Result<Self> {
        if dense.len() != mask.rows() || dense.iter().any(|row| row.len() != mask.cols()) {
            return Err(LayoutError::PatternMismatch {
                block,
                reason: format!("dense matrix is not {}x{}", mask.rows(), mask.cols()),
            });
        }
        let values = mask.iter().map(|(r, c)| dense[r][c]).collect();
        Ok(Self { mask: mask.clone(), values })
    }

    #[inline]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Values aligned with the mask's stored entries.
    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.mask.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.mask.cols()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row >= self.rows() || col >= self.cols() {
            return 0.0;
        }
        let range = self.mask.column_range(col);
        match self.mask.column(col).binary_search(&(row as u32)) {
            Ok(i) => self.values[range.start + i],
            Err(_) => 0.0,
        }
    }

    /// Values of target column `col`, aligned with `mask().column(col)`.
    #[inline]
    pub fn column_values(&self, col: usize) -> &[f32] {
        &self.values[self.mask.column_range(col)]
    }

    /// `(row, col, value)` for every entry whose value is not zero, column-major.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.mask
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| **v != 0.0)
            .map(|((r, c), &v)| (r, c, v))
    }

    pub fn nnz_nonzero(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0.0).count()
    }

    /// Mean absolute value over stored entries (0 when there are none).
    pub fn mean_abs(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| v.abs() as f64).sum::<f64>() as f32 / self.values.len() as f32
    }

    /// Dense `rows × cols` copy, row-major.
    pub fn to_dense(&self) -> Vec<Vec<f32>> {
        let mut dense = vec![vec![0.0f32; self.cols()]; self.rows()];
        for ((r, c), &v) in self.mask.iter().zip(self.values.iter()) {
            dense[r][c] = v;
        }
        dense
    }
}

/// Magnitude sampler built from a validated [`WeightDistribution`].
enum Sampler {
    Constant(f32),
    Uniform(Uniform<f32>),
    LogNormal(LogNormal<f32>),
    HalfNormal(Normal<f32>),
}

impl Sampler {
    fn new(dist: &WeightDistribution) -> std::result::Result<Self, String> {
        dist.check()?;
        Ok(match *dist {
            WeightDistribution::Constant { value } => Self::Constant(value),
            WeightDistribution::Uniform { low, high } => Self::Uniform(Uniform::new_inclusive(low, high)),
            WeightDistribution::LogNormal { mu, sigma } => {
                Self::LogNormal(LogNormal::new(mu, sigma).map_err(|e| e.to_string())?)
            }
            WeightDistribution::HalfNormal { sigma } => {
                Self::HalfNormal(Normal::new(0.0, sigma).map_err(|e| e.to_string())?)
            }
        })
    }

    #[inline]
    fn magnitude<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match self {
            Self::Constant(v) => *v,
            Self::Uniform(d) => d.sample(rng),
            Self::LogNormal(d) => d.sample(rng),
            Self::HalfNormal(d) => d.sample(rng).abs(),
        }
    }
}

/// Draw one magnitude per mask entry and apply `sign` (+1 excitatory,
/// −1 inhibitory). Entries are drawn in column-major order.
pub fn generate_weights<R: Rng + ?Sized>(
    block: Block,
    mask: &Mask,
    distribution: &WeightDistribution,
    sign: f32,
    rng: &mut R,
) -> Result<WeightMatrix> {
    generate_scaled(block, mask, distribution, sign, rng)
}

/// Draw a block's weights using its configured distribution, coefficient
/// and Dale's-law sign.
pub fn generate_block_weights<R: Rng + ?Sized>(
    block: Block,
    mask: &Mask,
    params: &WeightParams,
    rng: &mut R,
) -> Result<WeightMatrix> {
    let coefficient = match block.source() {
        Population::Excitatory => params.ex_coefficient,
        Population::Inhibitory => params.in_coefficient,
    };
    if !coefficient.is_finite() || coefficient < 0.0 {
        return Err(LayoutError::InvalidDistribution {
            block,
            reason: format!("coefficient must be finite and >= 0, got {coefficient}"),
        });
    }
    generate_scaled(block, mask, &params.distributions[block], block.sign() * coefficient, rng)
}

fn generate_scaled<R: Rng + ?Sized>(
    block: Block,
    mask: &Mask,
    distribution: &WeightDistribution,
    scale: f32,
    rng: &mut R,
) -> Result<WeightMatrix> {
    let values = draw_values(mask, distribution, scale, rng)
        .map_err(|reason| LayoutError::InvalidDistribution { block, reason })?;
    Ok(WeightMatrix { mask: mask.clone(), values })
}

/// One `magnitude * scale` per mask entry, column-major.
pub(crate) fn draw_values<R: Rng + ?Sized>(
    mask: &Mask,
    distribution: &WeightDistribution,
    scale: f32,
    rng: &mut R,
) -> std::result::Result<Vec<f32>, String> {
    let sampler = Sampler::new(distribution)?;
    Ok((0..mask.nnz()).map(|_| sampler.magnitude(rng) * scale).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::generate_mask;
    use crate::population::BlockSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn mask() -> Mask {
        generate_mask(40, 30, 5, false, &mut seeded_rng()).unwrap()
    }

    #[test]
    fn weights_follow_mask_pattern() {
        let mask = mask();
        let w = generate_weights(Block::ExEx, &mask, &WeightDistribution::default(), 1.0, &mut seeded_rng())
            .unwrap();
        assert_eq!(w.values().len(), mask.nnz());
        for r in 0..mask.rows() {
            for c in 0..mask.cols() {
                if mask.contains(r, c) {
                    assert!(w.get(r, c) > 0.0);
                } else {
                    assert_eq!(w.get(r, c), 0.0);
                }
            }
        }
    }

    #[test]
    fn inhibitory_sign_is_non_positive() {
        let dist = WeightDistribution::HalfNormal { sigma: 1.0 };
        let w = generate_weights(Block::InEx, &mask(), &dist, -1.0, &mut seeded_rng()).unwrap();
        assert!(w.values().iter().all(|&v| v <= 0.0));
    }

    #[test]
    fn block_weights_apply_coefficient_and_sign() {
        let params = WeightParams {
            distributions: BlockSet::from_fn(|_| WeightDistribution::Constant { value: 0.5 }),
            ex_coefficient: 2.0,
            in_coefficient: 3.0,
        };
        let m = mask();
        let ex = generate_block_weights(Block::ExIn, &m, &params, &mut seeded_rng()).unwrap();
        let inh = generate_block_weights(Block::InIn, &m, &params, &mut seeded_rng()).unwrap();
        assert!(ex.values().iter().all(|&v| v == 1.0));
        assert!(inh.values().iter().all(|&v| v == -1.5));
    }

    #[test]
    fn same_seed_same_weights() {
        let m = mask();
        let dist = WeightDistribution::LogNormal { mu: -1.0, sigma: 0.3 };
        let a = generate_weights(Block::ExEx, &m, &dist, 1.0, &mut seeded_rng()).unwrap();
        let b = generate_weights(Block::ExEx, &m, &dist, 1.0, &mut seeded_rng()).unwrap();
        let c = generate_weights(Block::ExEx, &m, &dist, 1.0, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.values(), c.values());
        assert_eq!(a.mask(), c.mask());
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let dist = WeightDistribution::Uniform { low: 0.2, high: 0.4 };
        let w = generate_weights(Block::ExEx, &mask(), &dist, 1.0, &mut seeded_rng()).unwrap();
        assert!(w.values().iter().all(|&v| (0.2..=0.4).contains(&v)));
    }

    #[test]
    fn invalid_distribution_is_rejected() {
        let dist = WeightDistribution::Uniform { low: 1.0, high: 0.0 };
        let err = generate_weights(Block::InIn, &mask(), &dist, -1.0, &mut seeded_rng()).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidDistribution { block: Block::InIn, .. }));
    }

    #[test]
    fn oversized_uniform_span_is_rejected() {
        let dist = WeightDistribution::Uniform { low: 0.0, high: f32::MAX };
        let err = generate_weights(Block::ExIn, &mask(), &dist, 1.0, &mut seeded_rng()).unwrap_err();
        assert!(matches!(err, LayoutError::InvalidDistribution { block: Block::ExIn, .. }));
    }

    #[test]
    fn empty_mask_gives_empty_weights() {
        let m = Mask::empty(10, 10);
        let w = generate_weights(Block::ExEx, &m, &WeightDistribution::default(), 1.0, &mut seeded_rng()).unwrap();
        assert_eq!(w.nnz_nonzero(), 0);
        assert_eq!(w.mean_abs(), 0.0);
    }

    #[test]
    fn dense_masked_round_trip() {
        let m = mask();
        let w = generate_weights(Block::ExEx, &m, &WeightDistribution::default(), 1.0, &mut seeded_rng()).unwrap();
        let mut dense = w.to_dense();
        // Row 0 is perturbed; every other entry comes back unchanged
        dense[0].iter_mut().for_each(|v| *v += 100.0);
        let back = WeightMatrix::from_dense_masked(Block::ExEx, &m, &dense).unwrap();
        for (r, c) in m.iter() {
            if r != 0 {
                assert_eq!(back.get(r, c), w.get(r, c));
            }
        }
        assert_eq!(back.mask(), &m);
    }

    #[test]
    fn dense_masked_rejects_wrong_shape() {
        let m = mask();
        let err = WeightMatrix::from_dense_masked(Block::ExIn, &m, &vec![vec![0.0; 3]; 3]).unwrap_err();
        assert!(matches!(err, LayoutError::PatternMismatch { block: Block::ExIn, .. }));
    }

    #[test]
    fn nonzero_skips_explicit_zeros() {
        let m = Mask::from_columns(3, vec![vec![0, 1], vec![2]]).unwrap();
        let w = WeightMatrix::from_parts(m, vec![0.5, 0.0, -0.25]).unwrap();
        let nz: Vec<_> = w.nonzero().collect();
        assert_eq!(nz, vec![(0, 0, 0.5), (2, 1, -0.25)]);
        assert_eq!(w.column_values(0), &[0.5, 0.0]);
    }
}
