//! Connectivity masks: fixed in-degree boolean patterns in CSC storage.
//!
//! A mask covers one block: rows are source neurons, columns are target
//! neurons. Every column holds exactly `in_degree` entries, so storage is
//! compressed by column: the sources of target `j` are
//! `row_idx[col_ptr[j]..col_ptr[j+1]]`, sorted ascending.

use rand::seq::index;
use rand::Rng;

use crate::error::{LayoutError, Result};

/// Boolean sparse matrix over (source, target) pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    rows: usize,
    cols: usize,
    /// Start of each column in `row_idx`. Length = cols + 1.
    col_ptr: Vec<usize>,
    /// Source indices, grouped by target column.
    row_idx: Vec<u32>,
}

impl Mask {
    /// Mask with no connections.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            col_ptr: vec![0; cols + 1],
            row_idx: Vec::new(),
        }
    }

    /// Build from per-column source lists. Each list must be strictly
    /// ascending and inside `0..rows`.
    pub fn from_columns(rows: usize, columns: Vec<Vec<u32>>) -> std::result::Result<Self, String> {
        let cols = columns.len();
        let mut col_ptr = Vec::with_capacity(cols + 1);
        col_ptr.push(0);
        let mut row_idx = Vec::with_capacity(columns.iter().map(Vec::len).sum());
        for column in columns {
            row_idx.extend(column);
            col_ptr.push(row_idx.len());
        }
        Self::from_raw_parts(rows, cols, col_ptr, row_idx)
    }

    /// Build from raw CSC arrays, checking every structural invariant.
    pub fn from_raw_parts(
        rows: usize,
        cols: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<u32>,
    ) -> std::result::Result<Self, String> {
        if col_ptr.len() != cols + 1 {
            return Err(format!("col_ptr has {} entries, expected {}", col_ptr.len(), cols + 1));
        }
        if col_ptr[0] != 0 || col_ptr[cols] != row_idx.len() {
            return Err(format!(
                "col_ptr must span 0..{}, got {}..{}",
                row_idx.len(),
                col_ptr[0],
                col_ptr[cols]
            ));
        }
        for j in 0..cols {
            let (start, end) = (col_ptr[j], col_ptr[j + 1]);
            if start > end || end > row_idx.len() {
                return Err(format!("col_ptr is not monotone at column {j}"));
            }
            let column = &row_idx[start..end];
            if let Some(&r) = column.iter().find(|&&r| r as usize >= rows) {
                return Err(format!("row {r} out of range in column {j} (rows = {rows})"));
            }
            if column.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("column {j} is not strictly ascending"));
            }
        }
        Ok(Self { rows, cols, col_ptr, row_idx })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of true entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    /// Sources connected to target `col`, ascending.
    #[inline]
    pub fn column(&self, col: usize) -> &[u32] {
        &self.row_idx[self.col_ptr[col]..self.col_ptr[col + 1]]
    }

    /// Range of stored entries belonging to `col`.
    #[inline]
    pub(crate) fn column_range(&self, col: usize) -> std::ops::Range<usize> {
        self.col_ptr[col]..self.col_ptr[col + 1]
    }

    #[inline]
    pub fn in_degree(&self, col: usize) -> usize {
        self.col_ptr[col + 1] - self.col_ptr[col]
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        self.column(col).binary_search(&(row as u32)).is_ok()
    }

    /// All `(row, col)` entries, column-major.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.cols).flat_map(move |c| self.column(c).iter().map(move |&r| (r as usize, c)))
    }

    /// Outgoing connection count per source row.
    pub fn out_degrees(&self) -> Vec<usize> {
        let mut out = vec![0usize; self.rows];
        for &r in &self.row_idx {
            out[r as usize] += 1;
        }
        out
    }

    /// Dense `rows × cols` copy, row-major.
    pub fn to_dense(&self) -> Vec<Vec<bool>> {
        let mut dense = vec![vec![false; self.cols]; self.rows];
        for (r, c) in self.iter() {
            dense[r][c] = true;
        }
        dense
    }

    #[inline]
    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    #[inline]
    pub fn row_indices(&self) -> &[u32] {
        &self.row_idx
    }
}

/// Draw a fixed in-degree mask.
///
/// For every target column, `in_degree` distinct sources are sampled without
/// replacement from `0..rows`. With `exclude_self`, column `j` never samples
/// row `j`. Identical RNG state and arguments produce an identical mask.
pub fn generate_mask<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    in_degree: usize,
    exclude_self: bool,
    rng: &mut R,
) -> Result<Mask> {
    let available = if exclude_self { rows.saturating_sub(1) } else { rows };
    if in_degree > available {
        return Err(LayoutError::InfeasibleDegree { requested: in_degree, available });
    }
    if in_degree == 0 {
        return Ok(Mask::empty(rows, cols));
    }

    let mut col_ptr = Vec::with_capacity(cols + 1);
    col_ptr.push(0);
    let mut row_idx: Vec<u32> = Vec::with_capacity(cols * in_degree);

    for col in 0..cols {
        let start = row_idx.len();
        if exclude_self && col < rows {
            // Sample from the rows-1 other sources, then skip over the diagonal
            for r in index::sample(rng, rows - 1, in_degree).into_iter() {
                let r = if r >= col { r + 1 } else { r };
                row_idx.push(r as u32);
            }
        } else {
            row_idx.extend(index::sample(rng, rows, in_degree).into_iter().map(|r| r as u32));
        }
        row_idx[start..].sort_unstable();
        col_ptr.push(row_idx.len());
    }

    Ok(Mask { rows, cols, col_ptr, row_idx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn fixed_in_degree_without_self_loops() {
        let mask = generate_mask(100, 100, 10, true, &mut seeded_rng()).unwrap();
        assert_eq!(mask.nnz(), 1000);
        for c in 0..100 {
            assert_eq!(mask.in_degree(c), 10);
            assert!(!mask.contains(c, c), "self-loop at {c}");
            assert!(mask.column(c).windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn cross_block_may_use_every_row() {
        let mask = generate_mask(5, 3, 5, false, &mut seeded_rng()).unwrap();
        for c in 0..3 {
            assert_eq!(mask.column(c), &[0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn full_recurrent_degree_is_everything_but_self() {
        let mask = generate_mask(4, 4, 3, true, &mut seeded_rng()).unwrap();
        assert_eq!(mask.column(0), &[1, 2, 3]);
        assert_eq!(mask.column(2), &[0, 1, 3]);
    }

    #[test]
    fn same_seed_same_mask() {
        let a = generate_mask(64, 48, 7, false, &mut seeded_rng()).unwrap();
        let b = generate_mask(64, 48, 7, false, &mut seeded_rng()).unwrap();
        let c = generate_mask(64, 48, 7, false, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_in_degree_is_disconnected() {
        let mask = generate_mask(10, 10, 0, true, &mut seeded_rng()).unwrap();
        assert_eq!(mask.nnz(), 0);
        assert_eq!(mask.cols(), 10);
        assert!((0..10).all(|c| mask.in_degree(c) == 0));
    }

    #[test]
    fn infeasible_degree() {
        let err = generate_mask(10, 10, 11, false, &mut seeded_rng()).unwrap_err();
        assert_eq!(err, LayoutError::InfeasibleDegree { requested: 11, available: 10 });

        let err = generate_mask(10, 10, 10, true, &mut seeded_rng()).unwrap_err();
        assert_eq!(err, LayoutError::InfeasibleDegree { requested: 10, available: 9 });
    }

    #[test]
    fn empty_source_population() {
        let mask = generate_mask(0, 20, 0, false, &mut seeded_rng()).unwrap();
        assert_eq!(mask.nnz(), 0);
        assert!(generate_mask(0, 20, 1, false, &mut seeded_rng()).is_err());
    }

    #[test]
    fn out_degrees_sum_to_nnz() {
        let mask = generate_mask(30, 40, 6, false, &mut seeded_rng()).unwrap();
        assert_eq!(mask.out_degrees().iter().sum::<usize>(), mask.nnz());
    }

    #[test]
    fn dense_view_matches_contains() {
        let mask = generate_mask(8, 6, 3, false, &mut seeded_rng()).unwrap();
        let dense = mask.to_dense();
        for r in 0..8 {
            for c in 0..6 {
                assert_eq!(dense[r][c], mask.contains(r, c));
            }
        }
    }

    #[test]
    fn raw_parts_reject_bad_structure() {
        assert!(Mask::from_columns(3, vec![vec![0, 2], vec![1]]).is_ok());
        assert!(Mask::from_columns(3, vec![vec![2, 0]]).is_err(), "unsorted");
        assert!(Mask::from_columns(3, vec![vec![1, 1]]).is_err(), "duplicate");
        assert!(Mask::from_columns(3, vec![vec![3]]).is_err(), "out of range");
        assert!(Mask::from_raw_parts(3, 2, vec![0, 1], vec![0]).is_err(), "short col_ptr");
    }
}
