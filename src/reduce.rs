
// imports
use crate::error::{Error, Result};

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};


pub const DEFAULT_N_ITER: usize = 10;
const N_OVERSAMPLES: usize = 10;

/// rows with an euclidean norm below this are not normalized
pub const DEGENERATE_NORM: f64 = 1e-10;

// 0 would let nalgebra iterate without bound
const MAX_DECOMPOSITION_ITER: usize = 10_000;


#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    #[default]
    Randomized,
    Exact,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SvdSolver {
    /// randomized range finder with `n_iter` power iterations
    Randomized { n_iter: usize },
    /// full svd of the matrix, slow for large vocabularies
    Exact,
}

impl Default for SvdSolver {
    fn default() -> Self {
        SvdSolver::Randomized { n_iter: DEFAULT_N_ITER }
    }
}


/// Projects a matrix onto its top `rank` singular directions, returning
/// `U_k * Sigma_k` with one row per input row.
#[derive(Clone, Debug, PartialEq)]
pub struct TruncatedSvd {
    pub rank: usize,
    pub solver: SvdSolver,
    pub seed: u64,
}

impl TruncatedSvd {

    pub fn new(rank: usize) -> TruncatedSvd {
        Self { rank, solver: SvdSolver::default(), seed: 0 }
    }

    pub fn with_solver(mut self, solver: SvdSolver) -> TruncatedSvd {
        self.solver = solver;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> TruncatedSvd {
        self.seed = seed;
        self
    }

    pub fn fit_transform(&self, m: &Array2<f64>) -> Result<Array2<f64>> {

        let (rows, cols) = m.dim();
        if self.rank == 0 || self.rank > rows.min(cols) {
            return Err(Error::InvalidRank { rows, cols, rank: self.rank });
        }

        let mut reduced = match self.solver {
            SvdSolver::Exact => {
                let us = scaled_left_singular_vectors(to_dmatrix(m.view()), self.rank)?;
                to_array(&us)
            }
            SvdSolver::Randomized { n_iter } => self.randomized_us(m, n_iter)?,
        };
        flip_signs(&mut reduced);
        Ok(reduced)
    }

    fn randomized_us(&self, m: &Array2<f64>, n_iter: usize) -> Result<Array2<f64>> {

        let (rows, cols) = m.dim();
        let n_random = (self.rank + N_OVERSAMPLES).min(rows.min(cols));
        let mut rng = StdRng::seed_from_u64(self.seed);

        // range finder: Q spans (approximately) the column space of M
        let omega: Array2<f64> = Array2::random_using((cols, n_random), StandardNormal, &mut rng);
        let mut q = orthonormal_basis(&m.dot(&omega));
        for _ in 0..n_iter {
            let z = orthonormal_basis(&m.t().dot(&q));
            q = orthonormal_basis(&m.dot(&z));
        }

        // exact svd of the small projection B = Q^T M, lifted back with Q
        let b = q.t().dot(m);
        let us_b = scaled_left_singular_vectors(to_dmatrix(b.view()), self.rank)?;
        debug!("randomized svd with {} probes and {} power iterations", n_random, n_iter);
        Ok(q.dot(&to_array(&us_b)))
    }
}

/// Top `rank` columns of `U * Sigma`, largest singular value first.
fn scaled_left_singular_vectors(m: DMatrix<f64>, rank: usize) -> Result<DMatrix<f64>> {

    let svd = m
        .try_svd(true, false, f64::EPSILON, MAX_DECOMPOSITION_ITER)
        .ok_or(Error::NoConvergence("singular value decomposition"))?;
    let u = svd.u.ok_or(Error::NoConvergence("singular value decomposition"))?;

    let sigma = Array1::from_iter(svd.singular_values.iter().copied());
    let order = descending_order(&sigma);

    let mut us = DMatrix::zeros(u.nrows(), rank);
    for (c, &i) in order.iter().take(rank).enumerate() {
        us.set_column(c, &(u.column(i) * sigma[i]));
    }
    Ok(us)
}

/// Orthonormal basis of the column space of `a` from a Householder QR.
fn orthonormal_basis(a: &Array2<f64>) -> Array2<f64> {
    to_array(&to_dmatrix(a.view()).qr().q())
}

/// Eigenvalues and eigenvectors (as columns) of a symmetric matrix.
pub(crate) fn symmetric_eigen(a: &Array2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let eigen = SymmetricEigen::try_new(to_dmatrix(a.view()), f64::EPSILON, MAX_DECOMPOSITION_ITER)
        .ok_or(Error::NoConvergence("symmetric eigen-decomposition"))?;
    Ok((Array1::from_iter(eigen.eigenvalues.iter().copied()), to_array(&eigen.eigenvectors)))
}

fn to_dmatrix(m: ArrayView2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[[i, j]])
}

fn to_array(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

fn descending_order(values: &Array1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order
}

/// Makes the largest-magnitude entry of every column positive.
fn flip_signs(m: &mut Array2<f64>) {
    for mut col in m.axis_iter_mut(Axis(1)) {
        let pivot = col
            .iter()
            .copied()
            .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
        if pivot < 0.0 {
            col.mapv_inplace(|x| -x);
        }
    }
}


/// What normalization does with rows too close to zero to be rescaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DegeneratePolicy {
    /// keep the row zeroed and remember its index
    #[default]
    Flag,
    Fail,
}

/// Rescales every row to unit length. Degenerate rows are either reported
/// back with their norm (`Flag`) or abort the normalization (`Fail`);
/// `token_of` names the offending row in the error.
pub fn normalize_rows<F>(reduced: ArrayView2<f64>, policy: DegeneratePolicy, token_of: F) -> Result<(Array2<f32>, BTreeMap<usize, f64>)>
where
    F: Fn(usize) -> String,
{
    let mut normalized: Array2<f32> = Array2::zeros(reduced.dim());
    let mut degenerate = BTreeMap::new();

    for (i, (row, mut out)) in reduced.outer_iter().zip(normalized.outer_iter_mut()).enumerate() {
        let norm = row.dot(&row).sqrt();
        if !norm.is_finite() || norm < DEGENERATE_NORM {
            match policy {
                DegeneratePolicy::Fail => return Err(Error::DegenerateVector { token: token_of(i), norm }),
                DegeneratePolicy::Flag => {
                    degenerate.insert(i, norm);
                    continue;
                }
            }
        }
        Zip::from(&mut out).and(&row).for_each(|o, &x| *o = (x / norm) as f32);
    }

    if !degenerate.is_empty() {
        warn!("{} degenerate rows left unnormalized", degenerate.len());
    }
    Ok((normalized, degenerate))
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim());
        let scale = b.iter().fold(1.0_f64, |m, x| m.max(x.abs()));
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= tol * scale, "{} vs {} (matrices {} / {})", x, y, a, b);
        }
    }

    #[test]
    fn eigen_of_diagonal_and_dense() {
        let (eigs, _) = symmetric_eigen(&array![[3.0, 0.0], [0.0, 1.0]]).unwrap();
        let mut eigs = eigs.to_vec();
        eigs.sort_by(f64::total_cmp);
        assert_close(&Array2::from_shape_vec((1, 2), eigs).unwrap(), &array![[1.0, 3.0]], 1e-12);

        let a = array![[4.0, 1.0, 2.0], [1.0, 3.0, 0.5], [2.0, 0.5, 5.0]];
        let (eigs, vecs) = symmetric_eigen(&a).unwrap();
        // A V = V diag(eigs)
        let av = a.dot(&vecs);
        let vd = &vecs * &eigs;
        assert_close(&av, &vd, 1e-10);
        // V orthonormal
        assert_close(&vecs.t().dot(&vecs), &Array2::eye(3), 1e-10);
    }

    #[test]
    fn exact_rank_one_recovers_scaled_singular_vector() {
        // rank one: M = u v^T with |v| = 1 so U*Sigma = u
        let m = array![[3.0, 0.0], [4.0, 0.0]];
        let us = TruncatedSvd::new(1).with_solver(SvdSolver::Exact).fit_transform(&m).unwrap();
        assert_close(&us, &array![[3.0], [4.0]], 1e-12);
    }

    #[test]
    fn randomized_matches_exact_on_small_matrices() {
        let m = array![
            [0.0, 2.0, 1.0, 0.0, 1.0],
            [2.0, 0.0, 3.0, 1.0, 0.0],
            [1.0, 3.0, 0.0, 2.0, 1.0],
            [0.0, 1.0, 2.0, 0.0, 4.0],
            [1.0, 0.0, 1.0, 4.0, 0.0]
        ];
        for rank in 1..=3 {
            let exact = TruncatedSvd::new(rank).with_solver(SvdSolver::Exact).fit_transform(&m).unwrap();
            let randomized = TruncatedSvd::new(rank).fit_transform(&m).unwrap();
            assert_close(&randomized, &exact, 1e-6);
        }
    }

    #[test]
    fn full_rank_reconstructs_row_norms() {
        // U Sigma with every component keeps the row norms of M
        let m = array![[1.0, 2.0, 0.0], [0.0, 1.0, 1.0], [2.0, 0.0, 1.0]];
        let us = TruncatedSvd::new(3).with_solver(SvdSolver::Exact).fit_transform(&m).unwrap();
        for (a, b) in us.outer_iter().zip(m.outer_iter()) {
            assert!((a.dot(&a) - b.dot(&b)).abs() < 1e-9);
        }
    }

    #[test]
    fn randomized_agrees_with_exact_on_larger_counts() {
        // symmetric count-like matrix with a fast decaying spectrum
        let n = 60;
        let m = Array2::from_shape_fn((n, n), |(i, j)| {
            let (a, b) = (i as f64, j as f64);
            10.0 / (1.0 + (a - b).abs()) + ((i * j) % 7) as f64 * 0.01 + ((i + j) % 3) as f64
        });
        let m = &m + &m.t();

        let exact = TruncatedSvd::new(5).with_solver(SvdSolver::Exact).fit_transform(&m).unwrap();
        let randomized = TruncatedSvd::new(5).fit_transform(&m).unwrap();
        assert_eq!(exact.dim(), (n, 5));

        // the leading singular value is the column norm of U*Sigma
        let top_exact = exact.column(0).dot(&exact.column(0)).sqrt();
        let top_randomized = randomized.column(0).dot(&randomized.column(0)).sqrt();
        assert!((top_exact - top_randomized).abs() <= 1e-6 * top_exact);

        // columns come out largest singular value first
        let norms: Vec<f64> = exact.axis_iter(Axis(1)).map(|c| c.dot(&c).sqrt()).collect();
        assert!(norms.windows(2).all(|w| w[0] >= w[1] - 1e-9));

        // both span the same leading direction
        let cosine = exact.column(0).dot(&randomized.column(0)) / (top_exact * top_randomized);
        assert!(cosine > 1.0 - 1e-6);
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let m = Array2::from_shape_fn((12, 12), |(i, j)| ((i * 7 + j * 3) % 5) as f64);
        let svd = TruncatedSvd::new(2).with_seed(42);
        assert_eq!(svd.fit_transform(&m).unwrap(), svd.fit_transform(&m).unwrap());
    }

    #[test]
    fn rank_is_validated() {
        let m = Array2::<f64>::ones((3, 4));
        assert!(matches!(TruncatedSvd::new(0).fit_transform(&m), Err(Error::InvalidRank { .. })));
        assert!(matches!(TruncatedSvd::new(4).fit_transform(&m), Err(Error::InvalidRank { rows: 3, cols: 4, rank: 4 })));
    }

    #[test]
    fn rows_are_unit_length_or_flagged() {
        let reduced = array![[3.0, 4.0], [0.0, 0.0], [-1.0, 1.0]];
        let (normalized, degenerate) = normalize_rows(reduced.view(), DegeneratePolicy::Flag, |i| i.to_string()).unwrap();

        assert_eq!(degenerate.into_iter().collect::<Vec<(usize, f64)>>(), vec![(1, 0.0)]);
        for (i, row) in normalized.outer_iter().enumerate() {
            let norm = row.dot(&row).sqrt();
            if i == 1 {
                assert_eq!(norm, 0.0);
                assert!(row.iter().all(|x| !x.is_nan()));
            } else {
                assert!((norm - 1.0).abs() < 1e-6);
            }
        }
        assert!((normalized[[0, 0]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn strict_normalization_fails_on_zero_rows() {
        let reduced = array![[1.0, 0.0], [0.0, 0.0]];
        let result = normalize_rows(reduced.view(), DegeneratePolicy::Fail, |i| format!("tok{}", i));
        match result {
            Err(Error::DegenerateVector { token, .. }) => assert_eq!(token, "tok1"),
            other => panic!("expected degenerate vector, got {:?}", other.map(|(m, _)| m)),
        }
    }

    #[test]
    fn flagged_rows_keep_their_norm() {
        let reduced = array![[1e-12, 0.0], [f64::NAN, 1.0], [0.0, 2.0]];
        let (_, degenerate) = normalize_rows(reduced.view(), DegeneratePolicy::Flag, |i| i.to_string()).unwrap();

        assert_eq!(degenerate.len(), 2);
        assert!((degenerate[&0] - 1e-12).abs() < 1e-20);
        assert!(degenerate[&1].is_nan());
        assert!(!degenerate.contains_key(&2));
    }
}
