use crate::common::*;
use crate::traits::BeliefState;

use matrix_rand::dmatrix_sample;
use matrix_rand::stat;

use rand::rngs::StdRng;
use rand::Rng;

/// Unpack a flattened parameter vector into a `(p, k)` weight matrix
/// (columns stacked in order).
pub(crate) fn unflatten(theta: &DVec, pp: usize, kk: usize) -> Mat {
    Mat::from_column_slice(pp, kk, theta.as_slice())
}

/// Stack the columns of a weight matrix into one parameter vector.
pub(crate) fn flatten(weights_pk: &Mat) -> DVec {
    DVec::from_column_slice(weights_pk.as_slice())
}

/// Point estimate of the weight matrix
#[derive(Debug, Clone, PartialEq)]
pub struct PointBelief {
    pub weights_pk: Mat,
}

impl PointBelief {
    pub fn new(weights_pk: Mat) -> Self {
        Self { weights_pk }
    }
}

impl BeliefState for PointBelief {
    fn param_dim(&self) -> usize {
        self.weights_pk.len()
    }

    fn posterior_mean(&self) -> Mat {
        self.weights_pk.clone()
    }

    fn sample_params(&self, _rng: &mut StdRng) -> Mat {
        self.weights_pk.clone()
    }
}

/// Ensemble of point estimates, optionally carrying frozen randomized
/// prior anchors. The effective weights of member `m` are
/// `W_m + prior_scale * A_m`; gradients only ever touch `W_m`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleBelief {
    pub members: Vec<PointBelief>,
    pub anchors: Option<Vec<Mat>>,
    pub prior_scale: f32,
}

impl EnsembleBelief {
    pub fn new(members: Vec<PointBelief>, anchors: Option<Vec<Mat>>, prior_scale: f32) -> Self {
        Self {
            members,
            anchors,
            prior_scale,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// member weights with the anchor contribution folded in
    pub fn effective_weights(&self, mm: usize) -> Mat {
        match &self.anchors {
            Some(anchors) => &self.members[mm].weights_pk + &anchors[mm] * self.prior_scale,
            None => self.members[mm].weights_pk.clone(),
        }
    }
}

impl BeliefState for EnsembleBelief {
    fn param_dim(&self) -> usize {
        self.members.first().map_or(0, |m| m.weights_pk.len())
    }

    fn posterior_mean(&self) -> Mat {
        let mm = self.size();
        let mut mean_pk = self.effective_weights(0);
        for jj in 1..mm {
            mean_pk += self.effective_weights(jj);
        }
        mean_pk / mm as f32
    }

    fn components(&self) -> Vec<Mat> {
        (0..self.size()).map(|mm| self.effective_weights(mm)).collect()
    }

    fn sample_params(&self, rng: &mut StdRng) -> Mat {
        let mm = rng.random_range(0..self.size());
        self.effective_weights(mm)
    }
}

/// Covariance storage of a Gaussian belief
#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
    Full(Mat),
    Diagonal(DVec),
}

impl Covariance {
    pub fn dim(&self) -> usize {
        match self {
            Covariance::Full(sigma) => sigma.nrows(),
            Covariance::Diagonal(diag) => diag.len(),
        }
    }

    pub fn diagonal(&self) -> DVec {
        match self {
            Covariance::Full(sigma) => sigma.diagonal(),
            Covariance::Diagonal(diag) => diag.clone(),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Covariance::Full(sigma) => stat::all_finite(sigma),
            Covariance::Diagonal(diag) => stat::all_finite_vec(diag),
        }
    }
}

/// Gaussian posterior over the flattened weight vector `vec(W)`
/// (length `p * k`, columns stacked)
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBelief {
    pub mean: DVec,
    pub cov: Covariance,
    n_rows: usize,
    n_cols: usize,
}

impl GaussianBelief {
    /// zero mean with `prior_var * I` covariance, stored dense
    pub fn isotropic_full(pp: usize, kk: usize, prior_var: f32) -> Self {
        let dim = pp * kk;
        Self {
            mean: DVec::zeros(dim),
            cov: Covariance::Full(Mat::identity(dim, dim) * prior_var),
            n_rows: pp,
            n_cols: kk,
        }
    }

    /// zero mean with `prior_var * I` covariance, stored as a diagonal
    pub fn isotropic_diagonal(pp: usize, kk: usize, prior_var: f32) -> Self {
        let dim = pp * kk;
        Self {
            mean: DVec::zeros(dim),
            cov: Covariance::Diagonal(DVec::repeat(dim, prior_var)),
            n_rows: pp,
            n_cols: kk,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// posterior mean reshaped to `(p, k)`
    pub fn weights(&self) -> Mat {
        unflatten(&self.mean, self.n_rows, self.n_cols)
    }

    pub fn symmetrize(&mut self) {
        if let Covariance::Full(sigma) = &mut self.cov {
            stat::symmetrize_inplace(sigma);
        }
    }

    pub fn is_finite(&self) -> bool {
        stat::all_finite_vec(&self.mean) && self.cov.is_finite()
    }

    /// smallest eigenvalue of the symmetrized covariance (the smallest
    /// diagonal entry for diagonal storage)
    pub fn min_symmetric_eigenvalue(&self) -> f32 {
        match &self.cov {
            Covariance::Full(sigma) => {
                let mut sym = sigma.clone();
                stat::symmetrize_inplace(&mut sym);
                sym.symmetric_eigen().eigenvalues.min()
            }
            Covariance::Diagonal(diag) => diag.min(),
        }
    }
}

impl BeliefState for GaussianBelief {
    fn param_dim(&self) -> usize {
        self.mean.len()
    }

    fn posterior_mean(&self) -> Mat {
        self.weights()
    }

    fn sample_params(&self, rng: &mut StdRng) -> Mat {
        let zz = dmatrix_sample::rnorm_vec(self.mean.len(), rng);
        let theta = match &self.cov {
            Covariance::Full(sigma) => match sigma.clone().cholesky() {
                Some(chol) => &self.mean + chol.l() * zz,
                None => {
                    warn!("covariance factorization failed; sampling from its diagonal");
                    let sd = sigma.diagonal().map(|v| v.max(0.0).sqrt());
                    &self.mean + sd.component_mul(&zz)
                }
            },
            Covariance::Diagonal(diag) => {
                let sd = diag.map(|v| v.max(0.0).sqrt());
                &self.mean + sd.component_mul(&zz)
            }
        };
        unflatten(&theta, self.n_rows, self.n_cols)
    }
}

/// Diagonal Gaussian variational posterior in (mean, log-std)
/// parameterization over the flattened weight vector
#[derive(Debug, Clone, PartialEq)]
pub struct VariationalBelief {
    pub mean: DVec,
    pub ln_sd: DVec,
    n_rows: usize,
    n_cols: usize,
}

impl VariationalBelief {
    /// zero mean with a shared prior standard deviation
    pub fn isotropic(pp: usize, kk: usize, prior_sd: f32) -> Self {
        let dim = pp * kk;
        Self {
            mean: DVec::zeros(dim),
            ln_sd: DVec::repeat(dim, prior_sd.ln()),
            n_rows: pp,
            n_cols: kk,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn sd(&self) -> DVec {
        self.ln_sd.map(|v| v.exp())
    }

    pub fn weights(&self) -> Mat {
        unflatten(&self.mean, self.n_rows, self.n_cols)
    }

    /// reparameterized draw `theta = mean + sd .* eps`; returns the
    /// draw together with the noise that produced it
    pub fn draw(&self, rng: &mut StdRng) -> (DVec, DVec) {
        let eps = dmatrix_sample::rnorm_vec(self.mean.len(), rng);
        let theta = &self.mean + self.sd().component_mul(&eps);
        (theta, eps)
    }

    pub fn is_finite(&self) -> bool {
        stat::all_finite_vec(&self.mean) && stat::all_finite_vec(&self.ln_sd)
    }
}

impl BeliefState for VariationalBelief {
    fn param_dim(&self) -> usize {
        self.mean.len()
    }

    fn posterior_mean(&self) -> Mat {
        self.weights()
    }

    fn sample_params(&self, rng: &mut StdRng) -> Mat {
        let (theta, _eps) = self.draw(rng);
        unflatten(&theta, self.n_rows, self.n_cols)
    }
}
