use crate::belief::{Covariance, GaussianBelief};
use crate::common::*;
use crate::data::{Batch, Targets};
use crate::errors::{Result, SequorError};
use crate::likelihood::{Family, LikelihoodModel};
use crate::traits::InferenceAlgorithm;

use matrix_rand::stat;

/// Covariance storage of the Kalman posterior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovKind {
    Full,
    Diagonal,
}

/// Configuration of the (extended) Kalman filter agent
#[derive(Debug, Clone, Copy)]
pub struct KalmanConfig {
    /// isotropic prior variance over the flattened weights
    pub prior_var: f32,
    /// variance floor for the linearized observation noise and for
    /// diagonal posterior entries
    pub noise_floor: f32,
    pub cov: CovKind,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            prior_var: 1.0,
            noise_floor: 1e-6,
            cov: CovKind::Full,
        }
    }
}

impl KalmanConfig {
    fn validate(&self) -> Result<()> {
        if !self.prior_var.is_finite() || self.prior_var <= 0.0 {
            return Err(SequorError::Config(format!(
                "prior_var must be positive, got {}",
                self.prior_var
            )));
        }
        if !self.noise_floor.is_finite() || self.noise_floor <= 0.0 {
            return Err(SequorError::Config(format!(
                "noise_floor must be positive, got {}",
                self.noise_floor
            )));
        }
        Ok(())
    }
}

/// Exact Kalman filter for the Gaussian likelihood and an extended
/// (softmax-linearized) filter for the categorical one. The state is
/// the flattened weight vector; observations are absorbed one row at
/// a time.
#[derive(Debug, Clone)]
pub struct KalmanAgent {
    pub config: KalmanConfig,
}

impl KalmanAgent {
    pub fn new(config: KalmanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

/// `H = blockdiag(phi', ..., phi')`, the Jacobian of `vec(W) -> W'phi`
/// under column-major flattening
fn observation_matrix(phi_p: &DVec, kk: usize) -> Mat {
    let pp = phi_p.len();
    let mut h_kq = Mat::zeros(kk, pp * kk);
    for jj in 0..kk {
        h_kq.view_mut((jj, jj * pp), (1, pp))
            .copy_from(&phi_p.transpose());
    }
    h_kq
}

/// One measurement update: gain through a Cholesky solve, mean
/// correction, then the Joseph-form covariance (full storage) or the
/// shrunk diagonal (diagonal storage).
fn absorb_row(
    belief: &mut GaussianBelief,
    h_kq: &Mat,
    innovation_k: &DVec,
    r_kk: &Mat,
    var_floor: f32,
    step: usize,
) -> Result<()> {
    let qq = belief.mean.len();

    match &mut belief.cov {
        Covariance::Full(sigma) => {
            let h_sigma = h_kq * &*sigma;
            let s_kk = &h_sigma * h_kq.transpose() + r_kk;
            let chol = s_kk
                .cholesky()
                .ok_or_else(|| SequorError::NumericalDivergence {
                    step,
                    quantity: "innovation covariance".to_string(),
                })?;
            let gain_qk = chol.solve(&h_sigma).transpose();

            belief.mean += &gain_qk * innovation_k;

            let a_qq = Mat::identity(qq, qq) - &gain_qk * h_kq;
            *sigma = &a_qq * &*sigma * a_qq.transpose()
                + &gain_qk * r_kk * gain_qk.transpose();
            stat::symmetrize_inplace(sigma);
        }
        Covariance::Diagonal(dd) => {
            let mut hd_kq = h_kq.clone();
            for (jj, mut col) in hd_kq.column_iter_mut().enumerate() {
                col *= dd[jj];
            }
            let s_kk = &hd_kq * h_kq.transpose() + r_kk;
            let chol = s_kk
                .cholesky()
                .ok_or_else(|| SequorError::NumericalDivergence {
                    step,
                    quantity: "innovation covariance".to_string(),
                })?;
            let gain_qk = chol.solve(&hd_kq).transpose();

            belief.mean += &gain_qk * innovation_k;

            for rr in 0..qq {
                let kh_rr = (gain_qk.row(rr) * h_kq.column(rr))[(0, 0)];
                let shrink = (1.0 - kh_rr).max(0.0);
                dd[rr] = (dd[rr] * shrink).max(var_floor);
            }
        }
    }

    if !belief.is_finite() {
        return Err(SequorError::NumericalDivergence {
            step,
            quantity: "posterior state".to_string(),
        });
    }
    Ok(())
}

impl InferenceAlgorithm for KalmanAgent {
    type Belief = GaussianBelief;

    fn name(&self) -> &'static str {
        "kalman"
    }

    fn init_belief(&self, model: &LikelihoodModel, _key: u64) -> Result<GaussianBelief> {
        let pp = model.feature_dim();
        let kk = model.n_outputs();
        Ok(match self.config.cov {
            CovKind::Full => GaussianBelief::isotropic_full(pp, kk, self.config.prior_var),
            CovKind::Diagonal => {
                GaussianBelief::isotropic_diagonal(pp, kk, self.config.prior_var)
            }
        })
    }

    fn update(
        &self,
        model: &LikelihoodModel,
        mut belief: GaussianBelief,
        batch: &Batch,
        step: usize,
        _key: u64,
    ) -> Result<GaussianBelief> {
        let phi_np = model.features().apply(&batch.x_nd)?;
        let kk = model.n_outputs();

        if belief.mean.len() != model.param_dim() {
            return Err(SequorError::Config(format!(
                "belief carries {} parameters, model has {}",
                belief.mean.len(),
                model.param_dim()
            )));
        }
        if batch.y.len() != batch.x_nd.nrows() {
            return Err(SequorError::Config(format!(
                "{} target rows for a batch of {}",
                batch.y.len(),
                batch.x_nd.nrows()
            )));
        }
        if let Targets::Real(y_nk) = &batch.y {
            if y_nk.ncols() != kk {
                return Err(SequorError::Config(format!(
                    "targets have {} columns, model has {} outputs",
                    y_nk.ncols(),
                    kk
                )));
            }
        }

        for ii in 0..phi_np.nrows() {
            let phi_p: DVec = phi_np.row(ii).transpose();
            let eta_k = belief.weights().transpose() * &phi_p;

            match (model.family(), &batch.y) {
                (Family::Gaussian { obs_noise }, Targets::Real(y_nk)) => {
                    let y_k: DVec = y_nk.row(ii).transpose();
                    let h_kq = observation_matrix(&phi_p, kk);
                    let r_kk = Mat::identity(kk, kk) * obs_noise;
                    absorb_row(
                        &mut belief,
                        &h_kq,
                        &(y_k - eta_k),
                        &r_kk,
                        self.config.noise_floor,
                        step,
                    )?;
                }
                (Family::Categorical, Targets::Labels(labels)) => {
                    let label = labels[ii];
                    if label >= kk {
                        return Err(SequorError::Config(format!(
                            "label {} out of range for {} classes",
                            label, kk
                        )));
                    }
                    let max = eta_k.max();
                    let mut pi_k = eta_k.map(|v| (v - max).exp());
                    pi_k /= pi_k.sum();

                    // d softmax / d logits, also the observation noise
                    // of the linearized one-hot measurement
                    let s_kk = Mat::from_diagonal(&pi_k) - &pi_k * pi_k.transpose();
                    let h_kq = &s_kk * observation_matrix(&phi_p, kk);
                    let r_kk = &s_kk + Mat::identity(kk, kk) * self.config.noise_floor;

                    let mut innovation_k = -pi_k;
                    innovation_k[label] += 1.0;

                    absorb_row(
                        &mut belief,
                        &h_kq,
                        &innovation_k,
                        &r_kk,
                        self.config.noise_floor,
                        step,
                    )?;
                }
                _ => {
                    return Err(SequorError::Config(
                        "model family does not match the target kind".to_string(),
                    ));
                }
            }
        }

        Ok(belief)
    }
}
