use crate::common::*;
use crate::data::Targets;
use crate::environment::{EnvironmentDescriptor, TaskKind};
use crate::errors::{Result, SequorError};
use crate::features::FeatureMap;
use crate::traits::BeliefState;

use matrix_rand::stat;

/// Observation family tag. `obs_noise` is the Gaussian noise
/// variance, shared across outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Family {
    Gaussian { obs_noise: f32 },
    Categorical,
}

/// Parametric observation model `p(y | x, theta)` over a feature map:
/// predictions are `phi(x) W` with `W` of shape `(p, k)`. Immutable
/// once constructed.
#[derive(Debug, Clone)]
pub struct LikelihoodModel {
    family: Family,
    features: FeatureMap,
    n_outputs: usize,
}

impl LikelihoodModel {
    /// Gaussian regression over `n_outputs` response columns
    pub fn gaussian(features: FeatureMap, n_outputs: usize, obs_noise: f32) -> Result<Self> {
        if n_outputs == 0 {
            return Err(SequorError::Config(
                "gaussian model needs at least one output".to_string(),
            ));
        }
        if !obs_noise.is_finite() || obs_noise <= 0.0 {
            return Err(SequorError::Config(format!(
                "observation noise variance must be positive, got {}",
                obs_noise
            )));
        }
        Ok(Self {
            family: Family::Gaussian { obs_noise },
            features,
            n_outputs,
        })
    }

    /// Categorical classification over `n_classes` labels
    pub fn categorical(features: FeatureMap, n_classes: usize) -> Result<Self> {
        if n_classes < 2 {
            return Err(SequorError::Config(format!(
                "categorical model needs at least two classes, got {}",
                n_classes
            )));
        }
        Ok(Self {
            family: Family::Categorical,
            features,
            n_outputs: n_classes,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    /// output columns (regression responses or classes)
    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// feature count `p`; weight matrices are `(p, n_outputs)`
    pub fn feature_dim(&self) -> usize {
        self.features.output_dim()
    }

    /// flattened parameter count `p * k`
    pub fn param_dim(&self) -> usize {
        self.feature_dim() * self.n_outputs
    }

    /// Construction-time pairing check against a stream descriptor.
    /// Any disagreement is fatal and must be raised before the first
    /// step runs.
    pub fn check_compatible(&self, descr: &EnvironmentDescriptor) -> Result<()> {
        if descr.input_dim != self.features.input_dim() {
            return Err(SequorError::Config(format!(
                "environment emits {}-dimensional inputs, feature map expects {}",
                descr.input_dim,
                self.features.input_dim()
            )));
        }
        match (self.family, descr.task) {
            (Family::Gaussian { .. }, TaskKind::Regression { n_outputs }) => {
                if n_outputs != self.n_outputs {
                    return Err(SequorError::Config(format!(
                        "environment emits {} response columns, model declares {}",
                        n_outputs, self.n_outputs
                    )));
                }
            }
            (Family::Categorical, TaskKind::Classification { n_classes }) => {
                if n_classes != self.n_outputs {
                    return Err(SequorError::Config(format!(
                        "environment emits {} classes, model declares {}",
                        n_classes, self.n_outputs
                    )));
                }
            }
            (Family::Gaussian { .. }, TaskKind::Classification { .. }) => {
                return Err(SequorError::Config(
                    "gaussian model paired with a classification stream".to_string(),
                ));
            }
            (Family::Categorical, TaskKind::Regression { .. }) => {
                return Err(SequorError::Config(
                    "categorical model paired with a regression stream".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Predictive distribution over targets for each row of `x_nd`,
    /// reading the belief's component means. Pure in `(belief, x)`.
    /// Multi-component beliefs yield an equally weighted mixture.
    pub fn predictive<B: BeliefState>(&self, belief: &B, x_nd: &Mat) -> Result<Predictive> {
        let phi_np = self.features.apply(x_nd)?;
        let components = belief.components();
        let pp = self.feature_dim();

        for w_pk in components.iter() {
            if w_pk.nrows() != pp || w_pk.ncols() != self.n_outputs {
                return Err(SequorError::Config(format!(
                    "belief holds {} x {} weights, model expects {} x {}",
                    w_pk.nrows(),
                    w_pk.ncols(),
                    pp,
                    self.n_outputs
                )));
            }
        }

        match self.family {
            Family::Gaussian { obs_noise } => {
                let mean_mnk = components.iter().map(|w_pk| &phi_np * w_pk).collect();
                Ok(Predictive::Gaussian {
                    mean_mnk,
                    obs_noise,
                })
            }
            Family::Categorical => {
                if components.len() == 1 {
                    let eta_nk = &phi_np * &components[0];
                    Ok(Predictive::Categorical {
                        log_prob_nk: stat::log_softmax_rows(&eta_nk),
                    })
                } else {
                    // a mixture of categoricals is itself categorical
                    let mm = components.len() as f32;
                    let mut prob_nk = Mat::zeros(phi_np.nrows(), self.n_outputs);
                    for w_pk in components.iter() {
                        let eta_nk = &phi_np * w_pk;
                        prob_nk += stat::softmax_rows(&eta_nk);
                    }
                    prob_nk /= mm;
                    let log_prob_nk = prob_nk.map(|p| p.max(f32::MIN_POSITIVE).ln());
                    Ok(Predictive::Categorical { log_prob_nk })
                }
            }
        }
    }
}

/// Predictive distribution over a batch of targets
#[derive(Debug, Clone)]
pub enum Predictive {
    /// Equally weighted Gaussian mixture, one mean matrix per belief
    /// component, with shared observation noise variance
    Gaussian { mean_mnk: Vec<Mat>, obs_noise: f32 },
    /// Per-row class log-probabilities
    Categorical { log_prob_nk: Mat },
}

impl Predictive {
    /// rows scored by this distribution
    pub fn n_examples(&self) -> usize {
        match self {
            Predictive::Gaussian { mean_mnk, .. } => {
                mean_mnk.first().map_or(0, |mean_nk| mean_nk.nrows())
            }
            Predictive::Categorical { log_prob_nk } => log_prob_nk.nrows(),
        }
    }

    /// Per-example log-likelihood of the targets
    pub fn log_prob(&self, y: &Targets) -> Result<DVec> {
        match (self, y) {
            (
                Predictive::Gaussian {
                    mean_mnk,
                    obs_noise,
                },
                Targets::Real(y_nk),
            ) => {
                let mm = mean_mnk.len();
                if mm == 0 {
                    return Err(SequorError::Config(
                        "predictive mixture has no components".to_string(),
                    ));
                }
                let (nn, kk) = y_nk.shape();
                if mean_mnk[0].shape() != (nn, kk) {
                    return Err(SequorError::Config(format!(
                        "predictive means are {:?}, targets are {:?}",
                        mean_mnk[0].shape(),
                        (nn, kk)
                    )));
                }

                let ln_norm = (2.0 * std::f32::consts::PI * obs_noise).ln();
                let mut ret = DVec::zeros(nn);
                let mut lp_m = vec![0.0_f32; mm];
                for ii in 0..nn {
                    for (jj, mean_nk) in mean_mnk.iter().enumerate() {
                        let mut sq_err = 0.0_f32;
                        for cc in 0..kk {
                            let resid = y_nk[(ii, cc)] - mean_nk[(ii, cc)];
                            sq_err += resid * resid;
                        }
                        lp_m[jj] = -0.5 * (sq_err / obs_noise + kk as f32 * ln_norm);
                    }
                    ret[ii] = logsumexp_slice(&lp_m) - (mm as f32).ln();
                }
                Ok(ret)
            }
            (Predictive::Categorical { log_prob_nk }, Targets::Labels(labels)) => {
                let (nn, kk) = log_prob_nk.shape();
                if labels.len() != nn {
                    return Err(SequorError::Config(format!(
                        "{} labels for {} predictive rows",
                        labels.len(),
                        nn
                    )));
                }
                let mut ret = DVec::zeros(nn);
                for (ii, &label) in labels.iter().enumerate() {
                    if label >= kk {
                        return Err(SequorError::Config(format!(
                            "label {} out of range for {} classes",
                            label, kk
                        )));
                    }
                    ret[ii] = log_prob_nk[(ii, label)];
                }
                Ok(ret)
            }
            _ => Err(SequorError::Config(
                "predictive family does not match the target kind".to_string(),
            )),
        }
    }
}

fn logsumexp_slice(vals: &[f32]) -> f32 {
    let maxval = vals.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !maxval.is_finite() {
        return maxval;
    }
    let sumexp: f32 = vals.iter().map(|&v| (v - maxval).exp()).sum();
    maxval + sumexp.ln()
}
