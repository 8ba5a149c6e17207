use crate::belief::{flatten, unflatten};
use crate::common::*;
use crate::data::Targets;
use crate::errors::{Result, SequorError};
use crate::likelihood::{Family, LikelihoodModel};

use matrix_rand::stat;

/// Mean negative log-likelihood of a batch and its gradient in the
/// weight matrix, for predictions `eta = phi W`.
///
/// ```text
/// gaussian:    grad = phi' (eta - y) / (n sigma^2)
/// categorical: grad = phi' (softmax(eta) - onehot(y)) / n
/// ```
pub fn nll_and_grad(
    model: &LikelihoodModel,
    weights_pk: &Mat,
    phi_np: &Mat,
    y: &Targets,
) -> Result<(f32, Mat)> {
    let nn = phi_np.nrows();
    if nn == 0 {
        return Err(SequorError::Config(
            "cannot take a gradient on an empty batch".to_string(),
        ));
    }
    let eta_nk = phi_np * weights_pk;
    let kk = eta_nk.ncols();

    match (model.family(), y) {
        (Family::Gaussian { obs_noise }, Targets::Real(y_nk)) => {
            if y_nk.shape() != eta_nk.shape() {
                return Err(SequorError::Config(format!(
                    "targets are {:?}, predictions are {:?}",
                    y_nk.shape(),
                    eta_nk.shape()
                )));
            }
            let resid_nk = &eta_nk - y_nk;
            let sq_err: f32 = resid_nk.iter().map(|&r| r * r).sum();
            let ln_norm = (2.0 * std::f32::consts::PI * obs_noise).ln();
            let loss = 0.5 * sq_err / (nn as f32 * obs_noise) + 0.5 * kk as f32 * ln_norm;
            let grad_pk = phi_np.transpose() * resid_nk / (nn as f32 * obs_noise);
            Ok((loss, grad_pk))
        }
        (Family::Categorical, Targets::Labels(labels)) => {
            if labels.len() != nn {
                return Err(SequorError::Config(format!(
                    "{} labels for a batch of {}",
                    labels.len(),
                    nn
                )));
            }
            let logp_nk = stat::log_softmax_rows(&eta_nk);
            let mut loss = 0.0_f32;
            for (ii, &label) in labels.iter().enumerate() {
                if label >= kk {
                    return Err(SequorError::Config(format!(
                        "label {} out of range for {} classes",
                        label, kk
                    )));
                }
                loss -= logp_nk[(ii, label)];
            }
            loss /= nn as f32;

            let prob_nk = logp_nk.map(|v| v.exp());
            let onehot_nk = stat::onehot(labels, kk)
                .map_err(|e| SequorError::Config(e.to_string()))?;
            let grad_pk = phi_np.transpose() * (prob_nk - onehot_nk) / nn as f32;
            Ok((loss, grad_pk))
        }
        _ => Err(SequorError::Config(
            "model family does not match the target kind".to_string(),
        )),
    }
}

/// `nll_and_grad` over a flattened parameter vector, for the
/// variational updates
pub fn nll_and_grad_flat(
    model: &LikelihoodModel,
    theta: &DVec,
    phi_np: &Mat,
    y: &Targets,
) -> Result<(f32, DVec)> {
    let weights_pk = unflatten(theta, model.feature_dim(), model.n_outputs());
    let (loss, grad_pk) = nll_and_grad(model, &weights_pk, phi_np, y)?;
    Ok((loss, flatten(&grad_pk)))
}

/// Analytic KL(q || p) between diagonal Gaussians in (mean, log-std)
/// parameterization, with gradients in the q parameters.
///
/// ```text
/// KL = sum_j [ ln_sd_p - ln_sd_q
///              + (var_q + (mu_q - mu_p)^2) / (2 var_p) - 1/2 ]
/// ```
pub fn kl_diag_gaussian(
    mu_q: &DVec,
    ln_sd_q: &DVec,
    mu_p: &DVec,
    ln_sd_p: &DVec,
) -> (f32, DVec, DVec) {
    let dim = mu_q.len();
    let mut kl = 0.0_f32;
    let mut grad_mu = DVec::zeros(dim);
    let mut grad_ln_sd = DVec::zeros(dim);

    for jj in 0..dim {
        let var_q = (2.0 * ln_sd_q[jj]).exp();
        let var_p = (2.0 * ln_sd_p[jj]).exp();
        let diff = mu_q[jj] - mu_p[jj];

        kl += ln_sd_p[jj] - ln_sd_q[jj] + (var_q + diff * diff) / (2.0 * var_p) - 0.5;
        grad_mu[jj] = diff / var_p;
        grad_ln_sd[jj] = var_q / var_p - 1.0;
    }
    (kl, grad_mu, grad_ln_sd)
}
