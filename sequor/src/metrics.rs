use crate::common::*;
use crate::data::Targets;
use crate::errors::{Result, SequorError};
use crate::likelihood::Predictive;

use matrix_rand::stat;

const ECE_BINS: usize = 10;

/// Mean negative log-likelihood of the targets under the predictive
pub fn nll(pred: &Predictive, y: &Targets) -> Result<f32> {
    if pred.n_examples() == 0 {
        return Err(SequorError::Config(
            "cannot score an empty batch".to_string(),
        ));
    }
    Ok(-pred.log_prob(y)?.mean())
}

/// Fraction of rows whose most probable class matches the label
pub fn accuracy(pred: &Predictive, y: &Targets) -> Result<f32> {
    match (pred, y) {
        (Predictive::Categorical { log_prob_nk }, Targets::Labels(labels)) => {
            if labels.is_empty() || labels.len() != log_prob_nk.nrows() {
                return Err(SequorError::Config(format!(
                    "{} labels for {} predictive rows",
                    labels.len(),
                    log_prob_nk.nrows()
                )));
            }
            let guess = stat::row_argmax(log_prob_nk);
            let hits = guess
                .iter()
                .zip(labels.iter())
                .filter(|(gg, ll)| gg == ll)
                .count();
            Ok(hits as f32 / labels.len() as f32)
        }
        _ => Err(SequorError::Config(
            "accuracy needs a categorical predictive and labels".to_string(),
        )),
    }
}

/// Ten-bin expected calibration error: the confidence of the top
/// class against its empirical accuracy, averaged over bins by
/// occupancy
pub fn expected_calibration_error(pred: &Predictive, y: &Targets) -> Result<f32> {
    match (pred, y) {
        (Predictive::Categorical { log_prob_nk }, Targets::Labels(labels)) => {
            if labels.is_empty() || labels.len() != log_prob_nk.nrows() {
                return Err(SequorError::Config(format!(
                    "{} labels for {} predictive rows",
                    labels.len(),
                    log_prob_nk.nrows()
                )));
            }
            let nn = labels.len();
            let guess = stat::row_argmax(log_prob_nk);

            let mut count = [0_usize; ECE_BINS];
            let mut conf_sum = [0.0_f32; ECE_BINS];
            let mut hit_sum = [0.0_f32; ECE_BINS];
            for ii in 0..nn {
                let conf = log_prob_nk.row(ii).max().exp();
                let bb = ((conf * ECE_BINS as f32) as usize).min(ECE_BINS - 1);
                count[bb] += 1;
                conf_sum[bb] += conf;
                if guess[ii] == labels[ii] {
                    hit_sum[bb] += 1.0;
                }
            }

            let mut ece = 0.0_f32;
            for bb in 0..ECE_BINS {
                if count[bb] > 0 {
                    ece += (conf_sum[bb] - hit_sum[bb]).abs() / nn as f32;
                }
            }
            Ok(ece)
        }
        _ => Err(SequorError::Config(
            "calibration needs a categorical predictive and labels".to_string(),
        )),
    }
}

/// Root mean squared error of the mixture-mean point prediction
pub fn rmse(pred: &Predictive, y: &Targets) -> Result<f32> {
    match (pred, y) {
        (Predictive::Gaussian { mean_mnk, .. }, Targets::Real(y_nk)) => {
            if mean_mnk.is_empty() {
                return Err(SequorError::Config(
                    "predictive mixture has no components".to_string(),
                ));
            }
            if y_nk.is_empty() || mean_mnk[0].shape() != y_nk.shape() {
                return Err(SequorError::Config(format!(
                    "predictive means are {:?}, targets are {:?}",
                    mean_mnk[0].shape(),
                    y_nk.shape()
                )));
            }

            let mut mean_nk = Mat::zeros(y_nk.nrows(), y_nk.ncols());
            for comp_nk in mean_mnk.iter() {
                mean_nk += comp_nk;
            }
            mean_nk /= mean_mnk.len() as f32;

            let resid_nk = mean_nk - y_nk;
            Ok((resid_nk.map(|v| v * v).sum() / resid_nk.len() as f32).sqrt())
        }
        _ => Err(SequorError::Config(
            "rmse needs a Gaussian predictive and real targets".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn categorical(rows: &[[f32; 2]]) -> Predictive {
        let nn = rows.len();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let prob = Mat::from_row_slice(nn, 2, &flat);
        Predictive::Categorical {
            log_prob_nk: prob.map(|p: f32| p.ln()),
        }
    }

    #[test]
    fn accuracy_counts_argmax_hits() -> anyhow::Result<()> {
        let pred = categorical(&[[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]]);
        let y = Targets::Labels(vec![0, 1, 1, 0]);
        assert_abs_diff_eq!(accuracy(&pred, &y)?, 0.5, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn perfectly_calibrated_predictions_have_zero_ece() -> anyhow::Result<()> {
        // ten rows at confidence 0.75, bin hits 0.75 exactly
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for ii in 0..8 {
            rows.push([0.75, 0.25]);
            labels.push(if ii < 6 { 0 } else { 1 });
        }
        let ece = expected_calibration_error(&categorical(&rows), &Targets::Labels(labels))?;
        assert_abs_diff_eq!(ece, 0.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn overconfident_predictions_have_positive_ece() -> anyhow::Result<()> {
        let rows = vec![[0.99, 0.01]; 4];
        let labels = vec![0, 0, 1, 1];
        let ece = expected_calibration_error(&categorical(&rows), &Targets::Labels(labels))?;
        assert_abs_diff_eq!(ece, 0.49, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn rmse_averages_mixture_components() -> anyhow::Result<()> {
        let pred = Predictive::Gaussian {
            mean_mnk: vec![
                Mat::from_row_slice(2, 1, &[1.0, 3.0]),
                Mat::from_row_slice(2, 1, &[3.0, 5.0]),
            ],
            obs_noise: 0.1,
        };
        let y = Targets::Real(Mat::from_row_slice(2, 1, &[2.0, 5.0]));
        // mixture means are [2, 4]; residuals [0, -1]
        assert_abs_diff_eq!(rmse(&pred, &y)?, 0.5_f32.sqrt(), epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let pred = categorical(&[[0.5, 0.5]]);
        let y = Targets::Real(Mat::zeros(1, 1));
        assert!(accuracy(&pred, &y).is_err());
        assert!(rmse(&pred, &y).is_err());
    }
}
