use sequor::belief::Covariance;
use sequor::common::*;
use sequor::data::Targets;
use sequor::environment;
use sequor::evaluate::{evaluate_stream, RunConfig};
use sequor::features::FeatureMap;
use sequor::kalman::{CovKind, KalmanAgent, KalmanConfig};
use sequor::likelihood::LikelihoodModel;
use sequor::records::NullSink;
use sequor::traits::InferenceAlgorithm;

use approx::assert_abs_diff_eq;

#[test]
fn sequential_filter_matches_the_batch_posterior() -> anyhow::Result<()> {
    let obs_noise = 0.1_f32;
    let true_weights = Mat::from_row_slice(2, 1, &[0.5, 2.0]);
    let env = environment::linear_regression(0, true_weights, obs_noise)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(1), 1, obs_noise)?;
    let agent = KalmanAgent::new(KalmanConfig::default())?;

    let seed = 0_u64;
    let nn = 150_usize;
    let mut belief = agent.init_belief(&model, derive_key(seed, KEY_INIT))?;
    let mut phi_nm = Mat::zeros(nn, 2);
    let mut y_n = DVec::zeros(nn);
    for tt in 1..=nn {
        let batch = env.train_batch(derive_step_key(seed, KEY_TRAIN, tt), 1)?;
        phi_nm[(tt - 1, 0)] = 1.0;
        phi_nm[(tt - 1, 1)] = batch.x_nd[(0, 0)];
        if let Targets::Real(y_nk) = &batch.y {
            y_n[tt - 1] = y_nk[(0, 0)];
        }
        belief = agent.update(&model, belief, &batch, tt, 0)?;
    }

    // conjugate batch posterior under the same unit isotropic prior:
    // precision = I + Phi' Phi / sigma^2
    let precision = Mat::identity(2, 2) + phi_nm.transpose() * &phi_nm / obs_noise;
    let chol = precision.cholesky().expect("posterior precision is PD");
    let mean_batch = chol.solve(&(phi_nm.transpose() * &y_n / obs_noise));
    let cov_batch = chol.inverse();

    assert_abs_diff_eq!(belief.mean[0], mean_batch[0], epsilon = 1e-3);
    assert_abs_diff_eq!(belief.mean[1], mean_batch[1], epsilon = 1e-3);
    match &belief.cov {
        Covariance::Full(sigma_qq) => {
            for ii in 0..2 {
                for jj in 0..2 {
                    assert_abs_diff_eq!(sigma_qq[(ii, jj)], cov_batch[(ii, jj)], epsilon = 1e-4);
                }
            }
        }
        Covariance::Diagonal(_) => unreachable!("default filter keeps the full matrix"),
    }

    // the generating weights sit inside a tight ball around the mean
    let err = ((belief.mean[0] - 0.5).powi(2) + (belief.mean[1] - 2.0).powi(2)).sqrt();
    assert!(err < 0.15);
    Ok(())
}

#[test]
fn covariance_stays_psd_across_priors() -> anyhow::Result<()> {
    let env = environment::linear_classification(1, 2, 3, 1.5)?;
    let model = LikelihoodModel::categorical(FeatureMap::with_bias(2), 3)?;

    for &prior_var in &[0.25_f32, 1.0, 4.0] {
        let agent = KalmanAgent::new(KalmanConfig {
            prior_var,
            ..KalmanConfig::default()
        })?;
        let mut belief = agent.init_belief(&model, 0)?;
        for tt in 1..=40 {
            let batch = env.train_batch(derive_step_key(1, KEY_TRAIN, tt), 1)?;
            belief = agent.update(&model, belief, &batch, tt, 0)?;

            assert!(belief.is_finite());
            assert!(belief.min_symmetric_eigenvalue() > -1e-4);
            if let Covariance::Full(sigma_qq) = &belief.cov {
                assert_eq!(sigma_qq, &sigma_qq.transpose());
            }
        }
    }
    Ok(())
}

#[test]
fn diagonal_filter_tracks_the_stream() -> anyhow::Result<()> {
    let true_weights = Mat::from_row_slice(3, 1, &[0.5, -1.0, 2.0]);
    let env = environment::linear_regression(2, true_weights, 0.1)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(2), 1, 0.1)?;
    let agent = KalmanAgent::new(KalmanConfig {
        cov: CovKind::Diagonal,
        ..KalmanConfig::default()
    })?;
    let config = RunConfig {
        n_steps: 120,
        n_test: 64,
        seed: 2,
        ..RunConfig::default()
    };

    let (belief, trace) = evaluate_stream(&agent, &model, &env, &config, &mut NullSink)?;
    match &belief.cov {
        Covariance::Diagonal(d_q) => assert!(d_q.iter().all(|&v| v > 0.0)),
        Covariance::Full(_) => unreachable!("diagonal filter was requested"),
    }

    assert!(trace.last().unwrap().nll < trace[0].nll);
    // variances shrink as evidence accumulates
    assert!(belief.cov.diagonal().max() < 1.0);
    Ok(())
}
