use sequor::common::*;
use sequor::data::Targets;
use sequor::environment::{self, Environment, TaskKind};
use sequor::evaluate::{evaluate_stream, RunConfig};
use sequor::features::FeatureMap;
use sequor::kalman::{KalmanAgent, KalmanConfig};
use sequor::likelihood::LikelihoodModel;
use sequor::records::NullSink;

fn check_batches(env: &Environment, nn: usize) -> anyhow::Result<()> {
    let train = env.train_batch(11, nn)?;
    assert_eq!(train.x_nd.nrows(), nn);
    assert_eq!(train.x_nd.ncols(), env.descriptor().input_dim);
    assert_eq!(train.y.len(), nn);

    match (env.descriptor().task, &train.y) {
        (TaskKind::Regression { n_outputs }, Targets::Real(y_nk)) => {
            assert_eq!(y_nk.ncols(), n_outputs);
        }
        (TaskKind::Classification { n_classes }, Targets::Labels(labels)) => {
            assert!(labels.iter().all(|&label| label < n_classes));
        }
        _ => panic!("targets disagree with the declared task"),
    }

    // keyed draws replay exactly
    let again = env.train_batch(11, nn)?;
    assert_eq!(train.x_nd, again.x_nd);
    assert_eq!(train.y, again.y);
    let moved = env.train_batch(12, nn)?;
    assert_ne!(train.x_nd, moved.x_nd);
    Ok(())
}

#[test]
fn every_builtin_emits_its_declared_shapes() -> anyhow::Result<()> {
    let true_weights = Mat::from_row_slice(3, 2, &[0.5, -0.5, 1.0, 0.0, -2.0, 2.0]);
    let envs = vec![
        environment::linear_regression(1, true_weights, 0.2)?,
        environment::random_linear_regression(2, 3, 1, 1.0, 0.1)?,
        environment::sin_wave_regression(3, 1.5, 0.05)?,
        environment::linear_classification(4, 2, 4, 1.0)?,
        environment::polynomial_regression(5, 2, 2, 1.0, 0.1)?,
        environment::polynomial_classification(6, 1, 3, 3, 1.0)?,
    ];
    for env in envs.iter() {
        check_batches(env, 5)?;
    }
    Ok(())
}

#[test]
fn kalman_learns_a_polynomial_truth() -> anyhow::Result<()> {
    // generating process and model share the degree-2 expansion, so the
    // filter is conjugate and should approach the noise floor
    let env = environment::polynomial_regression(7, 1, 2, 2.0, 0.1)?;
    let model = LikelihoodModel::gaussian(FeatureMap::polynomial(1, 2)?, 1, 0.1)?;
    let agent = KalmanAgent::new(KalmanConfig::default())?;
    let config = RunConfig {
        n_steps: 80,
        n_test: 64,
        seed: 7,
        ..RunConfig::default()
    };

    let (_belief, trace) = evaluate_stream(&agent, &model, &env, &config, &mut NullSink)?;
    assert!(trace.last().unwrap().nll < trace[0].nll);
    assert!(trace.last().unwrap().nll < 2.0);
    Ok(())
}

#[test]
fn ground_truth_is_noiseless() -> anyhow::Result<()> {
    let env = environment::sin_wave_regression(9, 2.0, 0.5)?;
    let x_nd = Mat::from_row_slice(3, 1, &[0.0, 1.0, -1.0]);
    let y_nk = env.truth(&x_nd);

    assert_eq!(y_nk.shape(), (3, 1));
    assert_eq!(y_nk[(0, 0)], 0.0);
    assert_eq!(y_nk[(1, 0)], 2.0_f32.sin());
    assert_eq!(y_nk[(2, 0)], (-2.0_f32).sin());

    // repeated calls never accumulate noise
    assert_eq!(env.truth(&x_nd), y_nk);
    Ok(())
}
