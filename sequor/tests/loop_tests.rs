use sequor::common::*;
use sequor::environment;
use sequor::errors::SequorError;
use sequor::evaluate::{evaluate_stream, score, RunConfig};
use sequor::features::FeatureMap;
use sequor::kalman::{KalmanAgent, KalmanConfig};
use sequor::likelihood::LikelihoodModel;
use sequor::records::{read_jsonl, EvalRecord, JsonlSink, NullSink};
use sequor::sgd::{LearningRate, SgdAgent, SgdConfig};
use sequor::traits::InferenceAlgorithm;

#[test]
fn linear_regression_agents_beat_the_prior() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let true_weights = Mat::from_row_slice(2, 1, &[0.5, 2.0]);
    let env = environment::linear_regression(0, true_weights, 0.1)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(1), 1, 0.1)?;

    let sgd = SgdAgent::new(SgdConfig {
        learning_rate: LearningRate::Constant(0.01),
        ..SgdConfig::default()
    })?;
    let kalman = KalmanAgent::new(KalmanConfig::default())?;

    let config = RunConfig {
        n_steps: 200,
        seed: 0,
        ..RunConfig::default()
    };
    let (_point, sgd_trace) = evaluate_stream(&sgd, &model, &env, &config, &mut NullSink)?;
    let (_gauss, kf_trace) = evaluate_stream(&kalman, &model, &env, &config, &mut NullSink)?;

    assert_eq!(sgd_trace.len(), 200);
    let steps: Vec<usize> = kf_trace.iter().map(|r| r.step).collect();
    assert_eq!(steps, (1..=200).collect::<Vec<_>>());

    // the first record scores the untrained prior
    assert!(sgd_trace[0].nll > 5.0);
    assert!(kf_trace[0].nll > 5.0);
    assert!(sgd_trace.last().unwrap().nll < sgd_trace[0].nll);
    assert!(kf_trace.last().unwrap().nll < kf_trace[0].nll);
    assert!(kf_trace.last().unwrap().nll < 1.0);

    let last = kf_trace.last().unwrap();
    assert!(last.rmse.unwrap() < 0.6);
    assert!(last.accuracy.is_none() && last.ece.is_none());

    // the conjugate update dominates the stochastic one by the end of
    // the stream
    assert!(last.nll <= sgd_trace.last().unwrap().nll);

    // the same ordering holds on tail averages across seeds, away
    // from single-trajectory noise
    let tail = |trace: &[EvalRecord]| trace[100..].iter().map(|r| r.nll).sum::<f32>() / 100.0;
    let mut kf_tail = tail(&kf_trace);
    let mut sgd_tail = tail(&sgd_trace);
    for seed in 1..6_u64 {
        let config = RunConfig {
            n_steps: 200,
            seed,
            ..RunConfig::default()
        };
        let (_point, sgd_trace) = evaluate_stream(&sgd, &model, &env, &config, &mut NullSink)?;
        let (_gauss, kf_trace) = evaluate_stream(&kalman, &model, &env, &config, &mut NullSink)?;
        kf_tail += tail(&kf_trace);
        sgd_tail += tail(&sgd_trace);
    }
    assert!(kf_tail < sgd_tail);
    Ok(())
}

#[test]
fn mismatched_dimensions_fail_before_the_first_step() -> anyhow::Result<()> {
    // stream emits 3-dimensional inputs, feature map expects 5
    let env = environment::random_linear_regression(11, 3, 1, 1.0, 0.1)?;
    let model = LikelihoodModel::gaussian(FeatureMap::linear(5), 1, 0.1)?;
    let agent = SgdAgent::new(SgdConfig::default())?;

    let mut sink: Vec<EvalRecord> = Vec::new();
    let err = evaluate_stream(&agent, &model, &env, &RunConfig::default(), &mut sink)
        .expect_err("incompatible dimensions must not start the run");
    assert!(matches!(err, SequorError::Config(_)));
    assert_eq!(err.step(), None);
    assert!(sink.is_empty());

    // class-count disagreements are caught the same way
    let env = environment::linear_classification(2, 2, 5, 1.0)?;
    let model = LikelihoodModel::categorical(FeatureMap::with_bias(2), 3)?;
    let err = evaluate_stream(&agent, &model, &env, &RunConfig::default(), &mut sink)
        .expect_err("class counts disagree");
    assert!(matches!(err, SequorError::Config(_)));
    assert!(sink.is_empty());
    Ok(())
}

#[test]
fn evaluation_cadence_controls_record_steps() -> anyhow::Result<()> {
    let env = environment::random_linear_regression(5, 2, 1, 1.0, 0.5)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(2), 1, 0.5)?;
    let agent = SgdAgent::new(SgdConfig::default())?;
    let config = RunConfig {
        n_steps: 12,
        n_test: 32,
        eval_every: 5,
        seed: 9,
        ..RunConfig::default()
    };

    let (_point, trace) = evaluate_stream(&agent, &model, &env, &config, &mut NullSink)?;
    let steps: Vec<usize> = trace.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![1, 6, 11]);

    // the step-one record is exactly the untouched prior's score
    let test = env.test_batch(derive_key(config.seed, KEY_TEST), config.n_test)?;
    let prior = agent.init_belief(&model, derive_key(config.seed, KEY_INIT))?;
    assert_eq!(trace[0], score(&model, &prior, &test, 1)?);
    Ok(())
}

#[test]
fn records_stream_to_gzipped_jsonl() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("trace.jsonl.gz");
    let path = path.to_str().unwrap();

    let env = environment::linear_classification(4, 2, 3, 1.5)?;
    let model = LikelihoodModel::categorical(FeatureMap::with_bias(2), 3)?;
    let agent = SgdAgent::new(SgdConfig::default())?;
    let config = RunConfig {
        n_steps: 7,
        n_test: 24,
        seed: 2,
        ..RunConfig::default()
    };

    let mut sink = JsonlSink::create(path)?;
    let (_point, trace) = evaluate_stream(&agent, &model, &env, &config, &mut sink)?;
    drop(sink);
    assert_eq!(read_jsonl(path)?, trace);

    // appending a second run keeps the first intact
    let mut sink = JsonlSink::append_to(path)?;
    let config = RunConfig { seed: 3, ..config };
    let (_point, more) = evaluate_stream(&agent, &model, &env, &config, &mut sink)?;
    drop(sink);

    let all = read_jsonl(path)?;
    assert_eq!(all.len(), trace.len() + more.len());
    assert_eq!(&all[..trace.len()], &trace[..]);
    assert_eq!(&all[trace.len()..], &more[..]);
    Ok(())
}

#[test]
fn test_refresh_changes_the_heldout_batch() -> anyhow::Result<()> {
    let env = environment::random_linear_regression(6, 2, 1, 1.0, 0.2)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(2), 1, 0.2)?;
    let agent = SgdAgent::new(SgdConfig::default())?;

    let fixed = RunConfig {
        n_steps: 8,
        n_test: 64,
        seed: 4,
        ..RunConfig::default()
    };
    let refreshed = RunConfig {
        refresh_test_every: Some(5),
        ..fixed
    };

    let (_point, base) = evaluate_stream(&agent, &model, &env, &fixed, &mut NullSink)?;
    let (_point, refr) = evaluate_stream(&agent, &model, &env, &refreshed, &mut NullSink)?;

    // identical belief trajectories; the held-out batch only turns
    // over at step 6
    assert_eq!(base[..5], refr[..5]);
    assert_ne!(base[5], refr[5]);
    Ok(())
}

#[test]
fn divergence_terminates_the_run_early() -> anyhow::Result<()> {
    let true_weights = Mat::from_row_slice(2, 1, &[0.5, 2.0]);
    let env = environment::linear_regression(0, true_weights, 0.1)?;
    let model = LikelihoodModel::gaussian(FeatureMap::with_bias(1), 1, 0.1)?;
    let agent = SgdAgent::new(SgdConfig {
        learning_rate: LearningRate::Constant(1e20),
        ..SgdConfig::default()
    })?;
    let config = RunConfig {
        n_steps: 10,
        n_test: 16,
        seed: 8,
        ..RunConfig::default()
    };

    let mut sink: Vec<EvalRecord> = Vec::new();
    let err = evaluate_stream(&agent, &model, &env, &config, &mut sink)
        .expect_err("exploding weights must terminate the run");
    assert!(matches!(err, SequorError::NumericalDivergence { .. }));

    let failed_at = err.step().expect("divergence carries its step");
    assert!(failed_at >= 2);
    // records scored before the failing update survive
    assert_eq!(sink.len(), failed_at);
    Ok(())
}
