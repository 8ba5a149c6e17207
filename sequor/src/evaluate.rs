use crate::common::*;
use crate::data::{Batch, Targets};
use crate::environment::Environment;
use crate::errors::{Result, SequorError};
use crate::likelihood::LikelihoodModel;
use crate::metrics;
use crate::records::{EvalRecord, NullSink};
use crate::traits::{BeliefState, InferenceAlgorithm, RecordSink};

use indicatif::{ProgressBar, ProgressDrawTarget};
use rayon::prelude::*;

/// Settings of one sequential run
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// stream length T
    pub n_steps: usize,
    /// rows in the held-out test batch
    pub n_test: usize,
    /// score every this many steps (1 = every step)
    pub eval_every: usize,
    /// redraw the test batch every this many steps; `None` keeps the
    /// initial batch for the whole run
    pub refresh_test_every: Option<usize>,
    pub seed: u64,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_steps: 100,
            n_test: 256,
            eval_every: 1,
            refresh_test_every: None,
            seed: 0,
            verbose: false,
            show_progress: false,
        }
    }
}

impl RunConfig {
    fn validate(&self) -> Result<()> {
        if self.n_steps == 0 {
            return Err(SequorError::Config(
                "n_steps must be at least one".to_string(),
            ));
        }
        if self.n_test == 0 {
            return Err(SequorError::Config(
                "n_test must be at least one".to_string(),
            ));
        }
        if self.eval_every == 0 {
            return Err(SequorError::Config(
                "eval_every must be at least one".to_string(),
            ));
        }
        if self.refresh_test_every == Some(0) {
            return Err(SequorError::Config(
                "refresh_test_every must be at least one step".to_string(),
            ));
        }
        Ok(())
    }
}

/// Score a belief on a held-out batch: mean NLL always, accuracy and
/// calibration for labels, RMSE for real targets.
pub fn score<B: BeliefState>(
    model: &LikelihoodModel,
    belief: &B,
    test: &Batch,
    step: usize,
) -> Result<EvalRecord> {
    let pred = model.predictive(belief, &test.x_nd)?;
    let nll = metrics::nll(&pred, &test.y)?;

    Ok(match &test.y {
        Targets::Labels(_) => EvalRecord {
            step,
            nll,
            accuracy: Some(metrics::accuracy(&pred, &test.y)?),
            ece: Some(metrics::expected_calibration_error(&pred, &test.y)?),
            rmse: None,
        },
        Targets::Real(_) => EvalRecord {
            step,
            nll,
            accuracy: None,
            ece: None,
            rmse: Some(metrics::rmse(&pred, &test.y)?),
        },
    })
}

/// Run one agent down one observation stream, scoring the belief
/// before each update so a record at step t only ever reflects
/// observations 1..t-1. Returns the final belief and the in-memory
/// trace; every record also goes to `sink` as it is produced.
///
/// The stream is a pure function of `config.seed`: initialization,
/// train draws, test draws and update randomness live on separate
/// derived key lanes.
pub fn evaluate_stream<A: InferenceAlgorithm>(
    agent: &A,
    model: &LikelihoodModel,
    env: &Environment,
    config: &RunConfig,
    sink: &mut impl RecordSink,
) -> Result<(A::Belief, Vec<EvalRecord>)> {
    config.validate()?;
    model.check_compatible(env.descriptor())?;

    let seed = config.seed;
    let mut test = env.test_batch(derive_key(seed, KEY_TEST), config.n_test)?;
    let mut belief = agent.init_belief(model, derive_key(seed, KEY_INIT))?;

    info!(
        "{}: {} steps, {} test rows, seed {}",
        agent.name(),
        config.n_steps,
        config.n_test,
        seed
    );

    let pb = ProgressBar::new(config.n_steps as u64);
    if !config.show_progress || config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut trace = Vec::new();
    for tt in 1..=config.n_steps {
        if let Some(every) = config.refresh_test_every {
            if tt > 1 && (tt - 1) % every == 0 {
                test = env
                    .test_batch(derive_step_key(seed, KEY_TEST, tt), config.n_test)
                    .map_err(|err| err.at_step(tt))?;
            }
        }

        if (tt - 1) % config.eval_every == 0 {
            let record = score(model, &belief, &test, tt)?;
            if config.verbose {
                info!("[{}] nll: {}", tt, record.nll);
            }
            sink.append(&record)?;
            trace.push(record);
        }

        let batch = env
            .train_batch(derive_step_key(seed, KEY_TRAIN, tt), 1)
            .map_err(|err| err.at_step(tt))?;

        belief = agent
            .update(
                model,
                belief,
                &batch,
                tt,
                derive_step_key(seed, KEY_UPDATE, tt),
            )
            .map_err(|err| err.at_step(tt))?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok((belief, trace))
}

/// Independent replicates of the same run over derived seeds, one
/// environment per replicate, executed in parallel. Progress bars and
/// sinks are per-run concerns and stay silent here; the traces come
/// back in replicate order.
pub fn evaluate_replicates<A, E>(
    agent: &A,
    model: &LikelihoodModel,
    make_env: E,
    config: &RunConfig,
    n_replicates: usize,
) -> Result<Vec<Vec<EvalRecord>>>
where
    A: InferenceAlgorithm + Sync,
    E: Fn(u64) -> Result<Environment> + Sync,
{
    if n_replicates == 0 {
        return Err(SequorError::Config(
            "need at least one replicate".to_string(),
        ));
    }

    (0..n_replicates)
        .into_par_iter()
        .map(|rr| {
            let rep_seed = derive_key(config.seed, rr as u64);
            let env = make_env(rep_seed)?;
            let rep_config = RunConfig {
                seed: rep_seed,
                show_progress: false,
                ..*config
            };
            let (_belief, trace) =
                evaluate_stream(agent, model, &env, &rep_config, &mut NullSink)?;
            Ok(trace)
        })
        .collect()
}
