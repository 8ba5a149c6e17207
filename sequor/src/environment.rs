use crate::common::*;
use crate::data::{Batch, Targets};
use crate::errors::{Result, SequorError};
use crate::features::FeatureMap;
use crate::samplers::{self, XSampler};

use matrix_rand::{dmatrix_sample, stat};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{weighted::WeightedIndex, Distribution};
use std::sync::Arc;

/// Ground-truth map from raw inputs to the natural parameter of the
/// observation distribution (means for regression, logits for
/// classification)
pub type ApplyFn = Arc<dyn Fn(&Mat) -> Mat + Send + Sync>;

/// Draws a complete `(x, y)` batch: given the ground truth, an input
/// sampler, a batch size and a key, produce the observations. The key
/// fully determines the batch.
pub type SampleFn =
    Arc<dyn Fn(&ApplyFn, &XSampler, usize, u64) -> Result<Batch> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Regression { n_outputs: usize },
    Classification { n_classes: usize },
}

impl TaskKind {
    /// columns of the natural parameter (class count doubles as the
    /// logit width)
    pub fn n_outputs(&self) -> usize {
        match self {
            TaskKind::Regression { n_outputs } => *n_outputs,
            TaskKind::Classification { n_classes } => *n_classes,
        }
    }
}

/// Everything a model must agree with before a run starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub input_dim: usize,
    pub task: TaskKind,
    pub seed: u64,
}

/// Seeded data-generating process. Train and test inputs come from
/// separate samplers; targets come from `sample` driven by the shared
/// ground truth. Identical keys yield identical batches.
#[derive(Clone)]
pub struct Environment {
    descriptor: EnvironmentDescriptor,
    x_train: XSampler,
    x_test: XSampler,
    sample: SampleFn,
    apply_fn: ApplyFn,
}

impl Environment {
    pub fn from_parts(
        descriptor: EnvironmentDescriptor,
        x_train: XSampler,
        x_test: XSampler,
        sample: SampleFn,
        apply_fn: ApplyFn,
    ) -> Self {
        Self {
            descriptor,
            x_train,
            x_test,
            sample,
            apply_fn,
        }
    }

    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    /// noiseless ground truth at the given inputs
    pub fn truth(&self, x_nd: &Mat) -> Mat {
        (self.apply_fn)(x_nd)
    }

    pub fn train_batch(&self, key: u64, nn: usize) -> Result<Batch> {
        let batch = (self.sample)(&self.apply_fn, &self.x_train, nn, key)?;
        self.checked(batch, nn)
    }

    pub fn test_batch(&self, key: u64, nn: usize) -> Result<Batch> {
        let batch = (self.sample)(&self.apply_fn, &self.x_test, nn, key)?;
        self.checked(batch, nn)
    }

    /// Shape and range checks on everything the generator returned.
    /// Violations are sampling errors; the evaluation loop stamps the
    /// step index on them.
    fn checked(&self, batch: Batch, nn: usize) -> Result<Batch> {
        let dd = self.descriptor.input_dim;
        if batch.x_nd.shape() != (nn, dd) {
            return Err(SequorError::Sampling {
                step: 0,
                reason: format!(
                    "inputs are {} x {}, expected {} x {}",
                    batch.x_nd.nrows(),
                    batch.x_nd.ncols(),
                    nn,
                    dd
                ),
            });
        }
        if !stat::all_finite(&batch.x_nd) {
            return Err(SequorError::Sampling {
                step: 0,
                reason: "non-finite inputs".to_string(),
            });
        }

        match (&self.descriptor.task, &batch.y) {
            (TaskKind::Regression { n_outputs }, Targets::Real(y_nk)) => {
                if y_nk.shape() != (nn, *n_outputs) {
                    return Err(SequorError::Sampling {
                        step: 0,
                        reason: format!(
                            "targets are {} x {}, expected {} x {}",
                            y_nk.nrows(),
                            y_nk.ncols(),
                            nn,
                            n_outputs
                        ),
                    });
                }
                if !stat::all_finite(y_nk) {
                    return Err(SequorError::Sampling {
                        step: 0,
                        reason: "non-finite targets".to_string(),
                    });
                }
            }
            (TaskKind::Classification { n_classes }, Targets::Labels(labels)) => {
                if labels.len() != nn {
                    return Err(SequorError::Sampling {
                        step: 0,
                        reason: format!("{} labels for a batch of {}", labels.len(), nn),
                    });
                }
                if let Some(bad) = labels.iter().find(|&&label| label >= *n_classes) {
                    return Err(SequorError::Sampling {
                        step: 0,
                        reason: format!("label {} out of range for {} classes", bad, n_classes),
                    });
                }
            }
            _ => {
                return Err(SequorError::Sampling {
                    step: 0,
                    reason: "targets do not match the declared task".to_string(),
                });
            }
        }
        Ok(batch)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// `y = f(x) + noise_sd * eps`, inputs and noise on separate key lanes
pub fn regression_sample_fn(noise_sd: f32) -> SampleFn {
    Arc::new(move |apply_fn, x_sampler, nn, key| {
        let x_nd = x_sampler(derive_key(key, 1), nn);
        let mean_nk = apply_fn(&x_nd);
        let mut rng = StdRng::seed_from_u64(derive_key(key, 2));
        let noise_nk =
            dmatrix_sample::rnorm_with(mean_nk.nrows(), mean_nk.ncols(), (0.0, noise_sd), &mut rng);
        Ok(Batch {
            x_nd,
            y: Targets::Real(mean_nk + noise_nk),
        })
    })
}

/// `y ~ Categorical(softmax(f(x)))`, one derived key per row
pub fn classification_sample_fn() -> SampleFn {
    Arc::new(move |apply_fn, x_sampler, nn, key| {
        let x_nd = x_sampler(derive_key(key, 1), nn);
        let prob_nk = stat::softmax_rows(&apply_fn(&x_nd));
        let label_key = derive_key(key, 2);

        let mut labels = Vec::with_capacity(nn);
        for ii in 0..nn {
            let weights = prob_nk.row(ii).iter().copied().collect::<Vec<_>>();
            let dist = WeightedIndex::new(&weights).map_err(|err| SequorError::Sampling {
                step: 0,
                reason: format!("class probabilities at row {}: {}", ii, err),
            })?;
            let mut rng = StdRng::seed_from_u64(derive_key(label_key, ii as u64));
            labels.push(dist.sample(&mut rng));
        }
        Ok(Batch {
            x_nd,
            y: Targets::Labels(labels),
        })
    })
}

/// Linear-Gaussian data `y = [1, x] W + eps` with known weights.
/// `true_weights_pk` carries the bias in its first row; `obs_noise`
/// is the observation variance.
pub fn linear_regression(seed: u64, true_weights_pk: Mat, obs_noise: f32) -> Result<Environment> {
    if true_weights_pk.nrows() < 2 || true_weights_pk.ncols() == 0 {
        return Err(SequorError::Config(format!(
            "ground-truth weights are {} x {}; need a bias row and at least one output",
            true_weights_pk.nrows(),
            true_weights_pk.ncols()
        )));
    }
    if !obs_noise.is_finite() || obs_noise <= 0.0 {
        return Err(SequorError::Config(format!(
            "obs_noise must be positive, got {}",
            obs_noise
        )));
    }

    let input_dim = true_weights_pk.nrows() - 1;
    let n_outputs = true_weights_pk.ncols();
    let features = FeatureMap::with_bias(input_dim);
    let apply_fn: ApplyFn = Arc::new(move |x_nd| features.apply_raw(x_nd) * &true_weights_pk);

    Ok(Environment::from_parts(
        EnvironmentDescriptor {
            input_dim,
            task: TaskKind::Regression { n_outputs },
            seed,
        },
        samplers::standard_normal_sampler(input_dim),
        samplers::standard_normal_sampler(input_dim),
        regression_sample_fn(obs_noise.sqrt()),
        apply_fn,
    ))
}

/// Linear-Gaussian data with weights drawn once from the seed
pub fn random_linear_regression(
    seed: u64,
    input_dim: usize,
    n_outputs: usize,
    weight_scale: f32,
    obs_noise: f32,
) -> Result<Environment> {
    if input_dim == 0 || n_outputs == 0 {
        return Err(SequorError::Config(
            "input_dim and n_outputs must be at least one".to_string(),
        ));
    }
    if !weight_scale.is_finite() || weight_scale <= 0.0 {
        return Err(SequorError::Config(format!(
            "weight_scale must be positive, got {}",
            weight_scale
        )));
    }
    let mut rng = StdRng::seed_from_u64(derive_key(seed, 0));
    let true_weights_pk =
        dmatrix_sample::rnorm_with(input_dim + 1, n_outputs, (0.0, weight_scale), &mut rng);
    linear_regression(seed, true_weights_pk, obs_noise)
}

/// 1-D `y = sin(amplitude * x) + eps`: random uniform train inputs
/// over `[-3, 3]`, an evenly spaced test grid over the same range
pub fn sin_wave_regression(seed: u64, amplitude: f32, obs_noise: f32) -> Result<Environment> {
    if !amplitude.is_finite() || amplitude == 0.0 {
        return Err(SequorError::Config(format!(
            "amplitude must be finite and nonzero, got {}",
            amplitude
        )));
    }
    if !obs_noise.is_finite() || obs_noise <= 0.0 {
        return Err(SequorError::Config(format!(
            "obs_noise must be positive, got {}",
            obs_noise
        )));
    }

    let apply_fn: ApplyFn = Arc::new(move |x_nd: &Mat| x_nd.map(|v| (amplitude * v).sin()));
    Ok(Environment::from_parts(
        EnvironmentDescriptor {
            input_dim: 1,
            task: TaskKind::Regression { n_outputs: 1 },
            seed,
        },
        samplers::uniform_sampler(1, -3.0, 3.0),
        samplers::evenly_spaced_sampler(-3.0, 3.0),
        regression_sample_fn(obs_noise.sqrt()),
        apply_fn,
    ))
}

/// Labels drawn from softmax logits `[1, x] W` with `W` drawn once
/// from the seed. Large `weight_scale` makes the classes nearly
/// separable.
pub fn linear_classification(
    seed: u64,
    input_dim: usize,
    n_classes: usize,
    weight_scale: f32,
) -> Result<Environment> {
    if input_dim == 0 {
        return Err(SequorError::Config(
            "input_dim must be at least one".to_string(),
        ));
    }
    if n_classes < 2 {
        return Err(SequorError::Config(format!(
            "classification needs at least two classes, got {}",
            n_classes
        )));
    }
    if !weight_scale.is_finite() || weight_scale <= 0.0 {
        return Err(SequorError::Config(format!(
            "weight_scale must be positive, got {}",
            weight_scale
        )));
    }

    let mut rng = StdRng::seed_from_u64(derive_key(seed, 0));
    let true_weights_pk =
        dmatrix_sample::rnorm_with(input_dim + 1, n_classes, (0.0, weight_scale), &mut rng);
    let features = FeatureMap::with_bias(input_dim);
    let apply_fn: ApplyFn = Arc::new(move |x_nd| features.apply_raw(x_nd) * &true_weights_pk);

    Ok(Environment::from_parts(
        EnvironmentDescriptor {
            input_dim,
            task: TaskKind::Classification { n_classes },
            seed,
        },
        samplers::standard_normal_sampler(input_dim),
        samplers::standard_normal_sampler(input_dim),
        classification_sample_fn(),
        apply_fn,
    ))
}

/// Single-output polynomial ground truth with random coefficients
pub fn polynomial_regression(
    seed: u64,
    input_dim: usize,
    degree: usize,
    weight_scale: f32,
    obs_noise: f32,
) -> Result<Environment> {
    if !weight_scale.is_finite() || weight_scale <= 0.0 {
        return Err(SequorError::Config(format!(
            "weight_scale must be positive, got {}",
            weight_scale
        )));
    }
    if !obs_noise.is_finite() || obs_noise <= 0.0 {
        return Err(SequorError::Config(format!(
            "obs_noise must be positive, got {}",
            obs_noise
        )));
    }

    let features = FeatureMap::polynomial(input_dim, degree)?;
    let mut rng = StdRng::seed_from_u64(derive_key(seed, 0));
    let true_weights_pk =
        dmatrix_sample::rnorm_with(features.output_dim(), 1, (0.0, weight_scale), &mut rng);
    let apply_fn: ApplyFn = Arc::new(move |x_nd| features.apply_raw(x_nd) * &true_weights_pk);

    Ok(Environment::from_parts(
        EnvironmentDescriptor {
            input_dim,
            task: TaskKind::Regression { n_outputs: 1 },
            seed,
        },
        samplers::uniform_sampler(input_dim, -2.0, 2.0),
        samplers::uniform_sampler(input_dim, -2.0, 2.0),
        regression_sample_fn(obs_noise.sqrt()),
        apply_fn,
    ))
}

/// Labels from softmax of a random polynomial of the inputs
pub fn polynomial_classification(
    seed: u64,
    input_dim: usize,
    degree: usize,
    n_classes: usize,
    weight_scale: f32,
) -> Result<Environment> {
    if n_classes < 2 {
        return Err(SequorError::Config(format!(
            "classification needs at least two classes, got {}",
            n_classes
        )));
    }
    if !weight_scale.is_finite() || weight_scale <= 0.0 {
        return Err(SequorError::Config(format!(
            "weight_scale must be positive, got {}",
            weight_scale
        )));
    }

    let features = FeatureMap::polynomial(input_dim, degree)?;
    let mut rng = StdRng::seed_from_u64(derive_key(seed, 0));
    let true_weights_pk =
        dmatrix_sample::rnorm_with(features.output_dim(), n_classes, (0.0, weight_scale), &mut rng);
    let apply_fn: ApplyFn = Arc::new(move |x_nd| features.apply_raw(x_nd) * &true_weights_pk);

    Ok(Environment::from_parts(
        EnvironmentDescriptor {
            input_dim,
            task: TaskKind::Classification { n_classes },
            seed,
        },
        samplers::uniform_sampler(input_dim, -2.0, 2.0),
        samplers::uniform_sampler(input_dim, -2.0, 2.0),
        classification_sample_fn(),
        apply_fn,
    ))
}
