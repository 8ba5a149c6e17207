use crate::belief::VariationalBelief;
use crate::common::*;
use crate::data::Batch;
use crate::errors::{Result, SequorError};
use crate::gradients;
use crate::likelihood::LikelihoodModel;
use crate::sgd::LearningRate;
use crate::traits::InferenceAlgorithm;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Configuration of the sequential variational agent
#[derive(Debug, Clone, Copy)]
pub struct SviConfig {
    pub learning_rate: LearningRate,
    /// inner gradient steps taken per observation
    pub steps_per_update: usize,
    /// Monte Carlo draws per gradient estimate
    pub mc_samples: usize,
    /// weight of the KL term against the step-entry posterior
    pub kl_weight: f32,
    /// standard deviation of the initial isotropic posterior
    pub prior_sd: f32,
}

impl Default for SviConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(0.05),
            steps_per_update: 1,
            mc_samples: 8,
            kl_weight: 1.0,
            prior_sd: 1.0,
        }
    }
}

impl SviConfig {
    fn validate(&self) -> Result<()> {
        self.learning_rate.validate()?;
        if self.steps_per_update == 0 {
            return Err(SequorError::Config(
                "steps_per_update must be at least one".to_string(),
            ));
        }
        if self.mc_samples == 0 {
            return Err(SequorError::Config(
                "mc_samples must be at least one".to_string(),
            ));
        }
        if !self.kl_weight.is_finite() || self.kl_weight < 0.0 {
            return Err(SequorError::Config(format!(
                "kl_weight must be non-negative, got {}",
                self.kl_weight
            )));
        }
        if !self.prior_sd.is_finite() || self.prior_sd <= 0.0 {
            return Err(SequorError::Config(format!(
                "prior_sd must be positive, got {}",
                self.prior_sd
            )));
        }
        Ok(())
    }
}

/// Streaming variational inference over a diagonal Gaussian
/// posterior. Each observation re-anchors the KL term at the
/// posterior the step entered with, so earlier evidence keeps its
/// pull while the likelihood of the new batch is optimized by
/// reparameterized gradients.
#[derive(Debug, Clone)]
pub struct SequentialViAgent {
    pub config: SviConfig,
}

impl SequentialViAgent {
    pub fn new(config: SviConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl InferenceAlgorithm for SequentialViAgent {
    type Belief = VariationalBelief;

    fn name(&self) -> &'static str {
        "sequential-vi"
    }

    fn init_belief(&self, model: &LikelihoodModel, _key: u64) -> Result<VariationalBelief> {
        Ok(VariationalBelief::isotropic(
            model.feature_dim(),
            model.n_outputs(),
            self.config.prior_sd,
        ))
    }

    fn update(
        &self,
        model: &LikelihoodModel,
        mut belief: VariationalBelief,
        batch: &Batch,
        step: usize,
        key: u64,
    ) -> Result<VariationalBelief> {
        let phi_np = model.features().apply(&batch.x_nd)?;
        let anchor = belief.clone();
        let mut rng = StdRng::seed_from_u64(key);
        let eta = self.config.learning_rate.at(step);
        let n_draws = self.config.mc_samples as f32;

        for _ in 0..self.config.steps_per_update {
            let dim = belief.mean.len();
            let sd_q = belief.sd();
            let mut grad_mean = DVec::zeros(dim);
            let mut grad_ln_sd = DVec::zeros(dim);
            let mut nll = 0.0_f32;

            for _ in 0..self.config.mc_samples {
                let (theta_q, eps_q) = belief.draw(&mut rng);
                let (draw_nll, g_theta) =
                    gradients::nll_and_grad_flat(model, &theta_q, &phi_np, &batch.y)?;
                nll += draw_nll;
                grad_ln_sd += g_theta.component_mul(&eps_q).component_mul(&sd_q);
                grad_mean += g_theta;
            }
            grad_mean /= n_draws;
            grad_ln_sd /= n_draws;
            nll /= n_draws;

            let (kl, kl_mean, kl_ln_sd) =
                gradients::kl_diag_gaussian(&belief.mean, &belief.ln_sd, &anchor.mean, &anchor.ln_sd);

            if !(nll + self.config.kl_weight * kl).is_finite() {
                return Err(SequorError::NumericalDivergence {
                    step,
                    quantity: "variational objective".to_string(),
                });
            }

            belief.mean -= (grad_mean + kl_mean * self.config.kl_weight) * eta;
            belief.ln_sd -= (grad_ln_sd + kl_ln_sd * self.config.kl_weight) * eta;

            if !belief.is_finite() {
                return Err(SequorError::NumericalDivergence {
                    step,
                    quantity: "variational parameters".to_string(),
                });
            }
        }

        Ok(belief)
    }
}
