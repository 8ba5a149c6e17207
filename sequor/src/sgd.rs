use crate::belief::PointBelief;
use crate::common::*;
use crate::data::Batch;
use crate::errors::{Result, SequorError};
use crate::gradients;
use crate::likelihood::LikelihoodModel;
use crate::traits::InferenceAlgorithm;

use matrix_rand::dmatrix_sample;
use matrix_rand::stat;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Learning-rate schedule shared by the gradient-based agents
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    Constant(f32),
    /// `eta_t = eta0 / (1 + decay * t)`
    InverseDecay { eta0: f32, decay: f32 },
}

impl LearningRate {
    pub fn at(&self, tt: usize) -> f32 {
        match *self {
            LearningRate::Constant(eta) => eta,
            LearningRate::InverseDecay { eta0, decay } => eta0 / (1.0 + decay * tt as f32),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let (eta, decay) = match *self {
            LearningRate::Constant(eta) => (eta, 0.0),
            LearningRate::InverseDecay { eta0, decay } => (eta0, decay),
        };
        if !eta.is_finite() || eta <= 0.0 || !decay.is_finite() || decay < 0.0 {
            return Err(SequorError::Config(format!(
                "invalid learning rate schedule {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Configuration of the point-estimate gradient agent
#[derive(Debug, Clone, Copy)]
pub struct SgdConfig {
    pub learning_rate: LearningRate,
    /// standard deviation of the initial weights; zero starts at the
    /// origin
    pub init_scale: f32,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            learning_rate: LearningRate::Constant(0.05),
            init_scale: 0.1,
        }
    }
}

impl SgdConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.learning_rate.validate()?;
        if !self.init_scale.is_finite() || self.init_scale < 0.0 {
            return Err(SequorError::Config(format!(
                "init_scale must be non-negative, got {}",
                self.init_scale
            )));
        }
        Ok(())
    }
}

/// Point-estimate agent: one gradient step on each new observation,
/// `W <- W - eta_t * grad`
#[derive(Debug, Clone)]
pub struct SgdAgent {
    pub config: SgdConfig,
}

impl SgdAgent {
    pub fn new(config: SgdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

/// Draw initial weights from `N(0, init_scale^2)`
pub(crate) fn init_weights(model: &LikelihoodModel, init_scale: f32, key: u64) -> Mat {
    let pp = model.feature_dim();
    let kk = model.n_outputs();
    if init_scale == 0.0 {
        Mat::zeros(pp, kk)
    } else {
        let mut rng = StdRng::seed_from_u64(key);
        dmatrix_sample::rnorm_with(pp, kk, (0.0, init_scale), &mut rng)
    }
}

/// One member-level gradient step; shared with the ensemble agent,
/// which evaluates the loss at anchored weights.
pub(crate) fn gradient_step(
    model: &LikelihoodModel,
    weights_pk: &Mat,
    eval_weights_pk: &Mat,
    batch_phi_np: &Mat,
    y: &crate::data::Targets,
    eta: f32,
    step: usize,
) -> Result<Mat> {
    let (loss, grad_pk) = gradients::nll_and_grad(model, eval_weights_pk, batch_phi_np, y)?;
    if !loss.is_finite() {
        return Err(SequorError::NumericalDivergence {
            step,
            quantity: "gradient loss".to_string(),
        });
    }
    let next_pk = weights_pk - grad_pk * eta;
    if !stat::all_finite(&next_pk) {
        return Err(SequorError::NumericalDivergence {
            step,
            quantity: "updated weights".to_string(),
        });
    }
    Ok(next_pk)
}

impl InferenceAlgorithm for SgdAgent {
    type Belief = PointBelief;

    fn name(&self) -> &'static str {
        "sgd"
    }

    fn init_belief(&self, model: &LikelihoodModel, key: u64) -> Result<PointBelief> {
        // lane 0 so a one-member ensemble lands on the same prior
        Ok(PointBelief::new(init_weights(
            model,
            self.config.init_scale,
            derive_key(key, 0),
        )))
    }

    fn update(
        &self,
        model: &LikelihoodModel,
        belief: PointBelief,
        batch: &Batch,
        step: usize,
        _key: u64,
    ) -> Result<PointBelief> {
        let phi_np = model.features().apply(&batch.x_nd)?;
        let eta = self.config.learning_rate.at(step);
        let next_pk = gradient_step(
            model,
            &belief.weights_pk,
            &belief.weights_pk,
            &phi_np,
            &batch.y,
            eta,
            step,
        )?;
        Ok(PointBelief::new(next_pk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Targets;
    use crate::features::FeatureMap;
    use approx::assert_abs_diff_eq;

    #[test]
    fn one_dimensional_step_matches_hand_computation() -> anyhow::Result<()> {
        // eta = phi w, loss grad = (eta - y) phi / sigma^2
        let model = LikelihoodModel::gaussian(FeatureMap::linear(1), 1, 1.0)?;
        let agent = SgdAgent::new(SgdConfig {
            learning_rate: LearningRate::Constant(0.1),
            init_scale: 0.0,
        })?;

        let belief = agent.init_belief(&model, 0)?;
        let batch = Batch {
            x_nd: Mat::from_row_slice(1, 1, &[2.0]),
            y: Targets::Real(Mat::from_row_slice(1, 1, &[1.0])),
        };
        let next = agent.update(&model, belief, &batch, 1, 0)?;

        // w = 0, grad = (0 - 1) * 2 = -2, w' = 0.2
        assert_abs_diff_eq!(next.weights_pk[(0, 0)], 0.2, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn decayed_rate_shrinks_with_the_step_index() {
        let schedule = LearningRate::InverseDecay {
            eta0: 1.0,
            decay: 0.5,
        };
        assert_abs_diff_eq!(schedule.at(0), 1.0);
        assert_abs_diff_eq!(schedule.at(2), 0.5);
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        assert!(SgdAgent::new(SgdConfig {
            learning_rate: LearningRate::Constant(0.0),
            init_scale: 0.1,
        })
        .is_err());
        assert!(SgdAgent::new(SgdConfig {
            learning_rate: LearningRate::Constant(0.1),
            init_scale: -1.0,
        })
        .is_err());
    }
}
