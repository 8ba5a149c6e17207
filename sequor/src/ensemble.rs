use crate::belief::{EnsembleBelief, PointBelief};
use crate::common::*;
use crate::data::{Batch, Targets};
use crate::errors::{Result, SequorError};
use crate::likelihood::LikelihoodModel;
use crate::sgd::{gradient_step, init_weights, SgdConfig};
use crate::traits::InferenceAlgorithm;

use matrix_rand::dmatrix_sample;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

// anchors draw from their own lane so member inits stay untouched
const ANCHOR_LANE: u64 = u64::MAX;

/// Configuration of the deep-ensemble agent
#[derive(Debug, Clone, Copy)]
pub struct EnsembleConfig {
    pub n_members: usize,
    pub sgd: SgdConfig,
    /// scale of the frozen randomized prior anchors; zero disables
    /// them
    pub prior_scale: f32,
    /// per-member Gaussian target perturbation for diversity
    /// (regression targets only)
    pub perturb_sd: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_members: 5,
            sgd: SgdConfig::default(),
            prior_scale: 0.0,
            perturb_sd: 0.0,
        }
    }
}

/// k independent point estimates updated on the same observation;
/// scoring averages the member predictive distributions. One member
/// with anchors and perturbation disabled reproduces the plain SGD
/// trajectory.
#[derive(Debug, Clone)]
pub struct DeepEnsembleAgent {
    pub config: EnsembleConfig,
}

impl DeepEnsembleAgent {
    pub fn new(config: EnsembleConfig) -> Result<Self> {
        if config.n_members == 0 {
            return Err(SequorError::Config(
                "ensemble needs at least one member".to_string(),
            ));
        }
        config.sgd.validate()?;
        if !config.prior_scale.is_finite() || config.prior_scale < 0.0 {
            return Err(SequorError::Config(format!(
                "prior_scale must be non-negative, got {}",
                config.prior_scale
            )));
        }
        if !config.perturb_sd.is_finite() || config.perturb_sd < 0.0 {
            return Err(SequorError::Config(format!(
                "perturb_sd must be non-negative, got {}",
                config.perturb_sd
            )));
        }
        Ok(Self { config })
    }
}

impl InferenceAlgorithm for DeepEnsembleAgent {
    type Belief = EnsembleBelief;

    fn name(&self) -> &'static str {
        "deep-ensemble"
    }

    fn init_belief(&self, model: &LikelihoodModel, key: u64) -> Result<EnsembleBelief> {
        let members = (0..self.config.n_members)
            .map(|mm| {
                PointBelief::new(init_weights(
                    model,
                    self.config.sgd.init_scale,
                    derive_key(key, mm as u64),
                ))
            })
            .collect();

        let anchors = if self.config.prior_scale > 0.0 {
            let anchor_key = derive_key(key, ANCHOR_LANE);
            Some(
                (0..self.config.n_members)
                    .map(|mm| {
                        let mut rng = StdRng::seed_from_u64(derive_key(anchor_key, mm as u64));
                        dmatrix_sample::rnorm(model.feature_dim(), model.n_outputs(), &mut rng)
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(EnsembleBelief::new(
            members,
            anchors,
            self.config.prior_scale,
        ))
    }

    fn update(
        &self,
        model: &LikelihoodModel,
        belief: EnsembleBelief,
        batch: &Batch,
        step: usize,
        key: u64,
    ) -> Result<EnsembleBelief> {
        let phi_np = model.features().apply(&batch.x_nd)?;
        let eta = self.config.sgd.learning_rate.at(step);
        let perturb_sd = self.config.perturb_sd;
        let prior_scale = self.config.prior_scale;
        let anchors = belief.anchors;

        // member updates are mutually independent given the batch
        let members: Result<Vec<PointBelief>> = belief
            .members
            .into_par_iter()
            .enumerate()
            .map(|(mm, member)| {
                let member_key = derive_key(key, mm as u64);

                let y_m = match (&batch.y, perturb_sd > 0.0) {
                    (Targets::Real(y_nk), true) => {
                        let mut rng = StdRng::seed_from_u64(member_key);
                        let noise =
                            dmatrix_sample::rnorm_with(y_nk.nrows(), y_nk.ncols(), (0.0, perturb_sd), &mut rng);
                        Targets::Real(y_nk + noise)
                    }
                    _ => batch.y.clone(),
                };

                let eval_pk = match &anchors {
                    Some(anchors) => &member.weights_pk + &anchors[mm] * prior_scale,
                    None => member.weights_pk.clone(),
                };

                let next_pk =
                    gradient_step(model, &member.weights_pk, &eval_pk, &phi_np, &y_m, eta, step)?;
                Ok(PointBelief::new(next_pk))
            })
            .collect();

        Ok(EnsembleBelief::new(members?, anchors, prior_scale))
    }
}
