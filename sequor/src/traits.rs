use crate::common::Mat;
use crate::data::Batch;
use crate::errors::Result;
use crate::likelihood::LikelihoodModel;
use crate::records::EvalRecord;

use rand::rngs::StdRng;

/// Read-only view of a posterior over the weight matrix
pub trait BeliefState {
    /// flattened parameter count `p * k`
    fn param_dim(&self) -> usize;

    /// posterior mean or point estimate, shape `(p, k)`
    fn posterior_mean(&self) -> Mat;

    /// mixture components backing the predictive distribution; a
    /// single element for everything but ensembles
    fn components(&self) -> Vec<Mat> {
        vec![self.posterior_mean()]
    }

    /// one posterior draw of the weight matrix
    fn sample_params(&self, rng: &mut StdRng) -> Mat;
}

/// Belief-state transition function. Consumes one observation batch
/// and the current belief and produces the next belief; deterministic
/// given `(belief, batch, step, key)` and forbidden from looking ahead
/// in the stream.
pub trait InferenceAlgorithm {
    type Belief: BeliefState;

    fn name(&self) -> &'static str;

    /// prior belief before any observation arrives
    fn init_belief(&self, model: &LikelihoodModel, key: u64) -> Result<Self::Belief>;

    /// one online update; `step` is the 1-based stream position, used
    /// for schedules and error reporting
    fn update(
        &self,
        model: &LikelihoodModel,
        belief: Self::Belief,
        batch: &Batch,
        step: usize,
        key: u64,
    ) -> Result<Self::Belief>;
}

/// Append-only, order-preserving destination for evaluation records
pub trait RecordSink {
    fn append(&mut self, record: &EvalRecord) -> Result<()>;
}
