use crate::common::Mat;
use crate::errors::{Result, SequorError};

use std::sync::Arc;

/// Opaque input transform `x -> phi(x)` with declared dimensions.
/// The closure maps an `(n, input_dim)` batch to `(n, output_dim)`;
/// weight matrices paired with it are `(output_dim, k)`.
#[derive(Clone)]
pub struct FeatureMap {
    input_dim: usize,
    output_dim: usize,
    func: Arc<dyn Fn(&Mat) -> Mat + Send + Sync>,
}

impl FeatureMap {
    /// Wrap a user-supplied transform. The closure is probed on a
    /// one-row zero batch; a width disagreeing with `output_dim` is a
    /// fatal configuration error.
    pub fn from_fn(
        input_dim: usize,
        output_dim: usize,
        func: impl Fn(&Mat) -> Mat + Send + Sync + 'static,
    ) -> Result<Self> {
        let func = Arc::new(func);
        let probe = func(&Mat::zeros(1, input_dim));
        if probe.nrows() != 1 || probe.ncols() != output_dim {
            return Err(SequorError::Config(format!(
                "feature map produced a {} x {} batch where 1 x {} was declared",
                probe.nrows(),
                probe.ncols(),
                output_dim
            )));
        }
        Ok(Self {
            input_dim,
            output_dim,
            func,
        })
    }

    /// Identity features
    pub fn linear(input_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim: input_dim,
            func: Arc::new(|x_nd: &Mat| x_nd.clone()),
        }
    }

    /// Constant-one column prepended to the inputs: `phi(x) = [1, x]`
    pub fn with_bias(input_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim: input_dim + 1,
            func: Arc::new(|x_nd: &Mat| {
                let (nn, dd) = x_nd.shape();
                let mut phi_np = Mat::zeros(nn, dd + 1);
                phi_np.column_mut(0).fill(1.0);
                phi_np.view_mut((0, 1), (nn, dd)).copy_from(x_nd);
                phi_np
            }),
        }
    }

    /// Bias column followed by element-wise powers
    /// `x, x^2, ..., x^degree` of each input coordinate
    pub fn polynomial(input_dim: usize, degree: usize) -> Result<Self> {
        if degree < 1 {
            return Err(SequorError::Config(
                "polynomial features need degree >= 1".to_string(),
            ));
        }
        let output_dim = 1 + input_dim * degree;
        Ok(Self {
            input_dim,
            output_dim,
            func: Arc::new(move |x_nd: &Mat| {
                let (nn, dd) = x_nd.shape();
                let mut phi_np = Mat::zeros(nn, 1 + dd * degree);
                phi_np.column_mut(0).fill(1.0);
                for deg in 1..=degree {
                    let block = x_nd.map(|v| v.powi(deg as i32));
                    phi_np
                        .view_mut((0, 1 + (deg - 1) * dd), (nn, dd))
                        .copy_from(&block);
                }
                phi_np
            }),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Apply the transform, checking the batch width going in
    pub fn apply(&self, x_nd: &Mat) -> Result<Mat> {
        if x_nd.ncols() != self.input_dim {
            return Err(SequorError::Config(format!(
                "input batch has {} columns, feature map expects {}",
                x_nd.ncols(),
                self.input_dim
            )));
        }
        Ok((self.func)(x_nd))
    }

    /// Apply without the width check, for callers that construct their
    /// own inputs
    pub(crate) fn apply_raw(&self, x_nd: &Mat) -> Mat {
        (self.func)(x_nd)
    }
}

impl std::fmt::Debug for FeatureMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureMap")
            .field("input_dim", &self.input_dim)
            .field("output_dim", &self.output_dim)
            .finish()
    }
}
