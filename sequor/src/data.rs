use crate::common::Mat;

/// Observation targets: real-valued rows for regression, class labels
/// for classification
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// n x k matrix, one row per example
    Real(Mat),
    /// length-n class indices
    Labels(Vec<usize>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Real(y_nk) => y_nk.nrows(),
            Targets::Labels(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One batch of observations drawn from a stream
#[derive(Debug, Clone)]
pub struct Batch {
    pub x_nd: Mat,
    pub y: Targets,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.x_nd.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
