pub use nalgebra::{DMatrix, DVector};
pub use rand::rngs::StdRng;
pub use rand::{Rng, SeedableRng};
pub use rand_distr::StandardNormal;
pub use rayon::prelude::*;

use crate::keys::derive_key;
use crate::traits::SampleOps;

/// Sample d,n matrix from U(0,1)
pub fn runif(dd: usize, nn: usize, rng: &mut impl Rng) -> DMatrix<f32> {
    let rvec = (0..(dd * nn)).map(|_| rng.random::<f32>()).collect();
    DMatrix::<f32>::from_vec(dd, nn, rvec)
}

/// Sample d,n matrix from N(0,1)
pub fn rnorm(dd: usize, nn: usize, rng: &mut impl Rng) -> DMatrix<f32> {
    let rvec = (0..(dd * nn))
        .map(|_| rng.sample::<f32, _>(StandardNormal))
        .collect();

    DMatrix::<f32>::from_vec(dd, nn, rvec)
}

/// Sample d,n matrix from N(mu, sigma^2)
pub fn rnorm_with(dd: usize, nn: usize, param: (f32, f32), rng: &mut impl Rng) -> DMatrix<f32> {
    let (mu, sigma) = param;
    let rvec = (0..(dd * nn))
        .map(|_| mu + sigma * rng.sample::<f32, _>(StandardNormal))
        .collect();

    DMatrix::<f32>::from_vec(dd, nn, rvec)
}

/// Sample a length-d vector from N(0,1)
pub fn rnorm_vec(dd: usize, rng: &mut impl Rng) -> DVector<f32> {
    DVector::<f32>::from_iterator(dd, (0..dd).map(|_| rng.sample::<f32, _>(StandardNormal)))
}

/// Sample d,n matrix from N(0,1) filling the columns in parallel,
/// column `j` seeded by `derive_key(key, j)`
pub fn rnorm_columns(dd: usize, nn: usize, key: u64) -> DMatrix<f32> {
    if nn == 0 {
        return DMatrix::<f32>::zeros(dd, 0);
    }

    let columns: Vec<DVector<f32>> = (0..nn)
        .into_par_iter()
        .map(|jj| {
            let mut rng = StdRng::seed_from_u64(derive_key(key, jj as u64));
            rnorm_vec(dd, &mut rng)
        })
        .collect();

    DMatrix::<f32>::from_columns(&columns)
}

impl SampleOps for DMatrix<f32> {
    type Mat = DMatrix<f32>;
    type Scalar = f32;

    fn runif(dd: usize, nn: usize, rng: &mut impl Rng) -> Self::Mat {
        runif(dd, nn, rng)
    }

    fn rnorm(dd: usize, nn: usize, rng: &mut impl Rng) -> Self::Mat {
        rnorm(dd, nn, rng)
    }

    fn rnorm_with(dd: usize, nn: usize, param: (f32, f32), rng: &mut impl Rng) -> Self::Mat {
        rnorm_with(dd, nn, param, rng)
    }

    fn rnorm_columns(dd: usize, nn: usize, key: u64) -> Self::Mat {
        rnorm_columns(dd, nn, key)
    }
}
