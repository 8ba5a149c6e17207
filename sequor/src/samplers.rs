use crate::common::Mat;

use matrix_rand::dmatrix_sample;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Seeded input generator: calling it twice with the same `(key, n)`
/// must yield the same `(n, input_dim)` batch.
pub type XSampler = Arc<dyn Fn(u64, usize) -> Mat + Send + Sync>;

pub fn standard_normal_sampler(input_dim: usize) -> XSampler {
    Arc::new(move |key, nn| {
        let mut rng = StdRng::seed_from_u64(key);
        dmatrix_sample::rnorm(nn, input_dim, &mut rng)
    })
}

pub fn gaussian_sampler(input_dim: usize, loc: f32, scale: f32) -> XSampler {
    Arc::new(move |key, nn| {
        let mut rng = StdRng::seed_from_u64(key);
        dmatrix_sample::rnorm_with(nn, input_dim, (loc, scale), &mut rng)
    })
}

pub fn uniform_sampler(input_dim: usize, lo: f32, hi: f32) -> XSampler {
    Arc::new(move |key, nn| {
        let mut rng = StdRng::seed_from_u64(key);
        dmatrix_sample::runif(nn, input_dim, &mut rng).map(|u| lo + (hi - lo) * u)
    })
}

/// Inclusive 1-D grid over `[lo, hi]`. Ignores the key so repeated
/// test draws land on the same inputs.
pub fn evenly_spaced_sampler(lo: f32, hi: f32) -> XSampler {
    Arc::new(move |_key, nn| {
        if nn == 1 {
            return Mat::from_element(1, 1, 0.5 * (lo + hi));
        }
        let step = (hi - lo) / (nn as f32 - 1.0);
        Mat::from_fn(nn, 1, |ii, _| lo + step * ii as f32)
    })
}

/// Equal-weight Gaussian mixture: every row picks one of the `locs`
/// rows and jitters it with isotropic noise
pub fn gaussian_mixture_sampler(locs: Mat, scale: f32) -> XSampler {
    Arc::new(move |key, nn| {
        let dd = locs.ncols();
        let mut rng = StdRng::seed_from_u64(key);
        let mut x_nd = dmatrix_sample::rnorm_with(nn, dd, (0.0, scale), &mut rng);
        for ii in 0..nn {
            let cc = rng.random_range(0..locs.nrows());
            for jj in 0..dd {
                x_nd[(ii, jj)] += locs[(cc, jj)];
            }
        }
        x_nd
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn same_key_same_batch() {
        let sampler = standard_normal_sampler(3);
        assert_eq!(sampler(9, 5), sampler(9, 5));
        assert_ne!(sampler(9, 5), sampler(10, 5));
    }

    #[test]
    fn uniform_respects_bounds() {
        let sampler = uniform_sampler(2, -1.0, 3.0);
        let x_nd = sampler(0, 100);
        assert_eq!(x_nd.shape(), (100, 2));
        assert!(x_nd.iter().all(|&v| (-1.0..3.0).contains(&v)));
    }

    #[test]
    fn grid_hits_both_endpoints_and_ignores_the_key() {
        let sampler = evenly_spaced_sampler(-2.0, 2.0);
        let grid = sampler(1, 5);
        assert_abs_diff_eq!(grid[(0, 0)], -2.0);
        assert_abs_diff_eq!(grid[(2, 0)], 0.0);
        assert_abs_diff_eq!(grid[(4, 0)], 2.0);
        assert_eq!(grid, sampler(999, 5));

        let single = sampler(0, 1);
        assert_abs_diff_eq!(single[(0, 0)], 0.0);
    }

    #[test]
    fn mixture_is_reproducible_with_the_right_shape() {
        let locs = Mat::from_row_slice(2, 2, &[-5.0, -5.0, 5.0, 5.0]);
        let sampler = gaussian_mixture_sampler(locs, 0.5);
        let x_nd = sampler(3, 40);
        assert_eq!(x_nd.shape(), (40, 2));
        assert_eq!(x_nd, sampler(3, 40));
        // every row sits near one of the two modes
        assert!(x_nd
            .row_iter()
            .all(|row| (row[0] - row[1]).abs() < 4.0 && row[0].abs() > 1.0));
    }
}
