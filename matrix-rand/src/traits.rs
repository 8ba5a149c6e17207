use rand::Rng;

/// Operations to sample random matrices through an explicit RNG, so
/// the same seed always reproduces the same matrix. Implemented for
/// `nalgebra::DMatrix<f32>`.
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a `dd x nn` matrix from a uniform distribution `U(0,1)`
    fn runif(dd: usize, nn: usize, rng: &mut impl Rng) -> Self::Mat;

    /// Sample a `dd x nn` matrix from a normal distribution `N(0,1)`
    fn rnorm(dd: usize, nn: usize, rng: &mut impl Rng) -> Self::Mat;

    /// Sample a `dd x nn` matrix from `N(mu, sigma^2)` where `param`
    /// is `(mu, sigma)`
    fn rnorm_with(
        dd: usize,
        nn: usize,
        param: (Self::Scalar, Self::Scalar),
        rng: &mut impl Rng,
    ) -> Self::Mat;

    /// Sample a `dd x nn` matrix from `N(0,1)` filling columns in
    /// parallel, column `j` drawing from its own RNG seeded by
    /// `derive_key(key, j)`
    fn rnorm_columns(dd: usize, nn: usize, key: u64) -> Self::Mat;
}
