pub mod dmatrix_sample; // seeded random matrix sampling
pub mod keys; // sub-seed derivation
pub mod stat; // softmax, one-hot, and other numeric helpers
pub mod traits;
