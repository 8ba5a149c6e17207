pub use log::{debug, info, warn};

pub use matrix_rand::keys::{derive_key, derive_step_key};

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

// key derivation lanes used across one run
pub const KEY_INIT: u64 = 1;
pub const KEY_TRAIN: u64 = 2;
pub const KEY_TEST: u64 = 3;
pub const KEY_UPDATE: u64 = 4;
