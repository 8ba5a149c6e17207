pub mod belief; // posterior representations over weight matrices
pub mod common;
pub mod data; // observation batches and targets
pub mod ensemble; // deep ensembles with randomized prior anchors
pub mod environment; // seeded data-generating processes
pub mod errors; // the error taxonomy
pub mod evaluate; // the sequential evaluation loop
pub mod features; // opaque input transforms
pub mod gradients; // closed-form losses and gradients
pub mod kalman; // exact and extended Kalman filtering
pub mod likelihood; // Gaussian and categorical observation models
pub mod metrics; // scoring functions over predictive distributions
pub mod records; // evaluation traces and sinks
pub mod samplers; // seeded input generators
pub mod sequential_vi; // streaming variational inference
pub mod sgd; // single-step gradient agent
pub mod traits; // agent, belief and sink interfaces
