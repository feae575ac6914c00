pub mod sampling_service;

pub use sampling_service::{RunStats, SampleMode, SamplingService};
