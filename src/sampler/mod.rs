pub mod bulk;
pub mod plan;

pub use bulk::{header, sample, BulkSampler, SampleRow, SampleValue};
pub use plan::SamplePlan;
