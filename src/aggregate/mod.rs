mod engine;
mod result;

pub use engine::aggregate;
pub use result::{AggregatedValue, AggregationResult};
