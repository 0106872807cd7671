mod registry;
mod resolve;

pub use registry::{OverrideRegistry, OverrideState};
pub use resolve::{resolve, Reference};
