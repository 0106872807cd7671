mod cache;
mod grid;
mod variable;

pub use cache::GridCache;
pub use grid::{Grid, GridSource};
pub use variable::{Variable, VariableCatalog, VariableKind};
