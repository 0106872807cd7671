//! Domain errors that callers are expected to match on.
//!
//! Plumbing failures (unreadable files, malformed archives, polars errors) travel
//! as `anyhow::Error` with context; these variants are the recoverable conditions
//! of an aggregation run and can be recovered with `anyhow::Error::downcast_ref`.

use polars::prelude::DataType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The drawing carries no polygon, so there is nothing to aggregate over.
    #[error("drawing has no geometry")]
    EmptyGeometry,

    /// A variable column whose dtype cannot be aggregated as declared.
    #[error("variable '{variable}' has unsupported type {dtype} for {expected} aggregation")]
    UnsupportedType {
        variable: String,
        dtype: DataType,
        expected: &'static str,
    },

    /// The column selected as source of an override is not in the override dataset.
    #[error("override for '{variable}': column '{column}' not found in dataset")]
    MissingOverrideColumn { variable: String, column: String },

    /// A variable name that the grid's catalog does not declare.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// An EPSG code with no known projection definition.
    #[error("unsupported coordinate reference system EPSG:{0}")]
    UnknownCrs(u32),

    /// The grid source did not declare a CRS and none was configured.
    #[error("grid CRS is unknown; set an explicit EPSG code")]
    MissingCrs,
}
