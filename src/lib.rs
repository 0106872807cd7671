#![doc = "Quartier public API: area-weighted aggregation of gridded territorial indicators over a drawn neighborhood"]
mod aggregate;
mod common;
mod config;
mod drawing;
mod error;
mod geom;
mod grid;
mod layer;
mod overlay;
mod overrides;
mod session;

pub mod progress;

#[doc(inline)]
pub use aggregate::{aggregate, AggregatedValue, AggregationResult};

#[doc(inline)]
pub use config::{OverrideSpec, RunConfig};

#[doc(inline)]
pub use drawing::Drawing;

#[doc(inline)]
pub use error::Error;

#[doc(inline)]
pub use geom::{buffer_drawing, BUFFER_RADIUS, WGS84};

#[doc(inline)]
pub use grid::{Grid, GridCache, GridSource, Variable, VariableCatalog, VariableKind};

#[doc(inline)]
pub use layer::Layer;

#[doc(inline)]
pub use overlay::{drawing_in_boundary, Overlay, OverlayFragment};

#[doc(inline)]
pub use overrides::{resolve, OverrideRegistry, OverrideState, Reference};

#[doc(inline)]
pub use session::{RunOutcome, Session, SessionState};
