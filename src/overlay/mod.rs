mod boundary;
mod fragment;

pub use boundary::drawing_in_boundary;
pub use fragment::{Overlay, OverlayFragment};
