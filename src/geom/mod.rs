mod algorithm;
mod geom;

pub(crate) use geom::Geometries;

pub use algorithm::buffer::{buffer_drawing, BUFFER_RADIUS};
pub(crate) use algorithm::proj::reproject_shape;
pub use algorithm::proj::WGS84;
