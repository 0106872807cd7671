mod attrs;
#[cfg(feature = "download")]
mod download;
mod geojson;
mod gpkg;
mod shp;
mod wkb;

pub(crate) use attrs::*;
#[cfg(feature = "download")]
pub(crate) use download::*;
pub(crate) use geojson::*;
pub(crate) use gpkg::*;
pub(crate) use shp::*;
