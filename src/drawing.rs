use std::{fs, path::Path};

use anyhow::{Context, Result};
use geo::MultiPolygon;

use crate::{common, error::Error, geom::{reproject_shape, WGS84}};

/// A neighborhood shape supplied by the user, with the EPSG code of its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawing {
    shape: MultiPolygon<f64>,
    epsg: u32,
}

impl Drawing {
    pub fn new(shape: MultiPolygon<f64>, epsg: u32) -> Self {
        Self { shape, epsg }
    }

    /// Parse a drawing from a GeoJSON geometry, Feature or FeatureCollection.
    /// The first feature with area is taken. Coordinates are EPSG:4326 unless
    /// the document declares a CRS.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        Self::from_geojson_bytes(text.as_bytes())
    }

    pub fn from_geojson_bytes(bytes: &[u8]) -> Result<Self> {
        let features = common::read_geojson_bytes(bytes)?;
        let epsg = features.epsg.unwrap_or(WGS84);
        let shape = features.shapes.into_iter()
            .find(|shape| !shape.0.is_empty())
            .ok_or(Error::EmptyGeometry)?;
        Ok(Self { shape, epsg })
    }

    /// Read a drawing from a GeoJSON file.
    pub fn read(path: &Path) -> Result<Self> {
        common::require_file_exists(path)?;
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read drawing: {}", path.display()))?;
        Self::from_geojson_bytes(&bytes)
            .with_context(|| format!("Failed to parse drawing {}", path.display()))
    }

    #[inline] pub fn shape(&self) -> &MultiPolygon<f64> { &self.shape }

    #[inline] pub fn epsg(&self) -> u32 { self.epsg }

    /// Whether the drawing has no polygon.
    pub fn is_empty(&self) -> bool {
        self.shape.0.iter().all(|polygon| polygon.exterior().0.is_empty())
    }

    /// The drawing with coordinates transformed to `epsg`.
    pub fn to_epsg(&self, epsg: u32) -> Result<Self> {
        Ok(Self { shape: reproject_shape(&self.shape, self.epsg, epsg)?, epsg })
    }
}
