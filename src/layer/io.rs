use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::{common, layer::Layer};

impl Layer {
    /// Read a layer from a local file. The container is chosen from the extension:
    /// `.shp` (with `.dbf`/`.prj` sidecars), `.gpkg`, `.geojson`/`.json`, or a `.zip` holding a shapefile.
    pub fn read(path: &Path) -> Result<Self> {
        common::require_file_exists(path)?;

        if common::has_extension(path, "shp") {
            Self::read_shapefile(path)
        } else if common::has_extension(path, "gpkg") {
            Self::read_geopackage(path)
        } else if common::has_extension(path, "geojson") || common::has_extension(path, "json") {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read GeoJSON file: {}", path.display()))?;
            Self::from_geojson_bytes(&bytes)
                .with_context(|| format!("Failed to load layer from {}", path.display()))
        } else if common::has_extension(path, "zip") {
            let dir = tempfile::tempdir().context("create temp dir")?;
            common::extract_zip(path, dir.path())?;
            let shp = common::find_with_extension(dir.path(), "shp")?;
            Self::read_shapefile(&shp)
                .with_context(|| format!("Failed to load layer from {}", path.display()))
        } else {
            bail!("unsupported dataset format: {}", path.display())
        }
    }

    /// Read a layer from a path or an `http(s)://` URL.
    pub fn read_source(source: &str) -> Result<Self> {
        if common::is_url(source) { Self::read_url(source) } else { Self::read(Path::new(source)) }
    }

    #[cfg(feature = "download")]
    fn read_url(url: &str) -> Result<Self> {
        let (_dir, path) = common::download_to_temp(url)?;
        Self::read(&path).with_context(|| format!("Failed to load layer from {url}"))
    }

    #[cfg(not(feature = "download"))]
    fn read_url(url: &str) -> Result<Self> {
        bail!("reading from URLs requires the `download` feature: {url}")
    }

    /// Parse a layer from GeoJSON bytes.
    pub fn from_geojson_bytes(bytes: &[u8]) -> Result<Self> {
        let features = common::read_geojson_bytes(bytes)?;
        if features.non_polygonal > 0 {
            warn!(count = features.non_polygonal, "features without area will not contribute to overlays");
        }
        let data = common::attributes_to_dataframe(&features.names, &features.rows)?;
        debug!(features = features.shapes.len(), columns = data.width(), epsg = ?features.epsg, "read GeoJSON layer");
        Self::new(features.shapes, data, features.epsg)
    }

    fn read_geopackage(path: &Path) -> Result<Self> {
        let features = common::read_geopackage(path)?;
        if features.non_polygonal > 0 {
            warn!(count = features.non_polygonal, path = %path.display(), "features without area will not contribute to overlays");
        }
        let data = common::attributes_to_dataframe(&features.names, &features.rows)?;
        debug!(table = %features.table, features = features.shapes.len(), columns = data.width(), epsg = ?features.epsg, path = %path.display(), "read GeoPackage layer");
        Self::new(features.shapes, data, features.epsg)
    }

    fn read_shapefile(path: &Path) -> Result<Self> {
        let features = common::read_shapefile(path)?;
        if features.non_polygonal > 0 {
            warn!(count = features.non_polygonal, path = %path.display(), "features without area will not contribute to overlays");
        }
        let data = common::attributes_to_dataframe(&features.names, &features.rows)?;
        debug!(features = features.shapes.len(), columns = data.width(), epsg = ?features.epsg, path = %path.display(), "read shapefile layer");
        Self::new(features.shapes, data, features.epsg)
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::DataType;

    use super::*;
    use crate::common::write_geopackage;

    #[test]
    fn reads_geojson_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.geojson");
        fs::write(&path, r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "pop": 5 },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] } }
            ]
        }"#).unwrap();

        let layer = Layer::read(&path).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.columns(), ["pop"]);
        assert_eq!(layer.epsg(), None);
    }

    #[test]
    fn reads_geopackage_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.gpkg");
        write_geopackage(&path, 2056, &[(Some(3.0), "U", true), (Some(5.0), "R", false), (None, "R", true)]);

        let layer = Layer::read(&path).unwrap();
        assert_eq!(layer.len(), 3);
        assert_eq!(layer.epsg(), Some(2056));
        assert_eq!(layer.columns(), ["DENS", "TYPO", "URBAIN"]);
        assert_eq!(layer.data().column("DENS").unwrap().dtype(), &DataType::Float64);
        assert_eq!(layer.data().column("URBAIN").unwrap().dtype(), &DataType::Boolean);
    }

    #[test]
    fn empty_geopackage_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.gpkg");
        fs::write(&path, b"").unwrap();
        assert!(Layer::read(&path).is_err());
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.kml");
        fs::write(&path, b"<kml/>").unwrap();
        assert!(Layer::read(&path).is_err());
    }

    #[test]
    fn missing_path_is_error() {
        assert!(Layer::read_source("/definitely/not/here.geojson").is_err());
    }
}
