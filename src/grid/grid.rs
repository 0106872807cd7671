use std::sync::OnceLock;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::Error, grid::{Variable, VariableCatalog}, layer::Layer};

/// Where a grid comes from and how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSource {
    /// Path or URL of the dataset; also the cache key.
    pub location: String,
    /// EPSG code overriding whatever the dataset declares.
    #[serde(default)]
    pub epsg: Option<u32>,
    /// Declared variables, in result order. Inferred from attribute dtypes when absent.
    #[serde(default)]
    pub variables: Option<Vec<Variable>>,
}

impl GridSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into(), epsg: None, variables: None }
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Read and validate the grid this source describes.
    pub fn load(&self) -> Result<Grid> {
        let mut layer = Layer::read_source(&self.location)
            .with_context(|| format!("Failed to read grid from {}", self.location))?;
        if let Some(epsg) = self.epsg {
            layer = layer.with_epsg(epsg);
        }
        let catalog = self.variables.clone().map(VariableCatalog::new);
        let grid = Grid::new(layer, catalog)
            .with_context(|| format!("Invalid grid {}", self.location))?;
        info!(source = %self.location, cells = grid.len(), variables = grid.catalog().len(), epsg = grid.epsg(), "loaded grid");
        Ok(grid)
    }
}

/// Immutable set of grid cells carrying territorial variables, in a single CRS.
#[derive(Debug)]
pub struct Grid {
    layer: Layer,
    epsg: u32,
    catalog: VariableCatalog,
    extent: OnceLock<Option<MultiPolygon<f64>>>, // Dissolved union of all cells, computed on demand
}

impl Grid {
    /// Build a grid from a layer. With no catalog, every attribute column becomes a variable.
    pub fn new(layer: Layer, catalog: Option<VariableCatalog>) -> Result<Self> {
        let epsg = layer.epsg().ok_or(Error::MissingCrs)?;
        let catalog = match catalog {
            Some(catalog) => {
                catalog.validate(layer.data())?;
                catalog
            }
            None => VariableCatalog::infer(layer.data())?,
        };
        Ok(Self { layer, epsg, catalog, extent: OnceLock::new() })
    }

    /// Read a grid from a path or URL with CRS and variables taken from the dataset.
    pub fn load(location: &str) -> Result<Self> {
        GridSource::new(location).load()
    }

    #[inline] pub fn layer(&self) -> &Layer { &self.layer }

    #[inline] pub fn catalog(&self) -> &VariableCatalog { &self.catalog }

    #[inline] pub fn epsg(&self) -> u32 { self.epsg }

    #[inline] pub fn len(&self) -> usize { self.layer.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.layer.is_empty() }

    /// Dissolved outer boundary of the grid, or None for a grid without cells.
    pub fn extent(&self) -> Option<&MultiPolygon<f64>> {
        self.extent.get_or_init(|| self.layer.geoms().dissolve()).as_ref()
    }
}

#[cfg(test)]
mod tests {
    use geo::{Area, polygon};
    use polars::df;

    use super::*;
    use crate::grid::VariableKind;

    fn two_cells(epsg: Option<u32>) -> Layer {
        let shapes = vec![
            MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]]),
            MultiPolygon(vec![polygon![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0)]]),
        ];
        Layer::new(shapes, df!("POP" => [1.0, 2.0], "TYPO" => ["A", "B"]).unwrap(), epsg).unwrap()
    }

    #[test]
    fn catalog_is_inferred_when_absent() {
        let grid = Grid::new(two_cells(Some(2056)), None).unwrap();
        assert_eq!(grid.catalog().names(), ["POP", "TYPO"]);
        assert_eq!(grid.epsg(), 2056);
    }

    #[test]
    fn declared_catalog_restricts_and_orders() {
        let catalog = VariableCatalog::new(vec![Variable::new("TYPO", VariableKind::Categorical)]);
        let grid = Grid::new(two_cells(Some(2056)), Some(catalog)).unwrap();
        assert_eq!(grid.catalog().names(), ["TYPO"]);
    }

    #[test]
    fn grid_requires_crs() {
        let err = Grid::new(two_cells(None), None).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::MissingCrs)));
    }

    #[test]
    fn extent_is_memoized_union() {
        let grid = Grid::new(two_cells(Some(2056)), None).unwrap();
        let first = grid.extent().unwrap() as *const _;
        assert!((grid.extent().unwrap().unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(first, grid.extent().unwrap() as *const _);
    }
}
