mod io;

use anyhow::{ensure, Result};
use geo::MultiPolygon;
use polars::{frame::DataFrame, prelude::Column};

use crate::{error::Error, geom::Geometries};

/// A vector dataset: one geometry per row plus a table of non-spatial attributes.
///
/// Both the grid and user-supplied override datasets are layers. Row `i` of the
/// attribute table describes shape `i`.
#[derive(Debug, Clone)]
pub struct Layer {
    geoms: Geometries,
    data: DataFrame,
}

impl Layer {
    /// Assemble a layer from shapes, their attribute table (one row per shape) and an optional EPSG code.
    pub fn new(shapes: Vec<MultiPolygon<f64>>, data: DataFrame, epsg: Option<u32>) -> Result<Self> {
        ensure!(
            shapes.len() == data.height(),
            "layer has {} shapes but {} attribute rows", shapes.len(), data.height()
        );
        Ok(Self { geoms: Geometries::new(shapes, epsg), data })
    }

    /// Number of features.
    #[inline] pub fn len(&self) -> usize { self.geoms.len() }

    /// Whether the layer has no features.
    #[inline] pub fn is_empty(&self) -> bool { self.geoms.is_empty() }

    /// EPSG code of the layer's coordinates, if known.
    #[inline] pub fn epsg(&self) -> Option<u32> { self.geoms.epsg() }

    /// Attribute table.
    #[inline] pub fn data(&self) -> &DataFrame { &self.data }

    /// Feature shapes, indexed by row.
    #[inline] pub fn shapes(&self) -> &[MultiPolygon<f64>] { self.geoms.shapes() }

    #[inline] pub(crate) fn geoms(&self) -> &Geometries { &self.geoms }

    /// Attribute column names, in table order.
    pub fn columns(&self) -> Vec<String> {
        self.data.get_column_names_str().into_iter().map(str::to_string).collect()
    }

    /// Declare the EPSG code of the coordinates without transforming them.
    pub fn with_epsg(self, epsg: u32) -> Self {
        Self { geoms: self.geoms.with_epsg(Some(epsg)), data: self.data }
    }

    /// Copy of this layer with coordinates transformed to `epsg`.
    pub fn reproject(&self, epsg: u32) -> Result<Self> {
        Ok(Self { geoms: self.geoms.reproject(epsg)?, data: self.data.clone() })
    }

    /// Keep only `column` as attribute, renamed to `name`. Geometries are shared unchanged.
    pub(crate) fn select_as(&self, variable: &str, column: &str) -> Result<Self> {
        let source = self.data.column(column)
            .map_err(|_| Error::MissingOverrideColumn { variable: variable.into(), column: column.into() })?;
        let renamed: Column = source.clone().with_name(variable.into());
        Ok(Self { geoms: self.geoms.clone(), data: DataFrame::new(vec![renamed])? })
    }
}
