use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::{grid::{Grid, Variable}, layer::Layer, overrides::OverrideRegistry};

/// Dataset a variable is aggregated from.
#[derive(Debug)]
pub enum Reference<'a> {
    Grid(&'a Layer),
    /// Override dataset reduced to the selected column, renamed to the variable and
    /// expressed in the grid's CRS.
    Override(Layer),
}

impl Reference<'_> {
    pub fn layer(&self) -> &Layer {
        match self {
            Reference::Grid(layer) => layer,
            Reference::Override(layer) => layer,
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Reference::Override(_))
    }
}

/// Pick the dataset `variable` is read from: its active override if any, the grid otherwise.
pub fn resolve<'a>(grid: &'a Grid, overrides: &OverrideRegistry, variable: &Variable) -> Result<Reference<'a>> {
    let Some(state) = overrides.get(&variable.name).filter(|state| state.is_active()) else {
        return Ok(Reference::Grid(grid.layer()));
    };
    let (Some(dataset), Some(column)) = (state.dataset(), state.selected_column()) else {
        return Ok(Reference::Grid(grid.layer()));
    };

    let mut layer = dataset.select_as(&variable.name, column)?;
    match layer.epsg() {
        Some(epsg) if epsg != grid.epsg() => {
            layer = layer.reproject(grid.epsg())
                .with_context(|| format!("Failed to reproject override for {}", variable.name))?;
        }
        Some(_) => {}
        None => {
            warn!(variable = %variable.name, epsg = grid.epsg(), "override dataset declares no CRS, assuming the grid's");
            layer = layer.with_epsg(grid.epsg());
        }
    }

    debug!(variable = %variable.name, column, features = layer.len(), "resolved override");
    Ok(Reference::Override(layer))
}
