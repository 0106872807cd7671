use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{error::Error, grid::Variable, layer::Layer};

/// Override of one variable by a user-supplied dataset.
#[derive(Debug, Clone, Default)]
pub struct OverrideState {
    active: bool,
    filename: Option<String>,
    dataset: Option<Arc<Layer>>,
    selected_column: Option<String>,
}

impl OverrideState {
    #[inline] pub fn is_active(&self) -> bool { self.active }

    /// Name of the file or URL the dataset was read from.
    #[inline] pub fn filename(&self) -> Option<&str> { self.filename.as_deref() }

    #[inline] pub fn dataset(&self) -> Option<&Arc<Layer>> { self.dataset.as_ref() }

    /// Column of the dataset standing in for the variable.
    #[inline] pub fn selected_column(&self) -> Option<&str> { self.selected_column.as_deref() }
}

/// Per-variable override settings. Variables without an active entry read from the grid.
#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    states: AHashMap<String, OverrideState>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate an override of `variable` by `column` of `dataset`. The column must exist and
    /// hold values aggregatable as the variable's kind; on rejection the registry is unchanged.
    pub fn activate(&mut self, variable: &Variable, filename: impl Into<String>, dataset: Arc<Layer>, column: &str) -> Result<()> {
        if let Err(err) = check_column(variable, &dataset, column) {
            warn!(variable = %variable.name, column, "override rejected: {err}");
            return Err(err.into());
        }

        let filename = filename.into();
        info!(variable = %variable.name, %filename, column, features = dataset.len(), "override activated");
        self.states.insert(variable.name.clone(), OverrideState {
            active: true,
            filename: Some(filename),
            dataset: Some(dataset),
            selected_column: Some(column.to_string()),
        });
        Ok(())
    }

    /// Read a dataset from a path or URL and activate it for `variable`.
    pub fn load(&mut self, variable: &Variable, source: &str, column: &str) -> Result<()> {
        let dataset = Layer::read_source(source)
            .with_context(|| format!("Failed to read override dataset for {}", variable.name))?;
        self.activate(variable, source, Arc::new(dataset), column)
    }

    /// Switch the source column of an active override.
    pub fn select_column(&mut self, variable: &Variable, column: &str) -> Result<()> {
        let state = self.states.get_mut(&variable.name)
            .filter(|state| state.active)
            .ok_or_else(|| Error::UnknownVariable(variable.name.clone()))?;
        if let Some(dataset) = &state.dataset {
            check_column(variable, dataset, column)?;
        }
        state.selected_column = Some(column.to_string());
        Ok(())
    }

    /// Reset `variable` to read from the grid. Returns whether an override was removed.
    pub fn remove(&mut self, variable: &str) -> bool {
        self.states.remove(variable).is_some_and(|state| state.active)
    }

    pub fn get(&self, variable: &str) -> Option<&OverrideState> {
        self.states.get(variable)
    }

    pub fn is_active(&self, variable: &str) -> bool {
        self.get(variable).is_some_and(OverrideState::is_active)
    }

    /// Attribute columns of the override dataset of `variable`, for picking a source column.
    pub fn columns(&self, variable: &str) -> Option<Vec<String>> {
        self.get(variable)?.dataset().map(|dataset| dataset.columns())
    }

    /// Names of the variables with an active override, sorted.
    pub fn active_variables(&self) -> Vec<&str> {
        let mut names = self.states.iter()
            .filter(|(_, state)| state.active)
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

fn check_column(variable: &Variable, dataset: &Layer, column: &str) -> Result<(), Error> {
    let series = dataset.data().column(column).map_err(|_| Error::MissingOverrideColumn {
        variable: variable.name.clone(),
        column: column.to_string(),
    })?;
    variable.kind.check(&variable.name, series.dtype())
}
