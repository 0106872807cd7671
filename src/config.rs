use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{common, error::Error, grid::{GridSource, Variable}, session::Session};

/// Override of one variable declared in a run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSpec {
    pub variable: String,
    /// Path or URL of the override dataset.
    pub source: String,
    /// Column of the dataset standing in for the variable.
    pub column: String,
}

/// JSON run configuration: the grid, its variables, and any overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub grid: String,
    #[serde(default)]
    pub epsg: Option<u32>,
    #[serde(default)]
    pub variables: Option<Vec<Variable>>,
    #[serde(default)]
    pub overrides: Vec<OverrideSpec>,
}

impl RunConfig {
    pub fn new(grid: impl Into<String>) -> Self {
        Self { grid: grid.into(), epsg: None, variables: None, overrides: Vec::new() }
    }

    /// Parse a configuration from JSON text. Paths are taken as given.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse run configuration")
    }

    /// Read a configuration file. Relative dataset paths are resolved against the file's directory.
    pub fn read(path: &Path) -> Result<Self> {
        common::require_file_exists(path)?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run configuration: {}", path.display()))?;
        let mut config = Self::from_json_str(&text)
            .with_context(|| format!("Invalid run configuration {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.grid = resolve_location(base, &config.grid);
            for spec in &mut config.overrides {
                spec.source = resolve_location(base, &spec.source);
            }
        }
        debug!(path = %path.display(), grid = %config.grid, overrides = config.overrides.len(), "read run configuration");
        Ok(config)
    }

    pub fn grid_source(&self) -> GridSource {
        GridSource {
            location: self.grid.clone(),
            epsg: self.epsg,
            variables: self.variables.clone(),
        }
    }

    /// Open a session on the configured grid with the configured overrides active.
    /// An override whose column is missing or of the wrong type is skipped and its
    /// variable keeps reading from the grid. Datasets that cannot be read are errors.
    pub fn session(&self) -> Result<Session> {
        let mut session = Session::new(self.grid_source());
        for spec in &self.overrides {
            match session.load_override(&spec.variable, &spec.source, &spec.column) {
                Ok(()) => {}
                Err(err) if is_rejected_column(&err) => {
                    warn!(variable = %spec.variable, source = %spec.source, "override skipped: {err}");
                }
                Err(err) => return Err(err.context(format!("Failed to activate override of {}", spec.variable))),
            }
        }
        Ok(session)
    }
}

fn is_rejected_column(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::MissingOverrideColumn { .. } | Error::UnsupportedType { .. }))
}

fn resolve_location(base: &Path, location: &str) -> String {
    if common::is_url(location) || Path::new(location).is_absolute() {
        return location.to_string();
    }
    base.join(location).to_string_lossy().into_owned()
}
