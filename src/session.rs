use std::sync::Arc;

use anyhow::{bail, Context, Result};
use geo::MultiPolygon;
use polars::frame::DataFrame;
use tracing::{info, warn};

use crate::{
    aggregate::{aggregate, AggregationResult},
    drawing::Drawing,
    error::Error,
    geom::buffer_drawing,
    grid::{Grid, GridCache, GridSource, Variable},
    layer::Layer,
    overlay::drawing_in_boundary,
    overrides::OverrideRegistry,
    progress::{self, NoProgress, Progress},
};

/// Where a session is in the drawing → aggregation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoDrawing,
    DrawingPresent,
    OutOfBoundary,
    InBoundary,
    Aggregated,
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The drawing is not within the grid; the result was cleared.
    OutOfBoundary,
    /// Every variable was aggregated.
    Aggregated,
}

/// One user's aggregation workspace: a grid, per-variable overrides, the current drawing,
/// and the buffer and result of the last run.
#[derive(Debug)]
pub struct Session {
    source: Option<GridSource>,
    cache: Arc<GridCache>,
    grid: Option<Arc<Grid>>,
    overrides: OverrideRegistry,
    state: SessionState,
    drawing: Option<Drawing>,
    buffer: Option<MultiPolygon<f64>>,
    result: AggregationResult,
}

impl Session {
    /// Session over the grid described by `source`, with a private cache.
    pub fn new(source: GridSource) -> Self {
        Self::with_cache(source, Arc::new(GridCache::new()))
    }

    /// Session over the grid described by `source`, sharing `cache` with other sessions.
    pub fn with_cache(source: GridSource, cache: Arc<GridCache>) -> Self {
        Self::build(Some(source), cache, None)
    }

    /// Session over an already loaded grid.
    pub fn from_grid(grid: Arc<Grid>) -> Self {
        Self::build(None, Arc::new(GridCache::new()), Some(grid))
    }

    fn build(source: Option<GridSource>, cache: Arc<GridCache>, grid: Option<Arc<Grid>>) -> Self {
        Self {
            source,
            cache,
            grid,
            overrides: OverrideRegistry::new(),
            state: SessionState::NoDrawing,
            drawing: None,
            buffer: None,
            result: AggregationResult::new(),
        }
    }

    #[inline] pub fn state(&self) -> SessionState { self.state }

    #[inline] pub fn drawing(&self) -> Option<&Drawing> { self.drawing.as_ref() }

    /// Buffer of the last in-boundary run, in the grid's CRS.
    #[inline] pub fn buffer(&self) -> Option<&MultiPolygon<f64>> { self.buffer.as_ref() }

    #[inline] pub fn result(&self) -> &AggregationResult { &self.result }

    #[inline] pub fn overrides(&self) -> &OverrideRegistry { &self.overrides }

    /// The grid, loaded through the cache on first use.
    pub fn grid(&mut self) -> Result<Arc<Grid>> {
        self.load_grid(&mut NoProgress)
    }

    fn load_grid(&mut self, progress: &mut impl Progress) -> Result<Arc<Grid>> {
        progress.report(progress::LOAD_START, "Loading grid");
        let grid = match (&self.grid, &self.source) {
            (Some(grid), _) => {
                progress.report(progress::LOADING, "Reading grid");
                Arc::clone(grid)
            }
            (None, Some(source)) => {
                progress.report(progress::LOADING, &format!("Reading {}", source.location));
                self.cache.get_or_load(source)?
            }
            (None, None) => bail!("session has neither a grid nor a grid source"),
        };
        progress.report(progress::LOAD_COMPLETE, "Grid loaded");

        self.grid = Some(Arc::clone(&grid));
        Ok(grid)
    }

    fn variable(&mut self, name: &str) -> Result<Variable> {
        let grid = self.grid()?;
        let variable = grid.catalog().get(name).cloned().ok_or_else(|| Error::UnknownVariable(name.into()))?;
        Ok(variable)
    }

    /// Replace `variable` by `column` of the dataset at `source` (path or URL).
    pub fn load_override(&mut self, variable: &str, source: &str, column: &str) -> Result<()> {
        let variable = self.variable(variable)?;
        self.overrides.load(&variable, source, column)
    }

    /// Replace `variable` by `column` of an already read dataset.
    pub fn activate_override(&mut self, variable: &str, filename: &str, dataset: Layer, column: &str) -> Result<()> {
        let variable = self.variable(variable)?;
        self.overrides.activate(&variable, filename, Arc::new(dataset), column)
    }

    /// Switch the source column of the active override of `variable`.
    pub fn select_override_column(&mut self, variable: &str, column: &str) -> Result<()> {
        let variable = self.variable(variable)?;
        self.overrides.select_column(&variable, column)
    }

    /// Make `variable` read from the grid again.
    pub fn remove_override(&mut self, variable: &str) -> bool {
        self.overrides.remove(variable)
    }

    /// Attribute columns offered as sources for the override of `variable`.
    pub fn override_columns(&self, variable: &str) -> Option<Vec<String>> {
        self.overrides.columns(variable)
    }

    /// Forget the drawing together with the buffer and result derived from it.
    pub fn clear_drawing(&mut self) {
        self.drawing = None;
        self.buffer = None;
        self.result = AggregationResult::new();
        self.state = SessionState::NoDrawing;
    }

    /// Take a new drawing and run the whole pipeline on it.
    pub fn set_drawing(&mut self, drawing: Drawing, progress: &mut impl Progress) -> Result<RunOutcome> {
        self.clear_drawing();
        if drawing.is_empty() {
            warn!("drawing has no polygon");
            return Err(Error::EmptyGeometry.into());
        }
        self.drawing = Some(drawing);
        self.state = SessionState::DrawingPresent;
        self.run(progress)
    }

    /// Rerun the pipeline on the current drawing, e.g. after changing overrides.
    pub fn run(&mut self, progress: &mut impl Progress) -> Result<RunOutcome> {
        let Some(drawing) = self.drawing.clone() else { return Err(Error::EmptyGeometry.into()) };
        self.buffer = None;
        self.result = AggregationResult::new();
        self.state = SessionState::DrawingPresent;

        let grid = self.load_grid(progress)?;
        let drawing = drawing.to_epsg(grid.epsg())
            .context("Failed to bring drawing into the grid's CRS")?;

        let inside = drawing_in_boundary(&grid, drawing.shape());
        progress.report(progress::BOUNDARY_CHECKED, if inside { "Drawing within grid" } else { "Drawing outside grid" });
        if !inside {
            warn!(epsg = grid.epsg(), "drawing is not within the grid boundary");
            self.state = SessionState::OutOfBoundary;
            return Ok(RunOutcome::OutOfBoundary);
        }
        self.state = SessionState::InBoundary;

        let buffer = buffer_drawing(drawing.shape());
        self.result = aggregate(&grid, &self.overrides, &buffer, progress)?;
        self.buffer = Some(buffer);
        self.state = SessionState::Aggregated;

        info!(variables = self.result.len(), overrides = self.overrides.active_variables().len(), "run complete");
        Ok(RunOutcome::Aggregated)
    }

    /// The last result as a (`variable`, `value`) table, with a `label` column when `labels` is set.
    pub fn result_table(&self, labels: bool) -> Result<DataFrame> {
        let catalog = self.grid.as_deref().filter(|_| labels).map(Grid::catalog);
        self.result.to_dataframe(catalog)
    }
}
