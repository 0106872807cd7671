use std::{fmt, fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, prelude::{Column, CsvWriter, NamedFrom, SerWriter}, series::Series};
use serde::Serialize;

use crate::grid::VariableCatalog;

/// Aggregated value of one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregatedValue {
    /// Area-weighted mean, rounded to 3 decimals.
    Number(f64),
    /// Category with the largest area share.
    Category(String),
    /// No value could be derived, not even by fallback.
    Missing,
}

impl AggregatedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AggregatedValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            AggregatedValue::Category(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AggregatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatedValue::Number(value) => write!(f, "{value}"),
            AggregatedValue::Category(value) => f.write_str(value),
            AggregatedValue::Missing => Ok(()),
        }
    }
}

/// Ordered mapping from variable name to aggregated value, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationResult {
    entries: Vec<(String, AggregatedValue)>,
}

impl AggregationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, variable: impl Into<String>, value: AggregatedValue) {
        self.entries.push((variable.into(), value));
    }

    pub fn get(&self, variable: &str) -> Option<&AggregatedValue> {
        self.entries.iter().find(|(name, _)| name == variable).map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregatedValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[inline] pub fn len(&self) -> usize { self.entries.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Two-column table (`variable`, `value`) with values rendered as text. With a catalog,
    /// a `label` column carries each variable's display name.
    pub fn to_dataframe(&self, catalog: Option<&VariableCatalog>) -> Result<DataFrame> {
        let variables = self.entries.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        let values = self.entries.iter()
            .map(|(_, value)| match value {
                AggregatedValue::Missing => None,
                value => Some(value.to_string()),
            })
            .collect::<Vec<_>>();

        let mut columns = vec![Column::from(Series::new("variable".into(), variables))];
        if let Some(catalog) = catalog {
            let labels = self.entries.iter()
                .map(|(name, _)| catalog.get(name).map_or(name.as_str(), |variable| variable.display_name()))
                .collect::<Vec<_>>();
            columns.push(Column::from(Series::new("label".into(), labels)));
        }
        columns.push(Column::from(Series::new("value".into(), values)));
        Ok(DataFrame::new(columns)?)
    }

    /// Write the result table as CSV.
    pub fn write_csv<W: Write>(&self, writer: W, catalog: Option<&VariableCatalog>) -> Result<()> {
        let mut frame = self.to_dataframe(catalog)?;
        CsvWriter::new(writer)
            .include_header(true)
            .finish(&mut frame)
            .context("Failed to write result table")
    }

    /// Write the result table to a CSV file.
    pub fn write_csv_file(&self, path: &Path, catalog: Option<&VariableCatalog>) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(file, catalog)
    }
}
