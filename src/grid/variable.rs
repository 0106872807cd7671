use polars::{frame::DataFrame, prelude::DataType};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How a variable is aggregated over overlay fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Area-weighted mean.
    Numeric,
    /// Area-weighted mode.
    Categorical,
}

impl VariableKind {
    pub fn to_str(&self) -> &'static str {
        match self {
            VariableKind::Numeric => "numeric",
            VariableKind::Categorical => "categorical",
        }
    }

    /// Kind implied by a column dtype: numbers are numeric, text and booleans categorical.
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        match dtype {
            dtype if is_number(dtype) => Some(VariableKind::Numeric),
            DataType::String | DataType::Boolean => Some(VariableKind::Categorical),
            _ => None,
        }
    }

    /// Whether a column of `dtype` can be aggregated as this kind. Numeric codes may be
    /// declared categorical; text can never be averaged.
    pub fn accepts(&self, dtype: &DataType) -> bool {
        match self {
            VariableKind::Numeric => is_number(dtype),
            VariableKind::Categorical => is_number(dtype) || matches!(dtype, DataType::String | DataType::Boolean),
        }
    }

    /// Check a column dtype against this kind.
    pub(crate) fn check(&self, variable: &str, dtype: &DataType) -> Result<(), Error> {
        if self.accepts(dtype) { return Ok(()) }
        Err(Error::UnsupportedType {
            variable: variable.into(),
            dtype: dtype.clone(),
            expected: self.to_str(),
        })
    }
}

fn is_number(dtype: &DataType) -> bool {
    dtype.is_primitive_numeric()
}

/// A territorial variable: a grid attribute column with a declared aggregation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    /// Human-readable label for result tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self { name: name.into(), kind, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if present, otherwise the column name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered list of the variables aggregated for a grid. Results follow this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableCatalog {
    variables: Vec<Variable>,
}

impl VariableCatalog {
    pub fn new(variables: Vec<Variable>) -> Self {
        Self { variables }
    }

    /// Declare every column of `data` as a variable, with its kind implied by dtype.
    /// Columns of any other dtype are rejected.
    pub fn infer(data: &DataFrame) -> Result<Self, Error> {
        let variables = data.get_columns().iter()
            .map(|column| {
                let kind = VariableKind::from_dtype(column.dtype()).ok_or_else(|| Error::UnsupportedType {
                    variable: column.name().to_string(),
                    dtype: column.dtype().clone(),
                    expected: "numeric or categorical",
                })?;
                Ok(Variable::new(column.name().as_str(), kind))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { variables })
    }

    /// Check that every declared variable exists in `data` with a compatible dtype.
    pub(crate) fn validate(&self, data: &DataFrame) -> Result<(), Error> {
        for variable in &self.variables {
            let column = data.column(&variable.name)
                .map_err(|_| Error::UnknownVariable(variable.name.clone()))?;
            variable.kind.check(&variable.name, column.dtype())?;
        }
        Ok(())
    }

    #[inline] pub fn len(&self) -> usize { self.variables.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.variables.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|variable| variable.name.as_str()).collect()
    }
}
