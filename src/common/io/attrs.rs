use ahash::AHashMap;
use anyhow::Result;
use polars::{frame::DataFrame, prelude::{Column, NamedFrom}, series::Series};

/// A single attribute value read from a feature's record or properties.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Attr {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

/// Column storage type, widened as values are observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType { Null, Int, Float, Bool, Text }

impl ColumnType {
    fn widen(self, value: &Attr) -> Self {
        use ColumnType::*;
        match (self, value) {
            (ty, Attr::Null) => ty,
            (Null, Attr::Int(_)) | (Int, Attr::Int(_)) => Int,
            (Null | Int | Float, Attr::Int(_) | Attr::Float(_)) => Float,
            (Null | Bool, Attr::Bool(_)) => Bool,
            _ => Text,
        }
    }
}

/// Build a DataFrame with one column per name (in the given order) from per-feature attribute rows.
/// Missing entries become nulls; integer columns that also hold floats widen to Float64; any other
/// mix of kinds falls back to a String column. A column with no value at all is Float64.
pub(crate) fn attributes_to_dataframe(names: &[String], rows: &[AHashMap<String, Attr>]) -> Result<DataFrame> {
    let columns = names.iter()
        .map(|name| {
            let values = rows.iter()
                .map(|row| row.get(name).unwrap_or(&Attr::Null))
                .collect::<Vec<_>>();
            let ty = values.iter().fold(ColumnType::Null, |ty, value| ty.widen(value));

            let series = match ty {
                ColumnType::Int => Series::new(name.as_str().into(), values.iter()
                    .map(|value| match value { Attr::Int(i) => Some(*i), _ => None })
                    .collect::<Vec<_>>()),
                ColumnType::Null | ColumnType::Float => Series::new(name.as_str().into(), values.iter()
                    .map(|value| match value {
                        Attr::Int(i) => Some(*i as f64),
                        Attr::Float(f) => Some(*f),
                        _ => None,
                    })
                    .collect::<Vec<_>>()),
                ColumnType::Bool => Series::new(name.as_str().into(), values.iter()
                    .map(|value| match value { Attr::Bool(b) => Some(*b), _ => None })
                    .collect::<Vec<_>>()),
                ColumnType::Text => Series::new(name.as_str().into(), values.iter()
                    .map(|value| match value {
                        Attr::Null => None,
                        Attr::Int(i) => Some(i.to_string()),
                        Attr::Float(f) => Some(f.to_string()),
                        Attr::Bool(b) => Some(b.to_string()),
                        Attr::Text(s) => Some(s.clone()),
                    })
                    .collect::<Vec<_>>()),
            };
            Column::from(series)
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return Ok(DataFrame::empty_with_height(rows.len()));
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use polars::prelude::DataType;

    use super::*;

    fn row(pairs: &[(&str, Attr)]) -> AHashMap<String, Attr> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn columns_follow_name_order_and_widen() {
        let names = vec!["pop".to_string(), "typo".to_string(), "dens".to_string()];
        let rows = vec![
            row(&[("pop", Attr::Int(3)), ("typo", Attr::Text("A".into())), ("dens", Attr::Int(1))]),
            row(&[("pop", Attr::Int(4)), ("dens", Attr::Float(0.5))]),
        ];
        let df = attributes_to_dataframe(&names, &rows).unwrap();

        assert_eq!(df.get_column_names_str(), ["pop", "typo", "dens"]);
        assert_eq!(df.column("pop").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("typo").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("dens").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("typo").unwrap().null_count(), 1);
    }

    #[test]
    fn mixed_text_and_numbers_become_text() {
        let names = vec!["code".to_string()];
        let rows = vec![row(&[("code", Attr::Int(1))]), row(&[("code", Attr::Text("x".into()))])];
        let df = attributes_to_dataframe(&names, &rows).unwrap();
        let codes = df.column("code").unwrap();
        assert_eq!(codes.dtype(), &DataType::String);
        assert_eq!(codes.str().unwrap().get(0), Some("1"));
    }

    #[test]
    fn column_without_values_is_float() {
        let names = vec!["dens".to_string(), "pop".to_string()];
        let rows = vec![row(&[("dens", Attr::Null), ("pop", Attr::Int(1))]), row(&[("pop", Attr::Int(2))])];
        let df = attributes_to_dataframe(&names, &rows).unwrap();
        let dens = df.column("dens").unwrap();
        assert_eq!(dens.dtype(), &DataType::Float64);
        assert_eq!(dens.null_count(), 2);
    }

    #[test]
    fn no_attributes_keeps_row_count() {
        let rows = vec![AHashMap::new(), AHashMap::new()];
        let df = attributes_to_dataframe(&[], &rows).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 0);
    }
}
