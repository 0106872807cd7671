use std::collections::BTreeMap;

use anyhow::{Context, Result};
use geo::MultiPolygon;
use polars::prelude::{Column, DataType};
use tracing::{debug, info};

use crate::{
    aggregate::{AggregatedValue, AggregationResult},
    grid::{Grid, Variable, VariableKind},
    overlay::Overlay,
    overrides::{resolve, OverrideRegistry, Reference},
    progress::{self, Progress},
};

/// Decimal places kept in numeric results.
const DECIMALS: i32 = 3;

/// Aggregate every catalog variable of `grid` over `buffer`, reading overridden variables
/// from their override dataset. Reports progress once per variable.
pub fn aggregate(grid: &Grid, overrides: &OverrideRegistry, buffer: &MultiPolygon<f64>, progress: &mut impl Progress) -> Result<AggregationResult> {
    let count = grid.catalog().len();
    let mut grid_overlay = None;
    let mut result = AggregationResult::new();

    for (index, variable) in grid.catalog().iter().enumerate() {
        let reference = resolve(grid, overrides, variable)?;
        let override_overlay;
        let overlay = match &reference {
            Reference::Grid(layer) => &*grid_overlay.get_or_insert_with(|| Overlay::compute(layer, buffer)),
            Reference::Override(layer) => {
                override_overlay = Overlay::compute(layer, buffer);
                &override_overlay
            }
        };

        let column = reference.layer().data().column(&variable.name)
            .with_context(|| format!("Variable {} missing from its dataset", variable.name))?;
        let value = aggregate_variable(variable, column, overlay)
            .with_context(|| format!("Failed to aggregate {}", variable.name))?;
        debug!(variable = %variable.name, source = if reference.is_override() { "override" } else { "grid" }, %value, "aggregated variable");

        progress.report(progress::variable_milestone(index, count), &format!("Aggregated {}", variable.display_name()));
        result.push(variable.name.as_str(), value);
    }

    info!(variables = result.len(), "aggregation complete");
    Ok(result)
}

/// Aggregate one variable's `column` over `overlay`, falling back to the unweighted
/// summary of the whole column when no fragment carries a value.
pub(crate) fn aggregate_variable(variable: &Variable, column: &Column, overlay: &Overlay) -> Result<AggregatedValue> {
    Ok(match variable.kind {
        VariableKind::Numeric => {
            let values = numeric_values(column)?;
            let weighted = weighted_mean(overlay.fragments().iter()
                .filter_map(|fragment| values[fragment.source].map(|value| (value, fragment.percent_area))));
            match weighted.or_else(|| fallback(&variable.name, || mean(values.iter().flatten().copied()))) {
                Some(value) => AggregatedValue::Number(round(value)),
                None => AggregatedValue::Missing,
            }
        }
        VariableKind::Categorical => {
            let values = category_values(column)?;
            let weighted = weighted_mode(overlay.fragments().iter()
                .filter_map(|fragment| values[fragment.source].as_deref().map(|value| (value, fragment.percent_area))));
            match weighted.or_else(|| fallback(&variable.name, || weighted_mode(values.iter().flatten().map(|value| (value.as_str(), 1.0))))) {
                Some(value) => AggregatedValue::Category(value.to_string()),
                None => AggregatedValue::Missing,
            }
        }
    })
}

fn fallback<T>(variable: &str, summary: impl FnOnce() -> Option<T>) -> Option<T> {
    debug!(variable, "no weighted values in buffer, using unweighted summary of the whole dataset");
    summary()
}

/// Column values as floats; nulls and NaN become None.
fn numeric_values(column: &Column) -> Result<Vec<Option<f64>>> {
    let column = column.cast(&DataType::Float64)?;
    Ok(column.f64()?.iter().map(|value| value.filter(|v| !v.is_nan())).collect())
}

/// Column values as category labels; nulls become None.
fn category_values(column: &Column) -> Result<Vec<Option<String>>> {
    let column = column.cast(&DataType::String)?;
    Ok(column.str()?.iter().map(|value| value.map(str::to_string)).collect())
}

/// Σ value × weight with weights rescaled to sum to one over the given pairs.
fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, total) = pairs.fold((0.0, 0.0), |(sum, total), (value, weight)| (sum + value * weight, total + weight));
    (total > 0.0).then(|| sum / total)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Category with the largest summed weight. Ties go to the smallest label.
fn weighted_mode<'a>(pairs: impl Iterator<Item = (&'a str, f64)>) -> Option<&'a str> {
    let mut weights = BTreeMap::<&str, f64>::new();
    for (value, weight) in pairs {
        *weights.entry(value).or_default() += weight;
    }

    let mut best: Option<(&str, f64)> = None;
    for (value, weight) in weights {
        if best.is_none_or(|(_, max)| weight > max) {
            best = Some((value, weight));
        }
    }
    best.map(|(value, _)| value)
}

fn round(value: f64) -> f64 {
    let scale = 10f64.powi(DECIMALS);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use polars::{df, frame::DataFrame};

    use super::*;
    use crate::layer::Layer;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y), (x: x + size, y: y), (x: x + size, y: y + size), (x: x, y: y + size),
        ]])
    }

    /// Four 250×250 cells in a row.
    fn layer(data: DataFrame) -> Layer {
        Layer::new((0..4).map(|i| square(250.0 * i as f64, 0.0, 250.0)).collect(), data, Some(2056)).unwrap()
    }

    #[test]
    fn numeric_is_area_weighted_mean() {
        let layer = layer(df!("V" => [10.0, 20.0, 30.0, 40.0]).unwrap());
        // Covers cells 0 and 1 equally.
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 500.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(15.0));
    }

    #[test]
    fn numeric_is_rounded_to_three_decimals() {
        let layer = layer(df!("V" => [1.0, 2.0, 0.0, 0.0]).unwrap());
        // Two thirds of the matched area in cell 0, one third in cell 1.
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 375.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(1.333));
    }

    #[test]
    fn null_fragments_are_dropped_and_weights_renormalized() {
        let layer = layer(df!("V" => [Some(10.0), None, Some(30.0), Some(40.0)]).unwrap());
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 500.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(10.0));
    }

    #[test]
    fn all_null_falls_back_to_unweighted_mean() {
        let layer = layer(df!("V" => [None, None, Some(30.0), Some(40.0)]).unwrap());
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 500.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(35.0));
    }

    #[test]
    fn empty_overlay_falls_back_to_unweighted_mean() {
        let layer = layer(df!("V" => [10.0, 20.0, 30.0, 40.0]).unwrap());
        let overlay = Overlay::compute(&layer, &square(10_000.0, 0.0, 100.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(25.0));
    }

    #[test]
    fn integer_columns_are_averaged_as_floats() {
        let layer = layer(df!("V" => [1i64, 2, 3, 4]).unwrap());
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 500.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Number(1.5));
    }

    #[test]
    fn categorical_is_weighted_mode() {
        let pairs = [("A", 0.4), ("A", 0.3), ("B", 0.2), ("B", 0.1)];
        assert_eq!(weighted_mode(pairs.into_iter()), Some("A"));
    }

    #[test]
    fn categorical_ties_go_to_smallest_label() {
        let pairs = [("B", 0.5), ("A", 0.5)];
        assert_eq!(weighted_mode(pairs.into_iter()), Some("A"));
        assert_eq!(weighted_mode(std::iter::empty()), None);
    }

    #[test]
    fn categorical_over_overlay() {
        let layer = layer(df!("T" => ["A", "B", "B", "A"]).unwrap());
        // 250 m of cell 0, 100 m of cell 1: "A" dominates.
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 350.0));
        let variable = Variable::new("T", VariableKind::Categorical);
        let value = aggregate_variable(&variable, layer.data().column("T").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Category("A".into()));
    }

    #[test]
    fn categorical_fallback_is_unweighted_mode() {
        let layer = layer(df!("T" => ["A", "B", "B", "A"]).unwrap());
        let overlay = Overlay::default();
        let variable = Variable::new("T", VariableKind::Categorical);
        let value = aggregate_variable(&variable, layer.data().column("T").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Category("A".into()));
    }

    #[test]
    fn numeric_codes_can_be_categorical() {
        let layer = layer(df!("K" => [3i64, 3, 7, 7]).unwrap());
        let overlay = Overlay::compute(&layer, &square(500.0, 0.0, 500.0));
        let variable = Variable::new("K", VariableKind::Categorical);
        let value = aggregate_variable(&variable, layer.data().column("K").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Category("7".into()));
    }

    #[test]
    fn no_values_anywhere_is_missing() {
        let layer = layer(df!("V" => [None::<f64>, None, None, None]).unwrap());
        let overlay = Overlay::compute(&layer, &square(0.0, 0.0, 500.0));
        let variable = Variable::new("V", VariableKind::Numeric);
        let value = aggregate_variable(&variable, layer.data().column("V").unwrap(), &overlay).unwrap();
        assert_eq!(value, AggregatedValue::Missing);
    }

    #[test]
    fn aggregate_reports_progress_per_variable() {
        let layer = layer(df!("V" => [10.0, 20.0, 30.0, 40.0], "T" => ["A", "A", "B", "B"]).unwrap());
        let grid = Grid::new(layer, None).unwrap();
        let mut reports = Vec::new();
        let result = aggregate(&grid, &OverrideRegistry::new(), &square(0.0, 0.0, 500.0), &mut |percent: u8, _: &str| reports.push(percent)).unwrap();

        assert_eq!(reports, [77, 100]);
        assert_eq!(result.get("V"), Some(&AggregatedValue::Number(15.0)));
        assert_eq!(result.get("T"), Some(&AggregatedValue::Category("A".into())));
    }
}
