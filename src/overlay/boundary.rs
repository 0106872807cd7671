use geo::{Area, BooleanOps, MultiPolygon, Relate};
use tracing::debug;

use crate::grid::Grid;

/// Relative area a drawing may stick out of the extent and still count as inside.
/// Absorbs snapping noise when a drawing retraces the grid's own border.
const CONTAINMENT_TOLERANCE: f64 = 1e-9;

/// Whether `shape` (in the grid's CRS) lies within the dissolved outer boundary of the grid.
/// An empty grid contains nothing.
pub fn drawing_in_boundary(grid: &Grid, shape: &MultiPolygon<f64>) -> bool {
    let Some(extent) = grid.extent() else { return false };
    if shape.0.is_empty() { return false }

    if extent.relate(shape).is_contains() { return true }

    let outside = shape.difference(extent).unsigned_area();
    let contained = outside <= CONTAINMENT_TOLERANCE * shape.unsigned_area();
    debug!(outside, contained, "boundary check fell back to residual area");
    contained
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use polars::df;

    use super::*;
    use crate::layer::Layer;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y), (x: x + size, y: y), (x: x + size, y: y + size), (x: x, y: y + size),
        ]])
    }

    fn grid_2x2() -> Grid {
        let shapes = vec![square(0.0, 0.0, 250.0), square(250.0, 0.0, 250.0), square(0.0, 250.0, 250.0), square(250.0, 250.0, 250.0)];
        let layer = Layer::new(shapes, df!("V" => [1.0, 2.0, 3.0, 4.0]).unwrap(), Some(2056)).unwrap();
        Grid::new(layer, None).unwrap()
    }

    #[test]
    fn inside_drawing_is_contained() {
        assert!(drawing_in_boundary(&grid_2x2(), &square(100.0, 100.0, 200.0)));
    }

    #[test]
    fn drawing_equal_to_extent_is_contained() {
        assert!(drawing_in_boundary(&grid_2x2(), &square(0.0, 0.0, 500.0)));
    }

    #[test]
    fn straddling_drawing_is_rejected() {
        assert!(!drawing_in_boundary(&grid_2x2(), &square(400.0, 400.0, 200.0)));
    }

    #[test]
    fn disjoint_drawing_is_rejected() {
        assert!(!drawing_in_boundary(&grid_2x2(), &square(5000.0, 5000.0, 10.0)));
    }

    #[test]
    fn empty_grid_contains_nothing() {
        let layer = Layer::new(vec![], df!("V" => Vec::<f64>::new()).unwrap(), Some(2056)).unwrap();
        let grid = Grid::new(layer, None).unwrap();
        assert!(!drawing_in_boundary(&grid, &square(0.0, 0.0, 1.0)));
    }
}
