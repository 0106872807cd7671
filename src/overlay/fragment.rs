use geo::{Area, BooleanOps, BoundingRect, MultiPolygon};
use tracing::debug;

use crate::layer::Layer;

/// Piece of a reference feature that falls inside the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFragment {
    /// Row of the source feature in the reference layer.
    pub source: usize,
    pub geometry: MultiPolygon<f64>,
    pub area: f64,
    /// Share of this fragment in the total intersected area.
    pub percent_area: f64,
}

/// Intersection of a buffer with every feature of a reference layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    fragments: Vec<OverlayFragment>,
    total_area: f64,
}

impl Overlay {
    /// Intersect `buffer` with each feature of `layer`. Only fragments with positive area are
    /// kept, and `percent_area` is relative to the summed fragment area rather than the buffer's,
    /// so weights describe the matched surface when the layer covers the buffer only partly.
    pub fn compute(layer: &Layer, buffer: &MultiPolygon<f64>) -> Self {
        let Some(rect) = buffer.bounding_rect() else { return Self::default() };

        let mut fragments = layer.geoms().candidates(&rect).into_iter()
            .filter_map(|source| {
                let geometry = layer.shapes()[source].intersection(buffer);
                let area = geometry.unsigned_area();
                (area > 0.0).then_some(OverlayFragment { source, geometry, area, percent_area: 0.0 })
            })
            .collect::<Vec<_>>();

        let total_area = fragments.iter().map(|fragment| fragment.area).sum::<f64>();
        for fragment in &mut fragments {
            fragment.percent_area = fragment.area / total_area;
        }

        debug!(features = layer.len(), fragments = fragments.len(), total_area, "computed overlay");
        Self { fragments, total_area }
    }

    #[inline] pub fn fragments(&self) -> &[OverlayFragment] { &self.fragments }

    #[inline] pub fn len(&self) -> usize { self.fragments.len() }

    /// Whether the buffer missed every feature.
    #[inline] pub fn is_empty(&self) -> bool { self.fragments.is_empty() }

    /// Summed area of all fragments.
    #[inline] pub fn total_area(&self) -> f64 { self.total_area }
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use polars::df;

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y), (x: x + size, y: y), (x: x + size, y: y + size), (x: x, y: y + size),
        ]])
    }

    fn row_of_cells() -> Layer {
        let shapes = (0..4).map(|i| square(250.0 * i as f64, 0.0, 250.0)).collect();
        Layer::new(shapes, df!("V" => [10.0, 20.0, 30.0, 40.0]).unwrap(), Some(2056)).unwrap()
    }

    #[test]
    fn shares_sum_to_one() {
        let overlay = Overlay::compute(&row_of_cells(), &square(100.0, 0.0, 500.0));
        let total = overlay.fragments().iter().map(|f| f.percent_area).sum::<f64>();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(overlay.fragments().iter().map(|f| f.source).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn shares_are_relative_to_matched_area() {
        // Half the buffer hangs off the layer; the covered half still sums to one.
        let overlay = Overlay::compute(&row_of_cells(), &square(-250.0, 0.0, 500.0));
        assert_eq!(overlay.len(), 1);
        assert!((overlay.total_area() - 250.0 * 250.0).abs() < 1e-6);
        assert!((overlay.fragments()[0].percent_area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn edge_touches_are_dropped() {
        let overlay = Overlay::compute(&row_of_cells(), &square(250.0, 0.0, 250.0));
        assert_eq!(overlay.fragments().iter().map(|f| f.source).collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn disjoint_buffer_is_empty() {
        let overlay = Overlay::compute(&row_of_cells(), &square(10_000.0, 0.0, 10.0));
        assert!(overlay.is_empty());
        assert_eq!(overlay.total_area(), 0.0);
    }
}
