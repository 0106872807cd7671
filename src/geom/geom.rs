use geo::{BooleanOps, BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// R-tree entry: envelope of one feature, tagged with its row.
#[derive(Debug, Clone)]
struct RowEnvelope {
    row: usize,
    envelope: AABB<[f64; 2]>,
}

impl RowEnvelope {
    fn new(row: usize, rect: Rect<f64>) -> Self {
        Self { row, envelope: AABB::from_corners(rect.min().into(), rect.max().into()) }
    }
}

impl RTreeObject for RowEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { self.envelope }
}

/// Geometries of a layer's features, indexed by row, with an R-tree over their envelopes.
#[derive(Debug, Clone)]
pub(crate) struct Geometries {
    shapes: Vec<MultiPolygon<f64>>,
    rtree: RTree<RowEnvelope>,
    epsg: Option<u32>, // EPSG code, if known
}

impl Geometries {
    /// Construct a Geometries object from a vector of MultiPolygons. Shapes without an
    /// envelope (empty, e.g. point features) stay addressable by row but are never indexed.
    pub(crate) fn new(shapes: Vec<MultiPolygon<f64>>, epsg: Option<u32>) -> Self {
        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(row, shape)| shape.bounding_rect().map(|rect| RowEnvelope::new(row, rect)))
                    .collect()
            ),
            shapes,
            epsg,
        }
    }

    /// Get the number of features.
    #[inline] pub(crate) fn len(&self) -> usize { self.shapes.len() }

    /// Check if there are no features.
    #[inline] pub(crate) fn is_empty(&self) -> bool { self.shapes.is_empty() }

    /// Get a reference to the list of MultiPolygons.
    #[inline] pub(crate) fn shapes(&self) -> &[MultiPolygon<f64>] { &self.shapes }

    /// Get the EPSG code, if known.
    #[inline] pub(crate) fn epsg(&self) -> Option<u32> { self.epsg }

    /// Replace the declared EPSG code without touching coordinates.
    #[inline] pub(crate) fn with_epsg(mut self, epsg: Option<u32>) -> Self { self.epsg = epsg; self }

    /// Row indices of features whose envelope intersects `rect`, in ascending order.
    pub(crate) fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let envelope = AABB::from_corners(rect.min().into(), rect.max().into());
        let mut rows = self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.row)
            .collect::<Vec<_>>();
        rows.sort_unstable();
        rows
    }

    /// Dissolve all shapes into their union, or None if there is nothing to dissolve.
    /// Unions are taken pairwise in a balanced tree so intermediate shapes stay small.
    pub(crate) fn dissolve(&self) -> Option<MultiPolygon<f64>> {
        fn dissolve_slice(shapes: &[MultiPolygon<f64>]) -> Option<MultiPolygon<f64>> {
            match shapes {
                [] => None,
                [shape] => Some(shape.clone()),
                _ => {
                    let (left, right) = shapes.split_at(shapes.len() / 2);
                    match (dissolve_slice(left), dissolve_slice(right)) {
                        (Some(a), Some(b)) => Some(a.union(&b)),
                        (a, b) => a.or(b),
                    }
                }
            }
        }

        let shapes = self.shapes.iter()
            .filter(|shape| !shape.0.is_empty())
            .cloned()
            .collect::<Vec<_>>();
        dissolve_slice(&shapes)
    }
}
