use geo::{Buffer, MultiPolygon};

/// Operational radius of a neighborhood, in units of the grid CRS (meters).
/// Matches the nominal 500 m cell size of the grid.
pub const BUFFER_RADIUS: f64 = 500.0;

/// Expand a drawn neighborhood by [`BUFFER_RADIUS`] to obtain its zone of influence.
pub fn buffer_drawing(shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    shape.buffer(BUFFER_RADIUS)
}

#[cfg(test)]
mod tests {
    use geo::{Area, BoundingRect, Relate, polygon};

    use super::*;

    #[test]
    fn buffer_grows_square_by_radius() {
        let drawing = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0), (x: 1000.0, y: 0.0), (x: 1000.0, y: 1000.0), (x: 0.0, y: 1000.0),
        ]]);
        let buffer = buffer_drawing(&drawing);

        let rect = buffer.bounding_rect().unwrap();
        assert!((rect.min().x + BUFFER_RADIUS).abs() < 1e-3);
        assert!((rect.max().y - 1000.0 - BUFFER_RADIUS).abs() < 1e-3);

        // Square + four side strips + four quarter discs (approximated by segments).
        let expected = 1000.0 * 1000.0 + 4.0 * 1000.0 * BUFFER_RADIUS + std::f64::consts::PI * BUFFER_RADIUS.powi(2);
        let area = buffer.unsigned_area();
        assert!((area - expected).abs() < expected * 0.01, "area {area} vs {expected}");
        assert!(buffer.relate(&drawing).is_contains());
    }

    #[test]
    fn buffer_is_deterministic() {
        let drawing = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 5.0, y: 8.0)]]);
        assert_eq!(buffer_drawing(&drawing), buffer_drawing(&drawing));
    }
}
