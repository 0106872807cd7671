use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

use crate::{error::Error, geom::Geometries};

/// WGS84 lon/lat, the CRS of shapes drawn on a web map.
pub const WGS84: u32 = 4326;

/// PROJ.4 definition of a supported EPSG code, and whether the CRS is geographic (degrees).
fn proj4_definition(epsg: u32) -> Result<(String, bool), Error> {
    const SWISS_BESSEL: &str = "+ellps=bessel +towgs84=674.374,15.056,405.346,0,0,0,0 +units=m +no_defs +type=crs";

    Ok(match epsg {
        4326 => ("+proj=longlat +datum=WGS84 +no_defs +type=crs".into(), true),
        4269 => ("+proj=longlat +datum=NAD83 +no_defs +type=crs".into(), true),
        3857 => ("+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs".into(), false),
        // Swiss LV95 and its predecessor LV03
        2056 => (format!("+proj=somerc +lat_0=46.9524055555556 +lon_0=7.43958333333333 +k_0=1 +x_0=2600000 +y_0=1200000 {SWISS_BESSEL}"), false),
        21781 => (format!("+proj=somerc +lat_0=46.9524055555556 +lon_0=7.43958333333333 +k_0=1 +x_0=600000 +y_0=200000 {SWISS_BESSEL}"), false),
        32601..=32660 => (format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs", epsg - 32600), false),
        32701..=32760 => (format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs", epsg - 32700), false),
        other => return Err(Error::UnknownCrs(other)),
    })
}

/// Coordinate transform between two EPSG codes.
pub(crate) struct Reprojector {
    from: Proj4,
    to: Proj4,
    from_degrees: bool,
    to_degrees: bool,
}

impl Reprojector {
    pub(crate) fn new(from: u32, to: u32) -> Result<Self> {
        let (from_string, from_degrees) = proj4_definition(from)?;
        let (to_string, to_degrees) = proj4_definition(to)?;

        Ok(Self {
            from: Proj4::from_proj_string(&from_string)
                .with_context(|| anyhow!("failed to build source PROJ.4: {from_string}"))?,
            to: Proj4::from_proj_string(&to_string)
                .with_context(|| anyhow!("failed to build target PROJ.4: {to_string}"))?,
            from_degrees,
            to_degrees,
        })
    }

    /// Transform every coordinate of `shape`. Geographic coordinates are degrees on both ends.
    pub(crate) fn project(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        shape.try_map_coords(|coord: Coord<f64>| -> Result<Coord<f64>> {
            let mut point = if self.from_degrees {
                (coord.x.to_radians(), coord.y.to_radians(), 0.0)
            } else {
                (coord.x, coord.y, 0.0)
            };
            transform(&self.from, &self.to, &mut point)
                .with_context(|| format!("CRS transform failed at ({}, {})", coord.x, coord.y))?;
            Ok(if self.to_degrees {
                Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
            } else {
                Coord { x: point.0, y: point.1 }
            })
        })
    }
}

/// Reproject a shape from one EPSG code to another; a no-op when they match.
pub(crate) fn reproject_shape(shape: &MultiPolygon<f64>, from: u32, to: u32) -> Result<MultiPolygon<f64>> {
    if from == to { return Ok(shape.clone()) }
    Reprojector::new(from, to)?.project(shape)
}

impl Geometries {
    /// Reproject all shapes into `epsg`. Fails when the current CRS is unknown.
    pub(crate) fn reproject(&self, epsg: u32) -> Result<Geometries> {
        let from = self.epsg().ok_or(Error::MissingCrs)?;
        if from == epsg { return Ok(self.clone()) }

        let reprojector = Reprojector::new(from, epsg)?;
        let shapes = self.shapes().iter()
            .map(|shape| reprojector.project(shape))
            .collect::<Result<Vec<_>>>()?;
        Ok(Geometries::new(shapes, Some(epsg)))
    }
}

#[cfg(test)]
mod tests {
    use geo::{Centroid, polygon};

    use super::*;

    #[test]
    fn geneva_lands_in_lv95_range() {
        // Small square around Geneva's old town, in lon/lat.
        let shape = MultiPolygon(vec![polygon![
            (x: 6.14, y: 46.20), (x: 6.15, y: 46.20), (x: 6.15, y: 46.21), (x: 6.14, y: 46.21),
        ]]);
        let projected = reproject_shape(&shape, WGS84, 2056).unwrap();
        let center = projected.centroid().unwrap();
        assert!((2_495_000.0..2_505_000.0).contains(&center.x()), "easting {}", center.x());
        assert!((1_112_000.0..1_122_000.0).contains(&center.y()), "northing {}", center.y());
    }

    #[test]
    fn round_trip_returns_to_start() {
        let shape = MultiPolygon(vec![polygon![
            (x: 6.14, y: 46.20), (x: 6.15, y: 46.20), (x: 6.15, y: 46.21),
        ]]);
        let there = reproject_shape(&shape, WGS84, 2056).unwrap();
        let back = reproject_shape(&there, 2056, WGS84).unwrap();
        for (a, b) in shape.0[0].exterior().coords().zip(back.0[0].exterior().coords()) {
            assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
        }
    }

    #[test]
    fn same_crs_is_identity() {
        let shape = MultiPolygon(vec![polygon![(x: 1.0, y: 2.0), (x: 3.0, y: 2.0), (x: 3.0, y: 4.0)]]);
        assert_eq!(reproject_shape(&shape, 2056, 2056).unwrap(), shape);
    }

    #[test]
    fn unknown_epsg_is_rejected() {
        let err = Reprojector::new(WGS84, 9999).err().unwrap();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownCrs(9999))));
    }
}
