use std::io::{Cursor, Read};

use anyhow::{bail, ensure, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};

const WKB_LE: u8 = 1;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_COLLECTION: u32 = 7;

/// Decode a WKB geometry into its polygons. The flag tells whether the geometry
/// had any polygonal part; points and lines decode to an empty shape.
pub(crate) fn read_wkb(bytes: &[u8]) -> Result<(MultiPolygon<f64>, bool)> {
    let mut reader = WkbReader { cursor: Cursor::new(bytes) };
    let mut polygons = Vec::new();
    let polygonal = reader.geometry(&mut polygons)?;
    Ok((MultiPolygon(polygons), polygonal))
}

struct Header {
    little_endian: bool,
    kind: u32,
    dims: usize,
}

struct WkbReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl WkbReader<'_> {
    fn header(&mut self) -> Result<Header> {
        let [order] = self.bytes()?;
        ensure!(order <= 1, "invalid WKB byte order {order}");
        let little_endian = order == WKB_LE;

        // ISO codes carry Z/M in the thousands, EWKB in the high bits.
        let code = self.u32(little_endian)?;
        let (ewkb_z, ewkb_m) = (code & 0x8000_0000 != 0, code & 0x4000_0000 != 0);
        let code = code & 0x0FFF_FFFF;
        let (kind, iso) = (code % 1000, code / 1000);
        let dims = 2
            + usize::from(ewkb_z || iso == 1 || iso == 3)
            + usize::from(ewkb_m || iso == 2 || iso == 3);
        Ok(Header { little_endian, kind, dims })
    }

    /// Read one geometry, appending its polygons to `out`.
    fn geometry(&mut self, out: &mut Vec<Polygon<f64>>) -> Result<bool> {
        let header = self.header()?;
        match header.kind {
            WKB_POINT => {
                self.coord(&header)?;
                Ok(false)
            }
            WKB_LINESTRING => {
                self.ring(&header)?;
                Ok(false)
            }
            WKB_POLYGON => {
                out.extend(self.polygon(&header)?);
                Ok(true)
            }
            WKB_MULTIPOINT | WKB_MULTILINESTRING | WKB_MULTIPOLYGON | WKB_COLLECTION => {
                let count = self.u32(header.little_endian)?;
                let mut polygonal = false;
                for _ in 0..count {
                    polygonal |= self.geometry(out)?;
                }
                Ok(polygonal)
            }
            other => bail!("unsupported WKB geometry type {other}"),
        }
    }

    /// Polygon body; `None` for a polygon without rings.
    fn polygon(&mut self, header: &Header) -> Result<Option<Polygon<f64>>> {
        let count = self.u32(header.little_endian)?;
        if count == 0 { return Ok(None) }
        let exterior = self.ring(header)?;
        let interiors = (1..count).map(|_| self.ring(header)).collect::<Result<Vec<_>>>()?;
        Ok(Some(Polygon::new(exterior, interiors)))
    }

    fn ring(&mut self, header: &Header) -> Result<LineString<f64>> {
        let count = self.u32(header.little_endian)? as usize;
        let mut coords = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            coords.push(self.coord(header)?);
        }
        Ok(LineString(coords))
    }

    /// Read one position, keeping x and y.
    fn coord(&mut self, header: &Header) -> Result<Coord<f64>> {
        let x = self.f64(header.little_endian)?;
        let y = self.f64(header.little_endian)?;
        for _ in 2..header.dims {
            self.f64(header.little_endian)?;
        }
        Ok(Coord { x, y })
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.cursor.read_exact(&mut buf).context("truncated WKB geometry")?;
        Ok(buf)
    }

    fn u32(&mut self, little_endian: bool) -> Result<u32> {
        let bytes = self.bytes()?;
        Ok(if little_endian { u32::from_le_bytes(bytes) } else { u32::from_be_bytes(bytes) })
    }

    fn f64(&mut self, little_endian: bool) -> Result<f64> {
        let bytes = self.bytes()?;
        Ok(if little_endian { f64::from_le_bytes(bytes) } else { f64::from_be_bytes(bytes) })
    }
}

/// Encode polygon rings as WKB, optionally with a zero Z on every position.
#[cfg(test)]
pub(crate) fn polygon_wkb(rings: &[&[(f64, f64)]], little_endian: bool, with_z: bool) -> Vec<u8> {
    let u32_bytes = |v: u32| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
    let f64_bytes = |v: f64| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };

    let mut wkb = vec![u8::from(little_endian)];
    wkb.extend(u32_bytes(if with_z { 1000 + WKB_POLYGON } else { WKB_POLYGON }));
    wkb.extend(u32_bytes(rings.len() as u32));
    for ring in rings {
        wkb.extend(u32_bytes(ring.len() as u32));
        for &(x, y) in *ring {
            wkb.extend(f64_bytes(x));
            wkb.extend(f64_bytes(y));
            if with_z { wkb.extend(f64_bytes(0.0)) }
        }
    }
    wkb
}

#[cfg(test)]
mod tests {
    use geo::Area;

    use super::*;

    const SQUARE: &[(f64, f64)] = &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)];
    const HOLE: &[(f64, f64)] = &[(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0), (2.0, 2.0)];

    #[test]
    fn polygon_with_hole() {
        let (shape, polygonal) = read_wkb(&polygon_wkb(&[SQUARE, HOLE], true, false)).unwrap();
        assert!(polygonal);
        assert_eq!(shape.0.len(), 1);
        assert_eq!(shape.0[0].interiors().len(), 1);
        assert!((shape.unsigned_area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn big_endian_multipolygon() {
        let mut wkb = vec![0u8];
        wkb.extend(WKB_MULTIPOLYGON.to_be_bytes());
        wkb.extend(2u32.to_be_bytes());
        wkb.extend(polygon_wkb(&[SQUARE], false, false));
        wkb.extend(polygon_wkb(&[HOLE], true, false));

        let (shape, polygonal) = read_wkb(&wkb).unwrap();
        assert!(polygonal);
        assert_eq!(shape.0.len(), 2);
        assert!((shape.unsigned_area() - 104.0).abs() < 1e-9);
    }

    #[test]
    fn z_coordinates_are_dropped() {
        let (shape, _) = read_wkb(&polygon_wkb(&[SQUARE], true, true)).unwrap();
        assert_eq!(shape.0[0].exterior().0[2], Coord { x: 10.0, y: 10.0 });
    }

    #[test]
    fn point_has_no_area() {
        let mut wkb = vec![WKB_LE];
        wkb.extend(WKB_POINT.to_le_bytes());
        wkb.extend(6.1f64.to_le_bytes());
        wkb.extend(46.2f64.to_le_bytes());

        let (shape, polygonal) = read_wkb(&wkb).unwrap();
        assert!(!polygonal);
        assert!(shape.0.is_empty());
    }

    #[test]
    fn truncated_input_is_error() {
        let wkb = polygon_wkb(&[SQUARE], true, false);
        assert!(read_wkb(&wkb[..wkb.len() - 4]).is_err());
    }
}
