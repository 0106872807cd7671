use std::{fs, path::Path, sync::LazyLock};

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use regex::Regex;
use shapefile::{
    dbase::{self, FieldValue, Record},
    Point, PolygonRing, Reader, Shape,
};
use tracing::warn;

use super::attrs::Attr;

/// Shapes and attribute rows read from a `.shp` + `.dbf` pair.
#[derive(Debug, Default)]
pub(crate) struct ShapefileFeatures {
    pub shapes: Vec<MultiPolygon<f64>>,
    pub names: Vec<String>, // Field names in `.dbf` order
    pub rows: Vec<AHashMap<String, Attr>>,
    pub epsg: Option<u32>,
    pub non_polygonal: usize,
}

/// Reads all shapes + attribute records from a given `.shp` file path.
pub(crate) fn read_shapefile(path: &Path) -> Result<ShapefileFeatures> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let names = dbase::Reader::from_path(path.with_extension("dbf"))
        .with_context(|| format!("Failed to open attribute table of {}", path.display()))?
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect::<Vec<_>>();

    let mut out = ShapefileFeatures {
        names,
        epsg: epsg_from_prj(path),
        ..Default::default()
    };

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("Error reading shape+record")?;
        let (shape, polygonal) = shape_to_multipolygon(shape)?;
        out.non_polygonal += usize::from(!polygonal);
        out.shapes.push(shape);
        out.rows.push(record_to_attrs(record, &out.names));
    }

    Ok(out)
}

/// Coerce a generic shape into an owned multipolygon. Points and lines have no area and become empty.
fn shape_to_multipolygon(shape: Shape) -> Result<(MultiPolygon<f64>, bool)> {
    match shape {
        Shape::Polygon(polygon) => Ok((rings_to_multipolygon(polygon.rings().iter()
            .map(|ring| ring_coords(ring, |p: &Point| Coord { x: p.x, y: p.y })))?, true)),
        Shape::PolygonM(polygon) => Ok((rings_to_multipolygon(polygon.rings().iter()
            .map(|ring| ring_coords(ring, |p| Coord { x: p.x, y: p.y })))?, true)),
        Shape::PolygonZ(polygon) => Ok((rings_to_multipolygon(polygon.rings().iter()
            .map(|ring| ring_coords(ring, |p| Coord { x: p.x, y: p.y })))?, true)),
        Shape::NullShape => Ok((MultiPolygon(vec![]), false)),
        Shape::Point(_) | Shape::PointM(_) | Shape::PointZ(_)
        | Shape::Multipoint(_) | Shape::MultipointM(_) | Shape::MultipointZ(_)
        | Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => Ok((MultiPolygon(vec![]), false)),
        other => bail!("unsupported shape type in layer: {:?}", other.shapetype()),
    }
}

/// Close a ring and flag whether it is an outer ring.
fn ring_coords<P>(ring: &PolygonRing<P>, to_coord: impl Fn(&P) -> Coord<f64>) -> (Vec<Coord<f64>>, bool) {
    let is_outer = matches!(ring, PolygonRing::Outer(_));
    let mut coords = ring.points().iter().map(to_coord).collect::<Vec<_>>();
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last { coords.push(first) }
    }
    (coords, is_outer)
}

/// Group rings into polygons: each outer ring owns the inner rings that follow it (Shapefile order).
fn rings_to_multipolygon(rings: impl Iterator<Item = (Vec<Coord<f64>>, bool)>) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes = Vec::new();

    for (coords, is_outer) in rings {
        if is_outer {
            if let Some(ext) = exterior.take() {
                polygons.push(Polygon::new(ext, std::mem::take(&mut holes)));
            }
            exterior = Some(LineString(coords));
        } else if exterior.is_some() {
            holes.push(LineString(coords));
        } else {
            bail!("inner ring found before any outer ring");
        }
    }
    if let Some(ext) = exterior {
        polygons.push(Polygon::new(ext, holes));
    }

    Ok(MultiPolygon(polygons))
}

/// Convert a `.dbf` record into attributes. Date and memo fields are skipped.
fn record_to_attrs(record: Record, names: &[String]) -> AHashMap<String, Attr> {
    names.iter()
        .filter_map(|name| {
            let attr = match record.get(name)? {
                FieldValue::Character(value) => value.as_ref()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map_or(Attr::Null, |s| Attr::Text(s.to_string())),
                FieldValue::Numeric(value) => value.map_or(Attr::Null, numeric_attr),
                FieldValue::Float(value) => value.map_or(Attr::Null, |f| Attr::Float(f as f64)),
                FieldValue::Double(value) => Attr::Float(*value),
                FieldValue::Currency(value) => Attr::Float(*value),
                FieldValue::Integer(value) => Attr::Int(*value as i64),
                FieldValue::Logical(value) => value.map_or(Attr::Null, Attr::Bool),
                other => {
                    warn!(field = %name, "skipping unsupported dbf field type {:?}", other.field_type());
                    return None;
                }
            };
            Some((name.clone(), attr))
        })
        .collect()
}

/// `N` fields hold integers and decimals alike; keep whole numbers as integers.
fn numeric_attr(value: f64) -> Attr {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 { Attr::Int(value as i64) } else { Attr::Float(value) }
}

static AUTHORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"AUTHORITY\["EPSG",\s*"?(\d+)"?\]\s*\]\s*$"#).expect("valid regex")
});

static UTM_ZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"WGS_1984_UTM_Zone_(\d{1,2})([NS])").expect("valid regex")
});

/// Detect the EPSG code of a shapefile from its `.prj` sidecar (ESRI WKT).
pub(crate) fn epsg_from_prj(path: &Path) -> Option<u32> {
    let wkt = fs::read_to_string(path.with_extension("prj")).ok()?;
    epsg_from_wkt(&wkt)
}

/// Recognize the CRS of a WKT string, either from its top-level EPSG authority or by name.
pub(crate) fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    if let Some(code) = AUTHORITY.captures(wkt.trim()).and_then(|c| c[1].parse().ok()) {
        return Some(code);
    }
    if let Some(caps) = UTM_ZONE.captures(wkt) {
        let zone: u32 = caps[1].parse().ok()?;
        return Some(if &caps[2] == "N" { 32600 + zone } else { 32700 + zone });
    }

    let projected = wkt.trim_start().starts_with("PROJCS");
    if wkt.contains("LV95") || wkt.contains("CH1903+") { Some(2056) }
    else if wkt.contains("LV03") || wkt.contains("CH1903") { Some(21781) }
    else if wkt.contains("Web_Mercator") || wkt.contains("Pseudo_Mercator") { Some(3857) }
    else if !projected && wkt.contains("North_American_1983") { Some(4269) }
    else if !projected && wkt.contains("WGS_1984") { Some(4326) }
    else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_swiss_and_geographic_wkt() {
        let lv95 = r#"PROJCS["CH1903+_LV95",GEOGCS["GCS_CH1903+",DATUM["D_CH1903+",SPHEROID["Bessel_1841",6377397.155,299.1528128]]],PROJECTION["Hotine_Oblique_Mercator_Azimuth_Center"]]"#;
        let wgs84 = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(epsg_from_wkt(lv95), Some(2056));
        assert_eq!(epsg_from_wkt(wgs84), Some(4326));
    }

    #[test]
    fn recognizes_utm_zone_and_authority() {
        let utm = r#"PROJCS["WGS_1984_UTM_Zone_32N",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(epsg_from_wkt(utm), Some(32632));
        let with_authority = r#"PROJCS["x",GEOGCS["y",AUTHORITY["EPSG","4326"]],AUTHORITY["EPSG","2056"]]"#;
        assert_eq!(epsg_from_wkt(with_authority), Some(2056));
    }

    #[test]
    fn unknown_wkt_is_none() {
        assert_eq!(epsg_from_wkt(r#"PROJCS["Local_Grid"]"#), None);
    }

    #[test]
    fn outer_rings_own_following_holes() {
        let square = |x0: f64, size: f64| vec![
            Coord { x: x0, y: 0.0 }, Coord { x: x0 + size, y: 0.0 },
            Coord { x: x0 + size, y: size }, Coord { x: x0, y: size }, Coord { x: x0, y: 0.0 },
        ];
        let rings = vec![(square(0.0, 10.0), true), (square(2.0, 2.0), false), (square(20.0, 5.0), true)];
        let shape = rings_to_multipolygon(rings.into_iter()).unwrap();
        assert_eq!(shape.0.len(), 2);
        assert_eq!(shape.0[0].interiors().len(), 1);
        assert!(shape.0[1].interiors().is_empty());
    }

    #[test]
    fn whole_numeric_values_stay_integers() {
        assert_eq!(numeric_attr(4.0), Attr::Int(4));
        assert_eq!(numeric_attr(0.25), Attr::Float(0.25));
    }
}
