use ahash::AHashMap;
use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;

use super::attrs::Attr;

/// Features parsed from a GeoJSON document.
#[derive(Debug, Default)]
pub(crate) struct GeoJsonFeatures {
    pub shapes: Vec<MultiPolygon<f64>>,
    pub names: Vec<String>, // Property names in first-seen order
    pub rows: Vec<AHashMap<String, Attr>>,
    pub epsg: Option<u32>,
    pub non_polygonal: usize, // Features whose geometry carries no area
}

/// Read features from GeoJSON bytes. Accepts a FeatureCollection, a single Feature,
/// or a bare geometry object.
pub(crate) fn read_geojson_bytes(bytes: &[u8]) -> Result<GeoJsonFeatures> {
    let value: Value = serde_json::from_slice(bytes).context("Failed to parse GeoJSON bytes")?;
    let mut out = GeoJsonFeatures { epsg: parse_crs(&value), ..Default::default() };

    match value["type"].as_str() {
        Some("FeatureCollection") => {
            let features = value["features"].as_array()
                .ok_or_else(|| anyhow!("FeatureCollection without a features array"))?;
            for feature in features {
                push_feature(&mut out, feature)?;
            }
        }
        Some("Feature") => push_feature(&mut out, &value)?,
        Some(_) => {
            let (shape, polygonal) = parse_geometry(&value)?;
            out.non_polygonal += usize::from(!polygonal);
            out.shapes.push(shape);
            out.rows.push(AHashMap::new());
        }
        None => bail!("GeoJSON object has no type"),
    }

    Ok(out)
}

/// Append one Feature's geometry and properties.
fn push_feature(out: &mut GeoJsonFeatures, feature: &Value) -> Result<()> {
    let (shape, polygonal) = match &feature["geometry"] {
        Value::Null => (MultiPolygon(vec![]), false),
        geometry => parse_geometry(geometry)?,
    };
    out.non_polygonal += usize::from(!polygonal);
    out.shapes.push(shape);

    let mut row = AHashMap::new();
    if let Some(properties) = feature["properties"].as_object() {
        for (name, value) in properties {
            if !out.names.contains(name) {
                out.names.push(name.clone());
            }
            row.insert(name.clone(), property_to_attr(value));
        }
    }
    out.rows.push(row);
    Ok(())
}

/// Convert a JSON property value into an attribute. Nested arrays and objects are kept as JSON text.
fn property_to_attr(value: &Value) -> Attr {
    match value {
        Value::Null => Attr::Null,
        Value::Bool(b) => Attr::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Attr::Int(i),
            None => n.as_f64().map_or(Attr::Null, Attr::Float),
        },
        Value::String(s) => Attr::Text(s.clone()),
        other => Attr::Text(other.to_string()),
    }
}

/// Parse a GeoJSON geometry into a MultiPolygon. Returns false for point and line
/// geometries, which are kept as empty shapes.
pub(crate) fn parse_geometry(geometry: &Value) -> Result<(MultiPolygon<f64>, bool)> {
    let coords = &geometry["coordinates"];
    match geometry["type"].as_str() {
        Some("Polygon") => Ok((MultiPolygon(vec![parse_polygon(coords)?]), true)),
        Some("MultiPolygon") => {
            let polygons = coords.as_array()
                .ok_or_else(|| anyhow!("Invalid MultiPolygon: coordinates must be an array"))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok((MultiPolygon(polygons), true))
        }
        Some("GeometryCollection") => {
            let mut polygons = Vec::new();
            let mut polygonal = false;
            for member in geometry["geometries"].as_array().into_iter().flatten() {
                let (shape, is_polygonal) = parse_geometry(member)?;
                polygonal |= is_polygonal;
                polygons.extend(shape.0);
            }
            Ok((MultiPolygon(polygons), polygonal))
        }
        Some("Point" | "MultiPoint" | "LineString" | "MultiLineString") => Ok((MultiPolygon(vec![]), false)),
        Some(other) => bail!("Unsupported GeoJSON geometry type: {other}"),
        None => bail!("GeoJSON geometry has no type"),
    }
}

/// Parse Polygon coordinates: `[exterior, hole, hole, ...]`.
fn parse_polygon(coords: &Value) -> Result<Polygon<f64>> {
    let rings = coords.as_array()
        .ok_or_else(|| anyhow!("Invalid Polygon: coordinates must be an array of rings"))?;
    let (exterior, interiors) = rings.split_first()
        .ok_or_else(|| anyhow!("Invalid Polygon: missing exterior ring"))?;

    Ok(Polygon::new(
        parse_ring(exterior)?,
        interiors.iter().map(parse_ring).collect::<Result<Vec<_>>>()?,
    ))
}

/// Parse a ring `[[x, y], ...]`, closing it if needed.
fn parse_ring(coords: &Value) -> Result<LineString<f64>> {
    let mut points = coords.as_array()
        .ok_or_else(|| anyhow!("Invalid ring: expected an array of positions"))?
        .iter()
        .map(|position| {
            let x = position[0].as_f64().ok_or_else(|| anyhow!("Invalid coordinate: x must be a number"))?;
            let y = position[1].as_f64().ok_or_else(|| anyhow!("Invalid coordinate: y must be a number"))?;
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;

    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last { points.push(first) }
    }

    Ok(LineString(points))
}

/// Read the EPSG code from a legacy `crs` member, e.g. `urn:ogc:def:crs:EPSG::2056` or `EPSG:2056`.
/// `CRS84` names WGS84 lon/lat.
fn parse_crs(value: &Value) -> Option<u32> {
    let name = value["crs"]["properties"]["name"].as_str()?;
    if name.ends_with("CRS84") { return Some(4326) }
    let digits = name.rsplit(':').next()?;
    digits.parse().ok()
}
