use std::path::Path;

use ahash::AHashMap;
use anyhow::{anyhow, bail, ensure, Context, Result};
use geo::MultiPolygon;
use rusqlite::{types::ValueRef, Connection, OpenFlags, OptionalExtension};
use tracing::warn;

use super::{attrs::Attr, shp::epsg_from_wkt, wkb::read_wkb};

/// Shapes and attribute rows read from the feature table of a GeoPackage.
#[derive(Debug, Default)]
pub(crate) struct GeoPackageFeatures {
    pub table: String,
    pub shapes: Vec<MultiPolygon<f64>>,
    pub names: Vec<String>, // Attribute columns in table order
    pub rows: Vec<AHashMap<String, Attr>>,
    pub epsg: Option<u32>,
    pub non_polygonal: usize,
}

/// Attribute column of a feature table.
struct Field {
    name: String,
    boolean: bool,
}

/// Reads the first feature table listed in `gpkg_contents`.
pub(crate) fn read_geopackage(path: &Path) -> Result<GeoPackageFeatures> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open GeoPackage: {}", path.display()))?;

    let mut statement = conn.prepare(
        "SELECT c.table_name, g.column_name, g.srs_id
         FROM gpkg_contents c JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
         WHERE c.data_type = 'features' ORDER BY c.rowid",
    ).with_context(|| format!("{} is not a GeoPackage", path.display()))?;
    let tables = statement
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let Some((table, geometry_column, srs_id)) = tables.first().cloned() else {
        bail!("GeoPackage {} has no feature table", path.display())
    };
    if tables.len() > 1 {
        warn!(path = %path.display(), %table, tables = tables.len(), "GeoPackage has several feature tables, reading the first");
    }

    let fields = attribute_fields(&conn, &table, &geometry_column)?;
    let mut out = GeoPackageFeatures {
        names: fields.iter().map(|field| field.name.clone()).collect(),
        epsg: srs_epsg(&conn, srs_id)?,
        table,
        ..Default::default()
    };

    let columns = std::iter::once(geometry_column.as_str())
        .chain(fields.iter().map(|field| field.name.as_str()))
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ");
    let mut statement = conn.prepare(&format!("SELECT {columns} FROM {}", quote(&out.table)))?;
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let (shape, polygonal) = match row.get::<_, Option<Vec<u8>>>(0)? {
            Some(blob) => read_geometry_blob(&blob)
                .with_context(|| format!("Bad geometry in feature {} of {}", out.shapes.len(), out.table))?,
            None => (MultiPolygon(vec![]), false),
        };
        out.non_polygonal += usize::from(!polygonal);
        out.shapes.push(shape);

        let mut attrs = AHashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            attrs.insert(field.name.clone(), value_to_attr(row.get_ref(i + 1)?, field.boolean));
        }
        out.rows.push(attrs);
    }

    Ok(out)
}

/// Non-key, non-geometry columns. Blob columns hold no aggregatable values and are left out.
fn attribute_fields(conn: &Connection, table: &str, geometry_column: &str) -> Result<Vec<Field>> {
    let mut statement = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let columns = statement
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, i64>(5)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    ensure!(!columns.is_empty(), "feature table {table} not found");

    Ok(columns.into_iter()
        .filter(|(name, declared, pk)| *pk == 0 && name != geometry_column && !declared.eq_ignore_ascii_case("BLOB"))
        .map(|(name, declared, _)| Field { name, boolean: declared.eq_ignore_ascii_case("BOOLEAN") })
        .collect())
}

/// EPSG code of a spatial reference system row. Undefined systems have none.
fn srs_epsg(conn: &Connection, srs_id: i64) -> Result<Option<u32>> {
    let srs = conn.query_row(
        "SELECT organization, organization_coordsys_id, definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
        [srs_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
    ).optional()?;

    let Some((organization, code, definition)) = srs else {
        warn!(srs_id, "spatial reference system missing from gpkg_spatial_ref_sys");
        return Ok(None);
    };
    if organization.eq_ignore_ascii_case("EPSG") && code > 0 {
        return Ok(u32::try_from(code).ok());
    }
    Ok(epsg_from_wkt(&definition))
}

/// Strip the GeoPackage binary header and decode the WKB that follows.
pub(crate) fn read_geometry_blob(blob: &[u8]) -> Result<(MultiPolygon<f64>, bool)> {
    ensure!(blob.len() >= 8 && blob.starts_with(b"GP"), "not a GeoPackage geometry blob");
    let flags = blob[3];
    ensure!(flags & 0b10_0000 == 0, "extended GeoPackage geometries are not supported");
    if flags & 0b1_0000 != 0 {
        return Ok((MultiPolygon(vec![]), false));
    }
    let envelope = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => bail!("invalid GeoPackage envelope indicator {other}"),
    };
    let wkb = blob.get(8 + envelope..).ok_or_else(|| anyhow!("truncated GeoPackage geometry"))?;
    read_wkb(wkb)
}

fn value_to_attr(value: ValueRef<'_>, boolean: bool) -> Attr {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Attr::Null,
        ValueRef::Integer(value) if boolean => Attr::Bool(value != 0),
        ValueRef::Integer(value) => Attr::Int(value),
        ValueRef::Real(value) => Attr::Float(value),
        ValueRef::Text(text) => Attr::Text(String::from_utf8_lossy(text).into_owned()),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Wrap WKB in a little-endian GeoPackage header with an XY envelope.
#[cfg(test)]
fn geometry_blob(wkb: &[u8], srs_id: i32) -> Vec<u8> {
    let mut blob = vec![b'G', b'P', 0, 0b0000_0011];
    blob.extend(srs_id.to_le_bytes());
    blob.extend([0u8; 32]);
    blob.extend(wkb);
    blob
}

/// Write a GeoPackage with one `cells` table of unit squares side by side, in `srs_id`.
#[cfg(test)]
pub(crate) fn write_geopackage(path: &Path, srs_id: i32, cells: &[(Option<f64>, &str, bool)]) {
    use rusqlite::params;

    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY,
            organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL,
            definition TEXT NOT NULL, description TEXT);
         CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL,
            identifier TEXT, description TEXT DEFAULT '', last_change DATETIME,
            min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE, srs_id INTEGER);
         CREATE TABLE gpkg_geometry_columns (table_name TEXT NOT NULL, column_name TEXT NOT NULL,
            geometry_type_name TEXT NOT NULL, srs_id INTEGER NOT NULL, z TINYINT NOT NULL, m TINYINT NOT NULL);
         CREATE TABLE cells (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom POLYGON,
            DENS REAL, TYPO TEXT, URBAIN BOOLEAN, thumb BLOB);",
    ).unwrap();
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('CH1903+ / LV95', ?1, 'EPSG', ?1, 'PROJCS[\"CH1903+ / LV95\"]', NULL)",
        [srs_id],
    ).unwrap();
    conn.execute("INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) VALUES ('cells', 'features', 'cells', ?1)", [srs_id]).unwrap();
    conn.execute("INSERT INTO gpkg_geometry_columns VALUES ('cells', 'geom', 'POLYGON', ?1, 0, 0)", [srs_id]).unwrap();

    for (i, (dens, typo, urbain)) in cells.iter().enumerate() {
        let x = i as f64;
        let ring = [(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0), (x, 0.0)];
        let blob = geometry_blob(&super::wkb::polygon_wkb(&[&ring], true, false), srs_id);
        conn.execute(
            "INSERT INTO cells (geom, DENS, TYPO, URBAIN, thumb) VALUES (?1, ?2, ?3, ?4, x'00')",
            params![blob, dens, typo, urbain],
        ).unwrap();
    }
}
