//! Préparation des géométries pour PostGIS
//!
//! Les colonnes `geography` cibles sont multi-géométries en SRID 4326 :
//! chaque géométrie simple est enveloppée dans son équivalent multi avant
//! d'être encodée en EWKB.

use geo::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon};
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;
use wkb::geom_to_wkb;

use crate::error::FeatureError;

/// SRID des colonnes geography (WGS84)
pub const SRID_WGS84: u32 = 4326;

/// Flag EWKB indiquant la présence d'un SRID
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// Enveloppe une géométrie simple dans son équivalent multi
///
/// Les multi-géométries et les collections sont renvoyées telles quelles.
pub fn to_multi(geometry: Geometry) -> Geometry {
    match geometry {
        Geometry::Point(p) => Geometry::MultiPoint(MultiPoint::new(vec![p])),
        Geometry::LineString(ls) => Geometry::MultiLineString(MultiLineString::new(vec![ls])),
        Geometry::Polygon(p) => Geometry::MultiPolygon(MultiPolygon::new(vec![p])),
        Geometry::Line(l) => {
            Geometry::MultiLineString(MultiLineString::new(vec![LineString::from(l)]))
        }
        Geometry::Rect(r) => Geometry::MultiPolygon(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Geometry::MultiPolygon(MultiPolygon::new(vec![t.to_polygon()])),
        other => other,
    }
}

/// Encode une géométrie en EWKB (WKB + SRID)
pub fn to_ewkb(geometry: &Geometry, srid: u32) -> Result<Vec<u8>, FeatureError> {
    let wkb = geom_to_wkb(geometry)
        .map_err(|e| FeatureError::Encoding(format!("Failed to convert geometry to WKB: {:?}", e)))?;

    add_srid_to_wkb(&wkb, srid)
}

/// Ajoute le SRID au WKB pour créer du EWKB
fn add_srid_to_wkb(wkb: &[u8], srid: u32) -> Result<Vec<u8>, FeatureError> {
    if wkb.len() < 5 {
        return Err(FeatureError::Encoding(format!(
            "WKB too short ({} bytes)",
            wkb.len()
        )));
    }

    let mut ewkb = Vec::with_capacity(wkb.len() + 4);

    // Byte order
    ewkb.push(wkb[0]);

    let type_bytes = [wkb[1], wkb[2], wkb[3], wkb[4]];
    if wkb[0] == 1 {
        // Little endian
        let geom_type = u32::from_le_bytes(type_bytes) | EWKB_SRID_FLAG;
        ewkb.extend_from_slice(&geom_type.to_le_bytes());
        ewkb.extend_from_slice(&srid.to_le_bytes());
    } else {
        let geom_type = u32::from_be_bytes(type_bytes) | EWKB_SRID_FLAG;
        ewkb.extend_from_slice(&geom_type.to_be_bytes());
        ewkb.extend_from_slice(&srid.to_be_bytes());
    }

    ewkb.extend_from_slice(&wkb[5..]);

    Ok(ewkb)
}

/// Représentation WKT, utilisée dans les logs et le rapport
pub fn to_wkt(geometry: &Geometry) -> Result<String, FeatureError> {
    let mut buf = Vec::new();
    {
        let mut writer = WktWriter::new(&mut buf);
        geometry
            .process_geom(&mut writer)
            .map_err(|e| FeatureError::Encoding(e.to_string()))?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
