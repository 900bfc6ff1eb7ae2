//! Décodage des features GeoJSON stockées en texte
//!
//! Le contrôle structurel reprend les règles de validité GeoJSON usuelles
//! (positions à 2 ou 3 coordonnées, lignes d'au moins 2 points, anneaux
//! fermés d'au moins 4 points) et s'applique avant la conversion en types
//! `geo`, qui suppose des positions bien formées.
//!
//! Les types `geo` sont en 2D : une coordonnée Z éventuelle est acceptée au
//! contrôle puis abandonnée à la conversion (tracé en `debug!`).

use std::str::FromStr;

use geo::Geometry;
use geojson::{GeoJson, Position, Value};
use tracing::{debug, trace};

use crate::error::FeatureError;
use crate::types::{DecodedFeature, GeometryKind};

/// Décode le texte d'une feature GeoJSON et valide sa géométrie
///
/// # Errors
///
/// Retourne `FeatureError::MalformedGeometry` si le texte n'est pas une
/// `Feature` GeoJSON, si la géométrie est absente, ou si elle échoue au
/// contrôle structurel.
pub fn decode_feature(feature_id: i64, text: &str) -> Result<DecodedFeature, FeatureError> {
    let geojson =
        GeoJson::from_str(text).map_err(|e| FeatureError::malformed(feature_id, e.to_string()))?;

    let feature = match geojson {
        GeoJson::Feature(feature) => feature,
        GeoJson::Geometry(_) => {
            return Err(FeatureError::malformed(
                feature_id,
                "expected a Feature, found a bare Geometry",
            ))
        }
        GeoJson::FeatureCollection(_) => {
            return Err(FeatureError::malformed(
                feature_id,
                "expected a Feature, found a FeatureCollection",
            ))
        }
    };

    let geometry = feature
        .geometry
        .ok_or_else(|| FeatureError::malformed(feature_id, "feature has no geometry"))?;

    validate_value(&geometry.value).map_err(|reason| FeatureError::malformed(feature_id, reason))?;

    let kind = GeometryKind::of(&geometry.value);
    if has_z(&geometry.value) {
        debug!(feature_id, kind = %kind, "Z coordinate dropped");
    }
    let geometry = Geometry::<f64>::try_from(geometry)
        .map_err(|e| FeatureError::malformed(feature_id, e.to_string()))?;

    trace!(feature_id, kind = %kind, "Feature decoded");

    Ok(DecodedFeature {
        feature_id,
        geometry,
        kind,
        properties: feature.properties.unwrap_or_default(),
    })
}

/// Contrôle structurel d'une valeur géométrique
fn validate_value(value: &Value) -> Result<(), String> {
    match value {
        Value::Point(position) => position_ok(position),
        Value::MultiPoint(positions) => positions.iter().try_for_each(|p| position_ok(p)),
        Value::LineString(line) => line_ok(line),
        Value::MultiLineString(lines) => lines.iter().try_for_each(|l| line_ok(l)),
        Value::Polygon(rings) => polygon_ok(rings),
        Value::MultiPolygon(polygons) => polygons.iter().try_for_each(|p| polygon_ok(p)),
        Value::GeometryCollection(geometries) => geometries
            .iter()
            .try_for_each(|g| validate_value(&g.value)),
    }
}

/// Vrai si au moins une position porte une coordonnée Z
fn has_z(value: &Value) -> bool {
    let any_z = |positions: &[Position]| positions.iter().any(|p| p.len() > 2);
    match value {
        Value::Point(position) => position.len() > 2,
        Value::MultiPoint(positions) | Value::LineString(positions) => any_z(positions),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines.iter().any(|l| any_z(l)),
        Value::MultiPolygon(polygons) => polygons.iter().flatten().any(|r| any_z(r)),
        Value::GeometryCollection(geometries) => geometries.iter().any(|g| has_z(&g.value)),
    }
}

fn position_ok(position: &Position) -> Result<(), String> {
    if !(2..=3).contains(&position.len()) {
        return Err(format!(
            "a position must have 2 or 3 coordinates, found {}",
            position.len()
        ));
    }
    if position.iter().any(|c| !c.is_finite()) {
        return Err("a position contains a non-finite coordinate".to_string());
    }
    Ok(())
}

fn line_ok(line: &[Position]) -> Result<(), String> {
    if line.len() < 2 {
        return Err(format!(
            "a LineString needs at least 2 positions, found {}",
            line.len()
        ));
    }
    line.iter().try_for_each(|p| position_ok(p))
}

fn polygon_ok(rings: &[Vec<Position>]) -> Result<(), String> {
    if rings.is_empty() {
        return Err("a Polygon needs an exterior ring".to_string());
    }
    for ring in rings {
        // LinearRing: >= 4 positions, first == last
        if ring.len() < 4 {
            return Err(format!(
                "a linear ring needs at least 4 positions, found {}",
                ring.len()
            ));
        }
        ring.iter().try_for_each(|p| position_ok(p))?;
        if ring.first() != ring.last() {
            return Err("a linear ring must be closed".to_string());
        }
    }
    Ok(())
}
