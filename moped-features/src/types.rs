//! Types de données pour le crate moped-features

use std::fmt;

use geo::Geometry;
use geojson::{JsonObject, Value};

/// Type de géométrie GeoJSON d'une feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// Tous les types, dans l'ordre de la RFC 7946
    pub const ALL: [GeometryKind; 7] = [
        GeometryKind::Point,
        GeometryKind::MultiPoint,
        GeometryKind::LineString,
        GeometryKind::MultiLineString,
        GeometryKind::Polygon,
        GeometryKind::MultiPolygon,
        GeometryKind::GeometryCollection,
    ];

    /// Type d'une valeur géométrique GeoJSON
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Point(_) => Self::Point,
            Value::MultiPoint(_) => Self::MultiPoint,
            Value::LineString(_) => Self::LineString,
            Value::MultiLineString(_) => Self::MultiLineString,
            Value::Polygon(_) => Self::Polygon,
            Value::MultiPolygon(_) => Self::MultiPolygon,
            Value::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Nom GeoJSON du type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Self::Point)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Une feature décodée depuis le texte GeoJSON stocké en base
#[derive(Debug, Clone)]
pub struct DecodedFeature {
    /// Identifiant de la ligne source
    pub feature_id: i64,

    /// Géométrie convertie en types `geo`
    pub geometry: Geometry,

    /// Type GeoJSON d'origine
    pub kind: GeometryKind,

    /// Propriétés brutes, dans l'ordre du document
    pub properties: JsonObject,
}
