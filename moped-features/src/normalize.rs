//! Normalisation des clés de propriétés vers le vocabulaire canonique
//!
//! Règles appliquées à chaque clé, dans l'ordre :
//! 1. suppression d'un unique `_` en tête
//! 2. passage en minuscules
//! 3. table de synonymes (`rendertype` → `render_type`, `id` → `knack_id`, ...)
//!
//! Les valeurs ne sont jamais converties.

use geojson::JsonObject;

/// Synonymes appliqués après mise en minuscules
pub const SYNONYMS: &[(&str, &str)] = &[
    ("rendertype", "render_type"),
    ("id", "knack_id"),
    ("sourcelayer", "source_layer"),
    ("intersectionid", "intersection_id"),
];

/// Normalise une clé de propriété
pub fn normalize_key(key: &str) -> String {
    let stripped = key.strip_prefix('_').unwrap_or(key);
    let lowered = stripped.to_lowercase();

    SYNONYMS
        .iter()
        .find(|(from, _)| *from == lowered)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or(lowered)
}

/// Propriétés normalisées, dans l'ordre du document
///
/// L'ordre (`preserve_order`) détermine la liste de colonnes de l'`INSERT`.
/// Une clé déjà présente garde sa position et prend la nouvelle valeur.
pub type Properties = JsonObject;

/// Normalise toutes les clés d'un objet de propriétés GeoJSON
pub fn normalize_properties(raw: JsonObject) -> Properties {
    raw.into_iter()
        .map(|(key, value)| (normalize_key(&key), value))
        .collect()
}
