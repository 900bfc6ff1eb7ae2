//! Identifiants SQL
//!
//! Les noms de tables viennent de la configuration et de `feature_layers`,
//! les noms de colonnes des clés de propriétés normalisées : ils sont
//! validés puis quotés avant d'entrer dans une requête.

use std::sync::OnceLock;

use regex::Regex;

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"))
}

/// Identifiant simple (colonne, table sans schéma)
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

/// Nom de table, éventuellement qualifié par un schéma (`schema.table`)
pub fn is_valid_table_name(name: &str) -> bool {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, None) => is_valid_identifier(table),
        (Some(schema), Some(table), None) => {
            is_valid_identifier(schema) && is_valid_identifier(table)
        }
        _ => false,
    }
}

/// Quote un identifiant (qualifié ou non)
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
