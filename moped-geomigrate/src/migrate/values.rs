//! Paramètres SQL issus des propriétés JSON
//!
//! Les valeurs des propriétés ne sont pas converties côté client : elles sont
//! envoyées au format texte et c'est la fonction d'entrée du type de la
//! colonne cible qui les interprète (`7` dans un `integer`, `"drawn"` dans un
//! `text`, un objet dans un `jsonb`). Une valeur incompatible avec sa colonne
//! fait échouer l'`INSERT`, donc la feature.

use std::error::Error;

use bytes::BytesMut;
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};

/// Valeur de propriété liée à un paramètre `$n`
#[derive(Debug, Clone, Copy)]
pub struct JsonParam<'a>(pub &'a Value);

impl JsonParam<'_> {
    /// Représentation texte envoyée au serveur (`None` = NULL)
    pub fn as_text(&self) -> Option<String> {
        match self.0 {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            other @ (Value::Array(_) | Value::Object(_)) => Some(other.to_string()),
        }
    }
}

impl ToSql for JsonParam<'_> {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.as_text() {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}
