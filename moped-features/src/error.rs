//! Types d'erreurs pour le crate moped-features

use thiserror::Error;

/// Erreurs pouvant survenir lors du décodage ou de la classification d'une feature
#[derive(Debug, Error)]
pub enum FeatureError {
    /// GeoJSON illisible ou structurellement invalide
    #[error("Malformed geometry for feature {feature_id}: {reason}")]
    MalformedGeometry { feature_id: i64, reason: String },

    /// Aucune règle ne s'applique et le composant n'a pas de table par défaut
    #[error("No target table for feature {feature_id} (component '{component}')")]
    ClassificationGap { feature_id: i64, component: String },

    /// Échec d'encodage (WKB, WKT)
    #[error("Geometry encoding failed: {0}")]
    Encoding(String),
}

impl FeatureError {
    /// Crée une erreur de géométrie malformée
    pub fn malformed(feature_id: i64, reason: impl Into<String>) -> Self {
        Self::MalformedGeometry {
            feature_id,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de classification
    pub fn gap(feature_id: i64, component: impl Into<String>) -> Self {
        Self::ClassificationGap {
            feature_id,
            component: component.into(),
        }
    }
}
