//! # moped-features
//!
//! Moteur de classification et de normalisation des features Moped.
//!
//! ## Features
//!
//! - Décodage et validation structurelle des features GeoJSON stockées en texte
//! - Normalisation des clés de propriétés vers le vocabulaire canonique
//! - Classification vers la table cible (table de décision ordonnée)
//! - Encodage multi-géométrie EWKB (SRID 4326) pour les colonnes `geography`
//!
//! ## Usage
//!
//! ```rust
//! use moped_features::{decode_feature, normalize_properties, Classifier, ClassifyInput};
//!
//! let text = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-97.7,30.3]},"properties":{"_ID":7}}"#;
//! let feature = decode_feature(1, text).unwrap();
//! let properties = normalize_properties(feature.properties);
//! assert_eq!(properties.keys().map(String::as_str).collect::<Vec<_>>(), vec!["knack_id"]);
//!
//! let classification = Classifier::default()
//!     .classify(&ClassifyInput {
//!         feature_id: 1,
//!         component_name: "Project Extent - Generic",
//!         component_subtype: None,
//!         kind: feature.kind,
//!         nominal_table: Some("feature_drawn_lines"),
//!     })
//!     .unwrap();
//! assert_eq!(classification.target, "feature_intersections");
//! ```

pub mod classify;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod types;

pub use classify::{Classification, Classifier, ClassifyInput, KnownExceptions, TableCatalog};
pub use decode::decode_feature;
pub use error::FeatureError;
pub use normalize::{normalize_key, normalize_properties, Properties};
pub use types::{DecodedFeature, GeometryKind};
