//! Classification des features vers leur table cible
//!
//! Les règles forment une table de décision ordonnée (`RULES`) : la première
//! règle qui correspond désigne la table cible et produit une correction de
//! couche pour le composant. Sans règle, la feature va dans la table par
//! défaut de la couche du composant.

use std::collections::HashSet;

use tracing::trace;

use crate::error::FeatureError;
use crate::types::GeometryKind;

/// Archétype générique d'emprise de projet
pub const PROJECT_EXTENT: &str = "Project Extent - Generic";

/// Archétype trottoir
pub const SIDEWALK: &str = "Sidewalk";

/// Sous-type de trottoir saisi à tort sur des feux
pub const CURB_AND_GUTTER: &str = "With Curb and Gutter";

/// Table vers laquelle une règle redirige
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Intersections,
    Signals,
}

/// Entrée du classifieur pour une feature
#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
    pub feature_id: i64,
    pub component_name: &'a str,
    pub component_subtype: Option<&'a str>,
    pub kind: GeometryKind,
    /// Table par défaut de la couche du composant
    pub nominal_table: Option<&'a str>,
}

/// Règle de la table de décision
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub route: Route,
    matches: fn(&ClassifyInput<'_>, &KnownExceptions) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("route", &self.route)
            .finish()
    }
}

impl Rule {
    pub fn matches(&self, input: &ClassifyInput<'_>, exceptions: &KnownExceptions) -> bool {
        (self.matches)(input, exceptions)
    }
}

/// Règles, par ordre de priorité
pub const RULES: &[Rule] = &[
    Rule {
        name: "project-extent-point",
        route: Route::Intersections,
        matches: project_extent_point,
    },
    Rule {
        name: "sidewalk-curb-point",
        route: Route::Signals,
        matches: sidewalk_curb_point,
    },
    Rule {
        name: "known-signal-exception",
        route: Route::Signals,
        matches: known_signal_exception,
    },
];

fn project_extent_point(input: &ClassifyInput<'_>, _: &KnownExceptions) -> bool {
    input.component_name == PROJECT_EXTENT && input.kind.is_point()
}

fn sidewalk_curb_point(input: &ClassifyInput<'_>, _: &KnownExceptions) -> bool {
    input.component_name == SIDEWALK
        && input.component_subtype == Some(CURB_AND_GUTTER)
        && input.kind.is_point()
}

fn known_signal_exception(input: &ClassifyInput<'_>, exceptions: &KnownExceptions) -> bool {
    exceptions.contains(input.feature_id)
}

/// Features vérifiées à la main qui vont dans la table des feux
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownExceptions(HashSet<i64>);

impl KnownExceptions {
    pub fn new(feature_ids: impl IntoIterator<Item = i64>) -> Self {
        Self(feature_ids.into_iter().collect())
    }

    pub fn contains(&self, feature_id: i64) -> bool {
        self.0.contains(&feature_id)
    }
}

/// Noms des tables désignées par les règles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalog {
    pub intersections: String,
    pub signals: String,
}

impl TableCatalog {
    pub fn table_for(&self, route: Route) -> &str {
        match route {
            Route::Intersections => &self.intersections,
            Route::Signals => &self.signals,
        }
    }
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self {
            intersections: "feature_intersections".into(),
            signals: "feature_signals".into(),
        }
    }
}

/// Résultat de la classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Table où écrire la feature
    pub target: String,
    /// Nouvelle couche à enregistrer sur le composant
    pub layer_override: Option<String>,
    /// Règle appliquée (`None` = table par défaut)
    pub rule: Option<&'static str>,
}

/// Classifieur configuré (tables cibles + exceptions connues)
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    catalog: TableCatalog,
    exceptions: KnownExceptions,
}

impl Classifier {
    pub fn new(catalog: TableCatalog, exceptions: KnownExceptions) -> Self {
        Self {
            catalog,
            exceptions,
        }
    }

    /// Détermine la table cible d'une feature
    ///
    /// # Errors
    ///
    /// `FeatureError::ClassificationGap` si aucune règle ne s'applique et que
    /// le composant n'a pas de table par défaut.
    pub fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification, FeatureError> {
        if let Some(rule) = RULES.iter().find(|r| r.matches(input, &self.exceptions)) {
            let table = self.catalog.table_for(rule.route).to_string();
            trace!(
                feature_id = input.feature_id,
                rule = rule.name,
                table = %table,
                "Classification rule matched"
            );
            return Ok(Classification {
                target: table.clone(),
                layer_override: Some(table),
                rule: Some(rule.name),
            });
        }

        match input.nominal_table.map(str::trim) {
            Some(table) if !table.is_empty() => Ok(Classification {
                target: table.to_string(),
                layer_override: None,
                rule: None,
            }),
            _ => Err(FeatureError::gap(input.feature_id, input.component_name)),
        }
    }
}
