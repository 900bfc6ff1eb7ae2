//! Configuration de la migration
//!
//! Décrit les tables cibles, la table de liaison composant/feature, le champ
//! de correction de couche des composants et les exceptions connues.

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};
use moped_features::{KnownExceptions, TableCatalog};

use crate::migrate::sql::{is_valid_identifier, is_valid_table_name};

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// Tables cibles par archétype
    pub targets: TargetTables,

    /// Table de liaison composant → feature migrée
    pub link: LinkTable,

    /// Table des composants de projet (champ de correction de couche)
    pub components: ComponentTable,

    /// Table des couches (`internal_table` → id)
    pub feature_layers: FeatureLayerTable,

    /// Features forcées vers la table des feux
    #[serde(default)]
    pub signal_exceptions: Vec<i64>,
}

/// Tables cibles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetTables {
    pub intersections: TableConfig,
    pub signals: TableConfig,
    pub street_segments: TableConfig,
    pub drawn_points: TableConfig,
    pub drawn_lines: TableConfig,
}

impl TargetTables {
    pub fn all(&self) -> [&TableConfig; 5] {
        [
            &self.intersections,
            &self.signals,
            &self.street_segments,
            &self.drawn_points,
            &self.drawn_lines,
        ]
    }
}

/// Configuration d'une table cible
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    /// Nom de la table PostgreSQL (`schema.table` accepté)
    pub table: String,

    /// Colonne identité
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Colonne geography
    #[serde(default = "default_geography_column")]
    pub geography_column: String,
}

/// Table de liaison
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkTable {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub component_column: String,
    pub feature_column: String,
}

/// Table des composants de projet
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComponentTable {
    pub table: String,
    pub id_column: String,
    pub override_column: String,
}

/// Table des couches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureLayerTable {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub internal_table_column: String,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_geography_column() -> String {
    "geography".to_string()
}

impl MigrationConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "moped" => Self::load_embedded(include_str!("presets/moped.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: moped", preset),
        }
    }

    /// Preset ou chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "moped" => Self::from_preset(spec),
            _ => Self::load(Path::new(spec)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse embedded config")?;
        config.validate()?;
        Ok(config)
    }

    /// Vérifie tous les identifiants SQL de la configuration
    pub fn validate(&self) -> Result<()> {
        let mut tables: Vec<&str> = self.targets.all().iter().map(|t| t.table.as_str()).collect();
        tables.extend([
            self.link.table.as_str(),
            self.components.table.as_str(),
            self.feature_layers.table.as_str(),
        ]);
        for table in tables {
            if !is_valid_table_name(table) {
                anyhow::bail!("Invalid table name in config: '{}'", table);
            }
        }

        let mut columns: Vec<&str> = Vec::new();
        for target in self.targets.all() {
            columns.push(&target.id_column);
            columns.push(&target.geography_column);
        }
        columns.extend([
            self.link.id_column.as_str(),
            self.link.component_column.as_str(),
            self.link.feature_column.as_str(),
            self.components.id_column.as_str(),
            self.components.override_column.as_str(),
            self.feature_layers.id_column.as_str(),
            self.feature_layers.internal_table_column.as_str(),
        ]);
        for column in columns {
            if !is_valid_identifier(column) {
                anyhow::bail!("Invalid column name in config: '{}'", column);
            }
        }

        let targets = self.targets.all();
        if targets.iter().any(|t| t.table == self.link.table) {
            anyhow::bail!(
                "Link table '{}' cannot also be a target table",
                self.link.table
            );
        }

        Ok(())
    }

    /// Récupère la configuration d'une table cible par son nom
    pub fn target(&self, table: &str) -> Option<&TableConfig> {
        self.targets.all().into_iter().find(|t| t.table == table)
    }

    /// Tables désignées par les règles de classification
    pub fn table_catalog(&self) -> TableCatalog {
        TableCatalog {
            intersections: self.targets.intersections.table.clone(),
            signals: self.targets.signals.table.clone(),
        }
    }

    pub fn known_exceptions(&self) -> KnownExceptions {
        KnownExceptions::new(self.signal_exceptions.iter().copied())
    }

    /// Tables vidées en début d'exécution (cibles + liaison), sans doublon
    pub fn truncated_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for table in self
            .targets
            .all()
            .into_iter()
            .map(|t| t.table.as_str())
            .chain(std::iter::once(self.link.table.as_str()))
        {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }
}
