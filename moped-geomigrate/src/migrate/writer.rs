//! Écriture transactionnelle d'une feature
//!
//! Chaque feature est écrite dans sa propre transaction : ligne dans la table
//! cible, géographie, correction de couche du composant puis liaison. Un
//! échec annule uniquement la feature en cours.

use std::fmt;

use deadpool_postgres::{Object, Transaction};
use geo::Geometry;
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tracing::{debug, error};

use moped_features::geometry::{to_ewkb, to_multi, SRID_WGS84};
use moped_features::{FeatureError, Properties};

use super::sql::{is_valid_identifier, quote_ident};
use super::values::JsonParam;
use crate::config::MigrationConfig;

/// Étape de l'écriture d'une feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Begin,
    InsertRow,
    AttachGeography,
    ApplyOverride,
    InsertLink,
    Commit,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteStep::Begin => "begin",
            WriteStep::InsertRow => "insert row",
            WriteStep::AttachGeography => "attach geography",
            WriteStep::ApplyOverride => "apply layer override",
            WriteStep::InsertLink => "insert link",
            WriteStep::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Erreur d'écriture d'une feature
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{step} failed: {source}")]
    Statement {
        step: WriteStep,
        statement: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Invalid column name '{column}' for table {table}")]
    InvalidColumn { table: String, column: String },

    #[error("Table {0} is not a configured target table")]
    UnknownTable(String),

    #[error("No feature layer for table {table} (project component {component})")]
    UnknownLayer { table: String, component: i64 },

    #[error(transparent)]
    Geometry(#[from] FeatureError),
}

impl WriteError {
    fn statement(step: WriteStep, statement: &str, source: tokio_postgres::Error) -> Self {
        WriteError::Statement {
            step,
            statement: statement.to_string(),
            source,
        }
    }

    /// Requête SQL en échec, le cas échéant
    pub fn failed_statement(&self) -> Option<&str> {
        match self {
            WriteError::Statement { statement, .. } => Some(statement),
            _ => None,
        }
    }

    /// Message du serveur, plus précis que l'affichage de l'erreur client
    pub fn server_message(&self) -> Option<&str> {
        match self {
            WriteError::Statement { source, .. } => source.as_db_error().map(|db| db.message()),
            _ => None,
        }
    }
}

/// Feature prête à être écrite
#[derive(Debug, Clone, Copy)]
pub struct FeaturePlan<'a> {
    pub feature_id: i64,
    pub project_component_id: i64,
    /// Table cible retenue par la classification
    pub target: &'a str,
    pub properties: &'a Properties,
    pub geometry: &'a Geometry,
    /// Table à inscrire comme couche corrigée du composant
    pub layer_override: Option<&'a str>,
}

/// Résultat d'une écriture réussie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenFeature {
    /// Identité de la ligne dans la table cible
    pub row_id: i64,
    /// Identité de la ligne de liaison
    pub link_id: i64,
    pub override_applied: bool,
}

/// Requêtes d'une feature, construites avant d'ouvrir la transaction
#[derive(Debug, Clone)]
pub struct FeatureStatements {
    pub insert_row: String,
    pub attach_geography: String,
    pub apply_override: Option<String>,
    pub insert_link: String,
    /// Multi-géométrie EWKB (SRID 4326)
    pub ewkb: Vec<u8>,
}

impl FeatureStatements {
    pub fn build(config: &MigrationConfig, plan: &FeaturePlan<'_>) -> Result<Self, WriteError> {
        let target = config
            .target(plan.target)
            .ok_or_else(|| WriteError::UnknownTable(plan.target.to_string()))?;

        for column in plan.properties.keys() {
            if !is_valid_identifier(column) {
                return Err(WriteError::InvalidColumn {
                    table: plan.target.to_string(),
                    column: column.to_string(),
                });
            }
        }

        let table = quote_ident(&target.table);
        let id_column = quote_ident(&target.id_column);

        let insert_row = if plan.properties.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}::bigint",
                table, id_column
            )
        } else {
            let columns: Vec<String> = plan.properties.keys().map(|k| quote_ident(k)).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("${}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::bigint",
                table,
                columns.join(", "),
                placeholders.join(", "),
                id_column
            )
        };

        let attach_geography = format!(
            "UPDATE {} SET {} = ST_GeomFromEWKB($1)::geography WHERE {} = $2::bigint",
            table,
            quote_ident(&target.geography_column),
            id_column
        );

        // Plusieurs couches pour une même table : la plus ancienne (id min)
        let apply_override = plan.layer_override.map(|_| {
            let components = &config.components;
            let layers = &config.feature_layers;
            format!(
                "UPDATE {comp} SET {over} = fl.layer_id \
                 FROM (SELECT min({id}) AS layer_id FROM {layers} WHERE {internal} = $1 HAVING count(*) > 0) AS fl \
                 WHERE {comp}.{comp_id} = $2::bigint",
                comp = quote_ident(&components.table),
                over = quote_ident(&components.override_column),
                id = quote_ident(&layers.id_column),
                layers = quote_ident(&layers.table),
                internal = quote_ident(&layers.internal_table_column),
                comp_id = quote_ident(&components.id_column)
            )
        });

        let link = &config.link;
        let insert_link = format!(
            "INSERT INTO {} ({}, {}) VALUES ($1::bigint, $2::bigint) RETURNING {}::bigint",
            quote_ident(&link.table),
            quote_ident(&link.component_column),
            quote_ident(&link.feature_column),
            quote_ident(&link.id_column)
        );

        let ewkb = to_ewkb(&to_multi(plan.geometry.clone()), SRID_WGS84)?;

        Ok(Self {
            insert_row,
            attach_geography,
            apply_override,
            insert_link,
            ewkb,
        })
    }
}

/// Écrit une feature dans sa propre transaction
///
/// La transaction est validée si les quatre étapes réussissent, annulée
/// sinon. Une transaction abandonnée est aussi annulée au drop.
pub async fn write_feature(
    client: &mut Object,
    config: &MigrationConfig,
    plan: &FeaturePlan<'_>,
) -> Result<WrittenFeature, WriteError> {
    let statements = FeatureStatements::build(config, plan)?;

    let tx = client
        .transaction()
        .await
        .map_err(|e| WriteError::statement(WriteStep::Begin, "BEGIN", e))?;

    match write_statements(&tx, &statements, plan).await {
        Ok(written) => {
            tx.commit()
                .await
                .map_err(|e| WriteError::statement(WriteStep::Commit, "COMMIT", e))?;
            debug!(
                feature_id = plan.feature_id,
                table = %plan.target,
                row_id = written.row_id,
                link_id = written.link_id,
                "Feature written"
            );
            Ok(written)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Explicit rollback failed (will rollback on drop anyway)");
            }
            Err(e)
        }
    }
}

async fn write_statements(
    tx: &Transaction<'_>,
    statements: &FeatureStatements,
    plan: &FeaturePlan<'_>,
) -> Result<WrittenFeature, WriteError> {
    let params: Vec<JsonParam<'_>> = plan.properties.values().map(JsonParam).collect();
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    let row = tx
        .query_one(statements.insert_row.as_str(), &refs)
        .await
        .map_err(|e| WriteError::statement(WriteStep::InsertRow, &statements.insert_row, e))?;
    let row_id: i64 = row
        .try_get(0)
        .map_err(|e| WriteError::statement(WriteStep::InsertRow, &statements.insert_row, e))?;

    tx.execute(statements.attach_geography.as_str(), &[&statements.ewkb, &row_id])
        .await
        .map_err(|e| {
            WriteError::statement(WriteStep::AttachGeography, &statements.attach_geography, e)
        })?;

    let override_applied = match (&statements.apply_override, plan.layer_override) {
        (Some(sql), Some(layer)) => {
            let updated = tx
                .execute(sql.as_str(), &[&layer, &plan.project_component_id])
                .await
                .map_err(|e| WriteError::statement(WriteStep::ApplyOverride, sql, e))?;
            if updated == 0 {
                return Err(WriteError::UnknownLayer {
                    table: layer.to_string(),
                    component: plan.project_component_id,
                });
            }
            true
        }
        _ => false,
    };

    let link = tx
        .query_one(
            statements.insert_link.as_str(),
            &[&plan.project_component_id, &row_id],
        )
        .await
        .map_err(|e| WriteError::statement(WriteStep::InsertLink, &statements.insert_link, e))?;
    let link_id: i64 = link
        .try_get(0)
        .map_err(|e| WriteError::statement(WriteStep::InsertLink, &statements.insert_link, e))?;

    Ok(WrittenFeature {
        row_id,
        link_id,
        override_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;
    use serde_json::json;

    fn properties() -> Properties {
        [
            ("knack_id".to_string(), json!(7)),
            ("render_type".to_string(), json!("drawn")),
        ]
        .into_iter()
        .collect()
    }

    fn plan<'a>(
        target: &'a str,
        properties: &'a Properties,
        geometry: &'a Geometry,
        layer_override: Option<&'a str>,
    ) -> FeaturePlan<'a> {
        FeaturePlan {
            feature_id: 1,
            project_component_id: 10,
            target,
            properties,
            geometry,
            layer_override,
        }
    }

    #[test]
    fn test_statements_with_override() {
        let config = MigrationConfig::from_preset("moped").unwrap();
        let props = properties();
        let geometry = Geometry::Point(point!(x: -97.7, y: 30.3));
        let statements = FeatureStatements::build(
            &config,
            &plan("feature_intersections", &props, &geometry, Some("feature_intersections")),
        )
        .unwrap();

        assert_eq!(
            statements.insert_row,
            "INSERT INTO \"feature_intersections\" (\"knack_id\", \"render_type\") VALUES ($1, $2) RETURNING \"id\"::bigint"
        );
        assert_eq!(
            statements.attach_geography,
            "UPDATE \"feature_intersections\" SET \"geography\" = ST_GeomFromEWKB($1)::geography WHERE \"id\" = $2::bigint"
        );
        assert_eq!(
            statements.apply_override.as_deref(),
            Some("UPDATE \"moped_proj_components\" SET \"feature_layer_id_override\" = fl.layer_id \
                  FROM (SELECT min(\"id\") AS layer_id FROM \"feature_layers\" WHERE \"internal_table\" = $1 HAVING count(*) > 0) AS fl \
                  WHERE \"moped_proj_components\".\"project_component_id\" = $2::bigint")
        );
        assert_eq!(
            statements.insert_link,
            "INSERT INTO \"moped_proj_component_features\" (\"project_component_id\", \"feature_id\") VALUES ($1::bigint, $2::bigint) RETURNING \"id\"::bigint"
        );
        // MultiPoint (type 4) avec drapeau SRID
        assert_eq!(&statements.ewkb[1..5], &0x2000_0004u32.to_le_bytes());
    }

    #[test]
    fn test_statements_without_properties() {
        let config = MigrationConfig::from_preset("moped").unwrap();
        let props = Properties::new();
        let geometry = Geometry::Point(point!(x: 0.0, y: 0.0));
        let statements =
            FeatureStatements::build(&config, &plan("feature_drawn_points", &props, &geometry, None))
                .unwrap();

        assert_eq!(
            statements.insert_row,
            "INSERT INTO \"feature_drawn_points\" DEFAULT VALUES RETURNING \"id\"::bigint"
        );
        assert!(statements.apply_override.is_none());
    }

    #[test]
    fn test_unknown_target_table() {
        let config = MigrationConfig::from_preset("moped").unwrap();
        let props = properties();
        let geometry = Geometry::Point(point!(x: 0.0, y: 0.0));
        let err = FeatureStatements::build(&config, &plan("feature_unknown", &props, &geometry, None))
            .unwrap_err();
        assert!(matches!(err, WriteError::UnknownTable(ref t) if t == "feature_unknown"));
        assert!(err.failed_statement().is_none());
    }

    #[test]
    fn test_invalid_column_rejected() {
        let config = MigrationConfig::from_preset("moped").unwrap();
        let props: Properties = [("render type".to_string(), json!("x"))].into_iter().collect();
        let geometry = Geometry::Point(point!(x: 0.0, y: 0.0));
        let err = FeatureStatements::build(&config, &plan("feature_signals", &props, &geometry, None))
            .unwrap_err();
        assert!(matches!(err, WriteError::InvalidColumn { ref column, .. } if column == "render type"));
    }

    #[test]
    fn test_write_step_display() {
        assert_eq!(WriteStep::ApplyOverride.to_string(), "apply layer override");
        let err = WriteError::UnknownLayer {
            table: "feature_signals".into(),
            component: 3,
        };
        assert_eq!(
            err.to_string(),
            "No feature layer for table feature_signals (project component 3)"
        );
    }
}
