//! Lecture des features source
//!
//! Une ligne par couple (composant de projet, feature) : la feature GeoJSON
//! stockée en texte et les métadonnées du composant qui la possède.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};
use tracing::debug;

use super::sql::quote_ident;
use crate::config::MigrationConfig;

/// Requête source, triée par identifiant de feature
///
/// Les tables des composants de projet et des couches sont celles de la
/// configuration : la couche nominale lue ici est celle que la correction
/// de couche réécrit.
pub fn source_query(config: &MigrationConfig) -> String {
    let components = &config.components;
    let layers = &config.feature_layers;
    let comp_id = quote_ident(&components.id_column);
    let layer_id = quote_ident(&layers.id_column);

    format!(
        "SELECT mpc.project_id::bigint AS project_id, \
                mc.component_id::bigint AS component_id, \
                mpc.{comp_id}::bigint AS project_component_id, \
                mc.component_name::text AS component_name, \
                mc.component_subtype::text AS component_subtype, \
                fl.{internal}::text AS internal_table, \
                fl.{layer_id}::bigint AS feature_layer_id, \
                mpf.feature_id::bigint AS feature_id, \
                mpf.feature::text AS feature \
         FROM moped_proj_features mpf \
         JOIN moped_proj_features_components mpfc ON mpfc.moped_proj_features_id = mpf.feature_id \
         JOIN {comp_table} mpc ON mpc.{comp_id} = mpfc.moped_proj_component_id \
         JOIN moped_components mc ON mc.component_id = mpc.component_id \
         LEFT JOIN {layer_table} fl ON fl.{layer_id} = mc.feature_layer_id \
         ORDER BY mpf.feature_id, mpc.{comp_id}",
        comp_id = comp_id,
        comp_table = quote_ident(&components.table),
        internal = quote_ident(&layers.internal_table_column),
        layer_id = layer_id,
        layer_table = quote_ident(&layers.table),
    )
}

/// Ligne source
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub project_id: i64,
    pub component_id: i64,
    pub project_component_id: i64,
    pub component_name: String,
    pub component_subtype: Option<String>,
    /// Table par défaut du composant (`feature_layers.internal_table`)
    pub internal_table: Option<String>,
    pub feature_layer_id: Option<i64>,
    pub feature_id: i64,
    /// Feature GeoJSON brute
    pub feature: String,
}

impl TryFrom<&Row> for SourceRow {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: row.try_get("project_id")?,
            component_id: row.try_get("component_id")?,
            project_component_id: row.try_get("project_component_id")?,
            component_name: row
                .try_get::<_, Option<String>>("component_name")?
                .unwrap_or_default(),
            component_subtype: row.try_get("component_subtype")?,
            internal_table: row.try_get("internal_table")?,
            feature_layer_id: row.try_get("feature_layer_id")?,
            feature_id: row.try_get("feature_id")?,
            feature: row
                .try_get::<_, Option<String>>("feature")?
                .unwrap_or_default(),
        })
    }
}

/// Charge toutes les lignes source
pub async fn fetch_source_rows(client: &Client, config: &MigrationConfig) -> Result<Vec<SourceRow>> {
    let sql = source_query(config);
    let stream = client
        .query_raw(sql.as_str(), std::iter::empty::<&(dyn ToSql + Sync)>())
        .await
        .context(format!("Failed to run source query: {}", sql))?;
    let mut stream = std::pin::pin!(stream);

    let mut rows = Vec::new();
    while let Some(row) = stream
        .try_next()
        .await
        .context("Failed to read source row")?
    {
        rows.push(SourceRow::try_from(&row).context("Failed to decode source row")?);
    }

    debug!(rows = rows.len(), "Source rows fetched");
    Ok(rows)
}
