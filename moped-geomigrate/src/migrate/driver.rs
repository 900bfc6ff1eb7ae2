//! Pilotage de la migration
//!
//! Vide les tables cibles, lit les features source puis les traite une par
//! une : décodage, normalisation, classification, écriture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use deadpool_postgres::Object;
use tracing::{debug, error, info, warn};

use moped_features::geometry::to_wkt;
use moped_features::{decode_feature, normalize_properties, Classifier, ClassifyInput};

use super::source::{fetch_source_rows, SourceRow};
use super::sql::quote_ident;
use super::writer::{write_feature, FeaturePlan};
use crate::config::MigrationConfig;
use crate::report::{ErrorLevel, FailureKind, FeatureFailure, MigrationReport};

/// Fréquence des logs de progression (en features)
pub const PROGRESS_INTERVAL: usize = 500;

/// Longueur maximale du GeoJSON brut recopié dans le rapport
const EXCERPT_LEN: usize = 200;

/// Options d'exécution
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Classer sans rien écrire (ni vidage, ni insertion)
    pub dry_run: bool,
    /// Écarter les géométries malformées au lieu d'arrêter la migration
    pub skip_malformed: bool,
}

/// Vide les tables cibles et la table de liaison
///
/// Une seule requête `TRUNCATE` dans une seule transaction : soit toutes les
/// tables sont vidées, soit aucune.
pub async fn truncate_targets(client: &mut Object, config: &MigrationConfig) -> Result<()> {
    let tables = config.truncated_tables();
    let sql = truncate_statement(&tables);

    let tx = client
        .transaction()
        .await
        .context("Failed to begin truncate transaction")?;
    tx.batch_execute(&sql)
        .await
        .context(format!("Failed to truncate target tables: {}", sql))?;
    tx.commit()
        .await
        .context("Failed to commit truncate transaction")?;

    info!(tables = tables.len(), "Target tables truncated");
    Ok(())
}

fn truncate_statement(tables: &[&str]) -> String {
    let list: Vec<String> = tables.iter().map(|t| quote_ident(t)).collect();
    format!("TRUNCATE TABLE {} RESTART IDENTITY", list.join(", "))
}

/// Exécute la migration complète
///
/// Les erreurs de mise en place (vidage, requête source) interrompent
/// l'exécution. Les échecs par feature sont consignés dans le rapport ; seule
/// une géométrie malformée arrête la boucle, sauf avec `skip_malformed`.
pub async fn run_migration(
    client: &mut Object,
    config: &MigrationConfig,
    options: &RunOptions,
    cancel: &AtomicBool,
) -> Result<MigrationReport> {
    let start = Instant::now();
    let mut report = MigrationReport::new(options.dry_run);
    let classifier = Classifier::new(config.table_catalog(), config.known_exceptions());

    if options.dry_run {
        info!("Dry run: target tables are left untouched");
    } else {
        truncate_targets(client, config).await?;
    }

    let rows = fetch_source_rows(client, config).await?;
    info!(features = rows.len(), "Source features loaded");

    for (index, row) in rows.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!(
                processed = index,
                remaining = rows.len() - index,
                "Migration cancelled"
            );
            report.cancel();
            break;
        }

        report.record_read();
        migrate_row(client, config, &classifier, options, row, &mut report).await;

        if report.is_aborted() {
            break;
        }

        if (index + 1) % PROGRESS_INTERVAL == 0 {
            info!(
                processed = index + 1,
                total = rows.len(),
                migrated = report.features_migrated,
                skipped = report.features_skipped,
                "Migration progress"
            );
        }
    }

    report.set_duration(start.elapsed());
    report.finalize();

    info!(
        status = ?report.status,
        read = report.features_read,
        migrated = report.features_migrated,
        skipped = report.features_skipped,
        overrides = report.overrides(),
        duration_secs = report.duration_secs,
        "Migration finished"
    );

    Ok(report)
}

async fn migrate_row(
    client: &mut Object,
    config: &MigrationConfig,
    classifier: &Classifier,
    options: &RunOptions,
    row: &SourceRow,
    report: &mut MigrationReport,
) {
    let failure = |level, kind, target: Option<&str>, message: String, details| FeatureFailure {
        level,
        kind,
        feature_id: row.feature_id,
        project_component_id: row.project_component_id,
        component_name: row.component_name.clone(),
        target_table: target.map(str::to_string),
        message,
        details,
    };

    let feature = match decode_feature(row.feature_id, &row.feature) {
        Ok(f) => f,
        Err(e) => {
            let level = if options.skip_malformed {
                warn!(
                    feature_id = row.feature_id,
                    project_component_id = row.project_component_id,
                    error = %e,
                    "Feature skipped: malformed geometry"
                );
                ErrorLevel::Error
            } else {
                error!(
                    feature_id = row.feature_id,
                    project_component_id = row.project_component_id,
                    error = %e,
                    "Malformed geometry, stopping migration (use --skip-malformed to continue)"
                );
                ErrorLevel::Fatal
            };
            report.record_failure(failure(
                level,
                FailureKind::MalformedGeometry,
                None,
                e.to_string(),
                Some(excerpt(&row.feature, EXCERPT_LEN)),
            ));
            return;
        }
    };

    let properties = normalize_properties(feature.properties);

    let input = ClassifyInput {
        feature_id: row.feature_id,
        component_name: &row.component_name,
        component_subtype: row.component_subtype.as_deref(),
        kind: feature.kind,
        nominal_table: row.internal_table.as_deref(),
    };
    let classification = match classifier.classify(&input) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                feature_id = row.feature_id,
                project_component_id = row.project_component_id,
                component = %row.component_name,
                error = %e,
                "Feature skipped: no target table"
            );
            report.record_failure(failure(
                ErrorLevel::Error,
                FailureKind::ClassificationGap,
                None,
                e.to_string(),
                None,
            ));
            return;
        }
    };

    debug!(
        feature_id = row.feature_id,
        project_id = row.project_id,
        component_id = row.component_id,
        feature_layer_id = ?row.feature_layer_id,
        kind = %feature.kind,
        table = %classification.target,
        rule = classification.rule.unwrap_or("default"),
        "Feature classified"
    );

    if options.dry_run {
        report.record_planned(
            &classification.target,
            classification.layer_override.is_some(),
        );
        return;
    }

    let plan = FeaturePlan {
        feature_id: row.feature_id,
        project_component_id: row.project_component_id,
        target: &classification.target,
        properties: &properties,
        geometry: &feature.geometry,
        layer_override: classification.layer_override.as_deref(),
    };

    match write_feature(client, config, &plan).await {
        Ok(written) => report.record_migrated(&classification.target, written.override_applied),
        Err(e) => {
            let wkt = to_wkt(&feature.geometry).unwrap_or_else(|err| format!("<{}>", err));
            let statement = e.failed_statement().unwrap_or_default();
            let message = match e.server_message() {
                Some(server) => format!("{}: {}", e, server),
                None => e.to_string(),
            };
            warn!(
                feature_id = row.feature_id,
                project_component_id = row.project_component_id,
                table = %classification.target,
                statement = %statement,
                geometry = %wkt,
                error = %message,
                "Feature skipped: persistence failed"
            );
            report.record_failure(failure(
                ErrorLevel::Error,
                FailureKind::PersistenceFailure,
                Some(&classification.target),
                message,
                Some(format!("statement: {}\ngeometry: {}", statement, wkt)),
            ));
        }
    }
}

/// Début d'un texte, coupé sur une frontière de caractère
fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
