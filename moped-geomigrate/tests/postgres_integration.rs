//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostgreSQL avec PostGIS.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Chaque test travaille dans son propre schéma (`search_path`).
//!
//! Exécution:
//! ```bash
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGUSER=postgres PGDATABASE=postgres PGPASSWORD=test cargo test --test postgres_integration -- --ignored
//! ```

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use deadpool_postgres::Object;

use moped_geomigrate::migrate::pool::test_connection;
use moped_geomigrate::report::{ErrorLevel, FailureKind};
use moped_geomigrate::{
    create_pool, run_migration, DatabaseConfig, MigrationConfig, MigrationReport, RunOptions,
    RunStatus,
};

const TARGET_COLUMNS: &str = "id SERIAL PRIMARY KEY, \
     knack_id INTEGER, \
     render_type TEXT, \
     source_layer TEXT, \
     intersection_id INTEGER, \
     geography geography";

/// Connexion dédiée, positionnée sur un schéma neuf
async fn setup(schema: &str) -> Result<Object> {
    let mut db_config = DatabaseConfig::from_env();
    db_config.pool_size = 1;
    let pool = create_pool(&db_config).await?;
    let client = pool.get().await?;

    if let Err(e) = client
        .batch_execute("CREATE EXTENSION IF NOT EXISTS postgis")
        .await
    {
        // Création concurrente par un autre test
        eprintln!("CREATE EXTENSION postgis failed: {e}");
    }

    client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE;
             CREATE SCHEMA {schema};
             SET search_path TO {schema}, public;

             CREATE TABLE feature_layers (id SERIAL PRIMARY KEY, internal_table TEXT);
             CREATE TABLE moped_components (
                 component_id SERIAL PRIMARY KEY,
                 component_name TEXT NOT NULL,
                 component_subtype TEXT,
                 feature_layer_id INTEGER REFERENCES feature_layers(id)
             );
             CREATE TABLE moped_proj_components (
                 project_component_id SERIAL PRIMARY KEY,
                 project_id INTEGER NOT NULL,
                 component_id INTEGER NOT NULL REFERENCES moped_components(component_id),
                 feature_layer_id_override INTEGER REFERENCES feature_layers(id)
             );
             CREATE TABLE moped_proj_features (feature_id SERIAL PRIMARY KEY, feature JSONB);
             CREATE TABLE moped_proj_features_components (
                 id SERIAL PRIMARY KEY,
                 moped_proj_features_id INTEGER NOT NULL,
                 moped_proj_component_id INTEGER NOT NULL
             );

             CREATE TABLE feature_intersections ({cols});
             CREATE TABLE feature_signals ({cols});
             CREATE TABLE feature_street_segments ({cols});
             CREATE TABLE feature_drawn_points ({cols});
             CREATE TABLE feature_drawn_lines ({cols});
             CREATE TABLE moped_proj_component_features (
                 id SERIAL PRIMARY KEY,
                 project_component_id INTEGER NOT NULL,
                 feature_id INTEGER NOT NULL
             );

             INSERT INTO feature_layers (internal_table) VALUES
                 ('feature_intersections'),
                 ('feature_signals'),
                 ('feature_street_segments'),
                 ('feature_drawn_points'),
                 ('feature_drawn_lines');",
            schema = schema,
            cols = TARGET_COLUMNS
        ))
        .await?;

    Ok(client)
}

/// Crée un composant de projet, rattaché à la couche `table` si fournie
async fn add_component(
    client: &Object,
    name: &str,
    subtype: Option<&str>,
    table: Option<&str>,
) -> Result<i64> {
    let row = client
        .query_one(
            "INSERT INTO moped_components (component_name, component_subtype, feature_layer_id)
             VALUES ($1, $2, (SELECT id FROM feature_layers WHERE internal_table = $3))
             RETURNING component_id",
            &[&name, &subtype, &table],
        )
        .await?;
    let component_id: i32 = row.get(0);

    let row = client
        .query_one(
            "INSERT INTO moped_proj_components (project_id, component_id) VALUES (1, $1)
             RETURNING project_component_id::bigint",
            &[&component_id],
        )
        .await?;
    Ok(row.get(0))
}

/// Ajoute une feature GeoJSON au composant
async fn add_feature(client: &Object, project_component_id: i64, geojson: &str) -> Result<i64> {
    let row = client
        .query_one(
            "INSERT INTO moped_proj_features (feature) VALUES ($1::text::jsonb)
             RETURNING feature_id::bigint",
            &[&geojson],
        )
        .await?;
    let feature_id: i64 = row.get(0);

    client
        .execute(
            "INSERT INTO moped_proj_features_components (moped_proj_features_id, moped_proj_component_id)
             VALUES ($1::bigint, $2::bigint)",
            &[&feature_id, &project_component_id],
        )
        .await?;
    Ok(feature_id)
}

fn point(x: f64, y: f64, properties: &str) -> String {
    format!(
        r#"{{"type":"Feature","geometry":{{"type":"Point","coordinates":[{x},{y}]}},"properties":{properties}}}"#
    )
}

fn line(properties: &str) -> String {
    format!(
        r#"{{"type":"Feature","geometry":{{"type":"LineString","coordinates":[[-97.74,30.27],[-97.73,30.28]]}},"properties":{properties}}}"#
    )
}

async fn count(client: &Object, table: &str) -> i64 {
    client
        .query_one(&format!("SELECT count(*) FROM {}", table), &[])
        .await
        .expect("count query")
        .get(0)
}

async fn layer_id(client: &Object, table: &str) -> i32 {
    client
        .query_one(
            "SELECT id FROM feature_layers WHERE internal_table = $1",
            &[&table],
        )
        .await
        .expect("layer lookup")
        .get(0)
}

async fn override_of(client: &Object, project_component_id: i64) -> Option<i32> {
    client
        .query_one(
            "SELECT feature_layer_id_override FROM moped_proj_components
             WHERE project_component_id = $1::bigint",
            &[&project_component_id],
        )
        .await
        .expect("override lookup")
        .get(0)
}

async fn migrate(client: &mut Object, options: RunOptions) -> MigrationReport {
    let config = MigrationConfig::from_preset("moped").expect("preset");
    run_migration(client, &config, &options, &AtomicBool::new(false))
        .await
        .expect("migration run")
}

/// Test de connexion basique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_database_connection() {
    let pool = create_pool(&DatabaseConfig::from_env())
        .await
        .expect("Failed to create pool");
    let version = test_connection(&pool).await.expect("PostGIS available");
    assert!(!version.is_empty());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_project_extent_point_goes_to_intersections() {
    let mut client = setup("it_project_extent").await.unwrap();
    let pc = add_component(&client, "Project Extent - Generic", None, Some("feature_drawn_lines"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, r#"{"_ID": 7, "RenderType": "drawn"}"#))
        .await
        .unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.features_migrated, 1);

    let row = client
        .query_one(
            "SELECT knack_id, render_type FROM feature_intersections",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, Option<i32>>(0), Some(7));
    assert_eq!(row.get::<_, Option<String>>(1).as_deref(), Some("drawn"));

    assert_eq!(count(&client, "feature_drawn_lines").await, 0);
    assert_eq!(
        override_of(&client, pc).await,
        Some(layer_id(&client, "feature_intersections").await)
    );

    let link = client
        .query_one(
            "SELECT project_component_id::bigint, feature_id::bigint FROM moped_proj_component_features",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(link.get::<_, i64>(0), pc);
    assert_eq!(link.get::<_, i64>(1), 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_sidewalk_point_and_line() {
    let mut client = setup("it_sidewalk").await.unwrap();
    let with_point = add_component(
        &client,
        "Sidewalk",
        Some("With Curb and Gutter"),
        Some("feature_drawn_lines"),
    )
    .await
    .unwrap();
    let line_only = add_component(
        &client,
        "Sidewalk",
        Some("With Curb and Gutter"),
        Some("feature_drawn_lines"),
    )
    .await
    .unwrap();

    add_feature(&client, with_point, &point(-97.7, 30.3, "{}")).await.unwrap();
    add_feature(&client, with_point, &line(r#"{"sourceLayer": "drawnByUser"}"#))
        .await
        .unwrap();
    add_feature(&client, line_only, &line("{}")).await.unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.by_table["feature_signals"].migrated, 1);
    assert_eq!(report.by_table["feature_signals"].overrides, 1);
    assert_eq!(report.by_table["feature_drawn_lines"].migrated, 2);
    assert_eq!(report.by_table["feature_drawn_lines"].overrides, 0);

    assert_eq!(count(&client, "feature_signals").await, 1);
    assert_eq!(count(&client, "feature_drawn_lines").await, 2);
    assert_eq!(count(&client, "moped_proj_component_features").await, 3);

    assert_eq!(
        override_of(&client, with_point).await,
        Some(layer_id(&client, "feature_signals").await)
    );
    assert_eq!(override_of(&client, line_only).await, None);

    let source_layer: Option<String> = client
        .query_one(
            "SELECT source_layer FROM feature_drawn_lines WHERE source_layer IS NOT NULL",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(source_layer.as_deref(), Some("drawnByUser"));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_persistence_failure_is_isolated() {
    let mut client = setup("it_isolation").await.unwrap();
    let pc = add_component(&client, "Signal", None, Some("feature_signals"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, r#"{"ID": 1}"#)).await.unwrap();
    let bad = add_feature(&client, pc, &point(-97.7, 30.3, r#"{"unknown_column": 1}"#))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, r#"{"ID": 3}"#)).await.unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert_eq!(report.features_read, 3);
    assert_eq!(report.features_migrated, 2);
    assert_eq!(report.features_skipped, 1);

    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::PersistenceFailure);
    assert_eq!(failure.level, ErrorLevel::Error);
    assert_eq!(failure.feature_id, bad);
    assert_eq!(failure.target_table.as_deref(), Some("feature_signals"));
    let details = failure.details.as_deref().unwrap();
    assert!(details.contains("INSERT INTO \"feature_signals\""));
    assert!(details.contains("POINT"));

    assert_eq!(count(&client, "feature_signals").await, 2);
    assert_eq!(count(&client, "moped_proj_component_features").await, 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_geography_round_trip() {
    let mut client = setup("it_geography").await.unwrap();
    let points = add_component(&client, "Signal", None, Some("feature_drawn_points"))
        .await
        .unwrap();
    let lines = add_component(&client, "Bike Lane", None, Some("feature_street_segments"))
        .await
        .unwrap();
    add_feature(&client, points, &point(-97.75, 30.25, r#"{"IntersectionID": 12}"#))
        .await
        .unwrap();
    add_feature(&client, lines, &line("{}")).await.unwrap();

    migrate(&mut client, RunOptions::default()).await;

    let row = client
        .query_one(
            "SELECT ST_GeometryType(geography::geometry), ST_SRID(geography::geometry),
                    ST_X(ST_GeometryN(geography::geometry, 1)), intersection_id
             FROM feature_drawn_points",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>(0), "ST_MultiPoint");
    assert_eq!(row.get::<_, i32>(1), 4326);
    assert!((row.get::<_, f64>(2) - (-97.75)).abs() < 1e-9);
    assert_eq!(row.get::<_, Option<i32>>(3), Some(12));

    let kind: String = client
        .query_one(
            "SELECT ST_GeometryType(geography::geometry) FROM feature_street_segments",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(kind, "ST_MultiLineString");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_override_is_idempotent() {
    let mut client = setup("it_override").await.unwrap();
    let pc = add_component(&client, "Project Extent - Generic", None, Some("feature_drawn_lines"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();
    add_feature(&client, pc, &point(-97.8, 30.4, "{}")).await.unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.overrides(), 2);

    let expected = Some(layer_id(&client, "feature_intersections").await);
    assert_eq!(override_of(&client, pc).await, expected);

    migrate(&mut client, RunOptions::default()).await;
    assert_eq!(override_of(&client, pc).await, expected);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_duplicate_layers_use_lowest_id() {
    let mut client = setup("it_duplicate_layers").await.unwrap();
    let pc = add_component(&client, "Project Extent - Generic", None, Some("feature_drawn_lines"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();

    // Doublon inséré après la ligne d'origine, avec un id plus petit
    client
        .execute(
            "INSERT INTO feature_layers (id, internal_table) VALUES (0, 'feature_intersections')",
            &[],
        )
        .await
        .unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.overrides(), 1);
    assert_eq!(override_of(&client, pc).await, Some(0));

    migrate(&mut client, RunOptions::default()).await;
    assert_eq!(override_of(&client, pc).await, Some(0));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_malformed_geometry_stops_unless_skipped() {
    let mut client = setup("it_malformed").await.unwrap();
    let pc = add_component(&client, "Signal", None, Some("feature_signals"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();
    let malformed = add_feature(
        &client,
        pc,
        r#"{"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0]]},"properties":{}}"#,
    )
    .await
    .unwrap();
    add_feature(&client, pc, &point(-97.8, 30.4, "{}")).await.unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert!(report.is_aborted());
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.features_migrated, 1);
    assert_eq!(report.failures[0].feature_id, malformed);
    assert_eq!(report.failures[0].kind, FailureKind::MalformedGeometry);

    let report = migrate(
        &mut client,
        RunOptions {
            skip_malformed: true,
            ..Default::default()
        },
    )
    .await;
    assert!(!report.is_aborted());
    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert_eq!(report.features_migrated, 2);
    assert_eq!(count(&client, "feature_signals").await, 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_classification_gap_is_skipped() {
    let mut client = setup("it_gap").await.unwrap();
    let orphan = add_component(&client, "Unknown archetype", None, None)
        .await
        .unwrap();
    let pc = add_component(&client, "Signal", None, Some("feature_signals"))
        .await
        .unwrap();
    add_feature(&client, orphan, &line("{}")).await.unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();

    let report = migrate(&mut client, RunOptions::default()).await;
    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert_eq!(report.failures[0].kind, FailureKind::ClassificationGap);
    assert_eq!(report.failures[0].project_component_id, orphan);
    assert_eq!(count(&client, "moped_proj_component_features").await, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rerun_starts_from_empty_tables() {
    let mut client = setup("it_rerun").await.unwrap();
    let pc = add_component(&client, "Signal", None, Some("feature_signals"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();
    add_feature(&client, pc, &point(-97.8, 30.4, "{}")).await.unwrap();

    migrate(&mut client, RunOptions::default()).await;
    let report = migrate(&mut client, RunOptions::default()).await;

    assert_eq!(report.features_migrated, 2);
    assert_eq!(count(&client, "feature_signals").await, 2);
    assert_eq!(count(&client, "moped_proj_component_features").await, 2);

    let max_id: i32 = client
        .query_one("SELECT max(id) FROM feature_signals", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(max_id, 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_dry_run_writes_nothing() {
    let mut client = setup("it_dry_run").await.unwrap();
    let pc = add_component(&client, "Project Extent - Generic", None, Some("feature_drawn_lines"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();

    let report = migrate(
        &mut client,
        RunOptions {
            dry_run: true,
            ..Default::default()
        },
    )
    .await;
    assert!(report.dry_run);
    assert_eq!(report.by_table["feature_intersections"].planned, 1);
    assert_eq!(report.overrides(), 1);

    assert_eq!(count(&client, "feature_intersections").await, 0);
    assert_eq!(count(&client, "moped_proj_component_features").await, 0);
    assert_eq!(override_of(&client, pc).await, None);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_cancelled_before_first_feature() {
    let mut client = setup("it_cancel").await.unwrap();
    let pc = add_component(&client, "Signal", None, Some("feature_signals"))
        .await
        .unwrap();
    add_feature(&client, pc, &point(-97.7, 30.3, "{}")).await.unwrap();

    let config = MigrationConfig::from_preset("moped").unwrap();
    let report = run_migration(
        &mut client,
        &config,
        &RunOptions::default(),
        &AtomicBool::new(true),
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.features_read, 0);
    assert_eq!(count(&client, "feature_signals").await, 0);
}
