//! Définition et implémentation des commandes CLI
//!
//! - commande par défaut : migration vers PostGIS
//! - `inspect` : routage d'une feature GeoJSON isolée (sans DB)

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use moped_features::geometry::{to_multi, to_wkt};
use moped_features::{decode_feature, normalize_properties, Classifier, ClassifyInput};
use moped_geomigrate::migrate::pool::{create_pool, test_connection, DatabaseConfig};
use moped_geomigrate::{run_migration, MigrationConfig, RunOptions};

#[derive(Subcommand)]
pub enum Commands {
    /// Decode, normalize and classify a single GeoJSON feature (no database required)
    Inspect {
        /// Path to a file holding one GeoJSON Feature
        #[arg(short, long)]
        path: PathBuf,

        /// Component name (e.g. "Project Extent - Generic")
        #[arg(short, long)]
        component: String,

        /// Component subtype (e.g. "With Curb and Gutter")
        #[arg(short, long)]
        subtype: Option<String>,

        /// Default target table of the component (feature_layers.internal_table)
        #[arg(short, long)]
        table: Option<String>,

        /// Feature id used for the known-exception lookup
        #[arg(long, default_value_t = 0)]
        feature_id: i64,

        /// Config preset name (moped) or path to a JSON config
        #[arg(long, default_value = "moped")]
        config: String,

        /// Additional feature id routed to the signals table (repeatable)
        #[arg(long = "signal-exception")]
        signal_exceptions: Vec<i64>,
    },
}

/// Arguments de la migration (commande par défaut)
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config preset name (moped) or path to a JSON config
    #[arg(long, default_value = "moped")]
    pub config: String,

    /// Classify every feature without truncating or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip features with malformed geometry instead of stopping the run
    #[arg(long)]
    pub skip_malformed: bool,

    /// Additional feature id routed to the signals table (repeatable)
    #[arg(long = "signal-exception")]
    pub signal_exceptions: Vec<i64>,

    /// Save the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// PostgreSQL host (défaut : env PGHOST / DB_HOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / DB_NAME / moped)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / DB_USER / moped)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD / DB_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / DB_PORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,
}

/// Charge la configuration et y ajoute les exceptions passées en ligne de commande
fn load_config(spec: &str, extra_exceptions: &[i64]) -> Result<MigrationConfig> {
    let mut config = MigrationConfig::resolve(spec)?;
    for id in extra_exceptions {
        if !config.signal_exceptions.contains(id) {
            config.signal_exceptions.push(*id);
        }
    }
    Ok(config)
}

/// Exécute la migration
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config, &args.signal_exceptions)?;
    let options = RunOptions {
        dry_run: args.dry_run,
        skip_malformed: args.skip_malformed,
    };

    info!(
        config = %args.config,
        dry_run = options.dry_run,
        skip_malformed = options.skip_malformed,
        signal_exceptions = config.signal_exceptions.len(),
        "Starting migration"
    );

    println!("=== Feature migration ===");
    println!("Config: {}", args.config);
    println!("Dry run: {}", options.dry_run);
    println!("Skip malformed: {}", options.skip_malformed);
    println!("Signal exceptions: {:?}", config.signal_exceptions);

    let mut db_config = DatabaseConfig::from_env();
    apply_database_overrides(
        &mut db_config,
        args.host,
        args.database,
        args.user,
        args.password,
        args.port,
        args.ssl,
    );
    println!("Database: {} (SSL: {:?})", db_config.label(), db_config.ssl_mode);

    let pool = create_pool(&db_config).await?;
    let postgis = test_connection(&pool).await?;
    println!("Connected to PostgreSQL (PostGIS {})", postgis);

    let mut client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current feature");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let report = run_migration(&mut client, &config, &options, &cancel).await?;
    report.display();

    if let Some(path) = args.report.as_deref() {
        report
            .save_to_file(path)
            .context(format!("Failed to save report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    if report.is_aborted() {
        anyhow::bail!("Migration aborted: {}", report.summary());
    }

    Ok(())
}

/// Exécute la commande inspect
pub fn cmd_inspect(
    path: &Path,
    component: &str,
    subtype: Option<&str>,
    table: Option<&str>,
    feature_id: i64,
    config_spec: &str,
    signal_exceptions: &[i64],
) -> Result<()> {
    let config = load_config(config_spec, signal_exceptions)?;
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read feature file: {}", path.display()))?;

    let feature = decode_feature(feature_id, &text)?;
    let properties = normalize_properties(feature.properties);

    let classifier = Classifier::new(config.table_catalog(), config.known_exceptions());
    let classification = classifier.classify(&ClassifyInput {
        feature_id,
        component_name: component,
        component_subtype: subtype,
        kind: feature.kind,
        nominal_table: table,
    })?;

    let geography = to_wkt(&to_multi(feature.geometry))?;

    println!("Feature: {} ({})", feature_id, feature.kind);
    println!("Component: {} / {}", component, subtype.unwrap_or("-"));
    println!("Target table: {}", classification.target);
    println!("Rule: {}", classification.rule.unwrap_or("default"));
    println!(
        "Layer override: {}",
        classification.layer_override.as_deref().unwrap_or("-")
    );
    println!("Properties:");
    for (key, value) in properties.iter() {
        println!("  {} = {}", key, value);
    }
    println!("Geography (SRID 4326): {}", geography);

    Ok(())
}

fn apply_database_overrides(
    config: &mut DatabaseConfig,
    host: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    ssl: Option<String>,
) {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(database) = database {
        config.dbname = database;
    }
    if let Some(user) = user {
        config.user = user;
    }
    if let Some(password) = password {
        config.password = Some(password);
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(ssl) = ssl {
        match ssl.parse() {
            Ok(mode) => config.ssl_mode = mode,
            Err(e) => warn!("{e}, keeping {:?}", config.ssl_mode),
        }
    }
}
