//! # moped-geomigrate
//!
//! Migration des features GeoJSON de `moped_proj_features` vers des tables
//! PostGIS typées (une par archétype), avec liaison composant → feature.
//!
//! ## Features
//!
//! - Vidage des tables cibles puis migration séquentielle, une transaction par feature
//! - Corrections de couche des composants (extents ponctuels, trottoirs, exceptions)
//! - Dry-run, annulation par Ctrl-C, rapport JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Migration complète
//! moped-geomigrate --report ./migration.json
//!
//! # Classification sans écriture
//! moped-geomigrate --dry-run
//!
//! # Routage d'une feature isolée (sans base de données)
//! moped-geomigrate inspect --path ./feature.json --component "Sidewalk" --subtype "With Curb and Gutter"
//! ```

pub mod config;
pub mod migrate;
pub mod report;

pub use config::MigrationConfig;
pub use migrate::pool::{create_pool, DatabaseConfig, SslMode};
pub use migrate::{run_migration, RunOptions};
pub use report::{MigrationReport, RunStatus};
