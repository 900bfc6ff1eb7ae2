//! Migration des features vers les tables PostGIS typées

pub mod driver;
pub mod pool;
pub mod source;
pub mod sql;
pub mod values;
pub mod writer;

pub use driver::{run_migration, truncate_targets, RunOptions, PROGRESS_INTERVAL};
pub use writer::{write_feature, FeaturePlan, WriteError, WrittenFeature};
