//! Data-directory configuration
//!
//! Resolves the two on-disk locations the pipeline writes to: the bulk-file
//! cache directory and the per-year database directory. Resolution priority
//! is environment variable, then the built-in default relative to the
//! working directory.

use std::path::{Path, PathBuf};
use tracing::info;

/// Environment override for the bulk-file cache directory.
pub const CACHE_DIR_ENV: &str = "CAMARA_CACHE_DIR";
/// Environment override for the database directory.
pub const DB_DIR_ENV: &str = "CAMARA_DB_DIR";

const DEFAULT_CACHE_DIR: &str = "data";
const DEFAULT_DB_DIR: &str = "dbs";

/// Resolved on-disk locations for one pipeline instance.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Directory holding downloaded bulk artifacts (expense archives,
    /// session JSON files), one set per year
    pub cache_dir: PathBuf,
    /// Directory holding one SQLite store per year
    pub db_dir: PathBuf,
}

impl DataPaths {
    /// Resolve both directories from the environment, falling back to the
    /// defaults (`data/`, `dbs/`).
    pub fn resolve() -> Self {
        let cache_dir = resolve_dir(CACHE_DIR_ENV, DEFAULT_CACHE_DIR);
        let db_dir = resolve_dir(DB_DIR_ENV, DEFAULT_DB_DIR);
        Self { cache_dir, db_dir }
    }

    /// Path of the store for one legislative year.
    pub fn database_path(&self, year: i32) -> PathBuf {
        self.db_dir.join(format!("camara_{}.db", year))
    }
}

fn resolve_dir(env_var: &str, default: &str) -> PathBuf {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => {
            info!(source = env_var, path = %value, "Resolved data directory from environment");
            PathBuf::from(value)
        }
        _ => PathBuf::from(default),
    }
}

/// Create a directory (and parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> crate::Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}
