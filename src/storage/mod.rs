//! SQLite storage layer -- schema, pool, result queries.

pub mod model;
pub mod results;
pub mod schema;

pub use self::model::{DailyTrend, Kpis, TestResult, TestStatus, UnknownStatus};
pub use self::results::ResultStore;

use crate::config::StorageConfig;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::PathBuf;
use thiserror::Error;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Text layout of `execution_date`, second resolution, local wall-clock time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Text layout of the calendar dates produced by `DATE(execution_date)`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to acquire database connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid duration {0}: must be finite and non-negative")]
    InvalidDuration(f64),
}

/// Open (or create) the SQLite database and return a connection pool.
///
/// Connections are handed out per operation and returned to the pool when the
/// guard drops.
pub fn open_pool(config: &StorageConfig) -> Result<Pool, StoreError> {
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let manager = SqliteConnectionManager::file(&config.db_path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::builder()
        .max_size(config.max_connections.max(1))
        .build(manager)?;

    tracing::debug!(path = %config.db_path.display(), "opened result database");
    Ok(pool)
}
