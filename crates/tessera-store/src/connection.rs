//! SQLite pool setup for the event store.
//!
//! Several station processes on one machine may share a single database
//! file, so the store opens SQLite in WAL mode with a busy timeout on the
//! write lock. Foreign keys are always on: the event log references
//! `students` with `ON DELETE CASCADE`, and that only holds if every
//! connection enforces it. [`Database::in_memory`] backs the test suites.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{StoreError, StoreResult};

/// Settings for opening the store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub database_path: String,

    /// Pool size. The scan path is one writer plus a few resolver reads;
    /// a small pool is plenty.
    pub max_connections: u32,

    /// How long a connection waits on the file write lock before failing.
    pub busy_timeout: Duration,

    /// Create the database file (and its parent directories) if missing.
    pub create_if_missing: bool,

    /// Apply pending migrations when the pool opens.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "tessera.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(10),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for the given database path, defaults elsewhere.
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set the pool size.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the write-lock wait.
    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set whether migrations run when the pool opens.
    #[must_use]
    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }
}

/// Cloneable handle to the store's connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the store at the configured path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tessera_store::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::open(DatabaseConfig::new("var/tessera.db")).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for an unusable path and
    /// passes through pool or migration failures.
    pub async fn open(config: DatabaseConfig) -> StoreResult<Self> {
        if config.create_if_missing
            && let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Configuration(format!("cannot create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database_path))
            .map_err(|e| StoreError::Configuration(format!("invalid database path: {}", e)))?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true) // Student deletes must cascade into events
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }

        Ok(db)
    }

    /// Open an in-memory store, migrated and ready.
    ///
    /// An in-memory SQLite database exists per connection, so the pool is
    /// pinned to a single connection to keep every query on the same one.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Apply pending migrations.
    ///
    /// The migration files are embedded at compile time from the workspace
    /// `migrations/` directory.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Round-trip one trivial query.
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
