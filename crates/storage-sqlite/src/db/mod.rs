//! Database initialization, connection pooling and migrations.

use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use networth_core::constants::DATABASE_FILE_NAME;
use networth_core::errors::{DatabaseError, Error, Result};

use crate::errors::IntoCore;

pub mod write_actor;
pub use write_actor::{spawn_writer, WriteHandle};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 30000;
    PRAGMA synchronous = NORMAL;
";

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionCustomizer;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(r2d2::Error::QueryError)
    }
}

pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE_NAME)
}

/// Creates the data directory and database file, and switches the database
/// to WAL mode. Returns the database path.
pub fn init(data_dir: &Path) -> Result<String> {
    fs::create_dir_all(data_dir).map_err(|e| {
        Error::Database(DatabaseError::ConnectionFailed(format!(
            "cannot create {}: {}",
            data_dir.display(),
            e
        )))
    })?;

    let db_path = get_db_path(data_dir).to_string_lossy().into_owned();
    let mut conn = SqliteConnection::establish(&db_path).into_core()?;
    conn.batch_execute("PRAGMA journal_mode = WAL;").into_core()?;

    Ok(db_path)
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer))
        .build(manager)
        .map_err(|e| DatabaseError::PoolCreationFailed(e.to_string()))?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running database migrations");
    let mut connection = get_connection(pool)?;

    let applied = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Database migration failed: {}", e);
        Error::Database(DatabaseError::MigrationFailed(e.to_string()))
    })?;

    if applied.is_empty() {
        info!("No pending migrations to apply.");
    } else {
        for version in &applied {
            info!("Applied migration {}", version);
        }
    }
    Ok(())
}

/// True when the schema is missing or behind the embedded migrations.
/// Does not write to an up-to-date database.
pub fn has_pending_migrations(pool: &DbPool) -> Result<bool> {
    let mut connection = get_connection(pool)?;
    let ledger: i64 = diesel::select(diesel::dsl::sql::<diesel::sql_types::BigInt>(
        "(SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = '__diesel_schema_migrations')",
    ))
    .get_result(&mut connection)
    .into_core()?;
    if ledger == 0 {
        return Ok(true);
    }
    connection
        .has_pending_migration(MIGRATIONS)
        .map_err(|e| Error::Database(DatabaseError::MigrationFailed(e.to_string())))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    pool.get().into_core()
}

/// Everything a repository needs: the read pool and the single writer.
#[derive(Clone)]
pub struct Database {
    pub pool: Arc<DbPool>,
    pub writer: WriteHandle,
}

impl Database {
    /// Initializes the database in `data_dir`, applies migrations and starts
    /// the writer. Must be called inside a Tokio runtime.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let database = Self::connect(data_dir)?;
        database.migrate()?;
        Ok(database)
    }

    /// Like `open`, but leaves migrations to the caller so they can run
    /// under the data directory lock.
    pub fn connect(data_dir: &Path) -> Result<Self> {
        let db_path = init(data_dir)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(DbPool::clone(&pool));
        Ok(Self { pool, writer })
    }

    pub fn needs_migration(&self) -> Result<bool> {
        has_pending_migrations(&self.pool)
    }

    pub fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_migrations_detected_until_applied() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::connect(dir.path()).unwrap();
        assert!(database.needs_migration().unwrap());

        database.migrate().unwrap();
        assert!(!database.needs_migration().unwrap());

        let reopened = Database::connect(dir.path()).unwrap();
        assert!(!reopened.needs_migration().unwrap());
    }
}
