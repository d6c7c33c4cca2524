use crate::error::Result;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::{str::FromStr, sync::Arc};
use tracing::{info, instrument};

/// DatabaseManager handles SQLite connection pooling and database operations
#[derive(Clone)]
pub struct DatabaseManager {
    /// Connection pool for SQLite
    pub pool: Pool<Sqlite>,
    /// Path to the database file
    pub db_path: Arc<str>,
}

impl DatabaseManager {
    /// Creates a new DatabaseManager with a connection pool to the specified database
    #[instrument(err)]
    pub async fn new(db_path: &str) -> Result<Self> {
        info!("Initializing database at: {}", db_path);

        let pool = Pool::connect_with(
            SqliteConnectOptions::from_str(db_path)?
                .foreign_keys(true)
                // Create the database if it doesn't exist
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                // Only use NORMAL if WAL mode is enabled
                // as it provides extra performance benefits
                // at the cost of durability
                .synchronous(SqliteSynchronous::Normal),
        )
        .await?;

        Ok(Self {
            pool,
            db_path: db_path.into(),
        })
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Apply all pending schema migrations from the bundled `migrations/` directory
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    /// Setup test database schema
    ///
    /// A single-connection pool keeps every query on the same in-memory
    /// database; with more connections each would see its own empty one.
    pub(crate) async fn setup_test_db() -> DatabaseManager {
        let options = SqliteConnectOptions::from_str(":memory:")
            .expect("Failed to parse in-memory database options")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("Failed to initialize database");
        let db = DatabaseManager {
            pool,
            db_path: ":memory:".into(),
        };
        db.run_migrations().await.expect("Failed to run migrations");
        db
    }
}
