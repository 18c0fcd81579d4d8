//! SQLite metrics store: request/response records and per-model aggregates.

pub mod aggregates;
pub mod records;

pub use aggregates::{ModelAggregate, ModelSummary};
pub use records::{persist_call, CallStatus, RecentCall, RequestRecord, ResponseRecord};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::Result;

/// Initialize the SQLite connection pool and run migrations.
///
/// The database file is created automatically if it doesn't exist.
/// WAL journal mode lets analyzer reads proceed alongside a pending write.
pub async fn init_pool(db_path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    tracing::debug!(path = %db_path, "Metrics store ready");

    Ok(pool)
}

/// Apply embedded migrations to an existing pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
