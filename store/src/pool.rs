//! Connection setup for the SQLite-backed stores. One pool is shared by
//! history, profile, duty, and analyzer storage — they're logically
//! separate stores in the spec, but a single embedded database is the
//! simplest faithful stand-in for "an external document store" (§4.3/§4.4).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Connect to `database_url` (e.g. `sqlite://run/alertcenter.db`), creating
/// the file if it doesn't exist, and apply pending migrations.
///
/// A single connection is kept in the pool: SQLite only has one writer at a
/// time anyway, and `:memory:` databases are otherwise invisible across
/// connections.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options: SqliteConnectOptions = database_url.parse::<SqliteConnectOptions>()?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
