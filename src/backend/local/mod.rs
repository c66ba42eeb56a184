//! Embedded SQLite backend for local use and end-to-end tests.
//!
//! One database holds accounts, profiles, echoes, likes, comments and
//! hashtags. Uploaded media is written to a directory the shell serves.

mod auth;
mod media;
mod store;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;

pub use auth::LocalAuth;
pub use media::LocalMediaStore;
pub use store::SqliteGateway;

use crate::error::{EchoError, EchoResult};

/// Opens (creating if needed) and migrates the database at `database_url`.
pub async fn connect(database_url: &str) -> EchoResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // every connection to :memory: is a separate database
    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(EchoError::transient)?;

    tracing::debug!(database_url, "local database ready");
    Ok(pool)
}

fn parse_id(raw: &str) -> EchoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| EchoError::transient(format!("corrupt id {raw:?}: {e}")))
}
