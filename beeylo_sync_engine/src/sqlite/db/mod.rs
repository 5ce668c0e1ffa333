//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Statements with a `RETURNING` clause are read with `fetch_all`, which steps them to completion. A write is therefore
//! finished, and visible to other connections once committed, by the time its row is handed back.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod customers;
pub mod fulfillments;
pub mod jobs;
pub mod notifications;
pub mod orders;
pub mod stores;
pub mod tracking;
pub mod users;

const SQLITE_DB_URL: &str = "sqlite://data/beeylo_sync.db";

pub fn db_url() -> String {
    let result = env::var("BSYNC_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ BSYNC_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Workers write concurrently, so the pool runs in WAL mode and waits on a busy database rather than failing.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
