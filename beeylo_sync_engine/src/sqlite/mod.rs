//! SQLite backend for the sync engine's state store and job broker.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
