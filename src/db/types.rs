//! Shared type definitions for the catalog layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to catalog operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Catalog lock poisoned")]
    LockPoisoned,
}

/// A row from the `persons` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: i64,
    pub full_name: String,
}

/// A row from the `entries` table. Each entry belongs to exactly one person;
/// rowid order is the stable per-person ordering shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: i64,
    pub person_id: i64,
    pub text: String,
}
