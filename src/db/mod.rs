//! SQLite-backed catalog of persons and activity entries.
//!
//! The database lives at `~/.dispogen/dispogen.db`. It is the system of
//! record for the catalog; conversation state never touches it and stays in
//! process memory.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

mod entries;
mod persons;

pub struct CatalogDb {
    conn: Connection,
}

impl CatalogDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.dispogen/dispogen.db` and apply
    /// the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Used for config overrides and
    /// testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for better concurrent read behavior.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.dispogen/dispogen.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".dispogen").join("dispogen.db"))
    }
}
