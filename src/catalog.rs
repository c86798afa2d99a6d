//! Storage contract for the conversation flows.
//!
//! The dispatcher only sees this trait, so tests run against an in-memory
//! double and production runs against [`SqliteCatalog`], which serializes
//! access to the single SQLite connection behind a mutex.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::db::{CatalogDb, DbError, Person};

pub trait Catalog: Send + Sync {
    /// All persons, in insertion order.
    fn list_persons(&self) -> Result<Vec<Person>, DbError>;

    /// Look up a single person by id.
    fn find_person(&self, id: i64) -> Result<Option<Person>, DbError>;

    /// All entry texts for a person, in creation order.
    fn list_entries(&self, person_id: i64) -> Result<Vec<String>, DbError>;

    /// Append an entry. Duplicates are allowed.
    fn insert_entry(&self, person_id: i64, text: &str) -> Result<(), DbError>;

    /// Delete every entry matching the exact text; returns rows removed.
    fn delete_entry(&self, person_id: i64, text: &str) -> Result<usize, DbError>;
}

/// [`Catalog`] over a [`CatalogDb`]. The connection is not `Sync`, so each
/// call takes the lock for its duration; nothing holds it across an await.
pub struct SqliteCatalog {
    db: Mutex<CatalogDb>,
}

impl SqliteCatalog {
    pub fn new(db: CatalogDb) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the default catalog database.
    pub fn open() -> Result<Self, DbError> {
        Ok(Self::new(CatalogDb::open()?))
    }

    /// Open a catalog database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        Ok(Self::new(CatalogDb::open_at(path)?))
    }

    fn with_db<T>(&self, f: impl FnOnce(&CatalogDb) -> Result<T, DbError>) -> Result<T, DbError> {
        let db = self.db.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&db)
    }
}

impl Catalog for SqliteCatalog {
    fn list_persons(&self) -> Result<Vec<Person>, DbError> {
        self.with_db(|db| db.list_persons())
    }

    fn find_person(&self, id: i64) -> Result<Option<Person>, DbError> {
        self.with_db(|db| db.find_person(id))
    }

    fn list_entries(&self, person_id: i64) -> Result<Vec<String>, DbError> {
        self.with_db(|db| db.list_entries(person_id))
    }

    fn insert_entry(&self, person_id: i64, text: &str) -> Result<(), DbError> {
        self.with_db(|db| db.insert_entry(person_id, text))
    }

    fn delete_entry(&self, person_id: i64, text: &str) -> Result<usize, DbError> {
        self.with_db(|db| db.delete_entry(person_id, text))
    }
}
