use rusqlite::params;

use super::{CatalogDb, DbError, Person};

impl CatalogDb {
    /// Insert a person and return the stored row.
    pub fn insert_person(&self, full_name: &str) -> Result<Person, DbError> {
        self.conn.execute(
            "INSERT INTO persons (full_name) VALUES (?1)",
            params![full_name],
        )?;
        Ok(Person {
            id: self.conn.last_insert_rowid(),
            full_name: full_name.to_string(),
        })
    }

    /// All persons in insertion order.
    pub fn list_persons(&self) -> Result<Vec<Person>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, full_name FROM persons ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Person {
                id: row.get(0)?,
                full_name: row.get(1)?,
            })
        })?;
        let mut persons = Vec::new();
        for row in rows {
            persons.push(row?);
        }
        Ok(persons)
    }

    /// Look up a single person by id.
    pub fn find_person(&self, id: i64) -> Result<Option<Person>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, full_name FROM persons WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| {
            Ok(Person {
                id: row.get(0)?,
                full_name: row.get(1)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}
