use rusqlite::params;

use super::{CatalogDb, DbError};

impl CatalogDb {
    /// All entry texts for a person, in creation order.
    pub fn list_entries(&self, person_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT text FROM entries WHERE person_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![person_id], |row| row.get::<_, String>(0))?;
        let mut texts = Vec::new();
        for row in rows {
            texts.push(row?);
        }
        Ok(texts)
    }

    /// Append an entry. No uniqueness constraint — duplicates are allowed.
    pub fn insert_entry(&self, person_id: i64, text: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO entries (person_id, text) VALUES (?1, ?2)",
            params![person_id, text],
        )?;
        Ok(())
    }

    /// Delete every entry of the person whose text matches exactly
    /// (case- and whitespace-sensitive). Returns the number of rows removed.
    pub fn delete_entry(&self, person_id: i64, text: &str) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM entries WHERE person_id = ?1 AND text = ?2",
            params![person_id, text],
        )?;
        Ok(removed)
    }
}
