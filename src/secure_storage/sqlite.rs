//! SQLite-backed secret storage.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so it sits behind a mutex.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use zeroize::Zeroizing;

use super::{SecureStorage, SecureStorageError};

pub struct SqliteSecureStorage {
    conn: Mutex<Connection>,
}

impl SqliteSecureStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SecureStorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, SecureStorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SecureStorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS secure_items (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SecureStorage for SqliteSecureStorage {
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError> {
        let value: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM secure_items WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(Zeroizing::new))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO secure_items (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM secure_items WHERE key = ?1", params![key])?;
        Ok(())
    }
}
