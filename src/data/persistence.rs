use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// Durable key-value store over SQLite. The query cache snapshots itself
/// here so state survives process restarts.
///
/// The connection sits behind a mutex: the periodic sweep task and the
/// request path both persist, and rusqlite connections are not Sync.
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // A writer that panicked mid-persist poisons the mutex; the store
    // stays usable, so recover the guard instead of propagating the panic.
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("kv read failed")
    }

    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .context("kv write failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = KvStore::open_in_memory().unwrap();
        store.set("snapshot", b"payload").unwrap();
        assert_eq!(store.get("snapshot").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_missing_key() {
        let store = KvStore::open_in_memory().unwrap();
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn test_overwrite() {
        let store = KvStore::open_in_memory().unwrap();
        store.set("k", b"one").unwrap();
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_store_survives_poisoned_lock() {
        use std::sync::Arc;

        let store = Arc::new(KvStore::open_in_memory().unwrap());
        store.set("k", b"one").unwrap();

        // Panic while holding the connection guard to poison the mutex.
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.conn.lock().unwrap();
            panic!("holding the kv lock");
        })
        .join();
        assert!(store.conn.is_poisoned());

        assert_eq!(store.get("k").unwrap(), Some(b"one".to_vec()));
        store.set("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
    }
}
