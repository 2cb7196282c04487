//! Persistent store for immutable file listings

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::version::error::StoreError;
use crate::version::types::FileListing;

/// Trait for storing file listings keyed by `(kind, name, version)`
#[cfg_attr(test, automock)]
pub trait ListingStore: Send + Sync {
    fn get(&self, kind: &str, name: &str, version: &str)
    -> Result<Option<FileListing>, StoreError>;

    /// Stores a listing; an existing entry for the key is kept as is
    fn put(
        &self,
        kind: &str,
        name: &str,
        version: &str,
        listing: &FileListing,
    ) -> Result<(), StoreError>;
}

pub struct SqliteListingStore {
    conn: Mutex<Connection>,
}

impl SqliteListingStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Initializing listing store at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            // Connection::open reports a missing directory as an opaque error
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating listing schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                listing TEXT NOT NULL,
                fetched_at INTEGER NOT NULL,
                UNIQUE(kind, name, version)
            )
            "#,
            [],
        )?;

        Ok(())
    }
}

impl ListingStore for SqliteListingStore {
    fn get(
        &self,
        kind: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<FileListing>, StoreError> {
        let conn = self.lock_conn()?;
        let listing: Option<String> = conn
            .query_row(
                "SELECT listing FROM listings WHERE kind = ?1 AND name = ?2 AND version = ?3",
                (kind, name, version),
                |row| row.get(0),
            )
            .optional()?;

        listing
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn put(
        &self,
        kind: &str,
        name: &str,
        version: &str,
        listing: &FileListing,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(listing)?;
        let now = chrono::Utc::now().timestamp_millis();

        let conn = self.lock_conn()?;
        // Listings of a published version never change, so the first write wins
        conn.execute(
            r#"
            INSERT OR IGNORE INTO listings (kind, name, version, listing, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            (kind, name, version, json, now),
        )?;

        debug!("Stored listing for {}/{}@{}", kind, name, version);
        Ok(())
    }
}
