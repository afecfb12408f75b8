use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document is not valid JSON: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("document store path unavailable: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: u64,
    pub data: Value,
}

/// Opaque key/value persistence for JSON documents.
pub trait DocumentStore {
    fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;
    fn put(&self, id: &str, data: &Value) -> Result<Document, StoreError>;
    fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

pub struct SqliteDocumentStore {
    db: Connection,
}

const SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS document (id TEXT PRIMARY KEY, rev INTEGER NOT NULL, data TEXT NOT NULL)";

impl SqliteDocumentStore {
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    pub fn open_file(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    fn with_connection(db: Connection) -> Result<Self, StoreError> {
        db.execute(SCHEMA, [])?;
        Ok(Self { db })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = self
            .db
            .query_row(
                "SELECT id, rev, data FROM document WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, rev, data)) => Ok(Some(Document {
                id,
                rev: rev.max(0) as u64,
                data: serde_json::from_str(&data)?,
            })),
            None => Ok(None),
        }
    }

    fn put(&self, id: &str, data: &Value) -> Result<Document, StoreError> {
        let encoded = serde_json::to_string(data)?;
        self.db.execute(
            "INSERT INTO document (id, rev, data) VALUES (?1, 1, ?2)
             ON CONFLICT(id) DO UPDATE SET rev = document.rev + 1, data = excluded.data",
            params![id, encoded],
        )?;
        let rev: i64 = self.db.query_row(
            "SELECT rev FROM document WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(Document {
            id: id.to_string(),
            rev: rev.max(0) as u64,
            data: data.clone(),
        })
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self
            .db
            .execute("DELETE FROM document WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}
