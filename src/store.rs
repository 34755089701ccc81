// 💾 Persistence - The document store contract and two backends
// The core treats load/save as opaque calls: no transport, format, or
// retry policy is assumed beyond "load yields a document or the default
// template, save either fully succeeds or reports failure".

use crate::document::{Document, DocumentKey};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

// ============================================================================
// CONTRACT
// ============================================================================

/// Save/load contract consumed by `EditSession`
///
/// A missing key on load is not an error: it yields the default
/// template for the key's side, so a freshly opened entity always has
/// a usable document.
pub trait DocumentStore {
    fn load(&self, key: &DocumentKey) -> Result<Document>;
    fn save(&self, key: &DocumentKey, document: &Document) -> Result<()>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed store: one JSON row per (entity, side)
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL for crash recovery (a no-op on in-memory connections)
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                entity_id TEXT NOT NULL,
                side TEXT NOT NULL,
                body TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                PRIMARY KEY (entity_id, side)
            )",
            [],
        )
        .context("Failed to create documents table")?;

        Ok(SqliteStore { conn })
    }
}

impl DocumentStore for SqliteStore {
    fn load(&self, key: &DocumentKey) -> Result<Document> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE entity_id = ?1 AND side = ?2",
                params![key.entity_id, key.side.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query document")?;

        match body {
            Some(json) => Document::from_json(&json),
            None => Ok(Document::default_template(key.side)),
        }
    }

    fn save(&self, key: &DocumentKey, document: &Document) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO documents (entity_id, side, body, last_modified)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    key.entity_id,
                    key.side.as_str(),
                    document.canonical_json(),
                    document.last_modified.to_rfc3339(),
                ],
            )
            .context("Failed to write document")?;
        Ok(())
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store keyed by (entity, side); tests and demos
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, key: &DocumentKey) -> Result<Document> {
        let documents = self
            .documents
            .read()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?;
        match documents.get(key) {
            Some(json) => Document::from_json(json),
            None => Ok(Document::default_template(key.side)),
        }
    }

    fn save(&self, key: &DocumentKey, document: &Document) -> Result<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| anyhow::anyhow!("Store lock poisoned"))?;
        documents.insert(key.clone(), document.canonical_json());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
