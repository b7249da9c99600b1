use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    apply_fields, matches_all, Document, DocumentStore, Fields, Filter, StoreError, StoreResult,
};
use crate::clock::Clock;

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("malformed document body: {}", error))
    }
}

/// Documents kept in a single SQLite file, one JSON body per row.
pub struct SqliteStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let store = SqliteStore { path, clock };
        store.open_db()?;
        Ok(store)
    }

    fn open_db(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        init_db(&conn)?;
        Ok(conn)
    }

    fn stamp(&self) -> String {
        self.clock.now().to_rfc3339()
    }
}

fn init_db(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        params![],
    )?;

    Ok(())
}

fn parse_body(body: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str(body)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(StoreError::Unavailable(
            "document body is not an object".to_string(),
        )),
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

impl DocumentStore for SqliteStore {
    fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let conn = self.open_db()?;
        let id = Uuid::new_v4().simple().to_string();
        let mut body = Map::new();
        apply_fields(&mut body, fields, &self.stamp());

        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, Value::Object(body).to_string()],
        )?;
        debug!(collection, %id, "document created");

        Ok(id)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let conn = self.open_db()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Document {
                id: id.to_string(),
                fields: parse_body(&body)?,
            }),
            None => Err(not_found(collection, id)),
        }
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let mut conn = self.open_db()?;
        let tx = conn.transaction()?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        let mut body = match body {
            Some(body) => parse_body(&body)?,
            None => return Err(not_found(collection, id)),
        };

        apply_fields(&mut body, fields, &self.stamp());
        tx.execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection, id, Value::Object(body).to_string()],
        )?;
        tx.commit()?;

        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let conn = self.open_db()?;
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>> {
        let conn = self.open_db()?;
        let mut stmt = conn.prepare("SELECT id, body FROM documents WHERE collection = ?")?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = vec![];
        for row in rows {
            let (id, body) = row?;
            let fields = match parse_body(&body) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(collection, %id, error = %e, "skipping unreadable document");
                    continue;
                }
            };
            if matches_all(filters, &fields) {
                documents.push(Document { id, fields });
            }
        }

        Ok(documents)
    }
}
