//! Embedded relational collection store, backed by `rusqlite`.
//!
//! All blocking SQLite calls run inside `tokio::task::spawn_blocking` so they never stall the
//! async runtime; the connection itself is guarded by a `std::sync::Mutex` since `rusqlite`'s
//! connection type is `Send` but not `Sync`. SQLite's own writer-serialization model means this
//! single-connection design never needs more than the `Mutex` to stay correct under concurrent
//! writers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::ids::{CollectionId, FileId, content_hash, new_id, now_rfc3339, sanitize_name};

use super::{Collection, CollectionStore, FileRecord, StoreError, schema};

/// `rusqlite`-backed implementation of [`CollectionStore`].
pub struct DbCollectionStore {
    conn: Arc<Mutex<Connection>>,
}

impl DbCollectionStore {
    /// Open (creating if necessary) the database at `path` and apply pending migrations.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Build an in-memory store, primarily for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        match tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("store mutex poisoned");
            f(&guard)
        })
        .await
        {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(error = %join_err, "blocking store task panicked");
                Err(StoreError::Db(rusqlite::Error::ExecuteReturnedResults))
            }
        }
    }
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collection> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(Collection {
        id: CollectionId(row.get("id")?),
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        file_count: row.get::<_, i64>("file_count")? as u64,
        total_size: row.get::<_, i64>("total_size")? as u64,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: FileId(row.get("id")?),
        collection_id: CollectionId(row.get("collection_id")?),
        filename: row.get("filename")?,
        folder_path: row.get("folder_path")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        source_url: row.get("source_url")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        byte_size: row.get::<_, i64>("byte_size")? as u64,
    })
}

#[async_trait]
impl CollectionStore for DbCollectionStore {
    async fn create_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Collection, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::Validation("collection name must not be empty".into()));
        }
        let id = sanitize_name(trimmed);
        if id.is_empty() {
            return Err(StoreError::Validation(
                "collection name must contain at least one alphanumeric character".into(),
            ));
        }
        let name = trimmed.to_string();
        let description = description.to_string();

        self.with_conn(move |conn| {
            let exists: Option<String> = conn
                .query_row("SELECT id FROM collections WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!("collection '{name}' already exists")));
            }

            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO collections (id, name, description, created_at, updated_at, file_count, total_size, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?4, 0, 0, '{}')",
                params![id, name, description, now],
            )?;

            conn.query_row("SELECT * FROM collections WHERE id = ?1", params![id], row_to_collection)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM collections ORDER BY name")?;
            let rows = stmt
                .query_map([], row_to_collection)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_collection(&self, id: &CollectionId) -> Result<Collection, StoreError> {
        let id = id.0.clone();
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM collections WHERE id = ?1", params![id], row_to_collection)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("collection '{id}' not found")))
        })
        .await
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<(), StoreError> {
        let id = id.0.clone();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("collection '{id}' not found")));
            }
            Ok(())
        })
        .await
    }

    async fn save_file(
        &self,
        collection: &CollectionId,
        folder_path: &str,
        filename: &str,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<FileRecord, StoreError> {
        crate::ids::validate_relative_path(folder_path).map_err(StoreError::Validation)?;
        crate::ids::validate_extension(filename).map_err(StoreError::Validation)?;

        let collection_id = collection.0.clone();
        let folder_path = folder_path.to_string();
        let filename = filename.to_string();
        let content = content.to_string();
        let source_url = source_url.map(|s| s.to_string());

        self.with_conn(move |conn| {
            let collection_exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM collections WHERE id = ?1",
                    params![collection_id],
                    |row| row.get(0),
                )
                .optional()?;
            if collection_exists.is_none() {
                return Err(StoreError::NotFound(format!("collection '{collection_id}' not found")));
            }

            let existing_id: Option<String> = conn
                .query_row(
                    "SELECT id FROM files WHERE collection_id = ?1 AND folder_path = ?2 AND filename = ?3",
                    params![collection_id, folder_path, filename],
                    |row| row.get(0),
                )
                .optional()?;

            let now = now_rfc3339();
            let hash = content_hash(content.as_bytes());
            let byte_size = content.len() as i64;

            let tx = conn.unchecked_transaction()?;
            let file_id = match existing_id {
                Some(id) => {
                    tx.execute(
                        "UPDATE files SET content = ?1, content_hash = ?2, source_url = ?3, updated_at = ?4, byte_size = ?5 WHERE id = ?6",
                        params![content, hash, source_url, now, byte_size, id],
                    )?;
                    id
                }
                None => {
                    let id = new_id();
                    tx.execute(
                        "INSERT INTO files (id, collection_id, filename, folder_path, content, content_hash, source_url, created_at, updated_at, byte_size)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9)",
                        params![id, collection_id, filename, folder_path, content, hash, source_url, now, byte_size],
                    )?;
                    id
                }
            };

            tx.execute(
                "UPDATE collections SET
                    file_count = (SELECT count(*) FROM files WHERE collection_id = ?1),
                    total_size = (SELECT coalesce(sum(byte_size), 0) FROM files WHERE collection_id = ?1),
                    updated_at = ?2
                 WHERE id = ?1",
                params![collection_id, now],
            )?;
            tx.commit()?;

            conn.query_row("SELECT * FROM files WHERE id = ?1", params![file_id], row_to_file)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, StoreError> {
        let id = file_id.0.clone();
        self.with_conn(move |conn| {
            conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("file '{id}' not found")))
        })
        .await
    }

    async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, StoreError> {
        let id = file_id.0.clone();
        let content = content.to_string();
        self.with_conn(move |conn| {
            let collection_id: String = conn
                .query_row("SELECT collection_id FROM files WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("file '{id}' not found")))?;

            let now = now_rfc3339();
            let hash = content_hash(content.as_bytes());
            let byte_size = content.len() as i64;

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE files SET content = ?1, content_hash = ?2, updated_at = ?3, byte_size = ?4 WHERE id = ?5",
                params![content, hash, now, byte_size, id],
            )?;
            tx.execute(
                "UPDATE collections SET
                    total_size = (SELECT coalesce(sum(byte_size), 0) FROM files WHERE collection_id = ?1),
                    updated_at = ?2
                 WHERE id = ?1",
                params![collection_id, now],
            )?;
            tx.commit()?;

            conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file)
                .map_err(StoreError::from)
        })
        .await
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<(), StoreError> {
        let id = file_id.0.clone();
        self.with_conn(move |conn| {
            let collection_id: Option<String> = conn
                .query_row("SELECT collection_id FROM files WHERE id = ?1", params![id], |row| row.get(0))
                .optional()?;
            let Some(collection_id) = collection_id else {
                return Err(StoreError::NotFound(format!("file '{id}' not found")));
            };

            let now = now_rfc3339();
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            tx.execute(
                "UPDATE collections SET
                    file_count = (SELECT count(*) FROM files WHERE collection_id = ?1),
                    total_size = (SELECT coalesce(sum(byte_size), 0) FROM files WHERE collection_id = ?1),
                    updated_at = ?2
                 WHERE id = ?1",
                params![collection_id, now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, StoreError> {
        let collection_id = collection.0.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM files WHERE collection_id = ?1 ORDER BY folder_path, filename",
            )?;
            let rows = stmt
                .query_map(params![collection_id], row_to_file)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_collection_round_trips() {
        let store = DbCollectionStore::in_memory().unwrap();
        let collection = store.create_collection("My Docs", "test collection").await.unwrap();
        assert_eq!(collection.id.0, "my-docs");

        let fetched = store.get_collection(&collection.id).await.unwrap();
        assert_eq!(fetched.name, "My Docs");
    }

    #[tokio::test]
    async fn create_collection_rejects_duplicate_name() {
        let store = DbCollectionStore::in_memory().unwrap();
        store.create_collection("docs", "").await.unwrap();
        let err = store.create_collection("docs", "").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_file_updates_collection_counters() {
        let store = DbCollectionStore::in_memory().unwrap();
        let collection = store.create_collection("docs", "").await.unwrap();
        store
            .save_file(&collection.id, "", "a.md", "hello world", None)
            .await
            .unwrap();
        store
            .save_file(&collection.id, "sub", "b.md", "more content", None)
            .await
            .unwrap();

        let refreshed = store.get_collection(&collection.id).await.unwrap();
        assert_eq!(refreshed.file_count, 2);
        assert_eq!(refreshed.total_size, "hello world".len() as u64 + "more content".len() as u64);
    }

    #[tokio::test]
    async fn save_file_rejects_traversal_and_bad_extension() {
        let store = DbCollectionStore::in_memory().unwrap();
        let collection = store.create_collection("docs", "").await.unwrap();
        assert!(store.save_file(&collection.id, "../etc", "a.md", "x", None).await.is_err());
        assert!(store.save_file(&collection.id, "", "a.exe", "x", None).await.is_err());
    }

    #[tokio::test]
    async fn delete_collection_cascades_to_files() {
        let store = DbCollectionStore::in_memory().unwrap();
        let collection = store.create_collection("docs", "").await.unwrap();
        let file = store.save_file(&collection.id, "", "a.md", "hi", None).await.unwrap();

        store.delete_collection(&collection.id).await.unwrap();
        assert!(store.read_file(&file.id).await.is_err());
    }

    #[tokio::test]
    async fn update_file_replaces_content_and_hash() {
        let store = DbCollectionStore::in_memory().unwrap();
        let collection = store.create_collection("docs", "").await.unwrap();
        let file = store.save_file(&collection.id, "", "a.md", "v1", None).await.unwrap();

        let updated = store.update_file(&file.id, "v2").await.unwrap();
        assert_eq!(updated.content, "v2");
        assert_ne!(updated.content_hash, file.content_hash);
    }
}
