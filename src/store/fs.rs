//! Filesystem collection store: each collection is a directory, each file a file on disk.
//! Metadata (ids, hashes, timestamps, sync snapshots) lives in a sidecar `rusqlite` database at
//! `<root>/.metadata.db`, sharing the same schema as the embedded-database backend.
//!
//! A background reconciler, gated by `fs_reconcile_poll_interval_secs`, walks the tree with
//! `walkdir::WalkDir` and brings the metadata index back into agreement with whatever is on
//! disk: new files get metadata rows, deleted files lose theirs, and changed hashes mark the
//! owning collection `out_of_sync`. Reconciliation never writes to content files, so it is safe
//! to run concurrently with external edits.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use walkdir::WalkDir;

use crate::ids::{CollectionId, FileId, content_hash, new_id, now_rfc3339, sanitize_name};

use super::{Collection, CollectionStore, FileRecord, StoreError, schema};

/// Filesystem-backed implementation of [`CollectionStore`].
pub struct FsCollectionStore {
    root: PathBuf,
    index: Arc<Mutex<Connection>>,
}

impl FsCollectionStore {
    /// Open (creating if necessary) the filesystem store rooted at `root`, and start a
    /// background reconciliation poller when `poll_interval_secs > 0`.
    pub fn new(root: &str, poll_interval_secs: u64) -> Result<Self, StoreError> {
        let root = PathBuf::from(root);
        std::fs::create_dir_all(&root)?;
        let index_path = root.join(".metadata.db");
        let conn = Connection::open(index_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;

        let store = Self {
            root,
            index: Arc::new(Mutex::new(conn)),
        };

        if poll_interval_secs > 0 {
            store.spawn_poller(poll_interval_secs);
        }

        Ok(store)
    }

    fn spawn_poller(&self, interval_secs: u64) {
        let root = self.root.clone();
        let index = Arc::clone(&self.index);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(err) = reconcile_tree(&root, &index, None).await {
                    tracing::warn!(error = %err, "background filesystem reconciliation failed");
                }
            }
        });
    }

    fn collection_dir(&self, id: &CollectionId) -> PathBuf {
        self.root.join(&id.0)
    }

    async fn with_index<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let index = Arc::clone(&self.index);
        match tokio::task::spawn_blocking(move || {
            let guard = index.lock().expect("index mutex poisoned");
            f(&guard)
        })
        .await
        {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(error = %join_err, "blocking index task panicked");
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

fn row_to_file_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: FileId(row.get("id")?),
        collection_id: CollectionId(row.get("collection_id")?),
        filename: row.get("filename")?,
        folder_path: row.get("folder_path")?,
        content: String::new(),
        content_hash: row.get("content_hash")?,
        source_url: row.get("source_url")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        byte_size: row.get::<_, i64>("byte_size")? as u64,
    })
}

/// Walk `root` on disk and reconcile the metadata index against it.
///
/// When `only` is `Some`, restricts reconciliation to that collection; `None` reconciles every
/// collection directory found under `root`.
async fn reconcile_tree(
    root: &Path,
    index: &Arc<Mutex<Connection>>,
    only: Option<CollectionId>,
) -> Result<(), StoreError> {
    let root = root.to_path_buf();
    let index = Arc::clone(index);
    tokio::task::spawn_blocking(move || {
        let conn = index.lock().expect("index mutex poisoned");

        let collection_ids: Vec<String> = match only {
            Some(id) => vec![id.0],
            None => {
                let mut stmt = conn.prepare("SELECT id FROM collections")?;
                stmt.query_map([], |row| row.get(0))?.collect::<Result<_, _>>()?
            }
        };

        for collection_id in collection_ids {
            let dir = root.join(&collection_id);
            if !dir.exists() {
                continue;
            }

            let mut seen_paths = std::collections::HashSet::new();
            let mut changed = false;

            for entry in WalkDir::new(&dir).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if relative == ".metadata.db" {
                    continue;
                }
                let (folder_path, filename) = split_relative(&relative);
                if crate::ids::validate_extension(&filename).is_err() {
                    continue;
                }

                let content = match std::fs::read_to_string(entry.path()) {
                    Ok(content) => content,
                    Err(_) => continue,
                };
                let hash = content_hash(content.as_bytes());
                seen_paths.insert(relative.clone());

                let existing: Option<(String, String)> = conn
                    .query_row(
                        "SELECT id, content_hash FROM files WHERE collection_id = ?1 AND folder_path = ?2 AND filename = ?3",
                        params![collection_id, folder_path, filename],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let now = now_rfc3339();
                match existing {
                    Some((_, existing_hash)) if existing_hash == hash => {}
                    Some((id, _)) => {
                        conn.execute(
                            "UPDATE files SET content_hash = ?1, byte_size = ?2, updated_at = ?3 WHERE id = ?4",
                            params![hash, content.len() as i64, now, id],
                        )?;
                        changed = true;
                    }
                    None => {
                        let id = new_id();
                        conn.execute(
                            "INSERT INTO files (id, collection_id, filename, folder_path, content, content_hash, source_url, created_at, updated_at, byte_size)
                             VALUES (?1, ?2, ?3, ?4, '', ?5, NULL, ?6, ?6, ?7)",
                            params![id, collection_id, filename, folder_path, hash, now, content.len() as i64],
                        )?;
                        changed = true;
                    }
                }
            }

            let mut stmt = conn.prepare(
                "SELECT id, folder_path, filename FROM files WHERE collection_id = ?1",
            )?;
            let known: Vec<(String, String, String)> = stmt
                .query_map(params![collection_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            for (id, folder_path, filename) in known {
                let relative = if folder_path.is_empty() {
                    filename.clone()
                } else {
                    format!("{folder_path}/{filename}")
                };
                if !seen_paths.contains(&relative) {
                    conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
                    changed = true;
                }
            }

            let now = now_rfc3339();
            conn.execute(
                "UPDATE collections SET
                    file_count = (SELECT count(*) FROM files WHERE collection_id = ?1),
                    total_size = (SELECT coalesce(sum(byte_size), 0) FROM files WHERE collection_id = ?1),
                    updated_at = ?2
                 WHERE id = ?1",
                params![collection_id, now],
            )?;

            if changed {
                conn.execute(
                    "INSERT INTO sync_status (collection_id, state) VALUES (?1, 'out_of_sync')
                     ON CONFLICT(collection_id) DO UPDATE SET state = 'out_of_sync'",
                    params![collection_id],
                )?;
            }
        }

        Ok::<_, StoreError>(())
    })
    .await
    .map_err(|err| {
        tracing::error!(error = %err, "reconciliation task panicked");
        StoreError::Db(rusqlite::Error::ExecuteReturnedResults)
    })?
}

fn split_relative(relative: &str) -> (String, String) {
    match relative.rfind('/') {
        Some(idx) => (relative[..idx].to_string(), relative[idx + 1..].to_string()),
        None => (String::new(), relative.to_string()),
    }
}

#[async_trait]
impl CollectionStore for FsCollectionStore {
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

        std::fs::create_dir_all(self.collection_dir(&CollectionId(id.clone())))?;

        let name = trimmed.to_string();
        let description = description.to_string();
        self.with_index(move |conn| {
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
        self.with_index(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM collections ORDER BY name")?;
            let rows = stmt.query_map([], row_to_collection)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_collection(&self, id: &CollectionId) -> Result<Collection, StoreError> {
        let id = id.0.clone();
        self.with_index(move |conn| {
            conn.query_row("SELECT * FROM collections WHERE id = ?1", params![id], row_to_collection)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("collection '{id}' not found")))
        })
        .await
    }

    async fn delete_collection(&self, id: &CollectionId) -> Result<(), StoreError> {
        let dir = self.collection_dir(id);
        let id_str = id.0.clone();
        self.with_index(move |conn| {
            let deleted = conn.execute("DELETE FROM collections WHERE id = ?1", params![id_str.clone()])?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("collection '{id_str}' not found")));
            }
            Ok(())
        })
        .await?;
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
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

        let dir = self.collection_dir(collection);
        if !dir.exists() {
            return Err(StoreError::NotFound(format!("collection '{}' not found", collection.0)));
        }

        let target_dir = if folder_path.is_empty() { dir.clone() } else { dir.join(folder_path) };
        std::fs::create_dir_all(&target_dir)?;
        let target_path = target_dir.join(filename);
        std::fs::write(&target_path, content)?;

        let collection_id = collection.0.clone();
        let folder_path = folder_path.to_string();
        let filename = filename.to_string();
        let content_owned = content.to_string();
        let source_url = source_url.map(|s| s.to_string());

        let mut record = self
            .with_index(move |conn| {
                let existing_id: Option<String> = conn
                    .query_row(
                        "SELECT id FROM files WHERE collection_id = ?1 AND folder_path = ?2 AND filename = ?3",
                        params![collection_id, folder_path, filename],
                        |row| row.get(0),
                    )
                    .optional()?;

                let now = now_rfc3339();
                let hash = content_hash(content_owned.as_bytes());
                let byte_size = content_owned.len() as i64;

                let tx = conn.unchecked_transaction()?;
                let file_id = match existing_id {
                    Some(id) => {
                        tx.execute(
                            "UPDATE files SET content_hash = ?1, source_url = ?2, updated_at = ?3, byte_size = ?4 WHERE id = ?5",
                            params![hash, source_url, now, byte_size, id],
                        )?;
                        id
                    }
                    None => {
                        let id = new_id();
                        tx.execute(
                            "INSERT INTO files (id, collection_id, filename, folder_path, content, content_hash, source_url, created_at, updated_at, byte_size)
                             VALUES (?1, ?2, ?3, ?4, '', ?5, ?6, ?7, ?7, ?8)",
                            params![id, collection_id, filename, folder_path, hash, source_url, now, byte_size],
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

                conn.query_row("SELECT * FROM files WHERE id = ?1", params![file_id], row_to_file_meta)
                    .map_err(StoreError::from)
            })
            .await?;

        record.content = content.to_string();
        Ok(record)
    }

    async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, StoreError> {
        let id = file_id.0.clone();
        let mut record = self
            .with_index(move |conn| {
                conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file_meta)
                    .optional()?
                    .ok_or_else(|| StoreError::NotFound(format!("file '{id}' not found")))
            })
            .await?;

        let path = self.collection_dir(&record.collection_id).join(record.full_path());
        record.content = std::fs::read_to_string(path)?;
        Ok(record)
    }

    async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, StoreError> {
        let id = file_id.0.clone();
        let meta = self
            .with_index({
                let id = id.clone();
                move |conn| {
                    conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file_meta)
                        .optional()?
                        .ok_or_else(|| StoreError::NotFound(format!("file '{id}' not found")))
                }
            })
            .await?;

        let path = self.collection_dir(&meta.collection_id).join(meta.full_path());
        std::fs::write(&path, content)?;

        let collection_id = meta.collection_id.0.clone();
        let content_owned = content.to_string();
        let mut record = self
            .with_index(move |conn| {
                let now = now_rfc3339();
                let hash = content_hash(content_owned.as_bytes());
                let byte_size = content_owned.len() as i64;
                let tx = conn.unchecked_transaction()?;
                tx.execute(
                    "UPDATE files SET content_hash = ?1, updated_at = ?2, byte_size = ?3 WHERE id = ?4",
                    params![hash, now, byte_size, id],
                )?;
                tx.execute(
                    "UPDATE collections SET
                        total_size = (SELECT coalesce(sum(byte_size), 0) FROM files WHERE collection_id = ?1),
                        updated_at = ?2
                     WHERE id = ?1",
                    params![collection_id, now],
                )?;
                tx.commit()?;
                conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file_meta)
                    .map_err(StoreError::from)
            })
            .await?;

        record.content = content.to_string();
        Ok(record)
    }

    async fn delete_file(&self, file_id: &FileId) -> Result<(), StoreError> {
        let id = file_id.0.clone();
        let meta = self
            .with_index({
                let id = id.clone();
                move |conn| {
                    conn.query_row("SELECT * FROM files WHERE id = ?1", params![id], row_to_file_meta)
                        .optional()?
                        .ok_or_else(|| StoreError::NotFound(format!("file '{id}' not found")))
                }
            })
            .await?;

        let path = self.collection_dir(&meta.collection_id).join(meta.full_path());

        let collection_id = meta.collection_id.0.clone();
        self.with_index(move |conn| {
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
        .await?;

        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, StoreError> {
        let collection_id = collection.0.clone();
        self.with_index(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM files WHERE collection_id = ?1 ORDER BY folder_path, filename",
            )?;
            let rows = stmt
                .query_map(params![collection_id], row_to_file_meta)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn reconcile_now(&self, collection: Option<&CollectionId>) -> Result<(), StoreError> {
        reconcile_tree(&self.root, &self.index, collection.cloned()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FsCollectionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCollectionStore::new(dir.path().to_str().unwrap(), 0).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_and_read_file_round_trips_content() {
        let (_dir, store) = temp_store();
        let collection = store.create_collection("docs", "").await.unwrap();
        let saved = store
            .save_file(&collection.id, "notes", "a.md", "hello world", None)
            .await
            .unwrap();

        let read_back = store.read_file(&saved.id).await.unwrap();
        assert_eq!(read_back.content, "hello world");
    }

    #[tokio::test]
    async fn reconcile_detects_externally_added_file() {
        let (dir, store) = temp_store();
        let collection = store.create_collection("docs", "").await.unwrap();

        let external_path = dir.path().join(&collection.id.0).join("external.md");
        std::fs::write(&external_path, "added outside the API").unwrap();

        store.reconcile_now(Some(&collection.id)).await.unwrap();

        let files = store.list_files(&collection.id).await.unwrap();
        assert!(files.iter().any(|f| f.filename == "external.md"));
    }

    #[tokio::test]
    async fn reconcile_detects_externally_removed_file() {
        let (dir, store) = temp_store();
        let collection = store.create_collection("docs", "").await.unwrap();
        store.save_file(&collection.id, "", "a.md", "content", None).await.unwrap();

        std::fs::remove_file(dir.path().join(&collection.id.0).join("a.md")).unwrap();
        store.reconcile_now(Some(&collection.id)).await.unwrap();

        let files = store.list_files(&collection.id).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn delete_collection_removes_directory() {
        let (dir, store) = temp_store();
        let collection = store.create_collection("docs", "").await.unwrap();
        store.delete_collection(&collection.id).await.unwrap();
        assert!(!dir.path().join("docs").exists());
    }
}
