//! Collection storage: two interchangeable backends (embedded database, filesystem + sidecar
//! metadata) behind one [`CollectionStore`] trait.

pub mod db;
pub mod fs;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CollectionId, FileId};

/// Errors raised by a collection store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced collection or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Caller-supplied input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Filesystem I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The embedded database failed.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// A named container for files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Stable id, equal to `sanitize_name(name)`.
    pub id: CollectionId,
    /// Human-readable, unique display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// RFC-3339 creation timestamp.
    pub created_at: String,
    /// RFC-3339 last-update timestamp.
    pub updated_at: String,
    /// Number of files currently in the collection.
    pub file_count: u64,
    /// Aggregate byte size of all files in the collection.
    pub total_size: u64,
    /// Free-form metadata, serialized as a JSON object.
    pub metadata: serde_json::Value,
}

/// A text document inside a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable file id.
    pub id: FileId,
    /// Owning collection id.
    pub collection_id: CollectionId,
    /// Filename, including extension.
    pub filename: String,
    /// Folder path relative to the collection root (possibly empty, never `..`).
    pub folder_path: String,
    /// UTF-8 file content.
    pub content: String,
    /// Content hash (SHA-256 hex) of `content`.
    pub content_hash: String,
    /// Optional originating URL, when the file was crawled rather than authored locally.
    pub source_url: Option<String>,
    /// RFC-3339 creation timestamp.
    pub created_at: String,
    /// RFC-3339 last-update timestamp.
    pub updated_at: String,
    /// Byte size of `content`.
    pub byte_size: u64,
}

impl FileRecord {
    /// The full relative path, joining `folder_path` and `filename`.
    pub fn full_path(&self) -> String {
        if self.folder_path.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.folder_path.trim_end_matches('/'), self.filename)
        }
    }
}

/// Interface implemented by both collection-store backends.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create a new, empty collection. Fails with `Conflict` if the name already exists.
    async fn create_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Collection, StoreError>;

    /// List all collections.
    async fn list_collections(&self) -> Result<Vec<Collection>, StoreError>;

    /// Fetch a single collection by id.
    async fn get_collection(&self, id: &CollectionId) -> Result<Collection, StoreError>;

    /// Delete a collection and cascade-delete its files.
    async fn delete_collection(&self, id: &CollectionId) -> Result<(), StoreError>;

    /// Create or overwrite a file at `(collection, folder_path, filename)`.
    async fn save_file(
        &self,
        collection: &CollectionId,
        folder_path: &str,
        filename: &str,
        content: &str,
        source_url: Option<&str>,
    ) -> Result<FileRecord, StoreError>;

    /// Read a file's current record.
    async fn read_file(&self, file_id: &FileId) -> Result<FileRecord, StoreError>;

    /// Replace a file's content in place, preserving its id and path.
    async fn update_file(&self, file_id: &FileId, content: &str) -> Result<FileRecord, StoreError>;

    /// Delete a file.
    async fn delete_file(&self, file_id: &FileId) -> Result<(), StoreError>;

    /// List all files in a collection.
    async fn list_files(&self, collection: &CollectionId) -> Result<Vec<FileRecord>, StoreError>;

    /// Reconcile stored metadata against external edits (filesystem backend only).
    ///
    /// The embedded-database backend has no external edit surface, so the default
    /// implementation is a no-op; `FsCollectionStore` overrides it to walk the filesystem.
    async fn reconcile_now(&self, _collection: Option<&CollectionId>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Construct the configured collection-store backend.
pub fn build_store(config: &crate::config::Config) -> Result<Arc<dyn CollectionStore>, StoreError> {
    match config.collection_storage_type {
        crate::config::StorageBackend::EmbeddedDb => {
            Ok(Arc::new(db::DbCollectionStore::new(&config.collection_storage_path)?))
        }
        crate::config::StorageBackend::Filesystem => Ok(Arc::new(fs::FsCollectionStore::new(
            &config.collection_storage_path,
            config.fs_reconcile_poll_interval_secs,
        )?)),
    }
}
