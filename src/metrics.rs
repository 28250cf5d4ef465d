//! Lightweight counters used for diagnostics across ingestion, sync, and query.
//!
//! `CodeMetrics` exposes lock-free atomic counters so it can be cloned freely and queried
//! without holding locks. The snapshot is surfaced via HTTP (`GET /api/metrics`) and MCP
//! (`metrics` resource) to help validate chunking heuristics and sync/query activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion, sync, and query activity.
#[derive(Default)]
pub struct CodeMetrics {
    files_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_size: AtomicU64,
    sync_runs: AtomicU64,
    sync_files_processed: AtomicU64,
    sync_errors: AtomicU64,
    queries_executed: AtomicU64,
    rag_queries_executed: AtomicU64,
}

impl CodeMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed file and the number of chunks produced for it.
    pub fn record_file(&self, chunk_count: u64, chunk_size: u64) {
        self.files_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_size.store(chunk_size, Ordering::Relaxed);
    }

    /// Record the completion of a sync run, including per-file counts and errors.
    pub fn record_sync(&self, files_processed: u64, errors: u64) {
        self.sync_runs.fetch_add(1, Ordering::Relaxed);
        self.sync_files_processed
            .fetch_add(files_processed, Ordering::Relaxed);
        self.sync_errors.fetch_add(errors, Ordering::Relaxed);
    }

    /// Record a vector-search query.
    pub fn record_query(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a RAG query.
    pub fn record_rag_query(&self) {
        self.rag_queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let files = self.files_indexed.load(Ordering::Relaxed);
        let last = self.last_chunk_size.load(Ordering::Relaxed);
        MetricsSnapshot {
            files_indexed: files,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_size: if files == 0 || last == 0 { None } else { Some(last) },
            sync_runs: self.sync_runs.load(Ordering::Relaxed),
            sync_files_processed: self.sync_files_processed.load(Ordering::Relaxed),
            sync_errors: self.sync_errors.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            rag_queries_executed: self.rag_queries_executed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of accumulated counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of files that have been indexed since startup.
    pub files_indexed: u64,
    /// Total chunk count produced across all indexed files.
    pub chunks_indexed: u64,
    /// Chunk-size target used for the most recently ingested file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_size: Option<u64>,
    /// Number of completed sync runs.
    pub sync_runs: u64,
    /// Total files processed across all sync runs.
    pub sync_files_processed: u64,
    /// Total per-file errors encountered across all sync runs.
    pub sync_errors: u64,
    /// Number of vector-search queries served.
    pub queries_executed: u64,
    /// Number of RAG queries served.
    pub rag_queries_executed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_files_and_chunks() {
        let metrics = CodeMetrics::new();
        metrics.record_file(2, 900);
        metrics.record_file(3, 950);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_indexed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.last_chunk_size, Some(950));
    }

    #[test]
    fn records_sync_and_query_counters() {
        let metrics = CodeMetrics::new();
        metrics.record_sync(4, 1);
        metrics.record_query();
        metrics.record_rag_query();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sync_runs, 1);
        assert_eq!(snapshot.sync_files_processed, 4);
        assert_eq!(snapshot.sync_errors, 1);
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.rag_queries_executed, 1);
    }

    #[test]
    fn snapshot_is_consistent_at_rest() {
        let metrics = CodeMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_indexed, 0);
        assert_eq!(snapshot.last_chunk_size, None);
    }
}
