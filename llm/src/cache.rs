//! Summary cache keyed by node and body fingerprint.
//!
//! An entry is only served while its fingerprint matches the node's current
//! body. Computation for one key is serialized so concurrent callers never
//! issue duplicate model calls for the same fingerprint, and a failed,
//! timed-out or cancelled computation leaves the cache untouched.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use paperindex_doc_tree::{CachedSummary, Node, NodeId};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LlmError, Result};

/// Identifies a node across documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryKey {
    pub document_id: String,
    pub node_id: NodeId,
}

impl SummaryKey {
    pub fn new(document_id: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        Self {
            document_id: document_id.into(),
            node_id: node_id.into(),
        }
    }
}

/// Cache entry for a node summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(flatten)]
    pub key: SummaryKey,

    /// Fingerprint of the body the summary was computed from.
    pub fingerprint: String,

    /// The summary text.
    pub summary: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// Cache for node summaries to avoid redundant model calls.
#[derive(Debug, Default)]
pub struct SummaryCache {
    /// In-memory cache.
    entries: RwLock<HashMap<SummaryKey, SummaryEntry>>,

    /// One writer lock per key.
    writers: Mutex<HashMap<SummaryKey, Arc<Mutex<()>>>>,

    /// Path for persistent cache storage.
    cache_path: Option<PathBuf>,

    /// Deadline for a single computation.
    compute_timeout: Option<Duration>,

    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    replaced: AtomicU64,
}

impl SummaryCache {
    /// Create a new in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache backed by a JSON file, loading it if present.
    pub async fn with_persistence(path: impl AsRef<Path>) -> Result<Self> {
        let cache = Self {
            cache_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        };
        cache.load().await?;
        Ok(cache)
    }

    /// Bound every computation by `timeout`.
    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = Some(timeout);
        self
    }

    /// The cached summary for a node, if it matches the current body.
    pub async fn get(&self, document_id: &str, node: &Node) -> Option<String> {
        let key = SummaryKey::new(document_id, node.id.as_str());
        let fingerprint = node.fingerprint();
        self.lookup(&key, &fingerprint).await
    }

    /// The cached summary in the form attached to tree nodes.
    pub async fn cached_summary(&self, document_id: &str, node: &Node) -> Option<CachedSummary> {
        let fingerprint = node.fingerprint();
        self.get(document_id, node)
            .await
            .map(|text| CachedSummary::new(text, fingerprint))
    }

    async fn lookup(&self, key: &SummaryKey, fingerprint: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| entry.summary.clone())
    }

    /// Return the cached summary or compute, store and return a new one.
    pub async fn get_or_compute<F, Fut>(
        &self,
        document_id: &str,
        node: &Node,
        compute: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        self.get_or_compute_cancellable(document_id, node, compute, &CancellationToken::new())
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), aborting the
    /// computation when `cancel` fires.
    pub async fn get_or_compute_cancellable<F, Fut>(
        &self,
        document_id: &str,
        node: &Node,
        compute: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let key = SummaryKey::new(document_id, node.id.as_str());
        let fingerprint = node.fingerprint();

        if let Some(summary) = self.lookup(&key, &fingerprint).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(summary);
        }

        let writer = self.writer(&key).await;
        let result = self
            .compute_locked(key.clone(), fingerprint, &writer, compute, cancel)
            .await;
        self.release_writer(&key, writer).await;
        result
    }

    async fn compute_locked<F, Fut>(
        &self,
        key: SummaryKey,
        fingerprint: String,
        writer: &Mutex<()>,
        compute: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let _guard = tokio::select! {
            guard = writer.lock() => guard,
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
        };

        // Another caller may have filled the entry while we waited.
        if let Some(summary) = self.lookup(&key, &fingerprint).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(summary);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Summary cache miss for {}/{}", key.document_id, key.node_id);

        let outcome = tokio::select! {
            result = self.run_compute(compute) => result,
            () = cancel.cancelled() => Err(LlmError::Cancelled),
        };

        match outcome {
            Ok(summary) => {
                self.store(key, fingerprint, summary.clone()).await;
                Ok(summary)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn run_compute<F, Fut>(&self, compute: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        match self.compute_timeout {
            Some(timeout) => tokio::time::timeout(timeout, compute())
                .await
                .unwrap_or(Err(LlmError::Timeout(timeout))),
            None => compute().await,
        }
    }

    async fn writer(&self, key: &SummaryKey) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        Arc::clone(writers.entry(key.clone()).or_default())
    }

    /// Drop the writer lock for `key` once no other caller holds it.
    async fn release_writer(&self, key: &SummaryKey, writer: Arc<Mutex<()>>) {
        let mut writers = self.writers.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&writer) == 2 {
            writers.remove(key);
        }
    }

    /// Keep a computed summary. A failed write to disk is logged; the
    /// in-memory entry stays valid.
    async fn store(&self, key: SummaryKey, fingerprint: String, summary: String) {
        let entry = SummaryEntry {
            key: key.clone(),
            fingerprint,
            summary,
            created_at: Utc::now(),
        };

        let previous = self.entries.write().await.insert(key, entry);
        if let Some(previous) = previous {
            self.replaced.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Replaced stale summary for {}/{}",
                previous.key.document_id, previous.key.node_id
            );
        }

        if self.cache_path.is_some()
            && let Err(e) = self.save().await
        {
            warn!("Failed to persist summary cache: {e}");
        }
    }

    /// Remove the entry for a node.
    pub async fn invalidate(&self, document_id: &str, node_id: &str) -> bool {
        let key = SummaryKey::new(document_id, node_id);
        self.entries.write().await.remove(&key).is_some()
    }

    /// Get the raw entry for a node, whatever its fingerprint.
    pub async fn entry(&self, document_id: &str, node_id: &str) -> Option<SummaryEntry> {
        let key = SummaryKey::new(document_id, node_id);
        self.entries.read().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        info!("Cleared summary cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
        }
    }

    /// Save cache to disk.
    pub async fn save(&self) -> Result<()> {
        if let Some(ref path) = self.cache_path {
            let entries: Vec<SummaryEntry> = {
                let cache = self.entries.read().await;
                let sorted: BTreeMap<&SummaryKey, &SummaryEntry> = cache.iter().collect();
                sorted.into_values().cloned().collect()
            };
            let content = serde_json::to_string_pretty(&entries)?;

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }

            fs::write(path, content).await?;
            debug!("Saved {} summary entries to disk", entries.len());
        }
        Ok(())
    }

    /// Load cache from disk.
    async fn load(&self) -> Result<()> {
        if let Some(ref path) = self.cache_path {
            if path.exists() {
                let content = fs::read_to_string(path).await?;
                let entries: Vec<SummaryEntry> = serde_json::from_str(&content)?;

                let mut cache = self.entries.write().await;
                for entry in entries {
                    cache.insert(entry.key.clone(), entry);
                }

                info!("Loaded {} summary entries from disk", cache.len());
            }
        }
        Ok(())
    }
}

/// Statistics about the summary cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Lookups served from the cache.
    pub hits: u64,

    /// Lookups that required a computation.
    pub misses: u64,

    /// Computations that failed, timed out or were cancelled.
    pub failures: u64,

    /// Entries overwritten because the body changed.
    pub replaced: u64,
}
