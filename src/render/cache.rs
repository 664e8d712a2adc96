//! Fingerprint-keyed render cache
//!
//! Rendered pages are stored on disk (see [`CacheStorage`]) and indexed in an
//! LRU map. The index is the source of truth: an entry is valid exactly while
//! it is present in the index.
//!
//! # Concurrency
//!
//! * At most one render runs per fingerprint. Concurrent misses queue on a
//!   per-fingerprint async mutex and re-check the index once they get it.
//! * Every page has a generation, bumped on each invalidation. A render
//!   snapshots the generation with its target and only stores its output if
//!   the generation is unchanged, so a render that raced a mutation never
//!   lands in the index.
//! * Unrelated fingerprints render in parallel on the blocking pool.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;

use super::fingerprint::{content_hash, Fingerprint};
use super::pipeline::{RenderPipeline, RenderedImage};
use super::storage::CacheStorage;
use crate::document::{DocumentId, PageId, VersionId};
use crate::error::{CoreError, Result};
use crate::transform::TransformationKind;

/// Files younger than this are never treated as orphans
const ORPHAN_GRACE: Duration = Duration::from_secs(60);

/// Invalidation generation of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    page: u64,
}

/// Everything needed to render one page under one stack
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub document_id: DocumentId,
    pub version_id: VersionId,
    pub page_id: PageId,
    /// Untransformed page source
    pub source: Arc<Vec<u8>>,
    pub stack: Vec<TransformationKind>,
    pub generation: Generation,
}

impl RenderTarget {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self.version_id, self.page_id, &self.stack)
    }
}

/// Index entry for one rendered page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub document_id: DocumentId,
    pub version_id: VersionId,
    pub page_id: PageId,
    pub size: usize,
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Page rendered under its current stack
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub fingerprint: Fingerprint,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// True when served from the cache without rendering
    pub cache_hit: bool,
}

impl RenderedPage {
    pub fn content_type(&self) -> &'static str {
        RenderedImage::CONTENT_TYPE
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Pipeline executions started
    pub renders: u64,
}

#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<RenderCacheInner>,
}

struct RenderCacheInner {
    storage: CacheStorage,
    pipeline: Arc<dyn RenderPipeline>,
    render_timeout: Duration,
    state: Mutex<CacheState>,
    in_flight: Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    renders: AtomicU64,
}

struct CacheState {
    entries: LruCache<Fingerprint, CacheEntry>,
    /// Bumped by a full clear
    epoch: u64,
    page_generations: HashMap<PageId, u64>,
}

impl CacheState {
    fn generation(&self, page_id: PageId) -> Generation {
        Generation {
            epoch: self.epoch,
            page: self.page_generations.get(&page_id).copied().unwrap_or(0),
        }
    }
}

impl RenderCache {
    pub fn new(
        base_path: PathBuf,
        pipeline: Arc<dyn RenderPipeline>,
        capacity: usize,
        render_timeout: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(RenderCacheInner {
                storage: CacheStorage::new(base_path),
                pipeline,
                render_timeout,
                state: Mutex::new(CacheState {
                    entries: LruCache::new(capacity),
                    epoch: 0,
                    page_generations: HashMap::new(),
                }),
                in_flight: Mutex::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                renders: AtomicU64::new(0),
            }),
        }
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    /// Current generation of a page, captured when building a target
    pub fn generation(&self, page_id: PageId) -> Generation {
        self.inner.state.lock().generation(page_id)
    }

    /// Serve a page, rendering it on a miss
    pub async fn get(&self, target: &RenderTarget) -> Result<RenderedPage> {
        let fingerprint = target.fingerprint();
        if let Some(hit) = self.lookup(&fingerprint).await {
            return Ok(hit);
        }
        self.render_and_store(target, fingerprint).await
    }

    /// Return a valid entry without rendering
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<RenderedPage> {
        let entry = self.inner.state.lock().entries.get(fingerprint).cloned()?;

        match self.inner.storage.read(&entry.path).await {
            Ok(data) if content_hash(&data) == entry.content_hash => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(fingerprint = %fingerprint, "Render cache hit");
                Some(RenderedPage {
                    fingerprint: fingerprint.clone(),
                    data,
                    width: entry.width,
                    height: entry.height,
                    cache_hit: true,
                })
            }
            outcome => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = ?outcome.err(),
                    "Cache file missing or corrupt; dropping entry"
                );
                let dropped = {
                    let mut state = self.inner.state.lock();
                    let same_entry = state
                        .entries
                        .peek(fingerprint)
                        .is_some_and(|current| current.created_at == entry.created_at);
                    same_entry && state.entries.pop(fingerprint).is_some()
                };
                if dropped {
                    self.inner.storage.remove(&entry.path).await;
                }
                None
            }
        }
    }

    async fn render_and_store(
        &self,
        target: &RenderTarget,
        fingerprint: Fingerprint,
    ) -> Result<RenderedPage> {
        let _flight = self.acquire_flight(&fingerprint).await;

        // Another request may have finished this fingerprint while we waited
        if let Some(hit) = self.lookup(&fingerprint).await {
            return Ok(hit);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            fingerprint = %fingerprint,
            page_id = %target.page_id,
            operations = target.stack.len(),
            "Render cache miss"
        );

        let rendered = self.render_with_timeout(target).await?;
        self.store(target, fingerprint, rendered).await
    }

    async fn render_with_timeout(&self, target: &RenderTarget) -> Result<RenderedImage> {
        let pipeline = self.inner.pipeline.clone();
        let source = target.source.clone();
        let stack = target.stack.clone();

        self.inner.renders.fetch_add(1, Ordering::Relaxed);

        // The blocking task may keep running after a timeout, but the caller
        // gets an answer
        let result = timeout(
            self.inner.render_timeout,
            tokio::task::spawn_blocking(move || pipeline.render(&source, &stack)),
        )
        .await;

        match result {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(join_error)) => {
                Err(CoreError::Render(format!("Task join error: {}", join_error)))
            }
            Err(_) => {
                tracing::warn!(
                    page_id = %target.page_id,
                    timeout_secs = self.inner.render_timeout.as_secs(),
                    "Render timed out"
                );
                Err(CoreError::RenderTimeout(self.inner.render_timeout.as_secs()))
            }
        }
    }

    async fn store(
        &self,
        target: &RenderTarget,
        fingerprint: Fingerprint,
        rendered: RenderedImage,
    ) -> Result<RenderedPage> {
        let path = self.inner.storage.write(&fingerprint, &rendered.data).await?;

        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            document_id: target.document_id,
            version_id: target.version_id,
            page_id: target.page_id,
            size: rendered.data.len(),
            content_hash: content_hash(&rendered.data),
            width: rendered.width,
            height: rendered.height,
            created_at: Utc::now(),
            path: path.clone(),
        };

        let evicted = {
            let mut state = self.inner.state.lock();
            if state.generation(target.page_id) != target.generation {
                None
            } else {
                Some(state.entries.push(fingerprint.clone(), entry))
            }
        };

        match evicted {
            None => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    page_id = %target.page_id,
                    "Page invalidated during render; result not cached"
                );
                self.inner.storage.remove(&path).await;
            }
            Some(Some((evicted_key, evicted_entry))) if evicted_key != fingerprint => {
                self.inner.storage.remove(&evicted_entry.path).await;
            }
            Some(_) => {}
        }

        Ok(RenderedPage {
            fingerprint,
            data: rendered.data,
            width: rendered.width,
            height: rendered.height,
            cache_hit: false,
        })
    }

    async fn acquire_flight(&self, fingerprint: &Fingerprint) -> FlightGuard<'_> {
        let lock = {
            let mut in_flight = self.inner.in_flight.lock();
            in_flight
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        FlightGuard {
            fingerprint: fingerprint.clone(),
            in_flight: &self.inner.in_flight,
            permit: Some(lock.lock_owned().await),
        }
    }

    /// Invalidate every entry of one page
    pub async fn invalidate_page(&self, page_id: PageId) -> usize {
        self.invalidate_pages(&[page_id]).await
    }

    /// Invalidate every entry of the given pages
    ///
    /// Entries leave the index before this returns; their files are removed
    /// afterwards.
    pub async fn invalidate_pages(&self, page_ids: &[PageId]) -> usize {
        let removed: Vec<PathBuf> = {
            let mut state = self.inner.state.lock();
            let pages: HashSet<&PageId> = page_ids.iter().collect();

            for page_id in page_ids {
                *state.page_generations.entry(*page_id).or_insert(0) += 1;
            }

            let stale: Vec<Fingerprint> = state
                .entries
                .iter()
                .filter(|(_, entry)| pages.contains(&entry.page_id))
                .map(|(fingerprint, _)| fingerprint.clone())
                .collect();

            stale
                .iter()
                .filter_map(|fingerprint| state.entries.pop(fingerprint))
                .map(|entry| entry.path)
                .collect()
        };

        if !removed.is_empty() {
            tracing::debug!(
                pages = page_ids.len(),
                entries = removed.len(),
                "Invalidated cache entries"
            );
        }
        self.inner.storage.remove_many(&removed).await;
        removed.len()
    }

    /// Remove every entry ("clear image cache")
    pub async fn clear(&self) -> usize {
        let removed: Vec<PathBuf> = {
            let mut state = self.inner.state.lock();
            // The new epoch already outdates every captured target
            state.epoch += 1;
            state.page_generations.clear();
            let paths = state.entries.iter().map(|(_, entry)| entry.path.clone()).collect();
            state.entries.clear();
            paths
        };

        self.inner.storage.remove_many(&removed).await;
        let orphans = self.purge_orphaned_files().await;
        tracing::info!(entries = removed.len(), orphans = orphans, "Cleared render cache");
        removed.len()
    }

    /// Delete files on disk that no index entry references
    pub async fn purge_orphaned_files(&self) -> usize {
        let files = match self.inner.storage.list_files(ORPHAN_GRACE).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan cache directory");
                return 0;
            }
        };

        let orphaned: Vec<PathBuf> = {
            let state = self.inner.state.lock();
            let known: HashSet<&PathBuf> =
                state.entries.iter().map(|(_, entry)| &entry.path).collect();
            files.into_iter().filter(|path| !known.contains(path)).collect()
        };

        let count = orphaned.len();
        if count > 0 {
            self.inner.storage.remove_many(&orphaned).await;
            tracing::info!(count = count, "Cleaned up orphaned cache files");
        }
        count
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.state.lock().entries.contains(fingerprint)
    }

    pub fn entries_for_page(&self, page_id: PageId) -> Vec<CacheEntry> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.page_id == page_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn entries_for_document(&self, document_id: DocumentId) -> Vec<CacheEntry> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.document_id == document_id)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = {
            let state = self.inner.state.lock();
            (state.entries.len(), state.entries.cap().get())
        };
        CacheStats {
            entries,
            capacity,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            renders: self.inner.renders.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive right to render one fingerprint
///
/// Drops the in-flight lock from the map once nobody else is waiting on it.
struct FlightGuard<'a> {
    fingerprint: Fingerprint,
    in_flight: &'a Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        let mut in_flight = self.in_flight.lock();
        let idle = in_flight
            .get(&self.fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            in_flight.remove(&self.fingerprint);
        }
    }
}
