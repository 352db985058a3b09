//! Content-addressed cache of compiled block artifacts.
//!
//! Shared by every document of a loading graph (cloning shares storage).
//! Each key owns an async mutex, so concurrent requests for the same block
//! collapse onto one compilation: the first caller computes, the others
//! wait and then read the stored artifact.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Which compiler produced an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Script,
    Template,
    Style,
}

/// `(document hash, block kind, block content)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document_hash: String,
    pub kind: BlockKind,
    pub content: String,
}

impl CacheKey {
    pub fn new(document_hash: &str, kind: BlockKind, content: &str) -> Self {
        Self {
            document_hash: document_hash.to_string(),
            kind,
            content: content.to_string(),
        }
    }
}

/// A compiled script or template: its dependency specifiers and the
/// CommonJS source ready for instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub deps: Vec<String>,
    pub source: String,
}

/// Handed to a compute step so it can veto storing its own result.
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    prevented: Arc<AtomicBool>,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not store the result being computed.
    pub fn prevent_cache(&self) {
        self.prevented.store(true, Ordering::SeqCst);
    }

    pub fn is_prevented(&self) -> bool {
        self.prevented.load(Ordering::SeqCst)
    }
}

type Slot<T> = Arc<Mutex<Option<T>>>;

struct Slots<T> {
    inner: DashMap<CacheKey, Slot<T>>,
}

impl<T: Clone> Slots<T> {
    fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    fn slot(&self, key: &CacheKey) -> Slot<T> {
        // The shard guard is dropped before anything is awaited.
        self.inner.entry(key.clone()).or_default().clone()
    }

    async fn with_cache<E, F, Fut>(&self, key: CacheKey, compute: F) -> Result<T, E>
    where
        F: FnOnce(CacheControl) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(&key);
        let outcome = {
            let mut stored = slot.lock().await;
            if let Some(hit) = stored.as_ref() {
                tracing::debug!(kind = ?key.kind, hash = %key.document_hash, "compiled cache hit");
                return Ok(hit.clone());
            }

            tracing::debug!(kind = ?key.kind, hash = %key.document_hash, "compiled cache miss");
            let control = CacheControl::new();
            match compute(control.clone()).await {
                Ok(result) if !control.is_prevented() => {
                    *stored = Some(result.clone());
                    return Ok(result);
                }
                outcome => outcome,
            }
        };
        tracing::debug!(kind = ?key.kind, hash = %key.document_hash, "result not cached");
        self.release(&key, slot);
        outcome
    }

    /// Forget an empty slot that no other caller holds.
    fn release(&self, key: &CacheKey, slot: Slot<T>) {
        drop(slot);
        self.inner.remove_if(key, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|stored| stored.is_none())
        });
    }

    fn stored(&self) -> usize {
        self.inner
            .iter()
            .filter(|entry| entry.value().try_lock().is_ok_and(|slot| slot.is_some()))
            .count()
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.inner.get(key).is_some_and(|slot| {
            slot.value()
                .try_lock()
                .map_or(false, |stored| stored.is_some())
        })
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

/// Compiled modules and stylesheets keyed by content.
#[derive(Clone)]
pub struct CompiledCache {
    modules: Arc<Slots<CompiledModule>>,
    styles: Arc<Slots<String>>,
}

impl CompiledCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            modules: Arc::new(Slots::new()),
            styles: Arc::new(Slots::new()),
        }
    }

    /// Return the cached module for `key`, or run `compute` and store its
    /// result unless it failed or called [`CacheControl::prevent_cache`].
    pub async fn module<E, F, Fut>(&self, key: CacheKey, compute: F) -> Result<CompiledModule, E>
    where
        F: FnOnce(CacheControl) -> Fut,
        Fut: Future<Output = Result<CompiledModule, E>>,
    {
        self.modules.with_cache(key, compute).await
    }

    /// Same contract as [`CompiledCache::module`] for compiled CSS.
    pub async fn style<E, F, Fut>(&self, key: CacheKey, compute: F) -> Result<String, E>
    where
        F: FnOnce(CacheControl) -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        self.styles.with_cache(key, compute).await
    }

    /// Whether an artifact is stored for `key`. A key whose compute is in
    /// flight reports `false`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        match key.kind {
            BlockKind::Style => self.styles.contains(key),
            BlockKind::Script | BlockKind::Template => self.modules.contains(key),
        }
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.modules.stored() + self.styles.stored()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored artifact.
    pub fn clear(&self) {
        self.modules.clear();
        self.styles.clear();
    }
}

impl Default for CompiledCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompiledCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledCache")
            .field("modules", &self.modules.inner.len())
            .field("styles", &self.styles.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn module(source: &str) -> CompiledModule {
        CompiledModule {
            deps: Vec::new(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        let cache = CompiledCache::new();
        let key = CacheKey::new("h", BlockKind::Script, "export default {}");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..2 {
            let result: Result<_, ()> = cache
                .module(key.clone(), move |_| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(module("compiled"))
                })
                .await;
            assert_eq!(result.unwrap().source, "compiled");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains(&key));
    }

    #[tokio::test]
    async fn prevented_results_are_recomputed() {
        let cache = CompiledCache::new();
        let key = CacheKey::new("h", BlockKind::Template, "<div>");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..2 {
            let _: Result<_, ()> = cache
                .module(key.clone(), move |control| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    control.prevent_cache();
                    Ok(module("broken"))
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn errors_are_not_stored() {
        let cache = CompiledCache::new();
        let key = CacheKey::new("h", BlockKind::Script, "bad");
        let first: Result<CompiledModule, &str> = cache.module(key.clone(), |_| async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));
        let second: Result<CompiledModule, &str> =
            cache.module(key, |_| async { Ok(module("ok")) }).await;
        assert_eq!(second.unwrap().source, "ok");
    }

    #[tokio::test]
    async fn unstored_results_release_their_slot() {
        let cache = CompiledCache::new();
        let failing = CacheKey::new("h", BlockKind::Script, "bad");
        let prevented = CacheKey::new("h", BlockKind::Style, "..a {}");

        let _: Result<CompiledModule, &str> = cache.module(failing, |_| async { Err("boom") }).await;
        let _: Result<String, ()> = cache
            .style(prevented, |control| async move {
                control.prevent_cache();
                Ok("..a {}".to_string())
            })
            .await;
        assert_eq!(cache.modules.inner.len(), 0);
        assert_eq!(cache.styles.inner.len(), 0);

        let stored = CacheKey::new("h", BlockKind::Script, "good");
        let _: Result<_, ()> = cache.module(stored, |_| async { Ok(module("ok")) }).await;
        assert_eq!(cache.modules.inner.len(), 1);
    }

    #[tokio::test]
    async fn block_kind_separates_artifacts() {
        let cache = CompiledCache::new();
        let script = CacheKey::new("h", BlockKind::Script, "same");
        let template = CacheKey::new("h", BlockKind::Template, "same");
        let _: Result<_, ()> = cache.module(script, |_| async { Ok(module("s")) }).await;
        let out: Result<_, ()> = cache.module(template, |_| async { Ok(module("t")) }).await;
        assert_eq!(out.unwrap().source, "t");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_compute_once() {
        let cache = CompiledCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("h", BlockKind::Style, ".a{}");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    cache
                        .style(key, |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, ()>(".a{}".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), ".a{}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_empties_both_maps() {
        let cache = CompiledCache::new();
        cache.clear();
        assert!(cache.is_empty());
    }
}
