//! Module loading.
//!
//! - `ModuleCache`: loaded modules by id, each id initialized at most once
//! - `resolve_path`: `(referencing file, specifier)` to module id
//! - `load_deps`: resolve a block's dependencies before instantiation
//! - `DocumentLoader`: default loader, compiles nested documents recursively
//!
//! **Cycles:** a task-local import chain records the documents currently
//! being compiled. Requesting one of them again fails with
//! [`LoaderError::CircularDependency`] instead of waiting on itself.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::runtime::Value;
use crate::{pipeline, LoaderError, Options};

/// Resolves `(referencing file, specifier)` to a module id.
pub type PathResolve = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// Module cache
// ---------------------------------------------------------------------------

/// Loaded modules by id. Cloning shares storage.
#[derive(Clone, Default)]
pub struct ModuleCache {
    inner: Arc<DashMap<String, Arc<OnceCell<Value>>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ModuleCache::insert`].
    pub fn with_module(self, id: impl Into<String>, module: Value) -> Self {
        self.insert(id, module);
        self
    }

    /// Register an already-loaded module (preprocessors, render helpers).
    pub fn insert(&self, id: impl Into<String>, module: Value) {
        self.inner
            .insert(id.into(), Arc::new(OnceCell::new_with(Some(module))));
    }

    /// The module loaded under `id`, if loading has completed.
    pub fn require(&self, id: &str) -> Option<Value> {
        self.inner.get(id).and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.require(id).is_some()
    }

    /// Ids of every loaded module.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.inner
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &str) -> Arc<OnceCell<Value>> {
        self.inner.entry(id.to_string()).or_default().clone()
    }
}

impl fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCache")
            .field("loaded", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Default resolver: `./` and `../` specifiers are joined to the directory
/// of `referrer` and normalized; anything else is already an id.
pub fn resolve_path(referrer: &str, specifier: &str) -> String {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return specifier.to_string();
    }
    let joined = match referrer.rfind('/') {
        Some(i) => format!("{}/{}", &referrer[..i], specifier),
        None => specifier.to_string(),
    };
    normalize(&joined)
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads a module by id. Implementations may call back into
/// [`create_module`](crate::create_module) for nested documents.
#[async_trait]
pub trait LoadModule: Send + Sync {
    async fn load_module(&self, id: &str, options: &Options) -> Result<Value, LoaderError>;
}

tokio::task_local! {
    static IMPORT_CHAIN: Arc<Vec<String>>;
}

fn current_chain() -> Arc<Vec<String>> {
    IMPORT_CHAIN.try_with(Arc::clone).unwrap_or_default()
}

/// Run `future` with `filename` on top of the import chain.
pub(crate) async fn within_document<F: Future>(filename: &str, future: F) -> F::Output {
    let chain = current_chain();
    if chain.last().is_some_and(|last| last == filename) {
        return future.await;
    }
    let mut next = chain.to_vec();
    next.push(filename.to_string());
    IMPORT_CHAIN.scope(Arc::new(next), future).await
}

/// Load every dependency of `referrer`, one after another, in list order.
pub async fn load_deps(
    referrer: &str,
    deps: &[String],
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<(), LoaderError> {
    for specifier in deps {
        load_dependency(referrer, specifier, options, loader).await?;
    }
    Ok(())
}

/// Resolve and load one dependency.
///
/// Already-loaded ids return immediately; concurrent requests for the same
/// id share one load.
pub async fn load_dependency(
    referrer: &str,
    specifier: &str,
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<Value, LoaderError> {
    let id = (options.path_resolve)(referrer, specifier);
    if let Some(module) = options.module_cache.require(&id) {
        return Ok(module);
    }

    let chain = current_chain();
    if chain.iter().any(|entry| entry == &id) {
        let mut cycle = chain.to_vec();
        cycle.push(id);
        return Err(LoaderError::CircularDependency { chain: cycle });
    }

    let mut next = chain.to_vec();
    next.push(id.clone());
    tracing::debug!(id = %id, referrer, "loading dependency");

    let slot = options.module_cache.slot(&id);
    slot.get_or_try_init(|| IMPORT_CHAIN.scope(Arc::new(next), loader.load_module(&id, options)))
        .await
        .cloned()
        .map_err(|err| match err {
            err @ (LoaderError::ModuleLoad { .. } | LoaderError::CircularDependency { .. }) => err,
            other => LoaderError::ModuleLoad {
                id: id.clone(),
                source: Box::new(other),
            },
        })
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where [`DocumentLoader`] reads module text from.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// `Ok(None)` when no module exists under `id`.
    async fn get_source(&self, id: &str) -> Result<Option<String>, LoaderError>;
}

/// Reads ids as paths below a root directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl SourceProvider for FsSource {
    async fn get_source(&self, id: &str) -> Result<Option<String>, LoaderError> {
        let Some(path) = self.path_of(id) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SourceProvider for HashMap<String, String> {
    async fn get_source(&self, id: &str) -> Result<Option<String>, LoaderError> {
        Ok(self.get(id).cloned())
    }
}

// ---------------------------------------------------------------------------
// DocumentLoader
// ---------------------------------------------------------------------------

/// Default [`LoadModule`]: `.vue` ids are compiled as documents,
/// `.js`/`.mjs`/`.cjs` ids as plain scripts.
#[derive(Debug, Clone)]
pub struct DocumentLoader<S> {
    source: S,
}

impl<S: SourceProvider> DocumentLoader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: SourceProvider> LoadModule for DocumentLoader<S> {
    async fn load_module(&self, id: &str, options: &Options) -> Result<Value, LoaderError> {
        let text = self
            .source
            .get_source(id)
            .await?
            .ok_or_else(|| LoaderError::ModuleNotFound(id.to_string()))?;
        // Normalize newlines to LF so positions and hashes are stable.
        let text = text.replace("\r\n", "\n");

        let extension = id.rsplit_once('.').map_or("", |(_, ext)| ext);
        match extension {
            "vue" => crate::create_module(&text, id, options, self)
                .await
                .map(Value::Object),
            "js" | "mjs" | "cjs" => pipeline::load_script_module(&text, id, options, self).await,
            _ => Err(LoaderError::ModuleNotFound(id.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
