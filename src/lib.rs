//! # SFC Loader
//!
//! Turns a single-file component document (template + script + styles +
//! custom blocks) into a live module object at runtime, without a build step.
//!
//! The pipeline splits the document once, compiles every block through a
//! pluggable compiler, caches compiled artifacts by content fingerprint,
//! loads the transitive dependencies through an injected loader and finally
//! instantiates the generated source into one assembled component object.

pub mod cache;
pub mod descriptor;
pub mod loader;
pub mod pipeline;
pub mod runtime;
pub mod script;
pub mod style;
pub mod template;
pub mod utils;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::{BlockKind, CacheControl, CacheKey, CompiledCache, CompiledModule};
pub use descriptor::{Block, Descriptor, DocumentParser, ParseResult, SfcParser};
pub use loader::{
    load_deps, load_dependency, resolve_path, DocumentLoader, FsSource, LoadModule, ModuleCache,
    PathResolve, SourceProvider,
};
pub use pipeline::custom_block::{CustomBlockCallback, CustomBlockHandler};
pub use runtime::{Object, RuntimeError, Value};
pub use script::transform::SourceTransform;
pub use style::sink::{StyleBuffer, StyleEntry, StyleSink};
pub use style::{LightningStyleCompiler, StyleCompiler};
pub use template::{HtmlTemplateCompiler, TemplateCompiler, HELPERS_MODULE};

/// Library version. Feeds the document hash, so scope ids change between releases.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The assembled component object produced by [`create_module`].
pub type ModuleExport = Object;

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// One message reported through the `log` collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Sub-pipeline that produced the message (`"SFC template"`, ...).
    pub stage: String,
    pub message: String,
}

/// Receiver for pipeline diagnostics.
pub trait Log: Send + Sync {
    fn log(&self, level: DiagnosticLevel, stage: &str, message: &str);
}

impl<F> Log for F
where
    F: Fn(DiagnosticLevel, &str, &str) + Send + Sync,
{
    fn log(&self, level: DiagnosticLevel, stage: &str, message: &str) {
        self(level, stage, message)
    }
}

/// A [`Log`] that keeps every diagnostic in memory.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollector {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .cloned()
            .collect()
    }
}

impl Log for DiagnosticCollector {
    fn log(&self, level: DiagnosticLevel, stage: &str, message: &str) {
        self.entries.lock().push(Diagnostic {
            level,
            stage: stage.to_string(),
            message: message.to_string(),
        });
    }
}

/// A message produced by an external compiler.
///
/// Compilers may report bare strings or messages carrying a byte range;
/// both shapes are accepted and read back through the same accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerMessage {
    Text(String),
    Located {
        message: String,
        start: Option<usize>,
        end: Option<usize>,
    },
}

impl CompilerMessage {
    pub fn located(message: impl Into<String>, start: usize, end: usize) -> Self {
        CompilerMessage::Located {
            message: message.into(),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompilerMessage::Text(message) => message,
            CompilerMessage::Located { message, .. } => message,
        }
    }

    pub fn start(&self) -> Option<usize> {
        match self {
            CompilerMessage::Text(_) => None,
            CompilerMessage::Located { start, .. } => *start,
        }
    }

    pub fn end(&self) -> Option<usize> {
        match self {
            CompilerMessage::Text(_) => None,
            CompilerMessage::Located { end, .. } => *end,
        }
    }
}

impl From<String> for CompilerMessage {
    fn from(message: String) -> Self {
        CompilerMessage::Text(message)
    }
}

impl From<&str> for CompilerMessage {
    fn from(message: &str) -> Self {
        CompilerMessage::Text(message.to_string())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration bag shared by every document in one loading graph.
///
/// Caches are handles: cloning `Options` shares them, so nested documents
/// compiled through the loader see the same compiled and module caches.
#[derive(Clone)]
pub struct Options {
    /// Loaded modules by id (dependencies, preprocessors, render helpers).
    pub module_cache: ModuleCache,
    /// Content-addressed compiled artifacts.
    pub compiled_cache: CompiledCache,
    /// Sink for generated stylesheets.
    pub add_style: Arc<dyn StyleSink>,
    /// Optional diagnostic receiver. Falls back to `tracing` events.
    pub log: Option<Arc<dyn Log>>,
    /// Caller-supplied transforms run on every compiled script and template.
    pub additional_transforms: Vec<Arc<dyn SourceTransform>>,
    pub custom_block_handler: Option<Arc<dyn CustomBlockHandler>>,
    /// Resolves `(referencing file, specifier)` to a module id.
    pub path_resolve: PathResolve,
    pub is_production: bool,
    pub version: String,
    pub parser: Arc<dyn DocumentParser>,
    pub template_compiler: Arc<dyn TemplateCompiler>,
    pub style_compiler: Arc<dyn StyleCompiler>,
}

impl Options {
    /// Defaults, with the built-in render helpers registered under
    /// [`template::HELPERS_MODULE`].
    pub fn new() -> Self {
        Self {
            module_cache: ModuleCache::new()
                .with_module(template::HELPERS_MODULE, runtime::render_helpers()),
            compiled_cache: CompiledCache::new(),
            add_style: Arc::new(StyleBuffer::new()),
            log: None,
            additional_transforms: Vec::new(),
            custom_block_handler: None,
            path_resolve: Arc::new(resolve_path),
            is_production: false,
            version: VERSION.to_string(),
            parser: Arc::new(SfcParser),
            template_compiler: Arc::new(HtmlTemplateCompiler),
            style_compiler: Arc::new(LightningStyleCompiler),
        }
    }

    /// Replace the module cache. Register [`runtime::render_helpers`] in it
    /// when templates use the built-in compiler.
    pub fn with_module_cache(mut self, module_cache: ModuleCache) -> Self {
        self.module_cache = module_cache;
        self
    }

    pub fn with_compiled_cache(mut self, compiled_cache: CompiledCache) -> Self {
        self.compiled_cache = compiled_cache;
        self
    }

    pub fn with_add_style(mut self, sink: Arc<dyn StyleSink>) -> Self {
        self.add_style = sink;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn Log>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn SourceTransform>) -> Self {
        self.additional_transforms.push(transform);
        self
    }

    pub fn with_custom_block_handler(mut self, handler: Arc<dyn CustomBlockHandler>) -> Self {
        self.custom_block_handler = Some(handler);
        self
    }

    pub fn with_path_resolve(mut self, path_resolve: PathResolve) -> Self {
        self.path_resolve = path_resolve;
        self
    }

    pub fn with_production(mut self, is_production: bool) -> Self {
        self.is_production = is_production;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_template_compiler(mut self, compiler: Arc<dyn TemplateCompiler>) -> Self {
        self.template_compiler = compiler;
        self
    }

    pub fn with_style_compiler(mut self, compiler: Arc<dyn StyleCompiler>) -> Self {
        self.style_compiler = compiler;
        self
    }

    /// Report a diagnostic through the configured `log`, or through `tracing`.
    pub fn report(&self, level: DiagnosticLevel, stage: &str, message: &str) {
        match &self.log {
            Some(log) => log.log(level, stage, message),
            None => match level {
                DiagnosticLevel::Error => tracing::error!(stage, "{}", message),
                DiagnosticLevel::Warning => tracing::warn!(stage, "{}", message),
                DiagnosticLevel::Info => tracing::info!(stage, "{}", message),
            },
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("module_cache", &self.module_cache)
            .field("compiled_cache", &self.compiled_cache)
            .field("has_log", &self.log.is_some())
            .field("additional_transforms", &self.additional_transforms.len())
            .field("has_custom_block_handler", &self.custom_block_handler.is_some())
            .field("is_production", &self.is_production)
            .field("version", &self.version)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// LoaderError
// ---------------------------------------------------------------------------

/// Errors that abort a document's compilation.
///
/// Compiler diagnostics local to one block are logged instead and never
/// surface here.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Syntax error in {filename} ({line}:{column}): {message}")]
    ScriptSyntax {
        filename: String,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Failed to load module '{id}': {source}")]
    ModuleLoad {
        id: String,
        #[source]
        source: Box<LoaderError>,
    },

    #[error("Circular dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    #[error("Runtime error in {filename}: {source}")]
    Runtime {
        filename: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Preprocessor '{lang}' failed: {message}")]
    Preprocess { lang: String, message: String },

    #[error("Transform '{name}' failed: {message}")]
    Transform { name: String, message: String },

    #[error("Custom block <{tag}> failed: {message}")]
    CustomBlock { tag: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LoaderError {
    /// The innermost error, unwrapping nested module loads.
    pub fn root_cause(&self) -> &LoaderError {
        match self {
            LoaderError::ModuleLoad { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compile `source` (the text of `filename`) into an assembled component.
///
/// The future resolves with a possibly degraded component when only
/// compiler diagnostics occurred, and fails on script syntax errors,
/// dependency load failures and instantiation errors.
///
/// `loader` must be re-entrant: it may call `create_module` again for
/// nested documents discovered while loading dependencies.
pub async fn create_module(
    source: &str,
    filename: &str,
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<ModuleExport, LoaderError> {
    pipeline::create_sfc_module(source, filename, options, loader).await
}
