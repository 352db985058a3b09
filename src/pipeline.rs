//! The document pipeline.
//!
//! ```text
//! parse ─► custom block handlers (concurrent)
//!       ─► script   : cache ─► load deps ─► instantiate ─► merge default export
//!       ─► template : preprocess ─► cache ─► load deps ─► instantiate ─► merge
//!       ─► styles   : preload lang ─► cache ─► add_style
//!       ─► custom block callbacks (concurrent, on the assembled component)
//! ```
//!
//! Script and template artifacts are CommonJS source plus the dependency
//! list that must be loaded before the source is instantiated.

pub mod custom_block;
mod script;
mod style;
mod template;

use crate::cache::{BlockKind, CacheKey, CompiledModule};
use crate::loader::{self, load_deps, LoadModule};
use crate::runtime::{instantiate, Object, Value};
use crate::script::transform::{parse_deps, rename_dynamic_import, to_commonjs};
use crate::script::ParsedModule;
use crate::utils::{document_hash, format_error_line_column, format_error_start_end, line_column, scope_id_from_hash};
use crate::{CompilerMessage, DiagnosticLevel, LoaderError, ModuleExport, Options};

pub(crate) const STAGE_PARSE: &str = "SFC parse";
pub(crate) const STAGE_SCRIPT: &str = "SFC script";
pub(crate) const STAGE_TEMPLATE: &str = "SFC template";
pub(crate) const STAGE_STYLE: &str = "SFC style";
pub(crate) const STAGE_CUSTOM_BLOCK: &str = "SFC custom block";

/// Per-document state shared by the stages.
pub(crate) struct Document<'a> {
    pub source: &'a str,
    pub filename: &'a str,
    pub options: &'a Options,
    pub loader: &'a dyn LoadModule,
    pub hash: String,
    pub scope_id: String,
    pub has_scoped_style: bool,
}

impl Document<'_> {
    /// Log compiler messages, shifting their ranges by the frame offset.
    pub fn report_messages(
        &self,
        level: DiagnosticLevel,
        stage: &str,
        frame: SourceFrame<'_>,
        messages: &[CompilerMessage],
    ) {
        for message in messages {
            let text = format_error_start_end(
                message.message(),
                self.filename,
                frame.source,
                message.start().map(|start| start + frame.offset),
                message.end().map(|end| end + frame.offset),
            );
            self.options.report(level, stage, &text);
        }
    }
}

pub(crate) async fn create_sfc_module(
    source: &str,
    filename: &str,
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<ModuleExport, LoaderError> {
    loader::within_document(filename, compile_document(source, filename, options, loader)).await
}

async fn compile_document(
    source: &str,
    filename: &str,
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<ModuleExport, LoaderError> {
    let parsed = options.parser.parse(source, filename);
    let descriptor = parsed.descriptor;

    let hash = document_hash(filename, &options.version);
    let doc = Document {
        source,
        filename,
        options,
        loader,
        scope_id: scope_id_from_hash(&hash),
        hash,
        has_scoped_style: descriptor.has_scoped_style(),
    };
    tracing::debug!(filename, hash = %doc.hash, "compiling document");
    doc.report_messages(DiagnosticLevel::Error, STAGE_PARSE, SourceFrame::new(source, 0), &parsed.errors);

    let callbacks = custom_block::prepare(&descriptor, filename, options).await?;

    let component = Object::new();
    if doc.has_scoped_style {
        component.set("_scopeId", Value::string(doc.scope_id.as_str()));
    }

    if let Some(block) = &descriptor.script {
        script::compile_script(&doc, block, &component).await?;
    }
    if let Some(block) = &descriptor.template {
        template::compile_template(&doc, block, &component).await?;
    }
    for block in &descriptor.styles {
        style::compile_style(&doc, block).await?;
    }

    custom_block::run(callbacks, &component).await?;
    Ok(component)
}

/// Where a piece of code sits in the text shown to users.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceFrame<'a> {
    pub source: &'a str,
    pub offset: usize,
}

impl<'a> SourceFrame<'a> {
    pub fn new(source: &'a str, offset: usize) -> Self {
        Self { source, offset }
    }
}

/// Parse, extract dependencies, run caller transforms and convert to
/// CommonJS. Syntax errors are logged and returned.
pub(crate) fn transform_js_code(
    code: &str,
    filename: &str,
    options: &Options,
    stage: &str,
    frame: SourceFrame<'_>,
) -> Result<CompiledModule, LoaderError> {
    let mut script = match ParsedModule::parse(code) {
        Ok(script) => script,
        Err(err) => {
            let (line, column) = line_column(frame.source, frame.offset + err.offset);
            options.report(
                DiagnosticLevel::Error,
                stage,
                &format_error_line_column(&err.message, filename, frame.source, line, column),
            );
            return Err(LoaderError::ScriptSyntax {
                filename: filename.to_string(),
                message: err.message,
                line,
                column,
            });
        }
    };

    rename_dynamic_import(&mut script.module);
    let deps = parse_deps(&script.module);
    for transform in &options.additional_transforms {
        transform
            .transform(&mut script.module, filename)
            .map_err(|message| LoaderError::Transform {
                name: transform.name().to_string(),
                message,
            })?;
    }
    to_commonjs(&mut script).map_err(|err| LoaderError::Transform {
        name: "commonjs".to_string(),
        message: err.to_string(),
    })?;

    Ok(CompiledModule {
        deps,
        source: script.print()?,
    })
}

/// Compile, load and instantiate a plain script module.
pub(crate) async fn load_script_module(
    source: &str,
    id: &str,
    options: &Options,
    loader: &dyn LoadModule,
) -> Result<Value, LoaderError> {
    let hash = document_hash(id, &options.version);
    let key = CacheKey::new(&hash, BlockKind::Script, source);
    let compiled = options
        .compiled_cache
        .module(key, move |_| async move {
            transform_js_code(source, id, options, STAGE_SCRIPT, SourceFrame::new(source, 0))
        })
        .await?;
    load_deps(id, &compiled.deps, options, loader).await?;
    instantiate(&compiled.source, id, options)
}
