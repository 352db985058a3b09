//! Style blocks: compile once per content, deliver to the sink.

use super::{Document, SourceFrame, STAGE_STYLE};
use crate::cache::{BlockKind, CacheKey};
use crate::descriptor::Block;
use crate::loader::load_dependency;
use crate::runtime::Value;
use crate::style::StyleCompileOptions;
use crate::{DiagnosticLevel, LoaderError};

pub(super) async fn compile_style(doc: &Document<'_>, block: &Block) -> Result<(), LoaderError> {
    let Document {
        filename, options, ..
    } = *doc;

    // The compiler resolves the processor synchronously from the module cache.
    if let Some(lang) = block.lang.as_deref().filter(|lang| *lang != "css") {
        load_dependency(filename, lang, options, doc.loader).await?;
    }

    let key = CacheKey::new(&doc.hash, BlockKind::Style, &block.content);
    let css = options
        .compiled_cache
        .style(key, move |control| async move {
            let module_cache = options.module_cache.clone();
            let path_resolve = options.path_resolve.clone();
            let require =
                move |id: &str| -> Option<Value> { module_cache.require(&path_resolve(filename, id)) };
            let result = options.style_compiler.compile(&StyleCompileOptions {
                source: &block.content,
                filename,
                scope_id: &doc.scope_id,
                scoped: block.scoped,
                lang: block.lang.as_deref(),
                is_production: options.is_production,
                require: &require,
            });
            if !result.errors.is_empty() {
                control.prevent_cache();
                let frame = SourceFrame::new(&block.content, 0);
                doc.report_messages(DiagnosticLevel::Error, STAGE_STYLE, frame, &result.errors);
            }
            Ok::<_, LoaderError>(result.code)
        })
        .await?;

    let scope_id = block.scoped.then_some(doc.scope_id.as_str());
    options.add_style.add_style(&css, scope_id);
    tracing::trace!(filename, scoped = block.scoped, "style delivered");
    Ok(())
}
