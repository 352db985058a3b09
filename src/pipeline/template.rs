//! Template block: optional preprocessing, compile once per content,
//! then merge `render`/`staticRenderFns` into the component.

use super::{transform_js_code, Document, SourceFrame, STAGE_TEMPLATE};
use crate::cache::{BlockKind, CacheKey};
use crate::descriptor::Block;
use crate::loader::{load_dependency, load_deps};
use crate::runtime::{instantiate, run_preprocessor, Object, Value};
use crate::template::TemplateCompileOptions;
use crate::{DiagnosticLevel, LoaderError};

/// Exposes the compiled render functions as the module's exports.
const TRAILER: &str = "\nmodule.exports = { render, staticRenderFns }";

pub(super) async fn compile_template(
    doc: &Document<'_>,
    block: &Block,
    component: &Object,
) -> Result<(), LoaderError> {
    let Document {
        filename, options, ..
    } = *doc;

    let preprocessed = block.lang.as_deref().is_some_and(|lang| lang != "html");
    let source = match block.lang.as_deref().filter(|lang| *lang != "html") {
        Some(lang) => {
            let processor = load_dependency(filename, lang, options, doc.loader).await?;
            run_preprocessor(&processor, lang, &block.content, filename).map_err(|message| {
                LoaderError::Preprocess {
                    lang: lang.to_string(),
                    message,
                }
            })?
        }
        None => block.content.clone(),
    };

    let key = CacheKey::new(&doc.hash, BlockKind::Template, &block.content);
    let compiled = options
        .compiled_cache
        .module(key, move |control| async move {
            let result = options.template_compiler.compile(&TemplateCompileOptions {
                source: &source,
                filename,
                scope_id: doc.has_scoped_style.then_some(doc.scope_id.as_str()),
                is_production: options.is_production,
                output_source_range: true,
            });
            // Preprocessor output has no mapping back to the document.
            let frame = || match preprocessed {
                true => SourceFrame::new(&source, 0),
                false => SourceFrame::new(doc.source, block.start),
            };
            if !result.errors.is_empty() {
                control.prevent_cache();
                doc.report_messages(DiagnosticLevel::Error, STAGE_TEMPLATE, frame(), &result.errors);
            }
            doc.report_messages(DiagnosticLevel::Info, STAGE_TEMPLATE, frame(), &result.tips);

            let code = format!("{}{}", result.code, TRAILER);
            transform_js_code(&code, filename, options, STAGE_TEMPLATE, SourceFrame::new(&code, 0))
        })
        .await?;

    load_deps(filename, &compiled.deps, options, doc.loader).await?;
    if let Value::Object(exports) = instantiate(&compiled.source, filename, options)? {
        component.assign(&exports);
    }
    Ok(())
}
