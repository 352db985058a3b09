//! Script block: compile once per content, then merge its default export.

use super::{transform_js_code, Document, SourceFrame, STAGE_SCRIPT};
use crate::cache::{BlockKind, CacheKey};
use crate::descriptor::Block;
use crate::loader::load_deps;
use crate::runtime::{instantiate, interop_require_default, Object, Value};
use crate::LoaderError;

pub(super) async fn compile_script(
    doc: &Document<'_>,
    block: &Block,
    component: &Object,
) -> Result<(), LoaderError> {
    let Document {
        source,
        filename,
        options,
        ..
    } = *doc;

    let key = CacheKey::new(&doc.hash, BlockKind::Script, &block.content);
    let compiled = options
        .compiled_cache
        .module(key, move |_| async move {
            transform_js_code(
                &block.content,
                filename,
                options,
                STAGE_SCRIPT,
                SourceFrame::new(source, block.start),
            )
        })
        .await?;

    load_deps(filename, &compiled.deps, options, doc.loader).await?;
    let exports = instantiate(&compiled.source, filename, options)?;

    let namespace = interop_require_default(&exports);
    if let Some(Value::Object(definition)) = namespace.as_object().and_then(|ns| ns.get("default")) {
        component.assign(&definition);
    }
    tracing::trace!(filename, deps = compiled.deps.len(), "script merged");
    Ok(())
}
