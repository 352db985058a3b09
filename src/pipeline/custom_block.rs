//! Custom block dispatch.
//!
//! Handlers run for every custom block before anything else is compiled;
//! the callbacks they return run once the component is fully assembled.

use std::future::Future;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};

use super::STAGE_CUSTOM_BLOCK;
use crate::descriptor::{Block, Descriptor};
use crate::runtime::Object;
use crate::{DiagnosticLevel, LoaderError, Options};

/// Invoked with the assembled component.
pub type CustomBlockCallback =
    Box<dyn FnOnce(Object) -> BoxFuture<'static, Result<(), LoaderError>> + Send>;

/// Wrap an async closure as a [`CustomBlockCallback`].
pub fn callback<F, Fut>(f: F) -> CustomBlockCallback
where
    F: FnOnce(Object) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), LoaderError>> + Send + 'static,
{
    Box::new(move |component| Box::pin(f(component)))
}

#[async_trait]
pub trait CustomBlockHandler: Send + Sync {
    /// Inspect `block`; return a callback to decorate the component later.
    async fn handle(
        &self,
        block: &Block,
        filename: &str,
        options: &Options,
    ) -> Result<Option<CustomBlockCallback>, LoaderError>;
}

/// Run the configured handler on every custom block concurrently.
pub(crate) async fn prepare(
    descriptor: &Descriptor,
    filename: &str,
    options: &Options,
) -> Result<Vec<CustomBlockCallback>, LoaderError> {
    let Some(handler) = &options.custom_block_handler else {
        return Ok(Vec::new());
    };
    let handled = try_join_all(descriptor.custom_blocks.iter().map(|block| async move {
        handler
            .handle(block, filename, options)
            .await
            .map_err(|err| {
                options.report(DiagnosticLevel::Error, STAGE_CUSTOM_BLOCK, &err.to_string());
                err
            })
    }))
    .await?;
    Ok(handled.into_iter().flatten().collect())
}

/// Invoke every callback concurrently with the assembled component.
pub(crate) async fn run(callbacks: Vec<CustomBlockCallback>, component: &Object) -> Result<(), LoaderError> {
    if callbacks.is_empty() {
        return Ok(());
    }
    try_join_all(callbacks.into_iter().map(|callback| callback(component.clone()))).await?;
    Ok(())
}
