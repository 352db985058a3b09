//! Style block compilation.
//!
//! The built-in compiler runs an optional preprocessor, rewrites scoped
//! selectors and validates/prints the result with lightningcss.

pub mod scoped;
pub mod sink;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

use crate::runtime::{run_preprocessor, Value};
use crate::CompilerMessage;

pub use scoped::scope_css;

/// Resolves preprocessor modules against the shared module cache.
pub type CustomRequire<'a> = &'a (dyn Fn(&str) -> Option<Value> + Send + Sync);

pub struct StyleCompileOptions<'a> {
    pub source: &'a str,
    pub filename: &'a str,
    pub scope_id: &'a str,
    pub scoped: bool,
    pub lang: Option<&'a str>,
    pub is_production: bool,
    pub require: CustomRequire<'a>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleCompileResult {
    pub code: String,
    pub errors: Vec<CompilerMessage>,
}

pub trait StyleCompiler: Send + Sync {
    fn compile(&self, options: &StyleCompileOptions<'_>) -> StyleCompileResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LightningStyleCompiler;

impl StyleCompiler for LightningStyleCompiler {
    fn compile(&self, options: &StyleCompileOptions<'_>) -> StyleCompileResult {
        let source = match options.lang.filter(|lang| *lang != "css") {
            Some(lang) => match preprocess(lang, options) {
                Ok(css) => css,
                Err(message) => {
                    return StyleCompileResult {
                        code: String::new(),
                        errors: vec![CompilerMessage::Text(message)],
                    }
                }
            },
            None => options.source.to_string(),
        };

        let scoped = if options.scoped {
            scope_css(&source, options.scope_id)
        } else {
            source
        };

        match print_css(&scoped, options.filename, options.is_production) {
            Ok(code) => StyleCompileResult {
                code,
                errors: Vec::new(),
            },
            Err(message) => StyleCompileResult {
                code: scoped,
                errors: vec![CompilerMessage::Text(message)],
            },
        }
    }
}

fn preprocess(lang: &str, options: &StyleCompileOptions<'_>) -> Result<String, String> {
    let module = (options.require)(lang)
        .ok_or_else(|| format!("Preprocessor '{}' is not loaded", lang))?;
    run_preprocessor(&module, lang, options.source, options.filename)
}

fn print_css(css: &str, filename: &str, minify: bool) -> Result<String, String> {
    let parser_options = ParserOptions {
        filename: filename.to_string(),
        ..Default::default()
    };
    let mut stylesheet = StyleSheet::parse(css, parser_options)
        .map_err(|e| format!("CSS parse error: {}", e))?;
    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| format!("CSS minify error: {}", e))?;
    }
    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            ..Default::default()
        })
        .map_err(|e| format!("CSS print error: {}", e))?;
    Ok(result.code)
}
