//! Template compilation.
//!
//! The built-in compiler emits an ES module that imports the render helpers
//! from [`HELPERS_MODULE`] and declares `render(_ctx)` and `staticRenderFns`.
//! The pipeline appends the export trailer and converts it like any script.

mod codegen;
mod parse;

use crate::CompilerMessage;
use codegen::Codegen;

/// Module id the generated code imports its render helpers from.
pub const HELPERS_MODULE: &str = "vue";

pub struct TemplateCompileOptions<'a> {
    pub source: &'a str,
    pub filename: &'a str,
    /// Set only when the document has a scoped style.
    pub scope_id: Option<&'a str>,
    pub is_production: bool,
    /// Attach byte ranges to errors and tips.
    pub output_source_range: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateCompileResult {
    pub code: String,
    pub errors: Vec<CompilerMessage>,
    pub tips: Vec<CompilerMessage>,
}

pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, options: &TemplateCompileOptions<'_>) -> TemplateCompileResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTemplateCompiler;

impl TemplateCompiler for HtmlTemplateCompiler {
    fn compile(&self, options: &TemplateCompileOptions<'_>) -> TemplateCompileResult {
        let mut errors = Vec::new();
        let mut tips = Vec::new();
        let roots = parse::parse(options.source, &mut errors);

        let body = Codegen {
            scope_id: options.scope_id,
            errors: &mut errors,
            tips: &mut tips,
        }
        .root(&roots);

        // Keys are a development aid.
        if options.is_production {
            tips.clear();
        }
        if !options.output_source_range {
            for message in errors.iter_mut().chain(tips.iter_mut()) {
                *message = CompilerMessage::Text(message.message().to_string());
            }
        }

        let code = format!(
            "import {{ h as _c, text as _v, toDisplayString as _s, renderList as _l, comment as _e }} from \"{}\";\n\
             function render({}) {{\n  return {};\n}}\n\
             var staticRenderFns = [];\n",
            HELPERS_MODULE,
            codegen::CONTEXT,
            body
        );
        TemplateCompileResult { code, errors, tips }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(source: &str, scope_id: Option<&str>) -> TemplateCompileResult {
        HtmlTemplateCompiler.compile(&TemplateCompileOptions {
            source,
            filename: "/app.vue",
            scope_id,
            is_production: false,
            output_source_range: true,
        })
    }

    fn render_body(result: &TemplateCompileResult) -> &str {
        let start = result.code.find("return ").unwrap() + "return ".len();
        let end = result.code[start..].find(";\n}").unwrap() + start;
        &result.code[start..end]
    }

    #[test]
    fn interpolation_reads_the_context() {
        let result = compile("<div>{{ msg }}</div>", None);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(render_body(&result), "_c(\"div\", {}, [_v(_s(_ctx.msg))])");
        assert!(result.code.starts_with("import { h as _c,"));
        assert!(result.code.contains("var staticRenderFns = [];"));
    }

    #[test]
    fn attributes_bindings_and_events() {
        let result = compile(
            "<button id=\"b\" :title=\"label\" @click=\"count += 1\" disabled>x</button>",
            Some("data-v-1"),
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            render_body(&result),
            "_c(\"button\", { attrs: { \"id\": \"b\", \"title\": _ctx.label, \"disabled\": true, \
             \"data-v-1\": \"\" }, on: { \"click\": ($event) => (_ctx.count += 1) } }, [_v(\"x\")])"
        );
    }

    #[test]
    fn method_handlers_are_passed_through() {
        let result = compile("<a @click=\"open\"></a>", None);
        assert_eq!(render_body(&result), "_c(\"a\", { on: { \"click\": _ctx.open } }, [])");
    }

    #[test]
    fn conditional_chain() {
        let result = compile(
            "<div><p v-if=\"a\">1</p>\n<p v-else-if=\"b\">2</p>\n<p v-else>3</p></div>",
            None,
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            render_body(&result),
            "_c(\"div\", {}, [(_ctx.a) ? _c(\"p\", {}, [_v(\"1\")]) : (_ctx.b) ? \
             _c(\"p\", {}, [_v(\"2\")]) : _c(\"p\", {}, [_v(\"3\")])])"
        );
    }

    #[test]
    fn list_rendering_and_key_tip() {
        let result = compile("<ul><li v-for=\"(item, i) in items\">{{ i }}: {{ item }}</li></ul>", None);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            render_body(&result),
            "_c(\"ul\", {}, [_l(_ctx.items, (item, i) => _c(\"li\", {}, [_v(_s(i) + \": \" + _s(item))]))])"
        );
        assert_eq!(result.tips.len(), 1);
        assert!(result.tips[0].message().contains("explicit keys"));
    }

    #[test]
    fn keyed_lists_have_no_tip() {
        let result = compile("<ul><li v-for=\"x of xs\" :key=\"x.id\"></li></ul>", None);
        assert!(result.tips.is_empty());
        assert!(render_body(&result).contains("{ key: x.id }"));
    }

    #[test]
    fn invalid_expressions_are_located_errors() {
        let source = "<div>{{ a + }}</div>";
        let result = compile(source, None);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message().starts_with("invalid expression"));
        assert_eq!(result.errors[0].start(), Some(7));
        assert_eq!(render_body(&result), "_c(\"div\", {}, [_v(_s(undefined))])");
    }

    #[test]
    fn malformed_aliases_are_located_errors() {
        let source = "<ul><li v-for=\"(a b) in xs\" :key=\"a\">x</li></ul>";
        let result = compile(source, None);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message().starts_with("Invalid v-for alias \"a b\""));
        assert_eq!(result.errors[0].start(), source.find("v-for"));
        // The element still renders once, without the list.
        assert_eq!(
            render_body(&result),
            "_c(\"ul\", {}, [_c(\"li\", { key: _ctx.a }, [_v(\"x\")])])"
        );
    }

    #[test]
    fn destructured_aliases_are_locals() {
        let result = compile("<ul><li v-for=\"({ id }, i) in rows\" :key=\"id\">{{ i }}</li></ul>", None);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            render_body(&result),
            "_c(\"ul\", {}, [_l(_ctx.rows, ({ id }, i) => _c(\"li\", { key: id }, [_v(_s(i))]))])"
        );
    }

    #[test]
    fn root_rules() {
        assert_eq!(compile("hello", None).errors.len(), 2);
        let two = compile("<a></a><b></b>", None);
        assert_eq!(two.errors.len(), 1);
        assert_eq!(render_body(&two), "_c(\"a\", {}, [])");
    }

    #[test]
    fn ranges_can_be_dropped() {
        let result = HtmlTemplateCompiler.compile(&TemplateCompileOptions {
            source: "<div>",
            filename: "/app.vue",
            scope_id: None,
            is_production: false,
            output_source_range: false,
        });
        assert_eq!(result.errors, vec![CompilerMessage::from("Element <div> is missing end tag.")]);
    }
}
