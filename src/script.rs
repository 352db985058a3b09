//! Front end for component scripts and generated render code.
//!
//! Sources are parsed with `swc_ecma_parser`, rewritten in place by
//! [`transform`] and printed back with `swc_ecma_codegen`. The runtime
//! evaluates the same swc AST, re-exported here as [`ast`].

pub mod transform;

use std::io;

use swc_ecma_ast::{
    Decl, EsVersion, Expr, ForHead, ForInStmt, ForOfStmt, Module, ModuleItem, ObjectPatProp, Pat,
    Stmt, VarDecl, VarDeclKind, VarDeclOrExpr,
};
use swc_ecma_codegen::text_writer::JsWriter;
use swc_ecma_codegen::Emitter;
use swc_ecma_parser::error::Error as ParseError;
use swc_ecma_parser::lexer::Lexer;
use swc_ecma_parser::{Parser, Syntax};
use swc_ecma_quote::swc_common::input::StringInput;
use swc_ecma_quote::swc_common::sync::Lrc;
use swc_ecma_quote::swc_common::{BytePos, FileName, SourceFile, SourceMap, Spanned};
use thiserror::Error;

use crate::utils;

pub use swc_ecma_ast as ast;

/// A syntax error with its 1-based position in the parsed text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({line}:{column})")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub(crate) fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let (line, column) = utils::line_column(source, offset);
        Self {
            message: message.into(),
            offset,
            line,
            column,
        }
    }

    fn from_parser(error: ParseError, source: &str, base: BytePos) -> Self {
        let offset = error.span().lo.0.saturating_sub(base.0) as usize;
        Self::at(source, offset, error.kind().msg())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_file(
    source_map: &Lrc<SourceMap>,
    code: &str,
) -> (Lrc<SourceFile>, Result<Module, ParseError>) {
    let file = source_map.new_source_file(FileName::Anon.into(), code.to_string());
    let lexer = Lexer::new(
        Syntax::Es(Default::default()),
        EsVersion::EsNext,
        StringInput::from(&*file),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let parsed = parser.parse_module();
    // Early errors are recovered by the parser but still reject the source.
    let result = match (parsed, parser.take_errors().into_iter().next()) {
        (Ok(_), Some(error)) | (Err(error), _) => Err(error),
        (Ok(module), None) => Ok(module),
    };
    (file, result)
}

/// A parsed module together with the source map its spans point into.
///
/// Printing needs the same map, so generated items spliced into the
/// module are parsed through [`parse_items`](Self::parse_items).
pub struct ParsedModule {
    pub module: Module,
    source_map: Lrc<SourceMap>,
}

impl ParsedModule {
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        let source_map: Lrc<SourceMap> = Default::default();
        let (file, result) = parse_file(&source_map, source);
        let module =
            result.map_err(|error| SyntaxError::from_parser(error, source, file.start_pos))?;
        Ok(Self { module, source_map })
    }

    /// Parse generated code into items sharing this module's source map.
    pub fn parse_items(&self, code: &str) -> Result<Vec<ModuleItem>, SyntaxError> {
        let (file, result) = parse_file(&self.source_map, code);
        result
            .map(|module| module.body)
            .map_err(|error| SyntaxError::from_parser(error, code, file.start_pos))
    }

    pub fn print(&self) -> io::Result<String> {
        let mut out = Vec::new();
        {
            let mut emitter = Emitter {
                cfg: swc_ecma_codegen::Config::default(),
                cm: self.source_map.clone(),
                comments: None,
                wr: JsWriter::new(self.source_map.clone(), "\n", &mut out, None),
            };
            emitter.emit_module(&self.module)?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Parse a module, keeping only the AST.
pub fn parse_module(source: &str) -> Result<Module, SyntaxError> {
    ParsedModule::parse(source).map(|parsed| parsed.module)
}

/// A standalone expression, e.g. a template binding.
#[derive(Debug)]
pub struct ParsedExpression {
    pub expr: Box<Expr>,
    base: BytePos,
}

impl ParsedExpression {
    /// Byte offset of `pos` in the text handed to [`parse_expression`].
    pub fn offset(&self, pos: BytePos) -> usize {
        pos.0.saturating_sub(self.base.0) as usize
    }
}

/// Parse exactly one expression. Trailing tokens are a syntax error.
pub fn parse_expression(source: &str) -> Result<ParsedExpression, SyntaxError> {
    let source_map: Lrc<SourceMap> = Default::default();
    // The newline keeps a trailing line comment from eating the paren.
    let (file, result) = parse_file(&source_map, &format!("({}\n)", source));
    let base = BytePos(file.start_pos.0 + 1);
    let module = result.map_err(|error| SyntaxError::from_parser(error, source, base))?;

    let mut body = module.body;
    if body.len() == 1 {
        if let Some(ModuleItem::Stmt(Stmt::Expr(stmt))) = body.pop() {
            if let Expr::Paren(paren) = *stmt.expr {
                return Ok(ParsedExpression {
                    expr: paren.expr,
                    base,
                });
            }
        }
    }
    Err(SyntaxError::at(source, 0, "Expected a single expression"))
}

// ---------------------------------------------------------------------------
// Helpers shared by the transforms, the runtime and template codegen
// ---------------------------------------------------------------------------

/// Names a binding pattern declares, in source order.
pub fn pattern_names(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => out.push(binding.id.sym.to_string()),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                pattern_names(elem, out);
            }
        }
        Pat::Rest(rest) => pattern_names(&rest.arg, out),
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pattern_names(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pattern_names(&rest.arg, out),
                }
            }
        }
        Pat::Assign(assign) => pattern_names(&assign.left, out),
        Pat::Expr(_) | Pat::Invalid(_) => {}
    }
}

/// `var` names a statement declares outside nested functions.
pub fn var_names(stmt: &Stmt, out: &mut Vec<String>) {
    fn var_decl(var: &VarDecl, out: &mut Vec<String>) {
        if var.kind == VarDeclKind::Var {
            for declarator in &var.decls {
                pattern_names(&declarator.name, out);
            }
        }
    }
    match stmt {
        Stmt::Decl(Decl::Var(var)) => var_decl(var, out),
        Stmt::Block(block) => block.stmts.iter().for_each(|s| var_names(s, out)),
        Stmt::If(if_stmt) => {
            var_names(&if_stmt.cons, out);
            if let Some(alt) = &if_stmt.alt {
                var_names(alt, out);
            }
        }
        Stmt::Labeled(labeled) => var_names(&labeled.body, out),
        Stmt::While(while_stmt) => var_names(&while_stmt.body, out),
        Stmt::DoWhile(do_while) => var_names(&do_while.body, out),
        Stmt::For(for_stmt) => {
            if let Some(VarDeclOrExpr::VarDecl(var)) = &for_stmt.init {
                var_decl(var, out);
            }
            var_names(&for_stmt.body, out);
        }
        Stmt::ForIn(ForInStmt { left, body, .. }) | Stmt::ForOf(ForOfStmt { left, body, .. }) => {
            if let ForHead::VarDecl(var) = left {
                var_decl(var, out);
            }
            var_names(body, out);
        }
        Stmt::Try(try_stmt) => {
            try_stmt.block.stmts.iter().for_each(|s| var_names(s, out));
            if let Some(handler) = &try_stmt.handler {
                handler.body.stmts.iter().for_each(|s| var_names(s, out));
            }
            if let Some(finalizer) = &try_stmt.finalizer {
                finalizer.stmts.iter().for_each(|s| var_names(s, out));
            }
        }
        Stmt::Switch(switch) => {
            for case in &switch.cases {
                case.cons.iter().for_each(|s| var_names(s, out));
            }
        }
        _ => {}
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn modules_parse_modern_syntax() {
        let module = parse_module(
            "class A extends B { #x = 1; static s = 2 }\n\
             const o = { ...base, a: this?.a?.b ?? 1 }\n\
             for (let i = 0; i < 3; i++) { try { f(i) } catch { continue } }\n\
             while (false) {}\n\
             label: do { break label } while (true)",
        )
        .unwrap();
        assert_eq!(module.body.len(), 5);
    }

    #[test]
    fn syntax_errors_carry_positions() {
        let err = parse_module("const a = 1\nconst = 2").unwrap_err();
        assert_eq!((err.line, err.column), (2, 7));
        assert_eq!(err.offset, 18);
    }

    #[test]
    fn expressions_reject_trailing_tokens() {
        let err = parse_expression("a b").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.offset <= 3, "{:?}", err);
        assert!(parse_expression("a; b").is_err());
        assert!(parse_expression("a) + (b").is_err());
    }

    #[test]
    fn expression_offsets_are_relative_to_the_input() {
        let parsed = parse_expression("  foo + bar // note").unwrap();
        let Expr::Bin(bin) = &*parsed.expr else {
            panic!("expected a binary expression");
        };
        let Expr::Ident(right) = &*bin.right else {
            panic!("expected an identifier");
        };
        assert_eq!(parsed.offset(right.span.lo), 8);
    }

    #[test]
    fn printing_round_trips_statements() {
        let parsed = ParsedModule::parse("const a = 1;\nfunction f(x) { return x * a }").unwrap();
        let printed = parsed.print().unwrap();
        assert!(printed.starts_with("const a = 1;\n"), "{}", printed);
        assert!(parse_module(&printed).is_ok());
    }

    #[test]
    fn pattern_names_cover_destructuring() {
        let module = parse_module("const { a, b: [c, ...d], ...e } = x").unwrap();
        let ModuleItem::Stmt(Stmt::Decl(ast::Decl::Var(decl))) = &module.body[0] else {
            panic!("expected a declaration");
        };
        let mut names = Vec::new();
        pattern_names(&decl.decls[0].name, &mut names);
        assert_eq!(names, vec!["a", "c", "d", "e"]);
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("$event"));
        assert!(is_identifier("_a1"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a-b"));
    }
}
