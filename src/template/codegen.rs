//! Node tree to render code.
//!
//! Helpers are referenced by their short aliases (`_c`, `_v`, `_s`, `_l`,
//! `_e`) and free identifiers in expressions are read from `_ctx`.

use std::sync::OnceLock;

use regex::Regex;
use swc_ecma_quote::swc_common::{BytePos, Spanned};

use super::parse::{Attr, Element, Node, TextPart};
use crate::script::ast::{
    BlockStmtOrExpr, Callee, Decl, Expr, ExprOrSpread, ForHead, ForInStmt, ForOfStmt, Function,
    MemberExpr, MemberProp, ObjectPatProp, OptChainBase, Pat, PatOrExpr, Prop, PropName,
    PropOrSpread, Stmt, SuperProp, VarDeclOrExpr,
};
use crate::script::{parse_expression, pattern_names, var_names, ParsedExpression};
use crate::utils::escape_js_string;
use crate::CompilerMessage;

pub(crate) const CONTEXT: &str = "_ctx";

/// Identifiers never read from the render context.
const GLOBALS: &[&str] = &[
    "undefined", "NaN", "Infinity", "Math", "JSON", "Object", "Array", "String", "Number",
    "Boolean", "console",
];

fn v_for_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\(([^)]*)\)|([A-Za-z_$][\w$]*))\s+(?:in|of)\s+([\s\S]+?)\s*$")
            .expect("v-for pattern is valid")
    })
}

pub(crate) struct Codegen<'a> {
    pub scope_id: Option<&'a str>,
    pub errors: &'a mut Vec<CompilerMessage>,
    pub tips: &'a mut Vec<CompilerMessage>,
}

impl Codegen<'_> {
    /// The expression returned by `render`.
    pub fn root(&mut self, roots: &[Node]) -> String {
        for node in roots {
            if let Node::Text(parts) = node {
                if !is_blank(parts) {
                    self.errors.push(CompilerMessage::Text(
                        "Text outside the root element will be ignored.".to_string(),
                    ));
                }
            }
        }
        let elements: Vec<Node> = roots
            .iter()
            .filter(|node| matches!(node, Node::Element(_)))
            .cloned()
            .collect();
        if let Some(Node::Element(first)) = elements.first() {
            if first.tag == "template" {
                self.errors.push(CompilerMessage::located(
                    "Cannot use <template> as component root element because it may contain multiple nodes.",
                    first.start,
                    first.end,
                ));
            }
            if let Some(attr) = first.attr("v-for") {
                self.errors.push(CompilerMessage::located(
                    "Cannot use v-for on component root element because it renders multiple elements.",
                    attr.start,
                    attr.end,
                ));
            }
        }

        let mut generated = self.children(&elements, &[]);
        match generated.len() {
            0 => {
                self.errors.push(CompilerMessage::Text(
                    "Component template requires a root element, rather than just text.".to_string(),
                ));
                "_e()".to_string()
            }
            1 => generated.remove(0),
            _ => {
                self.errors.push(CompilerMessage::Text(
                    "Component template should contain exactly one root element. \
                     If you are using v-if on multiple elements, use v-else-if to chain them instead."
                        .to_string(),
                ));
                generated.remove(0)
            }
        }
    }

    fn children(&mut self, nodes: &[Node], locals: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < nodes.len() {
            match &nodes[i] {
                Node::Text(parts) => {
                    out.push(self.text(parts, locals));
                    i += 1;
                }
                Node::Element(element) if element.has_attr("v-if") => {
                    let mut branches = vec![element];
                    let mut next = i + 1;
                    loop {
                        let mut k = next;
                        while matches!(nodes.get(k), Some(Node::Text(parts)) if is_blank(parts)) {
                            k += 1;
                        }
                        match nodes.get(k) {
                            Some(Node::Element(branch))
                                if branch.has_attr("v-else-if") || branch.has_attr("v-else") =>
                            {
                                branches.push(branch);
                                next = k + 1;
                                if branch.has_attr("v-else") {
                                    break;
                                }
                            }
                            _ => break,
                        }
                    }
                    out.push(self.if_chain(&branches, locals));
                    i = next;
                }
                Node::Element(element) => {
                    if let Some(attr) = element.attr("v-else-if").or_else(|| element.attr("v-else")) {
                        self.errors.push(CompilerMessage::located(
                            format!(
                                "{} used on element <{}> without corresponding v-if.",
                                attr.name, element.tag
                            ),
                            attr.start,
                            attr.end,
                        ));
                    }
                    out.push(self.branch(element, locals));
                    i += 1;
                }
            }
        }
        out
    }

    fn if_chain(&mut self, branches: &[&Element], locals: &[String]) -> String {
        let mut code = "_e()".to_string();
        for element in branches.iter().rev() {
            let rendered = self.branch(element, locals);
            let test = element.attr("v-if").or_else(|| element.attr("v-else-if"));
            code = match test {
                Some(attr) => {
                    let test = self.attr_expression(attr, locals);
                    format!("({}) ? {} : {}", test, rendered, code)
                }
                None => rendered,
            };
        }
        code
    }

    fn branch(&mut self, element: &Element, locals: &[String]) -> String {
        match element.attr("v-for") {
            Some(attr) => self.for_loop(element, attr, locals),
            None => self.element(element, locals),
        }
    }

    fn for_loop(&mut self, element: &Element, attr: &Attr, locals: &[String]) -> String {
        let raw = attr.value.as_deref().unwrap_or("");
        let Some(caps) = v_for_re().captures(raw) else {
            self.errors.push(CompilerMessage::located(
                format!("Invalid v-for expression: {}", raw),
                attr.start,
                attr.end,
            ));
            return self.element(element, locals);
        };
        let aliases = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str()).trim();
        let Some(names) = alias_names(aliases) else {
            self.errors.push(CompilerMessage::located(
                format!("Invalid v-for alias \"{}\" in expression: {}", aliases, raw.trim()),
                attr.start,
                attr.end,
            ));
            return self.element(element, locals);
        };
        let source = caps.get(3).map_or("", |m| m.as_str());
        let source_start = attr.value_start + caps.get(3).map_or(0, |m| m.start());

        if !element.has_attr(":key") && !element.has_attr("v-bind:key") {
            self.tips.push(CompilerMessage::located(
                format!(
                    "<{} v-for=\"{}\">: lists rendered with v-for should have explicit keys.",
                    element.tag, raw
                ),
                attr.start,
                attr.end,
            ));
        }

        let list = self.expression(source, source_start, locals);
        let mut inner_locals = locals.to_vec();
        inner_locals.extend(names);
        let body = self.element(element, &inner_locals);
        format!("_l({}, ({}) => {})", list, aliases, body)
    }

    fn element(&mut self, element: &Element, locals: &[String]) -> String {
        let children = self.children(&element.children, locals);
        if element.tag == "template" {
            return format!("[{}]", children.join(", "));
        }

        let mut key = None;
        let mut attrs = Vec::new();
        let mut on = Vec::new();
        for attr in &element.attrs {
            let name = attr.name.as_str();
            if matches!(name, "v-if" | "v-else-if" | "v-else" | "v-for") {
                continue;
            }
            if let Some(arg) = name.strip_prefix(':').or_else(|| name.strip_prefix("v-bind:")) {
                let value = self.attr_expression(attr, locals);
                if arg == "key" {
                    key = Some(value);
                } else {
                    attrs.push(format!("\"{}\": {}", escape_js_string(arg), value));
                }
            } else if let Some(event) = name.strip_prefix('@').or_else(|| name.strip_prefix("v-on:")) {
                let event = event.split('.').next().unwrap_or(event);
                let handler = self.handler(attr, locals);
                on.push(format!("\"{}\": {}", escape_js_string(event), handler));
            } else if name.starts_with("v-") {
                self.errors.push(CompilerMessage::located(
                    format!("Unsupported directive {}.", name.split(':').next().unwrap_or(name)),
                    attr.start,
                    attr.end,
                ));
            } else if name == "key" {
                key = Some(format!("\"{}\"", escape_js_string(attr.value.as_deref().unwrap_or(""))));
            } else {
                let value = match &attr.value {
                    Some(value) => format!("\"{}\"", escape_js_string(value)),
                    None => "true".to_string(),
                };
                attrs.push(format!("\"{}\": {}", escape_js_string(name), value));
            }
        }
        if let Some(scope_id) = self.scope_id {
            attrs.push(format!("\"{}\": \"\"", escape_js_string(scope_id)));
        }

        let mut data = Vec::new();
        if let Some(key) = key {
            data.push(format!("key: {}", key));
        }
        if !attrs.is_empty() {
            data.push(format!("attrs: {{ {} }}", attrs.join(", ")));
        }
        if !on.is_empty() {
            data.push(format!("on: {{ {} }}", on.join(", ")));
        }
        let data = if data.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", data.join(", "))
        };
        format!(
            "_c(\"{}\", {}, [{}])",
            escape_js_string(&element.tag),
            data,
            children.join(", ")
        )
    }

    fn text(&mut self, parts: &[TextPart], locals: &[String]) -> String {
        let mut pieces = Vec::new();
        for part in parts {
            match part {
                TextPart::Static(text) => pieces.push(format!("\"{}\"", escape_js_string(text))),
                TextPart::Interpolation { expr, start, .. } => {
                    let code = self.expression(expr, start + 2, locals);
                    pieces.push(format!("_s({})", code));
                }
            }
        }
        if pieces.is_empty() {
            pieces.push("\"\"".to_string());
        }
        format!("_v({})", pieces.join(" + "))
    }

    fn attr_expression(&mut self, attr: &Attr, locals: &[String]) -> String {
        match attr.value.as_deref() {
            Some(raw) => self.expression(raw, attr.value_start, locals),
            None => {
                self.errors.push(CompilerMessage::located(
                    format!("{} requires an expression.", attr.name),
                    attr.start,
                    attr.end,
                ));
                "undefined".to_string()
            }
        }
    }

    fn parse(&mut self, raw: &str, start: usize) -> Option<ParsedExpression> {
        match parse_expression(raw) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.errors.push(CompilerMessage::located(
                    format!("invalid expression: {} in\n\n    {}\n", err.message, raw.trim()),
                    start,
                    start + raw.len(),
                ));
                None
            }
        }
    }

    fn expression(&mut self, raw: &str, start: usize, locals: &[String]) -> String {
        match self.parse(raw, start) {
            Some(parsed) => prefix_identifiers(raw, &parsed, locals),
            None => "undefined".to_string(),
        }
    }

    /// Method paths and functions are handlers as-is, anything else
    /// becomes `($event) => (expression)`.
    fn handler(&mut self, attr: &Attr, locals: &[String]) -> String {
        let Some(raw) = attr.value.as_deref() else {
            return "() => undefined".to_string();
        };
        let Some(parsed) = self.parse(raw, attr.value_start) else {
            return "() => undefined".to_string();
        };
        if is_path(&parsed.expr) || matches!(*parsed.expr, Expr::Fn(_) | Expr::Arrow(_)) {
            return prefix_identifiers(raw, &parsed, locals);
        }
        let mut inner_locals = locals.to_vec();
        inner_locals.push("$event".to_string());
        format!("($event) => ({})", prefix_identifiers(raw, &parsed, &inner_locals))
    }
}

fn is_blank(parts: &[TextPart]) -> bool {
    parts
        .iter()
        .all(|part| matches!(part, TextPart::Static(text) if text.trim().is_empty()))
}

fn is_path(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) => true,
        Expr::Member(member) => matches!(member.prop, MemberProp::Ident(_)) && is_path(&member.obj),
        _ => false,
    }
}

/// Names bound by a `v-for` alias list such as `item` or `({ id }, index)`.
fn alias_names(aliases: &str) -> Option<Vec<String>> {
    let parsed = parse_expression(&format!("({}) => 0", aliases)).ok()?;
    let Expr::Arrow(arrow) = &*parsed.expr else {
        return None;
    };
    let mut names = Vec::new();
    for param in &arrow.params {
        pattern_names(param, &mut names);
    }
    Some(names)
}

// ---------------------------------------------------------------------------
// Identifier prefixing
// ---------------------------------------------------------------------------

/// Rewrite free identifiers of a parsed expression to reads from the render
/// context. The result is `raw` with `_ctx.` spliced in, so everything else
/// keeps its source text.
pub(crate) fn prefix_identifiers(raw: &str, parsed: &ParsedExpression, locals: &[String]) -> String {
    let mut prefixer = Prefixer {
        parsed,
        inserts: Vec::new(),
    };
    prefixer.expr(&parsed.expr, locals);
    let mut inserts = prefixer.inserts;
    inserts.sort_by_key(|(offset, _)| *offset);

    let span = parsed.expr.span();
    let end = parsed.offset(span.hi).min(raw.len());
    let mut pos = parsed.offset(span.lo).min(end);
    let mut out = String::with_capacity(raw.len() + inserts.len() * CONTEXT.len());
    for (offset, text) in inserts {
        let offset = offset.clamp(pos, end);
        out.push_str(raw.get(pos..offset).unwrap_or_default());
        out.push_str(&text);
        pos = offset;
    }
    out.push_str(raw.get(pos..end).unwrap_or_default());
    out
}

fn is_free(name: &str, locals: &[String]) -> bool {
    !locals.iter().any(|local| local == name) && !GLOBALS.contains(&name)
}

/// Lexical names declared directly in a statement list.
fn declared_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Decl(Decl::Var(var)) => {
                for declarator in &var.decls {
                    pattern_names(&declarator.name, out);
                }
            }
            Stmt::Decl(Decl::Fn(function)) => out.push(function.ident.sym.to_string()),
            Stmt::Decl(Decl::Class(class)) => out.push(class.ident.sym.to_string()),
            _ => {}
        }
    }
}

struct Prefixer<'a> {
    parsed: &'a ParsedExpression,
    inserts: Vec<(usize, String)>,
}

impl Prefixer<'_> {
    fn ident(&mut self, name: &str, lo: BytePos, locals: &[String]) {
        if is_free(name, locals) {
            self.inserts
                .push((self.parsed.offset(lo), format!("{}.", CONTEXT)));
        }
    }

    /// `{ a }` becomes `{ a: _ctx.a }`.
    fn shorthand(&mut self, name: &str, lo: BytePos, locals: &[String]) {
        if is_free(name, locals) {
            self.inserts
                .push((self.parsed.offset(lo), format!("{}: {}.", name, CONTEXT)));
        }
    }

    fn expr(&mut self, expr: &Expr, locals: &[String]) {
        match expr {
            Expr::Ident(ident) => self.ident(&ident.sym, ident.span.lo, locals),
            Expr::Array(array) => {
                for elem in array.elems.iter().flatten() {
                    self.expr(&elem.expr, locals);
                }
            }
            Expr::Object(object) => {
                for prop in &object.props {
                    match prop {
                        PropOrSpread::Spread(spread) => self.expr(&spread.expr, locals),
                        PropOrSpread::Prop(prop) => self.prop(prop, locals),
                    }
                }
            }
            Expr::Fn(function) => {
                let mut inner = locals.to_vec();
                inner.extend(function.ident.iter().map(|ident| ident.sym.to_string()));
                self.function(&function.function, &inner);
            }
            Expr::Arrow(arrow) => {
                let mut inner = locals.to_vec();
                for param in &arrow.params {
                    pattern_names(param, &mut inner);
                }
                for param in &arrow.params {
                    self.pat(param, &inner, true);
                }
                match &*arrow.body {
                    BlockStmtOrExpr::Expr(body) => self.expr(body, &inner),
                    BlockStmtOrExpr::BlockStmt(block) => self.body(&block.stmts, inner),
                }
            }
            Expr::Unary(unary) => self.expr(&unary.arg, locals),
            Expr::Update(update) => self.expr(&update.arg, locals),
            Expr::Await(await_expr) => self.expr(&await_expr.arg, locals),
            Expr::Paren(paren) => self.expr(&paren.expr, locals),
            Expr::Yield(yield_expr) => {
                if let Some(arg) = &yield_expr.arg {
                    self.expr(arg, locals);
                }
            }
            Expr::Bin(bin) => {
                self.expr(&bin.left, locals);
                self.expr(&bin.right, locals);
            }
            Expr::Assign(assign) => {
                match &assign.left {
                    PatOrExpr::Expr(target) => self.expr(target, locals),
                    PatOrExpr::Pat(target) => self.pat(target, locals, false),
                }
                self.expr(&assign.right, locals);
            }
            Expr::Cond(cond) => {
                self.expr(&cond.test, locals);
                self.expr(&cond.cons, locals);
                self.expr(&cond.alt, locals);
            }
            Expr::Seq(seq) => {
                for item in &seq.exprs {
                    self.expr(item, locals);
                }
            }
            Expr::Tpl(tpl) => {
                for item in &tpl.exprs {
                    self.expr(item, locals);
                }
            }
            Expr::TaggedTpl(tagged) => {
                self.expr(&tagged.tag, locals);
                for item in &tagged.tpl.exprs {
                    self.expr(item, locals);
                }
            }
            Expr::Member(member) => self.member(member, locals),
            Expr::SuperProp(super_prop) => {
                if let SuperProp::Computed(computed) = &super_prop.prop {
                    self.expr(&computed.expr, locals);
                }
            }
            Expr::Call(call) => {
                if let Callee::Expr(callee) = &call.callee {
                    self.expr(callee, locals);
                }
                self.args(&call.args, locals);
            }
            Expr::New(new) => {
                self.expr(&new.callee, locals);
                if let Some(args) = &new.args {
                    self.args(args, locals);
                }
            }
            Expr::OptChain(chain) => match &*chain.base {
                OptChainBase::Member(member) => self.member(member, locals),
                OptChainBase::Call(call) => {
                    self.expr(&call.callee, locals);
                    self.args(&call.args, locals);
                }
            },
            Expr::Class(class) => {
                if let Some(parent) = &class.class.super_class {
                    self.expr(parent, locals);
                }
            }
            _ => {}
        }
    }

    fn member(&mut self, member: &MemberExpr, locals: &[String]) {
        self.expr(&member.obj, locals);
        if let MemberProp::Computed(computed) = &member.prop {
            self.expr(&computed.expr, locals);
        }
    }

    fn args(&mut self, args: &[ExprOrSpread], locals: &[String]) {
        for arg in args {
            self.expr(&arg.expr, locals);
        }
    }

    fn prop_name(&mut self, key: &PropName, locals: &[String]) {
        if let PropName::Computed(computed) = key {
            self.expr(&computed.expr, locals);
        }
    }

    fn prop(&mut self, prop: &Prop, locals: &[String]) {
        match prop {
            Prop::Shorthand(ident) => self.shorthand(&ident.sym, ident.span.lo, locals),
            Prop::KeyValue(kv) => {
                self.prop_name(&kv.key, locals);
                self.expr(&kv.value, locals);
            }
            Prop::Assign(assign) => self.expr(&assign.value, locals),
            Prop::Getter(getter) => {
                self.prop_name(&getter.key, locals);
                if let Some(body) = &getter.body {
                    self.body(&body.stmts, locals.to_vec());
                }
            }
            Prop::Setter(setter) => {
                self.prop_name(&setter.key, locals);
                let mut inner = locals.to_vec();
                pattern_names(&setter.param, &mut inner);
                if let Some(body) = &setter.body {
                    self.body(&body.stmts, inner);
                }
            }
            Prop::Method(method) => {
                self.prop_name(&method.key, locals);
                self.function(&method.function, locals);
            }
        }
    }

    /// Walk a binding or assignment pattern. Bound names are skipped,
    /// assignment targets are prefixed like any read.
    fn pat(&mut self, pat: &Pat, locals: &[String], bind: bool) {
        match pat {
            Pat::Ident(binding) => {
                if !bind {
                    self.ident(&binding.id.sym, binding.id.span.lo, locals);
                }
            }
            Pat::Array(array) => {
                for elem in array.elems.iter().flatten() {
                    self.pat(elem, locals, bind);
                }
            }
            Pat::Rest(rest) => self.pat(&rest.arg, locals, bind),
            Pat::Object(object) => {
                for prop in &object.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => {
                            self.prop_name(&kv.key, locals);
                            self.pat(&kv.value, locals, bind);
                        }
                        ObjectPatProp::Assign(assign) => {
                            if !bind {
                                self.shorthand(&assign.key.sym, assign.key.span.lo, locals);
                            }
                            if let Some(value) = &assign.value {
                                self.expr(value, locals);
                            }
                        }
                        ObjectPatProp::Rest(rest) => self.pat(&rest.arg, locals, bind),
                    }
                }
            }
            Pat::Assign(assign) => {
                self.pat(&assign.left, locals, bind);
                self.expr(&assign.right, locals);
            }
            Pat::Expr(expr) => self.expr(expr, locals),
            Pat::Invalid(_) => {}
        }
    }

    fn function(&mut self, function: &Function, locals: &[String]) {
        let mut inner = locals.to_vec();
        inner.push("arguments".to_string());
        for param in &function.params {
            pattern_names(&param.pat, &mut inner);
        }
        for param in &function.params {
            self.pat(&param.pat, &inner, true);
        }
        if let Some(body) = &function.body {
            self.body(&body.stmts, inner);
        }
    }

    fn body(&mut self, stmts: &[Stmt], mut locals: Vec<String>) {
        for stmt in stmts {
            var_names(stmt, &mut locals);
        }
        self.block(stmts, &locals);
    }

    fn block(&mut self, stmts: &[Stmt], locals: &[String]) {
        let mut inner = locals.to_vec();
        declared_names(stmts, &mut inner);
        for stmt in stmts {
            self.stmt(stmt, &inner);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, locals: &[String]) {
        match stmt {
            Stmt::Expr(expr) => self.expr(&expr.expr, locals),
            Stmt::Return(ret) => {
                if let Some(arg) = &ret.arg {
                    self.expr(arg, locals);
                }
            }
            Stmt::Throw(throw) => self.expr(&throw.arg, locals),
            Stmt::Block(block) => self.block(&block.stmts, locals),
            Stmt::Labeled(labeled) => self.stmt(&labeled.body, locals),
            Stmt::If(if_stmt) => {
                self.expr(&if_stmt.test, locals);
                self.stmt(&if_stmt.cons, locals);
                if let Some(alt) = &if_stmt.alt {
                    self.stmt(alt, locals);
                }
            }
            Stmt::While(while_stmt) => {
                self.expr(&while_stmt.test, locals);
                self.stmt(&while_stmt.body, locals);
            }
            Stmt::DoWhile(do_while) => {
                self.stmt(&do_while.body, locals);
                self.expr(&do_while.test, locals);
            }
            Stmt::For(for_stmt) => {
                let mut inner = locals.to_vec();
                match &for_stmt.init {
                    Some(VarDeclOrExpr::VarDecl(var)) => {
                        for declarator in &var.decls {
                            pattern_names(&declarator.name, &mut inner);
                        }
                        for declarator in &var.decls {
                            self.pat(&declarator.name, &inner, true);
                            if let Some(init) = &declarator.init {
                                self.expr(init, &inner);
                            }
                        }
                    }
                    Some(VarDeclOrExpr::Expr(init)) => self.expr(init, locals),
                    None => {}
                }
                for expr in for_stmt.test.iter().chain(&for_stmt.update) {
                    self.expr(expr, &inner);
                }
                self.stmt(&for_stmt.body, &inner);
            }
            Stmt::ForIn(ForInStmt {
                left, right, body, ..
            })
            | Stmt::ForOf(ForOfStmt {
                left, right, body, ..
            }) => {
                self.expr(right, locals);
                let mut inner = locals.to_vec();
                match left {
                    ForHead::VarDecl(var) => {
                        for declarator in &var.decls {
                            pattern_names(&declarator.name, &mut inner);
                        }
                    }
                    ForHead::Pat(pat) => self.pat(pat, locals, false),
                    _ => {}
                }
                self.stmt(body, &inner);
            }
            Stmt::Switch(switch) => {
                self.expr(&switch.discriminant, locals);
                let mut inner = locals.to_vec();
                for case in &switch.cases {
                    declared_names(&case.cons, &mut inner);
                }
                for case in &switch.cases {
                    if let Some(test) = &case.test {
                        self.expr(test, &inner);
                    }
                    for stmt in &case.cons {
                        self.stmt(stmt, &inner);
                    }
                }
            }
            Stmt::Try(try_stmt) => {
                self.block(&try_stmt.block.stmts, locals);
                if let Some(handler) = &try_stmt.handler {
                    let mut inner = locals.to_vec();
                    if let Some(param) = &handler.param {
                        pattern_names(param, &mut inner);
                    }
                    self.block(&handler.body.stmts, &inner);
                }
                if let Some(finalizer) = &try_stmt.finalizer {
                    self.block(&finalizer.stmts, locals);
                }
            }
            Stmt::Decl(Decl::Var(var)) => {
                for declarator in &var.decls {
                    self.pat(&declarator.name, locals, true);
                    if let Some(init) = &declarator.init {
                        self.expr(init, locals);
                    }
                }
            }
            Stmt::Decl(Decl::Fn(function)) => self.function(&function.function, locals),
            _ => {}
        }
    }
}
