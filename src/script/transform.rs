//! Source-to-source rewrites applied before a script is instantiated.
//!
//! The fixed sequence is: dynamic-import renaming, dependency extraction,
//! caller-supplied [`SourceTransform`]s, then the module-to-CommonJS
//! rewrite.

use swc_ecma_ast::*;

use super::{is_identifier, pattern_names, ParsedModule, SyntaxError};

/// Name the runtime binds for synchronous `import()` replacement.
pub const DYNAMIC_IMPORT_FN: &str = "__import__";
/// Name the runtime binds for default-import interop.
pub const INTEROP_DEFAULT_FN: &str = "__interop_default__";
/// Name the runtime binds for `export * from` re-exports.
pub const EXPORT_STAR_FN: &str = "__export_star__";

/// A caller-supplied rewrite of a parsed script.
pub trait SourceTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, module: &mut Module, filename: &str) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// Walkers
// ---------------------------------------------------------------------------

/// Generates an expression walker over shared or mutable references.
/// Children are visited before their parent.
macro_rules! expression_walker {
    ($($m:tt)?) => {
        pub fn module(module: &$($m)? Module, f: &mut dyn FnMut(&$($m)? Expr)) {
            for item in &$($m)? module.body {
                match item {
                    ModuleItem::Stmt(s) => stmt(s, f),
                    ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => decl(&$($m)? export.decl, f),
                    ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
                        match &$($m)? export.decl {
                            DefaultDecl::Class(c) => class(&$($m)? c.class, f),
                            DefaultDecl::Fn(func) => function(&$($m)? func.function, f),
                            _ => {}
                        }
                    }
                    ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(export)) => expr(&$($m)? export.expr, f),
                    ModuleItem::ModuleDecl(_) => {}
                }
            }
        }

        pub fn stmt(s: &$($m)? Stmt, f: &mut dyn FnMut(&$($m)? Expr)) {
            match s {
                Stmt::Block(block) => stmts(&$($m)? block.stmts, f),
                Stmt::With(with) => {
                    expr(&$($m)? with.obj, f);
                    stmt(&$($m)? with.body, f);
                }
                Stmt::Return(ret) => {
                    if let Some(arg) = &$($m)? ret.arg {
                        expr(arg, f);
                    }
                }
                Stmt::Labeled(labeled) => stmt(&$($m)? labeled.body, f),
                Stmt::If(if_stmt) => {
                    expr(&$($m)? if_stmt.test, f);
                    stmt(&$($m)? if_stmt.cons, f);
                    if let Some(alt) = &$($m)? if_stmt.alt {
                        stmt(alt, f);
                    }
                }
                Stmt::Switch(switch) => {
                    expr(&$($m)? switch.discriminant, f);
                    for case in &$($m)? switch.cases {
                        if let Some(test) = &$($m)? case.test {
                            expr(test, f);
                        }
                        stmts(&$($m)? case.cons, f);
                    }
                }
                Stmt::Throw(throw) => expr(&$($m)? throw.arg, f),
                Stmt::Try(try_stmt) => {
                    stmts(&$($m)? try_stmt.block.stmts, f);
                    if let Some(handler) = &$($m)? try_stmt.handler {
                        if let Some(param) = &$($m)? handler.param {
                            pat(param, f);
                        }
                        stmts(&$($m)? handler.body.stmts, f);
                    }
                    if let Some(finalizer) = &$($m)? try_stmt.finalizer {
                        stmts(&$($m)? finalizer.stmts, f);
                    }
                }
                Stmt::While(while_stmt) => {
                    expr(&$($m)? while_stmt.test, f);
                    stmt(&$($m)? while_stmt.body, f);
                }
                Stmt::DoWhile(do_while) => {
                    stmt(&$($m)? do_while.body, f);
                    expr(&$($m)? do_while.test, f);
                }
                Stmt::For(for_stmt) => {
                    match &$($m)? for_stmt.init {
                        Some(VarDeclOrExpr::VarDecl(var)) => var_decl(var, f),
                        Some(VarDeclOrExpr::Expr(init)) => expr(init, f),
                        None => {}
                    }
                    if let Some(test) = &$($m)? for_stmt.test {
                        expr(test, f);
                    }
                    if let Some(update) = &$($m)? for_stmt.update {
                        expr(update, f);
                    }
                    stmt(&$($m)? for_stmt.body, f);
                }
                Stmt::ForIn(for_in) => {
                    for_head(&$($m)? for_in.left, f);
                    expr(&$($m)? for_in.right, f);
                    stmt(&$($m)? for_in.body, f);
                }
                Stmt::ForOf(for_of) => {
                    for_head(&$($m)? for_of.left, f);
                    expr(&$($m)? for_of.right, f);
                    stmt(&$($m)? for_of.body, f);
                }
                Stmt::Decl(d) => decl(d, f),
                Stmt::Expr(expr_stmt) => expr(&$($m)? expr_stmt.expr, f),
                Stmt::Empty(_) | Stmt::Debugger(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
            }
        }

        fn stmts(list: &$($m)? Vec<Stmt>, f: &mut dyn FnMut(&$($m)? Expr)) {
            for s in list {
                stmt(s, f);
            }
        }

        fn for_head(head: &$($m)? ForHead, f: &mut dyn FnMut(&$($m)? Expr)) {
            match head {
                ForHead::VarDecl(var) => var_decl(var, f),
                ForHead::Pat(p) => pat(p, f),
                _ => {}
            }
        }

        fn decl(d: &$($m)? Decl, f: &mut dyn FnMut(&$($m)? Expr)) {
            match d {
                Decl::Class(c) => class(&$($m)? c.class, f),
                Decl::Fn(func) => function(&$($m)? func.function, f),
                Decl::Var(var) => var_decl(var, f),
                _ => {}
            }
        }

        fn var_decl(var: &$($m)? VarDecl, f: &mut dyn FnMut(&$($m)? Expr)) {
            for declarator in &$($m)? var.decls {
                pat(&$($m)? declarator.name, f);
                if let Some(init) = &$($m)? declarator.init {
                    expr(init, f);
                }
            }
        }

        fn function(func: &$($m)? Function, f: &mut dyn FnMut(&$($m)? Expr)) {
            for param in &$($m)? func.params {
                pat(&$($m)? param.pat, f);
            }
            if let Some(body) = &$($m)? func.body {
                stmts(&$($m)? body.stmts, f);
            }
        }

        fn class(c: &$($m)? Class, f: &mut dyn FnMut(&$($m)? Expr)) {
            if let Some(super_class) = &$($m)? c.super_class {
                expr(super_class, f);
            }
            for member in &$($m)? c.body {
                match member {
                    ClassMember::Constructor(ctor) => {
                        prop_name(&$($m)? ctor.key, f);
                        for param in &$($m)? ctor.params {
                            if let ParamOrTsParamProp::Param(param) = param {
                                pat(&$($m)? param.pat, f);
                            }
                        }
                        if let Some(body) = &$($m)? ctor.body {
                            stmts(&$($m)? body.stmts, f);
                        }
                    }
                    ClassMember::Method(method) => {
                        prop_name(&$($m)? method.key, f);
                        function(&$($m)? method.function, f);
                    }
                    ClassMember::PrivateMethod(method) => function(&$($m)? method.function, f),
                    ClassMember::ClassProp(prop) => {
                        prop_name(&$($m)? prop.key, f);
                        if let Some(value) = &$($m)? prop.value {
                            expr(value, f);
                        }
                    }
                    ClassMember::PrivateProp(prop) => {
                        if let Some(value) = &$($m)? prop.value {
                            expr(value, f);
                        }
                    }
                    ClassMember::StaticBlock(block) => stmts(&$($m)? block.body.stmts, f),
                    _ => {}
                }
            }
        }

        fn prop_name(name: &$($m)? PropName, f: &mut dyn FnMut(&$($m)? Expr)) {
            if let PropName::Computed(computed) = name {
                expr(&$($m)? computed.expr, f);
            }
        }

        fn pat(p: &$($m)? Pat, f: &mut dyn FnMut(&$($m)? Expr)) {
            match p {
                Pat::Array(array) => {
                    for elem in &$($m)? array.elems {
                        if let Some(elem) = elem {
                            pat(elem, f);
                        }
                    }
                }
                Pat::Rest(rest) => pat(&$($m)? rest.arg, f),
                Pat::Object(object) => {
                    for prop in &$($m)? object.props {
                        match prop {
                            ObjectPatProp::KeyValue(kv) => {
                                prop_name(&$($m)? kv.key, f);
                                pat(&$($m)? kv.value, f);
                            }
                            ObjectPatProp::Assign(assign) => {
                                if let Some(value) = &$($m)? assign.value {
                                    expr(value, f);
                                }
                            }
                            ObjectPatProp::Rest(rest) => pat(&$($m)? rest.arg, f),
                        }
                    }
                }
                Pat::Assign(assign) => {
                    pat(&$($m)? assign.left, f);
                    expr(&$($m)? assign.right, f);
                }
                Pat::Expr(target) => expr(target, f),
                Pat::Ident(_) | Pat::Invalid(_) => {}
            }
        }

        fn args(list: &$($m)? Vec<ExprOrSpread>, f: &mut dyn FnMut(&$($m)? Expr)) {
            for arg in list {
                expr(&$($m)? arg.expr, f);
            }
        }

        pub fn expr(e: &$($m)? Expr, f: &mut dyn FnMut(&$($m)? Expr)) {
            match e {
                Expr::Array(array) => {
                    for elem in &$($m)? array.elems {
                        if let Some(elem) = elem {
                            expr(&$($m)? elem.expr, f);
                        }
                    }
                }
                Expr::Object(object) => {
                    for prop in &$($m)? object.props {
                        match prop {
                            PropOrSpread::Spread(spread) => expr(&$($m)? spread.expr, f),
                            PropOrSpread::Prop(prop) => match &$($m)? **prop {
                                Prop::Shorthand(_) => {}
                                Prop::KeyValue(kv) => {
                                    prop_name(&$($m)? kv.key, f);
                                    expr(&$($m)? kv.value, f);
                                }
                                Prop::Assign(assign) => expr(&$($m)? assign.value, f),
                                Prop::Getter(getter) => {
                                    prop_name(&$($m)? getter.key, f);
                                    if let Some(body) = &$($m)? getter.body {
                                        stmts(&$($m)? body.stmts, f);
                                    }
                                }
                                Prop::Setter(setter) => {
                                    prop_name(&$($m)? setter.key, f);
                                    pat(&$($m)? setter.param, f);
                                    if let Some(body) = &$($m)? setter.body {
                                        stmts(&$($m)? body.stmts, f);
                                    }
                                }
                                Prop::Method(method) => {
                                    prop_name(&$($m)? method.key, f);
                                    function(&$($m)? method.function, f);
                                }
                            },
                        }
                    }
                }
                Expr::Fn(func) => function(&$($m)? func.function, f),
                Expr::Unary(unary) => expr(&$($m)? unary.arg, f),
                Expr::Update(update) => expr(&$($m)? update.arg, f),
                Expr::Await(await_expr) => expr(&$($m)? await_expr.arg, f),
                Expr::Yield(yield_expr) => {
                    if let Some(arg) = &$($m)? yield_expr.arg {
                        expr(arg, f);
                    }
                }
                Expr::Bin(bin) => {
                    expr(&$($m)? bin.left, f);
                    expr(&$($m)? bin.right, f);
                }
                Expr::Assign(assign) => {
                    match &$($m)? assign.left {
                        PatOrExpr::Expr(target) => expr(target, f),
                        PatOrExpr::Pat(target) => pat(target, f),
                    }
                    expr(&$($m)? assign.right, f);
                }
                Expr::Member(member) => {
                    expr(&$($m)? member.obj, f);
                    if let MemberProp::Computed(computed) = &$($m)? member.prop {
                        expr(&$($m)? computed.expr, f);
                    }
                }
                Expr::SuperProp(super_prop) => {
                    if let SuperProp::Computed(computed) = &$($m)? super_prop.prop {
                        expr(&$($m)? computed.expr, f);
                    }
                }
                Expr::Cond(cond) => {
                    expr(&$($m)? cond.test, f);
                    expr(&$($m)? cond.cons, f);
                    expr(&$($m)? cond.alt, f);
                }
                Expr::Call(call) => {
                    if let Callee::Expr(callee) = &$($m)? call.callee {
                        expr(callee, f);
                    }
                    args(&$($m)? call.args, f);
                }
                Expr::New(new) => {
                    expr(&$($m)? new.callee, f);
                    if let Some(list) = &$($m)? new.args {
                        args(list, f);
                    }
                }
                Expr::Seq(seq) => {
                    for item in &$($m)? seq.exprs {
                        expr(item, f);
                    }
                }
                Expr::Tpl(tpl) => {
                    for item in &$($m)? tpl.exprs {
                        expr(item, f);
                    }
                }
                Expr::TaggedTpl(tagged) => {
                    expr(&$($m)? tagged.tag, f);
                    for item in &$($m)? tagged.tpl.exprs {
                        expr(item, f);
                    }
                }
                Expr::Arrow(arrow) => {
                    for param in &$($m)? arrow.params {
                        pat(param, f);
                    }
                    let body: &$($m)? BlockStmtOrExpr = &$($m)? arrow.body;
                    match body {
                        BlockStmtOrExpr::BlockStmt(block) => stmts(&$($m)? block.stmts, f),
                        BlockStmtOrExpr::Expr(body) => expr(body, f),
                    }
                }
                Expr::Class(c) => class(&$($m)? c.class, f),
                Expr::Paren(paren) => expr(&$($m)? paren.expr, f),
                Expr::OptChain(chain) => {
                    let base: &$($m)? OptChainBase = &$($m)? chain.base;
                    match base {
                        OptChainBase::Member(member) => {
                            expr(&$($m)? member.obj, f);
                            if let MemberProp::Computed(computed) = &$($m)? member.prop {
                                expr(&$($m)? computed.expr, f);
                            }
                        }
                        OptChainBase::Call(call) => {
                            expr(&$($m)? call.callee, f);
                            args(&$($m)? call.args, f);
                        }
                    }
                }
                _ => {}
            }
            f(e);
        }
    };
}

/// Read-only walk over every expression.
pub mod walk {
    use super::*;
    expression_walker!();
}

/// Mutable walk over every expression.
pub mod walk_mut {
    use super::*;
    expression_walker!(mut);
}

// ---------------------------------------------------------------------------
// Fixed rewrites
// ---------------------------------------------------------------------------

/// Replace every `import(x)` with a call to the runtime's synchronous loader.
pub fn rename_dynamic_import(module: &mut Module) {
    walk_mut::module(module, &mut |expr| {
        if let Expr::Call(call) = expr {
            if matches!(call.callee, Callee::Import(_)) {
                call.callee = Callee::Expr(Box::new(Expr::Ident(Ident::new(
                    DYNAMIC_IMPORT_FN.into(),
                    call.span,
                ))));
            }
        }
    });
}

fn string_argument(call: &CallExpr) -> Option<&str> {
    match call.args.first() {
        Some(ExprOrSpread { spread: None, expr }) => match &**expr {
            Expr::Lit(Lit::Str(value)) => Some(&*value.value),
            _ => None,
        },
        _ => None,
    }
}

/// Module specifiers a script references, in first-seen order.
///
/// Covers static imports, re-exports, `require("x")`, and dynamic imports
/// with a string literal specifier.
pub fn parse_deps(module: &Module) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    let mut push = |spec: &str| {
        if !deps.iter().any(|d| d == spec) {
            deps.push(spec.to_string());
        }
    };

    for item in &module.body {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => push(&*import.src.value),
            ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(NamedExport {
                src: Some(src), ..
            })) => push(&*src.value),
            ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)) => push(&*export.src.value),
            _ => {}
        }
    }

    walk::module(module, &mut |expr| {
        let Expr::Call(call) = expr else {
            return;
        };
        let is_loader = match &call.callee {
            Callee::Import(_) => true,
            Callee::Expr(callee) => matches!(
                &**callee,
                Expr::Ident(ident) if &*ident.sym == "require" || &*ident.sym == DYNAMIC_IMPORT_FN
            ),
            Callee::Super(_) => false,
        };
        if is_loader {
            if let Some(spec) = string_argument(call) {
                push(spec);
            }
        }
    });
    deps
}

// ---------------------------------------------------------------------------
// CommonJS
// ---------------------------------------------------------------------------

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(value) => value.value.to_string(),
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, js_string(name))
    }
}

fn declared_names(decl: &Decl) -> Vec<String> {
    let mut names = Vec::new();
    match decl {
        Decl::Var(var) => {
            for declarator in &var.decls {
                pattern_names(&declarator.name, &mut names);
            }
        }
        Decl::Fn(func) => names.push(func.ident.sym.to_string()),
        Decl::Class(class) => names.push(class.ident.sym.to_string()),
        _ => {}
    }
    names
}

/// Collects the rewritten body. Generated code is buffered and parsed in
/// runs so original items keep their place between generated ones.
struct CommonJs<'a> {
    script: &'a ParsedModule,
    body: Vec<ModuleItem>,
    pending: String,
    temps: usize,
}

impl CommonJs<'_> {
    fn line(&mut self, code: String) {
        self.pending.push_str(&code);
        self.pending.push('\n');
    }

    fn temp(&mut self) -> String {
        let name = format!("_dep{}", self.temps);
        self.temps += 1;
        name
    }

    fn flush(&mut self) -> Result<(), SyntaxError> {
        if !self.pending.is_empty() {
            let code = std::mem::take(&mut self.pending);
            self.body.extend(self.script.parse_items(&code)?);
        }
        Ok(())
    }

    fn item(&mut self, item: ModuleItem) -> Result<(), SyntaxError> {
        self.flush()?;
        self.body.push(item);
        Ok(())
    }

    /// `exports.default = <value>;`
    fn export_default(&mut self, value: Box<Expr>) -> Result<(), SyntaxError> {
        self.flush()?;
        let mut items = self.script.parse_items("exports.default = void 0;")?;
        if let Some(ModuleItem::Stmt(Stmt::Expr(stmt))) = items.first_mut() {
            if let Expr::Assign(assign) = &mut *stmt.expr {
                assign.right = value;
            }
        }
        self.body.extend(items);
        Ok(())
    }

    fn import(&mut self, import: ImportDecl) {
        let source = js_string(&import.src.value);
        if import.specifiers.is_empty() {
            self.line(format!("require({});", source));
            return;
        }
        let temp = self.temp();
        self.line(format!("const {} = require({});", temp, source));
        for spec in import.specifiers {
            let line = match spec {
                ImportSpecifier::Default(spec) => format!(
                    "const {} = {}({}).default;",
                    spec.local.sym, INTEROP_DEFAULT_FN, temp
                ),
                ImportSpecifier::Namespace(spec) => format!("const {} = {};", spec.local.sym, temp),
                ImportSpecifier::Named(spec) => {
                    let imported = spec
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| spec.local.sym.to_string());
                    let value = if imported == "default" {
                        format!("{}({}).default", INTEROP_DEFAULT_FN, temp)
                    } else {
                        member(&temp, &imported)
                    };
                    format!("const {} = {};", spec.local.sym, value)
                }
            };
            self.line(line);
        }
    }

    fn re_export(&mut self, export: NamedExport, trailing: &mut Vec<String>) {
        let Some(src) = &export.src else {
            for spec in export.specifiers {
                if let ExportSpecifier::Named(spec) = spec {
                    let local = export_name(&spec.orig);
                    let exported = spec.exported.as_ref().map(export_name).unwrap_or_else(|| local.clone());
                    trailing.push(format!("{} = {};", member("exports", &exported), local));
                }
            }
            return;
        };
        let temp = self.temp();
        self.line(format!("const {} = require({});", temp, js_string(&src.value)));
        let interop = format!("{}({}).default", INTEROP_DEFAULT_FN, temp);
        for spec in export.specifiers {
            let line = match spec {
                ExportSpecifier::Named(spec) => {
                    let orig = export_name(&spec.orig);
                    let exported = spec.exported.as_ref().map(export_name).unwrap_or_else(|| orig.clone());
                    let value = if orig == "default" { interop.clone() } else { member(&temp, &orig) };
                    format!("{} = {};", member("exports", &exported), value)
                }
                ExportSpecifier::Namespace(spec) => {
                    format!("{} = {};", member("exports", &export_name(&spec.name)), temp)
                }
                ExportSpecifier::Default(spec) => {
                    format!("{} = {};", member("exports", &spec.exported.sym), interop)
                }
            };
            self.line(line);
        }
    }
}

/// Rewrite module syntax into `require` / `exports` form.
///
/// Scripts without `import`/`export` are left unchanged. Exported
/// declarations are assigned to `exports` after the last statement, so
/// hoisted functions and earlier bindings are all visible.
pub fn to_commonjs(script: &mut ParsedModule) -> Result<(), SyntaxError> {
    let is_module = script
        .module
        .body
        .iter()
        .any(|item| matches!(item, ModuleItem::ModuleDecl(_)));
    if !is_module {
        return Ok(());
    }

    let items = std::mem::take(&mut script.module.body);
    let mut trailing = Vec::new();
    let mut out = CommonJs {
        script,
        body: Vec::new(),
        pending: String::new(),
        temps: 0,
    };
    out.line("exports.__esModule = true;".to_string());

    for item in items {
        let decl = match item {
            ModuleItem::Stmt(stmt) => {
                out.item(ModuleItem::Stmt(stmt))?;
                continue;
            }
            ModuleItem::ModuleDecl(decl) => decl,
        };
        match decl {
            ModuleDecl::Import(import) => out.import(import),
            ModuleDecl::ExportDecl(export) => {
                for name in declared_names(&export.decl) {
                    trailing.push(format!("{} = {};", member("exports", &name), name));
                }
                out.item(ModuleItem::Stmt(Stmt::Decl(export.decl)))?;
            }
            ModuleDecl::ExportDefaultExpr(export) => out.export_default(export.expr)?,
            ModuleDecl::ExportDefaultDecl(export) => match export.decl {
                DefaultDecl::Fn(FnExpr {
                    ident: Some(ident),
                    function,
                }) => {
                    let name = ident.sym.to_string();
                    out.item(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
                        ident,
                        declare: false,
                        function,
                    }))))?;
                    out.line(format!("exports.default = {};", name));
                }
                DefaultDecl::Class(ClassExpr {
                    ident: Some(ident),
                    class,
                }) => {
                    let name = ident.sym.to_string();
                    out.item(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
                        ident,
                        declare: false,
                        class,
                    }))))?;
                    out.line(format!("exports.default = {};", name));
                }
                DefaultDecl::Fn(func) => out.export_default(Box::new(Expr::Fn(func)))?,
                DefaultDecl::Class(class) => out.export_default(Box::new(Expr::Class(class)))?,
                DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportNamed(export) => out.re_export(export, &mut trailing),
            ModuleDecl::ExportAll(export) => out.line(format!(
                "{}(exports, require({}));",
                EXPORT_STAR_FN,
                js_string(&export.src.value)
            )),
            _ => {}
        }
    }

    for line in trailing {
        out.line(line);
    }
    out.flush()?;
    let body = out.body;
    script.module.body = body;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_module;
    use pretty_assertions::assert_eq;

    fn commonjs(source: &str) -> String {
        let mut script = ParsedModule::parse(source).unwrap();
        to_commonjs(&mut script).unwrap();
        script.print().unwrap()
    }

    #[test]
    fn renames_dynamic_import() {
        let mut script = ParsedModule::parse("const m = import('./a.js')").unwrap();
        rename_dynamic_import(&mut script.module);
        let out = script.print().unwrap();
        assert!(out.contains("__import__("), "{}", out);
        assert!(!out.contains("import("), "{}", out);
    }

    #[test]
    fn collects_deps_in_order_without_duplicates() {
        let module = parse_module(
            "import a from './a.vue'\n\
             export { b } from './b.js'\n\
             const c = require('./c.js')\n\
             const again = require('./a.vue')\n\
             export * from 'd'\n\
             function lazy() { return import('./e.vue') }\n\
             class K { load() { return require(`./tpl.js`) } static f = () => require('./f.js') }",
        )
        .unwrap();
        assert_eq!(
            parse_deps(&module),
            vec!["./a.vue", "./b.js", "d", "./c.js", "./e.vue", "./f.js"]
        );
    }

    #[test]
    fn dynamic_specifier_is_not_a_dep() {
        let module = parse_module("const m = require(name)\nconst n = import(`./${name}.js`)").unwrap();
        assert!(parse_deps(&module).is_empty());
    }

    #[test]
    fn converts_imports_and_default_export() {
        let out = commonjs(
            "import Child from './child.vue'\nimport { x as y, default as z } from 'lib'\nexport default { components: { Child }, y }",
        );
        let expected_prefix = "exports.__esModule = true;\n\
             const _dep0 = require(\"./child.vue\");\n\
             const Child = __interop_default__(_dep0).default;\n\
             const _dep1 = require(\"lib\");\n\
             const y = _dep1.x;\n\
             const z = __interop_default__(_dep1).default;\n\
             exports.default = {";
        assert!(out.starts_with(expected_prefix), "{}", out);
        assert!(parse_module(&out).is_ok());
    }

    #[test]
    fn exported_declarations_are_assigned_at_the_end() {
        let out = commonjs(
            "export const a = 1, { b } = { b: 2 }\nexport function f() {}\nexport class K {}\nconst c = 2\nexport { c as 'd-e' }",
        );
        assert!(
            out.trim_end().ends_with(
                "exports.a = a;\nexports.b = b;\nexports.f = f;\nexports.K = K;\nexports[\"d-e\"] = c;"
            ),
            "{}",
            out
        );
    }

    #[test]
    fn named_default_declarations_stay_bound() {
        let out = commonjs("export default function setup() { return setup }");
        assert!(out.contains("function setup()"), "{}", out);
        assert!(out.trim_end().ends_with("exports.default = setup;"), "{}", out);
    }

    #[test]
    fn plain_scripts_are_left_alone() {
        let source = "module.exports = { a: 1 };\n";
        let mut script = ParsedModule::parse(source).unwrap();
        let before = script.module.clone();
        to_commonjs(&mut script).unwrap();
        assert_eq!(script.module, before);
    }

    #[test]
    fn re_exports_use_runtime_helpers() {
        let out = commonjs("export * from './all.js'\nexport { default as Base, x } from './base.js'\nexport * as ns from './ns.js'");
        assert!(out.contains("__export_star__(exports, require(\"./all.js\"));"), "{}", out);
        assert!(out.contains("exports.Base = __interop_default__(_dep0).default;"), "{}", out);
        assert!(out.contains("exports.x = _dep0.x;"), "{}", out);
        assert!(out.contains("exports.ns = _dep1;"), "{}", out);
    }
}
