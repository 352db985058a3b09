//! Tree-walking evaluator over the parsed script AST.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arcstr::ArcStr;
use parking_lot::RwLock;

use super::globals;
use super::value::{format_number, Array, ClassCode, Closure, Code, Function, Object, Value};
use super::RuntimeError;
use crate::script::ast::{self, *};
use crate::script::{pattern_names, var_names};

/// Nested calls allowed before evaluation fails with a stack overflow.
pub const MAX_CALL_DEPTH: usize = 64;

// Hidden bindings; not valid identifiers, so scripts cannot shadow them.
const HOME_BINDING: &str = "%home";
const CLASS_BINDING: &str = "%class";

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

struct Binding {
    value: Value,
    mutable: bool,
}

struct Scope {
    vars: RwLock<HashMap<String, Binding>>,
    parent: Option<Env>,
}

/// A lexical scope chain.
#[derive(Clone)]
pub struct Env(Arc<Scope>);

impl Env {
    pub fn new() -> Self {
        Env(Arc::new(Scope {
            vars: RwLock::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Env(Arc::new(Scope {
            vars: RwLock::new(HashMap::new()),
            parent: Some(self.clone()),
        }))
    }

    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .vars
            .write()
            .insert(name.to_string(), Binding { value, mutable });
    }

    fn has_own(&self, name: &str) -> bool {
        self.0.vars.read().contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(binding) = env.0.vars.read().get(name) {
                return Some(binding.value.clone());
            }
            scope = env.0.parent.as_ref();
        }
        None
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(binding) = env.0.vars.write().get_mut(name) {
                if !binding.mutable {
                    return Err(RuntimeError::Type(
                        "Assignment to constant variable.".to_string(),
                    ));
                }
                binding.value = value;
                return Ok(());
            }
            scope = env.0.parent.as_ref();
        }
        Err(RuntimeError::Reference(name.to_string()))
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

enum Completion {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BindKind {
    Var,
    Let,
    Const,
    Assign,
}

impl From<VarDeclKind> for BindKind {
    fn from(kind: VarDeclKind) -> Self {
        match kind {
            VarDeclKind::Var => BindKind::Var,
            VarDeclKind::Let => BindKind::Let,
            VarDeclKind::Const => BindKind::Const,
        }
    }
}

/// A place an assignment writes to.
enum Target {
    Name(String),
    Member(Value, String),
}

fn unsupported(what: &str) -> RuntimeError {
    RuntimeError::Type(format!("{} is not supported", what))
}

#[derive(Debug, Default)]
pub struct Interpreter {
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a whole script in `env`. Module declarations must already have
    /// been rewritten away.
    pub fn run(&mut self, module: Module, env: &Env) -> Result<(), RuntimeError> {
        let body = module
            .body
            .into_iter()
            .map(|item| match item {
                ModuleItem::Stmt(stmt) => Ok(stmt),
                ModuleItem::ModuleDecl(_) => Err(RuntimeError::Type(
                    "Cannot use import/export outside a module".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        hoist_vars(&body, env);
        self.exec_block(&body, env)?;
        Ok(())
    }

    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Call a function value with an explicit `this`.
    pub fn call(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let Value::Function(function) = callee else {
            return Err(RuntimeError::Type(format!(
                "{} is not a function",
                callee.to_display()
            )));
        };
        self.guarded(|interp| match function {
            Function::Native(native) => (native.func)(interp, this, args),
            Function::Closure(closure) => interp.call_closure(closure, this, args),
        })
    }

    fn call_closure(
        &mut self,
        closure: &Closure,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let scope = closure.env.child();
        match &closure.code {
            Code::Function(function) => {
                if function.is_async || function.is_generator {
                    return Err(unsupported("Calling async or generator functions"));
                }
                scope.declare("this", this, false);
                scope.declare("arguments", Value::Array(Array::from_vec(args.clone())), true);
                if let Some(home) = &closure.home {
                    scope.declare(HOME_BINDING, Value::Object(home.clone()), false);
                }
                self.bind_params(function.params.iter().map(|param| &param.pat), args, &scope)?;
                match &function.body {
                    Some(body) => self.exec_function_body(&body.stmts, &scope),
                    None => Ok(Value::Undefined),
                }
            }
            // Arrows see `this` of the scope they were created in.
            Code::Arrow(arrow) => {
                if arrow.is_async || arrow.is_generator {
                    return Err(unsupported("Calling async functions"));
                }
                self.bind_params(arrow.params.iter(), args, &scope)?;
                let body: &BlockStmtOrExpr = &arrow.body;
                match body {
                    BlockStmtOrExpr::BlockStmt(block) => self.exec_function_body(&block.stmts, &scope),
                    BlockStmtOrExpr::Expr(expr) => self.eval(expr, &scope),
                }
            }
            Code::Class(_) => Err(RuntimeError::Type(format!(
                "Class constructor {} cannot be invoked without 'new'",
                closure.name
            ))),
        }
    }

    fn exec_function_body(&mut self, body: &[Stmt], scope: &Env) -> Result<Value, RuntimeError> {
        hoist_vars(body, scope);
        match self.exec_block(body, scope)? {
            Completion::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn bind_params<'p>(
        &mut self,
        params: impl Iterator<Item = &'p Pat>,
        args: Vec<Value>,
        scope: &Env,
    ) -> Result<(), RuntimeError> {
        let mut args = args.into_iter();
        for param in params {
            match param {
                Pat::Rest(rest) => {
                    let rest_args = Value::Array(Array::from_vec(args.by_ref().collect()));
                    self.bind_pattern(&rest.arg, rest_args, scope, BindKind::Let)?;
                }
                other => {
                    let value = args.next().unwrap_or_default();
                    self.bind_pattern(other, value, scope, BindKind::Let)?;
                }
            }
        }
        Ok(())
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(Function::Closure(closure)) => {
                let Some(prototype) = closure.prototype_object() else {
                    return Err(RuntimeError::Type(format!(
                        "{} is not a constructor",
                        display_name(&closure.name)
                    )));
                };
                let this = Value::Object(Object::with_prototype(Some(prototype)));
                let result = self.construct_into(callee, this.clone(), args)?;
                Ok(match result {
                    value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => value,
                    _ => this,
                })
            }
            // Native constructors build and return their own object.
            Value::Function(Function::Native(_)) => self.call(callee, Value::Undefined, args),
            other => Err(RuntimeError::Type(format!(
                "{} is not a constructor",
                other.to_display()
            ))),
        }
    }

    /// Run `callee` as a constructor on an already allocated `this`.
    fn construct_into(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let closure = match callee {
            Value::Function(Function::Closure(closure)) => closure,
            Value::Function(Function::Native(native)) => {
                // `extends Error` and friends: copy what the native built.
                let built = self.guarded(|interp| (native.func)(interp, this.clone(), args))?;
                if let (Value::Object(target), Value::Object(source)) = (&this, &built) {
                    target.assign(source);
                }
                return Ok(Value::Undefined);
            }
            other => {
                return Err(RuntimeError::Type(format!(
                    "Class extends value {} is not a constructor",
                    other.to_display()
                )))
            }
        };
        let Code::Class(class) = &closure.code else {
            return self.call(callee, this, args);
        };
        self.guarded(|interp| {
            let Some(constructor) = &class.constructor else {
                if let Some(parent) = &class.parent {
                    interp.construct_into(parent, this.clone(), args)?;
                }
                interp.init_fields(closure, class, &this)?;
                return Ok(Value::Undefined);
            };
            if class.parent.is_none() {
                interp.init_fields(closure, class, &this)?;
            }
            let scope = closure.env.child();
            scope.declare("this", this, false);
            scope.declare("arguments", Value::Array(Array::from_vec(args.clone())), true);
            scope.declare(CLASS_BINDING, callee.clone(), false);
            if let Some(prototype) = closure.prototype_object() {
                scope.declare(HOME_BINDING, Value::Object(prototype), false);
            }
            let params = constructor
                .params
                .iter()
                .map(|param| match param {
                    ParamOrTsParamProp::Param(param) => Ok(&param.pat),
                    ParamOrTsParamProp::TsParamProp(_) => Err(unsupported("Parameter properties")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            interp.bind_params(params.into_iter(), args, &scope)?;
            match &constructor.body {
                Some(body) => interp.exec_function_body(&body.stmts, &scope),
                None => Ok(Value::Undefined),
            }
        })
    }

    fn init_fields(&mut self, closure: &Closure, class: &ClassCode, this: &Value) -> Result<(), RuntimeError> {
        if class.fields.is_empty() {
            return Ok(());
        }
        let scope = closure.env.child();
        scope.declare("this", this.clone(), false);
        for (key, init) in &class.fields {
            let value = match init {
                Some(init) => self.eval(init, &scope)?,
                None => Value::Undefined,
            };
            set_property(this, key, value)?;
        }
        Ok(())
    }

    /// `super(...args)` inside a derived constructor.
    fn call_super(&mut self, args: Vec<Value>, env: &Env) -> Result<Value, RuntimeError> {
        let class_value = env.lookup(CLASS_BINDING).unwrap_or_default();
        let this = env.lookup("this").unwrap_or_default();
        let Value::Function(Function::Closure(closure)) = &class_value else {
            return Err(RuntimeError::Type("'super' keyword unexpected here".to_string()));
        };
        let Code::Class(class) = &closure.code else {
            return Err(RuntimeError::Type("'super' keyword unexpected here".to_string()));
        };
        if let Some(parent) = &class.parent {
            self.construct_into(parent, this.clone(), args)?;
        }
        self.init_fields(closure, class, &this)?;
        Ok(Value::Undefined)
    }

    // -- statements ---------------------------------------------------------

    /// Run statements in `env`, hoisting the function declarations first.
    fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<Completion, RuntimeError> {
        self.hoist_functions(body, env);
        for stmt in body {
            match self.exec(stmt, env)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn hoist_functions(&mut self, body: &[Stmt], env: &Env) {
        for stmt in body {
            if let Stmt::Decl(Decl::Fn(decl)) = stmt {
                let name = &*decl.ident.sym;
                let function = make_function(name, &decl.function, env, None);
                env.declare(name, function, true);
            }
        }
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Completion, RuntimeError> {
        self.exec_labeled(stmt, env, None)
    }

    /// Leave a loop iteration: `None` keeps looping.
    fn loop_step(
        &mut self,
        body: &Stmt,
        env: &Env,
        label: Option<&str>,
    ) -> Result<Option<Completion>, RuntimeError> {
        let own = |target: &Option<String>| match target {
            None => true,
            Some(target) => Some(target.as_str()) == label,
        };
        Ok(match self.exec(body, env)? {
            Completion::Normal => None,
            Completion::Continue(target) if own(&target) => None,
            Completion::Break(target) if own(&target) => Some(Completion::Normal),
            abrupt => Some(abrupt),
        })
    }

    fn exec_labeled(
        &mut self,
        stmt: &Stmt,
        env: &Env,
        label: Option<&str>,
    ) -> Result<Completion, RuntimeError> {
        match stmt {
            Stmt::Block(block) => self.exec_block(&block.stmts, &env.child()),
            Stmt::Empty(_) | Stmt::Debugger(_) => Ok(Completion::Normal),
            Stmt::With(_) => Err(unsupported("'with'")),
            Stmt::Return(ret) => {
                let value = match &ret.arg {
                    Some(arg) => self.eval(arg, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::Labeled(labeled) => {
                let name = labeled.label.sym.to_string();
                Ok(match self.exec_labeled(&labeled.body, env, Some(&name))? {
                    Completion::Break(Some(target)) if target == name => Completion::Normal,
                    other => other,
                })
            }
            Stmt::Break(stmt) => Ok(Completion::Break(
                stmt.label.as_ref().map(|label| label.sym.to_string()),
            )),
            Stmt::Continue(stmt) => Ok(Completion::Continue(
                stmt.label.as_ref().map(|label| label.sym.to_string()),
            )),
            Stmt::If(if_stmt) => {
                if self.eval(&if_stmt.test, env)?.is_truthy() {
                    self.exec(&if_stmt.cons, env)
                } else if let Some(alt) = &if_stmt.alt {
                    self.exec(alt, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Switch(switch) => self.exec_switch(switch, env),
            Stmt::Throw(throw) => Err(RuntimeError::Thrown(self.eval(&throw.arg, env)?)),
            Stmt::Try(try_stmt) => self.exec_try(try_stmt, env),
            Stmt::While(while_stmt) => {
                while self.eval(&while_stmt.test, env)?.is_truthy() {
                    if let Some(done) = self.loop_step(&while_stmt.body, env, label)? {
                        return Ok(done);
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile(do_while) => {
                loop {
                    if let Some(done) = self.loop_step(&do_while.body, env, label)? {
                        return Ok(done);
                    }
                    if !self.eval(&do_while.test, env)?.is_truthy() {
                        return Ok(Completion::Normal);
                    }
                }
            }
            Stmt::For(for_stmt) => self.exec_for(for_stmt, env, label),
            Stmt::ForIn(for_in) => {
                let keys = match self.eval(&for_in.right, env)? {
                    Value::Object(object) => object.keys().into_iter().map(Value::String).collect(),
                    Value::Array(array) => index_keys(array.len()),
                    Value::String(text) => index_keys(text.chars().count()),
                    Value::Function(Function::Closure(closure)) => {
                        closure.properties.keys().into_iter().map(Value::String).collect()
                    }
                    _ => Vec::new(),
                };
                self.exec_for_each(&for_in.left, keys, &for_in.body, env, label)
            }
            Stmt::ForOf(for_of) => {
                if for_of.is_await {
                    return Err(unsupported("'for await'"));
                }
                let items = iterate(&self.eval(&for_of.right, env)?)?;
                self.exec_for_each(&for_of.left, items, &for_of.body, env, label)
            }
            Stmt::Decl(decl) => {
                match decl {
                    Decl::Var(var) => self.exec_var_decl(var, env)?,
                    // Hoisted by `exec_block`.
                    Decl::Fn(_) => {}
                    Decl::Class(class) => {
                        let name = &*class.ident.sym;
                        let value = self.eval_class(name, &class.class, env)?;
                        env.declare(name, value, true);
                    }
                    _ => return Err(unsupported("This declaration")),
                }
                Ok(Completion::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(&expr.expr, env)?;
                Ok(Completion::Normal)
            }
        }
    }

    fn exec_var_decl(&mut self, var: &VarDecl, env: &Env) -> Result<(), RuntimeError> {
        let kind = BindKind::from(var.kind);
        for declarator in &var.decls {
            let value = match &declarator.init {
                Some(init) => self.eval(init, env)?,
                // `var x;` keeps the hoisted value.
                None if kind == BindKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.name, value, env, kind)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        for_stmt: &ForStmt,
        env: &Env,
        label: Option<&str>,
    ) -> Result<Completion, RuntimeError> {
        let scope = env.child();
        // `let` bindings of the head get a fresh copy per iteration.
        let mut lexical = Vec::new();
        let mut mutable = true;
        match &for_stmt.init {
            Some(VarDeclOrExpr::VarDecl(var)) => {
                self.exec_var_decl(var, &scope)?;
                if var.kind != VarDeclKind::Var {
                    mutable = var.kind == VarDeclKind::Let;
                    for declarator in &var.decls {
                        pattern_names(&declarator.name, &mut lexical);
                    }
                }
            }
            Some(VarDeclOrExpr::Expr(init)) => {
                self.eval(init, &scope)?;
            }
            None => {}
        }
        let fresh = |previous: &Env| {
            let next = scope.child();
            for name in &lexical {
                next.declare(name, previous.lookup(name).unwrap_or_default(), mutable);
            }
            next
        };

        let mut iteration = fresh(&scope);
        loop {
            if let Some(test) = &for_stmt.test {
                if !self.eval(test, &iteration)?.is_truthy() {
                    return Ok(Completion::Normal);
                }
            }
            if let Some(done) = self.loop_step(&for_stmt.body, &iteration, label)? {
                return Ok(done);
            }
            iteration = fresh(&iteration);
            if let Some(update) = &for_stmt.update {
                self.eval(update, &iteration)?;
            }
        }
    }

    fn exec_for_each(
        &mut self,
        head: &ForHead,
        items: Vec<Value>,
        body: &Stmt,
        env: &Env,
        label: Option<&str>,
    ) -> Result<Completion, RuntimeError> {
        for item in items {
            let scope = env.child();
            match head {
                ForHead::VarDecl(var) => {
                    let declarator = var
                        .decls
                        .first()
                        .ok_or_else(|| RuntimeError::Type("Missing loop binding".to_string()))?;
                    self.bind_pattern(&declarator.name, item, &scope, var.kind.into())?;
                }
                ForHead::Pat(pat) => self.bind_pattern(pat, item, &scope, BindKind::Assign)?,
                _ => return Err(unsupported("This loop head")),
            }
            if let Some(done) = self.loop_step(body, &scope, label)? {
                return Ok(done);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(&mut self, switch: &SwitchStmt, env: &Env) -> Result<Completion, RuntimeError> {
        let discriminant = self.eval(&switch.discriminant, env)?;
        let scope = env.child();
        let mut start = None;
        for (index, case) in switch.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, &scope)?.strict_equals(&discriminant) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| switch.cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal);
        };
        for case in &switch.cases[start..] {
            match self.exec_block(&case.cons, &scope)? {
                Completion::Normal => {}
                Completion::Break(None) => return Ok(Completion::Normal),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(&mut self, try_stmt: &TryStmt, env: &Env) -> Result<Completion, RuntimeError> {
        let result = match (self.exec_block(&try_stmt.block.stmts, &env.child()), &try_stmt.handler) {
            (Err(error), Some(handler)) => {
                let scope = env.child();
                match &handler.param {
                    Some(param) => self
                        .bind_pattern(param, error.into_value(), &scope, BindKind::Let)
                        .and_then(|()| self.exec_block(&handler.body.stmts, &scope)),
                    None => self.exec_block(&handler.body.stmts, &scope),
                }
            }
            (result, _) => result,
        };
        if let Some(finalizer) = &try_stmt.finalizer {
            match self.exec_block(&finalizer.stmts, &env.child())? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    // -- bindings -----------------------------------------------------------

    fn bind_name(&mut self, name: &str, value: Value, env: &Env, kind: BindKind) -> Result<(), RuntimeError> {
        match kind {
            BindKind::Let => env.declare(name, value, true),
            BindKind::Const => env.declare(name, value, false),
            BindKind::Assign => env.assign(name, value)?,
            BindKind::Var => match env.assign(name, value.clone()) {
                Err(RuntimeError::Reference(_)) => env.declare(name, value, true),
                other => other?,
            },
        }
        Ok(())
    }

    /// Bind or assign `value` through a (possibly destructuring) pattern.
    fn bind_pattern(&mut self, pat: &Pat, value: Value, env: &Env, kind: BindKind) -> Result<(), RuntimeError> {
        match pat {
            Pat::Ident(binding) => self.bind_name(&binding.id.sym, value, env, kind),
            Pat::Assign(assign) => {
                let value = match value {
                    Value::Undefined => self.eval(&assign.right, env)?,
                    value => value,
                };
                self.bind_pattern(&assign.left, value, env, kind)
            }
            Pat::Array(array) => {
                let items = iterate(&value)?;
                for (index, elem) in array.elems.iter().enumerate() {
                    match elem {
                        None => {}
                        Some(Pat::Rest(rest)) => {
                            let tail = items.get(index..).map(<[Value]>::to_vec).unwrap_or_default();
                            self.bind_pattern(&rest.arg, Value::Array(Array::from_vec(tail)), env, kind)?;
                        }
                        Some(elem) => {
                            let item = items.get(index).cloned().unwrap_or_default();
                            self.bind_pattern(elem, item, env, kind)?;
                        }
                    }
                }
                Ok(())
            }
            Pat::Object(object) => {
                if value.is_nullish() {
                    return Err(RuntimeError::Type(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display(),
                        value.to_display()
                    )));
                }
                let mut used = Vec::new();
                for prop in &object.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => {
                            let key = self.prop_key(&kv.key, env)?;
                            let item = get_property(&value, &key)?;
                            used.push(key);
                            self.bind_pattern(&kv.value, item, env, kind)?;
                        }
                        ObjectPatProp::Assign(assign) => {
                            let key = assign.key.sym.to_string();
                            let mut item = get_property(&value, &key)?;
                            if let (Value::Undefined, Some(default)) = (&item, &assign.value) {
                                item = self.eval(default, env)?;
                            }
                            self.bind_name(&key, item, env, kind)?;
                            used.push(key);
                        }
                        ObjectPatProp::Rest(rest) => {
                            let remaining = Object::new();
                            if let Value::Object(source) = &value {
                                for (key, item) in source.entries() {
                                    if !used.iter().any(|u| u.as_str() == key.as_str()) {
                                        remaining.set(key, item);
                                    }
                                }
                            }
                            self.bind_pattern(&rest.arg, Value::Object(remaining), env, kind)?;
                        }
                    }
                }
                Ok(())
            }
            Pat::Rest(rest) => self.bind_pattern(&rest.arg, value, env, kind),
            Pat::Expr(expr) if kind == BindKind::Assign => {
                let target = self.target_of_expr(expr, env)?;
                self.write_target(target, value, env)
            }
            Pat::Expr(_) | Pat::Invalid(_) => Err(RuntimeError::Type(
                "Invalid destructuring target".to_string(),
            )),
        }
    }

    fn target_of_expr(&mut self, expr: &Expr, env: &Env) -> Result<Target, RuntimeError> {
        match expr {
            Expr::Ident(ident) => Ok(Target::Name(ident.sym.to_string())),
            Expr::Member(member) => {
                let object = self.eval(&member.obj, env)?;
                let key = self.member_key(&member.prop, env)?;
                Ok(Target::Member(object, key))
            }
            Expr::Paren(paren) => self.target_of_expr(&paren.expr, env),
            _ => Err(RuntimeError::Type(
                "Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    fn target_of(&mut self, left: &PatOrExpr, env: &Env) -> Result<Target, RuntimeError> {
        match left {
            PatOrExpr::Expr(expr) => self.target_of_expr(expr, env),
            PatOrExpr::Pat(pat) => match &**pat {
                Pat::Ident(binding) => Ok(Target::Name(binding.id.sym.to_string())),
                Pat::Expr(expr) => self.target_of_expr(expr, env),
                _ => Err(RuntimeError::Type(
                    "Invalid left-hand side in assignment".to_string(),
                )),
            },
        }
    }

    fn read_target(&self, target: &Target, env: &Env) -> Result<Value, RuntimeError> {
        match target {
            Target::Name(name) => env
                .lookup(name)
                .ok_or_else(|| RuntimeError::Reference(name.clone())),
            Target::Member(object, key) => get_property(object, key),
        }
    }

    fn write_target(&mut self, target: Target, value: Value, env: &Env) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => env.assign(&name, value),
            Target::Member(object, key) => set_property(&object, &key, value),
        }
    }

    // -- expressions --------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::This(_) => Ok(env.lookup("this").unwrap_or_default()),
            Expr::Ident(ident) => match env.lookup(&ident.sym) {
                Some(value) => Ok(value),
                None if &*ident.sym == "undefined" => Ok(Value::Undefined),
                None => Err(RuntimeError::Reference(ident.sym.to_string())),
            },
            Expr::Lit(lit) => eval_literal(lit),
            Expr::Tpl(tpl) => {
                let mut out = String::new();
                for (index, quasi) in tpl.quasis.iter().enumerate() {
                    match &quasi.cooked {
                        Some(cooked) => out.push_str(cooked),
                        None => out.push_str(&quasi.raw),
                    }
                    if let Some(expr) = tpl.exprs.get(index) {
                        out.push_str(&self.eval(expr, env)?.to_display());
                    }
                }
                Ok(Value::string(out))
            }
            Expr::Array(array) => {
                let mut values = Vec::with_capacity(array.elems.len());
                for elem in &array.elems {
                    match elem {
                        None => values.push(Value::Undefined),
                        Some(ExprOrSpread { spread: Some(_), expr }) => {
                            values.extend(iterate(&self.eval(expr, env)?)?);
                        }
                        Some(ExprOrSpread { spread: None, expr }) => values.push(self.eval(expr, env)?),
                    }
                }
                Ok(Value::Array(Array::from_vec(values)))
            }
            Expr::Object(object) => self.eval_object(object, env),
            Expr::Fn(func) => {
                let name = func.ident.as_ref().map(|ident| &*ident.sym).unwrap_or("");
                match &func.ident {
                    // A named function expression sees its own name.
                    Some(ident) => {
                        let scope = env.child();
                        let value = make_function(name, &func.function, &scope, None);
                        scope.declare(&ident.sym, value.clone(), false);
                        Ok(value)
                    }
                    None => Ok(make_function(name, &func.function, env, None)),
                }
            }
            Expr::Arrow(arrow) => Ok(Value::Function(Function::Closure(Arc::new(Closure {
                name: ArcStr::new(),
                code: Code::Arrow(Arc::new(arrow.clone())),
                env: env.clone(),
                home: None,
                properties: Object::new(),
            })))),
            Expr::Class(class) => {
                let name = class.ident.as_ref().map(|ident| &*ident.sym).unwrap_or("");
                self.eval_class(name, &class.class, env)
            }
            Expr::Paren(paren) => self.eval(&paren.expr, env),
            Expr::Seq(seq) => {
                let mut last = Value::Undefined;
                for expr in &seq.exprs {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }
            Expr::Unary(unary) => self.eval_unary(unary, env),
            Expr::Update(update) => {
                let target = self.target_of_expr(&update.arg, env)?;
                let old = self.read_target(&target, env)?.to_number();
                let new = match update.op {
                    UpdateOp::PlusPlus => old + 1.0,
                    UpdateOp::MinusMinus => old - 1.0,
                };
                self.write_target(target, Value::Number(new), env)?;
                Ok(Value::Number(if update.prefix { new } else { old }))
            }
            Expr::Bin(bin) => {
                let left = self.eval(&bin.left, env)?;
                match bin.op {
                    BinaryOp::LogicalAnd if !left.is_truthy() => Ok(left),
                    BinaryOp::LogicalOr if left.is_truthy() => Ok(left),
                    BinaryOp::NullishCoalescing if !left.is_nullish() => Ok(left),
                    BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing => {
                        self.eval(&bin.right, env)
                    }
                    op => {
                        let right = self.eval(&bin.right, env)?;
                        binary(op, &left, &right)
                    }
                }
            }
            Expr::Assign(assign) => self.eval_assign(assign, env),
            Expr::Cond(cond) => {
                if self.eval(&cond.test, env)?.is_truthy() {
                    self.eval(&cond.cons, env)
                } else {
                    self.eval(&cond.alt, env)
                }
            }
            Expr::Member(member) => {
                let object = self.eval(&member.obj, env)?;
                let key = self.member_key(&member.prop, env)?;
                get_property(&object, &key)
            }
            Expr::SuperProp(super_prop) => {
                let key = self.super_key(&super_prop.prop, env)?;
                Ok(self.super_base(env)?.get(&key).unwrap_or_default())
            }
            Expr::OptChain(_) => Ok(self
                .eval_chain(expr, env)?
                .map(|(value, _)| value)
                .unwrap_or_default()),
            Expr::Call(call) => match &call.callee {
                Callee::Super(_) => {
                    let args = self.eval_args(&call.args, env)?;
                    self.call_super(args, env)
                }
                Callee::Import(_) => Err(RuntimeError::Type(
                    "import() must be rewritten before evaluation".to_string(),
                )),
                Callee::Expr(callee) => {
                    let (function, this) = self.callee_and_this(callee, env)?;
                    let args = self.eval_args(&call.args, env)?;
                    if !matches!(function, Value::Function(_)) {
                        return Err(RuntimeError::Type(format!(
                            "{} is not a function",
                            describe(callee)
                        )));
                    }
                    self.call(&function, this, args)
                }
            },
            Expr::New(new) => {
                let callee = self.eval(&new.callee, env)?;
                let args = match &new.args {
                    Some(args) => self.eval_args(args, env)?,
                    None => Vec::new(),
                };
                if !matches!(callee, Value::Function(_)) {
                    return Err(RuntimeError::Type(format!(
                        "{} is not a constructor",
                        describe(&new.callee)
                    )));
                }
                self.construct(&callee, args)
            }
            Expr::TaggedTpl(_) => Err(unsupported("Tagged templates")),
            Expr::Await(_) | Expr::Yield(_) => Err(unsupported("'await' and 'yield'")),
            Expr::PrivateName(_) => Err(unsupported("Private names")),
            _ => Err(unsupported("This expression")),
        }
    }

    fn eval_object(&mut self, object: &ObjectLit, env: &Env) -> Result<Value, RuntimeError> {
        let out = Object::new();
        for prop in &object.props {
            let prop = match prop {
                PropOrSpread::Spread(spread) => {
                    match self.eval(&spread.expr, env)? {
                        Value::Object(source) => out.assign(&source),
                        Value::Array(array) => {
                            for (index, item) in array.to_vec().into_iter().enumerate() {
                                out.set(index.to_string(), item);
                            }
                        }
                        Value::String(text) => {
                            for (index, c) in text.chars().enumerate() {
                                out.set(index.to_string(), Value::string(c.to_string()));
                            }
                        }
                        _ => {}
                    }
                    continue;
                }
                PropOrSpread::Prop(prop) => prop,
            };
            match &**prop {
                Prop::Shorthand(ident) => {
                    let value = self.eval(&Expr::Ident(ident.clone()), env)?;
                    out.set(&*ident.sym, value);
                }
                Prop::KeyValue(kv) => {
                    let key = self.prop_key(&kv.key, env)?;
                    let value = self.eval(&kv.value, env)?;
                    out.set(key, value);
                }
                Prop::Method(method) => {
                    let key = self.prop_key(&method.key, env)?;
                    let value = make_function(&key, &method.function, env, Some(out.clone()));
                    out.set(key, value);
                }
                Prop::Getter(_) | Prop::Setter(_) => return Err(unsupported("Getters and setters")),
                Prop::Assign(_) => {
                    return Err(RuntimeError::Type(
                        "Invalid shorthand property initializer".to_string(),
                    ))
                }
            }
        }
        Ok(Value::Object(out))
    }

    fn eval_unary(&mut self, unary: &UnaryExpr, env: &Env) -> Result<Value, RuntimeError> {
        match (unary.op, &*unary.arg) {
            (UnaryOp::TypeOf, Expr::Ident(ident)) if !env.is_declared(&ident.sym) => {
                return Ok(Value::string("undefined"));
            }
            (UnaryOp::Delete, Expr::Member(member)) => {
                let object = self.eval(&member.obj, env)?;
                let key = self.member_key(&member.prop, env)?;
                match &object {
                    Value::Object(object) => {
                        object.remove(&key);
                    }
                    Value::Function(Function::Closure(closure)) => {
                        closure.properties.remove(&key);
                    }
                    _ => {}
                }
                return Ok(Value::Bool(true));
            }
            (UnaryOp::Delete, _) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let value = self.eval(&unary.arg, env)?;
        Ok(match unary.op {
            UnaryOp::Bang => Value::Bool(!value.is_truthy()),
            UnaryOp::Minus => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Tilde => Value::Number(f64::from(!to_int32(value.to_number()))),
            UnaryOp::TypeOf => Value::string(value.type_of()),
            UnaryOp::Void | UnaryOp::Delete => Value::Undefined,
        })
    }

    fn eval_assign(&mut self, assign: &AssignExpr, env: &Env) -> Result<Value, RuntimeError> {
        if assign.op == AssignOp::Assign {
            let value = self.eval(&assign.right, env)?;
            match &assign.left {
                PatOrExpr::Pat(pat) => self.bind_pattern(pat, value.clone(), env, BindKind::Assign)?,
                PatOrExpr::Expr(expr) => {
                    let target = self.target_of_expr(expr, env)?;
                    self.write_target(target, value.clone(), env)?;
                }
            }
            return Ok(value);
        }

        let target = self.target_of(&assign.left, env)?;
        let current = self.read_target(&target, env)?;
        let op = match assign.op {
            AssignOp::AndAssign if !current.is_truthy() => return Ok(current),
            AssignOp::OrAssign if current.is_truthy() => return Ok(current),
            AssignOp::NullishAssign if !current.is_nullish() => return Ok(current),
            AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::ModAssign => Some(BinaryOp::Mod),
            AssignOp::ExpAssign => Some(BinaryOp::Exp),
            AssignOp::LShiftAssign => Some(BinaryOp::LShift),
            AssignOp::RShiftAssign => Some(BinaryOp::RShift),
            AssignOp::ZeroFillRShiftAssign => Some(BinaryOp::ZeroFillRShift),
            AssignOp::BitOrAssign => Some(BinaryOp::BitOr),
            AssignOp::BitXorAssign => Some(BinaryOp::BitXor),
            AssignOp::BitAndAssign => Some(BinaryOp::BitAnd),
            AssignOp::Assign => None,
        };
        let rhs = self.eval(&assign.right, env)?;
        let value = match op {
            Some(op) => binary(op, &current, &rhs)?,
            None => rhs,
        };
        self.write_target(target, value.clone(), env)?;
        Ok(value)
    }

    /// Function value plus the receiver it is called on.
    fn callee_and_this(&mut self, callee: &Expr, env: &Env) -> Result<(Value, Value), RuntimeError> {
        match callee {
            Expr::Member(member) => {
                let object = self.eval(&member.obj, env)?;
                let key = self.member_key(&member.prop, env)?;
                Ok((get_property(&object, &key)?, object))
            }
            Expr::SuperProp(super_prop) => {
                let key = self.super_key(&super_prop.prop, env)?;
                let function = self.super_base(env)?.get(&key).unwrap_or_default();
                Ok((function, env.lookup("this").unwrap_or_default()))
            }
            Expr::Paren(paren) if matches!(&*paren.expr, Expr::Member(_)) => {
                self.callee_and_this(&paren.expr, env)
            }
            other => Ok((self.eval(other, env)?, Value::Undefined)),
        }
    }

    /// Evaluate an optional chain. `None` when an optional link met a
    /// nullish value, which short-circuits the rest of the chain.
    fn eval_chain(&mut self, expr: &Expr, env: &Env) -> Result<Option<(Value, Value)>, RuntimeError> {
        match expr {
            Expr::OptChain(chain) => {
                let base: &OptChainBase = &chain.base;
                match base {
                    OptChainBase::Member(member) => {
                        let Some((object, _)) = self.eval_chain(&member.obj, env)? else {
                            return Ok(None);
                        };
                        if chain.optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.member_key(&member.prop, env)?;
                        Ok(Some((get_property(&object, &key)?, object)))
                    }
                    OptChainBase::Call(call) => {
                        let Some((function, this)) = self.eval_chain(&call.callee, env)? else {
                            return Ok(None);
                        };
                        if chain.optional && function.is_nullish() {
                            return Ok(None);
                        }
                        let args = self.eval_args(&call.args, env)?;
                        Ok(Some((self.call(&function, this, args)?, Value::Undefined)))
                    }
                }
            }
            Expr::Member(member) => {
                let Some((object, _)) = self.eval_chain(&member.obj, env)? else {
                    return Ok(None);
                };
                let key = self.member_key(&member.prop, env)?;
                Ok(Some((get_property(&object, &key)?, object)))
            }
            other => Ok(Some((self.eval(other, env)?, Value::Undefined))),
        }
    }

    fn eval_args(&mut self, args: &[ExprOrSpread], env: &Env) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval(&arg.expr, env)?;
            match arg.spread {
                Some(_) => values.extend(iterate(&value)?),
                None => values.push(value),
            }
        }
        Ok(values)
    }

    fn eval_class(&mut self, name: &str, class: &ast::Class, env: &Env) -> Result<Value, RuntimeError> {
        let parent = match &class.super_class {
            Some(super_class) => match self.eval(super_class, env)? {
                Value::Null => None,
                parent @ Value::Function(_) => Some(parent),
                other => {
                    return Err(RuntimeError::Type(format!(
                        "Class extends value {} is not a constructor or null",
                        other.to_display()
                    )))
                }
            },
            None => None,
        };
        let prototype = Object::new();
        let statics = Object::new();
        if let Some(Value::Function(Function::Closure(parent))) = &parent {
            prototype.set_prototype(parent.prototype_object());
            statics.set_prototype(Some(parent.properties.clone()));
        }

        let scope = env.child();
        let mut constructor = None;
        let mut fields = Vec::new();
        for member in &class.body {
            match member {
                ClassMember::Constructor(ctor) => constructor = Some(ctor.clone()),
                ClassMember::ClassProp(prop) if !prop.is_static => {
                    fields.push((ArcStr::from(self.prop_key(&prop.key, &scope)?), prop.value.clone()));
                }
                ClassMember::PrivateMethod(_) | ClassMember::PrivateProp(_) => {
                    return Err(unsupported("Private class members"))
                }
                _ => {}
            }
        }

        statics.set("prototype", Value::Object(prototype.clone()));
        let value = Value::Function(Function::Closure(Arc::new(Closure {
            name: ArcStr::from(name),
            code: Code::Class(Arc::new(ClassCode {
                constructor,
                fields,
                parent,
            })),
            env: scope.clone(),
            home: None,
            properties: statics.clone(),
        })));
        prototype.set("constructor", value.clone());
        if !name.is_empty() {
            scope.declare(name, value.clone(), false);
        }

        for member in &class.body {
            match member {
                ClassMember::Method(method) => {
                    if method.kind != MethodKind::Method {
                        return Err(unsupported("Getters and setters"));
                    }
                    let key = self.prop_key(&method.key, &scope)?;
                    let home = if method.is_static { &statics } else { &prototype };
                    let function = make_function(&key, &method.function, &scope, Some(home.clone()));
                    home.set(key, function);
                }
                ClassMember::ClassProp(prop) if prop.is_static => {
                    let key = self.prop_key(&prop.key, &scope)?;
                    let init_scope = scope.child();
                    init_scope.declare("this", value.clone(), false);
                    let item = match &prop.value {
                        Some(init) => self.eval(init, &init_scope)?,
                        None => Value::Undefined,
                    };
                    statics.set(key, item);
                }
                ClassMember::StaticBlock(block) => {
                    let block_scope = scope.child();
                    block_scope.declare("this", value.clone(), false);
                    hoist_vars(&block.body.stmts, &block_scope);
                    self.exec_block(&block.body.stmts, &block_scope)?;
                }
                _ => {}
            }
        }
        Ok(value)
    }

    /// The object `super.x` reads from.
    fn super_base(&self, env: &Env) -> Result<Object, RuntimeError> {
        match env.lookup(HOME_BINDING) {
            Some(Value::Object(home)) => Ok(home.prototype().unwrap_or_default()),
            _ => Err(RuntimeError::Type("'super' keyword unexpected here".to_string())),
        }
    }

    fn super_key(&mut self, prop: &SuperProp, env: &Env) -> Result<String, RuntimeError> {
        match prop {
            SuperProp::Ident(ident) => Ok(ident.sym.to_string()),
            SuperProp::Computed(computed) => Ok(to_key(&self.eval(&computed.expr, env)?)),
        }
    }

    fn member_key(&mut self, prop: &MemberProp, env: &Env) -> Result<String, RuntimeError> {
        match prop {
            MemberProp::Ident(ident) => Ok(ident.sym.to_string()),
            MemberProp::Computed(computed) => Ok(to_key(&self.eval(&computed.expr, env)?)),
            MemberProp::PrivateName(_) => Err(unsupported("Private names")),
        }
    }

    fn prop_key(&mut self, key: &PropName, env: &Env) -> Result<String, RuntimeError> {
        match key {
            PropName::Ident(ident) => Ok(ident.sym.to_string()),
            PropName::Str(value) => Ok(value.value.to_string()),
            PropName::Num(number) => Ok(format_number(number.value)),
            PropName::Computed(computed) => Ok(to_key(&self.eval(&computed.expr, env)?)),
            PropName::BigInt(value) => Ok(value.value.to_string()),
        }
    }
}

fn make_function(name: &str, function: &ast::Function, env: &Env, home: Option<Object>) -> Value {
    Value::Function(Function::Closure(Arc::new(Closure {
        name: ArcStr::from(name),
        code: Code::Function(Arc::new(function.clone())),
        env: env.clone(),
        home,
        properties: Object::new(),
    })))
}

fn eval_literal(lit: &Lit) -> Result<Value, RuntimeError> {
    match lit {
        Lit::Str(value) => Ok(Value::string(&*value.value)),
        Lit::Num(number) => Ok(Value::Number(number.value)),
        Lit::Bool(value) => Ok(Value::Bool(value.value)),
        Lit::Null(_) => Ok(Value::Null),
        Lit::Regex(_) => Err(unsupported("Regular expression literals")),
        Lit::BigInt(_) => Err(unsupported("BigInt literals")),
        Lit::JSXText(_) => Err(unsupported("JSX")),
    }
}

/// Declare every `var` in `body` (outside nested functions) in `env`.
fn hoist_vars(body: &[Stmt], env: &Env) {
    let mut names = Vec::new();
    for stmt in body {
        var_names(stmt, &mut names);
    }
    for name in names {
        if !env.has_own(&name) {
            env.declare(&name, Value::Undefined, true);
        }
    }
}

/// Short source-like description of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(ident) => ident.sym.to_string(),
        Expr::This(_) => "this".to_string(),
        Expr::Member(member) => match &member.prop {
            MemberProp::Ident(prop) => format!("{}.{}", describe(&member.obj), prop.sym),
            _ => format!("{}[...]", describe(&member.obj)),
        },
        Expr::Paren(paren) => describe(&paren.expr),
        _ => "expression".to_string(),
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "anonymous"
    } else {
        name
    }
}

fn index_keys(len: usize) -> Vec<Value> {
    (0..len).map(|i| Value::string(i.to_string())).collect()
}

/// Items produced by spreading or iterating `value`.
fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::Array(array) => Ok(array.to_vec()),
        Value::String(text) => Ok(text.chars().map(|c| Value::string(c.to_string())).collect()),
        other => Err(RuntimeError::Type(format!(
            "{} is not iterable",
            other.to_display()
        ))),
    }
}

fn to_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_display(),
    }
}

fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// Property read with the built-in methods of arrays, strings and functions.
pub fn get_property(target: &Value, key: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Undefined | Value::Null => Err(RuntimeError::Type(format!(
            "Cannot read properties of {} (reading '{}')",
            target.to_display(),
            key
        ))),
        Value::Object(object) => Ok(object.get(key).unwrap_or_default()),
        Value::Array(array) => {
            if key == "length" {
                return Ok(Value::Number(array.len() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(array.get(index).unwrap_or_default());
            }
            Ok(globals::array_method(key).unwrap_or_default())
        }
        Value::String(s) => {
            if key == "length" {
                return Ok(Value::Number(s.encode_utf16().count() as f64));
            }
            if let Ok(index) = key.parse::<usize>() {
                return Ok(s
                    .chars()
                    .nth(index)
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or_default());
            }
            Ok(globals::string_method(key).unwrap_or_default())
        }
        Value::Function(function) => {
            if key == "name" {
                return Ok(Value::string(function.name()));
            }
            if let Function::Closure(closure) = function {
                if key == "prototype" {
                    return Ok(closure.prototype_object().map(Value::Object).unwrap_or_default());
                }
                if let Some(value) = closure.properties.get(key) {
                    return Ok(value);
                }
            }
            Ok(globals::function_method(key).unwrap_or_default())
        }
        Value::Number(_) | Value::Bool(_) => Ok(globals::primitive_method(key).unwrap_or_default()),
    }
}

pub fn set_property(target: &Value, key: &str, value: Value) -> Result<(), RuntimeError> {
    match target {
        Value::Object(object) => {
            object.set(key, value);
            Ok(())
        }
        Value::Array(array) => match key.parse::<usize>() {
            Ok(index) => {
                array.set(index, value);
                Ok(())
            }
            Err(_) => Err(RuntimeError::Type(format!(
                "Cannot set property '{}' of an array",
                key
            ))),
        },
        Value::Function(Function::Closure(closure)) => {
            closure.properties.set(key, value);
            Ok(())
        }
        Value::Undefined | Value::Null => Err(RuntimeError::Type(format!(
            "Cannot set properties of {} (setting '{}')",
            target.to_display(),
            key
        ))),
        // Primitive writes are dropped silently.
        _ => Ok(()),
    }
}

fn binary(operator: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let compare = || match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    let int = |value: &Value| to_int32(value.to_number());
    let shift = || to_uint32(right.to_number()) & 31;
    Ok(match operator {
        BinaryOp::Add => {
            let stringish = |v: &Value| {
                matches!(
                    v,
                    Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
                )
            };
            if stringish(left) || stringish(right) {
                Value::string(left.to_display() + right.to_display().as_str())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Exp => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::EqEq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::EqEqEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::NotEqEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => Value::Bool(compare() == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare() == Some(Ordering::Greater)),
        BinaryOp::LtEq => Value::Bool(matches!(compare(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::BitOr => Value::Number(f64::from(int(left) | int(right))),
        BinaryOp::BitXor => Value::Number(f64::from(int(left) ^ int(right))),
        BinaryOp::BitAnd => Value::Number(f64::from(int(left) & int(right))),
        BinaryOp::LShift => Value::Number(f64::from(int(left).wrapping_shl(shift()))),
        BinaryOp::RShift => Value::Number(f64::from(int(left) >> shift())),
        BinaryOp::ZeroFillRShift => {
            Value::Number(f64::from(to_uint32(left.to_number()) >> shift()))
        }
        BinaryOp::LogicalAnd => (if left.is_truthy() { right } else { left }).clone(),
        BinaryOp::LogicalOr => (if left.is_truthy() { left } else { right }).clone(),
        BinaryOp::NullishCoalescing => (if left.is_nullish() { right } else { left }).clone(),
        BinaryOp::In => {
            let key = to_key(left);
            Value::Bool(match right {
                Value::Object(object) => object.has_property(&key),
                Value::Array(array) => {
                    key == "length" || key.parse::<usize>().is_ok_and(|i| i < array.len())
                }
                Value::Function(Function::Closure(closure)) => {
                    key == "prototype" || closure.properties.has_property(&key)
                }
                other => {
                    return Err(RuntimeError::Type(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        key,
                        other.to_display()
                    )))
                }
            })
        }
        BinaryOp::InstanceOf => {
            let Value::Function(function) = right else {
                return Err(RuntimeError::Type(
                    "Right-hand side of 'instanceof' is not callable".to_string(),
                ));
            };
            let prototype = match function {
                Function::Closure(closure) => closure.prototype_object(),
                Function::Native(_) => None,
            };
            Value::Bool(match (left, prototype) {
                (Value::Object(object), Some(prototype)) => object.inherits_from(&prototype),
                _ => false,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_module;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Env {
        let module = parse_module(source).unwrap();
        let env = globals::global_env();
        Interpreter::new().run(module, &env).unwrap();
        env
    }

    fn eval_err(source: &str) -> RuntimeError {
        let module = parse_module(source).unwrap();
        Interpreter::new()
            .run(module, &globals::global_env())
            .unwrap_err()
    }

    fn json(env: &Env, name: &str) -> serde_json::Value {
        env.lookup(name).unwrap().to_json()
    }

    #[test]
    fn evaluates_arithmetic_and_strings() {
        let env = run("const a = 1 + 2 * 3\nconst b = 'n=' + a\nconst c = 7 % 4\nconst d = 2 ** 10 | 1");
        assert_eq!(env.lookup("a").unwrap().to_number(), 7.0);
        assert_eq!(env.lookup("b").unwrap().to_display(), "n=7");
        assert_eq!(env.lookup("c").unwrap().to_number(), 3.0);
        assert_eq!(env.lookup("d").unwrap().to_number(), 1025.0);
    }

    #[test]
    fn functions_are_hoisted_and_close_over_scope() {
        let env = run(
            "const base = 40\n\
             const r = add(2)\n\
             function add(x) { return x + base }",
        );
        assert_eq!(env.lookup("r").unwrap().to_number(), 42.0);
        let err = eval_err("const r = add(2)\nfunction add(x) { return x + missing }");
        assert!(matches!(err, RuntimeError::Reference(name) if name == "missing"));
    }

    #[test]
    fn methods_receive_this() {
        let env = run("const o = { n: 2, twice() { return this.n * 2 } }\nconst r = o.twice()");
        assert_eq!(env.lookup("r").unwrap().to_number(), 4.0);
    }

    #[test]
    fn arrows_capture_this_lexically() {
        let env = run(
            "const o = { n: 3, make() { return () => this.n } }\nconst r = o.make()()",
        );
        assert_eq!(env.lookup("r").unwrap().to_number(), 3.0);
    }

    #[test]
    fn for_of_and_array_methods() {
        let env = run(
            "let total = 0\n\
             for (const x of [1, 2, 3]) { total += x }\n\
             const doubled = [1, 2].map(x => x * 2).join('-')",
        );
        assert_eq!(env.lookup("total").unwrap().to_number(), 6.0);
        assert_eq!(env.lookup("doubled").unwrap().to_display(), "2-4");
    }

    #[test]
    fn spread_in_objects_arrays_and_calls() {
        let env = run(
            "const base = { a: 1, b: 2 }\n\
             const merged = { ...base, b: 3, ...null }\n\
             const list = [0, ...[1, 2], ...'ab']\n\
             const max = Math.max(...list.slice(0, 3))",
        );
        assert_eq!(json(&env, "merged"), serde_json::json!({ "a": 1, "b": 3 }));
        assert_eq!(json(&env, "list"), serde_json::json!([0, 1, 2, "a", "b"]));
        assert_eq!(env.lookup("max").unwrap().to_number(), 2.0);
    }

    #[test]
    fn loops_with_break_continue_and_labels() {
        let env = run(
            "let out = []\n\
             for (let i = 0; i < 10; i++) { if (i % 2) continue; if (i > 6) break; out.push(i) }\n\
             let n = 0\n\
             while (true) { n++; if (n === 3) break }\n\
             let m = 0\n\
             do { m += 2 } while (m < 5)\n\
             const pairs = []\n\
             outer: for (const a of [1, 2]) { for (const b of [1, 2]) { if (b > a) continue outer; pairs.push(a * 10 + b) } }\n\
             const keys = []\n\
             for (const k in { x: 1, y: 2 }) keys.push(k)",
        );
        assert_eq!(json(&env, "out"), serde_json::json!([0, 2, 4, 6]));
        assert_eq!(env.lookup("n").unwrap().to_number(), 3.0);
        assert_eq!(env.lookup("m").unwrap().to_number(), 6.0);
        assert_eq!(json(&env, "pairs"), serde_json::json!([11, 21, 22]));
        assert_eq!(json(&env, "keys"), serde_json::json!(["x", "y"]));
    }

    #[test]
    fn loop_closures_capture_each_iteration() {
        let env = run(
            "const fns = []\n\
             for (let i = 0; i < 3; i++) fns.push(() => i)\n\
             const seen = fns.map(f => f())",
        );
        assert_eq!(json(&env, "seen"), serde_json::json!([0, 1, 2]));
    }

    #[test]
    fn var_is_function_scoped() {
        let env = run(
            "function f() { if (true) { var x = 1 } return x }\n\
             const r = f()\n\
             const early = typeof later\n\
             var later = 2",
        );
        assert_eq!(env.lookup("r").unwrap().to_number(), 1.0);
        assert_eq!(env.lookup("early").unwrap().to_display(), "undefined");
    }

    #[test]
    fn try_catch_finally() {
        let env = run(
            "let log = []\n\
             try { missing() } catch (e) { log.push(e.name) } finally { log.push('done') }\n\
             try { throw { code: 7 } } catch ({ code }) { log.push(code) }\n\
             try { throw new Error('boom') } catch (e) { log.push(e.message) }\n\
             function f() { try { return 'try' } finally { log.push('cleanup') } }\n\
             log.push(f())",
        );
        assert_eq!(
            json(&env, "log"),
            serde_json::json!(["ReferenceError", "done", 7, "boom", "cleanup", "try"])
        );
    }

    #[test]
    fn optional_chaining_short_circuits() {
        let env = run(
            "const o = { a: { b: 1 }, f() { return this.a.b } }\n\
             const r = [o?.a?.b, o.x?.b.c.d, o.f?.(), o.g?.(), o?.['a']?.b]",
        );
        assert_eq!(json(&env, "r"), serde_json::json!([1, null, 1, null, 1]));
        assert!(matches!(eval_err("const o = {}\nconst r = (o.x?.y).z"), RuntimeError::Type(_)));
    }

    #[test]
    fn classes_with_inheritance_fields_and_statics() {
        let env = run(
            "class Animal {\n\
               legs = 4\n\
               static count = 0\n\
               constructor(name) { this.name = name; Animal.count++ }\n\
               speak() { return this.name + ' makes a sound' }\n\
               static create(name) { return new this(name) }\n\
             }\n\
             class Dog extends Animal {\n\
               tricks = []\n\
               constructor(name) { super(name); this.tricks.push('sit') }\n\
               speak() { return super.speak() + ': woof' }\n\
             }\n\
             const d = new Dog('rex')\n\
             const a = Animal.create('cat')\n\
             const r = [d.speak(), d.legs, d.tricks.length, Animal.count, d instanceof Animal, a instanceof Dog]",
        );
        assert_eq!(
            json(&env, "r"),
            serde_json::json!(["rex makes a sound: woof", 4, 1, 2, true, false])
        );
        let err = eval_err("class A {}\nA()");
        assert_eq!(
            err.to_string(),
            "TypeError: Class constructor A cannot be invoked without 'new'"
        );
    }

    #[test]
    fn destructuring_with_defaults_and_rest() {
        let env = run(
            "const { a, b: [first, ...others], c = 5, ...rest } = { a: 1, b: [2, 3, 4], d: 6 }\n\
             let x = 1, y = 2\n\
             ;[x, y] = [y, x]\n\
             const sum = ((p, { q } = { q: 10 }, ...more) => p + q + more.length)(1)\n\
             const r = [a, first, others, c, rest, x, y, sum]",
        );
        assert_eq!(
            json(&env, "r"),
            serde_json::json!([1, 2, [3, 4], 5, { "d": 6 }, 2, 1, 11])
        );
    }

    #[test]
    fn switch_falls_through_until_break() {
        let env = run(
            "function kind(n) { let out = ''\n\
               switch (n) { case 1: out += 'one'; case 2: out += 'two'; break; default: out = 'many' }\n\
               return out }\n\
             const r = [kind(1), kind(2), kind(9)]",
        );
        assert_eq!(json(&env, "r"), serde_json::json!(["onetwo", "two", "many"]));
    }

    #[test]
    fn templates_and_compound_assignment() {
        let env = run(
            "let n = 2\n\
             n **= 3\n\
             let s = null\n\
             s ??= 'set'\n\
             const t = `n=${n} s=${s}`",
        );
        assert_eq!(env.lookup("t").unwrap().to_display(), "n=8 s=set");
    }

    #[test]
    fn async_functions_fail_only_when_called() {
        let env = run("const o = { async load() { return 1 } }");
        assert!(env.lookup("o").is_some());
        let err = eval_err("const f = async () => 1\nf()");
        assert!(err.to_string().contains("not supported"), "{}", err);
    }

    #[test]
    fn const_reassignment_fails() {
        assert!(matches!(
            eval_err("const a = 1\na = 2"),
            RuntimeError::Type(_)
        ));
    }

    #[test]
    fn reading_property_of_undefined_fails() {
        let err = eval_err("const a = undefined\nconst b = a.x");
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot read properties of undefined (reading 'x')"
        );
    }

    #[test]
    fn typeof_undeclared_is_undefined() {
        let env = run("const t = typeof nothingHere");
        assert_eq!(env.lookup("t").unwrap().to_display(), "undefined");
    }

    #[test]
    fn throw_surfaces_the_value() {
        let err = eval_err("throw 'boom'");
        assert_eq!(err.to_string(), "Uncaught boom");
        let err = eval_err("throw new TypeError('bad')");
        assert_eq!(err.to_string(), "Uncaught TypeError: bad");
    }

    #[test]
    fn unbounded_recursion_is_reported() {
        let err = eval_err("function f() { return f() }\nf()");
        assert!(matches!(err, RuntimeError::StackOverflow));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let env = run("const a = null ?? 'x'\nconst b = 0 || 5\nconst c = 0 && missing()");
        assert_eq!(env.lookup("a").unwrap().to_display(), "x");
        assert_eq!(env.lookup("b").unwrap().to_number(), 5.0);
        assert_eq!(env.lookup("c").unwrap().to_number(), 0.0);
    }

    #[test]
    fn calling_a_non_function_names_the_callee() {
        let err = eval_err("const o = {}\no.missing()");
        assert_eq!(err.to_string(), "TypeError: o.missing is not a function");
    }
}
