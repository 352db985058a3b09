//! Runtime values.
//!
//! Objects and arrays are shared handles (`Arc` + `RwLock`), so a value
//! handed to a component or a render helper aliases the same storage the
//! interpreter mutates, matching reference semantics of the script language.

use std::fmt;
use std::sync::Arc;

use arcstr::ArcStr;
use parking_lot::RwLock;

use super::interpreter::{Env, Interpreter};
use super::RuntimeError;
use crate::script::ast;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(ArcStr),
    Array(Array),
    Object(Object),
    Function(Function),
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ObjectData {
    properties: RwLock<Vec<(ArcStr, Value)>>,
    prototype: RwLock<Option<Object>>,
}

/// Insertion-ordered property bag with shared ownership.
///
/// Reads fall back to the prototype chain; every other accessor only sees
/// own properties.
#[derive(Clone, Default)]
pub struct Object(Arc<ObjectData>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prototype(prototype: Option<Object>) -> Self {
        let object = Self::new();
        object.set_prototype(prototype);
        object
    }

    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<ArcStr>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::new();
        for (key, value) in entries {
            object.set(key, value);
        }
        object
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut current = self.clone();
        loop {
            if let Some(value) = current.get_own(key) {
                return Some(value);
            }
            current = current.prototype()?;
        }
    }

    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.0
            .properties
            .read()
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set(&self, key: impl Into<ArcStr>, value: Value) {
        let key = key.into();
        let mut entries = self.0.properties.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut entries = self.0.properties.write();
        let index = entries.iter().position(|(k, _)| k.as_str() == key)?;
        Some(entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.properties.read().iter().any(|(k, _)| k.as_str() == key)
    }

    /// Own or inherited (`key in object`).
    pub fn has_property(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn prototype(&self) -> Option<Object> {
        self.0.prototype.read().clone()
    }

    pub fn set_prototype(&self, prototype: Option<Object>) {
        *self.0.prototype.write() = prototype;
    }

    /// Whether `prototype` is on this object's prototype chain.
    pub fn inherits_from(&self, prototype: &Object) -> bool {
        let mut current = self.prototype();
        while let Some(object) = current {
            if object.ptr_eq(prototype) {
                return true;
            }
            current = object.prototype();
        }
        false
    }

    pub fn keys(&self) -> Vec<ArcStr> {
        self.0.properties.read().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(ArcStr, Value)> {
        self.0.properties.read().clone()
    }

    pub fn len(&self) -> usize {
        self.0.properties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every own property of `source` onto `self` (`Object.assign`).
    pub fn assign(&self, source: &Object) {
        // Snapshot first: `source` may be `self`.
        for (key, value) in source.entries() {
            self.set(key, value);
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(values)))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut values = self.0.write();
        if index >= values.len() {
            values.resize(index + 1, Value::Undefined);
        }
        values[index] = value;
    }

    pub fn push(&self, value: Value) -> usize {
        let mut values = self.0.write();
        values.push(value);
        values.len()
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.write().pop()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

pub type NativeFn =
    dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync;

/// A function implemented in Rust. Receives `this` and the call arguments.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: ArcStr,
    pub func: Arc<NativeFn>,
}

/// Code behind a script function.
pub enum Code {
    Function(Arc<ast::Function>),
    Arrow(Arc<ast::ArrowExpr>),
    Class(Arc<ClassCode>),
}

/// A class evaluated down to what `new` needs.
pub struct ClassCode {
    pub constructor: Option<ast::Constructor>,
    /// Instance fields in declaration order, keys already evaluated.
    pub fields: Vec<(ArcStr, Option<Box<ast::Expr>>)>,
    pub parent: Option<Value>,
}

/// A script function together with the scope it was created in.
pub struct Closure {
    pub name: ArcStr,
    pub code: Code,
    pub env: Env,
    /// Object whose prototype `super` refers to inside methods.
    pub home: Option<Object>,
    /// Own properties: `prototype` and statics.
    pub properties: Object,
}

impl Closure {
    /// The object instances created with `new` inherit from. Arrows have none.
    pub fn prototype_object(&self) -> Option<Object> {
        if let Some(Value::Object(prototype)) = self.properties.get_own("prototype") {
            return Some(prototype);
        }
        match self.code {
            Code::Arrow(_) => None,
            Code::Function(_) | Code::Class(_) => {
                let prototype = Object::new();
                self.properties.set("prototype", Value::Object(prototype.clone()));
                Some(prototype)
            }
        }
    }
}

#[derive(Clone)]
pub enum Function {
    Closure(Arc<Closure>),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => &closure.name,
            Function::Native(native) => &native.name,
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Closure(a), Function::Closure(b)) => Arc::ptr_eq(a, b),
            (Function::Native(a), Function::Native(b)) => Arc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

/// Number to string the way the script language prints numbers.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

impl Value {
    pub fn native<F>(name: &str, func: F) -> Value
    where
        F: Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        Value::Function(Function::Native(NativeFunction {
            name: ArcStr::from(name),
            func: Arc::new(func),
        }))
    }

    pub fn string(value: impl Into<ArcStr>) -> Value {
        Value::String(value.into())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// String conversion used by concatenation and `String(x)`.
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(array) => array
                .to_vec()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(function) => format!("function {}() {{ [code] }}", function.name()),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(array) if array.is_empty() => 0.0,
            Value::Array(_) | Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }

    /// JSON form; functions and `undefined` inside objects are skipped.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(array) => {
                serde_json::Value::Array(array.to_vec().iter().map(Value::to_json).collect())
            }
            Value::Object(object) => serde_json::Value::Object(
                object
                    .entries()
                    .into_iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_)))
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Object::from_entries(
                map.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))),
            )),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Array(array) => fmt::Debug::fmt(array, f),
            Value::Object(object) => fmt::Debug::fmt(object, f),
            Value::Function(function) => write!(f, "[Function: {}]", function.name()),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries().iter().map(|(k, v)| (k.as_str(), v)))
            .finish()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec().iter()).finish()
    }
}
