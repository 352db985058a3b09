//! Module runtime.
//!
//! Generated CommonJS text is turned into a live object graph by a small
//! tree-walking interpreter. Cross-module references go through a
//! `require` bound to the shared [`ModuleCache`](crate::ModuleCache), which
//! only ever reads modules that were loaded before instantiation started.

mod globals;
mod interpreter;
mod module;
mod value;
pub mod vnode;

use thiserror::Error;

pub use interpreter::{Env, Interpreter};
pub use module::instantiate;
pub use value::{Array, ClassCode, Closure, Code, Function, NativeFunction, Object, Value};
pub use vnode::{render_helpers, to_html};

/// Errors raised while evaluating generated code.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("Uncaught {}", describe_thrown(.0))]
    Thrown(Value),

    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    #[error("{0}")]
    Module(String),
}

impl RuntimeError {
    /// The value a `catch` clause binds for this error.
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            RuntimeError::Reference(name) => {
                globals::error_object("ReferenceError", &format!("{} is not defined", name))
            }
            RuntimeError::Type(message) => globals::error_object("TypeError", &message),
            RuntimeError::StackOverflow => {
                globals::error_object("RangeError", "Maximum call stack size exceeded")
            }
            RuntimeError::Module(message) => globals::error_object("Error", &message),
        }
    }
}

/// `Name: message` for error objects, plain display otherwise.
fn describe_thrown(value: &Value) -> String {
    if let Value::Object(object) = value {
        if let (Some(Value::String(name)), Some(message)) = (object.get("name"), object.get("message")) {
            return format!("{}: {}", name, message.to_display());
        }
    }
    value.to_display()
}

/// Call a runtime function value from Rust.
pub fn call_function(callee: &Value, this: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Interpreter::new().call(callee, this, args)
}

/// `{ default: value }` unless `value` is already an ES-module namespace.
pub fn interop_require_default(value: &Value) -> Value {
    if let Value::Object(object) = value {
        if object.get("__esModule").is_some_and(|v| v.is_truthy()) {
            return value.clone();
        }
    }
    let wrapper = Object::new();
    wrapper.set("default", value.clone());
    Value::Object(wrapper)
}

/// Run a preprocessor module: its `render` export receives
/// `(source, { filename })` and returns the processed text.
pub fn run_preprocessor(
    module: &Value,
    lang: &str,
    source: &str,
    filename: &str,
) -> Result<String, String> {
    let render = module
        .as_object()
        .and_then(|exports| exports.get("render"))
        .filter(|render| render.as_function().is_some())
        .ok_or_else(|| format!("Preprocessor '{}' has no render function", lang))?;
    let context = Object::from_entries([("filename", Value::string(filename))]);
    let output = call_function(
        &render,
        Value::Undefined,
        vec![Value::string(source), Value::Object(context)],
    )
    .map_err(|err| format!("Preprocessor '{}' failed: {}", lang, err))?;
    match output {
        Value::String(text) => Ok(text.to_string()),
        other => Err(format!(
            "Preprocessor '{}' returned {} instead of a string",
            lang,
            other.type_of()
        )),
    }
}

/// Render an assembled component to HTML.
///
/// The render context is the object returned by the component's `data()`,
/// or an empty object when it has none.
pub fn render_component(component: &Object) -> Result<String, RuntimeError> {
    let context = match component.get("data") {
        Some(data @ Value::Function(_)) => {
            match call_function(&data, Value::Object(component.clone()), Vec::new())? {
                Value::Object(state) => state,
                _ => Object::new(),
            }
        }
        _ => Object::new(),
    };
    let render = component
        .get("render")
        .filter(|render| render.as_function().is_some())
        .ok_or_else(|| RuntimeError::Type("component has no render function".to_string()))?;
    let tree = call_function(&render, Value::Undefined, vec![Value::Object(context)])?;
    Ok(to_html(&tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interop_wraps_plain_values() {
        let plain = Value::Object(Object::new());
        let wrapped = interop_require_default(&plain);
        let Value::Object(wrapper) = wrapped else {
            panic!("expected object");
        };
        assert!(wrapper.get("default").is_some_and(|d| d == plain));
    }

    #[test]
    fn interop_keeps_es_modules() {
        let module = Object::new();
        module.set("__esModule", Value::Bool(true));
        let value = Value::Object(module.clone());
        assert!(interop_require_default(&value) == value);
    }

    #[test]
    fn preprocessor_output_must_be_a_string() {
        let module = Value::Object(Object::from_entries([(
            "render",
            Value::native("render", |_, _, _| Ok(Value::Number(1.0))),
        )]));
        let err = run_preprocessor(&module, "pug", "p", "/a.vue").unwrap_err();
        assert_eq!(err, "Preprocessor 'pug' returned number instead of a string");
        let err = run_preprocessor(&Value::Null, "pug", "p", "/a.vue").unwrap_err();
        assert_eq!(err, "Preprocessor 'pug' has no render function");
    }

    #[test]
    fn caught_errors_become_error_objects() {
        let value = RuntimeError::Reference("x".to_string()).into_value();
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "name": "ReferenceError", "message": "x is not defined" })
        );
        assert_eq!(
            RuntimeError::Thrown(value).to_string(),
            "Uncaught ReferenceError: x is not defined"
        );
    }

    #[test]
    fn components_need_a_render_function() {
        let err = render_component(&Object::new()).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: component has no render function");
    }
}
