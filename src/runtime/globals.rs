//! Global bindings and built-in methods.

use super::interpreter::{Env, Interpreter};
use super::value::{Array, Object, Value};
use super::RuntimeError;

/// A fresh root scope with the standard globals declared.
pub fn global_env() -> Env {
    let env = Env::new();
    env.declare("console", console(), false);
    env.declare("Object", object_namespace(), false);
    env.declare("JSON", json_namespace(), false);
    env.declare("Math", math_namespace(), false);
    env.declare(
        "Array",
        Value::Object(Object::from_entries([(
            "isArray",
            Value::native("isArray", |_, _, args| {
                Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_)))))
            }),
        )])),
        false,
    );
    env.declare(
        "String",
        Value::native("String", |_, _, args| {
            Ok(Value::string(
                args.first().map(Value::to_display).unwrap_or_default(),
            ))
        }),
        false,
    );
    env.declare(
        "Number",
        Value::native("Number", |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }),
        false,
    );
    env.declare(
        "Boolean",
        Value::native("Boolean", |_, _, args| {
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }),
        false,
    );
    for name in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"] {
        env.declare(
            name,
            Value::native(name, move |_, _, args| {
                let message = match arg(&args, 0) {
                    Value::Undefined => String::new(),
                    other => other.to_display(),
                };
                Ok(error_object(name, &message))
            }),
            false,
        );
    }
    env.declare("NaN", Value::Number(f64::NAN), false);
    env.declare("Infinity", Value::Number(f64::INFINITY), false);
    env
}

/// `{ name, message }`, what `new Error(message)` builds.
pub(crate) fn error_object(name: &str, message: &str) -> Value {
    Value::Object(Object::from_entries([
        ("name", Value::string(name)),
        ("message", Value::string(message)),
    ]))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn console() -> Value {
    let object = Object::new();
    for level in ["log", "info", "warn", "error", "debug"] {
        object.set(
            level,
            Value::native(level, move |_, _, args| {
                let line = args
                    .iter()
                    .map(|a| match a {
                        Value::String(s) => s.to_string(),
                        Value::Object(_) | Value::Array(_) => a.to_json().to_string(),
                        other => other.to_display(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                match level {
                    "error" => tracing::error!(target: "sfc_loader::console", "{}", line),
                    "warn" => tracing::warn!(target: "sfc_loader::console", "{}", line),
                    "debug" => tracing::debug!(target: "sfc_loader::console", "{}", line),
                    _ => tracing::info!(target: "sfc_loader::console", "{}", line),
                }
                Ok(Value::Undefined)
            }),
        );
    }
    Value::Object(object)
}

fn object_namespace() -> Value {
    Value::Object(Object::from_entries([
        (
            "keys",
            Value::native("keys", |_, _, args| {
                let keys = match arg(&args, 0) {
                    Value::Object(object) => object
                        .keys()
                        .into_iter()
                        .map(Value::String)
                        .collect(),
                    Value::Array(array) => (0..array.len())
                        .map(|i| Value::string(i.to_string()))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Value::Array(Array::from_vec(keys)))
            }),
        ),
        (
            "values",
            Value::native("values", |_, _, args| {
                let values = match arg(&args, 0) {
                    Value::Object(object) => {
                        object.entries().into_iter().map(|(_, v)| v).collect()
                    }
                    Value::Array(array) => array.to_vec(),
                    _ => Vec::new(),
                };
                Ok(Value::Array(Array::from_vec(values)))
            }),
        ),
        (
            "entries",
            Value::native("entries", |_, _, args| {
                let entries = match arg(&args, 0) {
                    Value::Object(object) => object
                        .entries()
                        .into_iter()
                        .map(|(k, v)| {
                            Value::Array(Array::from_vec(vec![Value::String(k), v]))
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Value::Array(Array::from_vec(entries)))
            }),
        ),
        (
            "assign",
            Value::native("assign", |_, _, args| {
                let target = arg(&args, 0);
                let Value::Object(object) = &target else {
                    return Err(RuntimeError::Type(
                        "Cannot convert undefined or null to object".to_string(),
                    ));
                };
                for source in args.iter().skip(1) {
                    if let Value::Object(source) = source {
                        object.assign(source);
                    }
                }
                Ok(target)
            }),
        ),
        (
            "create",
            Value::native("create", |_, _, args| match arg(&args, 0) {
                Value::Object(prototype) => Ok(Value::Object(Object::with_prototype(Some(prototype)))),
                Value::Null => Ok(Value::Object(Object::new())),
                other => Err(RuntimeError::Type(format!(
                    "Object prototype may only be an Object or null: {}",
                    other.to_display()
                ))),
            }),
        ),
        (
            "freeze",
            Value::native("freeze", |_, _, args| Ok(arg(&args, 0))),
        ),
    ]))
}

fn json_namespace() -> Value {
    Value::Object(Object::from_entries([
        (
            "stringify",
            Value::native("stringify", |_, _, args| {
                let value = arg(&args, 0);
                if matches!(value, Value::Undefined | Value::Function(_)) {
                    return Ok(Value::Undefined);
                }
                let json = value.to_json();
                let pretty = match arg(&args, 2) {
                    Value::Number(n) => n > 0.0,
                    Value::String(s) => !s.is_empty(),
                    _ => false,
                };
                let text = if pretty {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                }
                .map_err(|e| RuntimeError::Type(e.to_string()))?;
                Ok(Value::string(text))
            }),
        ),
        (
            "parse",
            Value::native("parse", |_, _, args| {
                let text = arg(&args, 0).to_display();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| Value::from_json(&json))
                    .map_err(|e| RuntimeError::Thrown(Value::string(format!("SyntaxError: {}", e))))
            }),
        ),
    ]))
}

fn math_namespace() -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
        (
            name,
            Value::native(name, move |_, _, args| {
                Ok(Value::Number(f(arg(&args, 0).to_number())))
            }),
        )
    }

    Value::Object(Object::from_entries([
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("abs", f64::abs),
        unary("round", |n| (n + 0.5).floor()),
        (
            "max",
            Value::native("max", |_, _, args| {
                Ok(Value::Number(
                    args.iter()
                        .map(Value::to_number)
                        .fold(f64::NEG_INFINITY, f64::max),
                ))
            }),
        ),
        (
            "min",
            Value::native("min", |_, _, args| {
                Ok(Value::Number(
                    args.iter().map(Value::to_number).fold(f64::INFINITY, f64::min),
                ))
            }),
        ),
    ]))
}

// ---------------------------------------------------------------------------
// Methods looked up on primitive receivers
// ---------------------------------------------------------------------------

fn this_array(this: &Value, method: &str) -> Result<Array, RuntimeError> {
    this.as_array().cloned().ok_or_else(|| {
        RuntimeError::Type(format!("Array.prototype.{} called on a non-array", method))
    })
}

fn this_string(this: &Value) -> String {
    this.to_display()
}

pub fn array_method(name: &str) -> Option<Value> {
    let method = match name {
        "push" => Value::native("push", |_, this, args| {
            let array = this_array(&this, "push")?;
            let mut len = array.len();
            for value in args {
                len = array.push(value);
            }
            Ok(Value::Number(len as f64))
        }),
        "map" => Value::native("map", |interp, this, args| {
            let array = this_array(&this, "map")?;
            let callback = arg(&args, 0);
            let mut out = Vec::with_capacity(array.len());
            for (i, item) in array.to_vec().into_iter().enumerate() {
                out.push(interp.call(&callback, Value::Undefined, vec![item, Value::Number(i as f64)])?);
            }
            Ok(Value::Array(Array::from_vec(out)))
        }),
        "filter" => Value::native("filter", |interp, this, args| {
            let array = this_array(&this, "filter")?;
            let callback = arg(&args, 0);
            let mut out = Vec::new();
            for (i, item) in array.to_vec().into_iter().enumerate() {
                let keep = interp.call(
                    &callback,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(i as f64)],
                )?;
                if keep.is_truthy() {
                    out.push(item);
                }
            }
            Ok(Value::Array(Array::from_vec(out)))
        }),
        "forEach" => Value::native("forEach", |interp, this, args| {
            let array = this_array(&this, "forEach")?;
            let callback = arg(&args, 0);
            for (i, item) in array.to_vec().into_iter().enumerate() {
                interp.call(&callback, Value::Undefined, vec![item, Value::Number(i as f64)])?;
            }
            Ok(Value::Undefined)
        }),
        "join" => Value::native("join", |_, this, args| {
            let array = this_array(&this, "join")?;
            let separator = match arg(&args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            Ok(Value::string(
                array
                    .to_vec()
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                    .collect::<Vec<_>>()
                    .join(&separator),
            ))
        }),
        "includes" => Value::native("includes", |_, this, args| {
            let array = this_array(&this, "includes")?;
            let needle = arg(&args, 0);
            Ok(Value::Bool(array.to_vec().iter().any(|v| v.strict_equals(&needle))))
        }),
        "indexOf" => Value::native("indexOf", |_, this, args| {
            let array = this_array(&this, "indexOf")?;
            let needle = arg(&args, 0);
            let index = array
                .to_vec()
                .iter()
                .position(|v| v.strict_equals(&needle))
                .map_or(-1.0, |i| i as f64);
            Ok(Value::Number(index))
        }),
        "pop" => Value::native("pop", |_, this, _| {
            Ok(this_array(&this, "pop")?.pop().unwrap_or_default())
        }),
        "slice" => Value::native("slice", |_, this, args| {
            let values = this_array(&this, "slice")?.to_vec();
            let (start, end) = slice_range(values.len(), &args);
            Ok(Value::Array(Array::from_vec(values[start..end].to_vec())))
        }),
        "find" | "findIndex" | "some" | "every" => {
            let method = name.to_string();
            Value::native(name, move |interp, this, args| {
                let array = this_array(&this, &method)?;
                let callback = arg(&args, 0);
                let mut found = None;
                for (i, item) in array.to_vec().into_iter().enumerate() {
                    let hit = interp
                        .call(&callback, Value::Undefined, vec![item.clone(), Value::Number(i as f64)])?
                        .is_truthy();
                    if hit != (method == "every") {
                        found = Some((i, item));
                        break;
                    }
                }
                Ok(match (method.as_str(), found) {
                    ("find", found) => found.map(|(_, item)| item).unwrap_or_default(),
                    ("findIndex", found) => Value::Number(found.map_or(-1.0, |(i, _)| i as f64)),
                    ("some", found) => Value::Bool(found.is_some()),
                    (_, found) => Value::Bool(found.is_none()),
                })
            })
        }
        "reduce" => Value::native("reduce", |interp, this, args| {
            let array = this_array(&this, "reduce")?;
            let callback = arg(&args, 0);
            let mut items = array.to_vec().into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match items.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(RuntimeError::Type(
                            "Reduce of empty array with no initial value".to_string(),
                        ))
                    }
                },
            };
            for (i, item) in items {
                acc = interp.call(&callback, Value::Undefined, vec![acc, item, Value::Number(i as f64)])?;
            }
            Ok(acc)
        }),
        "concat" => Value::native("concat", |_, this, args| {
            let mut out = this_array(&this, "concat")?.to_vec();
            for value in args {
                match value {
                    Value::Array(array) => out.extend(array.to_vec()),
                    other => out.push(other),
                }
            }
            Ok(Value::Array(Array::from_vec(out)))
        }),
        _ => return None,
    };
    Some(method)
}

/// `start..end` of `slice(start, end)`; negative indexes count from the end.
fn slice_range(len: usize, args: &[Value]) -> (usize, usize) {
    let index = |value: Value, default: usize| match value {
        Value::Undefined => default,
        value => {
            let n = value.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    };
    let start = index(arg(args, 0), 0);
    let end = index(arg(args, 1), len);
    (start, end.max(start))
}

pub fn string_method(name: &str) -> Option<Value> {
    let method = match name {
        "toUpperCase" => Value::native("toUpperCase", |_, this, _| {
            Ok(Value::string(this_string(&this).to_uppercase()))
        }),
        "toLowerCase" => Value::native("toLowerCase", |_, this, _| {
            Ok(Value::string(this_string(&this).to_lowercase()))
        }),
        "trim" => Value::native("trim", |_, this, _| {
            Ok(Value::string(this_string(&this).trim()))
        }),
        "includes" => Value::native("includes", |_, this, args| {
            let needle = arg(&args, 0).to_display();
            Ok(Value::Bool(this_string(&this).contains(needle.as_str())))
        }),
        "startsWith" => Value::native("startsWith", |_, this, args| {
            let needle = arg(&args, 0).to_display();
            Ok(Value::Bool(this_string(&this).starts_with(needle.as_str())))
        }),
        "endsWith" => Value::native("endsWith", |_, this, args| {
            let needle = arg(&args, 0).to_display();
            Ok(Value::Bool(this_string(&this).ends_with(needle.as_str())))
        }),
        "split" => Value::native("split", |_, this, args| {
            let text = this_string(&this);
            let parts = match arg(&args, 0) {
                Value::Undefined => vec![Value::string(text)],
                separator => {
                    let separator = separator.to_display();
                    if separator.is_empty() {
                        text.chars().map(|c| Value::string(c.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(Value::string).collect()
                    }
                }
            };
            Ok(Value::Array(Array::from_vec(parts)))
        }),
        "slice" => Value::native("slice", |_, this, args| {
            let chars: Vec<char> = this_string(&this).chars().collect();
            let (start, end) = slice_range(chars.len(), &args);
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }),
        "indexOf" => Value::native("indexOf", |_, this, args| {
            let text = this_string(&this);
            let needle = arg(&args, 0).to_display();
            let index = text
                .find(needle.as_str())
                .map_or(-1.0, |byte| text[..byte].chars().count() as f64);
            Ok(Value::Number(index))
        }),
        "repeat" => Value::native("repeat", |_, this, args| {
            let count = arg(&args, 0).to_number();
            if !(0.0..=1e6).contains(&count) {
                return Err(RuntimeError::Thrown(error_object("RangeError", "Invalid count value")));
            }
            Ok(Value::string(this_string(&this).repeat(count as usize)))
        }),
        "replace" => Value::native("replace", |interp, this, args| {
            let text = this_string(&this);
            let pattern = arg(&args, 0).to_display();
            let Some(at) = text.find(pattern.as_str()) else {
                return Ok(Value::string(text));
            };
            let replacement = match arg(&args, 1) {
                callback @ Value::Function(_) => interp
                    .call(&callback, Value::Undefined, vec![Value::string(pattern.as_str())])?
                    .to_display(),
                other => other.to_display(),
            };
            Ok(Value::string(format!(
                "{}{}{}",
                &text[..at],
                replacement,
                &text[at + pattern.len()..]
            )))
        }),
        "toString" => Value::native("toString", |_, this, _| Ok(Value::string(this_string(&this)))),
        _ => return None,
    };
    Some(method)
}

pub fn primitive_method(name: &str) -> Option<Value> {
    match name {
        "toString" => Some(Value::native("toString", |_, this, _| {
            Ok(Value::string(this.to_display()))
        })),
        "toFixed" => Some(Value::native("toFixed", |_, this, args| {
            let digits = arg(&args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 20.0) as usize };
            Ok(Value::string(format!("{:.*}", digits, this.to_number())))
        })),
        _ => None,
    }
}

pub fn function_method(name: &str) -> Option<Value> {
    match name {
        "call" => Some(Value::native("call", |interp: &mut Interpreter, this, args| {
            let mut args = args.into_iter();
            let this_arg = args.next().unwrap_or_default();
            interp.call(&this, this_arg, args.collect())
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_module;

    fn eval_global(source: &str, name: &str) -> Value {
        let env = global_env();
        Interpreter::new()
            .run(parse_module(source).unwrap(), &env)
            .unwrap();
        env.lookup(name).unwrap()
    }

    #[test]
    fn json_stringify_and_parse() {
        assert_eq!(
            eval_global("const s = JSON.stringify({ a: [1, 'x'], f() {} })", "s").to_display(),
            r#"{"a":[1,"x"]}"#
        );
        assert_eq!(
            eval_global("const n = JSON.parse('{\"n\": 4}').n", "n").to_number(),
            4.0
        );
    }

    #[test]
    fn object_assign_merges_in_place() {
        let value = eval_global(
            "const target = { a: 1 }\nObject.assign(target, { b: 2 }, { a: 3 })",
            "target",
        );
        assert_eq!(value.to_json(), serde_json::json!({ "a": 3, "b": 2 }));
    }

    #[test]
    fn object_keys_in_insertion_order() {
        assert_eq!(
            eval_global("const k = Object.keys({ z: 1, a: 2 }).join()", "k").to_display(),
            "z,a"
        );
    }

    #[test]
    fn function_call_binds_this() {
        assert_eq!(
            eval_global(
                "function get() { return this.v }\nconst r = get.call({ v: 9 })",
                "r"
            )
            .to_number(),
            9.0
        );
    }

    #[test]
    fn object_create_sets_the_prototype() {
        assert_eq!(
            eval_global(
                "const base = { hi() { return 'hi ' + this.n } }\nconst o = Object.create(base)\no.n = 1\nconst r = o.hi()",
                "r"
            )
            .to_display(),
            "hi 1"
        );
    }

    #[test]
    fn array_search_and_fold() {
        let value = eval_global(
            "const xs = [3, 8, 5]\n\
             const r = [xs.find(x => x > 4), xs.findIndex(x => x > 9), xs.some(x => x === 5), xs.every(x => x > 2), xs.reduce((a, x) => a + x, 0), xs.slice(-2), xs.pop(), xs.length]",
            "r",
        );
        assert_eq!(value.to_json(), serde_json::json!([8, -1, true, true, 16, [8, 5], 5, 2]));
    }

    #[test]
    fn string_slicing_and_replace() {
        let value = eval_global(
            "const r = ['hello'.slice(1, -1), 'hello'.indexOf('l'), 'ab'.repeat(2), 'a-b-c'.replace('-', '+')]",
            "r",
        );
        assert_eq!(value.to_json(), serde_json::json!(["ell", 2, "abab", "a+b-c"]));
    }

    #[test]
    fn string_methods() {
        assert_eq!(
            eval_global("const r = ' Hi '.trim().toUpperCase()", "r").to_display(),
            "HI"
        );
    }
}
