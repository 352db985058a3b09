//! Render helpers exposed to compiled templates, and an HTML printer for
//! the node trees they build.
//!
//! Nodes are plain runtime objects:
//! - element: `{ tag, data, children }`
//! - text: `{ text }`
//! - comment: `{ comment }`

use super::interpreter::Interpreter;
use super::value::{Array, Object, Value};
use super::RuntimeError;
use crate::utils::escape_html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// The helper module compiled templates import from `"vue"`.
pub fn render_helpers() -> Value {
    Value::Object(Object::from_entries([
        ("h", Value::native("h", h)),
        (
            "text",
            Value::native("text", |_, _, args| {
                Ok(text_node(&args.first().cloned().unwrap_or_default()))
            }),
        ),
        (
            "toDisplayString",
            Value::native("toDisplayString", |_, _, args| {
                Ok(Value::string(to_display_string(
                    &args.first().cloned().unwrap_or_default(),
                )))
            }),
        ),
        ("renderList", Value::native("renderList", render_list)),
        (
            "comment",
            Value::native("comment", |_, _, args| {
                let text = match args.first() {
                    Some(value) if !value.is_nullish() => value.to_display(),
                    _ => String::new(),
                };
                Ok(Value::Object(Object::from_entries([(
                    "comment",
                    Value::string(text),
                )])))
            }),
        ),
    ]))
}

/// Interpolation text: empty for `null`/`undefined`, JSON for containers.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined | Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(&value.to_json()).unwrap_or_default()
        }
        other => other.to_display(),
    }
}

fn text_node(value: &Value) -> Value {
    Value::Object(Object::from_entries([(
        "text",
        Value::string(value.to_display()),
    )]))
}

fn flatten_children(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items.to_vec() {
                flatten_children(&item, out);
            }
        }
        Value::Undefined | Value::Null | Value::Bool(_) => {}
        Value::String(_) | Value::Number(_) => out.push(text_node(value)),
        other => out.push(other.clone()),
    }
}

/// `h(tag, data?, children?)`
fn h(_: &mut Interpreter, _: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut args = args.into_iter();
    let tag = args.next().unwrap_or_default();
    if !matches!(tag, Value::String(_)) {
        return Err(RuntimeError::Type("h() expects a tag name".to_string()));
    }
    let (data, children) = match args.next() {
        Some(value @ (Value::Array(_) | Value::String(_) | Value::Number(_))) => {
            (Value::Undefined, value)
        }
        Some(data) => (data, args.next().unwrap_or_default()),
        None => (Value::Undefined, Value::Undefined),
    };

    let mut flat = Vec::new();
    flatten_children(&children, &mut flat);

    let node = Object::new();
    node.set("tag", tag);
    node.set(
        "data",
        match data {
            Value::Object(_) => data,
            _ => Value::Object(Object::new()),
        },
    );
    node.set("children", Value::Array(Array::from_vec(flat)));
    Ok(Value::Object(node))
}

/// `renderList(source, fn)` over arrays, counts, strings and objects.
fn render_list(
    interp: &mut Interpreter,
    _: Value,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let source = args.first().cloned().unwrap_or_default();
    let render = args.get(1).cloned().unwrap_or_default();
    let mut out = Vec::new();
    match source {
        Value::Array(items) => {
            for (i, item) in items.to_vec().into_iter().enumerate() {
                out.push(interp.call(&render, Value::Undefined, vec![item, Value::Number(i as f64)])?);
            }
        }
        Value::Number(n) => {
            for i in 0..n.max(0.0) as usize {
                out.push(interp.call(
                    &render,
                    Value::Undefined,
                    vec![Value::Number((i + 1) as f64), Value::Number(i as f64)],
                )?);
            }
        }
        Value::String(s) => {
            for (i, c) in s.chars().enumerate() {
                out.push(interp.call(
                    &render,
                    Value::Undefined,
                    vec![Value::string(c.to_string()), Value::Number(i as f64)],
                )?);
            }
        }
        Value::Object(object) => {
            for (i, (key, value)) in object.entries().into_iter().enumerate() {
                out.push(interp.call(
                    &render,
                    Value::Undefined,
                    vec![value, Value::String(key), Value::Number(i as f64)],
                )?);
            }
        }
        _ => {}
    }
    Ok(Value::Array(Array::from_vec(out)))
}

/// Print a node tree (or list of nodes) as HTML.
pub fn to_html(node: &Value) -> String {
    let mut out = String::new();
    write_html(node, &mut out);
    out
}

fn write_html(node: &Value, out: &mut String) {
    match node {
        Value::Array(items) => {
            for item in items.to_vec() {
                write_html(&item, out);
            }
        }
        Value::String(_) | Value::Number(_) => out.push_str(&escape_html(&node.to_display())),
        Value::Object(object) => {
            if let Some(text) = object.get("text") {
                out.push_str(&escape_html(&text.to_display()));
            } else if let Some(comment) = object.get("comment") {
                out.push_str("<!--");
                out.push_str(&comment.to_display());
                out.push_str("-->");
            } else if let Some(Value::String(tag)) = object.get("tag") {
                out.push('<');
                out.push_str(&tag);
                if let Some(Value::Object(attrs)) = object
                    .get("data")
                    .as_ref()
                    .and_then(Value::as_object)
                    .and_then(|data| data.get("attrs"))
                {
                    write_attrs(&attrs, out);
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                if let Some(children) = object.get("children") {
                    write_html(&children, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
        }
        _ => {}
    }
}

fn write_attrs(attrs: &Object, out: &mut String) {
    for (name, value) in attrs.entries() {
        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => {
                out.push(' ');
                out.push_str(&name);
            }
            other => {
                out.push(' ');
                out.push_str(&name);
                out.push_str("=\"");
                out.push_str(&escape_html(&other.to_display()));
                out.push('"');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::call_function;
    use pretty_assertions::assert_eq;

    fn helper(name: &str) -> Value {
        render_helpers().as_object().unwrap().get(name).unwrap()
    }

    #[test]
    fn builds_and_prints_elements() {
        let attrs = Object::from_entries([("id", Value::from("x")), ("data-v-1", Value::from(""))]);
        let data = Object::from_entries([("attrs", Value::Object(attrs))]);
        let node = call_function(
            &helper("h"),
            Value::Undefined,
            vec![
                Value::from("p"),
                Value::Object(data),
                Value::Array(Array::from_vec(vec![Value::from("a < b")])),
            ],
        )
        .unwrap();
        assert_eq!(to_html(&node), r#"<p id="x" data-v-1="">a &lt; b</p>"#);
    }

    #[test]
    fn children_may_replace_data() {
        let node = call_function(
            &helper("h"),
            Value::Undefined,
            vec![Value::from("br"), Value::Array(Array::new())],
        )
        .unwrap();
        assert_eq!(to_html(&node), "<br>");
    }

    #[test]
    fn display_string_of_values() {
        assert_eq!(to_display_string(&Value::Null), "");
        assert_eq!(to_display_string(&Value::Number(3.0)), "3");
        let object = Object::from_entries([("a", Value::Number(1.0))]);
        assert_eq!(to_display_string(&Value::Object(object)), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn render_list_over_a_count() {
        let list = call_function(
            &helper("renderList"),
            Value::Undefined,
            vec![Value::Number(3.0), helper("text")],
        )
        .unwrap();
        assert_eq!(to_html(&list), "123");
    }

    #[test]
    fn comment_nodes() {
        let node = call_function(&helper("comment"), Value::Undefined, vec![]).unwrap();
        assert_eq!(to_html(&node), "<!---->");
    }
}
