//! Module instantiation.

use super::globals::global_env;
use super::interpreter::Interpreter;
use super::value::{Object, Value};
use super::{interop_require_default, RuntimeError};
use crate::script::parse_module;
use crate::script::transform::{DYNAMIC_IMPORT_FN, EXPORT_STAR_FN, INTEROP_DEFAULT_FN};
use crate::{LoaderError, Options};

/// Evaluate CommonJS `source` as the module `filename` and return its exports.
///
/// Every `require` is answered from `options.module_cache`; dependencies
/// must have been loaded before this is called.
pub fn instantiate(source: &str, filename: &str, options: &Options) -> Result<Value, LoaderError> {
    let module_ast = parse_module(source).map_err(|e| LoaderError::ScriptSyntax {
        filename: filename.to_string(),
        message: e.message,
        line: e.line,
        column: e.column,
    })?;

    let exports = Object::new();
    let module = Object::from_entries([("exports", Value::Object(exports.clone()))]);
    let require = require_fn(filename, options);

    let env = global_env().child();
    env.declare("exports", Value::Object(exports.clone()), true);
    env.declare("module", Value::Object(module.clone()), false);
    env.declare("require", require.clone(), false);
    env.declare(DYNAMIC_IMPORT_FN, require, false);
    env.declare(
        INTEROP_DEFAULT_FN,
        Value::native(INTEROP_DEFAULT_FN, |_, _, args| {
            Ok(interop_require_default(&args.first().cloned().unwrap_or_default()))
        }),
        false,
    );
    env.declare(EXPORT_STAR_FN, Value::native(EXPORT_STAR_FN, export_star), false);
    env.declare("__filename", Value::string(filename), false);
    env.declare("__dirname", Value::string(dirname(filename)), false);
    env.declare("this", Value::Object(exports), false);

    tracing::trace!(filename, "instantiating module");
    Interpreter::new()
        .run(module_ast, &env)
        .map_err(|source| LoaderError::Runtime {
            filename: filename.to_string(),
            source,
        })?;

    Ok(module.get("exports").unwrap_or_default())
}

fn require_fn(filename: &str, options: &Options) -> Value {
    let referrer = filename.to_string();
    let module_cache = options.module_cache.clone();
    let path_resolve = options.path_resolve.clone();
    Value::native("require", move |_, _, args| {
        let specifier = args.first().map(Value::to_display).unwrap_or_default();
        let id = path_resolve(&referrer, &specifier);
        module_cache.require(&id).ok_or_else(|| {
            RuntimeError::Module(format!(
                "require(\"{}\") failed: module '{}' was not loaded into the module cache",
                specifier, id
            ))
        })
    })
}

fn export_star(
    _: &mut Interpreter,
    _: Value,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    if let (Some(Value::Object(target)), Some(Value::Object(source))) = (args.first(), args.get(1)) {
        for (key, value) in source.entries() {
            if key.as_str() != "default" && key.as_str() != "__esModule" && !target.contains_key(&key) {
                target.set(key, value);
            }
        }
    }
    Ok(Value::Undefined)
}

fn dirname(filename: &str) -> &str {
    match filename.rfind('/') {
        Some(0) => "/",
        Some(i) => &filename[..i],
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleCache;
    use pretty_assertions::assert_eq;

    #[test]
    fn returns_module_exports() {
        let exports = instantiate("exports.a = 1\nexports.b = this.a + 1", "/x.js", &Options::new()).unwrap();
        assert_eq!(exports.to_json(), serde_json::json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn module_exports_replacement_wins() {
        let exports =
            instantiate("exports.a = 1\nmodule.exports = { b: 2 }", "/x.js", &Options::new()).unwrap();
        assert_eq!(exports.to_json(), serde_json::json!({ "b": 2 }));
    }

    #[test]
    fn require_reads_the_module_cache_through_path_resolution() {
        let dep = Object::from_entries([("answer", Value::Number(42.0))]);
        let options =
            Options::new().with_module_cache(ModuleCache::new().with_module("/lib/dep.js", Value::Object(dep)));
        let exports = instantiate(
            "exports.v = require('./dep.js').answer",
            "/lib/main.js",
            &options,
        )
        .unwrap();
        assert_eq!(exports.to_json(), serde_json::json!({ "v": 42 }));
    }

    #[test]
    fn missing_module_is_a_runtime_error() {
        let err = instantiate("require('nope')", "/a.js", &Options::new()).unwrap_err();
        match err {
            LoaderError::Runtime { filename, source } => {
                assert_eq!(filename, "/a.js");
                assert!(matches!(source, RuntimeError::Module(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn export_star_skips_default() {
        let dep = Object::from_entries([
            ("default", Value::Number(1.0)),
            ("named", Value::Number(2.0)),
        ]);
        let options = Options::new().with_module_cache(ModuleCache::new().with_module("dep", Value::Object(dep)));
        let exports = instantiate("__export_star__(exports, require('dep'))", "/a.js", &options).unwrap();
        assert_eq!(exports.to_json(), serde_json::json!({ "named": 2 }));
    }

    #[test]
    fn module_syntax_must_be_rewritten_first() {
        let err = instantiate("export const a = 1", "/a.js", &Options::new()).unwrap_err();
        assert!(
            matches!(err, LoaderError::Runtime { ref source, .. } if source.to_string().contains("outside a module")),
            "{err}"
        );
    }

    #[test]
    fn dirname_of_paths() {
        assert_eq!(dirname("/a/b.vue"), "/a");
        assert_eq!(dirname("/b.vue"), "/");
        assert_eq!(dirname("b.vue"), ".");
    }
}
