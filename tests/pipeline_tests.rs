use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sfc_loader::pipeline::custom_block::callback;
use sfc_loader::runtime::{call_function, render_component, to_html};
use sfc_loader::script::ast::Module;
use sfc_loader::utils::{document_hash, scope_id};
use sfc_loader::{
    create_module, Block, BlockKind, CacheKey, CustomBlockCallback, CustomBlockHandler,
    DiagnosticCollector, DiagnosticLevel, DocumentLoader, LoaderError, Object, Options,
    SourceTransform, StyleBuffer, StyleEntry, Value, VERSION,
};

type MemoryLoader = DocumentLoader<HashMap<String, String>>;

fn no_files() -> MemoryLoader {
    DocumentLoader::new(HashMap::new())
}

struct Harness {
    options: Options,
    styles: StyleBuffer,
    log: DiagnosticCollector,
}

fn harness() -> Harness {
    let styles = StyleBuffer::new();
    let log = DiagnosticCollector::new();
    let options = Options::new()
        .with_add_style(Arc::new(styles.clone()))
        .with_log(Arc::new(log.clone()));
    Harness {
        options,
        styles,
        log,
    }
}

/// Counts how often the script compiler runs, one call per compiled block.
#[derive(Default)]
struct CountingTransform {
    calls: AtomicUsize,
}

impl SourceTransform for CountingTransform {
    fn name(&self) -> &str {
        "counting"
    }

    fn transform(&self, _: &mut Module, _: &str) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn template_only_document_renders() {
    let h = harness();
    let component = create_module(
        "<template><div>{{msg}}</div></template>",
        "/hello.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let render = component.get("render").expect("render is merged");
    let context = Object::from_entries([("msg", Value::from("hi"))]);
    let tree = call_function(&render, Value::Undefined, vec![Value::Object(context)]).unwrap();
    assert_eq!(to_html(&tree), "<div>hi</div>");
    assert!(component.get("staticRenderFns").is_some());
    assert!(h.styles.is_empty());
    assert!(h.log.errors().is_empty());
}

#[tokio::test]
async fn script_only_document_exports_its_definition() {
    let h = harness();
    let component = create_module(
        "<script>\nexport default { data() { return { msg: 'hi' } } }\n</script>",
        "/data.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let keys: Vec<String> = component.keys().iter().map(|key| key.to_string()).collect();
    assert_eq!(keys, vec!["data"]);
    assert!(matches!(component.get("data"), Some(Value::Function(_))));
    assert!(!component.contains_key("_scopeId"));
    assert!(h.styles.is_empty());
}

#[tokio::test]
async fn scoped_styles_share_the_document_scope_id() {
    let h = harness();
    let source = "<style scoped>.a { color: red }</style>\n<style scoped>.b { color: blue }</style>";
    let component = create_module(source, "/two.vue", &h.options, &no_files())
        .await
        .unwrap();

    let expected = format!("data-v-{}", document_hash("/two.vue", VERSION));
    let entries = h.styles.entries();
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(entry.scope_id.as_deref(), Some(expected.as_str()));
        assert!(entry.css.contains(&format!("[{}]", expected)), "{}", entry.css);
    }
    assert_eq!(component.get("_scopeId"), Some(Value::string(expected.as_str())));
}

#[tokio::test]
async fn full_component_renders_with_data() {
    let h = harness();
    let source = "<template>\n  <ul>\n    <li v-for=\"item in items\" :key=\"item\">{{ item }}</li>\n  </ul>\n</template>\n\
                  <script>\nexport default { data() { return { items: ['a', 'b'] } } }\n</script>\n\
                  <style>\nli { margin: 0 }\n</style>";
    let component = create_module(source, "/list.vue", &h.options, &no_files())
        .await
        .unwrap();

    assert_eq!(render_component(&component).unwrap(), "<ul><li>a</li><li>b</li></ul>");
    assert_eq!(h.styles.len(), 1);
}

#[tokio::test]
async fn scripts_use_modern_syntax() {
    let h = harness();
    let source = "<template><p>{{ summary }}</p></template>\n<script>\n\
class Counter {\n\
  count = 0;\n\
  constructor(step) { this.step = step }\n\
  tick() { this.count += this.step; return this }\n\
}\n\
const base = { label: 'total' };\n\
function tally(limit) {\n\
  const counter = new Counter(2);\n\
  let rounds = 0;\n\
  while (counter.count < limit) { counter.tick(); rounds++ }\n\
  for (let i = 0; i < 2; i++) rounds += i;\n\
  try { missing.value } catch (err) { rounds += err.name === 'ReferenceError' ? 10 : 0 }\n\
  return { ...base, rounds, deep: base?.nested?.value ?? 'none' };\n\
}\n\
export default {\n\
  data() {\n\
    const { label, rounds, deep } = tally(6);\n\
    return { summary: `${label}: ${rounds} (${deep})` };\n\
  }\n\
}\n\
</script>";
    let component = create_module(source, "/modern.vue", &h.options, &no_files())
        .await
        .unwrap();

    assert_eq!(render_component(&component).unwrap(), "<p>total: 14 (none)</p>");
    assert!(h.log.errors().is_empty());
}

// ============================================================================
// Styles
// ============================================================================

#[tokio::test]
async fn unscoped_styles_have_no_scope_id() {
    let h = harness();
    let source = "<template><p>x</p></template>\n<style>.a { color: red }</style>\n<style scoped>.b { color: red }</style>";
    let component = create_module(source, "/mixed.vue", &h.options, &no_files())
        .await
        .unwrap();

    let id = scope_id("/mixed.vue", VERSION);
    let scopes: Vec<Option<String>> = h
        .styles
        .entries()
        .into_iter()
        .map(|StyleEntry { scope_id, .. }| scope_id)
        .collect();
    assert_eq!(scopes, vec![None, Some(id.clone())]);

    // One scoped block is enough to tag the template.
    assert_eq!(
        render_component(&component).unwrap(),
        format!("<p {}=\"\">x</p>", id)
    );
}

#[tokio::test]
async fn scope_id_is_pure() {
    assert_eq!(scope_id("/a.vue", "1.0.0"), scope_id("/a.vue", "1.0.0"));
    assert_ne!(scope_id("/a.vue", "1.0.0"), scope_id("/b.vue", "1.0.0"));
    assert_ne!(scope_id("/a.vue", "1.0.0"), scope_id("/a.vue", "1.0.1"));

    let first = harness();
    let second = harness();
    let source = "<style scoped>.a { color: red }</style>";
    create_module(source, "/pure.vue", &first.options, &no_files()).await.unwrap();
    create_module(source, "/pure.vue", &second.options, &no_files()).await.unwrap();
    assert_eq!(first.styles.entries(), second.styles.entries());
}

#[tokio::test]
async fn style_preprocessor_comes_from_the_module_cache() {
    let h = harness();
    let vars = Object::from_entries([(
        "render",
        Value::native("render", |_, _, args| {
            let source = args.first().map(Value::to_display).unwrap_or_default();
            Ok(Value::string(source.replace("$accent", "red")))
        }),
    )]);
    h.options.module_cache.insert("vars", Value::Object(vars));

    create_module(
        "<style lang=\"vars\">.a { color: $accent }</style>",
        "/vars.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let css = h.styles.stitch();
    assert!(css.contains("color: red"), "{}", css);
    assert!(h.log.errors().is_empty());
}

#[tokio::test]
async fn style_preprocessor_ids_go_through_path_resolve() {
    let h = harness();
    let options = h
        .options
        .clone()
        .with_path_resolve(Arc::new(|_, specifier| format!("/node_modules/{}", specifier)));
    let vars = Object::from_entries([(
        "render",
        Value::native("render", |_, _, args| {
            let source = args.first().map(Value::to_display).unwrap_or_default();
            Ok(Value::string(source.replace("$accent", "red")))
        }),
    )]);
    options.module_cache.insert("/node_modules/vars", Value::Object(vars));

    create_module(
        "<style lang=\"vars\">.a { color: $accent }</style>",
        "/resolved.vue",
        &options,
        &no_files(),
    )
    .await
    .unwrap();

    let css = h.styles.stitch();
    assert!(css.contains("color: red"), "{}", css);
    assert!(!options.module_cache.contains("vars"));
    assert!(h.log.errors().is_empty());
}

#[tokio::test]
async fn invalid_css_is_logged_and_still_delivered() {
    let h = harness();
    let content = "..a { color: red }";
    let source = format!("<style>{}</style>", content);
    create_module(&source, "/bad.vue", &h.options, &no_files())
        .await
        .unwrap();

    assert_eq!(h.styles.len(), 1);
    let errors = h.log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, "SFC style");

    let key = CacheKey::new(&document_hash("/bad.vue", VERSION), BlockKind::Style, content);
    assert!(!h.options.compiled_cache.contains(&key));
}

// ============================================================================
// Compiled cache
// ============================================================================

#[tokio::test]
async fn identical_scripts_compile_once() {
    let counter = Arc::new(CountingTransform::default());
    let options = Options::new().with_transform(counter.clone());
    let script = "<script>\nexport default { name: 'cached' }\n</script>";

    let first = create_module(script, "/cached.vue", &options, &no_files())
        .await
        .unwrap();
    let second = create_module(
        &format!("{}\n<style>.x {{ color: red }}</style>", script),
        "/cached.vue",
        &options,
        &no_files(),
    )
    .await
    .unwrap();

    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.get("name"), Some(Value::from("cached")));
    assert_eq!(second.get("name"), Some(Value::from("cached")));
    // Each call instantiates its own component.
    assert!(!first.ptr_eq(&second));
}

#[tokio::test]
async fn different_versions_do_not_share_artifacts() {
    let counter = Arc::new(CountingTransform::default());
    let options = Options::new().with_transform(counter.clone());
    let script = "<script>export default {}</script>";

    create_module(script, "/v.vue", &options, &no_files()).await.unwrap();
    let bumped = options.clone().with_version("9.9.9");
    create_module(script, "/v.vue", &bumped, &no_files()).await.unwrap();

    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Error handling
// ============================================================================

#[tokio::test]
async fn template_errors_keep_script_exports() {
    let h = harness();
    let template = "<div>{{ a + }}</div>";
    let source = format!(
        "<template>{}</template>\n<script>\nexport default {{ name: 'degraded' }}\n</script>",
        template
    );
    let component = create_module(&source, "/degraded.vue", &h.options, &no_files())
        .await
        .unwrap();

    assert_eq!(component.get("name"), Some(Value::from("degraded")));
    assert!(component.get("render").is_some());

    let errors = h.log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, "SFC template");
    assert!(errors[0].message.contains("invalid expression"), "{}", errors[0].message);

    let key = CacheKey::new(&document_hash("/degraded.vue", VERSION), BlockKind::Template, template);
    assert!(!h.options.compiled_cache.contains(&key));
}

#[tokio::test]
async fn malformed_v_for_alias_is_a_template_error() {
    let h = harness();
    let source = "<template><ul><li v-for=\"(a b) in xs\" :key=\"a\">x</li></ul></template>\n\
                  <script>export default { name: 'keep' }</script>";
    let component = create_module(source, "/alias.vue", &h.options, &no_files())
        .await
        .unwrap();

    assert_eq!(component.get("name"), Some(Value::from("keep")));
    assert!(component.get("render").is_some());

    let errors = h.log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, "SFC template");
    assert!(errors[0].message.contains("Invalid v-for alias"), "{}", errors[0].message);
    assert!(errors[0].message.starts_with("/alias.vue:1:19\n"), "{}", errors[0].message);
}

#[tokio::test]
async fn script_syntax_error_rejects_before_styles() {
    let h = harness();
    let source = "<template><p>x</p></template>\n<script>\nexport default {\n  name: \n}\n</script>\n\
                  <style>.a { color: red }</style>";
    let err = create_module(source, "/broken.vue", &h.options, &no_files())
        .await
        .unwrap_err();

    match err {
        LoaderError::ScriptSyntax { filename, line, .. } => {
            assert_eq!(filename, "/broken.vue");
            assert_eq!(line, 5);
        }
        other => panic!("expected a syntax error, got {other}"),
    }
    assert!(h.styles.is_empty());

    let errors = h.log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, "SFC script");
    assert!(errors[0].message.starts_with("/broken.vue:5:"), "{}", errors[0].message);
}

#[tokio::test]
async fn parse_problems_are_logged_not_raised() {
    let h = harness();
    let component = create_module(
        "<template><p>a</p></template>\n<template><p>b</p></template>",
        "/dup.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    assert_eq!(render_component(&component).unwrap(), "<p>a</p>");
    let errors = h.log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, "SFC parse");
}

#[tokio::test]
async fn missing_template_preprocessor_fails_the_document() {
    let h = harness();
    let err = create_module(
        "<template lang=\"pug\">p hi</template>",
        "/pug.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LoaderError::ModuleLoad { ref id, .. } if id == "pug"));
    assert!(matches!(err.root_cause(), LoaderError::ModuleNotFound(id) if id == "pug"));
}

#[tokio::test]
async fn template_preprocessor_output_is_compiled() {
    let h = harness();
    let brackets = Object::from_entries([(
        "render",
        Value::native("render", |_, _, args| {
            let source = args.first().map(Value::to_display).unwrap_or_default();
            Ok(Value::string(source.replace("[[", "{{").replace("]]", "}}")))
        }),
    )]);
    h.options.module_cache.insert("brackets", Value::Object(brackets));

    let component = create_module(
        "<template lang=\"brackets\"><b>[[ n ]]</b></template>\n\
         <script>export default { data() { return { n: 3 } } }</script>",
        "/brackets.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    assert_eq!(render_component(&component).unwrap(), "<b>3</b>");
}

#[tokio::test]
async fn tips_are_logged_as_info() {
    let h = harness();
    create_module(
        "<template><ul><li v-for=\"x in xs\">{{ x }}</li></ul></template>",
        "/tips.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let diagnostics = h.log.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].level, DiagnosticLevel::Info);
    assert_eq!(diagnostics[0].stage, "SFC template");
}

#[tokio::test]
async fn tips_point_into_the_document() {
    let h = harness();
    create_module(
        "<script>export default {}</script>\n<template>\n<ul><li v-for=\"x in xs\">{{ x }}</li></ul>\n</template>",
        "/tips.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let diagnostics = h.log.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    let message = &diagnostics[0].message;
    assert!(message.starts_with("/tips.vue:3:9\n"), "{}", message);
    assert!(message.contains("explicit keys"), "{}", message);
}

#[tokio::test]
async fn preprocessed_template_messages_point_into_the_output() {
    let h = harness();
    let brackets = Object::from_entries([(
        "render",
        Value::native("render", |_, _, args| {
            let source = args.first().map(Value::to_display).unwrap_or_default();
            Ok(Value::string(source.trim().replace("[[", "{{").replace("]]", "}}")))
        }),
    )]);
    h.options.module_cache.insert("brackets", Value::Object(brackets));

    create_module(
        "<template lang=\"brackets\">\n\n<ul><li v-for=\"x in xs\">[[ x ]]</li></ul></template>",
        "/pre.vue",
        &h.options,
        &no_files(),
    )
    .await
    .unwrap();

    let diagnostics = h.log.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.starts_with("/pre.vue:1:9\n"), "{}", diagnostics[0].message);
}

#[tokio::test]
async fn production_drops_tips() {
    let h = harness();
    let options = h.options.clone().with_production(true);
    create_module(
        "<template><ul><li v-for=\"x in xs\">{{ x }}</li></ul></template>",
        "/tips.vue",
        &options,
        &no_files(),
    )
    .await
    .unwrap();
    assert!(h.log.diagnostics().is_empty());
}

// ============================================================================
// Custom blocks
// ============================================================================

#[derive(Default)]
struct I18nHandler {
    handled: AtomicUsize,
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl CustomBlockHandler for I18nHandler {
    async fn handle(
        &self,
        block: &Block,
        _filename: &str,
        _options: &Options,
    ) -> Result<Option<CustomBlockCallback>, LoaderError> {
        if block.tag != "i18n" {
            return Ok(None);
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
        let seen = self.seen.clone();
        let messages = block.content.trim().to_string();
        Ok(Some(callback(move |component: Object| async move {
            seen.lock()
                .push(component.keys().iter().map(|key| key.to_string()).collect());
            let mut list = match component.get("i18n") {
                Some(Value::String(existing)) => existing.to_string(),
                _ => String::new(),
            };
            list.push_str(&messages);
            component.set("i18n", Value::string(list));
            Ok(())
        })))
    }
}

#[tokio::test]
async fn custom_block_callbacks_see_the_full_component() {
    let handler = Arc::new(I18nHandler::default());
    let h = harness();
    let options = h.options.clone().with_custom_block_handler(handler.clone());
    let source = "<i18n>a</i18n>\n<template><p>x</p></template>\n\
                  <script>export default { name: 'blocks' }</script>\n\
                  <style scoped>p { color: red }</style>\n<docs>ignored</docs>\n<i18n>b</i18n>";
    let component = create_module(source, "/blocks.vue", &options, &no_files())
        .await
        .unwrap();

    assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    let seen = handler.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    for keys in &seen {
        for expected in ["_scopeId", "name", "render", "staticRenderFns"] {
            assert!(keys.iter().any(|key| key == expected), "{expected} missing from {keys:?}");
        }
    }
    let i18n = component.get("i18n").and_then(|v| v.as_str().map(str::to_string)).unwrap();
    assert_eq!(i18n.len(), 2);
    assert_eq!(h.styles.len(), 1);
}

struct RejectingHandler;

#[async_trait]
impl CustomBlockHandler for RejectingHandler {
    async fn handle(
        &self,
        block: &Block,
        _filename: &str,
        _options: &Options,
    ) -> Result<Option<CustomBlockCallback>, LoaderError> {
        Err(LoaderError::CustomBlock {
            tag: block.tag.clone(),
            message: "unsupported".to_string(),
        })
    }
}

#[tokio::test]
async fn custom_block_handler_errors_abort() {
    let h = harness();
    let options = h.options.clone().with_custom_block_handler(Arc::new(RejectingHandler));
    let err = create_module(
        "<docs>x</docs>\n<style>.a { color: red }</style>",
        "/reject.vue",
        &options,
        &no_files(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "Custom block <docs> failed: unsupported");
    assert!(h.styles.is_empty());
    assert_eq!(h.log.errors()[0].stage, "SFC custom block");
}

// ============================================================================
// Logging fallback
// ============================================================================

#[tokio::test]
async fn closures_work_as_log_and_style_sink() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let css = Arc::new(Mutex::new(Vec::new()));
    let log_lines = lines.clone();
    let sink = css.clone();
    let options = Options::new()
        .with_log(Arc::new(move |level: DiagnosticLevel, stage: &str, _: &str| {
            log_lines.lock().push((level, stage.to_string()));
        }))
        .with_add_style(Arc::new(move |text: &str, _: Option<&str>| {
            sink.lock().push(text.to_string());
        }));

    create_module(
        "<template><div></template>\n<style>.a { color: red }</style>",
        "/closures.vue",
        &options,
        &no_files(),
    )
    .await
    .unwrap();

    assert_eq!(
        lines.lock().clone(),
        vec![(DiagnosticLevel::Error, "SFC template".to_string())]
    );
    assert_eq!(css.lock().len(), 1);
}
