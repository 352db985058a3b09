use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::Serialize;
use sfc_loader::runtime::render_component;
use sfc_loader::{
    create_module, Diagnostic, DiagnosticCollector, DocumentLoader, FsSource, Options, StyleBuffer,
    StyleEntry,
};
use tracing::Level;

const USAGE: &str = "usage: sfc-loader <file.vue> [--root <dir>] [--prod] [--verbose]";

#[derive(Debug)]
struct CliArgs {
    file: String,
    root: PathBuf,
    production: bool,
    verbose: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    filename: String,
    scope_id: Option<String>,
    exports: Vec<String>,
    styles: Vec<StyleEntry>,
    diagnostics: Vec<Diagnostic>,
    html: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("[sfc-loader] {:#}", err);
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = parse_args(env::args().skip(1))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve root '{}'", args.root.display()))?;
    let filename = module_id(&args.file);
    let loader = DocumentLoader::new(FsSource::new(root.clone()));

    let source = tokio::fs::read_to_string(root.join(filename.trim_start_matches('/')))
        .await
        .with_context(|| format!("failed to read '{}'", filename))?
        .replace("\r\n", "\n");

    let styles = StyleBuffer::new();
    let log = DiagnosticCollector::new();
    let options = Options::new()
        .with_add_style(Arc::new(styles.clone()))
        .with_log(Arc::new(log.clone()))
        .with_production(args.production);

    let component = create_module(&source, &filename, &options, &loader).await?;

    let html = if component.get("render").is_some() {
        Some(render_component(&component).map_err(|err| anyhow!("render failed: {}", err))?)
    } else {
        None
    };

    let report = Report {
        scope_id: component
            .get("_scopeId")
            .and_then(|id| id.as_str().map(str::to_string)),
        exports: component.keys().iter().map(|key| key.to_string()).collect(),
        styles: styles.entries(),
        diagnostics: log.diagnostics(),
        html,
        filename,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut file: Option<String> = None;
    let mut root = PathBuf::from(".");
    let mut production = false;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                let value = args.next().ok_or_else(|| anyhow!("missing value for --root"))?;
                root = PathBuf::from(value);
            }
            "--prod" => production = true,
            "--verbose" => verbose = true,
            "-h" | "--help" => return Err(anyhow!(USAGE)),
            flag if flag.starts_with("--") => {
                return Err(anyhow!("unknown argument '{}'. {}", flag, USAGE));
            }
            _ if file.is_some() => return Err(anyhow!("unexpected argument '{}'. {}", arg, USAGE)),
            _ => file = Some(arg),
        }
    }

    Ok(CliArgs {
        file: file.ok_or_else(|| anyhow!("missing input file. {}", USAGE))?,
        root,
        production,
        verbose,
    })
}

/// Module ids are root-relative and always start with `/`.
fn module_id(file: &str) -> String {
    let path = Path::new(file)
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<CliArgs> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags() {
        let parsed = args(&["app.vue", "--root", "site", "--prod"]).unwrap();
        assert_eq!(parsed.file, "app.vue");
        assert_eq!(parsed.root, PathBuf::from("site"));
        assert!(parsed.production);
        assert!(!parsed.verbose);
    }

    #[test]
    fn rejects_unknown_flags_and_missing_file() {
        assert!(args(&["--watch"]).is_err());
        assert!(args(&["--prod"]).is_err());
        assert!(args(&["a.vue", "b.vue"]).is_err());
    }

    #[test]
    fn module_ids_are_rooted() {
        assert_eq!(module_id("components/app.vue"), "/components/app.vue");
        assert_eq!(module_id("./app.vue"), "/app.vue");
    }
}
