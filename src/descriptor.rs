//! Document splitting.
//!
//! A document is a sequence of top-level elements: one optional
//! `<template>`, one optional `<script>`, any number of `<style>` blocks and
//! any number of custom blocks. Text between blocks is ignored.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::CompilerMessage;

/// One top-level element of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub tag: String,
    pub content: String,
    pub lang: Option<String>,
    pub scoped: bool,
    /// Every attribute of the opening tag; valueless attributes map to `""`.
    pub attrs: BTreeMap<String, String>,
    /// Byte range of `content` in the document.
    pub start: usize,
    pub end: usize,
}

impl Block {
    pub fn new(tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_attrs(tag, content, BTreeMap::new(), 0, 0)
    }

    fn with_attrs(
        tag: impl Into<String>,
        content: impl Into<String>,
        attrs: BTreeMap<String, String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            tag: tag.into(),
            content: content.into(),
            lang: attrs.get("lang").filter(|l| !l.is_empty()).cloned(),
            scoped: attrs.contains_key("scoped"),
            attrs,
            start,
            end,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        let lang = lang.into();
        self.attrs.insert("lang".to_string(), lang.clone());
        self.lang = Some(lang);
        self
    }

    pub fn with_scoped(mut self, scoped: bool) -> Self {
        if scoped {
            self.attrs.insert("scoped".to_string(), String::new());
        } else {
            self.attrs.remove("scoped");
        }
        self.scoped = scoped;
        self
    }
}

/// The parsed document. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub filename: String,
    pub template: Option<Block>,
    pub script: Option<Block>,
    pub styles: Vec<Block>,
    pub custom_blocks: Vec<Block>,
}

impl Descriptor {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Whether any style block is scoped.
    pub fn has_scoped_style(&self) -> bool {
        self.styles.iter().any(|style| style.scoped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub descriptor: Descriptor,
    /// Problems found while splitting. Reported, never fatal.
    pub errors: Vec<CompilerMessage>,
}

/// Splits raw document text into blocks.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, source: &str, filename: &str) -> ParseResult;
}

/// Default regex-driven parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SfcParser;

/// Elements whose content is raw text: no nesting, no comments.
const RAW_TEXT: &[&str] = &["script", "style"];

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^<([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s=>/"']+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?)*)\s*(/?)>"#,
        )
        .expect("open tag pattern is valid")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s=>/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)
            .expect("attribute pattern is valid")
    })
}

fn parse_attrs(text: &str) -> BTreeMap<String, String> {
    attr_re()
        .captures_iter(text)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            (caps[1].to_string(), value.to_string())
        })
        .collect()
}

/// `text` starts with `tag` followed by a tag-name boundary.
fn starts_with_tag(text: &str, tag: &str) -> bool {
    let Some(head) = text.get(..tag.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(tag)
        && text[tag.len()..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == '>' || c == '/')
}

/// Find the close tag matching an element opened before `from`.
/// Returns `(content end, offset after the close tag)`.
fn find_close(source: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let raw = RAW_TEXT.contains(&tag);
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(rel) = source[pos..].find('<') {
        let at = pos + rel;
        let rest = &source[at..];
        if !raw && rest.starts_with("<!--") {
            pos = rest.find("-->").map_or(source.len(), |e| at + e + 3);
            continue;
        }
        if let Some(after) = rest.strip_prefix("</") {
            if starts_with_tag(after, tag) {
                let close_end = at + rest.find('>')? + 1;
                depth -= 1;
                if depth == 0 {
                    return Some((at, close_end));
                }
                pos = close_end;
                continue;
            }
        } else if !raw && starts_with_tag(&rest[1..], tag) {
            depth += 1;
        }
        pos = at + 1;
    }
    None
}

impl DocumentParser for SfcParser {
    fn parse(&self, source: &str, filename: &str) -> ParseResult {
        let mut descriptor = Descriptor::new(filename);
        let mut errors = Vec::new();
        let mut pos = 0;

        while let Some(rel) = source[pos..].find('<') {
            let at = pos + rel;
            let rest = &source[at..];

            if rest.starts_with("<!--") {
                pos = match rest.find("-->") {
                    Some(e) => at + e + 3,
                    None => {
                        errors.push(CompilerMessage::located(
                            "Unterminated comment.",
                            at,
                            source.len(),
                        ));
                        source.len()
                    }
                };
                continue;
            }
            if rest.starts_with("</") {
                let end = rest.find('>').map_or(source.len(), |e| at + e + 1);
                errors.push(CompilerMessage::located("Invalid end tag.", at, end));
                pos = end;
                continue;
            }
            let Some(caps) = open_tag_re().captures(rest) else {
                pos = at + 1;
                continue;
            };

            let open_end = at + caps[0].len();
            let tag = caps[1].to_ascii_lowercase();
            let attrs = parse_attrs(caps.get(2).map_or("", |m| m.as_str()));
            let self_closing = !caps[3].is_empty();

            let (content_end, next) = if self_closing {
                (open_end, open_end)
            } else {
                match find_close(source, &tag, open_end) {
                    Some(found) => found,
                    None => {
                        errors.push(CompilerMessage::located(
                            format!("Element <{}> is missing end tag.", tag),
                            at,
                            open_end,
                        ));
                        (source.len(), source.len())
                    }
                }
            };

            let block = Block::with_attrs(
                tag,
                &source[open_end..content_end],
                attrs,
                open_end,
                content_end,
            );
            match block.tag.as_str() {
                "template" | "script" => {
                    let slot = if block.tag == "template" {
                        &mut descriptor.template
                    } else {
                        &mut descriptor.script
                    };
                    if slot.is_some() {
                        errors.push(CompilerMessage::located(
                            format!(
                                "Single file component can contain only one <{}> element",
                                block.tag
                            ),
                            at,
                            open_end,
                        ));
                    } else {
                        *slot = Some(block);
                    }
                }
                "style" => descriptor.styles.push(block),
                _ => descriptor.custom_blocks.push(block),
            }
            pos = next;
        }

        ParseResult { descriptor, errors }
    }
}
