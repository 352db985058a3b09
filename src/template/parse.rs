//! Template markup to a node tree.
//!
//! Offsets are byte offsets into the template source. Comments are dropped
//! and whitespace is condensed: whitespace-only text containing a newline
//! disappears, other whitespace runs collapse to one space.

use std::sync::OnceLock;

use regex::Regex;

use crate::CompilerMessage;

pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Element(Element),
    Text(Vec<TextPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TextPart {
    Static(String),
    Interpolation { expr: String, start: usize, end: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    pub tag: String,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    /// Byte range of the opening tag.
    pub start: usize,
    pub end: usize,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|attr| attr.name == name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attr {
    pub name: String,
    pub value: Option<String>,
    /// Byte range of the whole attribute.
    pub start: usize,
    pub end: usize,
    /// Offset of the first byte of the value, when present.
    pub value_start: usize,
}

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^<([A-Za-z][A-Za-z0-9-]*)((?:\s+[^\s=>/"']+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?)*)\s*(/?)>"#,
        )
        .expect("open tag pattern is valid")
    })
}

fn close_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^</([A-Za-z][A-Za-z0-9-]*)\s*>").expect("close tag pattern is valid")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s=>/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)
            .expect("attribute pattern is valid")
    })
}

fn parse_attrs(text: &str, offset: usize) -> Vec<Attr> {
    attr_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4));
            Some(Attr {
                name: name.as_str().to_string(),
                value: value.map(|v| v.as_str().to_string()),
                start: offset + whole.start(),
                end: offset + whole.end(),
                value_start: offset + value.map_or(whole.end(), |v| v.start()),
            })
        })
        .collect()
}

/// Parse `source` into root nodes, appending problems to `errors`.
pub(crate) fn parse(source: &str, errors: &mut Vec<CompilerMessage>) -> Vec<Node> {
    let mut roots = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let Some(rel) = source[pos..].find('<') else {
            push_text(&mut stack, &mut roots, source, pos, source.len(), errors);
            break;
        };
        let at = pos + rel;
        let rest = &source[at..];

        if rest.starts_with("<!--") {
            push_text(&mut stack, &mut roots, source, pos, at, errors);
            pos = match rest.find("-->") {
                Some(e) => at + e + 3,
                None => {
                    errors.push(CompilerMessage::located("Unterminated comment.", at, source.len()));
                    source.len()
                }
            };
            continue;
        }

        if let Some(caps) = close_tag_re().captures(rest) {
            push_text(&mut stack, &mut roots, source, pos, at, errors);
            let end = at + caps[0].len();
            let tag = caps[1].to_ascii_lowercase();
            match stack.iter().rposition(|open| open.tag == tag) {
                Some(index) => {
                    while stack.len() > index + 1 {
                        if let Some(unclosed) = stack.pop() {
                            errors.push(missing_end_tag(&unclosed));
                            attach(&mut stack, &mut roots, Node::Element(unclosed));
                        }
                    }
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut roots, Node::Element(element));
                    }
                }
                None => errors.push(CompilerMessage::located(
                    format!("Invalid end tag </{}>.", tag),
                    at,
                    end,
                )),
            }
            pos = end;
            continue;
        }

        if let Some(caps) = open_tag_re().captures(rest) {
            push_text(&mut stack, &mut roots, source, pos, at, errors);
            let end = at + caps[0].len();
            let tag = caps[1].to_ascii_lowercase();
            let attrs_match = caps.get(2);
            let attrs = attrs_match.map_or_else(Vec::new, |m| parse_attrs(m.as_str(), at + m.start()));
            let element = Element {
                tag,
                attrs,
                children: Vec::new(),
                start: at,
                end,
            };
            if !caps[3].is_empty() || VOID_ELEMENTS.contains(&element.tag.as_str()) {
                attach(&mut stack, &mut roots, Node::Element(element));
            } else {
                stack.push(element);
            }
            pos = end;
            continue;
        }

        // A lone `<` is text.
        let next = source[at + 1..].find('<').map_or(source.len(), |i| at + 1 + i);
        push_text(&mut stack, &mut roots, source, pos, next, errors);
        pos = next;
    }

    while let Some(unclosed) = stack.pop() {
        errors.push(missing_end_tag(&unclosed));
        attach(&mut stack, &mut roots, Node::Element(unclosed));
    }
    roots
}

fn missing_end_tag(element: &Element) -> CompilerMessage {
    CompilerMessage::located(
        format!("Element <{}> is missing end tag.", element.tag),
        element.start,
        element.end,
    )
}

fn attach(stack: &mut [Element], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn push_text(
    stack: &mut [Element],
    roots: &mut Vec<Node>,
    source: &str,
    start: usize,
    end: usize,
    errors: &mut Vec<CompilerMessage>,
) {
    if start >= end {
        return;
    }
    let text = &source[start..end];
    if text.trim().is_empty() {
        if !text.contains('\n') {
            attach(stack, roots, Node::Text(vec![TextPart::Static(" ".to_string())]));
        }
        return;
    }

    let mut parts = Vec::new();
    let mut pos = 0;
    while let Some(open) = text[pos..].find("{{") {
        let open = pos + open;
        let Some(close) = text[open + 2..].find("}}") else {
            errors.push(CompilerMessage::located(
                "Unterminated interpolation: missing `}}`.",
                start + open,
                end,
            ));
            break;
        };
        let close = open + 2 + close;
        if open > pos {
            parts.push(TextPart::Static(condense(&text[pos..open])));
        }
        parts.push(TextPart::Interpolation {
            expr: text[open + 2..close].trim().to_string(),
            start: start + open,
            end: start + close + 2,
        });
        pos = close + 2;
    }
    if pos < text.len() {
        parts.push(TextPart::Static(condense(&text[pos..])));
    }
    attach(stack, roots, Node::Text(parts));
}

fn condense(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Vec<Node> {
        let mut errors = Vec::new();
        let nodes = parse(source, &mut errors);
        assert!(errors.is_empty(), "{:?}", errors);
        nodes
    }

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(element) => element,
            other => panic!("expected an element, got {other:?}"),
        }
    }

    #[test]
    fn nested_elements_and_attributes() {
        let nodes = parse_ok("<div id=\"app\" :class=\"cls\" disabled><span>a</span><br></div>");
        let div = element(&nodes[0]);
        assert_eq!(div.tag, "div");
        assert_eq!(div.attrs.len(), 3);
        assert_eq!(div.attr(":class").unwrap().value.as_deref(), Some("cls"));
        assert_eq!(div.attr("disabled").unwrap().value, None);
        assert_eq!(div.children.len(), 2);
        assert_eq!(element(&div.children[1]).tag, "br");
    }

    #[test]
    fn attribute_ranges_point_into_source() {
        let source = "<p title='x'></p>";
        let nodes = parse_ok(source);
        let attr = &element(&nodes[0]).attrs[0];
        assert_eq!(&source[attr.start..attr.end], "title='x'");
        assert_eq!(&source[attr.value_start..attr.value_start + 1], "x");
    }

    #[test]
    fn interpolations_split_text() {
        let nodes = parse_ok("<p>Hello  {{ name }}!</p>");
        let p = element(&nodes[0]);
        assert_eq!(
            p.children[0],
            Node::Text(vec![
                TextPart::Static("Hello ".to_string()),
                TextPart::Interpolation {
                    expr: "name".to_string(),
                    start: 10,
                    end: 20
                },
                TextPart::Static("!".to_string()),
            ])
        );
    }

    #[test]
    fn newline_whitespace_is_dropped() {
        let nodes = parse_ok("\n<ul>\n  <li>a</li> <li>b</li>\n</ul>\n");
        assert_eq!(nodes.len(), 1);
        let ul = element(&nodes[0]);
        assert_eq!(ul.children.len(), 3);
    }

    #[test]
    fn unclosed_and_stray_tags_are_errors() {
        let mut errors = Vec::new();
        let nodes = parse("<div><span></div></p>", &mut errors);
        assert_eq!(nodes.len(), 1);
        let messages: Vec<_> = errors.iter().map(|e| e.message().to_string()).collect();
        assert_eq!(
            messages,
            vec!["Element <span> is missing end tag.", "Invalid end tag </p>."]
        );
        assert_eq!(errors[0].start(), Some(5));
    }

    #[test]
    fn comments_are_dropped() {
        let nodes = parse_ok("<div><!-- hidden --></div>");
        assert!(element(&nodes[0]).children.is_empty());
    }
}
