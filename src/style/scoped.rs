//! Scoped selector rewriting.
//!
//! Every selector gets `[scope-id]` on its last compound, before any
//! pseudo-class or pseudo-element. `:deep(x)`, `::v-deep` and `>>>` stop
//! scoping at the point they appear, `:global(x)` opts out. Rules inside
//! `@media`/`@supports`/`@container`/`@layer` are rewritten, other at-rules
//! (`@keyframes`, `@font-face`, ...) are copied untouched.

const NESTED_AT_RULES: &[&str] = &["media", "supports", "container", "layer", "document"];

/// Rewrite every selector of `css` for `scope_id` (`data-v-…`).
pub fn scope_css(css: &str, scope_id: &str) -> String {
    let attr = format!("[{}]", scope_id);
    let mut out = String::with_capacity(css.len() + css.len() / 4);
    scope_rules(css, &attr, &mut out);
    out
}

fn scope_rules(css: &str, attr: &str, out: &mut String) {
    let mut rest = css;
    loop {
        rest = skip_trivia(rest);
        if rest.is_empty() {
            return;
        }
        let Some((prelude, delimiter, after)) = split_prelude(rest) else {
            out.push_str(rest.trim());
            return;
        };
        let prelude = prelude.trim();
        if delimiter == ';' {
            out.push_str(prelude);
            out.push_str(";\n");
            rest = after;
            continue;
        }
        let (body, after_body) = match find_block_end(after) {
            Some(end) => (&after[..end], &after[end + 1..]),
            None => (after, ""),
        };

        if let Some(at_rule) = prelude.strip_prefix('@') {
            let name = at_rule
                .split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            out.push_str(prelude);
            out.push_str(" {\n");
            if NESTED_AT_RULES.contains(&name.as_str()) {
                scope_rules(body, attr, out);
            } else {
                out.push_str(body.trim());
                out.push('\n');
            }
            out.push_str("}\n");
        } else {
            out.push_str(&scope_selector_list(prelude, attr));
            out.push_str(" {");
            out.push_str(body);
            out.push_str("}\n");
        }
        rest = after_body;
    }
}

fn skip_trivia(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        match text.strip_prefix("/*") {
            Some(comment) => {
                text = comment.find("*/").map_or("", |end| &comment[end + 2..]);
            }
            None => return text,
        }
    }
}

/// Split at the first `{` or `;` outside strings and parentheses.
fn split_prelude(text: &str) -> Option<(&str, char, &str)> {
    let mut depth = 0usize;
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, '{' | ';') if depth == 0 => return Some((&text[..i], c, &text[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Offset of the `}` closing a block whose `{` was just consumed.
fn find_block_end(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote = None;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == b'\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = text[i + 2..].find("*/").map_or(bytes.len(), |e| i + 2 + e + 1);
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split on commas at parenthesis depth zero.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn scope_selector_list(selectors: &str, attr: &str) -> String {
    split_top_level(selectors, ',')
        .into_iter()
        .map(|selector| scope_selector(selector.trim(), attr))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scope_selector(selector: &str, attr: &str) -> String {
    if let Some(pos) = selector.find(":global(") {
        return match matching_paren(&selector[pos + 8..]) {
            Some(end) => format!(
                "{}{}{}",
                &selector[..pos],
                &selector[pos + 8..pos + 8 + end],
                &selector[pos + 9 + end..]
            ),
            None => selector.to_string(),
        };
    }
    if let Some(pos) = selector.find(":deep(") {
        let inner_start = pos + 6;
        return match matching_paren(&selector[inner_start..]) {
            Some(end) => {
                let inner = &selector[inner_start..inner_start + end];
                let rest = &selector[inner_start + end + 1..];
                format!("{} {}{}", scope_prefix(&selector[..pos], attr), inner, rest)
            }
            None => selector.to_string(),
        };
    }
    for marker in ["::v-deep", ">>>", "/deep/"] {
        if let Some(pos) = selector.find(marker) {
            let rest = selector[pos + marker.len()..].trim_start();
            return format!("{} {}", scope_prefix(&selector[..pos], attr), rest)
                .trim_end()
                .to_string();
        }
    }
    add_to_last_compound(selector, attr)
}

/// Scoped form of the selector part before a deep combinator.
fn scope_prefix(prefix: &str, attr: &str) -> String {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        attr.to_string()
    } else {
        add_to_last_compound(prefix, attr)
    }
}

fn add_to_last_compound(selector: &str, attr: &str) -> String {
    let compound_start = last_compound_start(selector);
    let compound = &selector[compound_start..];
    let insert_at = compound_start + pseudo_start(compound).unwrap_or(compound.len());
    let mut out = String::with_capacity(selector.len() + attr.len());
    out.push_str(&selector[..insert_at]);
    out.push_str(attr);
    out.push_str(&selector[insert_at..]);
    out
}

/// Start of the last compound selector: after the last combinator or space
/// outside brackets and parentheses.
fn last_compound_start(selector: &str) -> usize {
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            c if depth == 0 && (c.is_whitespace() || matches!(c, '>' | '+' | '~')) => {
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    start
}

/// Offset of the first unescaped `:` outside brackets.
fn pseudo_start(compound: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut previous = None;
    for (i, c) in compound.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && previous != Some('\\') => return Some(i),
            _ => {}
        }
        previous = Some(c);
    }
    None
}

fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ID: &str = "data-v-1";

    fn sel(selector: &str) -> String {
        scope_selector_list(selector, "[data-v-1]")
    }

    #[test]
    fn scopes_the_last_compound() {
        assert_eq!(sel(".a"), ".a[data-v-1]");
        assert_eq!(sel(".a .b"), ".a .b[data-v-1]");
        assert_eq!(sel(".a > .b"), ".a > .b[data-v-1]");
        assert_eq!(sel("h1, h2"), "h1[data-v-1], h2[data-v-1]");
    }

    #[test]
    fn pseudo_selectors_stay_last() {
        assert_eq!(sel(".a:hover"), ".a[data-v-1]:hover");
        assert_eq!(sel("p::before"), "p[data-v-1]::before");
        assert_eq!(sel("li:not(.x)"), "li[data-v-1]:not(.x)");
        assert_eq!(sel(":focus"), "[data-v-1]:focus");
    }

    #[test]
    fn attribute_selectors_are_one_compound() {
        assert_eq!(sel("a[title=\"a b\"]"), "a[title=\"a b\"][data-v-1]");
    }

    #[test]
    fn deep_and_global() {
        assert_eq!(sel(".a :deep(.b)"), ".a[data-v-1] .b");
        assert_eq!(sel(":deep(.b)"), "[data-v-1] .b");
        assert_eq!(sel(".a ::v-deep .b"), ".a[data-v-1] .b");
        assert_eq!(sel(".a >>> .b"), ".a[data-v-1] .b");
        assert_eq!(sel(":global(.x) .y"), ".x .y");
    }

    #[test]
    fn recurses_into_media_but_not_keyframes() {
        let css = "@media (min-width: 1px) { .a { color: red } }\n\
                   @keyframes spin { from { opacity: 0 } to { opacity: 1 } }";
        let out = scope_css(css, ID);
        assert!(out.contains(".a[data-v-1] { color: red }"), "{out}");
        assert!(out.contains("from { opacity: 0 }"), "{out}");
        assert!(!out.contains("from[data-v-1]"), "{out}");
    }

    #[test]
    fn comments_and_statements_survive() {
        let out = scope_css("/* c */ @import \"x.css\";\n.a { content: \"}\" }", ID);
        assert_eq!(out, "@import \"x.css\";\n.a[data-v-1] { content: \"}\" }\n");
    }
}
