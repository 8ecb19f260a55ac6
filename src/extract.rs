//! DOM snapshot to markdown conversion.
//!
//! Works over the serialized [`DocNode`] trees reported by the in-page
//! `snapshot` helper. Two entry points: [`extract_text`] flattens a
//! subtree to clean prose while converting the inline markup every chat
//! app shares (code, bold, links, tables), and [`extract_structured`]
//! additionally reconstructs headings, lists, and quotes for
//! markdown-rendered assistant messages. Page chrome such as copy
//! buttons and citation badges never reaches the output.

use crate::types::DocNode;

/// Below this length a structured pass is assumed to have missed the
/// actual content, and the flat pass runs instead.
const STRUCTURED_FALLBACK_LEN: usize = 50;

/// Flatten a subtree to normalized text with inline markdown.
pub fn extract_text(node: &DocNode) -> String {
    let mut out = String::new();
    render_node(node, &mut out);
    tidy(&out)
}

/// Rebuild markdown block structure from a subtree.
///
/// Recognizes headings, paragraphs, lists, code fences, quotes, and
/// tables. Content that never sits inside a recognized block (plain
/// spans, bare text) is invisible to this pass, so suspiciously short
/// results fall back to [`extract_text`].
pub fn extract_structured(node: &DocNode) -> String {
    let mut out = String::new();
    walk_blocks(node, &mut out);
    let text = tidy(&out);
    if text.chars().count() < STRUCTURED_FALLBACK_LEN {
        return extract_text(node);
    }
    text
}

fn is_chrome_tag(tag: &str) -> bool {
    matches!(
        tag,
        "script" | "style" | "button" | "svg" | "noscript" | "template"
    )
}

fn is_citation(node: &DocNode) -> bool {
    node.class_contains("citation")
        || node
            .attr("data-testid")
            .is_some_and(|value| value.contains("citation"))
}

/// Tags rendered with a blank line on both sides.
const PARAGRAPH_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "blockquote",
];

/// Tags that only force a line break.
const LINE_TAGS: &[&str] = &[
    "div", "section", "article", "header", "footer", "main", "li", "tr",
];

fn render_node(node: &DocNode, out: &mut String) {
    match node {
        DocNode::Text { text } => out.push_str(&text.replace('\u{a0}', " ")),
        DocNode::Element { .. } => render_element(node, out),
    }
}

fn render_element(node: &DocNode, out: &mut String) {
    let Some(tag) = node.tag() else { return };
    if is_chrome_tag(tag) || is_citation(node) {
        return;
    }
    match tag {
        "table" => {
            let rendered = table_markdown(node);
            if !rendered.is_empty() {
                ensure_blank_line(out);
                out.push_str(&rendered);
                ensure_blank_line(out);
            }
        }
        "pre" => {
            ensure_blank_line(out);
            out.push_str(&fenced_code(node));
            ensure_blank_line(out);
        }
        "code" => {
            let body = node.raw_text();
            if !body.trim().is_empty() {
                out.push('`');
                out.push_str(body.trim());
                out.push('`');
            }
        }
        "strong" | "b" => wrap_inline(node, "**", out),
        "em" | "i" => wrap_inline(node, "*", out),
        "a" => render_link(node, out),
        "br" => out.push('\n'),
        _ if PARAGRAPH_TAGS.contains(&tag) => {
            ensure_blank_line(out);
            render_children(node, out);
            ensure_blank_line(out);
        }
        _ if LINE_TAGS.contains(&tag) => {
            ensure_break(out);
            render_children(node, out);
            ensure_break(out);
        }
        _ => render_children(node, out),
    }
}

fn render_children(node: &DocNode, out: &mut String) {
    for child in node.children() {
        render_node(child, out);
    }
}

fn wrap_inline(node: &DocNode, marker: &str, out: &mut String) {
    let mut inner = String::new();
    render_children(node, &mut inner);
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return;
    }
    out.push_str(marker);
    out.push_str(trimmed);
    out.push_str(marker);
}

fn render_link(node: &DocNode, out: &mut String) {
    let mut label = String::new();
    render_children(node, &mut label);
    let label = label.trim();
    let href = node.attr("href").unwrap_or_default();
    // In-page fragment anchors carry no information outside the page.
    if href.is_empty() || href.starts_with('#') {
        out.push_str(label);
        return;
    }
    if label.is_empty() {
        return;
    }
    out.push('[');
    out.push_str(label);
    out.push_str("](");
    out.push_str(href);
    out.push(')');
}

fn fenced_code(pre: &DocNode) -> String {
    // Code block headers (language chip, copy button) sit inside the
    // pre but outside the code element, so only the code body counts.
    let code = pre
        .find_first(&|n| n.tag() == Some("code"))
        .unwrap_or(pre);
    let mut body = code.raw_text();
    while body.ends_with('\n') {
        body.pop();
    }
    let lang = language_of(pre).unwrap_or_default();
    if body.is_empty() {
        format!("```{lang}\n```")
    } else {
        format!("```{lang}\n{body}\n```")
    }
}

fn language_of(pre: &DocNode) -> Option<String> {
    let marked = pre.find_first(&|n| {
        n.attr("class")
            .is_some_and(|classes| classes.contains("language-"))
    })?;
    marked
        .attr("class")?
        .split_whitespace()
        .find_map(|token| token.strip_prefix("language-"))
        .map(str::to_string)
}

fn table_markdown(table: &DocNode) -> String {
    let rows = table.find_all(&|n| n.tag() == Some("tr"));
    if rows.is_empty() {
        return String::new();
    }

    let render_row = |row: &DocNode| -> Vec<String> {
        row.children()
            .iter()
            .filter(|cell| matches!(cell.tag(), Some("th") | Some("td")))
            .map(|cell| {
                let mut inner = String::new();
                render_node(cell, &mut inner);
                flatten_ws(&inner)
            })
            .collect()
    };

    let header = render_row(rows[0]);
    if header.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; header.len()].join(" | ")));
    for row in &rows[1..] {
        let cells = render_row(row);
        if !cells.is_empty() {
            lines.push(format!("| {} |", cells.join(" | ")));
        }
    }
    lines.join("\n")
}

fn walk_blocks(node: &DocNode, out: &mut String) {
    let Some(tag) = node.tag() else { return };
    if is_chrome_tag(tag) || is_citation(node) {
        return;
    }
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = usize::from(tag.as_bytes()[1] - b'0');
            let mut inner = String::new();
            render_children(node, &mut inner);
            let text = flatten_ws(&inner);
            if !text.is_empty() {
                ensure_blank_line(out);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                out.push_str(&text);
                ensure_blank_line(out);
            }
        }
        "p" => {
            let mut inner = String::new();
            render_children(node, &mut inner);
            let trimmed = inner.trim();
            if !trimmed.is_empty() {
                ensure_blank_line(out);
                out.push_str(trimmed);
                ensure_blank_line(out);
            }
        }
        "ul" => render_list(node, 0, false, out),
        "ol" => render_list(node, 0, true, out),
        "pre" => {
            ensure_blank_line(out);
            out.push_str(&fenced_code(node));
            ensure_blank_line(out);
        }
        "table" => {
            let rendered = table_markdown(node);
            if !rendered.is_empty() {
                ensure_blank_line(out);
                out.push_str(&rendered);
                ensure_blank_line(out);
            }
        }
        "blockquote" => {
            let mut inner = String::new();
            render_children(node, &mut inner);
            let inner = tidy(&inner);
            if !inner.is_empty() {
                ensure_blank_line(out);
                for line in inner.lines() {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
                ensure_blank_line(out);
            }
        }
        _ => {
            for child in node.children() {
                walk_blocks(child, out);
            }
        }
    }
}

fn render_list(list: &DocNode, depth: usize, ordered: bool, out: &mut String) {
    if depth == 0 {
        ensure_blank_line(out);
    }
    let mut ordinal = 0usize;
    for item in list.children() {
        if item.tag() != Some("li") {
            continue;
        }
        ordinal += 1;

        let mut label = String::new();
        for part in item.children() {
            match part.tag() {
                Some("ul") | Some("ol") => {}
                _ => render_node(part, &mut label),
            }
        }
        let label = flatten_ws(&label);
        if !label.is_empty() {
            ensure_break(out);
            out.push_str(&"  ".repeat(depth));
            if ordered {
                out.push_str(&format!("{ordinal}. "));
            } else {
                out.push_str("- ");
            }
            out.push_str(&label);
            out.push('\n');
        }

        for part in item.children() {
            match part.tag() {
                Some("ul") => render_list(part, depth + 1, false, out),
                Some("ol") => render_list(part, depth + 1, true, out),
                _ => {}
            }
        }
    }
    if depth == 0 {
        ensure_blank_line(out);
    }
}

fn ensure_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Collapse all whitespace runs to single spaces, newlines included.
fn flatten_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip trailing whitespace per line and collapse blank-line runs.
fn tidy(text: &str) -> String {
    let mut out = String::new();
    let mut pending_blank = false;
    let mut started = false;
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            if started {
                pending_blank = true;
            }
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        if started {
            out.push('\n');
        }
        out.push_str(line);
        started = true;
    }
    out
}
