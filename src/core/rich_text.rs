//! Rich text of `langtext`, `kommentar` and `vorbemerkung` blocks.
//!
//! The JSON form is `{p: [...]}` where each paragraph is a string or an object
//! with `b`/`i`/`u` spans, `br` breaks, `al` fill-in placeholders and trailing
//! `#text`. Parsing turns that into [`RichText`] nodes once, so renderers do
//! not need to know about the JSON quirks.

use quick_xml::escape::escape;
use serde::Serialize;
use serde_json::Value;

use crate::core::document::{ATTR_PREFIX, TEXT_KEY};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RichText {
    PlainText(String),
    Bold(Vec<RichText>),
    Italic(Vec<RichText>),
    Underline(Vec<RichText>),
    LineBreak,
    Placeholder(Option<String>),
}

pub type Paragraph = Vec<RichText>;

const PLACEHOLDER_BLANK: &str = "___";

fn items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub fn parse_nodes(value: &Value) -> Vec<RichText> {
    match value {
        Value::String(s) => vec![RichText::PlainText(s.clone())],
        Value::Number(n) => vec![RichText::PlainText(n.to_string())],
        Value::Array(items) => items.iter().flat_map(parse_nodes).collect(),
        Value::Object(map) => {
            let mut out = Vec::new();
            let mut span_texts = Vec::new();
            let mut trailing = None;

            for (key, child) in map {
                match key.as_str() {
                    "b" | "i" | "u" => {
                        for item in items(child) {
                            let children = parse_nodes(item);
                            span_texts.push(to_plain_text(&children).trim().to_string());
                            out.push(match key.as_str() {
                                "b" => RichText::Bold(children),
                                "i" => RichText::Italic(children),
                                _ => RichText::Underline(children),
                            });
                        }
                    }
                    "br" => {
                        let count = match child {
                            Value::Array(breaks) => breaks.len().max(1),
                            _ => 1,
                        };
                        out.extend(std::iter::repeat(RichText::LineBreak).take(count));
                    }
                    "al" if child.is_null() => out.push(RichText::Placeholder(None)),
                    "al" => out.extend(items(child).into_iter().map(parse_placeholder)),
                    k if k == TEXT_KEY => trailing = Some(child),
                    k if k.starts_with(ATTR_PREFIX) => {}
                    _ => out.extend(parse_nodes(child)),
                }
            }

            if let Some(text) = trailing.and_then(|t| match t {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }) {
                // #text repeating a span's content is rendered once
                if !span_texts.iter().any(|s| s == text.trim()) {
                    out.push(RichText::PlainText(text));
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

fn parse_placeholder(value: &Value) -> RichText {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => to_plain_text(&parse_nodes(value)).trim().to_string(),
        _ => String::new(),
    };
    RichText::Placeholder((!text.is_empty()).then_some(text))
}

/// Paragraphs of a `langtext`-like block.
pub fn parse_paragraphs(block: &Value) -> Vec<Paragraph> {
    match block {
        Value::Object(map) if map.contains_key("p") => map
            .get("p")
            .map(|p| items(p).into_iter().map(parse_nodes).collect())
            .unwrap_or_default(),
        Value::Array(blocks) => blocks.iter().flat_map(parse_paragraphs).collect(),
        Value::Null => Vec::new(),
        other => vec![parse_nodes(other)],
    }
}

fn push_piece(out: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    let needs_space = !out.is_empty()
        && !out.ends_with(char::is_whitespace)
        && !piece.starts_with(char::is_whitespace);
    if needs_space {
        out.push(' ');
    }
    out.push_str(piece);
}

pub fn to_plain_text(nodes: &[RichText]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            RichText::PlainText(s) => push_piece(&mut out, s),
            RichText::Bold(children) | RichText::Italic(children) | RichText::Underline(children) => {
                push_piece(&mut out, &to_plain_text(children))
            }
            RichText::LineBreak => out.push('\n'),
            RichText::Placeholder(text) => {
                push_piece(&mut out, text.as_deref().unwrap_or(PLACEHOLDER_BLANK))
            }
        }
    }
    out
}

pub fn to_html(nodes: &[RichText]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            RichText::PlainText(s) => out.push_str(&escape(s.as_str())),
            RichText::Bold(children) => out.push_str(&format!("<b>{}</b>", to_html(children))),
            RichText::Italic(children) => out.push_str(&format!("<i>{}</i>", to_html(children))),
            RichText::Underline(children) => out.push_str(&format!("<u>{}</u>", to_html(children))),
            RichText::LineBreak => out.push_str("<br/>"),
            RichText::Placeholder(text) => out.push_str(&format!(
                "<span class=\"al\">{}</span>",
                escape(text.as_deref().unwrap_or(PLACEHOLDER_BLANK))
            )),
        }
    }
    out
}

/// Plain text of a whole block, one line per paragraph.
pub fn block_plain_text(block: &Value) -> String {
    parse_paragraphs(block)
        .iter()
        .map(|p| to_plain_text(p).trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn block_html(block: &Value) -> String {
    parse_paragraphs(block)
        .iter()
        .map(|p| format!("<p>{}</p>", to_html(p)))
        .collect()
}
