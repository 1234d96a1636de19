use crate::core::document::{OnlvDocument, ATTR_PREFIX, TEXT_KEY};
use crate::error::{OnlvError, Result};
use log::debug;
use roxmltree::{Attribute, Document, Node};
use serde_json::{Map, Value};
use std::path::Path;

pub trait Parser {
    /// Parse an ONLV file and return the normalized document
    fn parse<P: AsRef<Path>>(&self, path: P) -> Result<OnlvDocument>;
}

fn read_utf8(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8(bytes)?;
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Universal parser that picks the format from the file extension
pub struct UniversalParser {
    pub xml_parser: OnlvXmlParser,
    pub json_parser: JsonParser,
}

impl Default for UniversalParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalParser {
    pub fn new() -> Self {
        Self {
            xml_parser: OnlvXmlParser,
            json_parser: JsonParser,
        }
    }

    pub fn parse<P: AsRef<Path>>(&self, path: P) -> Result<OnlvDocument> {
        let path_str = path.as_ref().to_string_lossy().to_lowercase();

        if path_str.ends_with(".onlv") || path_str.ends_with(".xml") {
            self.xml_parser.parse(path)
        } else if path_str.ends_with(".json") {
            self.json_parser.parse(path)
        } else {
            Err(OnlvError::UnsupportedFormat(path_str))
        }
    }

    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        matches!(
            path.as_ref().extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
            Some("onlv" | "xml" | "json")
        )
    }
}

/// Parses in-memory content, XML when it starts with `<`, JSON otherwise.
pub fn parse_str(content: &str) -> Result<OnlvDocument> {
    let content = content.trim_start_matches('\u{feff}');
    if content.trim_start().starts_with('<') {
        OnlvXmlParser.parse_str(content)
    } else {
        JsonParser.parse_str(content)
    }
}

/// OnlvXmlParser: maps ONLV XML onto its JSON analog using roxmltree.
pub struct OnlvXmlParser;

impl OnlvXmlParser {
    pub fn parse_str(&self, xml: &str) -> Result<OnlvDocument> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();

        let body = element_to_value(root);

        let mut top = Map::new();
        top.insert(root.tag_name().name().to_string(), body);
        debug!("Parsed XML document with root <{}>", root.tag_name().name());
        Ok(OnlvDocument::from_value(Value::Object(top)))
    }
}

impl Parser for OnlvXmlParser {
    fn parse<P: AsRef<Path>>(&self, path: P) -> Result<OnlvDocument> {
        let content = read_utf8(path.as_ref())?;
        self.parse_str(&content)
    }
}

/// Namespaces declared on `node` itself, as `@_xmlns` / `@_xmlns:prefix`.
fn declared_namespaces(node: Node, map: &mut Map<String, Value>) {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    for ns in node.namespaces() {
        if ns.name() == Some("xml") || inherited.contains(&(ns.name(), ns.uri())) {
            continue;
        }
        let key = match ns.name() {
            Some(prefix) => format!("{ATTR_PREFIX}xmlns:{prefix}"),
            None => format!("{ATTR_PREFIX}xmlns"),
        };
        map.insert(key, Value::String(ns.uri().to_string()));
    }
}

/// `@_prefix:name` for namespaced attributes like `xsi:schemaLocation`.
fn attribute_key(node: Node, attribute: &Attribute) -> String {
    match attribute.namespace().and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{ATTR_PREFIX}{prefix}:{}", attribute.name()),
        _ => format!("{ATTR_PREFIX}{}", attribute.name()),
    }
}

/// Attributes become `@_name`, text `#text`, repeated children arrays.
/// Elements with text only collapse to a string, empty ones to `""`.
fn element_to_value(node: Node) -> Value {
    let mut map = Map::new();
    declared_namespaces(node, &mut map);
    for attribute in node.attributes() {
        map.insert(attribute_key(node, &attribute), Value::String(attribute.value().to_string()));
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            let name = child.tag_name().name().to_string();
            let value = element_to_value(child);
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        }
    }

    let text = text.trim();
    if map.is_empty() {
        return Value::String(text.to_string());
    }
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
    }
    Value::Object(map)
}

/// JsonParser: documents already converted to the JSON form.
pub struct JsonParser;

impl JsonParser {
    pub fn parse_str(&self, json: &str) -> Result<OnlvDocument> {
        let value: Value = serde_json::from_str(json)?;
        Ok(OnlvDocument::from_value(value))
    }
}

impl Parser for JsonParser {
    fn parse<P: AsRef<Path>>(&self, path: P) -> Result<OnlvDocument> {
        let content = read_utf8(path.as_ref())?;
        self.parse_str(&content)
    }
}
