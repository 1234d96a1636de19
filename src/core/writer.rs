use crate::config::ExportConfig;
use crate::core::document::{scalar_to_string, OnlvDocument, ATTR_PREFIX, TEXT_KEY};
use crate::error::{OnlvError, Result};
use log::{error, info};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use regex::Regex;
use serde_json::{Map, Value};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

type XmlWriter = quick_xml::Writer<Cursor<Vec<u8>>>;

/// Writer is responsible for turning a document back into an ONLV file
pub trait Writer {
    fn write<P: AsRef<Path>>(&self, doc: &OnlvDocument, out_path: P) -> Result<()>;
}

/// OnlvXmlWriter writes schema-conformant ONLV XML
pub struct OnlvXmlWriter {
    pub config: ExportConfig,
}

impl OnlvXmlWriter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }
}

impl Writer for OnlvXmlWriter {
    fn write<P: AsRef<Path>>(&self, doc: &OnlvDocument, out_path: P) -> Result<()> {
        let xml = to_xml(doc, &self.config)?;
        write_whole(out_path.as_ref(), &xml)
    }
}

/// Writes through a sibling temp file so a failed write leaves nothing behind.
fn write_whole(path: &Path, content: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn is_transient(value: &Value, config: &ExportConfig) -> bool {
    value
        .get(&config.synthetic_id_key)
        .and_then(Value::as_str)
        .is_some_and(|id| config.is_transient_id(id))
}

/// Drops entries created in the editor and never saved, and strips the
/// synthetic ids from everything else.
fn strip_transient(value: &mut Value, config: &ExportConfig) {
    match value {
        Value::Array(items) => {
            items.retain(|item| !is_transient(item, config));
            items.iter_mut().for_each(|item| strip_transient(item, config));
        }
        Value::Object(map) => {
            map.retain(|key, child| *key != config.synthetic_id_key && !is_transient(child, config));
            map.values_mut().for_each(|child| strip_transient(child, config));
        }
        _ => {}
    }
}

fn format_decimal(value: &Value) -> Option<String> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }?;
    Some(format!("{number:.2}"))
}

fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(name)))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(name)))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(name)))?;
    }
    Ok(())
}

fn write_element(writer: &mut XmlWriter, name: &str, value: &Value, config: &ExportConfig) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item, config)?;
            }
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            for (key, child) in map {
                if let (Some(attr), Some(text)) = (key.strip_prefix(ATTR_PREFIX), scalar_to_string(child)) {
                    start.push_attribute((attr, text.as_str()));
                }
            }

            let children: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(key, _)| !key.starts_with(ATTR_PREFIX) && !key.starts_with('?'))
                .collect();
            if children.is_empty() {
                writer.write_event(Event::Empty(start))?;
                return Ok(());
            }

            writer.write_event(Event::Start(start))?;
            for (key, child) in children {
                if key == TEXT_KEY {
                    if let Some(text) = scalar_to_string(child) {
                        writer.write_event(Event::Text(BytesText::new(&text)))?;
                    }
                } else {
                    write_element(writer, key, child, config)?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Null => writer.write_event(Event::Empty(BytesStart::new(name)))?,
        scalar => {
            let text = if config.decimal_fields.iter().any(|f| f == name) {
                format_decimal(scalar).or_else(|| scalar_to_string(scalar))
            } else {
                scalar_to_string(scalar)
            };
            write_text_element(writer, name, &text.unwrap_or_default())?;
        }
    }
    Ok(())
}

/// Content of the root element, with the namespace attribute first.
fn root_body(value: &Value, config: &ExportConfig) -> Value {
    let elements: Vec<(&String, &Value)> = match value {
        Value::Object(map) => map.iter().filter(|(k, _)| !k.starts_with('?')).collect(),
        _ => Vec::new(),
    };

    let body = match (value, elements.as_slice()) {
        (_, [(key, inner)]) if **key == config.root_element => (*inner).clone(),
        (Value::Object(map), _) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('?'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        (scalar, _) => {
            let mut map = Map::new();
            if let Some(text) = scalar_to_string(scalar) {
                map.insert(TEXT_KEY.to_string(), Value::String(text));
            }
            Value::Object(map)
        }
    };

    let xmlns = format!("{ATTR_PREFIX}xmlns");
    match body {
        Value::Object(map) if !map.contains_key(&xmlns) && !config.namespace.is_empty() => {
            let mut with_ns = Map::new();
            with_ns.insert(xmlns, Value::String(config.namespace.clone()));
            with_ns.extend(map);
            Value::Object(with_ns)
        }
        other => other,
    }
}

/// Rewrites `<tag/>` and `<tag attr="x"/>` to paired tags for `tags`.
pub fn fix_paired_tags(xml: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        return xml.to_string();
    }
    let names: Vec<String> = tags.iter().map(|t| regex::escape(t)).collect();
    let pattern = format!(r"<({})((?:\s[^<>]*?)?)\s*/>", names.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(xml, "<${1}${2}></${1}>").into_owned(),
        Err(e) => {
            error!("Invalid paired tag list: {e}");
            xml.to_string()
        }
    }
}

fn ensure_declaration(mut xml: String) -> String {
    if !xml.trim_start().starts_with("<?xml") {
        xml.insert_str(0, XML_DECLARATION);
    }
    xml
}

/// Serializes `doc` to an ONLV XML string.
pub fn to_xml(doc: &OnlvDocument, config: &ExportConfig) -> Result<String> {
    let mut value = doc.to_canonical();
    strip_transient(&mut value, config);
    let body = root_body(&value, config);

    let mut writer = if config.indent > 0 {
        quick_xml::Writer::new_with_indent(Cursor::new(Vec::new()), b' ', config.indent)
    } else {
        quick_xml::Writer::new(Cursor::new(Vec::new()))
    };
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, &config.root_element, &body, config)?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(fix_paired_tags(&ensure_declaration(xml), &config.paired_tags))
}

/// Exports `doc` into `dir` under its metadata filename. Serialization runs
/// completely in memory first; any failure becomes one `Export` error and no
/// file is left behind.
pub fn export_document<P: AsRef<Path>>(doc: &OnlvDocument, dir: P, config: &ExportConfig) -> Result<PathBuf> {
    let path = dir.as_ref().join(doc.filename(&config.default_filename));

    let result = to_xml(doc, config).and_then(|xml| write_whole(&path, &xml));
    match result {
        Ok(()) => {
            info!("Exported ONLV document to {}", path.display());
            Ok(path)
        }
        Err(e) => {
            error!("Export of {} failed: {e}", path.display());
            Err(OnlvError::Export(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::attr;
    use crate::core::parser::parse_str;
    use serde_json::json;

    fn config() -> ExportConfig {
        ExportConfig::default()
    }

    #[test]
    fn empty_paragraph_is_paired() {
        let doc = OnlvDocument::from_value(json!({ "onlv": { "langtext": { "p": "" } } }));
        let xml = to_xml(&doc, &config()).unwrap();
        assert!(xml.contains("<p></p>"), "{xml}");
        assert!(!xml.contains("<p/>"));
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn paired_tags_keep_attributes() {
        let fixed = fix_paired_tags(r#"<a><p class="x"/><al/><br/></a>"#, &config().paired_tags);
        assert_eq!(fixed, r#"<a><p class="x"></p><al></al><br/></a>"#);
    }

    #[test]
    fn paired_tag_names_match_exactly() {
        let fixed = fix_paired_tags("<pos/><p/>", &["p".to_string()]);
        assert_eq!(fixed, "<pos/><p></p>");
    }

    #[test]
    fn quantities_get_two_decimals() {
        let doc = OnlvDocument::from_value(json!({ "onlv": { "pos": { "lvmenge": 12, "other": 1.5 }, "x": { "lvmenge": "3,456" } } }));
        let xml = to_xml(&doc, &config()).unwrap();
        assert!(xml.contains("<lvmenge>12.00</lvmenge>"), "{xml}");
        assert!(xml.contains("<other>1.5</other>"));
        assert!(xml.contains("<lvmenge>3.46</lvmenge>"));
    }

    #[test]
    fn attributes_text_and_namespace() {
        let doc = OnlvDocument::from_value(json!({
            "onlv": { "lg": { "@_nr": "01", "ueberschrift": { "#text": "A & B", "b": "fett" } } }
        }));
        let xml = to_xml(&doc, &config()).unwrap();
        assert!(xml.contains(r#"<onlv xmlns="http://www.oenorm.at/schema/A2063/2021-03-01">"#), "{xml}");
        assert!(xml.contains(r#"<lg nr="01">"#));
        assert!(xml.contains("A &amp; B"));
        assert!(xml.contains("<b>fett</b>"));
    }

    #[test]
    fn bare_lg_survives_reimport() {
        let doc = OnlvDocument::from_value(json!({
            "@_nr": "01",
            "ulg-liste": { "ulg": { "@_nr": "02" } }
        }));
        let xml = to_xml(&doc, &config()).unwrap();
        assert!(xml.contains(r#"<lg-liste><lg nr="01">"#), "{xml}");

        let reread = parse_str(&xml).unwrap();
        let lgs = reread.lgs();
        assert_eq!(lgs.len(), 1);
        assert_eq!(attr(lgs[0], "nr").as_deref(), Some("01"));
        assert_eq!(reread.as_value().pointer("/onlv/ausschreibungs-lv/gliederung-lg/lg-liste/lg/0/ulg-liste/ulg/0/@_nr").unwrap(), "02");
    }

    #[test]
    fn lg_array_survives_reimport() {
        let doc = OnlvDocument::from_value(json!([{ "@_nr": "01" }, { "@_nr": "02", "lg-eigenschaften": { "ueberschrift": "Putz" } }]));
        let reread = parse_str(&to_xml(&doc, &config()).unwrap()).unwrap();
        let nrs: Vec<String> = reread.lgs().into_iter().filter_map(|lg| attr(lg, "nr")).collect();
        assert_eq!(nrs, vec!["01", "02"]);
    }

    #[test]
    fn transient_entries_are_dropped() {
        let doc = OnlvDocument::from_value(json!({ "onlv": { "lg": [
            { "@_nr": "01", "_id": "lg-01" },
            { "@_nr": "02", "_id": "temp-1234" }
        ] } }));
        let xml = to_xml(&doc, &config()).unwrap();
        assert!(xml.contains(r#"nr="01""#));
        assert!(!xml.contains(r#"nr="02""#));
        assert!(!xml.contains("_id"));
    }

    #[test]
    fn export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = OnlvDocument::from_value(json!({ "onlv": { "metadaten": { "dateiname": "angebot" } } }));
        let path = export_document(&doc, dir.path(), &config()).unwrap();
        assert_eq!(path.file_name().unwrap(), "angebot.onlv");
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("<?xml"));
    }

    #[test]
    fn failed_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let result = export_document(&OnlvDocument::default(), &missing, &config());
        assert!(matches!(result, Err(OnlvError::Export(_))));
        assert!(!missing.exists());
    }
}
