//! In-memory ONLV document.
//!
//! The document is kept as the JSON analog of the XML schema: attributes are
//! keys prefixed with [`ATTR_PREFIX`], text content lives under [`TEXT_KEY`]
//! and repeated children are arrays. Engines never mutate a document in place;
//! they clone it, transform the clone and hand back a replacement.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::ONLV_NAMESPACE;

pub const ATTR_PREFIX: &str = "@_";
pub const TEXT_KEY: &str = "#text";

/// Keys whose value is a list even when the source holds a single object.
pub const LIST_KEYS: &[&str] = &["lg", "ulg", "grundtextnr", "folgeposition", "ungeteilteposition", "p"];

pub const LG_LIST_PATH: &[&str] = &["onlv", "ausschreibungs-lv", "gliederung-lg", "lg-liste"];
pub const ULG_LIST: &[&str] = &["ulg-liste", "ulg"];
pub const GRUNDTEXT_LIST: &[&str] = &["positionen", "grundtextnr"];
pub const FOLGEPOSITION_LIST: &[&str] = &["folgeposition"];
pub const UNGETEILTE_LIST: &[&str] = &["ungeteilteposition"];

/// Attribute value as a string; numeric attributes are stringified.
pub fn attr(value: &Value, name: &str) -> Option<String> {
    value
        .get(format!("{ATTR_PREFIX}{name}"))
        .and_then(scalar_to_string)
}

pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tolerant list view: arrays as-is, a bare object as a list of one.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

/// Follows `path` from `value` and returns the list found at its end.
pub fn child_list<'a>(value: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    let mut current = value;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    as_list(current)
}

/// Mutable list at the end of `path`. A singleton object found there is
/// turned into a one-element array; missing containers are created only when
/// `create` is set.
pub fn child_list_mut<'a>(value: &'a mut Value, path: &[&str], create: bool) -> Option<&'a mut Vec<Value>> {
    let (last, parents) = path.split_last()?;
    let mut current = value;
    for key in parents {
        let map = current.as_object_mut()?;
        if !map.contains_key(*key) {
            if !create {
                return None;
            }
            map.insert(key.to_string(), Value::Object(Map::new()));
        }
        current = map.get_mut(*key)?;
        if !current.is_object() {
            if !create {
                return None;
            }
            *current = Value::Object(Map::new());
        }
    }

    let map = current.as_object_mut()?;
    let is_array = map.get(*last).is_some_and(Value::is_array);
    let is_object = map.get(*last).is_some_and(Value::is_object);
    if is_object {
        if let Some(slot) = map.get_mut(*last) {
            let single = slot.take();
            *slot = Value::Array(vec![single]);
        }
    } else if !is_array {
        if !create {
            return None;
        }
        map.insert(last.to_string(), Value::Array(Vec::new()));
    }
    map.get_mut(*last).and_then(Value::as_array_mut)
}

/// First element in `list` whose attribute `key` equals `nr`.
pub fn find_by_attr_mut<'a>(list: &'a mut [Value], key: &str, nr: &str) -> Option<&'a mut Value> {
    list.iter_mut().find(|item| attr(item, key).as_deref() == Some(nr))
}

pub fn find_by_attr<'a>(list: &[&'a Value], key: &str, nr: &str) -> Option<&'a Value> {
    list.iter().copied().find(|item| attr(item, key).as_deref() == Some(nr))
}

/// Coerces every [`LIST_KEYS`] entry holding a bare object into an array.
pub fn normalize_lists(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if LIST_KEYS.contains(&key.as_str()) && !child.is_array() && !child.is_null() {
                    let single = child.take();
                    *child = Value::Array(vec![single]);
                }
                normalize_lists(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_lists),
        _ => {}
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LgLocation {
    Path(Vec<String>),
    RootArray,
    RootLg,
    Missing,
}

fn looks_like_lg(value: &Value) -> bool {
    value.get("ulg-liste").is_some() || value.get("lg-eigenschaften").is_some()
}

fn find_key_path(value: &Value, key: &str, path: &mut Vec<String>) -> bool {
    if let Value::Object(map) = value {
        if map.contains_key(key) {
            return true;
        }
        for (name, child) in map {
            if name.starts_with(ATTR_PREFIX) {
                continue;
            }
            path.push(name.clone());
            if find_key_path(child, key, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}

/// Metadata used to fill a fresh document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkeletonInfo {
    pub dateiname: Option<String>,
    pub lvcode: Option<String>,
    pub vorhaben: Option<String>,
    pub lvbezeichnung: Option<String>,
    pub auftraggeber: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OnlvDocument {
    root: Value,
}

impl Default for OnlvDocument {
    fn default() -> Self {
        Self { root: Value::Object(Map::new()) }
    }
}

impl OnlvDocument {
    pub fn from_value(mut root: Value) -> Self {
        normalize_lists(&mut root);
        Self { root }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    fn lg_location(&self) -> LgLocation {
        let canonical: Vec<String> = LG_LIST_PATH.iter().map(|s| s.to_string()).collect();
        if child_exists(&self.root, LG_LIST_PATH) {
            return LgLocation::Path(canonical);
        }

        let mut path = Vec::new();
        if find_key_path(&self.root, "lg-liste", &mut path) {
            path.push("lg-liste".to_string());
            return LgLocation::Path(path);
        }

        match &self.root {
            Value::Array(_) => LgLocation::RootArray,
            value if looks_like_lg(value) => LgLocation::RootLg,
            _ => LgLocation::Missing,
        }
    }

    /// The document with its LGs at the canonical path. Bare LG and bare LG
    /// array documents are wrapped, anything else is returned unchanged.
    pub fn to_canonical(&self) -> Value {
        match self.lg_location() {
            LgLocation::RootArray | LgLocation::RootLg => {
                let lgs: Vec<Value> = self.lgs().into_iter().cloned().collect();
                json!({
                    "onlv": { "ausschreibungs-lv": { "gliederung-lg": { "lg-liste": { "lg": lgs } } } }
                })
            }
            _ => self.root.clone(),
        }
    }

    /// All LGs of the document in source order.
    pub fn lgs(&self) -> Vec<&Value> {
        match self.lg_location() {
            LgLocation::Path(path) => {
                let keys: Vec<&str> = path.iter().map(String::as_str).chain(["lg"]).collect();
                child_list(&self.root, &keys)
            }
            LgLocation::RootArray => as_list(&self.root),
            LgLocation::RootLg => vec![&self.root],
            LgLocation::Missing => Vec::new(),
        }
    }

    /// Mutable LG list, created at the canonical path when the document has
    /// none yet. A document that is a single bare LG has no list.
    pub fn lgs_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self.lg_location() {
            LgLocation::Path(path) => {
                let keys: Vec<&str> = path.iter().map(String::as_str).chain(["lg"]).collect();
                child_list_mut(&mut self.root, &keys, true)
            }
            LgLocation::RootArray => self.root.as_array_mut(),
            LgLocation::RootLg => None,
            LgLocation::Missing => {
                if !self.root.is_object() {
                    self.root = Value::Object(Map::new());
                }
                let keys: Vec<&str> = LG_LIST_PATH.iter().copied().chain(["lg"]).collect();
                debug!("Creating LG list at canonical path");
                child_list_mut(&mut self.root, &keys, true)
            }
        }
    }

    /// LG with the given number, also when the document is a single bare LG.
    pub fn find_lg_mut(&mut self, nr: &str) -> Option<&mut Value> {
        if self.lg_location() == LgLocation::RootLg {
            return if attr(&self.root, "nr").as_deref() == Some(nr) {
                Some(&mut self.root)
            } else {
                None
            };
        }
        let lgs = self.lgs_mut()?;
        find_by_attr_mut(lgs, "nr", nr)
    }

    /// Export filename from `onlv/metadaten/dateiname`, always ending in `.onlv`.
    pub fn filename(&self, default: &str) -> String {
        let name = self
            .root
            .pointer("/onlv/metadaten/dateiname")
            .and_then(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string());

        if name.to_lowercase().ends_with(".onlv") {
            name
        } else {
            let stem = name.strip_suffix(".xml").unwrap_or(&name);
            format!("{stem}.onlv")
        }
    }

    pub fn skeleton(info: SkeletonInfo) -> Self {
        Self::skeleton_at(info, Utc::now())
    }

    pub fn skeleton_at(info: SkeletonInfo, now: DateTime<Utc>) -> Self {
        let today = now.format("%Y-%m-%d").to_string();
        let root = json!({
            "onlv": {
                "@_xmlns": ONLV_NAMESPACE,
                "metadaten": {
                    "dateiname": info.dateiname.unwrap_or_else(|| "Generated Onlv".to_string()),
                    "erstelltam": now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    "programmsystem": "onlv_rs",
                },
                "ausschreibungs-lv": {
                    "kenndaten": {
                        "lvcode": info.lvcode.unwrap_or_default(),
                        "vorhaben": info.vorhaben.unwrap_or_default(),
                        "lvbezeichnung": info
                            .lvbezeichnung
                            .filter(|s| !s.is_empty())
                            .unwrap_or_else(|| "Trockenbauarbeiten".to_string()),
                        "auftraggeber": {
                            "firma": { "name": info.auftraggeber.unwrap_or_default() }
                        },
                        "bearbeitungsstand": today,
                        "preisbasis": today,
                        "waehrung": "EUR",
                    },
                    "gliederung-lg": {
                        "lg-liste": { "lg": [] }
                    }
                }
            }
        });
        Self { root }
    }
}

fn child_exists(value: &Value, path: &[&str]) -> bool {
    let mut current = value;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn singleton_lists_become_arrays() {
        let doc = OnlvDocument::from_value(json!({
            "@_nr": "01",
            "ulg-liste": { "ulg": { "@_nr": "02", "positionen": { "grundtextnr": { "@_nr": "03" } } } }
        }));
        let ulgs = doc.as_value().pointer("/ulg-liste/ulg").unwrap();
        assert!(ulgs.is_array());
        assert!(doc.as_value().pointer("/ulg-liste/ulg/0/positionen/grundtextnr").unwrap().is_array());
    }

    #[test]
    fn attr_stringifies_numbers() {
        let value = json!({ "@_nr": 7, "@_ftnr": "B" });
        assert_eq!(attr(&value, "nr").as_deref(), Some("7"));
        assert_eq!(attr(&value, "ftnr").as_deref(), Some("B"));
        assert_eq!(attr(&value, "mfv"), None);
    }

    #[test]
    fn lgs_found_at_canonical_path_and_in_bare_lg() {
        let mut doc = OnlvDocument::skeleton(SkeletonInfo::default());
        assert!(doc.lgs().is_empty());
        doc.lgs_mut().unwrap().push(json!({ "@_nr": "01" }));
        assert_eq!(doc.lgs().len(), 1);

        let bare = OnlvDocument::from_value(json!({ "@_nr": "05", "ulg-liste": {} }));
        assert_eq!(bare.lgs().len(), 1);
    }

    #[test]
    fn bare_shapes_move_to_canonical_path() {
        let bare = OnlvDocument::from_value(json!({ "@_nr": "05", "ulg-liste": {} }));
        let canonical = bare.to_canonical();
        assert_eq!(canonical.pointer("/onlv/ausschreibungs-lv/gliederung-lg/lg-liste/lg/0/@_nr").unwrap(), "05");

        let list = OnlvDocument::from_value(json!([{ "@_nr": "01" }, { "@_nr": "02" }]));
        assert_eq!(OnlvDocument::from_value(list.to_canonical()).lgs().len(), 2);

        let full = OnlvDocument::skeleton(SkeletonInfo::default());
        assert_eq!(&full.to_canonical(), full.as_value());
    }

    #[test]
    fn lgs_found_under_non_canonical_lg_liste() {
        let doc = OnlvDocument::from_value(json!({
            "export": { "lg-liste": { "lg": [{ "@_nr": "01" }, { "@_nr": "02" }] } }
        }));
        assert_eq!(doc.lgs().len(), 2);
    }

    #[test]
    fn lgs_mut_creates_list_in_empty_document() {
        let mut doc = OnlvDocument::default();
        doc.lgs_mut().unwrap().push(json!({ "@_nr": "01" }));
        assert!(doc.as_value().pointer("/onlv/ausschreibungs-lv/gliederung-lg/lg-liste/lg/0").is_some());
    }

    #[test]
    fn filename_enforces_onlv_extension() {
        let doc = OnlvDocument::from_value(json!({ "onlv": { "metadaten": { "dateiname": "angebot.xml" } } }));
        assert_eq!(doc.filename("exported_onlv.onlv"), "angebot.onlv");
        assert_eq!(OnlvDocument::default().filename("exported_onlv.onlv"), "exported_onlv.onlv");
    }

    #[test]
    fn skeleton_sets_dates_and_defaults() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 10, 20, 30).unwrap();
        let doc = OnlvDocument::skeleton_at(SkeletonInfo::default(), now);
        let v = doc.as_value();
        assert_eq!(v.pointer("/onlv/metadaten/erstelltam").unwrap(), "2025-03-04T10:20:30Z");
        assert_eq!(v.pointer("/onlv/metadaten/dateiname").unwrap(), "Generated Onlv");
        assert_eq!(v.pointer("/onlv/ausschreibungs-lv/kenndaten/preisbasis").unwrap(), "2025-03-04");
        assert_eq!(
            v.pointer("/onlv/ausschreibungs-lv/kenndaten/lvbezeichnung").unwrap(),
            "Trockenbauarbeiten"
        );
    }

    #[test]
    fn child_list_mut_respects_create_flag() {
        let mut value = json!({ "@_nr": "03" });
        assert!(child_list_mut(&mut value, FOLGEPOSITION_LIST, false).is_none());
        child_list_mut(&mut value, FOLGEPOSITION_LIST, true).unwrap().push(json!({ "@_ftnr": "A" }));
        assert_eq!(child_list(&value, FOLGEPOSITION_LIST).len(), 1);
    }
}
