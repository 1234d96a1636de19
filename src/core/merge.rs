//! Key-matched merge of sibling collections.
//!
//! Items match when their key attribute (`@_nr`, or `@_ftnr` for
//! Folgepositionen) is equal as a string. Matched items take the new scalar
//! and attribute values and have their nested collections merged the same
//! way; unmatched items are appended. The result is always re-sorted by key.

use std::cmp::Ordering;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::document::{
    attr, child_list, child_list_mut, find_by_attr_mut, OnlvDocument, FOLGEPOSITION_LIST, GRUNDTEXT_LIST, ULG_LIST,
    UNGETEILTE_LIST,
};
use crate::core::numbering::leading_number;
use crate::error::{OnlvError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Lg,
    Ulg,
    Grundtextnr,
    Folgeposition,
    Ungeteilteposition,
}

impl Collection {
    pub fn key_attr(&self) -> &'static str {
        match self {
            Collection::Folgeposition => "ftnr",
            _ => "nr",
        }
    }

    /// Child collections held by an item of this collection.
    fn nested(&self) -> &'static [(&'static [&'static str], Collection)] {
        match self {
            Collection::Lg => &[(ULG_LIST, Collection::Ulg)],
            Collection::Ulg => &[(GRUNDTEXT_LIST, Collection::Grundtextnr)],
            Collection::Grundtextnr => &[
                (FOLGEPOSITION_LIST, Collection::Folgeposition),
                (UNGETEILTE_LIST, Collection::Ungeteilteposition),
            ],
            Collection::Folgeposition | Collection::Ungeteilteposition => &[],
        }
    }
}

fn compare_keys(a: Option<&str>, b: Option<&str>) -> Ordering {
    fn rank(key: Option<&str>) -> (u8, u32, &str) {
        match key {
            Some(k) => match leading_number(k) {
                Some(n) => (0, n, k),
                None => (1, 0, k),
            },
            None => (2, 0, ""),
        }
    }
    rank(a).cmp(&rank(b))
}

/// Merges `new_items` into a copy of `target`.
pub fn merge(target: &[Value], new_items: &[Value], collection: Collection) -> Vec<Value> {
    let key_attr = collection.key_attr();
    let mut out = target.to_vec();

    for item in new_items {
        match attr(item, key_attr) {
            Some(key) => match find_by_attr_mut(&mut out, key_attr, &key) {
                Some(existing) => merge_item(existing, item, collection),
                None => out.push(item.clone()),
            },
            None => {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
        }
    }

    let mut keyed: Vec<(Option<String>, Value)> = out.into_iter().map(|v| (attr(&v, key_attr), v)).collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a.as_deref(), b.as_deref()));
    keyed.into_iter().map(|(_, v)| v).collect()
}

fn merge_item(existing: &mut Value, new: &Value, collection: Collection) {
    let (Some(src), true) = (new.as_object(), existing.is_object()) else {
        *existing = new.clone();
        return;
    };
    let nested = collection.nested();

    if let Some(dst) = existing.as_object_mut() {
        for (key, value) in src {
            if nested.iter().any(|(path, _)| path[0] == key.as_str()) {
                continue;
            }
            dst.insert(key.clone(), value.clone());
        }
    }

    for &(path, child) in nested {
        let incoming: Vec<Value> = child_list(new, path).into_iter().cloned().collect();
        if incoming.is_empty() {
            continue;
        }

        // fields next to the list inside a wrapper like `ulg-liste`
        if let [wrapper, list_key] = path {
            let fields = new.get(*wrapper).and_then(Value::as_object);
            if let (Some(fields), Some(dst)) = (fields, existing.as_object_mut()) {
                let slot = dst.entry(wrapper.to_string()).or_insert_with(|| json!({}));
                if let Some(slot) = slot.as_object_mut() {
                    for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != *list_key) {
                        slot.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        if let Some(list) = child_list_mut(existing, path, true) {
            let merged = merge(list, &incoming, child);
            *list = merged;
        }
    }
}

/// Where a merge lands inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum MergeTarget {
    Lgs,
    Ulgs { lg: String },
    Grundtexte { lg: String, ulg: String },
    Folgepositionen { lg: String, ulg: String, grundtext: String },
    Ungeteilte { lg: String, ulg: String, grundtext: String },
}

/// Child of `list` with key `nr`, appended as an empty container when missing.
fn ensure_child<'a>(list: &'a mut Vec<Value>, nr: &str, label: &str) -> &'a mut Value {
    let index = match list.iter().position(|item| attr(item, "nr").as_deref() == Some(nr)) {
        Some(i) => i,
        None => {
            warn!("{label} {nr} not found during merge, appending an empty {label}");
            list.push(json!({ "@_nr": nr }));
            list.len() - 1
        }
    };
    &mut list[index]
}

fn list_at<'a>(node: &'a mut Value, path: &'static [&'static str], kind: &'static str, nr: &str) -> Result<&'a mut Vec<Value>> {
    child_list_mut(node, path, true).ok_or_else(|| OnlvError::NotFound {
        kind,
        nr: nr.to_string(),
        path: path.join("/"),
    })
}

fn locate_lg<'a>(doc: &'a mut OnlvDocument, nr: &str) -> Result<&'a mut Value> {
    let not_found = || OnlvError::NotFound {
        kind: "LG",
        nr: nr.to_string(),
        path: nr.to_string(),
    };
    if doc.find_lg_mut(nr).is_none() {
        let lgs = doc.lgs_mut().ok_or_else(not_found)?;
        ensure_child(lgs, nr, "LG");
    }
    doc.find_lg_mut(nr).ok_or_else(not_found)
}

/// List addressed by `target` plus its collection type. The flag is set when
/// the items have to be stored as standalone positions instead.
fn target_list<'a>(doc: &'a mut OnlvDocument, target: &MergeTarget) -> Result<(&'a mut Vec<Value>, Collection, bool)> {
    match target {
        MergeTarget::Lgs => {
            let lgs = doc.lgs_mut().ok_or_else(|| OnlvError::NotFound {
                kind: "LG list",
                nr: String::new(),
                path: String::new(),
            })?;
            Ok((lgs, Collection::Lg, false))
        }
        MergeTarget::Ulgs { lg } => {
            let lg_node = locate_lg(doc, lg)?;
            Ok((list_at(lg_node, ULG_LIST, "LG", lg)?, Collection::Ulg, false))
        }
        MergeTarget::Grundtexte { lg, ulg } => {
            let lg_node = locate_lg(doc, lg)?;
            let ulg_node = ensure_child(list_at(lg_node, ULG_LIST, "LG", lg)?, ulg, "ULG");
            Ok((list_at(ulg_node, GRUNDTEXT_LIST, "ULG", ulg)?, Collection::Grundtextnr, false))
        }
        MergeTarget::Folgepositionen { lg, ulg, grundtext } | MergeTarget::Ungeteilte { lg, ulg, grundtext } => {
            let lg_node = locate_lg(doc, lg)?;
            let ulg_node = ensure_child(list_at(lg_node, ULG_LIST, "LG", lg)?, ulg, "ULG");
            let grundtexte = list_at(ulg_node, GRUNDTEXT_LIST, "ULG", ulg)?;

            let found = grundtexte.iter().any(|gt| attr(gt, "nr").as_deref() == Some(grundtext.as_str()));
            let gt = ensure_child(grundtexte, grundtext, "Grundtext");
            match target {
                MergeTarget::Folgepositionen { .. } if found => {
                    Ok((list_at(gt, FOLGEPOSITION_LIST, "Grundtext", grundtext)?, Collection::Folgeposition, false))
                }
                _ => Ok((
                    list_at(gt, UNGETEILTE_LIST, "Grundtext", grundtext)?,
                    Collection::Ungeteilteposition,
                    !found,
                )),
            }
        }
    }
}

/// Gives a position without `@_nr` the Grundtext number plus its own letter,
/// so items that fall back together keep distinct keys.
fn standalone_item(item: &Value, grundtext: &str) -> Value {
    let mut item = item.clone();
    if attr(&item, "nr").is_none() {
        let nr = format!("{grundtext}{}", attr(&item, "ftnr").unwrap_or_default());
        if let Some(map) = item.as_object_mut() {
            map.insert("@_nr".to_string(), Value::String(nr));
        }
    }
    item
}

/// Merges `items` at `target` and returns the new document.
pub fn merge_into_document(doc: &OnlvDocument, target: &MergeTarget, items: &[Value]) -> Result<OnlvDocument> {
    let mut out = doc.clone();
    let (list, collection, standalone) = target_list(&mut out, target)?;

    let items: Vec<Value> = if standalone {
        // Without its Grundtext an item can only be kept as a standalone
        // position, so Folgepositionen silently become Ungeteilte Positionen.
        warn!("Grundtext for {target:?} not found, merging {} item(s) as standalone positions", items.len());
        let nr = match target {
            MergeTarget::Folgepositionen { grundtext, .. } | MergeTarget::Ungeteilte { grundtext, .. } => grundtext.clone(),
            _ => String::new(),
        };
        items.iter().map(|item| standalone_item(item, &nr)).collect()
    } else {
        items.to_vec()
    };

    let merged = merge(list, &items, collection);
    debug!("Merged {} item(s) into {:?} list, now {} entries", items.len(), collection, merged.len());
    *list = merged;
    Ok(out)
}
