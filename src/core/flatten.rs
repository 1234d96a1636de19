//! Flattening of the LG / ULG / Grundtext / position tree into table rows,
//! and the way back.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::display_nr::{resolve_display_nr, RowIndex};
use crate::core::document::{
    attr, child_list, child_list_mut, scalar_to_string, OnlvDocument, FOLGEPOSITION_LIST, GRUNDTEXT_LIST, ULG_LIST,
    UNGETEILTE_LIST,
};
use crate::core::rich_text::block_plain_text;
use crate::EntryKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlattenMode {
    /// Grundtext containers are elided; their positions hang off the ULG.
    #[default]
    Compact,
    /// Grundtext containers get their own level-2 rows.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub level: u8,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub nr: String,
    pub display_nr: String,
    pub bezeichnung: String,
    pub langtext: String,
    pub kommentar: String,
    pub menge: Option<f64>,
    pub einheit: String,
    pub herkunft: String,
    pub grundtext_nr: Option<String>,
    pub ftnr: Option<String>,
    /// Grundtext the position belongs to, without its position lists.
    pub parent_grundtext: Option<Value>,
    pub parent_grundtext_langtext: Option<String>,
    pub searchable_text: String,
    pub children: Vec<String>,
    pub raw: Value,
}

impl FlatRow {
    pub fn empty(raw: Value) -> Self {
        Self {
            id: String::new(),
            parent_id: None,
            level: 0,
            kind: EntryKind::Lg,
            nr: String::new(),
            display_nr: String::new(),
            bezeichnung: String::new(),
            langtext: String::new(),
            kommentar: String::new(),
            menge: None,
            einheit: String::new(),
            herkunft: String::new(),
            grundtext_nr: None,
            ftnr: None,
            parent_grundtext: None,
            parent_grundtext_langtext: None,
            searchable_text: String::new(),
            children: Vec::new(),
            raw,
        }
    }
}

fn text_at(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        match current.get(*key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    block_plain_text(current)
}

fn parse_menge(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        other => other.get("#text").and_then(|t| parse_menge(Some(t))),
    }
}

fn searchable(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn without_positions(grundtext: &Value) -> Value {
    let mut gt = grundtext.clone();
    if let Value::Object(map) = &mut gt {
        for key in ["folgeposition", "ungeteilteposition"] {
            if let Some(slot) = map.get_mut(key) {
                *slot = Value::Array(Vec::new());
            }
        }
    }
    gt
}

#[derive(Default)]
struct RowBuilder {
    rows: Vec<FlatRow>,
    used_ids: HashSet<String>,
    counter: usize,
}

impl RowBuilder {
    fn make_id(&mut self, parent: Option<&str>, tag: &str, nr: Option<&str>) -> String {
        let own = match nr.filter(|n| !n.is_empty()) {
            Some(nr) => format!("{tag}-{nr}"),
            None => {
                self.counter += 1;
                format!("{tag}-#{}", self.counter)
            }
        };
        let base = match parent {
            Some(parent) => format!("{parent}/{own}"),
            None => own,
        };
        let mut id = base.clone();
        let mut n = 1;
        while self.used_ids.contains(&id) {
            n += 1;
            id = format!("{base}~{n}");
        }
        self.used_ids.insert(id.clone());
        id
    }

    fn lg(&mut self, lg: &Value, mode: FlattenMode) {
        let nr = attr(lg, "nr").unwrap_or_default();
        let id = self.make_id(None, "lg", Some(nr.as_str()));
        let bezeichnung = text_at(lg, &["lg-eigenschaften", "ueberschrift"]);
        let langtext = text_at(lg, &["lg-eigenschaften", "vorbemerkung"]);
        let kommentar = text_at(lg, &["lg-eigenschaften", "kommentar"]);
        self.rows.push(FlatRow {
            id: id.clone(),
            kind: EntryKind::Lg,
            searchable_text: searchable(&[nr.as_str(), bezeichnung.as_str(), langtext.as_str()]),
            nr: nr.clone(),
            bezeichnung,
            langtext,
            kommentar,
            ..FlatRow::empty(lg.clone())
        });

        for ulg in child_list(lg, ULG_LIST) {
            self.ulg(ulg, &id, &nr, mode);
        }
    }

    fn ulg(&mut self, ulg: &Value, parent: &str, lg_nr: &str, mode: FlattenMode) {
        let nr = attr(ulg, "nr").unwrap_or_default();
        let id = self.make_id(Some(parent), "ulg", Some(nr.as_str()));
        let bezeichnung = text_at(ulg, &["ulg-eigenschaften", "ueberschrift"]);
        let langtext = text_at(ulg, &["ulg-eigenschaften", "vorbemerkung"]);
        let kommentar = text_at(ulg, &["ulg-eigenschaften", "kommentar"]);
        self.rows.push(FlatRow {
            id: id.clone(),
            parent_id: Some(parent.to_string()),
            level: 1,
            kind: EntryKind::Ulg,
            searchable_text: searchable(&[nr.as_str(), bezeichnung.as_str(), langtext.as_str()]),
            nr: nr.clone(),
            bezeichnung,
            langtext,
            kommentar,
            ..FlatRow::empty(ulg.clone())
        });

        let prefix = format!("{lg_nr}.{nr}");
        for grundtext in child_list(ulg, GRUNDTEXT_LIST) {
            self.grundtext(grundtext, &id, &prefix, mode);
        }
    }

    fn grundtext(&mut self, gt: &Value, ulg_id: &str, prefix: &str, mode: FlattenMode) {
        let gt_nr = attr(gt, "nr").unwrap_or_default();
        let gt_id = self.make_id(Some(ulg_id), "gt", Some(gt_nr.as_str()));
        let gt_langtext = text_at(gt, &["grundtext", "langtext"]);

        let position_parent = match mode {
            FlattenMode::Full => {
                let bezeichnung = text_at(gt, &["grundtext", "stichwort"]);
                self.rows.push(FlatRow {
                    id: gt_id.clone(),
                    parent_id: Some(ulg_id.to_string()),
                    level: 2,
                    kind: EntryKind::Grundtext,
                    nr: gt_nr.clone(),
                    searchable_text: searchable(&[gt_nr.as_str(), bezeichnung.as_str(), gt_langtext.as_str()]),
                    bezeichnung,
                    langtext: gt_langtext.clone(),
                    grundtext_nr: Some(gt_nr.clone()),
                    ..FlatRow::empty(gt.clone())
                });
                gt_id.clone()
            }
            FlattenMode::Compact => ulg_id.to_string(),
        };

        let context = Some(without_positions(gt));
        let full_gt = format!("{prefix}.{gt_nr}");

        for fp in child_list(gt, FOLGEPOSITION_LIST) {
            let ftnr = attr(fp, "ftnr");
            let id = self.make_id(Some(gt_id.as_str()), "fp", ftnr.as_deref());
            let nr = format!("{full_gt}{}", ftnr.as_deref().unwrap_or_default());
            self.position(fp, EntryKind::Folgeposition, id, &position_parent, nr, &gt_nr, ftnr, &context, &gt_langtext);
        }

        for up in child_list(gt, UNGETEILTE_LIST) {
            let own = attr(up, "nr");
            let id = self.make_id(Some(gt_id.as_str()), "up", own.as_deref().or(Some(gt_nr.as_str())));
            let nr = format!("{prefix}.{}", own.as_deref().unwrap_or(&gt_nr));
            self.position(up, EntryKind::Ungeteilteposition, id, &position_parent, nr, &gt_nr, None, &context, &gt_langtext);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn position(
        &mut self,
        item: &Value,
        kind: EntryKind,
        id: String,
        parent: &str,
        nr: String,
        gt_nr: &str,
        ftnr: Option<String>,
        grundtext: &Option<Value>,
        grundtext_langtext: &str,
    ) {
        let props = item.get("pos-eigenschaften").unwrap_or(item);
        let bezeichnung = text_at(props, &["stichwort"]);
        let langtext = text_at(props, &["langtext"]);
        let kommentar = text_at(props, &["kommentar"]);
        let einheit = props.get("einheit").map(block_plain_text).unwrap_or_default();
        let herkunft = props
            .get("herkunftskennzeichen")
            .and_then(scalar_to_string)
            .unwrap_or_default();

        self.rows.push(FlatRow {
            id,
            parent_id: Some(parent.to_string()),
            level: 3,
            kind,
            searchable_text: searchable(&[nr.as_str(), bezeichnung.as_str(), langtext.as_str(), grundtext_langtext]),
            nr,
            bezeichnung,
            langtext,
            kommentar,
            menge: parse_menge(props.get("lvmenge")),
            einheit,
            herkunft,
            grundtext_nr: Some(gt_nr.to_string()),
            ftnr,
            parent_grundtext: grundtext.clone(),
            parent_grundtext_langtext: (!grundtext_langtext.is_empty()).then(|| grundtext_langtext.to_string()),
            ..FlatRow::empty(item.clone())
        });
    }
}

/// Depth-first rows of the document; `None` yields no rows.
pub fn flatten(doc: Option<&OnlvDocument>, mode: FlattenMode) -> Vec<FlatRow> {
    let Some(doc) = doc else {
        return Vec::new();
    };

    let mut builder = RowBuilder::default();
    for lg in doc.lgs() {
        builder.lg(lg, mode);
    }
    let mut rows = builder.rows;

    let positions: HashMap<String, usize> = rows.iter().enumerate().map(|(i, row)| (row.id.clone(), i)).collect();
    let links: Vec<(usize, String)> = rows
        .iter()
        .filter_map(|row| {
            let parent = row.parent_id.as_ref()?;
            positions.get(parent).map(|&i| (i, row.id.clone()))
        })
        .collect();
    for (parent, child) in links {
        rows[parent].children.push(child);
    }

    let display: Vec<String> = {
        let index = RowIndex::new(&rows);
        rows.iter().map(|row| resolve_display_nr(row, &index)).collect()
    };
    for (row, nr) in rows.iter_mut().zip(display) {
        row.display_nr = nr;
    }

    debug!("Flattened document into {} rows", rows.len());
    rows
}

fn replace_list(node: &mut Value, path: &[&str], items: Vec<Value>) {
    let create = !items.is_empty();
    if let Some(list) = child_list_mut(node, path, create) {
        *list = items;
    }
}

/// Rebuilds the nested LG list from rows of either flatten mode.
pub fn nest(rows: &[FlatRow]) -> Vec<Value> {
    let mut children: HashMap<&str, Vec<&FlatRow>> = HashMap::new();
    let mut roots = Vec::new();
    for row in rows {
        match row.parent_id.as_deref() {
            Some(parent) => children.entry(parent).or_default().push(row),
            None if row.kind == EntryKind::Lg => roots.push(row),
            None => debug!("Skipping orphan row {}", row.id),
        }
    }
    roots.into_iter().map(|row| build_node(row, &children)).collect()
}

fn build_node(row: &FlatRow, children: &HashMap<&str, Vec<&FlatRow>>) -> Value {
    let mut node = row.raw.clone();
    let kids = children.get(row.id.as_str()).map(Vec::as_slice).unwrap_or_default();

    match row.kind {
        EntryKind::Lg => {
            let ulgs = kids
                .iter()
                .filter(|kid| kid.kind == EntryKind::Ulg)
                .map(|kid| build_node(kid, children))
                .collect();
            replace_list(&mut node, ULG_LIST, ulgs);
        }
        EntryKind::Ulg => {
            let mut grundtexte: Vec<Value> = Vec::new();
            for kid in kids {
                match kid.kind {
                    EntryKind::Grundtext => grundtexte.push(build_node(kid, children)),
                    kind if kind.is_position() => {
                        let key = kid.grundtext_nr.clone().unwrap_or_default();
                        let slot = match grundtexte
                            .iter()
                            .position(|gt| attr(gt, "nr").unwrap_or_default() == key)
                        {
                            Some(i) => i,
                            None => {
                                let gt = kid
                                    .parent_grundtext
                                    .clone()
                                    .unwrap_or_else(|| serde_json::json!({ "@_nr": key }));
                                grundtexte.push(gt);
                                grundtexte.len() - 1
                            }
                        };
                        let path = if kid.kind == EntryKind::Folgeposition {
                            FOLGEPOSITION_LIST
                        } else {
                            UNGETEILTE_LIST
                        };
                        if let Some(list) = child_list_mut(&mut grundtexte[slot], path, true) {
                            list.push(kid.raw.clone());
                        }
                    }
                    _ => {}
                }
            }
            replace_list(&mut node, GRUNDTEXT_LIST, grundtexte);
        }
        EntryKind::Grundtext => {
            let pick = |kind: EntryKind| -> Vec<Value> {
                kids.iter().filter(|kid| kid.kind == kind).map(|kid| kid.raw.clone()).collect()
            };
            replace_list(&mut node, FOLGEPOSITION_LIST, pick(EntryKind::Folgeposition));
            replace_list(&mut node, UNGETEILTE_LIST, pick(EntryKind::Ungeteilteposition));
        }
        EntryKind::Folgeposition | EntryKind::Ungeteilteposition => {}
    }
    node
}

/// Rows whose searchable text contains `query`, together with their ancestors.
pub fn search_rows<'a>(rows: &'a [FlatRow], query: &str) -> Vec<&'a FlatRow> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return rows.iter().collect();
    }

    let index = RowIndex::new(rows);
    let mut keep: HashSet<&str> = HashSet::new();
    for row in rows.iter().filter(|row| row.searchable_text.contains(&needle)) {
        keep.insert(row.id.as_str());
        keep.extend(index.ancestors(&row.id).into_iter().map(|a| a.id.as_str()));
    }
    rows.iter().filter(|row| keep.contains(row.id.as_str())).collect()
}
