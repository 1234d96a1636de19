//! Context of a clicked row, used to pre-fill "add item" forms.

use serde::{Deserialize, Serialize};

use crate::core::display_nr::RowIndex;
use crate::core::flatten::FlatRow;
use crate::core::numbering::{generate_next_nr, increment_letter};
use crate::EntryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoType {
    Lg,
    Ulg,
    Grundtext,
    Ungeteilteposition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub info_type: InfoType,
    pub lg_nr: Option<String>,
    pub ulg_nr: Option<String>,
    pub grundtextnr: Option<String>,
    pub ftnr_list: Vec<String>,
    pub last_ftnr: Option<String>,
    /// Letter after the highest sibling letter, `None` once `Z` is taken.
    pub next_ftnr: Option<String>,
    pub children: Vec<String>,
    pub last_item_nr: Option<String>,
    pub next_nr: Option<String>,
}

impl PositionInfo {
    fn new(info_type: InfoType) -> Self {
        Self {
            info_type,
            lg_nr: None,
            ulg_nr: None,
            grundtextnr: None,
            ftnr_list: Vec::new(),
            last_ftnr: None,
            next_ftnr: None,
            children: Vec::new(),
            last_item_nr: None,
            next_nr: None,
        }
    }

    fn set_letters(&mut self, letters: Vec<String>) {
        self.last_ftnr = letters.last().cloned();
        self.next_ftnr = next_free_letter(&letters);
        self.ftnr_list = letters;
    }
}

/// Next letter after the highest one in `letters`; `A` when there is none.
pub fn next_free_letter(letters: &[String]) -> Option<String> {
    let highest = letters
        .iter()
        .filter_map(|l| l.chars().last())
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .max();
    match highest {
        None => Some("A".to_string()),
        Some(c) => {
            let step = increment_letter(c);
            (!step.carry).then(|| step.next_char.to_string())
        }
    }
}

fn folgeposition_letters<'a>(rows: impl Iterator<Item = &'a FlatRow>, grundtext: Option<&str>) -> Vec<String> {
    rows.filter(|r| r.kind == EntryKind::Folgeposition)
        .filter(|r| grundtext.is_none() || r.grundtext_nr.as_deref() == grundtext)
        .filter_map(|r| r.ftnr.clone())
        .collect()
}

fn children_of<'a>(row: &FlatRow, index: &RowIndex<'a>) -> Vec<&'a FlatRow> {
    row.children.iter().filter_map(|id| index.get(id)).collect()
}

pub fn extract_position_info(row: &FlatRow, rows: &[FlatRow]) -> PositionInfo {
    let index = RowIndex::new(rows);
    let nr_of = |kind| index.ancestor(&row.id, kind).map(|r: &FlatRow| r.nr.clone());

    match row.kind {
        EntryKind::Lg => {
            let mut info = PositionInfo::new(InfoType::Lg);
            info.lg_nr = Some(row.nr.clone());
            info.children = row.children.clone();
            info.last_item_nr = children_of(row, &index).last().map(|ulg| ulg.nr.clone());
            info.next_nr = Some(next_or_first(info.last_item_nr.as_deref()));
            info
        }
        EntryKind::Ulg => {
            let mut info = PositionInfo::new(InfoType::Ulg);
            info.lg_nr = nr_of(EntryKind::Lg);
            info.ulg_nr = Some(row.nr.clone());
            info.children = row.children.clone();

            let direct = children_of(row, &index);
            let mut last = direct.last().copied();
            if let Some(gt) = last.filter(|r| r.kind == EntryKind::Grundtext && !r.children.is_empty()) {
                last = children_of(gt, &index).last().copied().or(last);
            }

            if let Some(last) = last {
                info.grundtextnr = last.grundtext_nr.clone();
                info.last_item_nr = Some(last.nr.clone());
                let siblings = match last.parent_id.as_deref().and_then(|p| index.get(p)) {
                    Some(parent) => children_of(parent, &index),
                    None => Vec::new(),
                };
                info.set_letters(folgeposition_letters(siblings.into_iter(), last.grundtext_nr.as_deref()));
            }

            let last_grundtext = direct.iter().rev().find_map(|r| r.grundtext_nr.clone());
            info.next_nr = Some(next_or_first(last_grundtext.as_deref()));
            info
        }
        EntryKind::Grundtext => {
            let mut info = PositionInfo::new(InfoType::Grundtext);
            info.lg_nr = nr_of(EntryKind::Lg);
            info.ulg_nr = nr_of(EntryKind::Ulg);
            info.grundtextnr = Some(row.nr.clone());
            info.children = row.children.clone();
            let kids = children_of(row, &index);
            info.last_item_nr = kids.last().map(|r| r.nr.clone());
            info.set_letters(folgeposition_letters(kids.into_iter(), None));
            info.next_nr = info.next_ftnr.as_ref().map(|letter| format!("{}{letter}", row.nr));
            info
        }
        EntryKind::Folgeposition | EntryKind::Ungeteilteposition => {
            let info_type = if row.kind == EntryKind::Folgeposition {
                InfoType::Grundtext
            } else {
                InfoType::Ungeteilteposition
            };
            let mut info = PositionInfo::new(info_type);
            info.lg_nr = nr_of(EntryKind::Lg);
            info.ulg_nr = nr_of(EntryKind::Ulg);
            info.grundtextnr = row.grundtext_nr.clone();

            // The parent is the Grundtext row in full mode, the ULG otherwise.
            if let Some(parent) = index.parent(&row.id) {
                let siblings = children_of(parent, &index);
                info.set_letters(folgeposition_letters(siblings.into_iter(), row.grundtext_nr.as_deref()));
            }
            info.last_item_nr = Some(row.nr.clone());
            info.next_nr = match row.kind {
                // the next free letter under the same Grundtext, never a taken one
                EntryKind::Folgeposition => info.next_ftnr.as_ref().map(|letter| {
                    let base = row.nr.trim_end_matches(|c: char| c.is_ascii_alphabetic());
                    format!("{base}{letter}")
                }),
                _ => Some(generate_next_nr(&row.nr)),
            };
            info
        }
    }
}

fn next_or_first(last: Option<&str>) -> String {
    match last.filter(|nr| !nr.is_empty()) {
        Some(nr) => generate_next_nr(nr),
        None => "01".to_string(),
    }
}
