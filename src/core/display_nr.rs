//! Display numbers for flattened rows.
//!
//! Folgepositionen show as `ULG.GT` plus their letter (`"02.03A"`), Grundtexte
//! and Ungeteilte Positionen as `ULG.nr`. LG and ULG rows keep their own nr.

use std::collections::HashMap;

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::flatten::FlatRow;
use crate::EntryKind;

static FULL_NR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());
static LEADING_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.]+").unwrap());

/// Lookup of rows by id plus the `child -> parent` links between them.
pub struct RowIndex<'a> {
    by_id: HashMap<&'a str, &'a FlatRow>,
    parents: HashMap<&'a str, &'a str>,
}

impl<'a> RowIndex<'a> {
    pub fn new(rows: &'a [FlatRow]) -> Self {
        let by_id = rows.iter().map(|row| (row.id.as_str(), row)).collect();
        let parents = rows
            .iter()
            .filter_map(|row| row.parent_id.as_deref().map(|parent| (row.id.as_str(), parent)))
            .collect();
        Self { by_id, parents }
    }

    pub fn get(&self, id: &str) -> Option<&'a FlatRow> {
        self.by_id.get(id).copied()
    }

    pub fn parent(&self, id: &str) -> Option<&'a FlatRow> {
        self.parents.get(id).and_then(|parent| self.get(parent))
    }

    /// Nearest ancestor of `kind`, walking at most as many steps as there are rows.
    pub fn ancestor(&self, id: &str, kind: EntryKind) -> Option<&'a FlatRow> {
        let mut current = id;
        for _ in 0..self.by_id.len() {
            let parent = self.parent(current)?;
            if parent.kind == kind {
                return Some(parent);
            }
            current = parent.id.as_str();
        }
        None
    }

    /// Every ancestor from the direct parent upwards.
    pub fn ancestors(&self, id: &str) -> Vec<&'a FlatRow> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if out.len() >= self.by_id.len() {
                break;
            }
            out.push(parent);
            current = parent.id.as_str();
        }
        out
    }
}

/// Repairs ids stored as the full number twice followed by the letter,
/// `"99.10.0399.10.03A" -> "99.10.03A"`.
pub fn repair_duplicated_nr(nr: &str) -> Option<String> {
    let digits = nr.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let letters = &nr[digits.len()..];
    if digits.len() % 2 != 0 {
        return None;
    }
    let (first, second) = digits.split_at(digits.len() / 2);
    if first == second && FULL_NR.is_match(first) {
        Some(format!("{first}{letters}"))
    } else {
        None
    }
}

fn last_segment(nr: &str) -> &str {
    nr.rsplit('.').next().unwrap_or(nr)
}

pub fn resolve_display_nr(row: &FlatRow, index: &RowIndex) -> String {
    if let Some(repaired) = repair_duplicated_nr(&row.nr) {
        return repaired;
    }

    match row.kind {
        EntryKind::Folgeposition => {
            let Some(ulg) = index.ancestor(&row.id, EntryKind::Ulg) else {
                warn!("No ULG above Folgeposition {}, keeping raw number", row.nr);
                return row.nr.clone();
            };
            let grundtext = row.grundtext_nr.as_deref().map(last_segment).unwrap_or_default();
            let letter = row
                .ftnr
                .as_deref()
                .map(|ftnr| LEADING_NUMERIC.replace(ftnr, "").into_owned())
                .unwrap_or_default();
            format!("{}.{}{}", ulg.nr, grundtext, letter)
        }
        EntryKind::Grundtext | EntryKind::Ungeteilteposition => {
            let Some(ulg) = index.ancestor(&row.id, EntryKind::Ulg) else {
                warn!("No ULG above {} {}, keeping raw number", row.kind.label(), row.nr);
                return row.nr.clone();
            };
            let prefix = format!("{}.", ulg.nr);
            if row.nr.starts_with(&prefix) && row.nr.matches('.').count() == 1 {
                return row.nr.clone();
            }
            format!("{prefix}{}", last_segment(&row.nr))
        }
        EntryKind::Lg | EntryKind::Ulg => row.nr.clone(),
    }
}
