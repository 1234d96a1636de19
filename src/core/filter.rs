//! Filtering an LG down to a list of full position numbers (`LLGGTT[A-Z]`).

use std::fmt;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::document::{attr, child_list, child_list_mut, OnlvDocument, FOLGEPOSITION_LIST, GRUNDTEXT_LIST, ULG_LIST};

static FULL_NR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})([A-Z]?)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullNr {
    pub lg: String,
    pub ulg: String,
    pub grundtext: String,
    pub ftnr: Option<String>,
}

impl FullNr {
    /// Dotted `LG.ULG.GT` path as used by tree insertion.
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.lg, self.ulg, self.grundtext)
    }
}

impl fmt::Display for FullNr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.lg, self.ulg, self.grundtext, self.ftnr.as_deref().unwrap_or(""))
    }
}

pub fn parse_full_nr(nr: &str) -> Option<FullNr> {
    let caps = FULL_NR.captures(nr.trim())?;
    Some(FullNr {
        lg: caps[1].to_string(),
        ulg: caps[2].to_string(),
        grundtext: caps[3].to_string(),
        ftnr: Some(caps[4].to_string()).filter(|l| !l.is_empty()),
    })
}

pub fn validate_full_nr(nr: &str) -> bool {
    FULL_NR.is_match(nr.trim())
}

fn find_nr<'a>(list: Vec<&'a Value>, key: &str, nr: &str) -> Option<&'a Value> {
    list.into_iter().find(|item| attr(item, key).as_deref() == Some(nr))
}

fn position_of(list: &[Value], nr: &str) -> Option<usize> {
    list.iter().position(|item| attr(item, "nr").as_deref() == Some(nr))
}

/// Copy of `lg` holding only the listed positions and their ancestors.
///
/// A number without letter keeps its whole Grundtext, a number with letter
/// only that Folgeposition. The LG part of the numbers is not checked.
pub fn filter_lg_by_full_nrs<S: AsRef<str>>(lg: &Value, nrs: &[S]) -> Value {
    let mut result = lg.clone();
    let mut ulgs: Vec<Value> = Vec::new();

    for raw in nrs {
        let raw = raw.as_ref();
        let Some(nr) = parse_full_nr(raw) else {
            warn!("Skipping invalid full number {raw}");
            continue;
        };

        let Some(source_ulg) = find_nr(child_list(lg, ULG_LIST), "nr", &nr.ulg) else {
            warn!("ULG {} not found for {raw}", nr.ulg);
            continue;
        };

        let ulg_index = match position_of(&ulgs, &nr.ulg) {
            Some(i) => i,
            None => {
                let mut copy = source_ulg.clone();
                if let Some(list) = child_list_mut(&mut copy, GRUNDTEXT_LIST, true) {
                    list.clear();
                }
                ulgs.push(copy);
                ulgs.len() - 1
            }
        };

        let Some(source_gt) = find_nr(child_list(source_ulg, GRUNDTEXT_LIST), "nr", &nr.grundtext) else {
            warn!("Grundtext {} not found in ULG {}", nr.grundtext, nr.ulg);
            continue;
        };
        let Some(grundtexte) = child_list_mut(&mut ulgs[ulg_index], GRUNDTEXT_LIST, true) else {
            continue;
        };
        let existing = position_of(grundtexte, &nr.grundtext);

        match (&nr.ftnr, existing) {
            (Some(letter), Some(i)) => {
                let wanted = find_nr(child_list(source_gt, FOLGEPOSITION_LIST), "ftnr", letter);
                let present = find_nr(child_list(&grundtexte[i], FOLGEPOSITION_LIST), "ftnr", letter).is_some();
                if let (Some(fp), false) = (wanted, present) {
                    if let Some(list) = child_list_mut(&mut grundtexte[i], FOLGEPOSITION_LIST, true) {
                        list.push(fp.clone());
                    }
                }
            }
            (Some(letter), None) => {
                let mut copy = source_gt.clone();
                let picked: Vec<Value> = find_nr(child_list(source_gt, FOLGEPOSITION_LIST), "ftnr", letter)
                    .into_iter()
                    .cloned()
                    .collect();
                if let Some(list) = child_list_mut(&mut copy, FOLGEPOSITION_LIST, true) {
                    *list = picked;
                }
                grundtexte.push(copy);
            }
            (None, None) => grundtexte.push(source_gt.clone()),
            (None, Some(_)) => {}
        }
    }

    debug!("Filter kept {} ULG(s)", ulgs.len());
    let create = !ulgs.is_empty();
    if let Some(list) = child_list_mut(&mut result, ULG_LIST, create) {
        *list = ulgs;
    }
    result
}

/// Applies [`filter_lg_by_full_nrs`] to every LG with the numbers of that LG;
/// LGs left without ULGs are dropped.
pub fn filter_document<S: AsRef<str>>(doc: &OnlvDocument, nrs: &[S]) -> OnlvDocument {
    let filter_one = |lg: &Value| {
        let lg_nr = attr(lg, "nr").unwrap_or_default();
        let own: Vec<&str> = nrs
            .iter()
            .map(|nr| nr.as_ref())
            .filter(|nr| parse_full_nr(nr).is_some_and(|p| p.lg == lg_nr))
            .collect();
        filter_lg_by_full_nrs(lg, &own)
    };

    let kept: Vec<Value> = doc
        .lgs()
        .into_iter()
        .map(filter_one)
        .filter(|lg| !child_list(lg, ULG_LIST).is_empty())
        .collect();

    let mut out = doc.clone();
    match out.lgs_mut() {
        Some(list) => *list = kept,
        None => {
            // a bare LG document stays a bare LG
            let root = kept.into_iter().next().unwrap_or_else(|| filter_one(doc.as_value()));
            return OnlvDocument::from_value(root);
        }
    }
    out
}
