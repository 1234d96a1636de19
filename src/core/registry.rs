//! Process-wide list of standard position numbers.
//!
//! The list is read once, either installed explicitly or loaded from the
//! configured `nrlist` file, and stays read-only afterwards.

use std::collections::HashSet;
use std::path::Path;

use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::core::document::{child_list, find_by_attr, OnlvDocument, FOLGEPOSITION_LIST, GRUNDTEXT_LIST, ULG_LIST};
use crate::core::filter::parse_full_nr;
use crate::error::Result;

static NR_LIST: OnceCell<HashSet<String>> = OnceCell::new();

/// One number per line; blank lines and `#` comments are ignored.
pub fn parse_nr_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_nr_list<P: AsRef<Path>>(path: P) -> Result<HashSet<String>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let set = parse_nr_list(&content);
    info!("Loaded {} standard numbers from {}", set.len(), path.as_ref().display());
    Ok(set)
}

/// Installs the registry. Returns `false` when it was already initialised.
pub fn install_nr_list(set: HashSet<String>) -> bool {
    NR_LIST.set(set).is_ok()
}

/// Installs the registry from `path`, or an empty one when no path is given.
pub fn init_nr_list(path: Option<&Path>) -> Result<()> {
    let set = match path {
        Some(path) => load_nr_list(path)?,
        None => HashSet::new(),
    };
    if !install_nr_list(set) {
        warn!("Standard number list already initialised, keeping the existing one");
    }
    Ok(())
}

/// The registry, empty when nothing was installed.
pub fn nr_list() -> &'static HashSet<String> {
    NR_LIST.get_or_init(HashSet::new)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NrExistence {
    pub exists: bool,
    pub grundtext_exists: bool,
    pub standard: bool,
}

/// Looks up `full_nr` (`LLGGTT[A-Z]`) in `doc` and in `registry`.
pub fn check_nr_in(doc: &OnlvDocument, full_nr: &str, registry: &HashSet<String>) -> NrExistence {
    let standard = registry.contains(full_nr.trim());
    let Some(nr) = parse_full_nr(full_nr) else {
        return NrExistence { standard, ..Default::default() };
    };

    let grundtext = find_by_attr(&doc.lgs(), "nr", &nr.lg)
        .and_then(|lg| find_by_attr(&child_list(lg, ULG_LIST), "nr", &nr.ulg))
        .and_then(|ulg| find_by_attr(&child_list(ulg, GRUNDTEXT_LIST), "nr", &nr.grundtext));

    let Some(gt) = grundtext else {
        return NrExistence { standard, ..Default::default() };
    };

    let exists = match &nr.ftnr {
        Some(letter) => find_by_attr(&child_list(gt, FOLGEPOSITION_LIST), "ftnr", letter).is_some(),
        // without letter the number names the Grundtext itself
        None => true,
    };

    NrExistence { exists, grundtext_exists: true, standard }
}

pub fn check_nr_existence(doc: &OnlvDocument, full_nr: &str) -> NrExistence {
    check_nr_in(doc, full_nr, nr_list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> OnlvDocument {
        OnlvDocument::from_value(json!([{
            "@_nr": "00",
            "ulg-liste": { "ulg": [{ "@_nr": "11", "positionen": { "grundtextnr": [
                { "@_nr": "03", "folgeposition": [{ "@_ftnr": "A" }] }
            ] } }] }
        }]))
    }

    #[test]
    fn parses_list_with_comments() {
        let set = parse_nr_list("# Standardpositionen\n001103A\n\n  001104  \n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("001104"));
    }

    #[test]
    fn existence_checks() {
        let registry = parse_nr_list("001103B");
        let doc = doc();

        assert_eq!(
            check_nr_in(&doc, "001103A", &registry),
            NrExistence { exists: true, grundtext_exists: true, standard: false }
        );
        assert_eq!(
            check_nr_in(&doc, "001103B", &registry),
            NrExistence { exists: false, grundtext_exists: true, standard: true }
        );
        assert_eq!(check_nr_in(&doc, "001199", &registry), NrExistence::default());
        assert_eq!(check_nr_in(&doc, "nonsense", &registry), NrExistence::default());
        assert!(check_nr_in(&doc, "001103", &registry).exists);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nrlist.txt");
        std::fs::write(&path, "001101\n001102\n").unwrap();
        assert_eq!(load_nr_list(&path).unwrap().len(), 2);
    }
}
