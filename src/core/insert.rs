use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::core::document::{attr, child_list, child_list_mut, find_by_attr_mut, OnlvDocument, FOLGEPOSITION_LIST, GRUNDTEXT_LIST, ULG_LIST};
use crate::core::position_info::next_free_letter;
use crate::error::{OnlvError, Result};

/// `LG.ULG.GT` coordinates of a dotted path like `"01.02.03"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionPath {
    pub lg: String,
    pub ulg: String,
    pub grundtext: String,
}

impl PositionPath {
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.trim().split('.').map(str::trim).collect();
        match parts.as_slice() {
            [lg, ulg, gt] if !lg.is_empty() && !ulg.is_empty() && !gt.is_empty() => Ok(Self {
                lg: lg.to_string(),
                ulg: ulg.to_string(),
                grundtext: gt.to_string(),
            }),
            _ => Err(OnlvError::MalformedPath { path: path.to_string() }),
        }
    }
}

fn with_ftnr_first(leaf: Value, ftnr: &str) -> Value {
    let mut map = Map::new();
    map.insert("@_ftnr".to_string(), Value::String(ftnr.to_string()));
    if let Value::Object(fields) = leaf {
        map.extend(fields.into_iter().filter(|(k, _)| k != "@_ftnr"));
    }
    Value::Object(map)
}

/// Appends `leaf` as a Folgeposition under the Grundtext at `path` and
/// returns the new document. Missing LG, ULG or Grundtext is an error; no
/// container is ever created on the way down.
pub fn add_position_to_path(doc: &OnlvDocument, path: &str, leaf: Value) -> Result<OnlvDocument> {
    let coords = PositionPath::parse(path).inspect_err(|e| error!("{e}"))?;
    let not_found = |kind: &'static str, nr: &str| {
        let err = OnlvError::NotFound {
            kind,
            nr: nr.to_string(),
            path: path.to_string(),
        };
        error!("Cannot insert position: {err}");
        err
    };

    if !doc.lgs().iter().any(|lg| attr(lg, "nr").as_deref() == Some(coords.lg.as_str())) {
        return Err(not_found("LG", &coords.lg));
    }

    let mut out = doc.clone();
    let lg = out.find_lg_mut(&coords.lg).ok_or_else(|| not_found("LG", &coords.lg))?;
    let ulg = child_list_mut(lg, ULG_LIST, false)
        .and_then(|ulgs| find_by_attr_mut(ulgs, "nr", &coords.ulg))
        .ok_or_else(|| not_found("ULG", &coords.ulg))?;
    let gt = child_list_mut(ulg, GRUNDTEXT_LIST, false)
        .and_then(|gts| find_by_attr_mut(gts, "nr", &coords.grundtext))
        .ok_or_else(|| not_found("Grundtext", &coords.grundtext))?;

    let taken: Vec<String> = child_list(gt, FOLGEPOSITION_LIST)
        .into_iter()
        .filter_map(|fp| attr(fp, "ftnr"))
        .collect();

    let leaf = match attr(&leaf, "ftnr") {
        Some(ftnr) if !taken.contains(&ftnr) => leaf,
        requested => {
            let next = next_free_letter(&taken).ok_or_else(|| {
                error!("All follow-up letters of Grundtext {path} are used");
                OnlvError::FtnrExhausted { grundtext: path.to_string() }
            })?;
            if let Some(requested) = requested {
                warn!("Follow-up letter {requested} already used under {path}, assigning {next}");
            }
            with_ftnr_first(leaf, &next)
        }
    };

    let ftnr = attr(&leaf, "ftnr").unwrap_or_default();
    child_list_mut(gt, FOLGEPOSITION_LIST, true)
        .ok_or_else(|| not_found("Grundtext", &coords.grundtext))?
        .push(leaf);
    info!("Inserted Folgeposition {path}{ftnr}");
    Ok(out)
}
