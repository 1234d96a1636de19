//! Whole workflows over one small tender: parse, flatten, inspect, edit and
//! export again.

use onlv_rs::core::filter::filter_document;
use onlv_rs::core::flatten::{flatten, search_rows, FlattenMode};
use onlv_rs::core::insert::add_position_to_path;
use onlv_rs::core::merge::{merge_into_document, MergeTarget};
use onlv_rs::core::parser::{parse_str, UniversalParser};
use onlv_rs::core::position_info::{extract_position_info, InfoType};
use onlv_rs::core::writer::export_document;
use onlv_rs::{EntryKind, ExportConfig, OnlvError};
use serde_json::json;

const LV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<onlv xmlns="http://www.oenorm.at/schema/A2063/2021-03-01">
  <metadaten><dateiname>trockenbau</dateiname></metadaten>
  <ausschreibungs-lv>
    <gliederung-lg>
      <lg-liste>
        <lg nr="01">
          <lg-eigenschaften><ueberschrift>Trockenbau</ueberschrift></lg-eigenschaften>
          <ulg-liste>
            <ulg nr="02">
              <ulg-eigenschaften><ueberschrift>Wände</ueberschrift></ulg-eigenschaften>
              <positionen>
                <grundtextnr nr="03">
                  <grundtext><langtext><p>Gipskartonwand</p></langtext></grundtext>
                  <folgeposition ftnr="A">
                    <pos-eigenschaften>
                      <stichwort>Ständerwand 100 mm</stichwort>
                      <einheit>m2</einheit>
                      <lvmenge>12.5</lvmenge>
                    </pos-eigenschaften>
                  </folgeposition>
                </grundtextnr>
              </positionen>
            </ulg>
          </ulg-liste>
        </lg>
      </lg-liste>
    </gliederung-lg>
  </ausschreibungs-lv>
</onlv>"#;

const FP_ID: &str = "lg-01/ulg-02/gt-03/fp-A";

#[test]
fn clicked_folgeposition_prefills_the_form() {
    let doc = parse_str(LV).unwrap();
    let rows = flatten(Some(&doc), FlattenMode::Compact);
    assert_eq!(rows.len(), 3);

    let fp = rows.iter().find(|r| r.id == FP_ID).unwrap();
    assert_eq!(fp.kind, EntryKind::Folgeposition);
    assert_eq!(fp.display_nr, "02.03A");
    assert_eq!(fp.bezeichnung, "Ständerwand 100 mm");
    assert_eq!(fp.menge, Some(12.5));
    assert_eq!(fp.parent_id.as_deref(), Some("lg-01/ulg-02"));

    let info = extract_position_info(fp, &rows);
    assert_eq!(info.info_type, InfoType::Grundtext);
    assert_eq!(info.lg_nr.as_deref(), Some("01"));
    assert_eq!(info.ulg_nr.as_deref(), Some("02"));
    assert_eq!(info.grundtextnr.as_deref(), Some("03"));
    assert_eq!(info.last_ftnr.as_deref(), Some("A"));
    assert_eq!(info.next_ftnr.as_deref(), Some("B"));
}

#[test]
fn full_mode_exposes_grundtext_rows() {
    let doc = parse_str(LV).unwrap();
    let rows = flatten(Some(&doc), FlattenMode::Full);
    let gt = rows.iter().find(|r| r.kind == EntryKind::Grundtext).unwrap();
    assert_eq!(gt.level, 2);
    assert_eq!(gt.children, vec![FP_ID.to_string()]);

    let info = extract_position_info(gt, &rows);
    assert_eq!(info.next_nr.as_deref(), Some("03B"));
}

#[test]
fn search_keeps_ancestors() {
    let doc = parse_str(LV).unwrap();
    let rows = flatten(Some(&doc), FlattenMode::Compact);
    let hits: Vec<&str> = search_rows(&rows, "ständerwand").iter().map(|r| r.id.as_str()).collect();
    assert_eq!(hits, vec!["lg-01", "lg-01/ulg-02", FP_ID]);
    assert!(search_rows(&rows, "dachrinne").is_empty());
}

#[test]
fn insert_then_export_and_read_back() {
    let doc = parse_str(LV).unwrap();
    let updated = add_position_to_path(&doc, "01.02.03", json!({ "pos-eigenschaften": { "stichwort": "Vorsatzschale" } })).unwrap();

    // the input document is left untouched
    assert_eq!(flatten(Some(&doc), FlattenMode::Compact).len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let path = export_document(&updated, dir.path(), &ExportConfig::default()).unwrap();
    assert_eq!(path.file_name().unwrap(), "trockenbau.onlv");

    let reread = UniversalParser::new().parse(&path).unwrap();
    let rows = flatten(Some(&reread), FlattenMode::Compact);
    let fp = rows.iter().find(|r| r.ftnr.as_deref() == Some("B")).unwrap();
    assert_eq!(fp.display_nr, "02.03B");
    assert_eq!(fp.bezeichnung, "Vorsatzschale");

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("<lvmenge>12.50</lvmenge>"), "{xml}");
}

#[test]
fn insert_below_missing_grundtext_fails() {
    let doc = parse_str(LV).unwrap();
    let err = add_position_to_path(&doc, "01.02.99", json!({})).unwrap_err();
    assert!(matches!(err, OnlvError::NotFound { kind: "Grundtext", .. }));
    assert!(matches!(add_position_to_path(&doc, "01.02", json!({})), Err(OnlvError::MalformedPath { .. })));
}

#[test]
fn merge_updates_existing_and_adds_new() {
    let doc = parse_str(LV).unwrap();
    let target = MergeTarget::Folgepositionen {
        lg: "01".to_string(),
        ulg: "02".to_string(),
        grundtext: "03".to_string(),
    };
    let items = vec![
        json!({ "@_ftnr": "C", "pos-eigenschaften": { "stichwort": "Schachtwand" } }),
        json!({ "@_ftnr": "A", "pos-eigenschaften": { "stichwort": "Ständerwand 125 mm" } }),
    ];
    let merged = merge_into_document(&doc, &target, &items).unwrap();

    let rows = flatten(Some(&merged), FlattenMode::Compact);
    let letters: Vec<&str> = rows.iter().filter_map(|r| r.ftnr.as_deref()).collect();
    assert_eq!(letters, vec!["A", "C"]);
    let a = rows.iter().find(|r| r.id == FP_ID).unwrap();
    assert_eq!(a.bezeichnung, "Ständerwand 125 mm");

    // merging the same items again changes nothing
    assert_eq!(merge_into_document(&merged, &target, &items).unwrap(), merged);
}

#[test]
fn filter_keeps_only_requested_positions() {
    let doc = parse_str(LV).unwrap();
    let target = MergeTarget::Folgepositionen {
        lg: "01".to_string(),
        ulg: "02".to_string(),
        grundtext: "03".to_string(),
    };
    let doc = merge_into_document(&doc, &target, &[json!({ "@_ftnr": "B" })]).unwrap();

    let filtered = filter_document(&doc, &["010203B"]);
    let rows = flatten(Some(&filtered), FlattenMode::Compact);
    let letters: Vec<&str> = rows.iter().filter_map(|r| r.ftnr.as_deref()).collect();
    assert_eq!(letters, vec!["B"]);

    assert!(filter_document(&doc, &["990203A"]).lgs().is_empty());
}
