use onlv_rs::core::document::{OnlvDocument, SkeletonInfo};
use onlv_rs::core::merge::{merge_into_document, MergeTarget};
use onlv_rs::core::parser::{parse_str, UniversalParser};
use onlv_rs::core::writer::{export_document, to_xml, OnlvXmlWriter, Writer};
use onlv_rs::{Config, ExportConfig};
use serde_json::json;

#[test]
fn skeleton_exports_under_its_file_name() {
    let doc = OnlvDocument::skeleton(SkeletonInfo {
        dateiname: Some("Angebot Halle".to_string()),
        vorhaben: Some("Halle 3".to_string()),
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();
    let path = export_document(&doc, dir.path(), &ExportConfig::default()).unwrap();
    assert_eq!(path.file_name().unwrap(), "Angebot Halle.onlv");

    let reread = UniversalParser::new().parse(&path).unwrap();
    let kenndaten = reread.as_value().pointer("/onlv/ausschreibungs-lv/kenndaten").unwrap();
    assert_eq!(kenndaten["vorhaben"], "Halle 3");
    assert_eq!(kenndaten["lvbezeichnung"], "Trockenbauarbeiten");
    assert_eq!(kenndaten["waehrung"], "EUR");
}

#[test]
fn unsaved_editor_entries_are_not_exported() {
    let export = ExportConfig::default();
    let doc = OnlvDocument::skeleton(SkeletonInfo::default());
    let items = vec![
        json!({ "@_nr": "01", "_id": "lg-01", "lg-eigenschaften": { "ueberschrift": "Bestand" } }),
        json!({ "@_nr": "02", "_id": export.new_transient_id() }),
    ];
    let doc = merge_into_document(&doc, &MergeTarget::Lgs, &items).unwrap();
    assert_eq!(doc.lgs().len(), 2);

    let xml = to_xml(&doc, &export).unwrap();
    assert!(xml.contains(r#"<lg nr="01">"#), "{xml}");
    assert!(!xml.contains(r#"nr="02""#));
    assert!(!xml.contains("_id"));
    assert!(!xml.contains("temp-"));
}

#[test]
fn empty_paragraphs_survive_a_round_trip() {
    let doc = parse_str(
        r#"<onlv><ausschreibungs-lv><gliederung-lg><lg-liste><lg nr="01">
             <lg-eigenschaften><vorbemerkung><langtext><p>Erster</p><p/><p></p></langtext></vorbemerkung></lg-eigenschaften>
           </lg></lg-liste></gliederung-lg></ausschreibungs-lv></onlv>"#,
    )
    .unwrap();

    let xml = to_xml(&doc, &ExportConfig::default()).unwrap();
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#), "{xml}");
    assert!(xml.contains("<p>Erster</p><p></p><p></p>"), "{xml}");
    assert!(!xml.contains("<p/>"));
}

#[test]
fn writer_follows_loaded_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("onlv.json");
    std::fs::write(&config_path, r#"{"export": {"indent": 2, "decimal_fields": ["lvmenge", "ep"]}}"#).unwrap();
    let config = Config::load(&config_path).unwrap();

    let doc = OnlvDocument::from_value(json!({ "onlv": { "preis": { "ep": "7", "lvmenge": 3 } } }));
    let out = dir.path().join("preise.onlv");
    OnlvXmlWriter::new(config.export).write(&doc, &out).unwrap();

    let xml = std::fs::read_to_string(&out).unwrap();
    assert!(xml.contains("<ep>7.00</ep>"), "{xml}");
    assert!(xml.contains("\n  <preis>"), "{xml}");
    assert!(!dir.path().join("preise.onlv.part").exists());
}
