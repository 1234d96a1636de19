use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const ONLV_NAMESPACE: &str = "http://www.oenorm.at/schema/A2063/2021-03-01";

/// Settings for the XML exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub root_element: String,
    pub namespace: String,
    /// Fields always written with exactly two decimal places.
    pub decimal_fields: Vec<String>,
    /// Elements the schema requires as `<x></x>`, never `<x/>`.
    pub paired_tags: Vec<String>,
    pub synthetic_id_key: String,
    pub transient_id_prefix: String,
    pub default_filename: String,
    /// Indentation width, 0 writes compact XML.
    pub indent: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root_element: "onlv".to_string(),
            namespace: ONLV_NAMESPACE.to_string(),
            decimal_fields: vec!["lvmenge".to_string()],
            paired_tags: [
                "p",
                "langtext",
                "kommentar",
                "vorbemerkung",
                "stichwort",
                "ueberschrift",
                "einheit",
                "al",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            synthetic_id_key: "_id".to_string(),
            transient_id_prefix: "temp-".to_string(),
            default_filename: "exported_onlv.onlv".to_string(),
            indent: 0,
        }
    }
}

impl ExportConfig {
    /// Synthetic id for an entry that only lives in the editor until saved.
    pub fn new_transient_id(&self) -> String {
        format!("{}{}", self.transient_id_prefix, Uuid::new_v4())
    }

    pub fn is_transient_id(&self, id: &str) -> bool {
        !self.transient_id_prefix.is_empty() && id.starts_with(&self.transient_id_prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub export: ExportConfig,
    pub nrlist_path: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&content)?;
        info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Reads `.env`, then `ONLV_CONFIG` and `ONLV_NRLIST`.
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            debug!("Loaded .env file");
        }

        let mut config = match std::env::var("ONLV_CONFIG") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = std::env::var("ONLV_NRLIST") {
            config.nrlist_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"export": {"decimal_fields": ["lvmenge", "ep"]}}"#).unwrap();
        assert_eq!(config.export.decimal_fields, vec!["lvmenge", "ep"]);
        assert_eq!(config.export.root_element, "onlv");
        assert!(config.export.paired_tags.contains(&"p".to_string()));
        assert!(config.nrlist_path.is_none());
    }

    #[test]
    fn transient_ids_carry_the_prefix() {
        let export = ExportConfig::default();
        let id = export.new_transient_id();
        assert!(export.is_transient_id(&id));
        assert!(!export.is_transient_id("lg-01"));
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onlv.json");
        std::fs::write(&path, r#"{"nrlist_path": "/tmp/nrlist.txt"}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.nrlist_path, Some(PathBuf::from("/tmp/nrlist.txt")));
    }
}
