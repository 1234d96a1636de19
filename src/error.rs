use thiserror::Error;

/// Errors raised by the ONLV engine.
#[derive(Debug, Error)]
pub enum OnlvError {
    #[error("malformed position path '{path}', expected LG.ULG.GT")]
    MalformedPath { path: String },

    #[error("{kind} '{nr}' not found for path '{path}'")]
    NotFound {
        kind: &'static str,
        nr: String,
        path: String,
    },

    #[error("no follow-up letter left under Grundtext '{grundtext}'")]
    FtnrExhausted { grundtext: String },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("file is not valid UTF-8, please ensure the file is UTF-8 encoded")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("XML parse error: {0}")]
    XmlRead(#[from] roxmltree::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OnlvError>;
