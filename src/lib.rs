pub mod core {
    pub mod display_nr;
    pub mod document;
    pub mod filter;
    pub mod flatten;
    pub mod insert;
    pub mod merge;
    pub mod numbering;
    pub mod parser;
    pub mod position_info;
    pub mod registry;
    pub mod rich_text;
    pub mod writer;
}

pub mod utils {
    pub mod document_processor;
}

pub mod config;
pub mod error;

pub use crate::config::{Config, ExportConfig};
pub use crate::core::document::OnlvDocument;
pub use crate::error::{OnlvError, Result};

use serde::{Deserialize, Serialize};

/// Node types of the LG / ULG / Grundtext / position hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Lg,
    Ulg,
    Grundtext,
    Folgeposition,
    Ungeteilteposition,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Lg => "LG",
            EntryKind::Ulg => "ULG",
            EntryKind::Grundtext => "Grundtext",
            EntryKind::Folgeposition => "Folgeposition",
            EntryKind::Ungeteilteposition => "Ungeteilteposition",
        }
    }

    pub fn is_position(&self) -> bool {
        matches!(self, EntryKind::Folgeposition | EntryKind::Ungeteilteposition)
    }
}
