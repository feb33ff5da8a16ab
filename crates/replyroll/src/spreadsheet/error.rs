use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Failed to open workbook '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a readable workbook archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Workbook part '{part}' is malformed: {reason}")]
    Xml { part: String, reason: String },

    #[error("Workbook has no sheets")]
    NoSheets,

    #[error("Failed to write workbook '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpreadsheetError {
    pub(crate) fn xml(part: &str, reason: impl std::fmt::Display) -> Self {
        SpreadsheetError::Xml {
            part: part.to_string(),
            reason: reason.to_string(),
        }
    }
}
