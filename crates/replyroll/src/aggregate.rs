//! Merging the spreadsheets teachers sent back into one workbook per project.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::db::attachment_repo::{self, AggregationSource};
use crate::db::{Database, DatabaseError};
use crate::error::StorageError;
use crate::sanitize::redact_path;
use crate::spreadsheet::{read_first_sheet, write_workbook, ColumnSet, SpreadsheetError};

/// Extensions (lowercase) that make an attachment a candidate for aggregation.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb"];

pub const OUTPUT_SHEET_NAME: &str = "Aggregated";
pub const UNMATCHED_TEACHER: &str = "Unmatched";

const METADATA_COLUMNS: [&str; 3] = ["Teacher", "Email", "Source File"];

#[derive(Error, Debug)]
pub enum AggregateError {
    /// Nothing to merge: no spreadsheet attachments, or none had a header row.
    #[error("No usable spreadsheet data for project {project_id}")]
    NoUsableData { project_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write aggregated workbook: {0}")]
    Write(#[from] SpreadsheetError),
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub path: PathBuf,
    /// Attachments whose sheet contributed a header.
    pub attachments_processed: usize,
    pub rows_written: usize,
}

pub struct Aggregator {
    db: Database,
    output_directory: PathBuf,
}

impl Aggregator {
    pub fn new<P: AsRef<Path>>(db: Database, output_directory: P) -> Self {
        Self {
            db,
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    /// Where the workbook for `project_id` is (or would be) written.
    pub fn output_path(&self, project_id: i64) -> PathBuf {
        self.output_directory
            .join(format!("project_{}.xlsx", project_id))
    }

    /// Rebuilds `project_{id}.xlsx` from every spreadsheet attachment of the
    /// project. On [`AggregateError::NoUsableData`] nothing is written and an
    /// existing output file is left untouched.
    pub fn aggregate(&self, project_id: i64) -> Result<AggregateOutcome, AggregateError> {
        let _span = tracing::info_span!("aggregate", project_id).entered();

        let sources: Vec<AggregationSource> =
            attachment_repo::list_for_aggregation(&self.db, project_id)?
                .into_iter()
                .filter(is_spreadsheet)
                .collect();

        if sources.is_empty() {
            info!("Project {} has no spreadsheet attachments", project_id);
            return Err(AggregateError::NoUsableData { project_id });
        }

        let mut merged = MergedTable::default();
        let mut processed = 0;

        for source in &sources {
            let path = Path::new(&source.attachment.stored_path);
            if !path.exists() {
                warn!(
                    "Attachment {} is missing on disk: {}",
                    source.attachment.id,
                    redact_path(path)
                );
                continue;
            }

            let rows = match read_first_sheet(path) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(
                        "Skipping {} ({}): {}",
                        source.attachment.filename,
                        redact_path(path),
                        e
                    );
                    continue;
                }
            };

            if merged.add_sheet(source, rows) {
                processed += 1;
            } else {
                warn!(
                    "Skipping {}: sheet has no header row",
                    source.attachment.filename
                );
            }
        }

        if merged.columns.is_empty() {
            return Err(AggregateError::NoUsableData { project_id });
        }

        let rows_written = merged.rows.len();
        let path = self.write(project_id, merged.into_rows())?;

        info!(
            "Aggregated {} attachment(s) into {} row(s) for project {}",
            processed, rows_written, project_id
        );

        Ok(AggregateOutcome {
            path,
            attachments_processed: processed,
            rows_written,
        })
    }

    fn write(&self, project_id: i64, rows: Vec<Vec<String>>) -> Result<PathBuf, AggregateError> {
        std::fs::create_dir_all(&self.output_directory).map_err(|e| {
            StorageError::CreateDirectory {
                path: self.output_directory.clone(),
                source: e,
            }
        })?;

        let path = self.output_path(project_id);
        let staging = path.with_extension("xlsx.tmp");

        if let Err(e) = write_workbook(&staging, OUTPUT_SHEET_NAME, &rows) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }

        std::fs::rename(&staging, &path).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        debug!("Wrote {}", redact_path(&path));
        Ok(path)
    }
}

fn is_spreadsheet(source: &AggregationSource) -> bool {
    has_spreadsheet_extension(&source.attachment.filename)
        || has_spreadsheet_extension(&source.attachment.stored_path)
}

fn has_spreadsheet_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Output header plus rows, grown as sheets are added.
#[derive(Default)]
struct MergedTable {
    columns: ColumnSet,
    /// Number of data columns (header width minus the metadata columns).
    data_columns: usize,
    rows: Vec<Vec<String>>,
}

impl MergedTable {
    /// Adds one sheet. Returns false if the sheet had no non-blank row.
    fn add_sheet(&mut self, source: &AggregationSource, rows: Vec<Vec<String>>) -> bool {
        let mut rows = rows.into_iter().skip_while(|row| is_blank(row));
        let Some(header) = rows.next() else {
            return false;
        };

        if self.columns.is_empty() {
            for name in METADATA_COLUMNS {
                self.columns.push(name);
            }
        }
        if header.len() > self.data_columns {
            for name in &header[self.data_columns..] {
                self.columns.push(name.clone());
            }
            self.data_columns = header.len();
        }

        let teacher = source
            .teacher_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNMATCHED_TEACHER)
            .to_string();
        let email = source.teacher_email.clone().unwrap_or_default();

        for mut cells in rows.filter(|row| !is_blank(row)) {
            if cells.len() < self.data_columns {
                cells.resize(self.data_columns, String::new());
            } else if cells.len() > self.data_columns {
                for n in self.data_columns + 1..=cells.len() {
                    self.columns.push(format!("ExtraCol_{}", n));
                }
                self.data_columns = cells.len();
            }

            let mut row = Vec::with_capacity(METADATA_COLUMNS.len() + cells.len());
            row.push(teacher.clone());
            row.push(email.clone());
            row.push(source.attachment.filename.clone());
            row.extend(cells);
            self.rows.push(row);
        }

        true
    }

    /// Header followed by data rows, every row padded to the final width.
    fn into_rows(self) -> Vec<Vec<String>> {
        let width = self.columns.len();
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.columns.names().to_vec());
        for mut row in self.rows {
            row.resize(width, String::new());
            out.push(row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::attachment_repo::AttachmentRow;

    fn source(filename: &str, stored: &str, teacher: Option<&str>) -> AggregationSource {
        AggregationSource {
            attachment: AttachmentRow {
                id: 1,
                reply_id: 1,
                project_id: Some(1),
                teacher_id: Some(1),
                filename: filename.to_string(),
                stored_path: stored.to_string(),
                content_type: "application/octet-stream".to_string(),
                size_bytes: 0,
                created_at: String::new(),
            },
            teacher_name: teacher.map(str::to_string),
            teacher_email: teacher.map(|t| format!("{}@school.example", t.to_lowercase())),
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_spreadsheet(&source("a.XLSX", "x", None)));
        assert!(is_spreadsheet(&source("a", "/store/1_2_a.xlsb", None)));
        assert!(is_spreadsheet(&source("legacy.xls", "x", None)));
        assert!(!is_spreadsheet(&source("a.pdf", "/store/1_2_a.pdf", None)));
        assert!(!is_spreadsheet(&source("xlsx", "xlsx", None)));
    }

    #[test]
    fn test_header_grows_and_rows_are_padded() {
        let mut table = MergedTable::default();
        assert!(table.add_sheet(
            &source("a.xlsx", "a", Some("Ann")),
            vec![row(&["Name", "Score"]), row(&["x", "1"])],
        ));
        assert!(table.add_sheet(
            &source("b.xlsx", "b", Some("Ben")),
            vec![row(&["Name", "Score", "Notes"]), row(&["y", "2", "late"])],
        ));

        let rows = table.into_rows();
        assert_eq!(
            rows[0],
            row(&["Teacher", "Email", "Source File", "Name", "Score", "Notes"])
        );
        assert_eq!(rows[1], row(&["Ann", "ann@school.example", "a.xlsx", "x", "1", ""]));
        assert_eq!(
            rows[2],
            row(&["Ben", "ben@school.example", "b.xlsx", "y", "2", "late"])
        );
    }

    #[test]
    fn test_leading_blank_rows_and_short_rows() {
        let mut table = MergedTable::default();
        table.add_sheet(
            &source("a.xlsx", "a", None),
            vec![
                row(&[]),
                row(&["", " "]),
                row(&["Name", "Score", "Notes"]),
                row(&["only-name"]),
                row(&[""]),
                row(&["z", "3"]),
            ],
        );

        let rows = table.into_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], row(&["Unmatched", "", "a.xlsx", "only-name", "", ""]));
        assert_eq!(rows[2], row(&["Unmatched", "", "a.xlsx", "z", "3", ""]));
    }

    #[test]
    fn test_long_rows_add_placeholder_columns() {
        let mut table = MergedTable::default();
        table.add_sheet(
            &source("a.xlsx", "a", Some("Ann")),
            vec![row(&["Name"]), row(&["x", "extra1", "extra2"]), row(&["y"])],
        );

        let rows = table.into_rows();
        assert_eq!(
            rows[0],
            row(&["Teacher", "Email", "Source File", "Name", "ExtraCol_2", "ExtraCol_3"])
        );
        assert_eq!(rows[2], row(&["Ann", "ann@school.example", "a.xlsx", "y", "", ""]));
    }

    #[test]
    fn test_shorter_later_header_keeps_columns() {
        let mut table = MergedTable::default();
        table.add_sheet(&source("a.xlsx", "a", None), vec![row(&["A", "B", "C"])]);
        table.add_sheet(&source("b.xlsx", "b", None), vec![row(&["A"]), row(&["1"])]);

        let rows = table.into_rows();
        assert_eq!(rows[0].len(), 6);
        assert_eq!(rows[1], row(&["Unmatched", "", "b.xlsx", "1", "", ""]));
    }

    #[test]
    fn test_empty_teacher_name_is_unmatched() {
        let mut blank = source("a.xlsx", "a", Some("Ann"));
        blank.teacher_name = Some("  ".to_string());
        let mut empty = source("b.xlsx", "b", None);
        empty.teacher_name = Some(String::new());

        let mut table = MergedTable::default();
        table.add_sheet(&blank, vec![row(&["Name"]), row(&["x"])]);
        table.add_sheet(&empty, vec![row(&["Name"]), row(&["y"])]);

        let rows = table.into_rows();
        assert_eq!(rows[1], row(&["Unmatched", "ann@school.example", "a.xlsx", "x"]));
        assert_eq!(rows[2], row(&["Unmatched", "", "b.xlsx", "y"]));
    }

    #[test]
    fn test_blank_sheet_contributes_nothing() {
        let mut table = MergedTable::default();
        assert!(!table.add_sheet(&source("a.xlsx", "a", None), vec![row(&["", ""])]));
        assert!(table.columns.is_empty());
    }
}
