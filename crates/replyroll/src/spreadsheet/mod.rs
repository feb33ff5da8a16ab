//! Workbook reading and writing.

pub mod columns;
pub mod error;
pub mod reader;
pub mod writer;

pub use columns::ColumnSet;
pub use error::SpreadsheetError;
pub use reader::read_first_sheet;
pub use writer::write_workbook;
