//! First-sheet reader for OOXML workbooks (`.xlsx`, `.xlsm`).

use std::io::{Read, Seek};
use std::path::Path;

use log::debug;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::error::SpreadsheetError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const DEFAULT_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// Zero-based index of column `XFD`, the last one a worksheet can have.
pub const MAX_COLUMN_INDEX: usize = 16_383;

/// Reads every row of the first worksheet as text.
///
/// Cells are placed by their `r` reference, gaps are filled with empty
/// strings and trailing empty cells are trimmed from each row.
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, SpreadsheetError> {
    let file = std::fs::File::open(path).map_err(|e| SpreadsheetError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file)?;

    let sheet_part = first_sheet_part(&mut archive)?;
    let shared_strings = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_xml = read_part(&mut archive, &sheet_part)?.ok_or(SpreadsheetError::NoSheets)?;
    let rows = parse_sheet(&sheet_xml, &shared_strings, &sheet_part)?;

    debug!("Read {} row(s) from {}", rows.len(), sheet_part);
    Ok(rows)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SpreadsheetError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| SpreadsheetError::xml(name, e))?;
    Ok(Some(xml))
}

/// Resolves the archive path of the first `<sheet>` in the workbook.
fn first_sheet_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<String, SpreadsheetError> {
    let Some(workbook) = read_part(archive, WORKBOOK_PART)? else {
        return if archive.by_name(DEFAULT_SHEET_PART).is_ok() {
            Ok(DEFAULT_SHEET_PART.to_string())
        } else {
            Err(SpreadsheetError::NoSheets)
        };
    };

    let rel_id = first_sheet_rel_id(&workbook)?.ok_or(SpreadsheetError::NoSheets)?;

    let target = match read_part(archive, WORKBOOK_RELS_PART)? {
        Some(rels) => relationship_target(&rels, &rel_id)?,
        None => None,
    };

    Ok(match target {
        Some(target) if target.starts_with('/') => target.trim_start_matches('/').to_string(),
        Some(target) => format!("xl/{}", target),
        None => DEFAULT_SHEET_PART.to_string(),
    })
}

fn first_sheet_rel_id(xml: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sheet" => {
                return attribute(&reader, e, b"id", WORKBOOK_PART);
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(SpreadsheetError::xml(WORKBOOK_PART, e)),
            _ => {}
        }
    }
}

fn relationship_target(xml: &str, rel_id: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attribute(&reader, e, b"Id", WORKBOOK_RELS_PART)?.as_deref() == Some(rel_id) {
                    return attribute(&reader, e, b"Target", WORKBOOK_RELS_PART);
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(SpreadsheetError::xml(WORKBOOK_RELS_PART, e)),
            _ => {}
        }
    }
}

/// Looks up an attribute by local name, ignoring its namespace prefix.
fn attribute(
    reader: &Reader<&[u8]>,
    element: &BytesStart,
    name: &[u8],
    part: &str,
) -> Result<Option<String>, SpreadsheetError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SpreadsheetError::xml(part, e))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|e| SpreadsheetError::xml(part, e))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn resolve_reference(reference: &BytesRef, part: &str) -> Result<String, SpreadsheetError> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|e| SpreadsheetError::xml(part, e))?
    {
        return Ok(ch.to_string());
    }

    let name = reference
        .decode()
        .map_err(|e| SpreadsheetError::xml(part, e))?;
    quick_xml::escape::resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| SpreadsheetError::xml(part, format!("unknown entity &{};", name)))
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_item = false;
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_item && in_text && !in_phonetic {
                    let decoded = e
                        .decode()
                        .map_err(|e| SpreadsheetError::xml(SHARED_STRINGS_PART, e))?;
                    current.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if in_item && in_text && !in_phonetic {
                    current.push_str(&resolve_reference(e, SHARED_STRINGS_PART)?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpreadsheetError::xml(SHARED_STRINGS_PART, e)),
            _ => {}
        }
    }

    Ok(strings)
}

#[derive(Default)]
struct PendingCell {
    column: usize,
    cell_type: String,
    value: String,
    inline: String,
}

impl PendingCell {
    fn resolve(self, shared_strings: &[String]) -> String {
        match self.cell_type.as_str() {
            "s" => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i).cloned())
                .unwrap_or_default(),
            "inlineStr" => self.inline,
            "b" => match self.value.trim() {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                other => other.to_string(),
            },
            _ => self.value,
        }
    }
}

fn parse_sheet(
    xml: &str,
    shared_strings: &[String],
    part: &str,
) -> Result<Vec<Vec<String>>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut rows = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let next_column = row.as_ref().map(Vec::len).unwrap_or(0);
                    cell = Some(start_cell(&reader, e, next_column, part)?);
                }
                b"v" => in_value = true,
                b"t" if cell.is_some() => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => rows.push(Vec::new()),
                b"c" => {
                    // a cell with no value still advances the column
                    let next_column = row.as_ref().map(Vec::len).unwrap_or(0);
                    let empty = start_cell(&reader, e, next_column, part)?;
                    if let Some(row) = row.as_mut() {
                        place_cell(row, empty.column, String::new());
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(mut finished) = row.take() {
                        while finished.last().is_some_and(|c| c.is_empty()) {
                            finished.pop();
                        }
                        rows.push(finished);
                    }
                }
                b"c" => {
                    if let (Some(done), Some(row)) = (cell.take(), row.as_mut()) {
                        let column = done.column;
                        place_cell(row, column, done.resolve(shared_strings));
                    }
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(cell) = cell.as_mut() {
                    if in_value || in_inline_text {
                        let decoded = e.decode().map_err(|e| SpreadsheetError::xml(part, e))?;
                        if in_value {
                            cell.value.push_str(&decoded);
                        } else {
                            cell.inline.push_str(&decoded);
                        }
                    }
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if let Some(cell) = cell.as_mut() {
                    if in_value {
                        cell.value.push_str(&resolve_reference(e, part)?);
                    } else if in_inline_text {
                        cell.inline.push_str(&resolve_reference(e, part)?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpreadsheetError::xml(part, e)),
            _ => {}
        }
    }

    Ok(rows)
}

fn start_cell(
    reader: &Reader<&[u8]>,
    element: &BytesStart,
    next_column: usize,
    part: &str,
) -> Result<PendingCell, SpreadsheetError> {
    let column = match attribute(reader, element, b"r", part)? {
        Some(r) if r.starts_with(|c: char| c.is_ascii_alphabetic()) => column_index(&r)
            .filter(|&c| c <= MAX_COLUMN_INDEX)
            .ok_or_else(|| {
                SpreadsheetError::xml(part, format!("cell reference '{}' is past column XFD", r))
            })?,
        _ => next_column,
    };
    if column > MAX_COLUMN_INDEX {
        return Err(SpreadsheetError::xml(part, "row has more than 16384 cells"));
    }
    let cell_type = attribute(reader, element, b"t", part)?.unwrap_or_default();

    Ok(PendingCell {
        column,
        cell_type,
        ..PendingCell::default()
    })
}

fn place_cell(row: &mut Vec<String>, column: usize, value: String) {
    if row.len() <= column {
        row.resize(column + 1, String::new());
    }
    row[column] = value;
}

/// Zero-based column of a cell reference such as `AB12`.
pub fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }

    let mut index = 0usize;
    for c in letters.chars() {
        index = index
            .checked_mul(26)?
            .checked_add((c.to_ascii_uppercase() as u8 - b'A') as usize + 1)?;
    }
    Some(index - 1)
}
