//! Whole-workbook read and rewrite of local `.xlsx` files.
//!
//! Both the product catalog and the local operation log are small enough to
//! load entirely, change in memory and write back in one go.

use crate::error::Result;
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::Workbook;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// One named worksheet with every cell read as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_header(name: impl Into<String>, header: &[&str]) -> Self {
        let mut sheet = Sheet::new(name);
        sheet.rows.push(header.iter().map(|h| h.to_string()).collect());
        sheet
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_sheets<R: std::io::Read + std::io::Seek>(workbook: &mut Xlsx<R>) -> Result<Vec<Sheet>> {
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        // the range starts at the first used cell, not necessarily A1
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); row_offset as usize];
        for row in range.rows() {
            let mut cells = vec![String::new(); col_offset as usize];
            cells.extend(row.iter().map(cell_text));
            rows.push(cells);
        }
        sheets.push(Sheet { name, rows });
    }
    Ok(sheets)
}

/// Reads every worksheet of the workbook at `path`, in tab order.
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Vec<Sheet>> {
    let mut workbook: Xlsx<_> = open_workbook(path.as_ref())?;
    read_sheets(&mut workbook)
}

/// Same as [`read_workbook`] for a workbook held in memory.
pub fn read_workbook_bytes(bytes: &[u8]) -> Result<Vec<Sheet>> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))?;
    read_sheets(&mut workbook)
}

/// Like [`read_workbook`], but a missing file reads as an empty workbook.
pub fn read_workbook_or_empty(path: impl AsRef<Path>) -> Result<Vec<Sheet>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_workbook(path)
}

fn build_workbook(sheets: &[Sheet]) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        for (r, row) in sheet.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    worksheet.write_string(r as u32, c as u16, value)?;
                }
            }
        }
    }
    Ok(workbook)
}

/// Replaces the file at `path` with exactly the given worksheets.
///
/// The workbook is written to a temporary file next to `path` and renamed
/// over it, so a concurrent reader sees either the old or the new file,
/// never a partial one.
pub fn write_workbook(path: impl AsRef<Path>, sheets: &[Sheet]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let bytes = workbook_to_buffer(sheets)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serializes the worksheets to an in-memory `.xlsx` file.
pub fn workbook_to_buffer(sheets: &[Sheet]) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(sheets)?;
    Ok(workbook.save_to_buffer()?)
}

/// True when every cell of the row is blank.
pub fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sheets = read_workbook_or_empty(dir.path().join("absent.xlsx")).unwrap();
        assert!(sheets.is_empty());
    }

    #[test]
    fn rewrite_keeps_sheet_order_and_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut first = Sheet::with_header("B3", &["Date", "Serre"]);
        first.rows.push(vec!["2024-05-01 08:00".into(), "B".into()]);
        let second = Sheet::with_header("C12", &["Date", "Serre"]);

        write_workbook(&path, &[first.clone(), second.clone()]).unwrap();
        let sheets = read_workbook(&path).unwrap();

        assert_eq!(sheets, vec![first, second]);
    }

    #[test]
    fn numeric_looking_text_stays_text() {
        let mut sheet = Sheet::new("S");
        sheet.rows.push(vec!["2".into(), "1.6".into()]);
        let bytes = workbook_to_buffer(&[sheet]).unwrap();
        let sheets = read_workbook_bytes(&bytes).unwrap();
        assert_eq!(sheets[0].rows[0], vec!["2".to_string(), "1.6".to_string()]);
    }

    #[test]
    fn rewrite_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        write_workbook(&path, &[Sheet::with_header("B3", &["Date"])]).unwrap();
        write_workbook(&path, &[Sheet::with_header("C4", &["Date"])]).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("book.xlsx")]);
        assert_eq!(read_workbook(&path).unwrap()[0].name, "C4");
    }
}
